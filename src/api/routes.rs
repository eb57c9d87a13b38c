use crate::allow_list::AllowList;
use crate::api::api_error::APIError;
use crate::api::model::{
    DomainResult, RegisterRequest, RegisterResult, UpdateNameRequest, UpdateNameResult,
    UpdateRecordRequest, UpdateRecordResult,
};
use crate::api::server::AppState;
use crate::error::Error;
use crate::store::{Account, TxtStore};
use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::WithRejection;
use serde_json::json;
use std::net::SocketAddr;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

pub(super) const API_USER_HEADER: &str = "x-api-user";
pub(super) const API_KEY_HEADER: &str = "x-api-key";

pub(super) fn new(state: AppState) -> Router {
    Router::new()
        .route("/healthcheck", get(health_check))
        .route("/register", post(register))
        .route("/update", post(update))
        .route("/domains", get(list_domains))
        .route("/update_name", post(update_name))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.api_timeout))
        .with_state(state)
}

#[allow(clippy::unused_async)]
async fn health_check() -> impl IntoResponse {
    Json(json!({"ok":"healthy"}))
}

async fn register(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<RegisterResult>), APIError> {
    // An empty body registers an unrestricted, unlabelled account.
    let request: RegisterRequest = if body.is_empty() {
        RegisterRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(Error::InvalidJSON)?
    };

    let allow_from = AllowList::new(request.allowfrom);
    if let Err(err) = allow_from.validate() {
        tracing::debug!("rejected registration: {err}");
        return Err(err.into());
    }
    let registration = state
        .store
        .create_account(&allow_from, &request.domain_name)
        .await?;
    let account = registration.account;
    Ok((
        StatusCode::CREATED,
        Json(RegisterResult {
            username: account.identity.to_string(),
            password: registration.credential,
            fulldomain: state.config.fulldomain(&account.subdomain),
            allowfrom: account.allow_from.normalize(),
            subdomain: account.subdomain,
        }),
    ))
}

async fn update(
    State(state): State<AppState>,
    ConnectInfo(client_addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateRecordRequest>, APIError>,
) -> Result<Json<UpdateRecordResult>, APIError> {
    let client_addr = client_addr.ip();
    let account = authenticate(&state, &headers).await?;

    if account.subdomain != payload.subdomain || !account.allow_from.permits(client_addr) {
        tracing::debug!(
            "rejected update from {client_addr} for \"{}\"",
            payload.subdomain
        );
        return Err(Error::AuthForbidden(client_addr, payload.subdomain).into());
    }

    if let Err(err) = payload.valid_dns01() {
        tracing::debug!(
            "rejected update from {client_addr} for \"{}\": {err}",
            payload.subdomain
        );
        return Err(Error::InvalidDNS01.into());
    }

    tracing::info!(
        "accepted update from {client_addr} for \"{}\"",
        state.config.fulldomain(&account.subdomain)
    );
    state
        .store
        .update_value(&account.subdomain, &payload.txt)
        .await?;
    Ok(Json(UpdateRecordResult { txt: payload.txt }))
}

async fn list_domains(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<DomainResult>>, APIError> {
    require_admin(&state, &headers)?;
    let domains = state
        .store
        .list_all()
        .await?
        .into_iter()
        .map(|account| DomainResult::new(account, &state.config.domain))
        .collect();
    Ok(Json(domains))
}

async fn update_name(
    State(state): State<AppState>,
    headers: HeaderMap,
    WithRejection(Json(payload), _): WithRejection<Json<UpdateNameRequest>, APIError>,
) -> Result<Json<UpdateNameResult>, APIError> {
    require_admin(&state, &headers)?;
    let subdomain = state.config.subdomain_of(&payload.fulldomain)?;
    state
        .store
        .update_label(&subdomain, &payload.domain_name)
        .await?;
    tracing::debug!(
        "updated domain name of \"{subdomain}\" to \"{}\"",
        payload.domain_name
    );
    Ok(Json(UpdateNameResult {
        success: true,
        fulldomain: payload.fulldomain,
        domain_name: payload.domain_name,
    }))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
}

async fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<Account, Error> {
    let identity = header(headers, API_USER_HEADER)
        .and_then(|user| Uuid::parse_str(user).ok())
        .ok_or(Error::Unauthorized)?;
    let credential = header(headers, API_KEY_HEADER).ok_or(Error::Unauthorized)?;
    match state.store.authenticate(&identity, credential).await {
        Err(Error::NotFound(_)) => Err(Error::Unauthorized),
        other => other,
    }
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), Error> {
    if state.config.admin_key_matches(header(headers, API_KEY_HEADER)) {
        Ok(())
    } else {
        Err(Error::Unauthorized)
    }
}
