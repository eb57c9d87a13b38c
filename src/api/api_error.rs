use crate::error::Error;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug)]
pub(crate) struct APIError(anyhow::Error);

impl IntoResponse for APIError {
    fn into_response(self) -> Response {
        let any_err = self.0;
        // Extractor rejections arrive unwrapped through `WithRejection`.
        let status = if let Some(rejection) = any_err.downcast_ref::<JsonRejection>() {
            rejection_status(rejection)
        } else {
            error_status(any_err.downcast_ref::<Error>())
        };
        // Storage and other internal causes are logged, never echoed to the client.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("internal error serving request: {any_err:?}");
            "internal error".to_string()
        } else {
            format!("{any_err}")
        };
        let body = Json(json!({
            "error": message,
        }));
        (status, body).into_response()
    }
}

fn error_status(err: Option<&Error>) -> StatusCode {
    match err {
        Some(Error::Unauthorized) => StatusCode::UNAUTHORIZED,
        Some(Error::AuthForbidden(_, _)) => StatusCode::FORBIDDEN,
        Some(Error::NotFound(_)) => StatusCode::NOT_FOUND,
        Some(
            Error::InvalidPrefix(_)
            | Error::InvalidDNS01
            | Error::InvalidFulldomain(_)
            | Error::InvalidJSON(_),
        ) => StatusCode::BAD_REQUEST,
        Some(Error::JsonExtractorRejection(rejection)) => rejection_status(rejection),
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn rejection_status(rejection: &JsonRejection) -> StatusCode {
    match rejection {
        JsonRejection::JsonDataError(_) => StatusCode::UNPROCESSABLE_ENTITY,
        JsonRejection::JsonSyntaxError(_) => StatusCode::BAD_REQUEST,
        JsonRejection::MissingJsonContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl<E> From<E> for APIError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(err: Error) -> StatusCode {
        APIError::from(err).into_response().status()
    }

    #[test]
    fn status_codes() {
        assert_eq!(status(Error::Unauthorized), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status(Error::AuthForbidden(
                "10.0.0.1".parse().unwrap(),
                "sub".into()
            )),
            StatusCode::FORBIDDEN
        );
        assert_eq!(status(Error::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(
            status(Error::InvalidPrefix("bad".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status(Error::InvalidDNS01), StatusCode::BAD_REQUEST);
        assert_eq!(
            status(Error::Storage(sqlx::Error::PoolClosed)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status(Error::CorruptRecord("x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
