use crate::api::routes;
use crate::config::SharedConfig;
use crate::store::SharedStore;
use std::future::Future;
use std::net::SocketAddr;

#[derive(Clone)]
pub(super) struct AppState {
    pub config: SharedConfig,
    pub store: SharedStore,
}

pub fn new(config: SharedConfig, store: SharedStore) -> impl Future<Output = hyper::Result<()>> {
    axum::Server::bind(&config.api_bind_addr).serve(
        routes::new(AppState { config, store }).into_make_service_with_connect_info::<SocketAddr>(),
    )
}
