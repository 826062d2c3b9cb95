use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use salvo::prelude::*;
use tracing::info;

use crate::config::WebConfig;
use crate::db::Stores;

pub mod handlers;
pub mod metrics;

use self::handlers::health::health_check;
use self::metrics::metrics_endpoint;

#[derive(Clone)]
pub struct WebState {
    pub stores: Stores,
}

static WEB_STATE: OnceCell<WebState> = OnceCell::new();

pub fn web_state() -> &'static WebState {
    WEB_STATE
        .get()
        .expect("web state is not initialized before handler execution")
}

pub fn create_router() -> Router {
    Router::new()
        .push(Router::with_path("health").get(health_check))
        .push(Router::with_path("metrics").get(metrics_endpoint))
}

#[derive(Clone)]
pub struct WebServer {
    config: Arc<WebConfig>,
}

impl WebServer {
    pub fn new(config: Arc<WebConfig>, stores: Stores) -> Self {
        let _ = WEB_STATE.set(WebState { stores });
        Self { config }
    }

    pub async fn start(&self) -> Result<()> {
        let bind_addr = format!("{}:{}", self.config.bind_address, self.config.port);
        info!("starting web server on {}", bind_addr);

        let acceptor = TcpListener::new(bind_addr.clone())
            .try_bind()
            .await
            .with_context(|| format!("failed to bind {bind_addr}"))?;
        Server::new(acceptor).serve(create_router()).await;

        Ok(())
    }
}
