use salvo::prelude::*;
use serde_json::json;
use tracing::warn;

use crate::web::metrics::Metrics;
use crate::web::web_state;

#[handler]
pub async fn health_check(res: &mut Response) {
    let state = web_state();

    match state.stores.channels.list_channels_with_deadline().await {
        Ok(channels) => {
            res.render(Json(json!({
                "status": "ok",
                "uptime_seconds": Metrics::uptime_seconds(),
                "version": env!("CARGO_PKG_VERSION"),
                "monitored_channels": channels.len(),
            })));
        }
        Err(err) => {
            warn!("health check database probe failed: {}", err);
            res.status_code(StatusCode::SERVICE_UNAVAILABLE);
            res.render(Json(json!({
                "status": "degraded",
                "error": err.to_string(),
            })));
        }
    }
}
