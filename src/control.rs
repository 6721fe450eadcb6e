//! HTTP control surface: `/stop` and `/start` toggle the active product set.

use crate::models::{FreebieError, Result};
use crate::session::ActiveProducts;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use tracing::{error, info};

/// Build the control router around a shared product handle.
pub fn router(products: ActiveProducts) -> Router {
    Router::new()
        .route("/stop", get(stop))
        .route("/start", get(start))
        .fallback(not_found)
        .with_state(products)
}

/// Serve the control router until the listener fails.
pub async fn serve(bind: &str, products: ActiveProducts) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|e| FreebieError::io(format!("binding control surface to {bind}"), e))?;
    info!(bind = bind, "Control surface listening");

    axum::serve(listener, router(products))
        .await
        .map_err(|e| FreebieError::io("serving control surface", e))
}

async fn stop(State(products): State<ActiveProducts>) -> (StatusCode, &'static str) {
    match products.stop().await {
        Ok(()) => (StatusCode::OK, "Stopped playing games."),
        Err(e) => {
            error!(error = %e, "Stop request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to stop games.")
        }
    }
}

async fn start(State(products): State<ActiveProducts>) -> (StatusCode, &'static str) {
    match products.start().await {
        Ok(()) => (StatusCode::OK, "Started playing games."),
        Err(e) => {
            error!(error = %e, "Start request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to start games.")
        }
    }
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Not found.")
}
