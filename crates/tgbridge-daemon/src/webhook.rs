//! Telegram webhook endpoint
//!
//! `POST /` accepts an `Update` and always answers 200 `OK`, even for bodies
//! it cannot parse, so Telegram never retries. Handling runs on its own task.
//! `GET /` is a plain health check.

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::get;
use axum::Router;
use tgbridge_core::chat::Update;
use tgbridge_core::CommandRouter;
use tracing::{debug, warn};

pub const HEALTH_TEXT: &str = "Claude-Telegram Bridge";

#[derive(Clone)]
pub struct WebhookState {
    router: CommandRouter,
}

impl WebhookState {
    pub fn new(router: CommandRouter) -> Self {
        Self { router }
    }
}

pub fn build_router(state: WebhookState) -> Router {
    Router::new()
        .route("/", get(health_handler).post(update_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    HEALTH_TEXT
}

async fn update_handler(State(state): State<WebhookState>, body: Bytes) -> &'static str {
    let update: Update = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!(error = %e, "Unparseable webhook body");
            return "OK";
        }
    };

    let update_id = update.update_id;
    match update.into_event() {
        Some(event) => {
            let router = state.router.clone();
            tokio::spawn(async move {
                if let Err(e) = router.handle(event).await {
                    warn!(update_id, error = %e, "Update handling failed");
                }
            });
        }
        None => debug!(update_id, "Update ignored"),
    }
    "OK"
}
