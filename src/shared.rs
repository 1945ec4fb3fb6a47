use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::clipboard::ClipboardService;
use crate::config::Config;

/// Shared application state containing all dependencies
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ClipboardService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(service: Arc<ClipboardService>, config: Arc<Config>) -> Self {
        Self { service, config }
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::PayloadTooLarge(msg) => (StatusCode::PAYLOAD_TOO_LARGE, msg),
        };

        let body = Json(json!({
            "error": error_message
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
pub mod test_utils {
    use super::*;
    use crate::device::DeviceIdentifier;
    use crate::message::{HistoryStore, InMemoryHistoryStore};

    /// Builder for creating AppState with overrides for testing
    pub struct AppStateBuilder {
        config: Config,
        store: Option<Arc<dyn HistoryStore>>,
    }

    impl AppStateBuilder {
        pub fn new() -> Self {
            Self {
                config: Config::default(),
                store: None,
            }
        }

        pub fn with_room_list(mut self, enabled: bool) -> Self {
            self.config.server.room_list = enabled;
            self
        }

        pub fn with_history(mut self, capacity: usize) -> Self {
            self.config.server.history = capacity;
            self
        }

        pub fn with_store(mut self, store: Arc<dyn HistoryStore>) -> Self {
            self.store = Some(store);
            self
        }

        pub fn build(self) -> AppState {
            let store = self
                .store
                .unwrap_or_else(|| Arc::new(InMemoryHistoryStore::new()));
            let service = ClipboardService::with_identifier(&self.config, store, DeviceIdentifier::with_seed(1));
            AppState::new(Arc::new(service), Arc::new(self.config))
        }
    }

    impl Default for AppStateBuilder {
        fn default() -> Self {
            Self::new()
        }
    }

    #[tokio::test]
    async fn test_error_body_is_json() {
        let response = AppError::PayloadTooLarge("too big".to_string()).into_response();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "too big");
    }
}
