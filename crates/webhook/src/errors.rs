use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Storage(#[from] k_store::StorageError),

    #[error(transparent)]
    Dispatch(#[from] k_kafka::DispatchError),

    #[error(transparent)]
    Configuration(#[from] k_core::ConfigurationError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        tracing::error!(error = %self, "request failed");
        let status = match &self {
            AppError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Dispatch(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
