use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Domain failures raised synchronously by the settlement workflow.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("initiation code is unknown or already used")]
    InvalidCode,
    #[error("boleto record not found")]
    RecordNotFound,
    #[error("no settlement job for initiation code")]
    JobNotFound,
    #[error("no registered settlement job carries protocol `{0}`")]
    ProtocolNotFound(String),
    #[error("unrecognized confirmation code `{0}`")]
    InvalidConfirmationCode(String),
    #[error("settlement already resolved with confirmation code `{existing}`")]
    ConflictingConfirmation { existing: String },
    #[error("record `{document_id}` cannot be mapped to a registration payload: {reason}")]
    InvalidRecord { document_id: String, reason: String },
    #[error("dispatch queue unavailable")]
    DispatchUnavailable,
    #[error("dispatch queue is full")]
    DispatchSaturated,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("{0}")]
    Message(String),
}

impl From<SettlementError> for AppError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::MissingField(_)
            | SettlementError::InvalidCode
            | SettlementError::InvalidConfirmationCode(_) => AppError::BadRequest(err.to_string()),
            SettlementError::RecordNotFound
            | SettlementError::JobNotFound
            | SettlementError::ProtocolNotFound(_) => AppError::NotFound(err.to_string()),
            SettlementError::ConflictingConfirmation { .. } => AppError::Conflict(err.to_string()),
            SettlementError::InvalidRecord { .. }
            | SettlementError::DispatchUnavailable
            | SettlementError::DispatchSaturated => AppError::Message(err.to_string()),
        }
    }
}

impl AppError {
    /// Logs the failure and returns the status plus the client-facing message.
    pub(crate) fn status_and_message(&self) -> (StatusCode, String) {
        let (status, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message.clone()),
            AppError::NotFound(message) => (StatusCode::NOT_FOUND, message.clone()),
            AppError::Conflict(message) => (StatusCode::CONFLICT, message.clone()),
            AppError::Message(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal server error".to_string(),
            ),
        };
        if status.is_server_error() {
            tracing::error!(error = ?self);
        } else {
            tracing::warn!(error = ?self);
        }
        (status, message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = self.status_and_message();
        (status, Json(json!({ "success": false, "message": message }))).into_response()
    }
}

/// Error rendering for the authority's callback path. The authority expects
/// a `codigo` receipt on every answer, empty when the callback was refused.
#[derive(Debug)]
pub struct CallbackError(pub AppError);

impl From<AppError> for CallbackError {
    fn from(err: AppError) -> Self {
        CallbackError(err)
    }
}

impl IntoResponse for CallbackError {
    fn into_response(self) -> Response {
        let (status, message) = self.0.status_and_message();
        let body = json!({ "success": false, "message": message, "codigo": "" });
        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
