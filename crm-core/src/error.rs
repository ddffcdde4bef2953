use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

/// Errors surfaced by the CRM stores, services and handlers.
///
/// Each variant maps onto exactly one HTTP status so callers can tell
/// "bad input" apart from "missing" and "forbidden".
#[derive(Debug, thiserror::Error)]
pub enum CrmError {
    /// Missing or malformed input. The message is shown to the caller.
    #[error("{0}")]
    Validation(String),

    /// The target does not exist, has expired, or is outside the caller's scope.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// No credentials, or credentials that do not verify.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated, but the role is insufficient.
    #[error("{0}")]
    Forbidden(String),

    /// Unique constraint on user input (e.g. an email already registered).
    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type CrmResult<T> = Result<T, CrmError>;

impl CrmError {
    pub fn validation(message: impl Into<String>) -> Self {
        CrmError::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        CrmError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        CrmError::Forbidden(message.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            CrmError::Validation(_) => StatusCode::BAD_REQUEST,
            CrmError::NotFound(_) => StatusCode::NOT_FOUND,
            CrmError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            CrmError::Forbidden(_) => StatusCode::FORBIDDEN,
            CrmError::Conflict(_) => StatusCode::CONFLICT,
            CrmError::Database(_) | CrmError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<validator::ValidationErrors> for CrmError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let reason = errs
                    .iter()
                    .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .unwrap_or_else(|| "is invalid".to_string());
                format!("{} {}", field, reason)
            })
            .collect();
        fields.sort();
        CrmError::Validation(fields.join(", "))
    }
}

impl IntoResponse for CrmError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            CrmError::Database(e) => {
                error!("Database error: {}", e);
                "Something went wrong!".to_string()
            }
            CrmError::Internal(e) => {
                error!("Internal error: {:#}", e);
                "Something went wrong!".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
