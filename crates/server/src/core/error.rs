use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum Error {
    // Auth Errors
    #[error("auth token wrong format")]
    AuthFailTokenWrongFormat,
    #[error("invalid or expired token: {0}")]
    AuthFailInvalidToken(String),
    #[error("auth context missing")]
    AuthFailCtxNotInRequestExt,
    #[error("user not found")]
    UserNotFound,

    // Model Errors
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Domain validation failure, shown to the user as-is.
    #[error("{0}")]
    App(String),

    #[error("could not validate webhook payload: {0}")]
    WebhookInvalid(String),

    // Generic
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn app(msg: impl Into<String>) -> Self {
        Error::App(msg.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::AuthFailTokenWrongFormat
            | Error::AuthFailInvalidToken(_)
            | Error::AuthFailCtxNotInRequestExt => StatusCode::UNAUTHORIZED,
            Error::UserNotFound | Error::NotFound { .. } => StatusCode::NOT_FOUND,
            Error::App(_) | Error::WebhookInvalid(_) => StatusCode::BAD_REQUEST,
            Error::Database(_) | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let error_message = match &self {
            Error::AuthFailTokenWrongFormat
            | Error::AuthFailInvalidToken(_)
            | Error::AuthFailCtxNotInRequestExt => "Unauthorized".to_string(),
            Error::UserNotFound => "User not found".to_string(),
            Error::NotFound { entity, .. } => format!("{} not found", entity),
            Error::App(msg) => msg.clone(),
            Error::WebhookInvalid(_) => "Could not validate Clerk payload".to_string(),
            Error::Database(e) => {
                error!("[Error] Database failure: {}", e);
                "Internal server error".to_string()
            }
            Error::Internal(msg) => {
                error!("[Error] Internal failure: {}", msg);
                "Internal server error".to_string()
            }
        };

        let body = Json(json!({
            "error": {
                "message": error_message
            }
        }));

        (status, body).into_response()
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Internal(err.to_string())
    }
}
