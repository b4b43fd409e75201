//! Gateway error types.

use rd_core::ActionError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Request never produced a response.
    #[error("Network error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// First entry of a non-empty GraphQL `errors` array.
    #[error("{message}")]
    Graphql {
        message: String,
        code: Option<String>,
    },

    #[error("Missing field in response: {0}")]
    MissingField(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<GatewayError> for ActionError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::Transport(message) => ActionError::Network(message),
            GatewayError::Http { status: 404, body } => ActionError::NotFound(body),
            err @ GatewayError::Http { .. } => ActionError::Network(err.to_string()),
            GatewayError::Graphql { message, code } => match code.as_deref() {
                Some("NOT_FOUND") => ActionError::NotFound(message),
                Some("BAD_USER_INPUT") | Some("VALIDATION") => ActionError::Validation(message),
                _ => ActionError::Backend(message),
            },
            err @ (GatewayError::MissingField(_) | GatewayError::Json(_)) => {
                ActionError::Backend(err.to_string())
            }
        }
    }
}
