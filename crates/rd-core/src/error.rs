//! Error types surfaced by state containers.

use thiserror::Error;

/// Failure of a container action, tagged by cause.
///
/// `Display` yields only the human-readable message so a view can show it
/// as-is; branch on [`ActionError::kind`] rather than on the text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ActionError {
    /// The gateway could not be reached or answered with a transport failure.
    #[error("{0}")]
    Network(String),

    /// Rejected by a business rule, client-side or by the backend.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    /// Any other backend-reported failure.
    #[error("{0}")]
    Backend(String),

    /// The invoking handle was cancelled before the response landed.
    #[error("Action cancelled")]
    Cancelled,
}

/// Discriminant of [`ActionError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Network,
    Validation,
    NotFound,
    Backend,
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Backend => "backend",
            Self::Cancelled => "cancelled",
        }
    }
}

impl ActionError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network(_) => ErrorKind::Network,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Backend(_) => ErrorKind::Backend,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Only transport failures are worth retrying automatically.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    /// Replace an empty message with `"Failed to <action>"`.
    pub fn or_default_message(self, action: &str) -> Self {
        let fallback = || format!("Failed to {action}");
        match self {
            Self::Network(m) if m.trim().is_empty() => Self::Network(fallback()),
            Self::Validation(m) if m.trim().is_empty() => Self::Validation(fallback()),
            Self::NotFound(m) if m.trim().is_empty() => Self::NotFound(fallback()),
            Self::Backend(m) if m.trim().is_empty() => Self::Backend(fallback()),
            other => other,
        }
    }
}

/// Require a non-blank free-text reason for `action`.
///
/// Rejections and cancellations must carry a reason; it is never defaulted.
pub fn require_reason(reason: Option<&str>, action: &str) -> Result<String, ActionError> {
    match reason.map(str::trim) {
        Some(r) if !r.is_empty() => Ok(r.to_string()),
        _ => Err(ActionError::Validation(format!(
            "A reason is required to {action}"
        ))),
    }
}
