//! Failure values surfaced to the host UI. Nothing here is thrown; the session
//! hands these out as ordinary results and events.

use shared::error::{ApiException, ErrorCode};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Auth,
    Transport,
    Validation,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorContext {
    FetchPage,
    BulkAction,
}

impl ErrorContext {
    fn label(self) -> &'static str {
        match self {
            Self::FetchPage => "loading the list failed",
            Self::BulkAction => "bulk action failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}: {message}", .context.label())]
pub struct SessionError {
    category: ErrorCategory,
    context: ErrorContext,
    message: String,
}

impl SessionError {
    pub fn from_message(context: ErrorContext, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_ascii_lowercase();
        let category = if lower.contains("http 401")
            || lower.contains("http 403")
            || lower.contains("unauthorized")
            || lower.contains("forbidden")
            || lower.contains("session expired")
        {
            ErrorCategory::Auth
        } else if lower.contains("timeout")
            || lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("network")
            || lower.contains("unavailable")
            || lower.contains("dns")
        {
            ErrorCategory::Transport
        } else if lower.contains("invalid")
            || lower.contains("validation")
            || lower.contains("missing")
            || lower.contains("http 422")
        {
            ErrorCategory::Validation
        } else {
            ErrorCategory::Unknown
        };

        Self {
            category,
            context,
            message,
        }
    }

    /// Classifies a collaborator failure, preferring a structured backend
    /// error code when the chain carries one.
    pub fn from_anyhow(context: ErrorContext, err: &anyhow::Error) -> Self {
        let message = format!("{err:#}");
        let Some(api) = err.downcast_ref::<ApiException>() else {
            return Self::from_message(context, message);
        };

        let category = match api.code {
            ErrorCode::Unauthorized | ErrorCode::Forbidden => ErrorCategory::Auth,
            ErrorCode::Validation | ErrorCode::Conflict | ErrorCode::NotFound => {
                ErrorCategory::Validation
            }
            ErrorCode::RateLimited => ErrorCategory::Transport,
            ErrorCode::Internal => ErrorCategory::Unknown,
        };
        Self {
            category,
            context,
            message,
        }
    }

    pub fn requires_reauth(&self) -> bool {
        self.category == ErrorCategory::Auth
    }

    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    pub fn context(&self) -> ErrorContext {
        self.context
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}
