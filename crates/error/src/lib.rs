//! # sluice-error
//!
//! Unified error types for the Sluice query gateway.
//!
//! Every error carries:
//! - A stable numeric code (SLUICE-XXXX) whose range determines its category
//! - A human-readable message
//! - Optional structured context and a hint the client can act on
//!
//! The category drives how the transport layer reports the failure: admission
//! and client errors are 4xx-class, execution and internal errors are 5xx-class.

mod code;
mod context;
mod convert;

pub use code::{ErrorCategory, ErrorCode};
pub use context::{ErrorContext, TierFailure};
pub use convert::find_closest_match;

use serde::{Deserialize, Serialize};
use std::fmt;

/// The unified error type for all Sluice operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SluiceError {
    /// Numeric error code (e.g., "SLUICE-2004")
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,

    /// Structured context for programmatic handling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<ErrorContext>,

    /// Suggestion for self-correction
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// Query ID the error belongs to, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
}

impl SluiceError {
    /// Create a new error with code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            hint: None,
            trace_id: None,
        }
    }

    /// Shorthand for an unexpected internal failure
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }

    /// Add structured context
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Add a hint
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Add trace ID for correlation
    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// True for failures caused by the caller (admission or client errors).
    pub fn is_client_facing(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Admission | ErrorCategory::Client
        )
    }

    /// Serialize to JSON for API responses
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::warn!("Failed to serialize SluiceError: {}", e);
            format!(
                r#"{{"code":"{}","message":"Serialization failed"}}"#,
                self.code
            )
        })
    }
}

impl fmt::Display for SluiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if let Some(hint) = &self.hint {
            write!(f, " (Hint: {})", hint)?;
        }
        Ok(())
    }
}

impl std::error::Error for SluiceError {}

/// Result type alias for Sluice operations
pub type Result<T> = std::result::Result<T, SluiceError>;
