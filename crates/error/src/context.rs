//! # Error Contexts
//!
//! Structured metadata attached to errors so clients can react without parsing messages.

use serde::{Deserialize, Serialize};

use crate::ErrorCode;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ErrorContext {
    /// Context for SLUICE-1001 (CapacityExhausted)
    Capacity { live_queries: usize, capacity: usize },

    /// Context for SLUICE-2004 (DataSourceNotFound)
    DataSourceNotFound {
        data_source_id: String,
        available_sources: Vec<String>,
    },

    /// Context for SLUICE-2005 (SourceQualifierMismatch)
    QualifierMismatch {
        data_source_id: String,
        configured: String,
        found: Vec<String>,
    },

    /// Context for SLUICE-2007 (TokenMismatch)
    TokenMismatch { expected: u64, presented: u64 },

    /// Context for SLUICE-4006 (FallbackExhausted): one message per tier attempted
    Fallback { attempts: Vec<TierFailure> },

    /// Generic key-value context for extensibility
    Generic {
        #[serde(flatten)]
        data: std::collections::HashMap<String, serde_json::Value>,
    },
}

/// Why a single execution tier failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierFailure {
    pub tier: String,
    pub message: String,
    /// Code of the underlying error, when it carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
}

impl TierFailure {
    pub fn new(tier: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tier: tier.into(),
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }
}
