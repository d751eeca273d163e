use serde::{Deserialize, Serialize};
use std::fmt;

/// Numeric error codes following SLUICE-XXXX format.
///
/// ## Code Ranges
/// - **1000-1999**: Admission errors (gateway at capacity)
/// - **2000-2999**: Client errors (bad request, unknown query, stale token)
/// - **3000-3999**: Configuration errors
/// - **4000-4999**: Execution errors (connector, transpiler, delegate engine)
/// - **5000-5999**: Internal/System errors
///
/// Codes are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
#[non_exhaustive]
pub enum ErrorCode {
    // === Admission Errors (1000-1999) ===
    /// SLUICE-1001: Live-query counter is at worker-pool capacity
    CapacityExhausted = 1001,

    // === Client Errors (2000-2999) ===
    /// SLUICE-2001: Malformed request (zero batch size, unknown query type)
    InvalidRequest = 2001,
    /// SLUICE-2002: Statement could not be parsed
    SyntaxError = 2002,
    /// SLUICE-2003: Statement references no table
    NoTableFound = 2003,
    /// SLUICE-2004: Data source id is not configured
    DataSourceNotFound = 2004,
    /// SLUICE-2005: Statement qualifier differs from the data source's catalog
    SourceQualifierMismatch = 2005,
    /// SLUICE-2006: No live query for the presented id and slug
    QueryNotFound = 2006,
    /// SLUICE-2007: Continuation token does not match the live query
    TokenMismatch = 2007,
    /// SLUICE-2008: Query exceeded its maximum run time and was evicted
    QueryExpired = 2008,

    // === Configuration Errors (3000-3999) ===
    /// SLUICE-3001: Configuration failed to load or validate
    InvalidConfig = 3001,

    // === Execution Errors (4000-4999) ===
    /// SLUICE-4001: Connector failed to open or read a result set
    ConnectorFailed = 4001,
    /// SLUICE-4002: No connector registered for the source type
    UnsupportedSourceType = 4002,
    /// SLUICE-4003: Statement could not be translated to the target dialect
    TranspileFailed = 4003,
    /// SLUICE-4004: Delegate engine rejected or failed the statement
    DelegateFailed = 4004,
    /// SLUICE-4005: No delegate engine is configured
    DelegateUnavailable = 4005,
    /// SLUICE-4006: Every execution tier failed
    FallbackExhausted = 4006,

    // === Internal Errors (5000-5999) ===
    /// SLUICE-5001: A task panicked
    InternalPanic = 5001,
    /// SLUICE-5002: Unexpected internal state
    Internal = 5002,
    /// SLUICE-5003: Serialization/deserialization failed
    SerializationFailed = 5003,

    /// SLUICE-9999: Unknown/unclassified error
    Unknown = 9999,
}

impl ErrorCode {
    /// Get the numeric code value
    pub fn as_u16(&self) -> u16 {
        *self as u16
    }

    /// Get the formatted code string (e.g., "SLUICE-2007")
    pub fn as_str(&self) -> String {
        format!("SLUICE-{:04}", self.as_u16())
    }

    /// Get the error category
    pub fn category(&self) -> ErrorCategory {
        match self.as_u16() {
            1000..=1999 => ErrorCategory::Admission,
            2000..=2999 => ErrorCategory::Client,
            3000..=3999 => ErrorCategory::Config,
            4000..=4999 => ErrorCategory::Execution,
            _ => ErrorCategory::Internal,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> String {
        code.as_str()
    }
}

impl TryFrom<String> for ErrorCode {
    type Error = String;

    fn try_from(s: String) -> std::result::Result<Self, Self::Error> {
        let num: u16 = s
            .strip_prefix("SLUICE-")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| "Invalid format".to_string())?;
        Self::try_from(num).map_err(|_| "Unknown code".to_string())
    }
}

impl TryFrom<u16> for ErrorCode {
    type Error = String;

    fn try_from(n: u16) -> std::result::Result<Self, Self::Error> {
        match n {
            1001 => Ok(Self::CapacityExhausted),
            2001 => Ok(Self::InvalidRequest),
            2002 => Ok(Self::SyntaxError),
            2003 => Ok(Self::NoTableFound),
            2004 => Ok(Self::DataSourceNotFound),
            2005 => Ok(Self::SourceQualifierMismatch),
            2006 => Ok(Self::QueryNotFound),
            2007 => Ok(Self::TokenMismatch),
            2008 => Ok(Self::QueryExpired),
            3001 => Ok(Self::InvalidConfig),
            4001 => Ok(Self::ConnectorFailed),
            4002 => Ok(Self::UnsupportedSourceType),
            4003 => Ok(Self::TranspileFailed),
            4004 => Ok(Self::DelegateFailed),
            4005 => Ok(Self::DelegateUnavailable),
            4006 => Ok(Self::FallbackExhausted),
            5001 => Ok(Self::InternalPanic),
            5002 => Ok(Self::Internal),
            5003 => Ok(Self::SerializationFailed),
            9999 => Ok(Self::Unknown),
            _ => Err(format!("Unknown error code: {}", n)),
        }
    }
}

/// High-level error category, used for transport status mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorCategory {
    Admission,
    Client,
    Config,
    Execution,
    Internal,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Admission => "admission",
            ErrorCategory::Client => "client",
            ErrorCategory::Config => "config",
            ErrorCategory::Execution => "execution",
            ErrorCategory::Internal => "internal",
        }
    }
}
