//! Continuation URIs: `{public_url}/v1/query/{query_id}/{slug}/{token}`.

use std::fmt;

use sluice_error::{ErrorCode, Result, SluiceError};

/// Path prefix under which continuation requests are served.
pub const QUERY_PATH: &str = "/v1/query";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContinuationUri {
    pub query_id: String,
    pub slug: String,
    pub token: u64,
}

impl ContinuationUri {
    pub fn new(query_id: impl Into<String>, slug: impl Into<String>, token: u64) -> Self {
        Self {
            query_id: query_id.into(),
            slug: slug.into(),
            token,
        }
    }

    /// Path relative to the server root.
    pub fn path(&self) -> String {
        format!("{}/{}/{}/{}", QUERY_PATH, self.query_id, self.slug, self.token)
    }

    pub fn to_uri(&self, public_url: &str) -> String {
        format!("{}{}", public_url.trim_end_matches('/'), self.path())
    }

    /// Parses a full continuation URI or a bare path.
    pub fn parse(uri: &str) -> Result<Self> {
        let invalid = || {
            SluiceError::new(
                ErrorCode::InvalidRequest,
                format!("Not a continuation URI: {}", uri),
            )
        };

        let start = uri.find(QUERY_PATH).ok_or_else(invalid)?;
        let rest = uri[start + QUERY_PATH.len()..]
            .split(['?', '#'])
            .next()
            .unwrap_or_default();

        let parts: Vec<&str> = rest.trim_matches('/').split('/').collect();
        match parts.as_slice() {
            [query_id, slug, token] if !query_id.is_empty() && !slug.is_empty() => {
                let token = token.parse().map_err(|_| invalid())?;
                Ok(Self::new(*query_id, *slug, token))
            }
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for ContinuationUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}
