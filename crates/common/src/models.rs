use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use validator::Validate;

// Custom Serde logic for SecretString
fn serialize_secret<S>(secret: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match secret {
        Some(_) => serializer.serialize_str("[REDACTED]"),
        None => serializer.serialize_none(),
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Option<SecretString>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s: Option<String> = Option::deserialize(deserializer)?;
    Ok(s.map(SecretString::from))
}

fn default_batch_size() -> usize {
    crate::config::DEFAULT_BATCH_SIZE
}

/// One result row; values are positional and match the page's `columns`.
pub type Row = Vec<serde_json::Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// How results are handed back: one capped page (`Sync`) or paged with a
/// response timeout (`Stream`). Encoded on the wire as 1 and 2.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QueryType {
    Sync = 1,
    Stream = 2,
}

impl TryFrom<u8> for QueryType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(QueryType::Sync),
            2 => Ok(QueryType::Stream),
            other => Err(format!("unknown query type {} (expected 1 or 2)", other)),
        }
    }
}

impl From<QueryType> for u8 {
    fn from(value: QueryType) -> u8 {
        value as u8
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryType::Sync => write!(f, "sync"),
            QueryType::Stream => write!(f, "stream"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub sql: String,
    #[serde(rename = "type")]
    pub query_type: QueryType,
    pub data_source_id: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Response timeout in seconds for streaming queries; 0 waits without a limit.
    #[serde(default)]
    pub timeout: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryResponse {
    pub columns: Vec<Column>,
    pub entries: Vec<Row>,
    pub total_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_uri: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SourcesConfig {
    #[serde(default)]
    pub sources: Vec<DataSourceConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone, Validate)]
pub struct DataSourceConfig {
    #[validate(length(min = 1))]
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(rename = "type")]
    #[validate(length(min = 1))]
    pub source_type: String, // e.g., sqlite, postgres

    /// Source-qualifier statements use to address this source (`<catalog>.<table>`).
    #[validate(length(min = 1))]
    pub catalog: String,

    /// Native SQL dialect; defaults to the source type.
    #[serde(default)]
    pub dialect: Option<String>,

    pub url: String,
    pub username: Option<String>,

    /// Stored credential, possibly encrypted.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_secret",
        deserialize_with = "deserialize_secret"
    )]
    pub password: Option<SecretString>,

    #[serde(default)]
    pub options: serde_json::Value,
}

impl DataSourceConfig {
    /// The dialect statements must be written in to run natively on this source.
    pub fn native_dialect(&self) -> &str {
        self.dialect.as_deref().unwrap_or(&self.source_type)
    }
}
