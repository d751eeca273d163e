//! Data-source lookup.

use std::collections::HashMap;

use async_trait::async_trait;
use sluice_common::{DataSourceConfig, SourcesConfig};

#[async_trait]
pub trait DataSourceCatalog: Send + Sync {
    async fn get(&self, id: &str) -> Option<DataSourceConfig>;

    /// Every configured id, used for "did you mean" hints.
    async fn ids(&self) -> Vec<String>;
}

/// Catalog over the sources loaded at startup.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    sources: HashMap<String, DataSourceConfig>,
}

impl StaticCatalog {
    pub fn new(config: SourcesConfig) -> Self {
        Self {
            sources: config
                .sources
                .into_iter()
                .map(|s| (s.id.clone(), s))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

#[async_trait]
impl DataSourceCatalog for StaticCatalog {
    async fn get(&self, id: &str) -> Option<DataSourceConfig> {
        self.sources.get(id).cloned()
    }

    async fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sources.keys().cloned().collect();
        ids.sort();
        ids
    }
}
