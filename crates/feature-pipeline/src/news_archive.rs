//! File-backed news collaborator over a scraped-news JSON dump.
//!
//! The dump is either an array of articles or an object whose values are
//! arrays of articles (one per source). Articles need a `title`; the body is
//! read from `summary` or `description`.

use analysis_core::{NewsItem, NewsProvider, SignalError};
use async_trait::async_trait;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct NewsArchive {
    items: Vec<NewsItem>,
}

impl NewsArchive {
    pub fn from_items(items: Vec<NewsItem>) -> Self {
        Self { items }
    }

    pub fn load(path: &Path) -> Result<Self, SignalError> {
        let raw = std::fs::read_to_string(path).map_err(|e| SignalError::persistence(path, e))?;
        let value: serde_json::Value =
            serde_json::from_str(&raw).map_err(|e| SignalError::persistence(path, e))?;

        let items = Self::collect_items(value);
        tracing::info!("Loaded {} archived news items from {}", items.len(), path.display());
        Ok(Self { items })
    }

    fn collect_items(value: serde_json::Value) -> Vec<NewsItem> {
        let groups: Vec<serde_json::Value> = match value {
            serde_json::Value::Array(items) => items,
            serde_json::Value::Object(map) => map
                .into_iter()
                .filter_map(|(_, v)| match v {
                    serde_json::Value::Array(items) => Some(items),
                    _ => None,
                })
                .flatten()
                .collect(),
            _ => Vec::new(),
        };

        groups
            .into_iter()
            .filter_map(|v| serde_json::from_value::<NewsItem>(v).ok())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl NewsProvider for NewsArchive {
    async fn search(&self, query: &str) -> Result<Vec<NewsItem>, SignalError> {
        if query.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self
            .items
            .iter()
            .filter(|item| item.title.contains(query))
            .cloned()
            .collect())
    }
}
