//! In-memory item source.

use async_trait::async_trait;

use super::{ItemSource, SourceKind};
use crate::error::SourceError;
use crate::pipeline::state::RawItem;

/// Serves a fixed list of items. Used for replays and tests.
pub struct StaticSource {
    name: String,
    kind: SourceKind,
    items: Vec<RawItem>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, items: Vec<RawItem>) -> Self {
        Self {
            name: name.into(),
            kind: SourceKind::Feed,
            items,
        }
    }

    pub fn with_kind(mut self, kind: SourceKind) -> Self {
        self.kind = kind;
        self
    }
}

#[async_trait]
impl ItemSource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SourceKind {
        self.kind
    }

    async fn fetch(&self, _query: &str, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        Ok(self.items.iter().take(limit).cloned().collect())
    }
}
