use crate::error::{GenerationError, RenderError, StoreError};
use crate::models::{Block, Listing, Page, TrackerRecord};
use crate::render::RenderReport;
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};

/// Read side of the workspace-document store.
#[async_trait]
pub trait BlockSource: Send + Sync {
    async fn page(&self, page_id: &str) -> Result<Page, StoreError>;

    /// First page of the children of `block_id`, in store order.
    async fn children(&self, block_id: &str) -> Result<Listing<Block>, StoreError>;
}

/// Tabular side of the same store, plus the write-back calls.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn query_database(&self, database_id: &str)
        -> Result<Listing<TrackerRecord>, StoreError>;

    async fn update_url_property(
        &self,
        page_id: &str,
        property: &str,
        url: &str,
    ) -> Result<(), StoreError>;

    async fn append_children(&self, block_id: &str, children: Vec<Value>) -> Result<(), StoreError>;
}

#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StoreError>;
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, prompt: &str) -> Result<String, GenerationError>;
}

/// Lays the generated Markdown out as a document. `images` are local files placed under the
/// sections that ask for them.
pub trait DocumentRenderer: Send + Sync {
    fn render(
        &self,
        markdown: &str,
        subtitle: &str,
        images: &[PathBuf],
        path: &Path,
    ) -> Result<RenderReport, RenderError>;
}
