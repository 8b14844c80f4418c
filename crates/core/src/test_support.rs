//! In-memory collaborators shared by the unit tests.

use crate::error::{GenerationError, RenderError, StoreError};
use crate::models::{Block, Listing, Page, TrackerRecord};
use crate::render::RenderReport;
use crate::traits::{AssetFetcher, BlockSource, DocumentRenderer, RecordStore, Summarizer};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn listing<T>(results: Vec<T>) -> Listing<T> {
    Listing {
        results,
        has_more: false,
        next_cursor: None,
    }
}

#[derive(Default)]
pub struct FakeSource {
    pages: HashMap<String, Page>,
    children: HashMap<String, Vec<Block>>,
    failing: HashSet<String>,
    children_calls: AtomicUsize,
    page_calls: AtomicUsize,
}

impl FakeSource {
    pub fn with_page(mut self, page: Page) -> Self {
        self.pages.insert(page.id.clone(), page);
        self
    }

    pub fn with_children(mut self, parent: &str, blocks: Vec<Block>) -> Self {
        self.children.insert(parent.to_string(), blocks);
        self
    }

    /// Makes child-list reads of `id` fail.
    pub fn with_failing(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }

    pub fn children_calls(&self) -> usize {
        self.children_calls.load(Ordering::SeqCst)
    }

    pub fn page_calls(&self) -> usize {
        self.page_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BlockSource for FakeSource {
    async fn page(&self, page_id: &str) -> Result<Page, StoreError> {
        self.page_calls.fetch_add(1, Ordering::SeqCst);
        self.pages
            .get(page_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                resource: format!("page {page_id}"),
            })
    }

    async fn children(&self, block_id: &str) -> Result<Listing<Block>, StoreError> {
        self.children_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(block_id) {
            return Err(StoreError::NotFound {
                resource: format!("block {block_id}"),
            });
        }
        Ok(listing(self.children.get(block_id).cloned().unwrap_or_default()))
    }
}

pub struct FakeAssets {
    bytes: Option<Vec<u8>>,
}

impl FakeAssets {
    pub fn serving(bytes: Vec<u8>) -> Self {
        Self { bytes: Some(bytes) }
    }

    pub fn failing() -> Self {
        Self { bytes: None }
    }
}

#[async_trait]
impl AssetFetcher for FakeAssets {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StoreError> {
        self.bytes
            .clone()
            .ok_or_else(|| StoreError::Download(format!("{url} unreachable")))
    }
}

#[derive(Default)]
pub struct FakeRecords {
    records: Vec<TrackerRecord>,
    fail_query: bool,
    fail_writes: bool,
    pub url_updates: Mutex<Vec<(String, String, String)>>,
    pub appended: Mutex<Vec<(String, Vec<Value>)>>,
}

impl FakeRecords {
    pub fn new(records: Vec<TrackerRecord>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    pub fn failing_query() -> Self {
        Self {
            fail_query: true,
            ..Self::default()
        }
    }

    pub fn with_failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }
}

#[async_trait]
impl RecordStore for FakeRecords {
    async fn query_database(
        &self,
        database_id: &str,
    ) -> Result<Listing<TrackerRecord>, StoreError> {
        if self.fail_query {
            return Err(StoreError::NotFound {
                resource: format!("database {database_id}"),
            });
        }
        Ok(listing(self.records.clone()))
    }

    async fn update_url_property(
        &self,
        page_id: &str,
        property: &str,
        url: &str,
    ) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::RateLimited);
        }
        self.url_updates
            .lock()
            .map_err(|_| StoreError::RateLimited)?
            .push((page_id.to_string(), property.to_string(), url.to_string()));
        Ok(())
    }

    async fn append_children(&self, block_id: &str, children: Vec<Value>) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::RateLimited);
        }
        self.appended
            .lock()
            .map_err(|_| StoreError::RateLimited)?
            .push((block_id.to_string(), children));
        Ok(())
    }
}

pub struct FakeSummarizer {
    response: Option<String>,
    pub prompts: Mutex<Vec<String>>,
}

impl FakeSummarizer {
    pub fn answering(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            prompts: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Summarizer for FakeSummarizer {
    async fn summarize(&self, prompt: &str) -> Result<String, GenerationError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.response.clone().ok_or(GenerationError::EmptyResponse)
    }
}

/// Writes the Markdown verbatim so tests can inspect what reached the render stage.
#[derive(Default)]
pub struct FakeRenderer {
    fail: bool,
    pub images: Mutex<Vec<PathBuf>>,
}

impl FakeRenderer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }
}

impl DocumentRenderer for FakeRenderer {
    fn render(
        &self,
        markdown: &str,
        _subtitle: &str,
        images: &[PathBuf],
        path: &Path,
    ) -> Result<RenderReport, RenderError> {
        if self.fail {
            return Err(RenderError::EmptyDocument);
        }
        if let Ok(mut seen) = self.images.lock() {
            seen.extend(images.iter().cloned());
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, markdown)?;
        Ok(RenderReport {
            path: path.to_path_buf(),
            pages: 1,
            bytes: markdown.len(),
        })
    }
}

/// Both halves of the workspace behind one value, as the real client provides them.
#[derive(Default)]
pub struct FakeWorkspace {
    pub source: FakeSource,
    pub records: FakeRecords,
}

#[async_trait]
impl BlockSource for FakeWorkspace {
    async fn page(&self, page_id: &str) -> Result<Page, StoreError> {
        self.source.page(page_id).await
    }

    async fn children(&self, block_id: &str) -> Result<Listing<Block>, StoreError> {
        self.source.children(block_id).await
    }
}

#[async_trait]
impl RecordStore for FakeWorkspace {
    async fn query_database(
        &self,
        database_id: &str,
    ) -> Result<Listing<TrackerRecord>, StoreError> {
        self.records.query_database(database_id).await
    }

    async fn update_url_property(
        &self,
        page_id: &str,
        property: &str,
        url: &str,
    ) -> Result<(), StoreError> {
        self.records.update_url_property(page_id, property, url).await
    }

    async fn append_children(&self, block_id: &str, children: Vec<Value>) -> Result<(), StoreError> {
        self.records.append_children(block_id, children).await
    }
}
