use crate::error::ExportError;
use crate::extractor::BlockExtractor;
use crate::traits::{AssetFetcher, BlockSource};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const DOD_FALLBACK_TITLE: &str = "Definition of Done";
pub const GUIDE_FALLBACK_TITLE: &str = "One Pager Guide";

#[derive(Debug, Clone)]
pub struct ExportReport {
    pub path: PathBuf,
    pub markdown: String,
    pub digest: String,
    pub images: Vec<PathBuf>,
}

/// Exports a whole workspace page as one Markdown document.
///
/// Failures reading the page or its top-level block list are returned to the caller;
/// problems with individual blocks are absorbed by the [`BlockExtractor`].
pub struct DocumentExporter<'a> {
    source: &'a dyn BlockSource,
    extractor: BlockExtractor<'a>,
    fallback_title: String,
}

impl<'a> DocumentExporter<'a> {
    pub fn new(
        source: &'a dyn BlockSource,
        assets: &'a dyn AssetFetcher,
        image_dir: impl Into<PathBuf>,
        fallback_title: impl Into<String>,
    ) -> Self {
        Self {
            source,
            extractor: BlockExtractor::new(source, assets, image_dir),
            fallback_title: fallback_title.into(),
        }
    }

    /// Exporter whose image blocks are described, not downloaded.
    pub fn text_only(source: &'a dyn BlockSource, fallback_title: impl Into<String>) -> Self {
        Self {
            source,
            extractor: BlockExtractor::text_only(source),
            fallback_title: fallback_title.into(),
        }
    }

    pub async fn export(&self, page_id: &str) -> Result<String, ExportError> {
        let page = self.source.page(page_id).await?;
        let title = page.title().unwrap_or_else(|| self.fallback_title.clone());
        info!(page_id, title = %title, "exporting document");

        let mut markdown = format!("# {title}\n\n");

        let listing = self.source.children(page_id).await?;
        if listing.has_more {
            warn!(page_id, "block list has more pages, only the first one is exported");
        }

        let total = listing.results.len();
        info!(page_id, total, "blocks to process");
        for (index, block) in listing.results.iter().enumerate() {
            debug!(position = index + 1, total, kind = block.kind(), "processing block");
            let fragment = self.extractor.extract(block, 0).await;
            markdown.push_str(&fragment);
        }

        Ok(markdown)
    }

    pub async fn export_to_file(&self, page_id: &str, path: &Path) -> Result<ExportReport, ExportError> {
        let markdown = self.export(page_id).await?;
        let images = self.extractor.take_saved_images();
        save_text(path, &markdown).await?;

        let digest = digest_text(&markdown);
        info!(
            path = %path.display(),
            chars = markdown.chars().count(),
            digest = %digest,
            images = images.len(),
            "document exported"
        );

        Ok(ExportReport {
            path: path.to_path_buf(),
            markdown,
            digest,
            images,
        })
    }
}

/// Writes `content` to `path`, replacing any previous file and creating parent directories.
pub async fn save_text(path: &Path, content: &str) -> Result<(), std::io::Error> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, content).await
}

pub fn digest_text(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
