pub mod config;
pub mod error;
pub mod export;
pub mod extractor;
pub mod models;
pub mod orchestrator;
pub mod publish;
pub mod render;
pub mod stores;
pub mod summarize;
pub mod tracker;
pub mod traits;

#[cfg(test)]
mod test_support;

pub use config::Config;
pub use error::{ConfigError, ExportError, GenerationError, PipelineError, RenderError, StoreError};
pub use export::{DocumentExporter, ExportReport};
pub use extractor::BlockExtractor;
pub use models::{Block, BlockContent, Listing, Page, PipelineRun, PropertyValue, RichText, TrackerRecord};
pub use orchestrator::{shutdown_channel, MonitorSummary, Pipeline, Shutdown, ShutdownTrigger};
pub use publish::{publication_blocks, Publisher, SourceHosting};
pub use render::{parse_markdown, strip_markdown_fence, PdfRenderer, RenderReport};
pub use stores::{page_id_from_reference, HttpAssetFetcher, NotionClient};
pub use summarize::{build_prompt, missing_sections, GeminiSummarizer};
pub use tracker::{extract_reference_link, extract_status, find_target_record, Detection, StatusPoller};
pub use traits::{AssetFetcher, BlockSource, DocumentRenderer, RecordStore, Summarizer};
