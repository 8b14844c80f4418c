use crate::error::ExportError;
use crate::models::{plain_text, Block, BlockContent, Media};
use crate::traits::{AssetFetcher, BlockSource};
use chrono::Utc;
use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Deepest nesting level whose children are still fetched.
pub const DEFAULT_MAX_DEPTH: usize = 32;

const IMAGE_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "gif", "webp"];

type Fragment<'f> = Pin<Box<dyn Future<Output = String> + Send + 'f>>;

/// Converts workspace blocks into Markdown fragments.
///
/// Extraction never fails: a block that cannot be rendered degrades to a placeholder,
/// a child list that cannot be fetched is treated as empty, and a failed image
/// download is replaced by its caption.
pub struct BlockExtractor<'a> {
    source: &'a dyn BlockSource,
    assets: Option<&'a dyn AssetFetcher>,
    image_dir: PathBuf,
    max_depth: usize,
    saved_images: Mutex<Vec<PathBuf>>,
}

impl<'a> BlockExtractor<'a> {
    pub fn new(
        source: &'a dyn BlockSource,
        assets: &'a dyn AssetFetcher,
        image_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            source,
            assets: Some(assets),
            image_dir: image_dir.into(),
            max_depth: DEFAULT_MAX_DEPTH,
            saved_images: Mutex::new(Vec::new()),
        }
    }

    /// Extractor that never downloads; image blocks become caption placeholders.
    pub fn text_only(source: &'a dyn BlockSource) -> Self {
        Self {
            source,
            assets: None,
            image_dir: PathBuf::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            saved_images: Mutex::new(Vec::new()),
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Paths of the images cached since the last call, in document order.
    pub fn take_saved_images(&self) -> Vec<PathBuf> {
        self.saved_images
            .lock()
            .map(|mut saved| std::mem::take(&mut *saved))
            .unwrap_or_default()
    }

    /// Markdown for `block` and its descendants, indented two spaces per level.
    pub fn extract<'f>(&'f self, block: &'f Block, indent_level: usize) -> Fragment<'f> {
        Box::pin(async move {
            let indent = "  ".repeat(indent_level);
            let mut content = self.own_fragment(block, &indent).await;

            // table rows are the table's children and were consumed above
            let is_table = matches!(block.content, BlockContent::Table { .. });
            if block.has_children && !is_table {
                let children = self.children_fragment(block, indent_level).await;
                content.push_str(&children);
            }

            content
        })
    }

    async fn own_fragment(&self, block: &Block, indent: &str) -> String {
        match &block.content {
            BlockContent::Paragraph(runs) => {
                let text = plain_text(runs);
                if text.is_empty() {
                    String::new()
                } else {
                    format!("{indent}{text}\n\n")
                }
            }
            BlockContent::Heading1(runs) => format!("{indent}# {}\n\n", plain_text(runs)),
            BlockContent::Heading2(runs) => format!("{indent}## {}\n\n", plain_text(runs)),
            BlockContent::Heading3(runs) => format!("{indent}### {}\n\n", plain_text(runs)),
            BlockContent::BulletedListItem(runs) => format!("{indent}- {}\n", plain_text(runs)),
            BlockContent::NumberedListItem(runs) => format!("{indent}1. {}\n", plain_text(runs)),
            BlockContent::Quote(runs) => format!("{indent}> {}\n\n", plain_text(runs)),
            BlockContent::Callout(runs) => format!("{indent}💡 {}\n\n", plain_text(runs)),
            BlockContent::Code {
                rich_text,
                language,
            } => format!("{indent}```{language}\n{}\n```\n\n", plain_text(rich_text)),
            BlockContent::Divider => format!("{indent}---\n\n"),
            BlockContent::Table { .. } => {
                let table = self.table_fragment(block).await;
                format!("{indent}{table}\n\n")
            }
            BlockContent::TableRow { .. } => String::new(),
            BlockContent::Image(media) => self.image_fragment(media, indent).await,
            BlockContent::File(media) => {
                let name = media
                    .name
                    .as_deref()
                    .filter(|name| !name.is_empty())
                    .unwrap_or("archivo");
                format!("{indent}[📎 {name}]({})\n\n", media.url().unwrap_or_default())
            }
            BlockContent::Pdf(media) => {
                format!("{indent}[📄 PDF]({})\n\n", media.url().unwrap_or_default())
            }
            BlockContent::Unsupported { kind } => {
                warn!(block_id = %block.id, kind = %kind, "unsupported block kind");
                format!("{indent}[Error al extraer contenido de tipo {kind}]\n\n")
            }
        }
    }

    async fn children_fragment(&self, block: &Block, indent_level: usize) -> String {
        let child_level = indent_level + 1;
        if child_level > self.max_depth {
            warn!(
                block_id = %block.id,
                depth = child_level,
                "nesting deeper than {} levels, children skipped",
                self.max_depth
            );
            return String::new();
        }

        let listing = match self.source.children(&block.id).await {
            Ok(listing) => listing,
            Err(error) => {
                warn!(block_id = %block.id, kind = block.kind(), %error, "failed to read child blocks");
                return String::new();
            }
        };

        if listing.has_more {
            warn!(block_id = %block.id, "child list has more pages, only the first one is read");
        }

        let mut content = String::new();
        for child in &listing.results {
            let fragment = self.extract(child, child_level).await;
            content.push_str(&fragment);
        }
        content
    }

    async fn table_fragment(&self, block: &Block) -> String {
        match self.source.children(&block.id).await {
            Ok(listing) => {
                debug!(block_id = %block.id, rows = listing.results.len(), "table rows read");
                table_markdown(&listing.results)
            }
            Err(error) => {
                error!(block_id = %block.id, %error, "failed to read table rows");
                "[Error al extraer tabla]".to_string()
            }
        }
    }

    async fn image_fragment(&self, media: &Media, indent: &str) -> String {
        let caption = plain_text(&media.caption);
        let Some(url) = media.url() else {
            return format!("{indent}[Imagen sin URL disponible]\n\n");
        };
        let label = if caption.is_empty() {
            "sin descripción"
        } else {
            caption.as_str()
        };
        let Some(assets) = self.assets else {
            return format!("{indent}[Imagen: {label}]\n\n");
        };

        match self.cache_image(assets, url).await {
            Ok(path) => {
                let fragment = format!("{indent}![{caption}]({})\n\n", path.display());
                if let Ok(mut saved) = self.saved_images.lock() {
                    saved.push(path);
                }
                fragment
            }
            Err(error) => {
                warn!(%error, url, "image download failed");
                format!("{indent}[Imagen: {label}]\n\n")
            }
        }
    }

    async fn cache_image(&self, assets: &dyn AssetFetcher, url: &str) -> Result<PathBuf, ExportError> {
        let bytes = assets.fetch(url).await?;
        tokio::fs::create_dir_all(&self.image_dir).await?;

        let path = self.image_dir.join(image_file_name(url));
        tokio::fs::write(&path, &bytes).await?;
        info!(path = %path.display(), bytes = bytes.len(), "image cached");
        Ok(path)
    }
}

/// Renders table rows as a Markdown table. The first row is always treated as the
/// header, whether or not the source table declares one.
pub fn table_markdown(rows: &[Block]) -> String {
    let mut lines = Vec::new();

    for (row_index, row) in rows.iter().enumerate() {
        let BlockContent::TableRow { cells } = &row.content else {
            continue;
        };

        let row_content = cells.iter().map(|cell| plain_text(cell)).collect::<Vec<_>>();
        lines.push(format!("| {} |", row_content.join(" | ")));

        if row_index == 0 {
            lines.push(format!("| {} |", vec!["---"; row_content.len()].join(" | ")));
        }
    }

    lines.join("\n")
}

/// Extension taken from the last `.` segment of the URL, or `png` when it is not a
/// known image type.
pub fn image_extension(url: &str) -> &str {
    let candidate = url
        .rsplit('.')
        .next()
        .and_then(|segment| segment.split('?').next())
        .unwrap_or_default();

    if IMAGE_EXTENSIONS.contains(&candidate) {
        candidate
    } else {
        "png"
    }
}

fn image_file_name(url: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "dod_image_{}_{}.{}",
        Utc::now().timestamp(),
        &suffix[..8],
        image_extension(url)
    )
}
