use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,
}

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            plain_text: text.into(),
        }
    }
}

/// Concatenates the runs in order, with no separator.
pub fn plain_text(runs: &[RichText]) -> String {
    runs.iter().map(|run| run.plain_text.as_str()).collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    External { url: String },
    Hosted { url: String, expiry_time: Option<String> },
}

impl FileSource {
    pub fn url(&self) -> &str {
        match self {
            Self::External { url } | Self::Hosted { url, .. } => url,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Media {
    pub source: Option<FileSource>,
    pub caption: Vec<RichText>,
    pub name: Option<String>,
}

impl Media {
    pub fn external(url: impl Into<String>) -> Self {
        Self {
            source: Some(FileSource::External { url: url.into() }),
            ..Self::default()
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = vec![RichText::plain(caption)];
        self
    }

    /// Resolved URL, `None` when absent or empty.
    pub fn url(&self) -> Option<&str> {
        self.source
            .as_ref()
            .map(FileSource::url)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockContent {
    Paragraph(Vec<RichText>),
    Heading1(Vec<RichText>),
    Heading2(Vec<RichText>),
    Heading3(Vec<RichText>),
    BulletedListItem(Vec<RichText>),
    NumberedListItem(Vec<RichText>),
    Quote(Vec<RichText>),
    Callout(Vec<RichText>),
    Code {
        rich_text: Vec<RichText>,
        language: String,
    },
    Divider,
    Table {
        table_width: usize,
        has_column_header: bool,
    },
    TableRow {
        cells: Vec<Vec<RichText>>,
    },
    Image(Media),
    File(Media),
    Pdf(Media),
    Unsupported {
        kind: String,
    },
}

impl BlockContent {
    pub fn kind(&self) -> &str {
        match self {
            Self::Paragraph(_) => "paragraph",
            Self::Heading1(_) => "heading_1",
            Self::Heading2(_) => "heading_2",
            Self::Heading3(_) => "heading_3",
            Self::BulletedListItem(_) => "bulleted_list_item",
            Self::NumberedListItem(_) => "numbered_list_item",
            Self::Quote(_) => "quote",
            Self::Callout(_) => "callout",
            Self::Code { .. } => "code",
            Self::Divider => "divider",
            Self::Table { .. } => "table",
            Self::TableRow { .. } => "table_row",
            Self::Image(_) => "image",
            Self::File(_) => "file",
            Self::Pdf(_) => "pdf",
            Self::Unsupported { kind } => kind,
        }
    }

    /// Decodes the kind-specific payload. Unknown kinds map to `Unsupported`;
    /// a known kind with an undecodable payload is an error for the caller to degrade.
    fn decode(kind: &str, payload: Value) -> Result<Self, serde_json::Error> {
        let content = match kind {
            "paragraph" => Self::Paragraph(text_payload(payload)?),
            "heading_1" => Self::Heading1(text_payload(payload)?),
            "heading_2" => Self::Heading2(text_payload(payload)?),
            "heading_3" => Self::Heading3(text_payload(payload)?),
            "bulleted_list_item" => Self::BulletedListItem(text_payload(payload)?),
            "numbered_list_item" => Self::NumberedListItem(text_payload(payload)?),
            "quote" => Self::Quote(text_payload(payload)?),
            "callout" => Self::Callout(text_payload(payload)?),
            "code" => {
                let code: CodePayload = serde_json::from_value(payload)?;
                Self::Code {
                    rich_text: code.rich_text,
                    language: code.language,
                }
            }
            "divider" => Self::Divider,
            "table" => {
                let table: TablePayload = serde_json::from_value(payload)?;
                Self::Table {
                    table_width: table.table_width,
                    has_column_header: table.has_column_header,
                }
            }
            "table_row" => {
                let row: TableRowPayload = serde_json::from_value(payload)?;
                Self::TableRow { cells: row.cells }
            }
            "image" => Self::Image(serde_json::from_value::<MediaPayload>(payload)?.into()),
            "file" => Self::File(serde_json::from_value::<MediaPayload>(payload)?.into()),
            "pdf" => Self::Pdf(serde_json::from_value::<MediaPayload>(payload)?.into()),
            other => Self::Unsupported {
                kind: other.to_string(),
            },
        };
        Ok(content)
    }
}

#[derive(Deserialize)]
struct TextPayload {
    #[serde(default)]
    rich_text: Vec<RichText>,
}

fn text_payload(payload: Value) -> Result<Vec<RichText>, serde_json::Error> {
    serde_json::from_value::<TextPayload>(payload).map(|text| text.rich_text)
}

#[derive(Deserialize)]
struct CodePayload {
    #[serde(default)]
    rich_text: Vec<RichText>,
    #[serde(default)]
    language: String,
}

#[derive(Deserialize)]
struct TablePayload {
    #[serde(default)]
    table_width: usize,
    #[serde(default)]
    has_column_header: bool,
}

#[derive(Deserialize)]
struct TableRowPayload {
    #[serde(default)]
    cells: Vec<Vec<RichText>>,
}

#[derive(Deserialize)]
struct HostedUrl {
    #[serde(default)]
    url: String,
    #[serde(default)]
    expiry_time: Option<String>,
}

#[derive(Deserialize)]
struct MediaPayload {
    #[serde(rename = "type", default)]
    source_type: Option<String>,
    external: Option<HostedUrl>,
    file: Option<HostedUrl>,
    #[serde(default)]
    caption: Vec<RichText>,
    name: Option<String>,
}

impl From<MediaPayload> for Media {
    fn from(payload: MediaPayload) -> Self {
        let source = match payload.source_type.as_deref() {
            Some("external") => payload
                .external
                .map(|hosted| FileSource::External { url: hosted.url }),
            Some("file") => payload.file.map(|hosted| FileSource::Hosted {
                url: hosted.url,
                expiry_time: hosted.expiry_time,
            }),
            _ => None,
        };

        Self {
            source,
            caption: payload.caption,
            name: payload.name,
        }
    }
}

/// One node of a workspace document. Children are not embedded; they are fetched by id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawBlock")]
pub struct Block {
    pub id: String,
    pub has_children: bool,
    pub content: BlockContent,
}

impl Block {
    pub fn new(id: impl Into<String>, content: BlockContent) -> Self {
        Self {
            id: id.into(),
            has_children: false,
            content,
        }
    }

    pub fn with_children(mut self) -> Self {
        self.has_children = true;
        self
    }

    pub fn kind(&self) -> &str {
        self.content.kind()
    }
}

#[derive(Deserialize)]
struct RawBlock {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    has_children: bool,
    #[serde(flatten)]
    payloads: Map<String, Value>,
}

impl From<RawBlock> for Block {
    fn from(mut raw: RawBlock) -> Self {
        let payload = raw.payloads.remove(&raw.kind).unwrap_or(Value::Null);
        let content = BlockContent::decode(&raw.kind, payload).unwrap_or(BlockContent::Unsupported {
            kind: raw.kind.clone(),
        });

        Self {
            id: raw.id,
            has_children: raw.has_children,
            content,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Title(Vec<RichText>),
    Status(Option<String>),
    Select(Option<String>),
    RichText(Vec<RichText>),
    Url(Option<String>),
    Other(String),
}

impl PropertyValue {
    fn from_value(value: &Value) -> Self {
        let kind = value
            .pointer("/type")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let runs = |key: &str| -> Vec<RichText> {
            value
                .get(key)
                .cloned()
                .and_then(|runs| serde_json::from_value(runs).ok())
                .unwrap_or_default()
        };
        let option_name = |key: &str| -> Option<String> {
            value
                .pointer(&format!("/{key}/name"))
                .and_then(Value::as_str)
                .map(str::to_string)
        };

        match kind {
            "title" => Self::Title(runs("title")),
            "status" => Self::Status(option_name("status")),
            "select" => Self::Select(option_name("select")),
            "rich_text" => Self::RichText(runs("rich_text")),
            "url" => Self::Url(value.get("url").and_then(Value::as_str).map(str::to_string)),
            other => Self::Other(other.to_string()),
        }
    }
}

/// A workspace page with its typed properties, in ascending property-name order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawPage")]
pub struct Page {
    pub id: String,
    pub url: Option<String>,
    pub properties: Vec<(String, PropertyValue)>,
}

/// A row of the release tracker database. Rows are pages.
pub type TrackerRecord = Page;

impl Page {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: None,
            properties: Vec::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.push((name.into(), value));
        self
    }

    /// Text of the first non-empty title property.
    pub fn title(&self) -> Option<String> {
        self.properties.iter().find_map(|(_, value)| match value {
            PropertyValue::Title(runs) if !runs.is_empty() => Some(plain_text(runs)),
            _ => None,
        })
    }
}

#[derive(Deserialize)]
struct RawPage {
    #[serde(default)]
    id: String,
    url: Option<String>,
    #[serde(default)]
    properties: Map<String, Value>,
}

impl From<RawPage> for Page {
    fn from(raw: RawPage) -> Self {
        let mut properties = raw
            .properties
            .iter()
            .map(|(name, value)| (name.clone(), PropertyValue::from_value(value)))
            .collect::<Vec<_>>();
        properties.sort_by(|left, right| left.0.cmp(&right.0));

        Self {
            id: raw.id,
            url: raw.url,
            properties,
        }
    }
}

/// One page of a paginated list response.
#[derive(Debug, Clone, Deserialize)]
pub struct Listing<T> {
    #[serde(default = "Vec::new")]
    pub results: Vec<T>,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

/// State threaded through one pipeline run, one field per stage.
#[derive(Debug, Clone, Default)]
pub struct PipelineRun {
    pub record: Option<TrackerRecord>,
    pub reference_link: Option<String>,
    pub dod_markdown: Option<String>,
    pub summary_markdown: Option<String>,
    pub pdf_path: Option<PathBuf>,
    pub pdf_url: Option<String>,
}
