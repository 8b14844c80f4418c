use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{resource} not found")]
    NotFound { resource: String },

    #[error("rate limited by workspace api")]
    RateLimited,

    #[error("workspace api returned {status}: {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("cannot derive a page id from reference: {0}")]
    InvalidReference(String),

    #[error("asset download failed: {0}")]
    Download(String),
}

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("generation api returned {status}: {details}")]
    Api { status: u16, details: String },

    #[error("generation api returned no text")]
    EmptyResponse,

    #[error("invalid generation endpoint: {0}")]
    Url(#[from] url::ParseError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf encode error: {0}")]
    Pdf(#[from] lopdf::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("nothing to render")]
    EmptyDocument,

    #[error("rendered file not found at {0}")]
    MissingOutput(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variables: {}", .0.join(", "))]
    Missing(Vec<String>),

    #[error("invalid value for {key}: {details}")]
    Invalid { key: String, details: String },
}

/// Failure of one pipeline stage; the variant names the stage that stopped the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("detect: {0}")]
    NotTriggered(String),

    #[error("export: {0}")]
    Export(#[from] ExportError),

    #[error("summarize: guide export failed: {0}")]
    Guide(ExportError),

    #[error("summarize: {0}")]
    Summarize(#[from] GenerationError),

    #[error("render: {0}")]
    Render(#[from] RenderError),

    #[error("publish: {0}")]
    Publish(String),
}

impl PipelineError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::NotTriggered(_) => "detect",
            Self::Export(_) => "export",
            Self::Guide(_) | Self::Summarize(_) => "summarize",
            Self::Render(_) => "render",
            Self::Publish(_) => "publish",
        }
    }
}
