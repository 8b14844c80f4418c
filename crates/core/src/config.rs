use crate::error::ConfigError;
use crate::publish::{SourceHosting, DEFAULT_BRANCH, DEFAULT_LINK_PROPERTY};
use crate::summarize::DEFAULT_GEMINI_MODEL;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_POLLING_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_TARGET_FUNCTIONALITY: &str = "E137";
pub const DEFAULT_TARGET_STATUS: &str = "Regression";

const REQUIRED: [&str; 7] = [
    "NOTION_API_KEY",
    "NOTION_RELEASE_TRACKER_DB_ID",
    "NOTION_DATA_NORMALIZATION_PAGE_ID",
    "NOTION_ONEPAGER_GUIDE_ID",
    "GEMINI_API_KEY",
    "GITHUB_USER",
    "GITHUB_REPO",
];

#[derive(Clone)]
pub struct Config {
    pub notion_api_key: String,
    pub tracker_database_id: String,
    pub publication_page_id: String,
    pub guide_page_id: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub hosting: SourceHosting,
    pub hosted_pdf_path: String,
    pub polling_interval: Duration,
    pub target_functionality: String,
    pub target_status: String,
    pub output_dir: PathBuf,
    pub link_property: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup. Every missing required key is reported
    /// in a single error; blank values count as missing.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let missing = REQUIRED
            .iter()
            .copied()
            .filter(|key| value(*key).is_none())
            .map(|key| key.to_string())
            .collect::<Vec<_>>();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }
        let required = |key: &str| value(key).ok_or_else(|| ConfigError::Missing(vec![key.to_string()]));

        let polling_interval = match value("POLLING_INTERVAL") {
            Some(raw) => raw.parse::<u64>().map_err(|error| ConfigError::Invalid {
                key: "POLLING_INTERVAL".to_string(),
                details: format!("{raw:?}: {error}"),
            })?,
            None => DEFAULT_POLLING_INTERVAL_SECS,
        };

        let target_functionality =
            value("TARGET_FUNCTIONALITY").unwrap_or_else(|| DEFAULT_TARGET_FUNCTIONALITY.to_string());
        let output_dir = PathBuf::from(value("ONEPAGER_OUTPUT_DIR").unwrap_or_else(|| "output".to_string()));
        let hosted_pdf_path = value("GITHUB_PDF_PATH")
            .unwrap_or_else(|| format!("output/{}", pdf_file_name(&target_functionality)));

        let hosting = SourceHosting::new(required("GITHUB_USER")?, required("GITHUB_REPO")?)
            .with_branch(value("GITHUB_BRANCH").unwrap_or_else(|| DEFAULT_BRANCH.to_string()));

        Ok(Self {
            notion_api_key: required("NOTION_API_KEY")?,
            tracker_database_id: required("NOTION_RELEASE_TRACKER_DB_ID")?,
            publication_page_id: required("NOTION_DATA_NORMALIZATION_PAGE_ID")?,
            guide_page_id: required("NOTION_ONEPAGER_GUIDE_ID")?,
            gemini_api_key: required("GEMINI_API_KEY")?,
            gemini_model: value("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            hosting,
            hosted_pdf_path,
            polling_interval: Duration::from_secs(polling_interval),
            target_status: value("TARGET_STATUS").unwrap_or_else(|| DEFAULT_TARGET_STATUS.to_string()),
            target_functionality,
            output_dir,
            link_property: value("ONEPAGER_LINK_PROPERTY")
                .unwrap_or_else(|| DEFAULT_LINK_PROPERTY.to_string()),
        })
    }

    pub fn pdf_file_name(&self) -> String {
        pdf_file_name(&self.target_functionality)
    }

    pub fn dod_path(&self) -> PathBuf {
        self.output_dir.join("dod_content.md")
    }

    pub fn guide_path(&self) -> PathBuf {
        self.output_dir.join("onepager_guide.md")
    }

    pub fn summary_path(&self) -> PathBuf {
        self.output_dir.join("onepager_generado.md")
    }

    pub fn pdf_path(&self) -> PathBuf {
        self.output_dir.join(self.pdf_file_name())
    }

    pub fn image_dir(&self) -> PathBuf {
        self.output_dir.join("images")
    }
}

fn pdf_file_name(functionality: &str) -> String {
    format!("{functionality}_OnePager.pdf")
}
