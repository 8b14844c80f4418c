use crate::traits::RecordStore;
use serde_json::{json, Value};
use tracing::{error, info};

pub const RAW_CONTENT_HOST: &str = "https://raw.githubusercontent.com";
pub const DEFAULT_BRANCH: &str = "main";
pub const DEFAULT_LINK_PROPERTY: &str = "📄 One Pager Link";

/// Repository coordinates under which the rendered PDF is served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHosting {
    pub user: String,
    pub repo: String,
    pub branch: String,
    pub host: String,
}

impl SourceHosting {
    pub fn new(user: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            repo: repo.into(),
            branch: DEFAULT_BRANCH.to_string(),
            host: RAW_CONTENT_HOST.to_string(),
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Raw-content URL of `path`. The file is assumed to be committed already; nothing checks it.
    pub fn raw_file_url(&self, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.host.trim_end_matches('/'),
            self.user,
            self.repo,
            self.branch,
            path.trim_start_matches('/')
        )
    }
}

fn text_run(content: &str) -> Value {
    json!({"type": "text", "text": {"content": content}})
}

/// Blocks appended to the publication page: a heading, a short note and the PDF itself.
pub fn publication_blocks(pdf_url: &str, pdf_name: &str) -> Vec<Value> {
    vec![
        json!({
            "object": "block",
            "type": "heading_2",
            "heading_2": {"rich_text": [text_run("📄 One Pager Generado")]}
        }),
        json!({
            "object": "block",
            "type": "paragraph",
            "paragraph": {
                "rich_text": [text_run("One Pager educativo generado automaticamente con Gemini API:")]
            }
        }),
        json!({
            "object": "block",
            "type": "file",
            "file": {
                "type": "external",
                "external": {"url": pdf_url},
                "caption": [text_run(pdf_name)]
            }
        }),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOutcome {
    pub record_updated: bool,
    pub page_updated: bool,
}

impl PublishOutcome {
    pub fn is_complete(&self) -> bool {
        self.record_updated && self.page_updated
    }
}

/// Writes the public link back to the workspace. Both writes are always attempted.
pub struct Publisher<'a> {
    store: &'a dyn RecordStore,
    link_property: String,
}

impl<'a> Publisher<'a> {
    pub fn new(store: &'a dyn RecordStore, link_property: impl Into<String>) -> Self {
        Self {
            store,
            link_property: link_property.into(),
        }
    }

    pub async fn publish(
        &self,
        record_id: &str,
        page_id: &str,
        pdf_url: &str,
        pdf_name: &str,
    ) -> PublishOutcome {
        let record_updated = match self
            .store
            .update_url_property(record_id, &self.link_property, pdf_url)
            .await
        {
            Ok(()) => {
                info!(record_id, property = %self.link_property, "tracker record updated");
                true
            }
            Err(err) => {
                error!(record_id, error = %err, "tracker record update failed");
                false
            }
        };

        let page_updated = match self
            .store
            .append_children(page_id, publication_blocks(pdf_url, pdf_name))
            .await
        {
            Ok(()) => {
                info!(page_id, "publication blocks appended");
                true
            }
            Err(err) => {
                error!(page_id, error = %err, "appending publication blocks failed");
                false
            }
        };

        PublishOutcome {
            record_updated,
            page_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::FakeRecords;

    #[test]
    fn raw_url_joins_coordinates() {
        let hosting = SourceHosting::new("acme", "onepagers").with_branch("release");

        assert_eq!(
            hosting.raw_file_url("output/E137_OnePager.pdf"),
            "https://raw.githubusercontent.com/acme/onepagers/release/output/E137_OnePager.pdf"
        );
        assert_eq!(
            hosting.with_host("http://localhost:9000/").raw_file_url("/a.pdf"),
            "http://localhost:9000/acme/onepagers/release/a.pdf"
        );
    }

    #[test]
    fn publication_blocks_reference_the_pdf() {
        let blocks = publication_blocks("https://cdn/x.pdf", "E137_OnePager.pdf");

        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["type"], "heading_2");
        assert_eq!(
            blocks[0]["heading_2"]["rich_text"][0]["text"]["content"],
            "📄 One Pager Generado"
        );
        assert_eq!(blocks[2]["file"]["external"]["url"], "https://cdn/x.pdf");
        assert_eq!(blocks[2]["file"]["caption"][0]["text"]["content"], "E137_OnePager.pdf");
    }

    #[tokio::test]
    async fn publish_performs_both_writes() {
        let store = FakeRecords::default();
        let publisher = Publisher::new(&store, DEFAULT_LINK_PROPERTY);

        let outcome = publisher
            .publish("rec", "page", "https://cdn/x.pdf", "x.pdf")
            .await;

        assert!(outcome.is_complete());
        let updates = store.url_updates.lock().map(|u| u.clone()).unwrap_or_default();
        assert_eq!(
            updates,
            vec![(
                "rec".to_string(),
                DEFAULT_LINK_PROPERTY.to_string(),
                "https://cdn/x.pdf".to_string()
            )]
        );
        let appended = store.appended.lock().map(|a| a.len()).unwrap_or_default();
        assert_eq!(appended, 1);
    }

    #[tokio::test]
    async fn failed_writes_are_reported_not_raised() {
        let store = FakeRecords::default().with_failing_writes();
        let publisher = Publisher::new(&store, DEFAULT_LINK_PROPERTY);

        let outcome = publisher
            .publish("rec", "page", "https://cdn/x.pdf", "x.pdf")
            .await;

        assert_eq!(
            outcome,
            PublishOutcome {
                record_updated: false,
                page_updated: false
            }
        );
        assert!(!outcome.is_complete());
    }
}
