use crate::error::StoreError;
use crate::models::{plain_text, PropertyValue, TrackerRecord};
use crate::traits::RecordStore;
use tracing::{info, warn};

/// Resolves a property by name when the exact column name is not known.
///
/// Predicates are tried in order: an exact (case-insensitive) name first, then any name
/// containing every token. Two properties accepted by the same predicate are ordered by
/// name, so the outcome never depends on the order the store returned them in.
#[derive(Debug, Clone)]
pub struct FieldMatcher {
    exact: String,
    tokens: Vec<String>,
}

impl FieldMatcher {
    pub fn new(exact: &str, tokens: &[&str]) -> Self {
        Self {
            exact: exact.to_lowercase(),
            tokens: tokens.iter().map(|token| token.to_lowercase()).collect(),
        }
    }

    pub fn deployment_status() -> Self {
        Self::new("deployment status", &["deployment", "status"])
    }

    pub fn link_definition() -> Self {
        Self::new("link definition", &["link", "definition"])
    }

    fn rank(&self, name: &str) -> Option<u8> {
        let lowered = name.to_lowercase();
        if lowered.trim() == self.exact {
            Some(0)
        } else if self.tokens.iter().all(|token| lowered.contains(token.as_str())) {
            Some(1)
        } else {
            None
        }
    }

    pub fn candidates<'r>(&self, record: &'r TrackerRecord) -> Vec<&'r (String, PropertyValue)> {
        let mut matches = record
            .properties
            .iter()
            .filter_map(|entry| self.rank(&entry.0).map(|rank| (rank, entry)))
            .collect::<Vec<_>>();
        matches.sort_by(|left, right| left.0.cmp(&right.0).then_with(|| left.1 .0.cmp(&right.1 .0)));
        matches.into_iter().map(|(_, entry)| entry).collect()
    }
}

/// First record whose title contains `needle`, in store order.
pub fn find_target_record<'r>(records: &'r [TrackerRecord], needle: &str) -> Option<&'r TrackerRecord> {
    records
        .iter()
        .find(|record| record.title().is_some_and(|title| title.contains(needle)))
}

pub fn extract_status(record: &TrackerRecord) -> Option<String> {
    for (name, value) in FieldMatcher::deployment_status().candidates(record) {
        let status = match value {
            PropertyValue::Status(Some(status)) | PropertyValue::Select(Some(status)) => {
                Some(status.clone())
            }
            PropertyValue::RichText(runs) => Some(plain_text(runs)).filter(|text| !text.is_empty()),
            _ => None,
        };

        if let Some(status) = status {
            info!(record_id = %record.id, field = %name, status = %status, "deployment status resolved");
            return Some(status);
        }
    }

    warn!(record_id = %record.id, "no deployment status property found");
    None
}

/// The reference link lives in a url-typed property; the first such candidate decides,
/// and an empty value counts as absent.
pub fn extract_reference_link(record: &TrackerRecord) -> Option<String> {
    for (name, value) in FieldMatcher::link_definition().candidates(record) {
        let PropertyValue::Url(url) = value else {
            continue;
        };

        return match url.as_deref().filter(|url| !url.is_empty()) {
            Some(url) => {
                info!(record_id = %record.id, field = %name, url, "reference link resolved");
                Some(url.to_string())
            }
            None => {
                warn!(record_id = %record.id, field = %name, "reference link is empty");
                None
            }
        };
    }

    warn!(record_id = %record.id, "no reference link property found");
    None
}

#[derive(Debug, Clone)]
pub struct Detection {
    pub record: TrackerRecord,
    pub status: Option<String>,
}

impl Detection {
    /// Exact, case-sensitive comparison.
    pub fn reached(&self, target_status: &str) -> bool {
        self.status.as_deref() == Some(target_status)
    }
}

pub struct StatusPoller<'a> {
    store: &'a dyn RecordStore,
    database_id: String,
    target_name: String,
}

impl<'a> StatusPoller<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        database_id: impl Into<String>,
        target_name: impl Into<String>,
    ) -> Self {
        Self {
            store,
            database_id: database_id.into(),
            target_name: target_name.into(),
        }
    }

    pub async fn find_record(&self) -> Result<Option<TrackerRecord>, StoreError> {
        info!(database_id = %self.database_id, "querying release tracker");
        let listing = self.store.query_database(&self.database_id).await?;
        if listing.has_more {
            warn!(database_id = %self.database_id, "tracker has more rows than one page, only the first page is scanned");
        }
        info!(records = listing.results.len(), "tracker records read");

        let found = find_target_record(&listing.results, &self.target_name).cloned();
        match &found {
            Some(record) => info!(record_id = %record.id, title = ?record.title(), "target record found"),
            None => warn!(target = %self.target_name, "target record not found"),
        }
        Ok(found)
    }

    pub async fn poll(&self) -> Result<Option<Detection>, StoreError> {
        let Some(record) = self.find_record().await? else {
            return Ok(None);
        };
        let status = extract_status(&record);
        Ok(Some(Detection { record, status }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Page, RichText};
    use crate::test_support::FakeRecords;

    fn record(id: &str, title: &str) -> TrackerRecord {
        Page::new(id).with_property("Name", PropertyValue::Title(vec![RichText::plain(title)]))
    }

    #[test]
    fn first_record_containing_the_name_wins() {
        let records = vec![
            record("a", "E120 - Reports"),
            record("b", "E137 - Data Normalization"),
            record("c", "E137 - Duplicate"),
        ];

        let found = find_target_record(&records, "E137").map(|record| record.id.as_str());
        assert_eq!(found, Some("b"));
        assert!(find_target_record(&records, "E999").is_none());
    }

    #[test]
    fn status_resolves_for_each_declared_type() {
        let status = record("a", "E137").with_property(
            "Deployment Status",
            PropertyValue::Status(Some("Regression".to_string())),
        );
        let select = record("b", "E137").with_property(
            "deployment status (select)",
            PropertyValue::Select(Some("QA".to_string())),
        );
        let text = record("c", "E137").with_property(
            "Status of deployment",
            PropertyValue::RichText(vec![RichText::plain("In "), RichText::plain("Progress")]),
        );

        assert_eq!(extract_status(&status).as_deref(), Some("Regression"));
        assert_eq!(extract_status(&select).as_deref(), Some("QA"));
        assert_eq!(extract_status(&text).as_deref(), Some("In Progress"));
    }

    #[test]
    fn missing_or_empty_status_is_not_found() {
        let unrelated = record("a", "E137").with_property(
            "Status",
            PropertyValue::Status(Some("Regression".to_string())),
        );
        let empty = record("b", "E137")
            .with_property("Deployment Status", PropertyValue::Status(None))
            .with_property("Deployment status notes", PropertyValue::RichText(Vec::new()));

        assert_eq!(extract_status(&unrelated), None);
        assert_eq!(extract_status(&empty), None);
    }

    #[test]
    fn exact_name_beats_token_match_then_name_order() {
        let competing = record("a", "E137")
            .with_property(
                "Deployment status (legacy)",
                PropertyValue::Select(Some("Done".to_string())),
            )
            .with_property(
                "Deployment Status",
                PropertyValue::Status(Some("Regression".to_string())),
            );
        assert_eq!(extract_status(&competing).as_deref(), Some("Regression"));

        let two_token_matches = record("b", "E137")
            .with_property("Z deployment status", PropertyValue::Select(Some("Late".to_string())))
            .with_property("A deployment status", PropertyValue::Select(Some("Early".to_string())));
        assert_eq!(extract_status(&two_token_matches).as_deref(), Some("Early"));
    }

    #[test]
    fn reference_link_requires_url_type_and_value() {
        let present = record("a", "E137").with_property(
            "Link Definition",
            PropertyValue::Url(Some("https://notion.so/doc123".to_string())),
        );
        let text_typed = record("b", "E137").with_property(
            "Link Definition",
            PropertyValue::RichText(vec![RichText::plain("https://notion.so/doc123")]),
        );
        let empty = record("c", "E137")
            .with_property("Link Definition", PropertyValue::Url(Some(String::new())))
            .with_property(
                "Link definition backup",
                PropertyValue::Url(Some("https://notion.so/other".to_string())),
            );

        assert_eq!(
            extract_reference_link(&present).as_deref(),
            Some("https://notion.so/doc123")
        );
        assert_eq!(extract_reference_link(&text_typed), None);
        assert_eq!(extract_reference_link(&empty), None);
    }

    #[test]
    fn target_status_comparison_is_case_sensitive() {
        let detection = |status: &str| Detection {
            record: record("a", "E137"),
            status: Some(status.to_string()),
        };

        assert!(detection("Regression").reached("Regression"));
        assert!(!detection("regression").reached("Regression"));
        assert!(!detection("Regression ").reached("Regression"));
    }

    #[tokio::test]
    async fn poll_returns_record_with_status() -> Result<(), StoreError> {
        let store = FakeRecords::new(vec![record("rec", "E137 - Data").with_property(
            "Deployment Status",
            PropertyValue::Status(Some("In Progress".to_string())),
        )]);
        let poller = StatusPoller::new(&store, "db", "E137");

        let detection = poller.poll().await?.expect("record should be found");

        assert_eq!(detection.record.id, "rec");
        assert_eq!(detection.status.as_deref(), Some("In Progress"));
        assert!(!detection.reached("Regression"));
        Ok(())
    }

    #[tokio::test]
    async fn poll_propagates_store_failures() {
        let store = FakeRecords::failing_query();
        let poller = StatusPoller::new(&store, "db", "E137");

        assert!(poller.poll().await.is_err());
    }
}
