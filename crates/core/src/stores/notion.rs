use crate::error::StoreError;
use crate::models::{Block, Listing, Page, TrackerRecord};
use crate::traits::{AssetFetcher, BlockSource, RecordStore};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

pub const NOTION_API_BASE: &str = "https://api.notion.com";
pub const NOTION_VERSION: &str = "2022-06-28";
pub const ASSET_TIMEOUT: Duration = Duration::from_secs(30);

pub struct NotionClient {
    base_url: String,
    token: String,
    client: Client,
}

impl NotionClient {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: NOTION_API_BASE.to_string(),
            token: token.into(),
            client: Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(&self.token)
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: String,
    ) -> Result<T, StoreError> {
        let response = request.send().await?;
        let status = response.status();
        debug!(resource = %resource, status = status.as_u16(), "workspace api response");

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status.as_u16(), resource, &body));
        }

        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn api_error(status: u16, resource: String, body: &str) -> StoreError {
    match status {
        404 => StoreError::NotFound { resource },
        429 => StoreError::RateLimited,
        _ => {
            let parsed = serde_json::from_str::<Value>(body).unwrap_or(Value::Null);
            let code = parsed
                .pointer("/code")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string();
            let message = parsed
                .pointer("/message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| body.to_string());
            StoreError::Api {
                status,
                code,
                message,
            }
        }
    }
}

#[async_trait]
impl BlockSource for NotionClient {
    async fn page(&self, page_id: &str) -> Result<Page, StoreError> {
        let request = self.request(Method::GET, &format!("pages/{page_id}"));
        self.send(request, format!("page {page_id}")).await
    }

    async fn children(&self, block_id: &str) -> Result<Listing<Block>, StoreError> {
        let request = self.request(
            Method::GET,
            &format!("blocks/{block_id}/children?page_size=100"),
        );
        self.send(request, format!("children of {block_id}")).await
    }
}

#[async_trait]
impl RecordStore for NotionClient {
    async fn query_database(
        &self,
        database_id: &str,
    ) -> Result<Listing<TrackerRecord>, StoreError> {
        let request = self
            .request(Method::POST, &format!("databases/{database_id}/query"))
            .json(&json!({}));
        self.send(request, format!("database {database_id}")).await
    }

    async fn update_url_property(
        &self,
        page_id: &str,
        property: &str,
        url: &str,
    ) -> Result<(), StoreError> {
        let request = self
            .request(Method::PATCH, &format!("pages/{page_id}"))
            .json(&json!({ "properties": { property: { "url": url } } }));
        let _: Value = self.send(request, format!("page {page_id}")).await?;
        Ok(())
    }

    async fn append_children(&self, block_id: &str, children: Vec<Value>) -> Result<(), StoreError> {
        let request = self
            .request(Method::PATCH, &format!("blocks/{block_id}/children"))
            .json(&json!({ "children": children }));
        let _: Value = self.send(request, format!("children of {block_id}")).await?;
        Ok(())
    }
}

pub struct HttpAssetFetcher {
    client: Client,
}

impl HttpAssetFetcher {
    pub fn new() -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::builder().timeout(ASSET_TIMEOUT).build()?,
        })
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, StoreError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(StoreError::Download(format!(
                "{url} returned {}",
                response.status()
            )));
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Page id carried by a workspace link.
///
/// Accepts a bare id, a link ending in a dashed UUID, a slug ending in a 32-hex id
/// (`Title-0123...cdef`), or falls back to the last path segment.
pub fn page_id_from_reference(reference: &str) -> Result<String, StoreError> {
    let reference = reference.trim();
    let segment = match Url::parse(reference) {
        Ok(url) => url
            .path_segments()
            .and_then(|segments| segments.filter(|segment| !segment.is_empty()).last())
            .map(str::to_string),
        Err(_) => Some(reference.to_string()).filter(|value| !value.is_empty()),
    };
    let Some(segment) = segment else {
        return Err(StoreError::InvalidReference(reference.to_string()));
    };

    if Uuid::try_parse(&segment).is_ok() {
        return Ok(segment);
    }

    let tail = segment
        .len()
        .checked_sub(32)
        .and_then(|start| segment.get(start..))
        .filter(|tail| tail.chars().all(|c| c.is_ascii_hexdigit()));
    Ok(tail.map(str::to_string).unwrap_or(segment))
}
