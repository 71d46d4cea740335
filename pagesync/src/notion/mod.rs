#![doc = "Notion destination: realizes the core `Destination` contract over the Notion REST API."]
//
//! # Notion destination (CLI <-> Core)
//!
//! This module wires the [`Destination`] trait from `pagesync-core` to the public Notion
//! API. The engine stays transport-agnostic; everything Notion-specific (authentication,
//! block batching, rate limiting, URL parsing) lives here and in [`blocks`].
//!
//! ## Client Usage
//!
//! - Construct [`NotionClient`] from the environment (`NOTION_TOKEN`, optional `NOTION_BASE_URL`).
//! - Hand it to a `SyncContext` as the destination collaborator.
//!
//! Requests are issued one at a time. A `429 Too Many Requests` response is retried after
//! the `Retry-After` delay, at most [`MAX_RETRIES`] times per request.

pub mod blocks;

use std::env;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use pagesync_core::contract::{CollaboratorError, Destination, NewPage, Page};
use pagesync_core::element::PageElement;
use regex::Regex;
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

pub const NOTION_API_BASE: &str = "https://api.notion.com";
pub const NOTION_VERSION: &str = "2022-06-28";

/// Most children the API accepts in one create or append request.
pub const MAX_BLOCKS_PER_REQUEST: usize = 100;
pub const MAX_RETRIES: u32 = 3;

const DEFAULT_RETRY_AFTER_SECS: u64 = 1;

static PAGE_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9a-fA-F]{8}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{4}-?[0-9a-fA-F]{12}")
        .unwrap()
});

/// A non-success response from the Notion API.
#[derive(Debug, thiserror::Error)]
#[error("Notion API returned {status} ({code}): {message}")]
pub struct ApiError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

/// The page URL could not be reduced to a page id.
#[derive(Debug, thiserror::Error)]
#[error("no Notion page id found in {0:?}")]
pub struct InvalidPageUrl(pub String);

pub struct NotionClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl NotionClient {
    pub fn new(token: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self::with_http_client(reqwest::Client::new(), token, base_url)
    }

    pub fn with_http_client(
        http: reqwest::Client,
        token: impl Into<String>,
        base_url: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        NotionClient {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            token: token.into(),
        }
    }

    pub fn new_from_env() -> Result<Self, CollaboratorError> {
        dotenvy::dotenv().ok();
        match env::var("NOTION_TOKEN") {
            Ok(token) if !token.trim().is_empty() => {
                let base_url =
                    env::var("NOTION_BASE_URL").unwrap_or_else(|_| NOTION_API_BASE.to_owned());
                tracing::info!(base_url = %base_url, "Initialized NotionClient from environment");
                Ok(NotionClient::new(token, base_url))
            }
            Ok(_) => {
                tracing::error!("NOTION_TOKEN is empty");
                Err("NOTION_TOKEN is empty".into())
            }
            Err(e) => {
                tracing::error!(error = ?e, "NOTION_TOKEN missing in environment");
                Err(Box::new(e))
            }
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Sends one API request, retrying on rate limiting, and returns the JSON body.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, CollaboratorError> {
        let url = format!("{}/v1/{}", self.base_url, path);
        let mut attempt = 0;
        loop {
            let mut builder = self
                .http
                .request(method.clone(), &url)
                .bearer_auth(&self.token)
                .header("Notion-Version", NOTION_VERSION);
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder.send().await.map_err(|e| {
                tracing::error!(error = ?e, %method, path, "Notion request failed");
                e
            })?;
            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS && attempt < MAX_RETRIES {
                let wait = response
                    .headers()
                    .get(RETRY_AFTER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
                attempt += 1;
                tracing::warn!(path, wait_secs = wait, attempt, "Rate limited by Notion, retrying");
                tokio::time::sleep(Duration::from_secs(wait)).await;
                continue;
            }

            let text = response.text().await?;
            if !status.is_success() {
                let payload: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
                let err = ApiError {
                    status: status.as_u16(),
                    code: payload["code"].as_str().unwrap_or("unknown").to_owned(),
                    message: payload["message"].as_str().unwrap_or(&text).to_owned(),
                };
                tracing::error!(error = %err, %method, path, "Notion API error");
                return Err(Box::new(err));
            }
            if text.trim().is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }
    }

    /// Appends `blocks` under `block_id` in batches of [`MAX_BLOCKS_PER_REQUEST`].
    async fn append_blocks(&self, block_id: &str, blocks: &[Value]) -> Result<(), CollaboratorError> {
        for (batch_index, batch) in blocks.chunks(MAX_BLOCKS_PER_REQUEST).enumerate() {
            tracing::debug!(block_id, batch_index, size = batch.len(), "Appending block batch");
            self.request(
                Method::PATCH,
                &format!("blocks/{block_id}/children"),
                Some(&json!({ "children": batch })),
            )
            .await?;
        }
        Ok(())
    }

    /// Ids of every direct child block of `block_id`, following pagination.
    async fn list_child_block_ids(&self, block_id: &str) -> Result<Vec<String>, CollaboratorError> {
        let mut ids = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let mut path = format!("blocks/{block_id}/children?page_size={MAX_BLOCKS_PER_REQUEST}");
            if let Some(cursor) = &cursor {
                path.push_str(&format!("&start_cursor={cursor}"));
            }
            let page = self.request(Method::GET, &path, None).await?;
            if let Some(results) = page["results"].as_array() {
                ids.extend(
                    results
                        .iter()
                        .filter_map(|block| block["id"].as_str().map(str::to_owned)),
                );
            }
            cursor = match (page["has_more"].as_bool(), page["next_cursor"].as_str()) {
                (Some(true), Some(next)) => Some(next.to_owned()),
                _ => break,
            };
        }
        Ok(ids)
    }
}

/// Extracts the trailing page id of a Notion URL (or a bare id) in hyphenated form.
pub fn parse_page_id(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let candidate = PAGE_ID_PATTERN.find_iter(path).last()?;
    Uuid::parse_str(candidate.as_str())
        .ok()
        .map(|id| id.hyphenated().to_string())
}

#[async_trait]
impl Destination for NotionClient {
    async fn destination_is_accessible(&self, parent_id: &str) -> Result<bool, CollaboratorError> {
        match self.request(Method::GET, &format!("pages/{parent_id}"), None).await {
            Ok(_) => Ok(true),
            Err(e) => match e.downcast_ref::<ApiError>() {
                Some(api) => {
                    tracing::warn!(parent_id, status = api.status, "Destination page not accessible");
                    Ok(false)
                }
                None => Err(e),
            },
        }
    }

    async fn get_page_id_from_url(&self, url: &str) -> Result<String, CollaboratorError> {
        match parse_page_id(url) {
            Some(id) => {
                tracing::debug!(url, page_id = %id, "Resolved page id from URL");
                Ok(id)
            }
            None => Err(Box::new(InvalidPageUrl(url.to_owned()))),
        }
    }

    async fn delete_child_blocks(&self, parent_id: &str) -> Result<(), CollaboratorError> {
        let ids = self.list_child_block_ids(parent_id).await?;
        tracing::info!(parent_id, count = ids.len(), "Deleting child blocks");
        for id in ids {
            self.request(Method::DELETE, &format!("blocks/{id}"), None)
                .await?;
        }
        Ok(())
    }

    async fn create_page<'a>(&self, req: NewPage<'a>) -> Result<Page, CollaboratorError> {
        let page = req.page_element;
        tracing::info!(
            title = %page.title,
            parent_page_id = req.parent_page_id,
            file_path = req.file_path,
            "Creating Notion page"
        );
        if let Some(properties) = &page.properties {
            tracing::debug!(count = properties.len(), "Page properties are not supported under a page parent");
        }

        let blocks = blocks::page_to_blocks(page);
        let split = blocks.len().min(MAX_BLOCKS_PER_REQUEST);
        let (first, rest) = blocks.split_at(split);

        let mut body = json!({
            "parent": { "page_id": req.parent_page_id },
            "properties": blocks::title_property(&page.title),
            "children": first,
        });
        if let Some(icon) = &page.icon {
            body["icon"] = json!({ "type": "emoji", "emoji": icon });
        }

        let created = self.request(Method::POST, "pages", Some(&body)).await?;
        let page_id = created["id"].as_str().map(str::to_owned);
        let mut is_locked = false;

        if let Some(id) = &page_id {
            if !rest.is_empty() {
                self.append_blocks(id, rest).await?;
            }
            if req.lock_page {
                self.request(
                    Method::PATCH,
                    &format!("pages/{id}"),
                    Some(&json!({ "is_locked": true })),
                )
                .await?;
                is_locked = true;
            }
            tracing::info!(page_id = %id, blocks = blocks.len(), is_locked, "Created Notion page");
        } else if !rest.is_empty() {
            tracing::error!(
                title = %page.title,
                remaining = rest.len(),
                "Notion did not return a page id, remaining blocks cannot be appended"
            );
            return Err(format!(
                "Notion did not return a page id for {:?}; {} blocks were not written",
                page.title,
                rest.len()
            )
            .into());
        } else {
            tracing::warn!(title = %page.title, "Notion did not return a page id");
        }

        Ok(Page {
            page_id,
            created_at: created["created_time"].as_str().map(str::to_owned),
            updated_at: created["last_edited_time"].as_str().map(str::to_owned),
            is_locked,
        })
    }

    async fn append_to_page(
        &self,
        page_id: &str,
        page_element: &PageElement,
    ) -> Result<(), CollaboratorError> {
        let blocks = blocks::page_to_blocks(page_element);
        tracing::info!(page_id, blocks = blocks.len(), "Appending content to Notion page");
        self.append_blocks(page_id, &blocks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ids_from_page_urls() {
        assert_eq!(
            parse_page_id("https://www.notion.so/Workspace-0123456789abcdef0123456789abcdef").as_deref(),
            Some("01234567-89ab-cdef-0123-456789abcdef")
        );
        assert_eq!(
            parse_page_id("https://www.notion.so/team/0123456789ABCDEF0123456789abcdef?pvs=4").as_deref(),
            Some("01234567-89ab-cdef-0123-456789abcdef")
        );
        assert_eq!(
            parse_page_id("01234567-89ab-cdef-0123-456789abcdef").as_deref(),
            Some("01234567-89ab-cdef-0123-456789abcdef")
        );
    }

    #[test]
    fn takes_the_last_id_in_the_path() {
        let url = "https://www.notion.so/aaaaaaaabbbbccccddddeeeeeeeeeeee/Child-ffffffff000011112222333333333333";
        assert_eq!(
            parse_page_id(url).as_deref(),
            Some("ffffffff-0000-1111-2222-333333333333")
        );
    }

    #[test]
    fn ignores_ids_in_query_and_fragment() {
        assert_eq!(
            parse_page_id("https://www.notion.so/no-id-here?p=0123456789abcdef0123456789abcdef"),
            None
        );
        assert_eq!(parse_page_id("https://www.notion.so/Short-1234"), None);
    }

    #[tokio::test]
    async fn unresolvable_url_is_an_error() {
        let client = NotionClient::new("token", "http://127.0.0.1:9/");
        assert_eq!(client.base_url(), "http://127.0.0.1:9");
        let err = client
            .get_page_id_from_url("https://www.notion.so/nothing")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no Notion page id"));
    }
}
