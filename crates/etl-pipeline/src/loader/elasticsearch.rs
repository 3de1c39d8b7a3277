//! Elasticsearch `_bulk` loader.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Batch, BulkLoader, LoadResult};
use crate::error::LoadError;
use crate::retry::RetryPolicy;

#[derive(Serialize)]
struct IndexAction<'a> {
    index: IndexActionMeta<'a>,
}

#[derive(Serialize)]
struct IndexActionMeta<'a> {
    #[serde(rename = "_index")]
    index: &'a str,
    #[serde(rename = "_id")]
    id: &'a str,
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<std::collections::HashMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

/// Loader writing upserts to one index through the `_bulk` API.
pub struct ElasticsearchLoader {
    client: Client,
    base_url: String,
    index: String,
    batch_size: usize,
    retry: RetryPolicy,
}

impl ElasticsearchLoader {
    pub fn new(
        base_url: impl Into<String>,
        index: impl Into<String>,
        batch_size: usize,
        timeout: Duration,
        retry: RetryPolicy,
    ) -> Result<Self, LoadError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| LoadError::Connection(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index: index.into(),
            batch_size,
            retry,
        })
    }

    /// Newline-delimited action/source pairs.
    fn bulk_body(&self, batch: &Batch) -> Result<String, LoadError> {
        let mut body = String::new();
        for entry in batch.entries() {
            let action = IndexAction {
                index: IndexActionMeta {
                    index: &self.index,
                    id: &entry.id,
                },
            };
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(&entry.source)?);
            body.push('\n');
        }
        Ok(body)
    }

    async fn send_bulk(&self, body: String, sent: usize) -> Result<LoadResult, LoadError> {
        let url = format!("{}/_bulk", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| LoadError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LoadError::Http {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: BulkResponse = response
            .json()
            .await
            .map_err(|e| LoadError::Response(e.to_string()))?;

        let accepted = parsed
            .items
            .iter()
            .flat_map(|item| item.values())
            .filter(|item| (200..300).contains(&item.status))
            .count();

        if parsed.errors {
            if let Some(failed) = parsed
                .items
                .iter()
                .flat_map(|item| item.values())
                .find(|item| !(200..300).contains(&item.status))
            {
                warn!(
                    index = %self.index,
                    id = failed.id.as_deref().unwrap_or("-"),
                    status = failed.status,
                    error = %failed.error.clone().unwrap_or_default(),
                    "Bulk item rejected"
                );
            }
        }

        Ok(LoadResult { sent, accepted })
    }
}

#[async_trait]
impl BulkLoader for ElasticsearchLoader {
    fn index(&self) -> &str {
        &self.index
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    async fn pre_check(&self) -> Result<(), LoadError> {
        let ping = self
            .client
            .get(format!("{}/", self.base_url))
            .send()
            .await
            .map_err(|e| LoadError::Connection(e.to_string()))?;
        if !ping.status().is_success() {
            return Err(LoadError::Http {
                status: ping.status().as_u16(),
                body: ping.text().await.unwrap_or_default(),
            });
        }

        let head = self
            .client
            .head(format!("{}/{}", self.base_url, self.index))
            .send()
            .await
            .map_err(|e| LoadError::Connection(e.to_string()))?;
        match head.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => Err(LoadError::MissingIndex(self.index.clone())),
            s => Err(LoadError::Http {
                status: s.as_u16(),
                body: String::new(),
            }),
        }
    }

    async fn write_batch(&self, batch: &Batch) -> Result<LoadResult, LoadError> {
        if batch.is_empty() {
            return Ok(LoadResult { sent: 0, accepted: 0 });
        }

        let sent = batch.len();
        let body = self.bulk_body(batch)?;
        let result = self
            .retry
            .run("elasticsearch bulk", move || self.send_bulk(body.clone(), sent))
            .await?;

        debug!(index = %self.index, sent = result.sent, accepted = result.accepted, "Bulk write done");
        Ok(result)
    }
}
