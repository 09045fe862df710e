//! PostgREST data store (the hosted Supabase API)
//!
//! No multi-statement transactions over REST. Replacement is made re-runnable
//! instead: the delete tolerates an already empty table, and with a natural
//! key the insert is an upsert (`on_conflict` + `merge-duplicates`).

use crate::error::{check_table_name, DataStoreError};
use crate::row::Row;
use crate::store::{DataStore, ReplaceReport};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_RANGE};
use reqwest::{Client, RequestBuilder, Response};
use std::time::Duration;

const PAGE_SIZE: usize = 1000;
const INSERT_BATCH: usize = 500;

/// REST client for `<base>/rest/v1/<table>`
#[derive(Debug, Clone)]
pub struct RestDataStore {
    client: Client,
    base_url: String,
    probe_table: String,
    identity_field: String,
    request_tag: Option<String>,
}

impl RestDataStore {
    /// Create a client authenticated with the service credential
    ///
    /// # Errors
    /// Invalid credential characters or client construction failure
    pub fn new(base_url: impl Into<String>, service_key: impl Into<String>) -> Result<Self, DataStoreError> {
        let service_key = service_key.into();
        let mut headers = HeaderMap::new();
        let key = HeaderValue::from_str(&service_key)
            .map_err(|_| DataStoreError::Connection("service key contains invalid characters".to_string()))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {service_key}"))
            .map_err(|_| DataStoreError::Connection("service key contains invalid characters".to_string()))?;
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("cutover/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            probe_table: "scan_results".to_string(),
            identity_field: "id".to_string(),
            request_tag: None,
        })
    }

    /// Table read by [`ping`](DataStore::ping)
    #[must_use]
    pub fn with_probe_table(mut self, table: impl Into<String>) -> Self {
        self.probe_table = table.into();
        self
    }

    /// Identity column (used as the delete-all filter)
    #[must_use]
    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }

    /// Tag sent as `X-Cutover-Run` on every request
    #[must_use]
    pub fn with_request_tag(mut self, tag: impl Into<String>) -> Self {
        self.request_tag = Some(tag.into());
        self
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn tagged(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.request_tag {
            Some(tag) => request.header("X-Cutover-Run", tag),
            None => request,
        }
    }

    async fn checked(table: &str, operation: &'static str, response: Response) -> Result<Response, DataStoreError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(DataStoreError::operation(table, operation, format!("{status}: {body}")))
    }
}

/// Total from a `Content-Range: 0-24/3573` or `*/0` header
fn parse_content_range_total(value: &str) -> Option<usize> {
    value.rsplit('/').next()?.trim().parse().ok()
}

#[async_trait::async_trait]
impl DataStore for RestDataStore {
    fn kind(&self) -> &'static str {
        "rest"
    }

    fn supports_transactions(&self) -> bool {
        false
    }

    async fn ping(&self) -> Result<(), DataStoreError> {
        let response = self
            .tagged(self.client.get(self.table_url(&self.probe_table)))
            .query(&[("select", "*"), ("limit", "1")])
            .send()
            .await
            .map_err(|e| DataStoreError::Connection(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DataStoreError::Connection(format!(
                "probe read of {} returned {}",
                self.probe_table,
                response.status()
            )));
        }
        Ok(())
    }

    async fn fetch_all(&self, table: &str) -> Result<Vec<Row>, DataStoreError> {
        check_table_name(table)?;
        let mut rows = Vec::new();
        let mut offset = 0usize;
        loop {
            let response = self
                .tagged(self.client.get(self.table_url(table)))
                .query(&[("select", "*".to_string()), ("offset", offset.to_string()), ("limit", PAGE_SIZE.to_string())])
                .send()
                .await?;
            let page: Vec<Row> = Self::checked(table, "fetch", response).await?.json().await?;
            let fetched = page.len();
            rows.extend(page);
            if fetched < PAGE_SIZE {
                break;
            }
            offset += fetched;
        }
        Ok(rows)
    }

    async fn count(&self, table: &str) -> Result<usize, DataStoreError> {
        check_table_name(table)?;
        let response = self
            .tagged(self.client.head(self.table_url(table)))
            .query(&[("select", "*")])
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let response = Self::checked(table, "count", response).await?;
        response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .ok_or_else(|| DataStoreError::operation(table, "count", "missing Content-Range"))
    }

    async fn replace_all(
        &self,
        table: &str,
        rows: &[Row],
        natural_key: Option<&str>,
    ) -> Result<ReplaceReport, DataStoreError> {
        check_table_name(table)?;

        let filter = format!("{}=not.is.null", self.identity_field);
        let response = self
            .tagged(self.client.delete(format!("{}?{}", self.table_url(table), filter)))
            .header("Prefer", "count=exact,return=minimal")
            .send()
            .await?;
        let response = Self::checked(table, "delete", response).await?;
        let deleted = response
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_range_total)
            .unwrap_or(0);

        let mut inserted = 0usize;
        for batch in rows.chunks(INSERT_BATCH) {
            let mut request = self.tagged(self.client.post(self.table_url(table))).json(batch);
            request = match natural_key {
                Some(key) => request
                    .query(&[("on_conflict", key)])
                    .header("Prefer", "resolution=merge-duplicates,return=minimal"),
                None => request.header("Prefer", "return=minimal"),
            };
            let response = request.send().await?;
            Self::checked(table, "insert", response).await?;
            inserted += batch.len();
        }

        tracing::debug!("rest replaced {}: -{} +{}", table, deleted, inserted);
        Ok(ReplaceReport {
            deleted,
            inserted,
            transactional: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_range_totals() {
        assert_eq!(parse_content_range_total("0-24/3573"), Some(3573));
        assert_eq!(parse_content_range_total("*/0"), Some(0));
        assert_eq!(parse_content_range_total("0-9/*"), None);
    }

    #[test]
    fn table_urls() {
        let store = RestDataStore::new("https://x.supabase.co/", "k").unwrap();
        assert_eq!(store.table_url("metrics"), "https://x.supabase.co/rest/v1/metrics");
        assert!(!store.supports_transactions());
    }

    #[test]
    fn rejects_unprintable_key() {
        assert!(RestDataStore::new("https://x", "bad\nkey").is_err());
    }
}
