use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde_json::{json, Value};
use std::collections::BTreeSet;
use std::time::Duration;

use super::{IndexStore, StoreError, StoreResult};

/// Index store backed by an Elasticsearch / OpenSearch compatible REST API.
#[derive(Clone)]
pub struct ElasticStore {
    client: Client,
    base_url: Url,
}

impl ElasticStore {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("HTTP client error: {}", e))?;
        let base_url = Url::parse(base_url).map_err(|e| anyhow::anyhow!("invalid store URL '{}': {}", base_url, e))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("store URL '{}' cannot carry a path", base_url);
        }
        Ok(Self { client, base_url })
    }

    /// Appends `segments` to the base URL, percent-encoding each one.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        self.client.request(method, self.url(segments))
    }

    async fn send(&self, request: RequestBuilder) -> StoreResult<(StatusCode, String)> {
        let response = request
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok((status, body))
    }

    async fn expect_success(&self, request: RequestBuilder) -> StoreResult<String> {
        let (status, body) = self.send(request).await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(rejected(status, body))
        }
    }

    async fn update_aliases(&self, actions: Value) -> StoreResult<()> {
        let request = self
            .request(Method::POST, &["_aliases"])
            .json(&json!({ "actions": actions }));
        self.expect_success(request).await.map(|_| ())
    }
}

fn rejected(status: StatusCode, body: String) -> StoreError {
    let reason = error_type(&body).unwrap_or(body);
    StoreError::Rejected {
        status: status.as_u16(),
        reason,
    }
}

/// `error.type` of an Elasticsearch error body, e.g. `index_not_found_exception`.
fn error_type(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|e| e.get("type"))
        .and_then(|t| t.as_str())
        .map(str::to_string)
}

#[async_trait]
impl IndexStore for ElasticStore {
    async fn create_index(&self, name: &str, spec: &Value) -> StoreResult<()> {
        let mut request = self.request(Method::PUT, &[name]);
        if !spec.is_null() {
            request = request.json(spec);
        }
        let (status, body) = self.send(request).await?;
        if status.is_success() {
            return Ok(());
        }
        match error_type(&body).as_deref() {
            Some("resource_already_exists_exception") | Some("index_already_exists_exception") => {
                Err(StoreError::AlreadyExists(name.to_string()))
            }
            _ => Err(rejected(status, body)),
        }
    }

    async fn delete_index(&self, name: &str) -> StoreResult<()> {
        let request = self.request(Method::DELETE, &[name]);
        self.expect_success(request).await.map(|_| ())
    }

    async fn close_index(&self, name: &str) -> StoreResult<()> {
        let request = self.request(Method::POST, &[name, "_close"]);
        self.expect_success(request).await.map(|_| ())
    }

    async fn add_alias(&self, index: &str, alias: &str) -> StoreResult<()> {
        self.update_aliases(json!([{ "add": { "index": index, "alias": alias } }]))
            .await
    }

    async fn remove_alias(&self, index: &str, alias: &str) -> StoreResult<()> {
        match self
            .update_aliases(json!([{ "remove": { "index": index, "alias": alias } }]))
            .await
        {
            Err(StoreError::Rejected { status: 404, reason }) if reason == "aliases_not_found_exception" => {
                tracing::debug!("alias {} was not on {}, nothing to remove", alias, index);
                Ok(())
            }
            other => other,
        }
    }

    async fn move_alias(&self, from: &str, to: &str, alias: &str) -> StoreResult<()> {
        self.update_aliases(json!([
            { "add": { "index": to, "alias": alias } },
            { "remove": { "index": from, "alias": alias } }
        ]))
        .await
    }

    async fn list_indices_by_alias(&self, alias: &str) -> StoreResult<BTreeSet<String>> {
        let request = self.request(Method::GET, &["_alias", alias]);
        let (status, body) = self.send(request).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(BTreeSet::new());
        }
        if !status.is_success() {
            return Err(rejected(status, body));
        }
        parse_alias_listing(&body)
    }
}

/// `GET /_alias/{name}` answers with `{"<index>": {"aliases": {...}}, ...}`.
fn parse_alias_listing(body: &str) -> StoreResult<BTreeSet<String>> {
    let value: Value = serde_json::from_str(body).map_err(|e| StoreError::Rejected {
        status: 200,
        reason: format!("unreadable alias listing: {}", e),
    })?;
    match value {
        Value::Object(indices) => Ok(indices.keys().cloned().collect()),
        other => Err(StoreError::Rejected {
            status: 200,
            reason: format!("unexpected alias listing: {}", other),
        }),
    }
}
