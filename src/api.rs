use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, put},
    serve, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::config::Settings;
use crate::defaults::{DEFAULT_REFRESH, DEFAULT_REPLICAS, DEFAULT_ROLL_INDICES, DEFAULT_SEARCH_INDICES, DEFAULT_SHARDS};
use crate::errors::RollError;
use crate::model::RotationRequest;
use crate::roller::IndexRoller;
use crate::scheduler::{parse_schedule, RollScheduler};
use crate::store::ElasticStore;

#[derive(Clone)]
pub struct AppState {
    pub roller: IndexRoller,
    pub scheduler: RollScheduler,
}

impl AppState {
    pub fn new(roller: IndexRoller) -> Self {
        let scheduler = RollScheduler::new(roller.clone());
        Self { roller, scheduler }
    }
}

/// Query parameters of `PUT|POST /_rollindex`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollParams {
    pub index_prefix: Option<String>,
    pub search_indices: Option<usize>,
    pub roll_indices: Option<usize>,
    pub delete_after_roll: Option<bool>,
    pub close_after_roll: Option<bool>,
    pub index_timestamp_pattern: Option<String>,
    pub new_index_shards: Option<u32>,
    pub new_index_replicas: Option<u32>,
    pub new_index_refresh: Option<String>,
    pub cron_schedule: Option<String>,
}

impl RollParams {
    /// Builds the rotation request; `body`, when present, is the creation payload.
    pub fn into_request(self, body: &str) -> Result<(RotationRequest, Option<String>), String> {
        let index_prefix = self.index_prefix.unwrap_or_default();
        if index_prefix.is_empty() {
            return Err("indexPrefix missing".to_string());
        }

        let delete_after_roll = self.delete_after_roll.unwrap_or(false);
        // an explicit closeAfterRoll=true conflicts with deletion, the default gives way
        let close_after_roll = match self.close_after_roll {
            Some(true) if delete_after_roll => {
                return Err("Cannot delete and close an index at the same time".to_string())
            }
            Some(close) => close,
            None => !delete_after_roll,
        };

        let new_index_spec = if body.trim().is_empty() {
            json!({
                "settings": {
                    "index.number_of_shards": self.new_index_shards.unwrap_or(DEFAULT_SHARDS),
                    "index.number_of_replicas": self.new_index_replicas.unwrap_or(DEFAULT_REPLICAS),
                    "index.refresh_interval": self.new_index_refresh.as_deref().unwrap_or(DEFAULT_REFRESH),
                }
            })
        } else {
            let spec: Value = serde_json::from_str(body).map_err(|e| format!("Invalid index body: {}", e))?;
            if !spec.is_object() {
                return Err("Index body must be a JSON object".to_string());
            }
            spec
        };

        let mut request = RotationRequest::new(
            index_prefix,
            self.roll_indices.unwrap_or(DEFAULT_ROLL_INDICES),
            self.search_indices.unwrap_or(DEFAULT_SEARCH_INDICES),
        )
        .delete_after_roll(delete_after_roll)
        .close_after_roll(close_after_roll)
        .new_index_spec(new_index_spec);
        if let Some(pattern) = self.index_timestamp_pattern {
            request = request.timestamp_pattern(pattern);
        }

        // checked up front so a bad schedule is refused before the rotation runs
        let cron = self.cron_schedule.filter(|c| !c.trim().is_empty());
        if let Some(expr) = &cron {
            parse_schedule(expr).map_err(|e| e.to_string())?;
        }
        Ok((request, cron))
    }
}

fn error_status(err: &RollError) -> StatusCode {
    match err {
        RollError::InvalidRetentionConfig(_)
        | RollError::InvalidTimestampPattern { .. }
        | RollError::InvalidSchedule { .. } => StatusCode::BAD_REQUEST,
        RollError::DuplicateGenerationTime { .. } => StatusCode::CONFLICT,
        RollError::StoreUnavailable { .. } | RollError::StoreRejected { .. } => StatusCode::BAD_GATEWAY,
    }
}

fn error_response(err: &RollError) -> Response {
    let body = json!({"error": err.to_string(), "partial": err.partial()});
    (error_status(err), Json(body)).into_response()
}

async fn roll_index(
    State(state): State<AppState>,
    Query(params): Query<RollParams>,
    body: String,
) -> Response {
    tracing::info!("roll request {:?}", params);

    let (request, cron) = match params.into_request(&body) {
        Ok(parsed) => parsed,
        Err(e) => return (StatusCode::BAD_REQUEST, Json(json!({"error": e}))).into_response(),
    };

    let result = match state.roller.rotate(&request).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("problem while rolling index {}: {}", request.index_prefix, e);
            return error_response(&e);
        }
    };

    let mut body = match serde_json::to_value(&result) {
        Ok(body) => body,
        Err(e) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, format!("Serialization error: {}", e)).into_response()
        }
    };

    if let Some(cron) = cron {
        if let Err(e) = state.scheduler.schedule_rolling_cron(request, &cron) {
            tracing::error!("could not schedule rolling with '{}': {}", cron, e);
            let body = json!({"error": e.to_string(), "rolled": body});
            return (error_status(&e), Json(body)).into_response();
        }
        body["scheduled"] = json!(cron);
    }

    (StatusCode::OK, Json(body)).into_response()
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "healthy"})).into_response()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/_rollindex", put(roll_index).post(roll_index))
        .with_state(state)
}

pub async fn run(settings: &Settings) -> anyhow::Result<()> {
    let store = ElasticStore::new(&settings.store_url, settings.store_timeout)?;
    let state = AppState::new(IndexRoller::new(Arc::new(store)));
    let scheduler = state.scheduler.clone();

    let listener = TcpListener::bind(&settings.listen_addr).await?;
    tracing::info!("API listening on {}, index store at {}", settings.listen_addr, settings.store_url);
    serve(listener, router(state)).await?;

    scheduler.shutdown().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::MemoryStore;

    fn params(prefix: &str) -> RollParams {
        RollParams {
            index_prefix: Some(prefix.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults_from_params() {
        let (request, cron) = params("logs").into_request("").unwrap();
        assert_eq!(request.max_roll_indices, 1);
        assert_eq!(request.max_search_indices, 1);
        assert!(!request.delete_after_roll);
        assert!(request.close_after_roll);
        assert_eq!(request.timestamp_pattern, "yyyy-MM-dd-HH-mm");
        assert_eq!(request.new_index_spec["settings"]["index.number_of_shards"], 2);
        assert_eq!(request.new_index_spec["settings"]["index.refresh_interval"], "10s");
        assert!(cron.is_none());
    }

    #[test]
    fn test_delete_and_close_conflict() {
        let mut p = params("logs");
        p.delete_after_roll = Some(true);
        let (request, _) = p.into_request("").unwrap();
        assert!(request.delete_after_roll);
        assert!(!request.close_after_roll);

        let mut p = params("logs");
        p.delete_after_roll = Some(true);
        p.close_after_roll = Some(true);
        assert!(p.into_request("").is_err());
    }

    #[test]
    fn test_body_is_used_as_index_spec() {
        let mut p = params("logs");
        p.cron_schedule = Some("0 0 * * *".to_string());
        let (request, cron) = p
            .into_request(r#"{"mappings":{"properties":{"msg":{"type":"text"}}}}"#)
            .unwrap();
        assert_eq!(request.new_index_spec["mappings"]["properties"]["msg"]["type"], "text");
        assert_eq!(cron.as_deref(), Some("0 0 * * *"));

        assert!(params("logs").into_request("[1]").is_err());
        assert!(params("").into_request("").is_err());
    }

    #[test]
    fn test_bad_cron_is_refused_while_parsing_params() {
        let mut p = params("logs");
        p.cron_schedule = Some("bogus".to_string());
        let err = p.into_request("").unwrap_err();
        assert!(err.contains("bogus"));

        let mut p = params("logs");
        p.cron_schedule = Some("  ".to_string());
        let (_, cron) = p.into_request("").unwrap();
        assert!(cron.is_none());
    }

    #[test]
    fn test_error_status_mapping() {
        let response = error_response(&RollError::InvalidRetentionConfig("x".to_string()));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let response = error_response(&RollError::DuplicateGenerationTime {
            first: "a".to_string(),
            second: "b".to_string(),
        });
        assert_eq!(response.status(), StatusCode::CONFLICT);
        let response = error_response(&RollError::InvalidSchedule {
            expr: "bogus".to_string(),
            reason: "Expected 5 fields, got 1".to_string(),
        });
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_roll_endpoint() {
        let store = MemoryStore::new().with_index("logs_2019-12-01-00-00", &["logs_feed", "logs_search", "logs_roll"]);
        let app = router(AppState::new(IndexRoller::new(Arc::new(store.clone()))));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            serve(listener, app).await.unwrap();
        });

        let client = reqwest::Client::new();
        let response = client
            .post(format!("http://{}/_rollindex?indexPrefix=logs&rollIndices=2&searchIndices=1", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        let body: Value = response.json().await.unwrap();
        let created = body["createdIndex"].as_str().unwrap().to_string();
        assert!(created.starts_with("logs_"));
        assert_eq!(body["aliasRemovedIndices"], json!(["logs_2019-12-01-00-00"]));
        assert!(store.holders("logs_feed").contains(&created));

        let response = client
            .put(format!("http://{}/_rollindex?indexPrefix=logs&rollIndices=1&searchIndices=2", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
    }

    #[tokio::test]
    async fn test_bad_cron_leaves_store_untouched() {
        let store = MemoryStore::new();
        let state = AppState::new(IndexRoller::new(Arc::new(store.clone())));
        let scheduler = state.scheduler.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            serve(listener, router(state)).await.unwrap();
        });

        let response = reqwest::Client::new()
            .post(format!("http://{}/_rollindex?indexPrefix=logs&cronSchedule=bogus", addr))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 400);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"].as_str().unwrap().contains("bogus"));

        assert!(store.journal().is_empty());
        assert!(store.index_names().is_empty());
        assert!(scheduler.registered().is_empty());
    }
}
