use crate::domain::models::SortedItem;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use url::Url;

const MAX_SORT_ITEMS: usize = 100;
const GENERIC_SORT_ERROR: &str = "Unable to sort items right now.";

#[async_trait]
pub trait SortClient: Send + Sync {
    async fn sort_items(&self, items: &[String]) -> Result<Vec<SortedItem>, InfraError>;
}

#[derive(Debug, serde::Serialize)]
struct SortRequest<'a> {
    items: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    timezone: Option<&'a str>,
}

#[derive(Debug, serde::Deserialize)]
struct SortResponse {
    sorted: Vec<SortedItem>,
}

/// Client for the AI categorization endpoint (`POST /api/sort`).
#[derive(Debug, Clone)]
pub struct ReqwestSortClient {
    client: Client,
    base_url: Url,
    timezone_label: Option<String>,
}

impl ReqwestSortClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.api_base_url.clone(),
            timezone_label: Some(config.timezone_label().to_string()),
        }
    }

    fn sort_endpoint(&self) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::InvalidConfig("api base URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("api");
            segments.push("sort");
        }
        Ok(url)
    }
}

/// Trims entries, drops empties, and caps the batch at 100 items.
pub fn prepare_items(items: &[String]) -> Vec<String> {
    items
        .iter()
        .map(|item| item.trim())
        .filter(|item| !item.is_empty())
        .take(MAX_SORT_ITEMS)
        .map(ToOwned::to_owned)
        .collect()
}

/// Extracts the server-provided `error` message from a non-OK body,
/// falling back to a generic message when absent.
pub fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|payload| {
            payload
                .get("error")
                .and_then(serde_json::Value::as_str)
                .map(ToOwned::to_owned)
        })
        .unwrap_or_else(|| GENERIC_SORT_ERROR.to_string())
}

/// Validates an OK payload strictly: a `sorted` array whose every
/// element carries a `text` string plus category/priority values from
/// the fixed enums. Anything else is a schema violation, never a
/// partially-valid result.
pub fn parse_sort_response(body: &str) -> Result<Vec<SortedItem>, InfraError> {
    let payload: serde_json::Value = serde_json::from_str(body)
        .map_err(|_| InfraError::Api("Invalid AI sort response payload.".to_string()))?;
    if !payload.is_object() {
        return Err(InfraError::Api("Invalid AI sort response payload.".to_string()));
    }

    let response: SortResponse =
        serde_json::from_value(payload).map_err(|_| InfraError::InvalidSortSchema)?;
    Ok(response.sorted)
}

#[async_trait]
impl SortClient for ReqwestSortClient {
    async fn sort_items(&self, items: &[String]) -> Result<Vec<SortedItem>, InfraError> {
        let cleaned = prepare_items(items);
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }

        let request = SortRequest {
            items: &cleaned,
            timezone: self.timezone_label.as_deref(),
        };

        let response = self
            .client
            .post(self.sort_endpoint()?)
            .json(&request)
            .send()
            .await
            .map_err(|error| InfraError::Api(format!("network error while sorting items: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Api(format!("failed reading sort response: {error}")))?;

        if !status.is_success() {
            return Err(InfraError::Api(extract_error_message(&body)));
        }

        parse_sort_response(&body)
    }
}
