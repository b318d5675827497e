use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

const TASKS_API_BASE: &str = "https://tasks.googleapis.com/tasks/v1/";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RemoteTask {
    pub id: Option<String>,
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub due: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated: Option<String>,
}

impl RemoteTask {
    pub fn is_completed(&self) -> bool {
        self.status
            .as_deref()
            .map(|status| status.eq_ignore_ascii_case("completed"))
            .unwrap_or(false)
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListTasksRequest {
    pub sync_token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ListTasksResponse {
    pub tasks: Vec<RemoteTask>,
    pub next_sync_token: Option<String>,
}

#[async_trait]
pub trait GoogleTasksClient: Send + Sync {
    /// Lists tasks for one list, following pagination. An incremental
    /// request carries the previous sync token; the server signals an
    /// expired token with HTTP 410, surfaced as
    /// [`InfraError::SyncTokenExpired`].
    async fn list_tasks(
        &self,
        access_token: &str,
        list_id: &str,
        request: ListTasksRequest,
    ) -> Result<ListTasksResponse, InfraError>;

    async fn complete_task(
        &self,
        access_token: &str,
        list_id: &str,
        task_id: &str,
    ) -> Result<(), InfraError>;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestGoogleTasksClient {
    client: Client,
}

impl ReqwestGoogleTasksClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    fn ensure_non_empty(value: &str, field: &str) -> Result<(), InfraError> {
        if value.trim().is_empty() {
            return Err(InfraError::Api(format!("{field} must not be empty")));
        }
        Ok(())
    }

    fn api_http_error(status: reqwest::StatusCode, body: &str) -> InfraError {
        let message = if body.trim().is_empty() {
            format!("google tasks api error: http {}", status.as_u16())
        } else {
            format!("google tasks api error: http {}; body={body}", status.as_u16())
        };
        InfraError::Api(message)
    }

    fn tasks_endpoint(list_id: &str) -> Result<Url, InfraError> {
        let mut url = Url::parse(TASKS_API_BASE)
            .map_err(|error| InfraError::Api(format!("invalid tasks api base url: {error}")))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::Api("tasks api base URL cannot be a base".to_string()))?;
            segments.push("lists");
            segments.push(list_id);
            segments.push("tasks");
        }
        Ok(url)
    }

    fn task_endpoint(list_id: &str, task_id: &str) -> Result<Url, InfraError> {
        let mut url = Self::tasks_endpoint(list_id)?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::Api("tasks URL cannot be a base".to_string()))?;
            segments.push(task_id);
        }
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct TasksPageResponse {
    items: Option<Vec<RemoteTask>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
    #[serde(rename = "nextSyncToken")]
    next_sync_token: Option<String>,
}

#[derive(Debug, Serialize)]
struct CompleteTaskRequest<'a> {
    status: &'a str,
}

#[async_trait]
impl GoogleTasksClient for ReqwestGoogleTasksClient {
    async fn list_tasks(
        &self,
        access_token: &str,
        list_id: &str,
        request: ListTasksRequest,
    ) -> Result<ListTasksResponse, InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(list_id, "task list id")?;

        let endpoint = Self::tasks_endpoint(list_id)?;
        let mut page_token: Option<String> = None;
        let mut next_sync_token: Option<String> = None;
        let mut tasks = Vec::new();
        let sync_token = request.sync_token.clone();

        loop {
            let mut req = self.client.get(endpoint.clone()).bearer_auth(access_token);
            req = req.query(&[
                ("showCompleted", "true"),
                ("showDeleted", "true"),
                ("showHidden", "true"),
                ("maxResults", "100"),
            ]);

            if let Some(sync_token) = sync_token.as_deref() {
                req = req.query(&[("syncToken", sync_token)]);
            }
            if let Some(page_token) = page_token.as_deref() {
                req = req.query(&[("pageToken", page_token)]);
            }

            let response = req.send().await.map_err(|error| {
                InfraError::Api(format!("network error while listing google tasks: {error}"))
            })?;

            let status = response.status();
            let body = response.text().await.map_err(|error| {
                InfraError::Api(format!("failed reading tasks list response: {error}"))
            })?;

            if status == reqwest::StatusCode::GONE {
                return Err(InfraError::SyncTokenExpired);
            }
            if !status.is_success() {
                return Err(Self::api_http_error(status, &body));
            }

            let mut parsed: TasksPageResponse = serde_json::from_str(&body).map_err(|error| {
                InfraError::Api(format!("invalid tasks list payload: {error}; body={body}"))
            })?;

            tasks.extend(parsed.items.take().unwrap_or_default());
            if parsed.next_sync_token.is_some() {
                next_sync_token = parsed.next_sync_token.take();
            }

            if let Some(next_page_token) = parsed.next_page_token.take() {
                page_token = Some(next_page_token);
                continue;
            }
            break;
        }

        Ok(ListTasksResponse {
            tasks,
            next_sync_token,
        })
    }

    async fn complete_task(
        &self,
        access_token: &str,
        list_id: &str,
        task_id: &str,
    ) -> Result<(), InfraError> {
        Self::ensure_non_empty(access_token, "access token")?;
        Self::ensure_non_empty(list_id, "task list id")?;
        Self::ensure_non_empty(task_id, "task id")?;

        let endpoint = Self::task_endpoint(list_id, task_id)?;
        let response = self
            .client
            .patch(endpoint)
            .bearer_auth(access_token)
            .json(&CompleteTaskRequest { status: "completed" })
            .send()
            .await
            .map_err(|error| InfraError::Api(format!("network error while completing task: {error}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|error| InfraError::Api(format!("failed reading task complete response: {error}")))?;

        if !status.is_success() {
            return Err(Self::api_http_error(status, &body));
        }
        Ok(())
    }
}
