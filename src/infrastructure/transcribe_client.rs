use crate::domain::models::TranscriptionResult;
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use std::path::PathBuf;
use url::Url;

const DEFAULT_RECORDING_NAME: &str = "recording.m4a";
const DEFAULT_RECORDING_MIME: &str = "audio/m4a";

/// Where the recorded audio lives. Web recordings arrive as an
/// in-memory blob, native recordings as a file path; the request body
/// is built once here so callers never branch on platform.
#[derive(Debug, Clone)]
pub enum AudioSource {
    File { path: PathBuf },
    Bytes {
        data: Vec<u8>,
        file_name: String,
        mime_type: String,
    },
}

#[async_trait]
pub trait TranscriptionClient: Send + Sync {
    /// Never fails: transport and HTTP errors come back as
    /// `{success: false, error}` results.
    async fn transcribe(&self, audio: AudioSource) -> TranscriptionResult;

    /// Probes the middleware; any HTTP response means reachable.
    async fn health_check(&self) -> bool;
}

#[derive(Debug, serde::Deserialize)]
struct TranscribeResponse {
    transcription: Option<String>,
    summary: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ReqwestTranscriptionClient {
    client: Client,
    base_url: Url,
}

impl ReqwestTranscriptionClient {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.api_base_url.clone(),
        }
    }

    fn endpoint(&self, segment: &str) -> Result<Url, InfraError> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| InfraError::InvalidConfig("api base URL cannot be a base".to_string()))?;
            segments.pop_if_empty();
            segments.push("api");
            segments.push(segment);
        }
        Ok(url)
    }

    async fn build_form(&self, audio: AudioSource) -> Result<Form, String> {
        let (data, file_name, mime_type) = match audio {
            AudioSource::File { path } => {
                let data = tokio::fs::read(&path)
                    .await
                    .map_err(|error| format!("failed reading audio file {}: {error}", path.display()))?;
                (
                    data,
                    DEFAULT_RECORDING_NAME.to_string(),
                    DEFAULT_RECORDING_MIME.to_string(),
                )
            }
            AudioSource::Bytes {
                data,
                file_name,
                mime_type,
            } => (data, file_name, mime_type),
        };

        let part = Part::bytes(data)
            .file_name(file_name)
            .mime_str(&mime_type)
            .map_err(|error| format!("invalid audio mime type: {error}"))?;
        Ok(Form::new().part("audio", part))
    }
}

/// Reduces a non-OK transcription response to its user-facing message.
pub fn failure_message(status: u16, body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|payload| {
            payload
                .get("error")
                .and_then(serde_json::Value::as_str)
                .map(ToOwned::to_owned)
        })
        .unwrap_or_else(|| format!("Request failed with status {status}"))
}

pub fn parse_transcription(body: &str) -> TranscriptionResult {
    match serde_json::from_str::<TranscribeResponse>(body) {
        Ok(parsed) => TranscriptionResult {
            success: true,
            transcription: parsed.transcription,
            summary: parsed.summary,
            error: None,
        },
        Err(error) => TranscriptionResult::failure(format!("invalid transcription payload: {error}")),
    }
}

#[async_trait]
impl TranscriptionClient for ReqwestTranscriptionClient {
    async fn transcribe(&self, audio: AudioSource) -> TranscriptionResult {
        let endpoint = match self.endpoint("transcribe") {
            Ok(endpoint) => endpoint,
            Err(error) => return TranscriptionResult::failure(error.to_string()),
        };
        let form = match self.build_form(audio).await {
            Ok(form) => form,
            Err(error) => return TranscriptionResult::failure(error),
        };

        let response = match self
            .client
            .post(endpoint)
            .multipart(form)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => {
                log::warn!("transcription request failed: {error}");
                return TranscriptionResult::failure(error.to_string());
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => return TranscriptionResult::failure(error.to_string()),
        };

        if !status.is_success() {
            return TranscriptionResult::failure(failure_message(status.as_u16(), &body));
        }

        parse_transcription(&body)
    }

    async fn health_check(&self) -> bool {
        let Ok(endpoint) = self.endpoint("auth") else {
            return false;
        };
        // Even a 500 means the middleware is reachable.
        match self.client.post(endpoint).send().await {
            Ok(_) => true,
            Err(error) => {
                log::debug!("transcription health check failed: {error}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offline_client() -> ReqwestTranscriptionClient {
        let config = AppConfig::from_lookup(|key| match key {
            "SPARK_API_BASE_URL" => Some("http://127.0.0.1:9".to_string()),
            _ => None,
        })
        .expect("offline config");
        ReqwestTranscriptionClient::new(&config)
    }

    #[test]
    fn parse_transcription_maps_payload_fields() {
        let result = parse_transcription(r#"{"transcription": "hello", "summary": "greeting"}"#);
        assert!(result.success);
        assert_eq!(result.transcription.as_deref(), Some("hello"));
        assert_eq!(result.summary.as_deref(), Some("greeting"));
        assert_eq!(result.error, None);
    }

    #[test]
    fn parse_transcription_tolerates_missing_fields() {
        let result = parse_transcription("{}");
        assert!(result.success);
        assert_eq!(result.transcription, None);
        assert_eq!(result.summary, None);
    }

    #[test]
    fn failure_message_prefers_server_error() {
        assert_eq!(
            failure_message(422, r#"{"error": "Unsupported audio format"}"#),
            "Unsupported audio format"
        );
        assert_eq!(failure_message(503, ""), "Request failed with status 503");
    }

    #[tokio::test]
    async fn missing_audio_file_becomes_a_failure_result() {
        let client = offline_client();
        let result = client
            .transcribe(AudioSource::File {
                path: PathBuf::from("/nonexistent/spark-recording.m4a"),
            })
            .await;

        assert!(!result.success);
        let error = result.error.expect("error message present");
        assert!(error.contains("spark-recording.m4a"));
    }

    #[tokio::test]
    async fn unreachable_middleware_becomes_a_failure_result() {
        let client = offline_client();
        let result = client
            .transcribe(AudioSource::Bytes {
                data: vec![0u8; 16],
                file_name: "clip.webm".to_string(),
                mime_type: "audio/webm".to_string(),
            })
            .await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn health_check_reduces_transport_errors_to_false() {
        let client = offline_client();
        assert!(!client.health_check().await);
    }

    #[test]
    fn endpoints_join_under_base_path() {
        let client = offline_client();
        assert_eq!(
            client.endpoint("transcribe").expect("endpoint").as_str(),
            "http://127.0.0.1:9/api/transcribe"
        );
        assert_eq!(
            client.endpoint("auth").expect("endpoint").as_str(),
            "http://127.0.0.1:9/api/auth"
        );
    }
}
