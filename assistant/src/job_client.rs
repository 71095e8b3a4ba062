use std::time::Duration;

use anyhow::{bail, Context};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ServiceError;
use crate::models::{
    ChatReply, ChatRequest, CreateJobRequest, Device, DeviceQuery, Job, JobReceipt, ModelInfo,
};

const API_KEY_HEADER: &str = "api-key";
const SSE_FIELDS: [&str; 3] = ["event:", "id:", "retry:"];

/// One call per action. Every method takes the live credential explicitly.
#[async_trait]
pub trait JobService: Send + Sync {
    async fn create_job(&self, credential: &str, request: &CreateJobRequest) -> Result<Job, ServiceError>;
    async fn list_jobs(&self, credential: &str) -> Result<Vec<Job>, ServiceError>;
    async fn cancel_job(&self, credential: &str, job_id: &str) -> Result<JobReceipt, ServiceError>;
    async fn delete_job(&self, credential: &str, job_id: &str) -> Result<JobReceipt, ServiceError>;
    async fn get_devices(&self, credential: &str, query: &DeviceQuery) -> Result<Vec<Device>, ServiceError>;
    async fn send_chat(&self, credential: &str, request: &ChatRequest) -> Result<ChatReply, ServiceError>;
    async fn get_models(&self, credential: &str) -> Result<Vec<ModelInfo>, ServiceError>;
}

/// Text completion used for the planning and answer stages.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, credential: &str, model: &str, prompt: &str) -> Result<String, ServiceError>;
}

#[derive(Clone)]
pub struct HttpJobService {
    base: Url,
    client: Client,
}

impl HttpJobService {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base = Url::parse(base_url).with_context(|| format!("invalid job service URL {base_url}"))?;
        if base.cannot_be_a_base() {
            bail!("job service URL {base_url} cannot carry a path");
        }
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { base, client })
    }

    /// Base URL with `segments` appended, each one percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, url: Url, credential: &str) -> Result<RequestBuilder, ServiceError> {
        if credential.trim().is_empty() {
            return Err(ServiceError::Auth("no API key configured".to_string()));
        }
        Ok(self.client.request(method, url).header(API_KEY_HEADER, credential))
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ServiceError> {
        let (url, body) = self.fetch(request).await?;
        serde_json::from_str(&body)
            .map_err(|e| ServiceError::Decode(format!("{} from {}", e, url.path())))
    }

    /// Sends the request and returns the body of a successful response.
    async fn fetch(&self, request: RequestBuilder) -> Result<(Url, String), ServiceError> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;

        debug!("Job service {} -> {}", url.path(), status);

        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ServiceError::Auth(format!("HTTP {}: {}", status.as_u16(), body)));
        }
        if !status.is_success() {
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok((url, body))
    }
}

/// Joins a streamed chat reply into one. Accepts a single `{content}` body
/// (servers that ignore `stream`) or one chunk per line, optionally
/// SSE-framed as `data: {...}` and terminated by `data: [DONE]`.
pub fn join_chat_chunks(body: &str) -> Result<ChatReply, ServiceError> {
    if let Ok(reply) = serde_json::from_str::<ChatReply>(body) {
        return Ok(reply);
    }

    let mut content = String::new();
    for line in body.lines() {
        let line = line.trim();
        if line.starts_with(':') || SSE_FIELDS.iter().any(|field| line.starts_with(field)) {
            continue;
        }
        let chunk = line.strip_prefix("data:").map(str::trim).unwrap_or(line);
        if chunk.is_empty() || chunk == "[DONE]" {
            continue;
        }
        let piece: ChatReply = serde_json::from_str(chunk)
            .map_err(|e| ServiceError::Decode(format!("{} in streamed chat chunk", e)))?;
        content.push_str(&piece.content);
    }
    Ok(ChatReply { content })
}

#[async_trait]
impl JobService for HttpJobService {
    async fn create_job(&self, credential: &str, request: &CreateJobRequest) -> Result<Job, ServiceError> {
        let url = self.endpoint(&["quantum-jobs"]);
        self.send(self.request(Method::POST, url, credential)?.json(request))
            .await
    }

    async fn list_jobs(&self, credential: &str) -> Result<Vec<Job>, ServiceError> {
        let url = self.endpoint(&["quantum-jobs"]);
        self.send(self.request(Method::GET, url, credential)?).await
    }

    async fn cancel_job(&self, credential: &str, job_id: &str) -> Result<JobReceipt, ServiceError> {
        let url = self.endpoint(&["quantum-jobs", job_id, "cancel"]);
        self.send(self.request(Method::PUT, url, credential)?).await
    }

    async fn delete_job(&self, credential: &str, job_id: &str) -> Result<JobReceipt, ServiceError> {
        let url = self.endpoint(&["quantum-jobs", job_id]);
        self.send(self.request(Method::DELETE, url, credential)?).await
    }

    async fn get_devices(&self, credential: &str, query: &DeviceQuery) -> Result<Vec<Device>, ServiceError> {
        let url = self.endpoint(&["quantum-devices"]);
        self.send(self.request(Method::GET, url, credential)?.query(&query.params))
            .await
    }

    async fn send_chat(&self, credential: &str, request: &ChatRequest) -> Result<ChatReply, ServiceError> {
        let url = self.endpoint(&["chat"]);
        let builder = self.request(Method::POST, url, credential)?.json(request);
        if !request.stream {
            return self.send(builder).await;
        }
        let (_, body) = self.fetch(builder).await?;
        join_chat_chunks(&body)
    }

    async fn get_models(&self, credential: &str) -> Result<Vec<ModelInfo>, ServiceError> {
        let url = self.endpoint(&["chat", "models"]);
        self.send(self.request(Method::GET, url, credential)?).await
    }
}

#[async_trait]
impl LanguageModel for HttpJobService {
    async fn complete(&self, credential: &str, model: &str, prompt: &str) -> Result<String, ServiceError> {
        let request = ChatRequest {
            prompt: prompt.to_string(),
            model: model.to_string(),
            stream: false,
        };
        Ok(self.send_chat(credential, &request).await?.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(base: &str) -> HttpJobService {
        HttpJobService::new(base, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoint_appends_and_encodes_segments() {
        let svc = service("http://localhost:8004/api");
        assert_eq!(
            svc.endpoint(&["quantum-jobs", "abc/123", "cancel"]).as_str(),
            "http://localhost:8004/api/quantum-jobs/abc%2F123/cancel"
        );

        let svc = service("http://localhost:8004/api/");
        assert_eq!(
            svc.endpoint(&["chat", "models"]).as_str(),
            "http://localhost:8004/api/chat/models"
        );
    }

    #[test]
    fn rejects_unusable_base_urls() {
        assert!(HttpJobService::new("not a url", Duration::from_secs(1)).is_err());
        assert!(HttpJobService::new("mailto:ops@example.com", Duration::from_secs(1)).is_err());
    }

    #[test]
    fn streamed_chat_chunks_are_joined() {
        let sse = "data: {\"content\":\"Hel\"}\n\ndata: {\"content\":\"lo\"}\n\ndata: [DONE]\n";
        assert_eq!(join_chat_chunks(sse).unwrap().content, "Hello");

        let ndjson = "{\"content\":\"a\"}\n{\"response\":\"b\"}\n";
        assert_eq!(join_chat_chunks(ndjson).unwrap().content, "ab");

        let whole = "{\n  \"content\": \"single\"\n}";
        assert_eq!(join_chat_chunks(whole).unwrap().content, "single");

        assert!(matches!(
            join_chat_chunks("data: not json\n"),
            Err(ServiceError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn empty_credential_is_an_auth_failure_without_network() {
        // Nothing listens on port 9; a network attempt would be an Http error.
        let svc = service("http://127.0.0.1:9/api");
        let err = svc.list_jobs("").await.unwrap_err();
        assert!(err.is_auth());
    }
}
