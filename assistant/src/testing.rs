//! Test doubles for the pipeline's collaborators.
//!
//! - [`StubJobService`]: records every job service call, returns canned
//!   records, and can be told to fail the next calls
//! - [`ScriptedModel`]: replays a queue of model replies and records prompts
//! - [`ScriptedPrompt`]: answers credential prompts with a fixed reply
//!
//! Everything counts its calls so tests can assert on side effects.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use prometheus::Registry;
use serde_json::Map;

use crate::credentials::CredentialPrompt;
use crate::error::ServiceError;
use crate::job_client::{JobService, LanguageModel};
use crate::metrics::Metrics;
use crate::models::{
    ChatReply, ChatRequest, CreateJobRequest, Device, DeviceQuery, Job, JobReceipt, ModelInfo,
    Pricing,
};

/// Metrics on a private registry so tests never collide on the global one.
pub fn test_metrics() -> Arc<Metrics> {
    Arc::new(Metrics::new(&Registry::new()).expect("fresh registry accepts metrics"))
}

pub fn job(id: &str, status: &str) -> Job {
    Job {
        job_id: id.to_string(),
        status: Some(status.to_string()),
        device_id: Some("aws_sv1".to_string()),
        shots: Some(100),
        extra: Map::new(),
    }
}

/// Failure to inject into the next stubbed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubFailure {
    Auth,
    Server,
}

impl StubFailure {
    fn into_error(self) -> ServiceError {
        match self {
            StubFailure::Auth => ServiceError::Auth("HTTP 401: invalid api key".to_string()),
            StubFailure::Server => ServiceError::Status {
                status: 500,
                body: "internal error".to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    CreateJob(CreateJobRequest),
    ListJobs,
    CancelJob(String),
    DeleteJob(String),
    GetDevices(DeviceQuery),
    SendChat(ChatRequest),
    GetModels,
}

pub struct StubJobService {
    calls: Mutex<Vec<RecordedCall>>,
    credentials: Mutex<Vec<String>>,
    failures: Mutex<VecDeque<StubFailure>>,
    jobs: Vec<Job>,
    models: Vec<ModelInfo>,
}

impl StubJobService {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            credentials: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            jobs: vec![job("job-1", "COMPLETED"), job("job-2", "QUEUED")],
            models: vec![ModelInfo {
                model: "gpt-4o-mini".to_string(),
                description: "Small, fast general model".to_string(),
                pricing: Some(Pricing {
                    input: 0.15,
                    output: 0.6,
                    units: "per 1M tokens".to_string(),
                }),
            }],
        }
    }

    /// The next calls fail in order, one failure per call.
    pub fn failing_with(self, failures: impl IntoIterator<Item = StubFailure>) -> Self {
        self.failures
            .lock()
            .expect("stub lock")
            .extend(failures);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("stub lock").clone()
    }

    /// Credentials presented, one per call.
    pub fn credentials(&self) -> Vec<String> {
        self.credentials.lock().expect("stub lock").clone()
    }

    fn record(&self, credential: &str, call: RecordedCall) -> Result<(), ServiceError> {
        self.calls.lock().expect("stub lock").push(call);
        self.credentials
            .lock()
            .expect("stub lock")
            .push(credential.to_string());
        match self.failures.lock().expect("stub lock").pop_front() {
            Some(failure) => Err(failure.into_error()),
            None => Ok(()),
        }
    }
}

impl Default for StubJobService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobService for StubJobService {
    async fn create_job(&self, credential: &str, request: &CreateJobRequest) -> Result<Job, ServiceError> {
        self.record(credential, RecordedCall::CreateJob(request.clone()))?;
        let mut created = job("job-new", "INITIALIZING");
        created.device_id = Some(request.device_id.clone());
        created.shots = Some(request.shots);
        Ok(created)
    }

    async fn list_jobs(&self, credential: &str) -> Result<Vec<Job>, ServiceError> {
        self.record(credential, RecordedCall::ListJobs)?;
        Ok(self.jobs.clone())
    }

    async fn cancel_job(&self, credential: &str, job_id: &str) -> Result<JobReceipt, ServiceError> {
        self.record(credential, RecordedCall::CancelJob(job_id.to_string()))?;
        Ok(JobReceipt {
            message: "Job cancelled".to_string(),
            job: job(job_id, "CANCELLED"),
        })
    }

    async fn delete_job(&self, credential: &str, job_id: &str) -> Result<JobReceipt, ServiceError> {
        self.record(credential, RecordedCall::DeleteJob(job_id.to_string()))?;
        Ok(JobReceipt {
            message: "Job deleted".to_string(),
            job: job(job_id, "DELETED"),
        })
    }

    async fn get_devices(&self, credential: &str, query: &DeviceQuery) -> Result<Vec<Device>, ServiceError> {
        self.record(credential, RecordedCall::GetDevices(query.clone()))?;
        Ok(vec![Device {
            device_id: "aws_sv1".to_string(),
            name: Some("SV1".to_string()),
            provider: query.get("provider").map(str::to_string).or(Some("AWS".to_string())),
            device_type: Some("SIMULATOR".to_string()),
            status: Some("ONLINE".to_string()),
            is_available: Some(true),
            extra: Map::new(),
        }])
    }

    async fn send_chat(&self, credential: &str, request: &ChatRequest) -> Result<ChatReply, ServiceError> {
        self.record(credential, RecordedCall::SendChat(request.clone()))?;
        Ok(ChatReply {
            content: format!("Reply to: {}", request.prompt),
        })
    }

    async fn get_models(&self, credential: &str) -> Result<Vec<ModelInfo>, ServiceError> {
        self.record(credential, RecordedCall::GetModels)?;
        Ok(self.models.clone())
    }
}

/// One queued model reply.
#[derive(Debug, Clone)]
pub enum ModelReply {
    Text(String),
    Fail(StubFailure),
}

/// Replays queued replies; answers "OK" once the queue is empty.
#[derive(Default)]
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ModelReply>>,
    prompts: Mutex<Vec<String>>,
    credentials: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(replies: impl IntoIterator<Item = ModelReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Self::default()
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("model lock").clone()
    }

    pub fn credentials(&self) -> Vec<String> {
        self.credentials.lock().expect("model lock").clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().expect("model lock").len()
    }
}

#[async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, credential: &str, _model: &str, prompt: &str) -> Result<String, ServiceError> {
        self.prompts.lock().expect("model lock").push(prompt.to_string());
        self.credentials
            .lock()
            .expect("model lock")
            .push(credential.to_string());
        match self.replies.lock().expect("model lock").pop_front() {
            Some(ModelReply::Text(text)) => Ok(text),
            Some(ModelReply::Fail(failure)) => Err(failure.into_error()),
            None => Ok("OK".to_string()),
        }
    }
}

/// Credential prompt that always gives the same answer.
pub struct ScriptedPrompt {
    reply: Option<String>,
    requests: AtomicU32,
}

impl ScriptedPrompt {
    pub fn supplying(credential: impl Into<String>) -> Self {
        Self {
            reply: Some(credential.into()),
            requests: AtomicU32::new(0),
        }
    }

    pub fn declining() -> Self {
        Self {
            reply: None,
            requests: AtomicU32::new(0),
        }
    }

    pub fn requests(&self) -> u32 {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CredentialPrompt for ScriptedPrompt {
    async fn request_credential(&self, _reason: &str) -> Option<String> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.reply.clone()
    }
}
