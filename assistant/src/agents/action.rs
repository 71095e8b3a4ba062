// Action Agent: validates a Plan and executes it against the job service

use std::future::Future;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info};

use super::catalog::{ActionKind, DEVICE_FILTER_KEYS};
use super::planner::Plan;
use crate::config::DEFAULT_MODEL;
use crate::error::ServiceError;
use crate::job_client::JobService;
use crate::models::{
    ChatRequest, Circuit, CreateJobRequest, Device, DeviceQuery, Job, JobReceipt, ModelInfo,
};

pub const NO_RECOGNIZED_ACTION: &str = "no recognized action";

/// A plan whose parameters passed validation, typed per action.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedAction {
    CreateJob(CreateJobRequest),
    ListJobs,
    CancelJob { job_id: String },
    DeleteJob { job_id: String },
    GetDevices(DeviceQuery),
    SendChat(ChatRequest),
    GetModels,
}

impl ValidatedAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            ValidatedAction::CreateJob(_) => ActionKind::CreateJob,
            ValidatedAction::ListJobs => ActionKind::ListJobs,
            ValidatedAction::CancelJob { .. } => ActionKind::CancelJob,
            ValidatedAction::DeleteJob { .. } => ActionKind::DeleteJob,
            ValidatedAction::GetDevices(_) => ActionKind::GetDevices,
            ValidatedAction::SendChat(_) => ActionKind::SendChat,
            ValidatedAction::GetModels => ActionKind::GetModels,
        }
    }
}

/// Successful result of an action; the variant fixes how it is rendered.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionPayload {
    Job(Job),
    Jobs(Vec<Job>),
    Receipt(JobReceipt),
    Devices(Vec<Device>),
    Chat(String),
    Models(Vec<ModelInfo>),
}

impl ActionPayload {
    pub fn to_value(&self) -> Value {
        let value = match self {
            ActionPayload::Job(job) => serde_json::to_value(job),
            ActionPayload::Jobs(jobs) => serde_json::to_value(jobs),
            ActionPayload::Receipt(receipt) => serde_json::to_value(receipt),
            ActionPayload::Devices(devices) => serde_json::to_value(devices),
            ActionPayload::Chat(text) => Ok(Value::String(text.clone())),
            ActionPayload::Models(models) => serde_json::to_value(models),
        };
        value.unwrap_or_default()
    }
}

#[derive(Debug)]
pub enum ActionOutcome {
    Success(ActionPayload),
    ValidationFailure(String),
    TransportError(ServiceError),
}

impl ActionOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ActionOutcome::Success(_) => "success",
            ActionOutcome::ValidationFailure(_) => "validation",
            ActionOutcome::TransportError(e) => e.kind().as_str(),
        }
    }
}

/// Check a plan's parameters. Never touches the network.
pub fn validate(plan: &Plan) -> Result<ValidatedAction, String> {
    let params = &plan.params;
    match plan.action {
        ActionKind::None => Err(NO_RECOGNIZED_ACTION.to_string()),
        ActionKind::CreateJob => validate_create_job(params).map(ValidatedAction::CreateJob),
        ActionKind::ListJobs => Ok(ValidatedAction::ListJobs),
        ActionKind::CancelJob => {
            require_str(params, "jobId").map(|job_id| ValidatedAction::CancelJob { job_id })
        }
        ActionKind::DeleteJob => {
            require_str(params, "jobId").map(|job_id| ValidatedAction::DeleteJob { job_id })
        }
        ActionKind::GetDevices => Ok(ValidatedAction::GetDevices(device_query(params))),
        ActionKind::SendChat => validate_send_chat(params).map(ValidatedAction::SendChat),
        ActionKind::GetModels => Ok(ValidatedAction::GetModels),
    }
}

fn validate_create_job(params: &Map<String, Value>) -> Result<CreateJobRequest, String> {
    let device_id = require_str(params, "deviceId")?;
    let shots = match params.get("shots") {
        None | Some(Value::Null) => return Err("createJob requires a shot count".to_string()),
        Some(value) => positive_integer(value)
            .ok_or_else(|| format!("shots must be a positive whole number, got {value}"))?,
    };

    let qasm = optional_str(params, "openQasm");
    let bitcode = optional_str(params, "bitcode");
    let circuit = match (qasm, bitcode) {
        (Some(source), None) => Circuit::OpenQasm(source),
        (None, Some(code)) => Circuit::Bitcode(code),
        (Some(_), Some(_)) => {
            return Err("createJob takes openQasm or bitcode, not both".to_string())
        }
        (None, None) => return Err("createJob requires either openQasm or bitcode".to_string()),
    };

    Ok(CreateJobRequest {
        device_id,
        shots,
        circuit,
    })
}

fn validate_send_chat(params: &Map<String, Value>) -> Result<ChatRequest, String> {
    let prompt = require_str(params, "prompt")?;
    let model = optional_str(params, "model").unwrap_or_else(|| DEFAULT_MODEL.to_string());
    let stream = match params.get("stream") {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };
    Ok(ChatRequest {
        prompt,
        model,
        stream,
    })
}

/// Keeps allow-listed filters only; unknown keys are dropped silently.
fn device_query(params: &Map<String, Value>) -> DeviceQuery {
    let params = DEVICE_FILTER_KEYS
        .iter()
        .filter_map(|key| {
            let value = match params.get(*key)? {
                Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                Value::Bool(b) => b.to_string(),
                Value::Number(n) => n.to_string(),
                _ => return None,
            };
            Some((key.to_string(), value))
        })
        .collect();
    DeviceQuery { params }
}

fn require_str(params: &Map<String, Value>, key: &str) -> Result<String, String> {
    optional_str(params, key).ok_or_else(|| format!("missing required parameter {key}"))
}

fn optional_str(params: &Map<String, Value>, key: &str) -> Option<String> {
    match params.get(key)? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn positive_integer(value: &Value) -> Option<u64> {
    let shots = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }?;
    (shots > 0).then_some(shots)
}

pub struct ActionDispatcher {
    service: Arc<dyn JobService>,
}

impl ActionDispatcher {
    pub fn new(service: Arc<dyn JobService>) -> Self {
        Self { service }
    }

    /// Validate the plan, then hand the typed action to `run`, which makes the
    /// single service call (through credential recovery in the pipeline).
    /// `run` is never invoked when validation fails.
    pub async fn dispatch<F, Fut, E>(&self, plan: &Plan, run: F) -> Result<ActionOutcome, E>
    where
        F: FnOnce(ValidatedAction) -> Fut,
        Fut: Future<Output = Result<ActionPayload, E>>,
    {
        match validate(plan) {
            Ok(action) => run(action).await.map(ActionOutcome::Success),
            Err(reason) => {
                info!("Action: {} rejected: {}", plan.action, reason);
                Ok(ActionOutcome::ValidationFailure(reason))
            }
        }
    }

    /// Exactly one job service call for the given action.
    pub async fn execute(
        &self,
        action: &ValidatedAction,
        credential: &str,
    ) -> Result<ActionPayload, ServiceError> {
        info!("Action: Executing {}", action.kind());

        let service = self.service.as_ref();
        let result = match action {
            ValidatedAction::CreateJob(request) => service
                .create_job(credential, request)
                .await
                .map(ActionPayload::Job),
            ValidatedAction::ListJobs => service.list_jobs(credential).await.map(ActionPayload::Jobs),
            ValidatedAction::CancelJob { job_id } => service
                .cancel_job(credential, job_id)
                .await
                .map(ActionPayload::Receipt),
            ValidatedAction::DeleteJob { job_id } => service
                .delete_job(credential, job_id)
                .await
                .map(ActionPayload::Receipt),
            ValidatedAction::GetDevices(query) => service
                .get_devices(credential, query)
                .await
                .map(ActionPayload::Devices),
            ValidatedAction::SendChat(request) => service
                .send_chat(credential, request)
                .await
                .map(|reply| ActionPayload::Chat(reply.content)),
            ValidatedAction::GetModels => {
                service.get_models(credential).await.map(ActionPayload::Models)
            }
        };

        if let Err(e) = &result {
            error!("Action: {} failed ({}): {}", action.kind(), e.kind().as_str(), e);
        }
        result
    }

    /// `getModels` outside of any plan, for the UI's model picker.
    pub async fn models(&self, credential: &str) -> Result<Vec<ModelInfo>, ServiceError> {
        match self.execute(&ValidatedAction::GetModels, credential).await? {
            ActionPayload::Models(models) => Ok(models),
            other => Err(ServiceError::Decode(format!(
                "expected a model list, got {:?}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{RecordedCall, StubFailure, StubJobService};
    use serde_json::json;

    /// Dispatch with a direct call; transport errors become the outcome.
    async fn dispatch_once(dispatcher: &ActionDispatcher, plan: &Plan, credential: &str) -> ActionOutcome {
        dispatcher
            .dispatch(plan, |action| async move { dispatcher.execute(&action, credential).await })
            .await
            .unwrap_or_else(ActionOutcome::TransportError)
    }

    fn plan(value: Value) -> Plan {
        let Value::Object(mut params) = value else { panic!("plan must be an object") };
        let action = params
            .remove("action")
            .and_then(|v| v.as_str().map(ActionKind::parse))
            .unwrap_or(ActionKind::None);
        Plan::new(action, params)
    }

    #[tokio::test]
    async fn none_is_rejected_without_calls() {
        let service = Arc::new(StubJobService::new());
        let dispatcher = ActionDispatcher::new(service.clone());

        let outcome = dispatch_once(&dispatcher, &Plan::none(), "key").await;

        assert!(matches!(outcome, ActionOutcome::ValidationFailure(ref r) if r == NO_RECOGNIZED_ACTION));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn create_job_with_both_circuits_is_rejected() {
        let service = Arc::new(StubJobService::new());
        let dispatcher = ActionDispatcher::new(service.clone());
        let both = plan(json!({
            "action": "createJob", "deviceId": "aws_sv1", "shots": 10,
            "openQasm": "OPENQASM 3;", "bitcode": "AAEC"
        }));

        let outcome = dispatch_once(&dispatcher, &both, "key").await;

        assert!(matches!(outcome, ActionOutcome::ValidationFailure(_)));
        assert!(service.calls().is_empty());
    }

    #[tokio::test]
    async fn create_job_with_neither_circuit_is_rejected() {
        let service = Arc::new(StubJobService::new());
        let dispatcher = ActionDispatcher::new(service.clone());
        let neither = plan(json!({"action": "createJob", "deviceId": "aws_sv1", "shots": 10}));

        let outcome = dispatch_once(&dispatcher, &neither, "key").await;

        assert!(matches!(outcome, ActionOutcome::ValidationFailure(_)));
        assert!(service.calls().is_empty());
    }

    #[test]
    fn create_job_requires_positive_shots() {
        for shots in [json!(0), json!(-5), json!("many"), json!(1.5)] {
            let p = plan(json!({
                "action": "createJob", "deviceId": "d", "shots": shots, "openQasm": "q"
            }));
            assert!(validate(&p).is_err(), "shots {shots} should be rejected");
        }
        let p = plan(json!({"action": "createJob", "deviceId": "d", "openQasm": "q"}));
        assert_eq!(validate(&p).unwrap_err(), "createJob requires a shot count");
    }

    #[test]
    fn create_job_accepts_numeric_string_shots() {
        let p = plan(json!({
            "action": "createJob", "deviceId": "ionq_sim", "shots": "200", "bitcode": "AAEC"
        }));
        assert_eq!(
            validate(&p).unwrap(),
            ValidatedAction::CreateJob(CreateJobRequest {
                device_id: "ionq_sim".into(),
                shots: 200,
                circuit: Circuit::Bitcode("AAEC".into()),
            })
        );
    }

    #[test]
    fn cancel_and_delete_need_job_id() {
        assert!(validate(&plan(json!({"action": "cancelJob"}))).is_err());
        assert!(validate(&plan(json!({"action": "deleteJob", "jobId": "  "}))).is_err());
        assert_eq!(
            validate(&plan(json!({"action": "deleteJob", "jobId": "abc123"}))).unwrap(),
            ValidatedAction::DeleteJob { job_id: "abc123".into() }
        );
    }

    #[test]
    fn send_chat_fills_defaults() {
        let action = validate(&plan(json!({"action": "sendChat", "prompt": "what is a qubit?"})));
        assert_eq!(
            action.unwrap(),
            ValidatedAction::SendChat(ChatRequest {
                prompt: "what is a qubit?".into(),
                model: "gpt-4o-mini".into(),
                stream: false,
            })
        );
        assert!(validate(&plan(json!({"action": "sendChat"}))).is_err());
    }

    #[tokio::test]
    async fn device_filters_outside_allow_list_are_dropped() {
        let service = Arc::new(StubJobService::new());
        let dispatcher = ActionDispatcher::new(service.clone());
        let p = plan(json!({"action": "getDevices", "provider": "AWS", "bogus": "x"}));

        let outcome = dispatch_once(&dispatcher, &p, "key").await;

        assert!(matches!(outcome, ActionOutcome::Success(ActionPayload::Devices(_))));
        assert_eq!(
            service.calls(),
            vec![RecordedCall::GetDevices(DeviceQuery {
                params: vec![("provider".into(), "AWS".into())]
            })]
        );
    }

    #[tokio::test]
    async fn list_jobs_is_never_cached() {
        let service = Arc::new(StubJobService::new());
        let dispatcher = ActionDispatcher::new(service.clone());
        let p = plan(json!({"action": "listJobs"}));

        let first = dispatch_once(&dispatcher, &p, "key").await;
        let second = dispatch_once(&dispatcher, &p, "key").await;

        assert_eq!(service.calls(), vec![RecordedCall::ListJobs, RecordedCall::ListJobs]);
        match (first, second) {
            (ActionOutcome::Success(a), ActionOutcome::Success(b)) => {
                assert_eq!(a.to_value(), b.to_value())
            }
            other => panic!("expected two successes, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn transport_failures_keep_their_kind() {
        let service = Arc::new(StubJobService::new().failing_with([StubFailure::Auth]));
        let dispatcher = ActionDispatcher::new(service.clone());

        let outcome = dispatch_once(&dispatcher, &plan(json!({"action": "getModels"})), "bad").await;

        assert_eq!(outcome.label(), "auth");
        assert_eq!(service.calls(), vec![RecordedCall::GetModels]);
    }
}
