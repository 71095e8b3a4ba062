// Planner Agent: turns the user's free text into a single structured Plan

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use super::catalog::{describe_catalog, ActionKind};
use crate::error::ServiceError;
use crate::job_client::LanguageModel;

/// Structured intent extracted from the planning model's reply.
#[derive(Debug, Clone, PartialEq)]
pub struct Plan {
    pub action: ActionKind,
    pub params: Map<String, Value>,
}

impl Plan {
    pub fn none() -> Self {
        Self {
            action: ActionKind::None,
            params: Map::new(),
        }
    }

    pub fn new(action: ActionKind, params: Map<String, Value>) -> Self {
        Self { action, params }
    }

    /// The plan as the flat object the planning model is asked to emit.
    pub fn to_value(&self) -> Value {
        let mut object = self.params.clone();
        object.insert("action".to_string(), Value::String(self.action.to_string()));
        Value::Object(object)
    }
}

/// Why a reply did not yield a plan. Never surfaced to the user.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanRejection {
    NoJsonBlock,
    Malformed(String),
    NotAnObject,
}

fn json_block() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?s)```(?i:json)[ \t]*\r?\n?(.*?)```").expect("static pattern is valid")
    })
}

/// Parse the first fenced ```json block of `reply` into a Plan.
pub fn try_extract_plan(reply: &str) -> Result<Plan, PlanRejection> {
    let block = json_block()
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .ok_or(PlanRejection::NoJsonBlock)?;

    let value: Value = serde_json::from_str(block.as_str().trim())
        .map_err(|e| PlanRejection::Malformed(e.to_string()))?;
    let Value::Object(mut params) = value else {
        return Err(PlanRejection::NotAnObject);
    };

    let action = match params.remove("action") {
        Some(Value::String(name)) => ActionKind::parse(&name),
        _ => ActionKind::None,
    };
    Ok(Plan::new(action, params))
}

/// Lossy variant used by the pipeline: anything unusable becomes `Plan::none()`.
pub fn extract_plan(reply: &str) -> Plan {
    match try_extract_plan(reply) {
        Ok(plan) => plan,
        Err(rejection) => {
            warn!(?rejection, "Planner: reply did not contain a usable plan, treating as no action");
            Plan::none()
        }
    }
}

pub fn planning_prompt(user_text: &str) -> String {
    format!(
        "You translate a user's request into exactly one operation against a quantum job service.\n\
         \n\
         Available actions:\n\
         {catalog}\n\
         Reply with a single fenced code block tagged json containing one object. \
         The object has an \"action\" field naming one of the actions above and one \
         top-level field per parameter, for example:\n\
         ```json\n\
         {{\"action\": \"cancelJob\", \"jobId\": \"abc123\"}}\n\
         ```\n\
         If no action fits, use {{\"action\": \"none\"}}. Do not invent identifiers the \
         user did not give.\n\
         \n\
         User request:\n\
         {user_text}",
        catalog = describe_catalog(),
    )
}

pub struct PlannerAgent {
    model: Arc<dyn LanguageModel>,
}

impl PlannerAgent {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// First model call. Only the model call can fail; extraction degrades to `none`.
    pub async fn plan(
        &self,
        credential: &str,
        model: &str,
        user_text: &str,
    ) -> Result<Plan, ServiceError> {
        info!("Planner: Planning request with model {}", model);

        let reply = self
            .model
            .complete(credential, model, &planning_prompt(user_text))
            .await?;
        debug!(reply_len = reply.len(), "Planner: model replied");

        let plan = extract_plan(&reply);
        info!("Planner: Selected action {}", plan.action);
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_fenced_plan_exactly() {
        let reply = "Sure, cancelling it.\n```json\n{\"action\":\"cancelJob\",\"jobId\":\"abc123\"}\n```\nDone.";
        let plan = extract_plan(reply);
        assert_eq!(plan.action, ActionKind::CancelJob);
        assert_eq!(plan.to_value(), json!({"action": "cancelJob", "jobId": "abc123"}));
    }

    #[test]
    fn round_trips_nested_parameters() {
        let original = json!({
            "action": "createJob",
            "deviceId": "aws_sv1",
            "shots": 1000,
            "openQasm": "OPENQASM 3;\nqubit q;\nh q;"
        });
        let reply = format!("```json\n{}\n```", serde_json::to_string_pretty(&original).unwrap());
        assert_eq!(extract_plan(&reply).to_value(), original);
    }

    #[test]
    fn only_the_first_block_counts() {
        let reply = "```json\n{\"action\":\"listJobs\"}\n```\n```json\n{\"action\":\"getModels\"}\n```";
        assert_eq!(extract_plan(reply).action, ActionKind::ListJobs);
    }

    #[test]
    fn missing_block_degrades_to_none() {
        assert_eq!(extract_plan("I'm not sure what you mean."), Plan::none());
        assert_eq!(
            try_extract_plan("{\"action\":\"listJobs\"}"),
            Err(PlanRejection::NoJsonBlock)
        );
    }

    #[test]
    fn malformed_block_degrades_to_none() {
        let reply = "```json\n{\"action\": \"listJobs\",\n```";
        assert!(matches!(try_extract_plan(reply), Err(PlanRejection::Malformed(_))));
        assert_eq!(extract_plan(reply), Plan::none());
    }

    #[test]
    fn non_object_block_degrades_to_none() {
        assert_eq!(
            try_extract_plan("```json\n[1, 2]\n```"),
            Err(PlanRejection::NotAnObject)
        );
    }

    #[test]
    fn unknown_action_keeps_params_but_is_none() {
        let plan = extract_plan("```json\n{\"action\":\"reboot\",\"deviceId\":\"x\"}\n```");
        assert_eq!(plan.action, ActionKind::None);
        assert_eq!(plan.params.get("deviceId"), Some(&json!("x")));
    }

    #[test]
    fn prompt_carries_catalog_and_user_text() {
        let prompt = planning_prompt("cancel job abc123");
        assert!(prompt.contains("cancelJob"));
        assert!(prompt.contains("getDevices"));
        assert!(prompt.ends_with("cancel job abc123"));
    }
}
