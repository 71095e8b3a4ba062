// Summarizer Agent: renders an action outcome into the second-stage prompt
// and asks the model to write the user-visible answer

use std::fmt::Write as _;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::info;

use super::action::{ActionOutcome, ActionPayload};
use super::catalog::ActionKind;
use crate::error::ServiceError;
use crate::job_client::LanguageModel;
use crate::models::ModelInfo;

const ANSWER_RULES: &str = "Write the answer for the user following these rules:\n\
- Do not output raw JSON or dump the data structure.\n\
- Use natural paragraphs or short lines of prose.\n\
- If a unique identifier is present (for example a job id or device id), repeat it exactly.\n\
- When several items are listed, group them in a table.\n\
- If the result is an error or no action was recognized, explain it politely and suggest what the user could ask instead.";

/// Build the prompt for the second model call. Pure; never touches the network.
pub fn narration_prompt(kind: ActionKind, outcome: &ActionOutcome) -> String {
    match outcome {
        ActionOutcome::Success(ActionPayload::Chat(reply)) => chat_passthrough(reply),
        ActionOutcome::Success(ActionPayload::Models(models)) => model_catalog(models),
        ActionOutcome::Success(payload) => structural(
            &format!("Result of the {kind} action:"),
            &payload.to_value(),
        ),
        ActionOutcome::ValidationFailure(reason) => structural(
            &format!("The {kind} action could not be carried out:"),
            &json!({ "error": reason }),
        ),
        ActionOutcome::TransportError(e) => structural(
            &format!("The {kind} action failed:"),
            &json!({ "error": e.to_string(), "kind": e.kind().as_str() }),
        ),
    }
}

fn chat_passthrough(reply: &str) -> String {
    format!(
        "The chat model answered the user's question with the text below. \
         Restate it conversationally without changing its meaning.\n\n\
         {reply}\n\n{ANSWER_RULES}"
    )
}

fn model_catalog(models: &[ModelInfo]) -> String {
    let mut out = String::from("Available language models:\n");
    if models.is_empty() {
        out.push_str("- (none)\n");
    }
    for model in models {
        let _ = writeln!(out, "- {}", model.model);
        if !model.description.is_empty() {
            let _ = writeln!(out, "  - description: {}", model.description);
        }
        if let Some(pricing) = &model.pricing {
            let _ = writeln!(out, "  - input price: {} {}", pricing.input, pricing.units);
            let _ = writeln!(out, "  - output price: {} {}", pricing.output, pricing.units);
        }
    }
    out.push('\n');
    out.push_str(ANSWER_RULES);
    out
}

fn structural(heading: &str, value: &Value) -> String {
    let mut out = format!("{heading}\n");
    render_outline(value, 0, &mut out);
    out.push('\n');
    out.push_str(ANSWER_RULES);
    out
}

/// Nested `- key: value` outline. Strings are JSON-escaped so that
/// remote text cannot break out of its line.
pub fn render_outline(value: &Value, depth: usize, out: &mut String) {
    let indent = "  ".repeat(depth);
    match value {
        Value::Object(map) if map.is_empty() => {
            let _ = writeln!(out, "{indent}- (empty)");
        }
        Value::Object(map) => {
            for (key, child) in map {
                if is_composite(child) && !is_empty(child) {
                    let _ = writeln!(out, "{indent}- {key}:");
                    render_outline(child, depth + 1, out);
                } else {
                    let _ = writeln!(out, "{indent}- {key}: {}", scalar(child));
                }
            }
        }
        Value::Array(items) if items.is_empty() => {
            let _ = writeln!(out, "{indent}- (none)");
        }
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                if is_composite(item) && !is_empty(item) {
                    let _ = writeln!(out, "{indent}- [{}]", index + 1);
                    render_outline(item, depth + 1, out);
                } else {
                    let _ = writeln!(out, "{indent}- {}", scalar(item));
                }
            }
        }
        other => {
            let _ = writeln!(out, "{indent}- {}", scalar(other));
        }
    }
}

fn is_composite(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => Value::String(s.clone()).to_string(),
        Value::Object(_) => "(empty)".to_string(),
        Value::Array(_) => "(none)".to_string(),
        other => other.to_string(),
    }
}

pub struct SummarizerAgent {
    model: Arc<dyn LanguageModel>,
}

impl SummarizerAgent {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Second model call on an already rendered prompt.
    pub async fn narrate(
        &self,
        credential: &str,
        model: &str,
        prompt: &str,
    ) -> Result<String, ServiceError> {
        info!("Summarizer: Writing answer with model {}", model);
        let answer = self.model.complete(credential, model, prompt).await?;
        Ok(answer.trim().to_string())
    }
}
