use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// Job service records

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Empty when the remote record carries no id.
    #[serde(default, alias = "qbraidJobId", skip_serializing_if = "String::is_empty")]
    pub job_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, alias = "qbraidDeviceId", skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shots: Option<u64>,
    /// Remaining remote fields, kept so the answer can mention them.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Body returned by cancel and delete: a message plus the affected job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobReceipt {
    pub message: String,
    pub job: Job,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    #[serde(default, alias = "qbraidId", skip_serializing_if = "String::is_empty")]
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub device_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_available: Option<bool>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
    #[serde(default = "default_pricing_units")]
    pub units: String,
}

fn default_pricing_units() -> String {
    "per 1M tokens".to_string()
}

/// A language model offered by the chat endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    #[serde(alias = "name")]
    pub model: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(alias = "response")]
    pub content: String,
}

// Validated request bodies

/// The two mutually exclusive ways a circuit can be submitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Circuit {
    OpenQasm(String),
    Bitcode(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateJobRequest {
    pub device_id: String,
    pub shots: u64,
    #[serde(flatten)]
    pub circuit: Circuit,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    pub prompt: String,
    pub model: String,
    pub stream: bool,
}

/// Device filters that survived the allow-list, in query-string form.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DeviceQuery {
    pub params: Vec<(String, String)>,
}

impl DeviceQuery {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

// UI protocol

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum InboundMessage {
    FetchModels,
    SendMessage {
        content: String,
        #[serde(default)]
        model: String,
    },
    UpdateCredential {
        credential: String,
    },
    DismissCredential,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OutboundMessage {
    Typing,
    Models { models: Vec<ModelInfo> },
    Answer { content: String },
    Error { message: String },
    ClearError,
    CredentialRequired { reason: String },
}
