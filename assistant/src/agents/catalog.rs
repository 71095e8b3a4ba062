// Action catalog: the closed set of operations a plan may name

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActionKind {
    CreateJob,
    ListJobs,
    CancelJob,
    DeleteJob,
    GetDevices,
    SendChat,
    GetModels,
    None,
}

/// One parameter the planning model may fill in.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub required: bool,
    pub note: &'static str,
}

const fn required(name: &'static str, note: &'static str) -> ParamSpec {
    ParamSpec { name, required: true, note }
}

const fn optional(name: &'static str, note: &'static str) -> ParamSpec {
    ParamSpec { name, required: false, note }
}

const CREATE_JOB_PARAMS: &[ParamSpec] = &[
    required("deviceId", "identifier of the target device"),
    required("shots", "positive number of shots"),
    optional("openQasm", "circuit as OpenQASM source; give this or bitcode, never both"),
    optional("bitcode", "circuit as base64 bitcode; give this or openQasm, never both"),
];

const JOB_ID_PARAMS: &[ParamSpec] = &[required("jobId", "identifier of the job")];

const GET_DEVICES_PARAMS: &[ParamSpec] = &[
    optional("provider", "e.g. AWS, IBM, IonQ"),
    optional("type", "QPU or SIMULATOR"),
    optional("status", "ONLINE or OFFLINE"),
    optional("isAvailable", "true or false"),
];

const SEND_CHAT_PARAMS: &[ParamSpec] = &[
    required("prompt", "the message to forward to the chat model"),
    optional("model", "chat model name, defaults to gpt-4o-mini"),
    optional("stream", "true or false, defaults to false"),
];

/// Device filter keys that are forwarded; anything else is dropped.
pub const DEVICE_FILTER_KEYS: &[&str] = &["provider", "type", "status", "isAvailable"];

impl ActionKind {
    /// Every kind that maps to a job service operation.
    pub const ACTIONS: [ActionKind; 7] = [
        ActionKind::CreateJob,
        ActionKind::ListJobs,
        ActionKind::CancelJob,
        ActionKind::DeleteJob,
        ActionKind::GetDevices,
        ActionKind::SendChat,
        ActionKind::GetModels,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreateJob => "createJob",
            ActionKind::ListJobs => "listJobs",
            ActionKind::CancelJob => "cancelJob",
            ActionKind::DeleteJob => "deleteJob",
            ActionKind::GetDevices => "getDevices",
            ActionKind::SendChat => "sendChat",
            ActionKind::GetModels => "getModels",
            ActionKind::None => "none",
        }
    }

    /// Unknown names collapse to `None` rather than failing.
    pub fn parse(name: &str) -> ActionKind {
        ActionKind::ACTIONS
            .into_iter()
            .find(|kind| kind.as_str() == name.trim())
            .unwrap_or(ActionKind::None)
    }

    pub fn summary(&self) -> &'static str {
        match self {
            ActionKind::CreateJob => "submit a quantum job to a device",
            ActionKind::ListJobs => "list the user's quantum jobs",
            ActionKind::CancelJob => "cancel a queued or running job",
            ActionKind::DeleteJob => "delete a job record",
            ActionKind::GetDevices => "list quantum devices, optionally filtered",
            ActionKind::SendChat => "forward a free-form question to the chat model",
            ActionKind::GetModels => "list the available language models and their pricing",
            ActionKind::None => "no recognized action",
        }
    }

    pub fn params(&self) -> &'static [ParamSpec] {
        match self {
            ActionKind::CreateJob => CREATE_JOB_PARAMS,
            ActionKind::CancelJob | ActionKind::DeleteJob => JOB_ID_PARAMS,
            ActionKind::GetDevices => GET_DEVICES_PARAMS,
            ActionKind::SendChat => SEND_CHAT_PARAMS,
            ActionKind::ListJobs | ActionKind::GetModels | ActionKind::None => &[],
        }
    }

    pub fn required_params(&self) -> impl Iterator<Item = &'static str> {
        self.params().iter().filter(|p| p.required).map(|p| p.name)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Human-readable catalog embedded in the planning prompt.
pub fn describe_catalog() -> String {
    let mut out = String::new();
    for kind in ActionKind::ACTIONS {
        out.push_str(&format!("- {}: {}\n", kind.as_str(), kind.summary()));
        for param in kind.params() {
            let flag = if param.required { "required" } else { "optional" };
            out.push_str(&format!("    - {} ({}): {}\n", param.name, flag, param.note));
        }
    }
    out
}
