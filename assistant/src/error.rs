use thiserror::Error;

/// Two-way failure split the pipeline cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The credential was rejected (or there was none to send).
    Auth,
    Other,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Other => "other",
        }
    }
}

/// Failure of a single call into the job service or its chat endpoint.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Job service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Unreadable response body: {0}")]
    Decode(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Auth(_) => ErrorKind::Auth,
            _ => ErrorKind::Other,
        }
    }

    pub fn is_auth(&self) -> bool {
        self.kind() == ErrorKind::Auth
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Decode(err.to_string())
    }
}

/// Stage of the request pipeline a terminal failure came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Planning,
    Dispatch,
    Narration,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Planning => "planning",
            Stage::Dispatch => "dispatch",
            Stage::Narration => "narration",
        }
    }
}

/// Terminal failure of one user request. Shown to the UI as an `error` frame.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Could not plan the request: {0}")]
    Planning(#[source] ServiceError),

    #[error("The job service request failed: {0}")]
    Dispatch(#[source] ServiceError),

    #[error("Could not write the answer: {0}")]
    Narration(#[source] ServiceError),

    #[error("A request is already in progress")]
    Busy,
}

impl PipelineError {
    pub fn at(stage: Stage, err: ServiceError) -> Self {
        match stage {
            Stage::Planning => PipelineError::Planning(err),
            Stage::Dispatch => PipelineError::Dispatch(err),
            Stage::Narration => PipelineError::Narration(err),
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Planning(_) => Some(Stage::Planning),
            PipelineError::Dispatch(_) => Some(Stage::Dispatch),
            PipelineError::Narration(_) => Some(Stage::Narration),
            PipelineError::Busy => None,
        }
    }

    pub fn is_auth(&self) -> bool {
        match self {
            PipelineError::Planning(e) | PipelineError::Dispatch(e) | PipelineError::Narration(e) => {
                e.is_auth()
            }
            PipelineError::Busy => false,
        }
    }
}
