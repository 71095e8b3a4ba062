// Error recovery: one interactive credential refresh and a single retry of the failed stage

use std::future::Future;

use tracing::{info, warn};

use crate::credentials::{CredentialPrompt, CredentialStore};
use crate::error::{PipelineError, ServiceError, Stage};
use crate::metrics::Metrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
    Idle,
    AwaitingCredentialRefresh,
    Retried,
    Abandoned,
}

pub struct ErrorRecoveryController<'a> {
    store: &'a dyn CredentialStore,
    prompt: &'a dyn CredentialPrompt,
    metrics: &'a Metrics,
    state: RecoveryState,
}

impl<'a> ErrorRecoveryController<'a> {
    pub fn new(
        store: &'a dyn CredentialStore,
        prompt: &'a dyn CredentialPrompt,
        metrics: &'a Metrics,
    ) -> Self {
        Self {
            store,
            prompt,
            metrics,
            state: RecoveryState::Idle,
        }
    }

    pub fn state(&self) -> RecoveryState {
        self.state
    }

    /// Run one pipeline stage. On an auth failure the user is asked for a new
    /// credential and `op` is run once more with it; `credential` is updated
    /// in place so later stages reuse the refreshed value.
    pub async fn run<T, F, Fut>(
        &mut self,
        stage: Stage,
        credential: &mut String,
        mut op: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        self.state = RecoveryState::Idle;

        let failure = match op(credential.clone()).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_auth() => e,
            Err(e) => return Err(PipelineError::at(stage, e)),
        };

        self.state = RecoveryState::AwaitingCredentialRefresh;
        info!(stage = stage.as_str(), "Recovery: credential rejected, asking for a new one");

        let reason = format!(
            "The job service rejected your API key while {}. Enter a new key to retry.",
            stage_activity(stage)
        );
        let Some(fresh) = self.refresh(&reason).await else {
            self.state = RecoveryState::Abandoned;
            self.metrics.record_refresh("abandoned");
            info!(stage = stage.as_str(), "Recovery: refresh declined");
            return Err(PipelineError::at(stage, failure));
        };

        *credential = fresh.clone();
        self.state = RecoveryState::Retried;
        info!(stage = stage.as_str(), "Recovery: retrying with refreshed credential");

        match op(fresh).await {
            Ok(value) => {
                self.metrics.record_refresh("retried");
                Ok(value)
            }
            Err(e) => {
                self.metrics.record_refresh("retry_failed");
                warn!(stage = stage.as_str(), "Recovery: retry failed: {}", e);
                Err(PipelineError::at(stage, e))
            }
        }
    }

    async fn refresh(&self, reason: &str) -> Option<String> {
        let fresh = self.prompt.request_credential(reason).await?;
        let fresh = fresh.trim().to_string();
        if fresh.is_empty() {
            return None;
        }
        if let Err(e) = self.store.save(&fresh).await {
            warn!("Recovery: could not persist refreshed credential: {:#}", e);
        }
        Some(fresh)
    }
}

fn stage_activity(stage: Stage) -> &'static str {
    match stage {
        Stage::Planning => "planning your request",
        Stage::Dispatch => "running the requested action",
        Stage::Narration => "writing the answer",
    }
}
