use std::sync::Arc;

use tracing::{error, field, info_span, warn, Instrument, Span};

use crate::agents::action::ActionDispatcher;
use crate::agents::catalog::ActionKind;
use crate::agents::planner::PlannerAgent;
use crate::agents::recovery::ErrorRecoveryController;
use crate::agents::summarizer::{narration_prompt, SummarizerAgent};
use crate::credentials::{CredentialPrompt, CredentialStore};
use crate::error::{PipelineError, Stage};
use crate::job_client::{JobService, LanguageModel};
use crate::metrics::Metrics;
use crate::models::{InboundMessage, ModelInfo, OutboundMessage};
use crate::session::Session;

/// Runs one user request: plan, dispatch, narrate.
pub struct Orchestrator {
    planner: PlannerAgent,
    dispatcher: ActionDispatcher,
    summarizer: SummarizerAgent,
    credentials: Arc<dyn CredentialStore>,
    metrics: Arc<Metrics>,
    default_model: String,
}

impl Orchestrator {
    pub fn new(
        service: Arc<dyn JobService>,
        model: Arc<dyn LanguageModel>,
        credentials: Arc<dyn CredentialStore>,
        metrics: Arc<Metrics>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            planner: PlannerAgent::new(model.clone()),
            dispatcher: ActionDispatcher::new(service),
            summarizer: SummarizerAgent::new(model),
            credentials,
            metrics,
            default_model: default_model.into(),
        }
    }

    /// Entry point for a UI request. Credential replies are routed by the
    /// socket loop and never reach here. Everything logged while the request
    /// runs carries the session id, and the action once it is planned.
    pub async fn handle(&self, session: &Session, message: InboundMessage) {
        let span = info_span!(
            "request",
            session = %session.id(),
            action = field::Empty
        );
        self.handle_request(session, message).instrument(span).await
    }

    async fn handle_request(&self, session: &Session, message: InboundMessage) {
        if matches!(
            message,
            InboundMessage::UpdateCredential { .. } | InboundMessage::DismissCredential
        ) {
            warn!("Credential reply with no prompt pending");
            return;
        }

        let Some(_guard) = session.try_begin() else {
            warn!("Rejecting request: another one is in progress");
            self.metrics.record_failure("busy");
            report_error(session, &PipelineError::Busy);
            return;
        };

        match message {
            InboundMessage::SendMessage { content, model } => {
                session.emit(OutboundMessage::Typing);
                match self.answer(session, &content, &model).await {
                    Ok(content) => {
                        session.emit(OutboundMessage::ClearError);
                        session.emit(OutboundMessage::Answer { content });
                    }
                    Err(e) => self.fail(session, e),
                }
            }
            InboundMessage::FetchModels => match self.fetch_models(session).await {
                Ok(models) => {
                    session.emit(OutboundMessage::ClearError);
                    session.emit(OutboundMessage::Models { models });
                }
                Err(e) => self.fail(session, e),
            },
            InboundMessage::UpdateCredential { .. } | InboundMessage::DismissCredential => {}
        }
    }

    /// The full pipeline. Each stage gets its own recovery, so an auth
    /// failure only repeats the stage that hit it.
    pub async fn answer(
        &self,
        prompt: &dyn CredentialPrompt,
        content: &str,
        model: &str,
    ) -> Result<String, PipelineError> {
        let model = self.model_or_default(model);
        let mut credential = self.current_credential().await;
        let mut recovery =
            ErrorRecoveryController::new(self.credentials.as_ref(), prompt, &self.metrics);

        let planner = &self.planner;
        let plan = recovery
            .run(Stage::Planning, &mut credential, move |c| async move {
                planner.plan(&c, model, content).await
            })
            .await?;

        Span::current().record("action", field::display(plan.action));

        let dispatcher = &self.dispatcher;
        let recovery_ref = &mut recovery;
        let credential_ref = &mut credential;
        let dispatched = dispatcher
            .dispatch(&plan, move |action| async move {
                let action = &action;
                recovery_ref
                    .run(Stage::Dispatch, credential_ref, move |c| async move {
                        dispatcher.execute(action, &c).await
                    })
                    .await
            })
            .await;
        let outcome = match dispatched {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_dispatch_failure(plan.action, &e);
                return Err(e);
            }
        };
        self.metrics.record_action(plan.action, outcome.label());

        let prompt_text = narration_prompt(plan.action, &outcome);
        let summarizer = &self.summarizer;
        let prompt_text = prompt_text.as_str();
        recovery
            .run(Stage::Narration, &mut credential, move |c| async move {
                summarizer.narrate(&c, model, prompt_text).await
            })
            .await
    }

    /// `getModels` without planning or narration.
    pub async fn fetch_models(
        &self,
        prompt: &dyn CredentialPrompt,
    ) -> Result<Vec<ModelInfo>, PipelineError> {
        Span::current().record("action", field::display(ActionKind::GetModels));
        let mut credential = self.current_credential().await;
        let mut recovery =
            ErrorRecoveryController::new(self.credentials.as_ref(), prompt, &self.metrics);

        let dispatcher = &self.dispatcher;
        let models = recovery
            .run(Stage::Dispatch, &mut credential, move |c| async move {
                dispatcher.models(&c).await
            })
            .await
            .map_err(|e| {
                self.record_dispatch_failure(ActionKind::GetModels, &e);
                e
            })?;
        self.metrics.record_action(ActionKind::GetModels, "success");
        Ok(models)
    }

    fn model_or_default<'a>(&'a self, requested: &'a str) -> &'a str {
        let requested = requested.trim();
        if requested.is_empty() {
            &self.default_model
        } else {
            requested
        }
    }

    async fn current_credential(&self) -> String {
        match self.credentials.get().await {
            Ok(credential) => credential.unwrap_or_default(),
            Err(e) => {
                warn!("Could not read stored credential: {:#}", e);
                String::new()
            }
        }
    }

    fn record_dispatch_failure(&self, kind: ActionKind, err: &PipelineError) {
        let label = if err.is_auth() { "auth" } else { "other" };
        self.metrics.record_action(kind, label);
    }

    fn fail(&self, session: &Session, err: PipelineError) {
        let stage = err.stage().map(|s| s.as_str()).unwrap_or("busy");
        error!(stage, "Request failed: {}", err);
        self.metrics.record_failure(stage);
        report_error(session, &err);
    }
}

/// Every terminal failure is exactly one `clearError` followed by one `error`.
fn report_error(session: &Session, err: &PipelineError) {
    session.emit(OutboundMessage::ClearError);
    session.emit(OutboundMessage::Error {
        message: err.to_string(),
    });
}
