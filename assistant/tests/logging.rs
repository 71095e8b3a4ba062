use std::io;
use std::sync::{Arc, Mutex};

use job_assistant::credentials::MemoryCredentialStore;
use job_assistant::models::InboundMessage;
use job_assistant::orchestrator::Orchestrator;
use job_assistant::session::Session;
use job_assistant::testing::{test_metrics, ModelReply, ScriptedModel, StubJobService};
use tokio::sync::mpsc;
use tracing_subscriber::fmt::MakeWriter;

/// Collects formatted log output in memory.
#[derive(Clone, Default)]
struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    fn lines(&self) -> Vec<String> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

#[tokio::test]
async fn stage_logs_carry_session_and_action() {
    let logs = CapturedLogs::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::INFO)
        .finish();
    let _default = tracing::subscriber::set_default(subscriber);

    let orchestrator = Orchestrator::new(
        Arc::new(StubJobService::new()),
        Arc::new(ScriptedModel::new([
            ModelReply::Text("```json\n{\"action\":\"listJobs\"}\n```".to_string()),
            ModelReply::Text("You have two jobs.".to_string()),
        ])),
        Arc::new(MemoryCredentialStore::new(Some("key".to_string()))),
        test_metrics(),
        "gpt-4o-mini",
    );
    let (tx, _rx) = mpsc::unbounded_channel();
    let session = Session::new(tx);
    let session_tag = format!("session={}", session.id());

    orchestrator
        .handle(
            &session,
            InboundMessage::SendMessage {
                content: "list my jobs".to_string(),
                model: String::new(),
            },
        )
        .await;

    let lines = logs.lines();
    for stage in ["Planner:", "Action: Executing", "Summarizer:"] {
        let line = lines
            .iter()
            .find(|line| line.contains(stage))
            .unwrap_or_else(|| panic!("no {stage} line in {lines:#?}"));
        assert!(line.contains(&session_tag), "{line}");
    }

    let executing = lines.iter().find(|line| line.contains("Action: Executing")).unwrap();
    assert!(executing.contains("action=listJobs"), "{executing}");
}
