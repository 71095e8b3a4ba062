use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Mutex, OwnedMutexGuard};
use tracing::debug;
use uuid::Uuid;

use crate::credentials::CredentialPrompt;
use crate::models::OutboundMessage;

/// One connected UI. Created when the socket opens, closed when it drops.
pub struct Session {
    id: Uuid,
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    pending_credential: Mutex<Option<oneshot::Sender<Option<String>>>>,
    in_flight: Arc<Mutex<()>>,
    closed: AtomicBool,
}

/// Held for the duration of one request; dropping it frees the session.
pub type InFlightGuard = OwnedMutexGuard<()>;

impl Session {
    pub fn new(outbound: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self {
            id: Uuid::new_v4(),
            outbound,
            pending_credential: Mutex::new(None),
            in_flight: Arc::new(Mutex::new(())),
            closed: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns false once the UI side is gone.
    pub fn emit(&self, message: OutboundMessage) -> bool {
        if self.outbound.send(message).is_err() {
            debug!(session = %self.id, "UI channel closed, dropping frame");
            return false;
        }
        true
    }

    /// Claims the session for one request, or `None` if one is already running.
    pub fn try_begin(&self) -> Option<InFlightGuard> {
        self.in_flight.clone().try_lock_owned().ok()
    }

    /// Answers the pending credential prompt. Returns false if none was pending.
    pub async fn resolve_credential(&self, credential: Option<String>) -> bool {
        match self.pending_credential.lock().await.take() {
            Some(reply) => reply.send(credential).is_ok(),
            None => false,
        }
    }

    /// Any prompt still waiting resolves as declined.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.pending_credential.lock().await.take();
    }
}

#[async_trait]
impl CredentialPrompt for Session {
    async fn request_credential(&self, reason: &str) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        {
            // Checked under the lock: `close` sets the flag before emptying the slot.
            let mut pending = self.pending_credential.lock().await;
            if self.closed.load(Ordering::SeqCst) {
                return None;
            }
            *pending = Some(reply);
        }

        if !self.emit(OutboundMessage::CredentialRequired {
            reason: reason.to_string(),
        }) {
            self.pending_credential.lock().await.take();
            return None;
        }

        answer.await.ok().flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn credential_prompt_round_trips_through_the_ui() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(tx));

        let asking = {
            let session = session.clone();
            tokio::spawn(async move { session.request_credential("key rejected").await })
        };

        let frame = rx.recv().await.unwrap();
        assert_eq!(
            frame,
            OutboundMessage::CredentialRequired { reason: "key rejected".into() }
        );
        assert!(session.resolve_credential(Some("fresh".into())).await);
        assert_eq!(asking.await.unwrap().as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn dismissing_declines() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(tx));

        let asking = {
            let session = session.clone();
            tokio::spawn(async move { session.request_credential("key rejected").await })
        };
        rx.recv().await.unwrap();

        assert!(session.resolve_credential(None).await);
        assert_eq!(asking.await.unwrap(), None);
    }

    #[tokio::test]
    async fn closing_releases_a_waiting_prompt() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Arc::new(Session::new(tx));

        let asking = {
            let session = session.clone();
            tokio::spawn(async move { session.request_credential("key rejected").await })
        };
        rx.recv().await.unwrap();

        session.close().await;
        assert_eq!(asking.await.unwrap(), None);
        assert_eq!(session.request_credential("again").await, None);
    }

    #[tokio::test]
    async fn prompt_after_close_declines_without_asking() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let session = Session::new(tx);

        session.close().await;

        assert_eq!(session.request_credential("key rejected").await, None);
        assert!(rx.try_recv().is_err());
        assert!(!session.resolve_credential(Some("late".into())).await);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn close_racing_a_prompt_never_strands_it() {
        for _ in 0..500 {
            let (tx, _rx) = mpsc::unbounded_channel();
            let session = Arc::new(Session::new(tx));

            let asking = {
                let session = session.clone();
                tokio::spawn(async move { session.request_credential("key rejected").await })
            };
            let closing = {
                let session = session.clone();
                tokio::spawn(async move { session.close().await })
            };

            closing.await.unwrap();
            let answer = tokio::time::timeout(std::time::Duration::from_secs(5), asking)
                .await
                .expect("prompt resolved after close")
                .unwrap();
            assert_eq!(answer, None);
        }
    }

    #[tokio::test]
    async fn resolving_without_prompt_is_ignored() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Session::new(tx);
        assert!(!session.resolve_credential(Some("stray".into())).await);
    }

    #[test]
    fn only_one_request_in_flight() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let session = Session::new(tx);

        let guard = session.try_begin();
        assert!(guard.is_some());
        assert!(session.try_begin().is_none());

        drop(guard);
        assert!(session.try_begin().is_some());
    }
}
