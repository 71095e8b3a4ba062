use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use warp::ws::{Message, WebSocket};

use crate::models::{InboundMessage, OutboundMessage};
use crate::orchestrator::Orchestrator;
use crate::session::Session;

/// Drives one UI connection. Requests run on their own tasks so that a
/// credential reply can arrive while the request that asked for it waits.
pub async fn handle_socket(socket: WebSocket, orchestrator: Arc<Orchestrator>) {
    let (mut sink, mut stream) = socket.split();
    let (outbound, mut frames) = mpsc::unbounded_channel::<OutboundMessage>();
    let session = Arc::new(Session::new(outbound));
    info!(session = %session.id(), "UI session opened");

    // Drains once the last request holding the session has finished.
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode UI frame: {}", e);
                    continue;
                }
            };
            if sink.send(Message::text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!(session = %session.id(), "WebSocket error: {}", e);
                break;
            }
        };
        if frame.is_close() {
            break;
        }
        let Ok(text) = frame.to_str() else {
            continue;
        };

        match serde_json::from_str::<InboundMessage>(text) {
            Ok(InboundMessage::UpdateCredential { credential }) => {
                if !session.resolve_credential(Some(credential)).await {
                    warn!(session = %session.id(), "Credential update with no prompt pending");
                }
            }
            Ok(InboundMessage::DismissCredential) => {
                session.resolve_credential(None).await;
            }
            Ok(request) => {
                let orchestrator = orchestrator.clone();
                let session = session.clone();
                tokio::spawn(async move { orchestrator.handle(&session, request).await });
            }
            Err(e) => warn!(session = %session.id(), "Ignoring undecodable frame: {}", e),
        }
    }

    session.close().await;
    info!(session = %session.id(), "UI session closed");
}
