use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use warp::ws::{Message, WebSocket};

use crate::error::Result;
use crate::session::{SessionController, SessionView};

/// Frames allowed to wait for the socket. Snapshot rendering stalls behind
/// a full queue, so a client that stops reading only ever costs one frame.
const OUTBOUND_BUFFER: usize = 1;

/// Commands an operator can send over the session socket
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SessionCommand {
    Connect,
    Disconnect,
    ToggleSelection { student_id: u32 },
    CreatePeerNode { name: String },
    SendCoachMessage { message: String },
    RunAnalysis,
    Search { term: String },
}

/// Messages pushed to the operator
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SessionEvent {
    Snapshot(SessionView),
    Error { message: String },
}

pub async fn handle_session_websocket(websocket: WebSocket, controller: Arc<SessionController>) {
    tracing::info!("New session WebSocket connection established");

    let (mut ws_sender, mut ws_receiver) = websocket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    let (search_tx, search_rx) = watch::channel(String::new());

    // Spawn task to send messages to client
    let sender_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if let Err(e) = ws_sender.send(message).await {
                tracing::error!(error = %e, "Failed to send WebSocket message");
                break;
            }
        }
    });

    let snapshot_task = tokio::spawn(push_snapshots(controller.clone(), search_rx, tx.clone()));

    while let Some(result) = ws_receiver.next().await {
        match result {
            Ok(message) if message.is_close() => break,
            Ok(message) => handle_websocket_message(&controller, &search_tx, &tx, message).await,
            Err(e) => {
                tracing::error!(error = %e, "WebSocket error");
                break;
            }
        }
    }

    snapshot_task.abort();
    sender_task.abort();
    tracing::info!("Session WebSocket connection closed");
}

/// Pushes a snapshot now and again after every session or search change
async fn push_snapshots(
    controller: Arc<SessionController>,
    mut search: watch::Receiver<String>,
    tx: mpsc::Sender<Message>,
) {
    let mut revisions = controller.subscribe();

    loop {
        revisions.borrow_and_update();
        let term = search.borrow_and_update().clone();
        let view = controller.snapshot(&term).await;
        if send_event(&tx, &SessionEvent::Snapshot(view)).await.is_err() {
            break;
        }

        tokio::select! {
            changed = revisions.changed() => if changed.is_err() { break },
            changed = search.changed() => if changed.is_err() { break },
        }
    }
}

async fn handle_websocket_message(
    controller: &SessionController,
    search: &watch::Sender<String>,
    tx: &mpsc::Sender<Message>,
    message: Message,
) {
    let Ok(text) = message.to_str() else {
        return;
    };
    tracing::debug!("Received session message: {}", text);

    let command = match serde_json::from_str::<SessionCommand>(text) {
        Ok(command) => command,
        Err(e) => {
            tracing::error!(error = %e, raw_message = %text, "Failed to parse session message");
            let _ = send_event(tx, &SessionEvent::Error {
                message: format!("Invalid command: {}", e),
            })
            .await;
            return;
        }
    };

    if let Err(e) = dispatch(controller, search, command).await {
        let _ = send_event(tx, &SessionEvent::Error {
            message: e.to_string(),
        })
        .await;
    }
}

async fn dispatch(
    controller: &SessionController,
    search: &watch::Sender<String>,
    command: SessionCommand,
) -> Result<()> {
    match command {
        SessionCommand::Connect => controller.connect().await,
        SessionCommand::Disconnect => controller.disconnect().await,
        SessionCommand::ToggleSelection { student_id } => controller.toggle_selection(student_id).await,
        SessionCommand::CreatePeerNode { name } => controller.create_peer_node(&name).await,
        SessionCommand::SendCoachMessage { message } => controller.send_coach_message(&message).await,
        SessionCommand::RunAnalysis => controller.run_analysis().await,
        SessionCommand::Search { term } => {
            search.send_replace(term);
            Ok(())
        }
    }
}

async fn send_event(tx: &mpsc::Sender<Message>, event: &SessionEvent) -> Result<()> {
    let json = serde_json::to_string(event)?;
    tx.send(Message::text(json))
        .await
        .map_err(|_| crate::error::HiveError::internal("WebSocket sender closed"))
}
