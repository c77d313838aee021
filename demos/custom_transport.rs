//! # Custom Transport Example
//!
//! Shows how to implement the [`Transport`] trait with an in-process
//! loopback channel and drive a [`RoomSession`] against a tiny fake game
//! server. This is useful for:
//!
//! - **Testing**: exercise your UI logic without the real backend
//! - **Custom backends**: adapt any I/O layer (TCP, QUIC, a browser socket)
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_transport
//! ```

use std::time::Duration;

use async_trait::async_trait;
use escape_sync_client::{
    ClientMessage, RoomSession, SessionConfig, SessionUpdate, SyncError, Transport,
};
use serde_json::json;
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: Define a channel-based "loopback" transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of the loopback, handed to `RoomSession::start`.
pub struct LoopbackTransport {
    /// Messages the client sends go here.
    tx: mpsc::UnboundedSender<String>,
    /// Messages the fake server sends arrive here.
    rx: mpsc::UnboundedReceiver<String>,
}

/// Server half of the loopback: read what the client sent, inject replies.
pub struct LoopbackServer {
    pub rx: mpsc::UnboundedReceiver<String>,
    pub tx: mpsc::UnboundedSender<String>,
}

/// Create a connected `(transport, server)` pair.
fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: Implement the Transport trait
// ─────────────────────────────────────────────────────────────────────

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), SyncError> {
        self.tx
            .send(message)
            .map_err(|e| SyncError::TransportSend(e.to_string()))
    }

    /// `None` once the server half is dropped. Cancel-safe because
    /// `UnboundedReceiver::recv` is.
    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        self.rx.recv().await.map(Ok)
    }

    /// Dropping the channels is enough.
    async fn close(&mut self) -> Result<(), SyncError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: A fake game server for a single player
// ─────────────────────────────────────────────────────────────────────

async fn fake_server(mut server: LoopbackServer) {
    let greeting = json!({"type": "game_state", "player_id": 1, "image_data": "", "game_started": true});
    if server.tx.send(greeting.to_string()).is_err() {
        return;
    }

    while let Some(raw) = server.rx.recv().await {
        let Ok(msg) = serde_json::from_str::<ClientMessage>(&raw) else {
            tracing::warn!("Server got garbage: {raw}");
            continue;
        };
        tracing::info!("Server received: {msg:?}");
        let reply = match msg {
            ClientMessage::SetName { name } => json!({"type": "name_status", "ok": true, "name": name}),
            ClientMessage::GetAlarmState => {
                json!({"type": "alarm_state", "active": false, "remaining": 60})
            }
            ClientMessage::TriggerAlarm {
                alarm_type,
                triggered_by,
            } => json!({"type": "global_alarm", "alarm_type": alarm_type, "triggered_by": triggered_by}),
            ClientMessage::StopAlarm { stopped_by } => {
                json!({"type": "global_alarm_stop", "stopped_by": stopped_by})
            }
            _ => continue,
        };
        if server.tx.send(reply.to_string()).is_err() {
            break;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 4: Wire the session to the fake server
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (transport, server) = loopback_pair();
    tokio::spawn(fake_server(server));

    let mut session = RoomSession::start(transport, SessionConfig::new("Loopback"))?;

    // Trigger the alarm once named. When the minigame opens, freeze every
    // column at once; "AAAA" is the wrong word, so stop the alarm directly.
    let deadline = tokio::time::sleep(Duration::from_secs(10));
    tokio::pin!(deadline);
    loop {
        tokio::select! {
            update = session.next() => {
                let Some(update) = update else { break };
                tracing::info!("Update: {update:?}");
                match update {
                    SessionUpdate::NameAccepted { .. } => session.trigger_alarm()?,
                    SessionUpdate::MinigameOpened => {
                        for index in 0..4 {
                            session.click_slot(index)?;
                        }
                    }
                    SessionUpdate::MinigameFailed => {
                        session.client().stop_alarm()?;
                    }
                    SessionUpdate::Alarm { state, .. } if !state.active => {
                        tracing::info!("Alarm is off again");
                        break;
                    }
                    _ => {}
                }
            }
            () = &mut deadline => break,
        }
    }

    session.leave().await;
    tracing::info!("Done. Custom transport works!");
    Ok(())
}
