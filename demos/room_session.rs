//! # Room Session Example
//!
//! Joins a room on a running escape-room backend and plays along:
//!
//! 1. Connect to the room socket via WebSocket
//! 2. Claim a display name (retrying with a suffix if it is taken)
//! 3. Trigger the room alarm
//! 4. Solve the unlock minigame as the letters spin past
//! 5. Leave gracefully on Ctrl+C or disconnect
//!
//! ## Running
//!
//! ```sh
//! # Start the backend on localhost:8000, then:
//! cargo run --example room_session
//!
//! # Override backend, room and name:
//! ESCAPE_BACKEND_URL=https://escape.example.com ESCAPE_ROOM=R7 ESCAPE_PLAYER=Zoe \
//!     cargo run --example room_session
//! ```

use escape_sync_client::error_codes::NameRejectReason;
use escape_sync_client::slot::DEFAULT_TARGET;
use escape_sync_client::{BackendEndpoint, RoomSession, SessionConfig, SessionUpdate};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let endpoint = BackendEndpoint::from_env();
    let room_id = std::env::var("ESCAPE_ROOM").unwrap_or_else(|_| "R1".to_string());
    let name = std::env::var("ESCAPE_PLAYER").unwrap_or_else(|_| "RustPlayer".to_string());
    tracing::info!("Joining room {room_id} on {}", endpoint.room_socket_url(&room_id));

    // ── Connect ─────────────────────────────────────────────────────
    let mut session = RoomSession::connect(&endpoint, &room_id, SessionConfig::new(&name)).await?;
    let target: Vec<char> = DEFAULT_TARGET.chars().collect();
    let mut name_attempt = 0u32;

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            update = session.next() => {
                let Some(update) = update else {
                    tracing::info!("Session ended");
                    break;
                };

                match update {
                    SessionUpdate::NameAccepted { name } => {
                        tracing::info!("Playing as {name}, triggering the alarm");
                        session.trigger_alarm()?;
                    }

                    SessionUpdate::NameRejected { reason } => {
                        if let Err(e) = session.confirmed_name() {
                            tracing::warn!("{e}");
                        }
                        if reason == NameRejectReason::Duplicate {
                            name_attempt += 1;
                            session.client().set_name(format!("{name}{name_attempt}"))?;
                        }
                    }

                    SessionUpdate::Alarm { phase, state } => {
                        tracing::info!(
                            "Alarm {phase:?} ({}s left, triggered by {:?})",
                            state.remaining_seconds,
                            state.triggered_by
                        );
                    }

                    SessionUpdate::TargetFound(discovery) => {
                        tracing::info!("Target found: {discovery:?}");
                    }

                    // ── Minigame: freeze columns on their letter ─────
                    SessionUpdate::MinigameOpened | SessionUpdate::MinigameChanged(_) => {
                        let ready: Vec<usize> = session
                            .minigame()
                            .map(|m| {
                                m.machine()
                                    .columns()
                                    .iter()
                                    .zip(&target)
                                    .enumerate()
                                    .filter(|(_, (c, want))| c.is_spinning() && c.letter() == **want)
                                    .map(|(i, _)| i)
                                    .collect()
                            })
                            .unwrap_or_default();
                        for index in ready {
                            session.click_slot(index)?;
                        }
                    }

                    SessionUpdate::MinigameSolved => {
                        tracing::info!("Unlocked! Waiting for the room to confirm");
                    }

                    SessionUpdate::Disconnected { reason } => {
                        tracing::warn!("Disconnected: {}", reason.as_deref().unwrap_or("unknown"));
                        break;
                    }

                    other => {
                        tracing::debug!("Update: {other:?}");
                    }
                }
            }

            // Ctrl+C: leave the room.
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, leaving the room");
                break;
            }
        }
    }

    // ── Cleanup ─────────────────────────────────────────────────────
    session.leave().await;
    tracing::info!("Left the room. Goodbye!");
    Ok(())
}
