//! # WebSocket Game Example
//!
//! Joins a spin-wheel game server over WebSocket and follows the game until
//! it ends or Ctrl+C is pressed. The local identity comes from launch data in
//! `SPIN_WHEEL_INIT_DATA` (`{"user": {...}}`), falling back to the
//! development user.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example websocket_game
//! SPIN_WHEEL_URL=ws://my-server:3000/game cargo run --example websocket_game
//! ```

use std::time::Duration;

use spin_wheel_client::{
    ClientConfig, GameEvent, InitDataIdentity, SpinWheelClient, StaticIdentity,
    WebSocketTransport,
};

/// Default server URL when `SPIN_WHEEL_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:3000/game";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ── Configuration ───────────────────────────────────────────────
    let url = std::env::var("SPIN_WHEEL_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    tracing::info!("Connecting to {url}");
    let transport = WebSocketTransport::connect_with_timeout(&url, Duration::from_secs(10)).await?;

    let (mut client, mut events) = match std::env::var("SPIN_WHEEL_INIT_DATA") {
        Ok(raw) => SpinWheelClient::start(
            transport,
            &InitDataIdentity::parse(&raw)?,
            ClientConfig::new(),
        )?,
        Err(_) => SpinWheelClient::start(
            transport,
            &StaticIdentity::development(),
            ClientConfig::new(),
        )?,
    };
    tracing::info!("Joined as {}", client.identity().display_name());

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::info!("Event channel closed, exiting");
                    break;
                };
                match event {
                    GameEvent::RosterUpdated { .. } => {
                        let state = client.state();
                        tracing::info!("{}", state.status_message());
                        if state.can_start_game() {
                            if let Err(e) = client.start_game() {
                                tracing::warn!("could not start: {e}");
                            }
                        }
                    }
                    GameEvent::PlayerJoined { name } => tracing::info!("{name} joined"),
                    GameEvent::PlayerLeft { name } => tracing::info!("{name} left"),
                    GameEvent::RoundBegun { .. } | GameEvent::SpinSettled { .. } => {
                        tracing::info!("{}", client.state().status_message());
                    }
                    GameEvent::GameOver { .. } => {
                        if client.state().is_local_winner() {
                            tracing::info!("You won!");
                        } else {
                            tracing::info!("Game Over!");
                        }
                    }
                    GameEvent::CommandRejected { message }
                    | GameEvent::ConnectionError { message } => tracing::warn!("{message}"),
                    GameEvent::Disconnected { reason } => {
                        tracing::info!(?reason, "Disconnected");
                        break;
                    }
                    _ => {}
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}
