//! # Loopback Game Example
//!
//! Plays a complete four-player, three-round game against a toy server
//! running in the same process:
//!
//! 1. The local player joins; three bots fill the lobby
//! 2. The client starts the game once the start guard allows it
//! 3. Each round the wheel arms, receives the server's winner, and settles
//! 4. The final winners are announced and the client shuts down
//!
//! ## Running
//!
//! ```sh
//! cargo run --example loopback_game
//! RUST_LOG=spin_wheel_client=debug cargo run --example loopback_game
//! ```

use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;
use std::time::Duration;

use spin_wheel_client::protocol::{ClientMessage, Player, ServerMessage};
use spin_wheel_client::wheel::{segment_under_pointer, WheelTiming};
use spin_wheel_client::{
    ChannelTransport, ClientConfig, GameEvent, ServerEnd, SpinWheelClient, StaticIdentity,
};

const ROUNDS: u32 = 3;
const BOTS: [&str; 3] = ["Ada", "Grace", "Linus"];
const SPIN: Duration = Duration::from_millis(1500);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (transport, server) = ChannelTransport::pair();
    let server_task = tokio::spawn(run_server(server));

    let config = ClientConfig::new().with_wheel_timing(WheelTiming {
        spin_duration: SPIN,
        ..WheelTiming::default()
    });
    let (mut client, mut events) =
        SpinWheelClient::start(transport, &StaticIdentity::development(), config)?;

    // ── Event loop ──────────────────────────────────────────────────
    while let Some(event) = events.recv().await {
        match event {
            GameEvent::PlayerJoined { name } => tracing::info!("{name} joined"),
            GameEvent::RosterUpdated { players } => {
                tracing::info!("{}", client.state().status_message());
                if client.state().can_start_game() {
                    let ack = client.start_game()?;
                    tracing::info!(%ack, "asked the server to start with {} players", players.len());
                }
            }
            GameEvent::GameStarted { total_rounds } => {
                tracing::info!("game started: {total_rounds} rounds");
            }
            GameEvent::RoundBegun { round, total_rounds } => {
                tracing::info!("round {round}/{total_rounds}: {}", client.state().status_message());
            }
            GameEvent::SpinStarted {
                winner_index,
                target_rotation,
            } => {
                let segments = client.wheel().segments.len();
                tracing::info!(
                    "wheel turning to {target_rotation:.1}° (lands on segment {:?}, expected {winner_index})",
                    segment_under_pointer(target_rotation, segments)
                );
            }
            GameEvent::SpinSettled { .. } => {
                tracing::info!("{}", client.state().status_message());
            }
            GameEvent::SpinAborted { reason } => tracing::warn!(?reason, "spin aborted"),
            GameEvent::GameOver { winners } => {
                let names: Vec<_> = winners.iter().map(|w| w.name.as_str()).collect();
                tracing::info!("Game Over! Winners: {}", names.join(", "));
                let state = client.state();
                for player in &state.players {
                    let you = if state.is_local_player(&player.id) { " (You)" } else { "" };
                    tracing::info!("  {:<10} {}{you}", player.name, player.score);
                }
                break;
            }
            GameEvent::CommandRejected { message } | GameEvent::ConnectionError { message } => {
                tracing::warn!("{message}");
            }
            GameEvent::Disconnected { reason } => {
                tracing::info!(?reason, "disconnected");
                break;
            }
            _ => {}
        }
    }

    client.shutdown().await;
    server_task.await??;
    Ok(())
}

// ── Toy server ──────────────────────────────────────────────────────

async fn run_server(mut server: ServerEnd) -> spin_wheel_client::Result<()> {
    let mut roster: Vec<Player> = Vec::new();

    while let Some(msg) = server.recv().await {
        match msg? {
            ClientMessage::Join {
                player_name,
                user_id,
            } => {
                roster.push(Player::new(format!("user-{user_id}"), player_name.as_str()));
                server.send(&ServerMessage::PlayerJoined { name: player_name })?;
                for bot in BOTS {
                    roster.push(Player::new(format!("bot-{}", bot.to_lowercase()), bot));
                    server.send(&ServerMessage::PlayerJoined { name: bot.into() })?;
                    server.send(&ServerMessage::RosterUpdate {
                        players: roster.clone(),
                    })?;
                }
            }
            ClientMessage::StartGame { ack } => {
                server.send(&ServerMessage::Ack {
                    ack,
                    success: true,
                    message: None,
                })?;
                play(&server, &mut roster).await?;
            }
            ClientMessage::RestartGame => {}
        }
    }
    Ok(())
}

async fn play(server: &ServerEnd, roster: &mut [Player]) -> spin_wheel_client::Result<()> {
    let dice = RandomState::new();
    server.send(&ServerMessage::GameStart {
        total_rounds: ROUNDS,
    })?;

    for round in 1..=ROUNDS {
        server.send(&ServerMessage::NewRound {
            round,
            total_rounds: ROUNDS,
        })?;
        tokio::time::sleep(Duration::from_millis(300)).await;

        let pick = (dice.hash_one(round) % roster.len() as u64) as usize;
        let Some(winner) = roster.get_mut(pick) else {
            continue;
        };
        winner.score += 1;
        let winner = winner.clone();
        server.send(&ServerMessage::RoundResult {
            winner,
            players: roster.to_vec(),
        })?;

        // Leave the wheel time to settle before the next round.
        tokio::time::sleep(SPIN + Duration::from_millis(500)).await;
    }

    let best = roster.iter().map(|p| p.score).max().unwrap_or(0);
    server.send(&ServerMessage::GameOver {
        players: roster.to_vec(),
        winners: roster.iter().filter(|p| p.score == best).cloned().collect(),
    })?;
    Ok(())
}
