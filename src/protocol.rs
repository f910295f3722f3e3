//! Wire-compatible protocol types for the spin-wheel game server.
//!
//! Every frame is a single JSON text message tagged by event name:
//!
//! ```json
//! {"type": "new_round", "data": {"round": 1, "totalRounds": 3}}
//! ```
//!
//! Event names are `snake_case`; payload fields are `camelCase`, matching the
//! server's JSON exactly.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Type aliases ────────────────────────────────────────────────────

/// Connection-scoped player identifier assigned by the server.
pub type PlayerId = String;

/// Correlation id attached to commands that expect an acknowledgement.
pub type AckId = Uuid;

// ── Structs ─────────────────────────────────────────────────────────

/// A player as the server reports it.
///
/// Rosters are always replaced wholesale from server payloads; the client
/// never edits a `Player` except to toggle the transient `is_spinning` flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Stable for the lifetime of the player's connection.
    pub id: PlayerId,
    /// Display name.
    pub name: String,
    /// Cumulative score across rounds.
    pub score: u32,
    /// Set while the current round's wheel is in motion.
    #[serde(default)]
    pub is_spinning: bool,
}

impl Player {
    /// Create a player with a zero score.
    pub fn new(id: impl Into<PlayerId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            score: 0,
            is_spinning: false,
        }
    }

    /// Set the player's score.
    #[must_use]
    pub fn with_score(mut self, score: u32) -> Self {
        self.score = score;
        self
    }
}

// ── Messages ────────────────────────────────────────────────────────

/// Message types sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ClientMessage {
    /// Introduce the local player. Always the first message of a session.
    Join {
        /// Name shown to the other players.
        player_name: String,
        /// Identity-provider user id.
        user_id: i64,
    },
    /// Ask the server to start the game. Answered by [`ServerMessage::Ack`].
    StartGame {
        /// Correlation id echoed back in the acknowledgement.
        ack: AckId,
    },
    /// Ask the server to reset a finished game. No acknowledgement.
    RestartGame,
}

/// Message types sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    /// Full roster, in join order.
    RosterUpdate { players: Vec<Player> },
    /// A player disconnected. The roster change arrives separately.
    PlayerLeft { name: String },
    /// A game has started with a fixed number of rounds.
    GameStart { total_rounds: u32 },
    /// A round has begun; the wheel starts spinning.
    NewRound { round: u32, total_rounds: u32 },
    /// The server picked the round winner; scores in `players` are updated.
    RoundResult { winner: Player, players: Vec<Player> },
    /// The game finished.
    GameOver {
        players: Vec<Player>,
        winners: Vec<Player>,
    },
    /// A player connected. The roster change arrives separately.
    PlayerJoined { name: String },
    /// The server could not service the connection.
    ConnectionError {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
    /// Acknowledgement for a command that carried an [`AckId`].
    Ack {
        ack: AckId,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },
}

impl ServerMessage {
    /// The wire name of this message, for diagnostics.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::RosterUpdate { .. } => "roster_update",
            Self::PlayerLeft { .. } => "player_left",
            Self::GameStart { .. } => "game_start",
            Self::NewRound { .. } => "new_round",
            Self::RoundResult { .. } => "round_result",
            Self::GameOver { .. } => "game_over",
            Self::PlayerJoined { .. } => "player_joined",
            Self::ConnectionError { .. } => "connection_error",
            Self::Ack { .. } => "ack",
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn new_round_uses_camel_case_fields() {
        let json = serde_json::to_string(&ServerMessage::NewRound {
            round: 2,
            total_rounds: 3,
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"new_round","data":{"round":2,"totalRounds":3}}"#
        );
    }

    #[test]
    fn player_spinning_flag_defaults_to_false() {
        let player: Player =
            serde_json::from_str(r#"{"id":"p1","name":"Ada","score":2}"#).unwrap();
        assert_eq!(player, Player::new("p1", "Ada").with_score(2));
    }

    #[test]
    fn negative_score_is_rejected() {
        let result = serde_json::from_str::<Player>(r#"{"id":"p1","name":"Ada","score":-1}"#);
        assert!(result.is_err());
    }

    #[test]
    fn round_result_missing_winner_is_rejected() {
        let result = serde_json::from_str::<ServerMessage>(
            r#"{"type":"round_result","data":{"players":[]}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn connection_error_accepts_empty_payload() {
        let msg: ServerMessage =
            serde_json::from_str(r#"{"type":"connection_error","data":{}}"#).unwrap();
        assert!(matches!(msg, ServerMessage::ConnectionError { message: None }));
        assert_eq!(msg.event_name(), "connection_error");
    }

    #[test]
    fn start_game_carries_ack_id() {
        let ack = Uuid::from_u128(7);
        let json = serde_json::to_string(&ClientMessage::StartGame { ack }).unwrap();
        assert_eq!(
            json,
            format!(r#"{{"type":"start_game","data":{{"ack":"{ack}"}}}}"#)
        );
    }

    #[test]
    fn join_serializes_player_name_and_user_id() {
        let json = serde_json::to_value(ClientMessage::Join {
            player_name: "Ada Lovelace".into(),
            user_id: 42,
        })
        .unwrap();
        assert_eq!(json["type"], "join");
        assert_eq!(json["data"]["playerName"], "Ada Lovelace");
        assert_eq!(json["data"]["userId"], 42);
    }

    #[test]
    fn restart_game_has_no_payload() {
        let json = serde_json::to_string(&ClientMessage::RestartGame).unwrap();
        assert_eq!(json, r#"{"type":"restart_game"}"#);
    }

    #[test]
    fn ack_failure_message_is_optional() {
        let msg: ServerMessage = serde_json::from_str(&format!(
            r#"{{"type":"ack","data":{{"ack":"{}","success":false}}}}"#,
            Uuid::nil()
        ))
        .unwrap();
        match msg {
            ServerMessage::Ack {
                success, message, ..
            } => {
                assert!(!success);
                assert!(message.is_none());
            }
            other => panic!("expected Ack, got {other:?}"),
        }
    }
}
