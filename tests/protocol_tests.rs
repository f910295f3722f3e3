#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Wire-format tests against JSON fixtures shaped like real server traffic.

use serde_json::json;
use spin_wheel_client::protocol::{ClientMessage, Player, ServerMessage};
use spin_wheel_client::state::{reduce, GameStatus, SessionState};
use uuid::Uuid;

fn parse(value: serde_json::Value) -> ServerMessage {
    serde_json::from_value(value).expect("fixture should decode")
}

fn rejects(value: serde_json::Value) {
    assert!(
        serde_json::from_value::<ServerMessage>(value.clone()).is_err(),
        "expected {value} to be rejected"
    );
}

// ════════════════════════════════════════════════════════════════════
// Inbound fixtures
// ════════════════════════════════════════════════════════════════════

#[test]
fn roster_update_fixture() {
    let msg = parse(json!({
        "type": "roster_update",
        "data": {
            "players": [
                {"id": "Zr4vGq", "name": "Ada Lovelace", "score": 0, "isSpinning": false},
                {"id": "b7KpQ2", "name": "Grace", "score": 2}
            ]
        }
    }));
    match msg {
        ServerMessage::RosterUpdate { players } => {
            assert_eq!(players.len(), 2);
            assert_eq!(players[0].name, "Ada Lovelace");
            assert_eq!(players[1], Player::new("b7KpQ2", "Grace").with_score(2));
        }
        other => panic!("expected RosterUpdate, got {other:?}"),
    }
}

#[test]
fn round_result_fixture() {
    let msg = parse(json!({
        "type": "round_result",
        "data": {
            "winner": {"id": "p2", "name": "Cy", "score": 1, "isSpinning": false},
            "players": [
                {"id": "p0", "name": "Ann", "score": 0, "isSpinning": false},
                {"id": "p1", "name": "Bo", "score": 0, "isSpinning": false},
                {"id": "p2", "name": "Cy", "score": 1, "isSpinning": false},
                {"id": "p3", "name": "Di", "score": 0, "isSpinning": false}
            ]
        }
    }));
    match msg {
        ServerMessage::RoundResult { winner, players } => {
            assert_eq!(winner.id, "p2");
            assert_eq!(players.iter().position(|p| p.id == winner.id), Some(2));
        }
        other => panic!("expected RoundResult, got {other:?}"),
    }
}

#[test]
fn game_lifecycle_fixtures() {
    assert!(matches!(
        parse(json!({"type": "game_start", "data": {"totalRounds": 3}})),
        ServerMessage::GameStart { total_rounds: 3 }
    ));
    assert!(matches!(
        parse(json!({"type": "new_round", "data": {"round": 2, "totalRounds": 3}})),
        ServerMessage::NewRound {
            round: 2,
            total_rounds: 3
        }
    ));
    let over = parse(json!({
        "type": "game_over",
        "data": {
            "players": [{"id": "a", "name": "A", "score": 2}, {"id": "b", "name": "B", "score": 2}],
            "winners": [{"id": "a", "name": "A", "score": 2}, {"id": "b", "name": "B", "score": 2}]
        }
    }));
    assert!(matches!(over, ServerMessage::GameOver { ref winners, .. } if winners.len() == 2));
}

#[test]
fn notice_fixtures() {
    assert!(matches!(
        parse(json!({"type": "player_joined", "data": {"name": "Ada"}})),
        ServerMessage::PlayerJoined { name } if name == "Ada"
    ));
    assert!(matches!(
        parse(json!({"type": "player_left", "data": {"name": "Ada"}})),
        ServerMessage::PlayerLeft { name } if name == "Ada"
    ));
}

#[test]
fn connection_error_with_and_without_message() {
    assert!(matches!(
        parse(json!({"type": "connection_error", "data": {}})),
        ServerMessage::ConnectionError { message: None }
    ));
    assert!(matches!(
        parse(json!({"type": "connection_error", "data": {"message": "room full"}})),
        ServerMessage::ConnectionError { message: Some(m) } if m == "room full"
    ));
}

#[test]
fn ack_fixture() {
    let id = Uuid::from_u128(0x1234);
    let msg = parse(json!({
        "type": "ack",
        "data": {"ack": id.to_string(), "success": false, "message": "Need 4 players"}
    }));
    match msg {
        ServerMessage::Ack {
            ack,
            success,
            message,
        } => {
            assert_eq!(ack, id);
            assert!(!success);
            assert_eq!(message.as_deref(), Some("Need 4 players"));
        }
        other => panic!("expected Ack, got {other:?}"),
    }
}

// ════════════════════════════════════════════════════════════════════
// Malformed frames
// ════════════════════════════════════════════════════════════════════

#[test]
fn malformed_frames_are_rejected() {
    rejects(json!({"type": "spin_now", "data": {}}));
    rejects(json!({"type": "game_start", "data": {}}));
    rejects(json!({"type": "game_start", "data": {"totalRounds": "three"}}));
    rejects(json!({"type": "new_round", "data": {"round": 1}}));
    rejects(json!({"type": "roster_update", "data": {"players": [{"id": "a", "name": "A"}]}}));
    rejects(json!({"type": "roster_update", "data": {"players": [{"id": "a", "name": "A", "score": -3}]}}));
    rejects(json!({"data": {"name": "Ada"}}));
    rejects(json!({"type": "ack", "data": {"ack": "not-a-uuid", "success": true}}));
}

#[test]
fn snake_case_field_names_are_not_accepted() {
    rejects(json!({"type": "game_start", "data": {"total_rounds": 3}}));
}

// ════════════════════════════════════════════════════════════════════
// Outbound encoding
// ════════════════════════════════════════════════════════════════════

#[test]
fn outbound_commands_encode_as_the_server_expects() {
    assert_eq!(
        serde_json::to_value(ClientMessage::Join {
            player_name: "Test User".into(),
            user_id: 123_456_789,
        })
        .unwrap(),
        json!({"type": "join", "data": {"playerName": "Test User", "userId": 123_456_789}})
    );

    let ack = Uuid::new_v4();
    assert_eq!(
        serde_json::to_value(ClientMessage::StartGame { ack }).unwrap(),
        json!({"type": "start_game", "data": {"ack": ack.to_string()}})
    );
    assert_eq!(
        serde_json::to_value(ClientMessage::RestartGame).unwrap(),
        json!({"type": "restart_game"})
    );
}

// ════════════════════════════════════════════════════════════════════
// Fixtures through the reducer
// ════════════════════════════════════════════════════════════════════

#[test]
fn fixture_transcript_reduces_to_a_finished_game() {
    let transcript = [
        json!({"type": "roster_update", "data": {"players": [
            {"id": "a", "name": "A", "score": 0}, {"id": "b", "name": "B", "score": 0},
            {"id": "c", "name": "C", "score": 0}, {"id": "d", "name": "D", "score": 0}
        ]}}),
        json!({"type": "game_start", "data": {"totalRounds": 1}}),
        json!({"type": "new_round", "data": {"round": 1, "totalRounds": 1}}),
        json!({"type": "round_result", "data": {
            "winner": {"id": "c", "name": "C", "score": 1},
            "players": [
                {"id": "a", "name": "A", "score": 0}, {"id": "b", "name": "B", "score": 0},
                {"id": "c", "name": "C", "score": 1}, {"id": "d", "name": "D", "score": 0}
            ]
        }}),
        json!({"type": "game_over", "data": {
            "players": [
                {"id": "a", "name": "A", "score": 0}, {"id": "b", "name": "B", "score": 0},
                {"id": "c", "name": "C", "score": 1}, {"id": "d", "name": "D", "score": 0}
            ],
            "winners": [{"id": "c", "name": "C", "score": 1}]
        }}),
    ];

    let state = transcript
        .into_iter()
        .map(parse)
        .fold(SessionState::default(), |state, msg| {
            reduce(&state, &msg).expect("transcript is well-sequenced").state
        });

    assert_eq!(state.game_status, GameStatus::Finished);
    assert!(state.is_winner("c"));
    assert_eq!(state.player("c").map(|p| p.score), Some(1));
    assert!(state.is_consistent());
}
