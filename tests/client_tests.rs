#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! End-to-end client tests.
//!
//! Timer-driven flows run under paused time against a live in-process server
//! so that the settle delay and spin duration elapse deterministically.

mod common;

use std::time::Duration;

use spin_wheel_client::protocol::{ClientMessage, ServerMessage};
use spin_wheel_client::state::{CONNECTION_ERROR_MESSAGE, START_REJECTED_MESSAGE};
use spin_wheel_client::wheel::{segment_under_pointer, AbortReason, WheelPhase, SPIN_DURATION};
use spin_wheel_client::{
    ChannelTransport, ClientConfig, GameEvent, GameStatus, SpinWheelClient, StaticIdentity,
};
use tokio_test::{assert_err, assert_ok};

use common::{
    drain, frame, live_client, players, round_result, roster, scored, sent_messages, wait_for,
    MockTransport,
};

// ════════════════════════════════════════════════════════════════════
// Full game
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn four_player_three_round_game() {
    let (mut client, mut events, mut server) = live_client(ClientConfig::new());

    match server.recv().await.unwrap().unwrap() {
        ClientMessage::Join { player_name, .. } => assert_eq!(player_name, "Test User"),
        other => panic!("expected Join, got {other:?}"),
    }

    server.send(&roster(4)).unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::RosterUpdated { .. })).await;
    assert!(client.state().can_start_game());

    let ack = assert_ok!(client.start_game());
    match server.recv().await.unwrap().unwrap() {
        ClientMessage::StartGame { ack: got } => assert_eq!(got, ack),
        other => panic!("expected StartGame, got {other:?}"),
    }
    server
        .send(&ServerMessage::Ack {
            ack,
            success: true,
            message: None,
        })
        .unwrap();
    server
        .send(&ServerMessage::GameStart { total_rounds: 3 })
        .unwrap();
    wait_for(&mut events, |e| {
        matches!(e, GameEvent::GameStarted { total_rounds: 3 })
    })
    .await;
    let state = client.state();
    assert!(state.is_game_active);
    assert_eq!(state.current_round, 1);
    assert_eq!(state.game_status, GameStatus::Starting);

    for round in 1..=3 {
        server
            .send(&ServerMessage::NewRound {
                round,
                total_rounds: 3,
            })
            .unwrap();
        wait_for(&mut events, |e| matches!(e, GameEvent::RoundBegun { .. })).await;
        let state = client.state();
        assert!(state.players.iter().all(|p| p.is_spinning));
        assert!(state.round_winner.is_none());
        assert_eq!(client.wheel().phase, WheelPhase::Armed);
        assert_eq!(client.wheel().rotation_deg, 0.0);

        server.send(&round_result(scored(4, 2, round), 2)).unwrap();
        match wait_for(&mut events, |e| matches!(e, GameEvent::SpinStarted { .. })).await {
            GameEvent::SpinStarted {
                winner_index,
                target_rotation,
            } => {
                assert_eq!(winner_index, 2);
                assert_eq!(segment_under_pointer(target_rotation, 4), Some(2));
            }
            other => panic!("unexpected {other:?}"),
        }
        let state = client.state();
        assert_eq!(state.round_winner.as_ref().map(|p| p.id.as_str()), Some("p2"));
        assert!(state.players.iter().all(|p| !p.is_spinning));
        assert_eq!(client.wheel().transition, Some(SPIN_DURATION));

        let settled =
            wait_for(&mut events, |e| matches!(e, GameEvent::SpinSettled { .. })).await;
        assert_eq!(settled, GameEvent::SpinSettled { winner_index: 2 });
        assert_eq!(client.wheel().phase, WheelPhase::Idle);
        assert_eq!(client.state().status_message(), format!("Round {round} Winner: P2!"));
    }

    let finals = scored(4, 2, 3);
    server
        .send(&ServerMessage::GameOver {
            players: finals.clone(),
            winners: vec![finals[2].clone()],
        })
        .unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::GameOver { .. })).await;
    let state = client.state();
    assert_eq!(state.game_status, GameStatus::Finished);
    assert!(!state.is_game_active);
    assert!(state.is_winner("p2"));
    assert!(!state.is_winner("p0"));
    assert_eq!(state.status_message(), "Game Over!");

    assert_ok!(client.restart_game());
    assert!(matches!(
        server.recv().await,
        Some(Ok(ClientMessage::RestartGame))
    ));

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Out-of-order and duplicate traffic
// ════════════════════════════════════════════════════════════════════

#[tokio::test(start_paused = true)]
async fn result_before_new_round_updates_scores_without_spinning() {
    let (mut client, mut events, server) = live_client(ClientConfig::new());
    server.send(&roster(4)).unwrap();
    server
        .send(&ServerMessage::GameStart { total_rounds: 2 })
        .unwrap();
    server.send(&round_result(scored(4, 1, 1), 1)).unwrap();

    match wait_for(&mut events, |e| matches!(e, GameEvent::ScoresUpdated { .. })).await {
        GameEvent::ScoresUpdated { players } => assert_eq!(players[1].score, 1),
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(client.wheel().phase, WheelPhase::Idle);
    assert!(client.state().round_winner.is_none());

    tokio::time::sleep(SPIN_DURATION * 2).await;
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, GameEvent::SpinStarted { .. } | GameEvent::SpinSettled { .. })));
    assert_eq!(client.wheel().phase, WheelPhase::Idle);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn new_round_after_its_own_result_leaves_the_wheel_idle() {
    let (mut client, mut events, server) = live_client(ClientConfig::new());
    server.send(&roster(4)).unwrap();
    server
        .send(&ServerMessage::GameStart { total_rounds: 1 })
        .unwrap();
    server.send(&round_result(scored(4, 1, 1), 1)).unwrap();
    server
        .send(&ServerMessage::NewRound {
            round: 1,
            total_rounds: 1,
        })
        .unwrap();

    match wait_for(&mut events, |e| matches!(e, GameEvent::RoundResolved { .. })).await {
        GameEvent::RoundResolved { round, winner } => {
            assert_eq!(round, 1);
            assert_eq!(winner.id, "p1");
        }
        other => panic!("unexpected {other:?}"),
    }

    tokio::time::sleep(SPIN_DURATION * 10).await;
    assert!(drain(&mut events).iter().all(|e| !matches!(
        e,
        GameEvent::RoundBegun { .. } | GameEvent::SpinStarted { .. } | GameEvent::SpinSettled { .. }
    )));
    assert_eq!(client.wheel().phase, WheelPhase::Idle);
    let state = client.state();
    assert_eq!(state.game_status, GameStatus::InProgress);
    assert!(state.players.iter().all(|p| !p.is_spinning));
    assert_eq!(state.status_message(), "Round 1 Winner: P1!");

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn duplicate_new_round_does_not_disturb_the_spin() {
    let (mut client, mut events, server) = live_client(ClientConfig::new());
    server.send(&roster(4)).unwrap();
    server
        .send(&ServerMessage::GameStart { total_rounds: 3 })
        .unwrap();
    let new_round = ServerMessage::NewRound {
        round: 1,
        total_rounds: 3,
    };
    server.send(&new_round).unwrap();
    server.send(&round_result(scored(4, 3, 1), 3)).unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::SpinStarted { .. })).await;

    server.send(&new_round).unwrap();
    let settled = wait_for(&mut events, |e| {
        matches!(e, GameEvent::SpinSettled { .. } | GameEvent::SpinAborted { .. })
    })
    .await;
    assert_eq!(settled, GameEvent::SpinSettled { winner_index: 3 });

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn next_round_mid_spin_supersedes_the_old_one() {
    let (mut client, mut events, server) = live_client(ClientConfig::new());
    server.send(&roster(4)).unwrap();
    server
        .send(&ServerMessage::GameStart { total_rounds: 3 })
        .unwrap();
    server
        .send(&ServerMessage::NewRound {
            round: 1,
            total_rounds: 3,
        })
        .unwrap();
    server.send(&round_result(scored(4, 0, 1), 0)).unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::SpinStarted { .. })).await;

    server
        .send(&ServerMessage::NewRound {
            round: 2,
            total_rounds: 3,
        })
        .unwrap();
    let aborted = wait_for(&mut events, |e| matches!(e, GameEvent::SpinAborted { .. })).await;
    assert_eq!(
        aborted,
        GameEvent::SpinAborted {
            reason: AbortReason::Superseded
        }
    );
    assert_eq!(client.wheel().phase, WheelPhase::Armed);
    assert_eq!(client.state().current_round, 2);

    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn roster_change_before_settle_cancels_without_completion() {
    let (mut client, mut events, server) = live_client(ClientConfig::new());
    server.send(&roster(4)).unwrap();
    server
        .send(&ServerMessage::GameStart { total_rounds: 1 })
        .unwrap();
    server
        .send(&ServerMessage::NewRound {
            round: 1,
            total_rounds: 1,
        })
        .unwrap();
    server.send(&round_result(scored(4, 3, 1), 3)).unwrap();
    server
        .send(&ServerMessage::PlayerLeft { name: "P3".into() })
        .unwrap();
    server.send(&roster(3)).unwrap();

    let aborted = wait_for(&mut events, |e| matches!(e, GameEvent::SpinAborted { .. })).await;
    assert_eq!(
        aborted,
        GameEvent::SpinAborted {
            reason: AbortReason::SegmentsChanged
        }
    );

    tokio::time::sleep(SPIN_DURATION * 2).await;
    assert!(drain(&mut events)
        .iter()
        .all(|e| !matches!(e, GameEvent::SpinSettled { .. })));
    assert_eq!(client.wheel().segments.len(), 3);
    assert_eq!(client.wheel().rotation_deg, 0.0);

    client.shutdown().await;
}

#[tokio::test]
async fn unknown_winner_is_refused() {
    let mut outsider = players(1);
    outsider[0].id = "ghost".into();
    let (transport, _sent, _closed) = MockTransport::new(vec![
        frame(&roster(4)),
        frame(&ServerMessage::GameStart { total_rounds: 1 }),
        frame(&ServerMessage::NewRound {
            round: 1,
            total_rounds: 1,
        }),
        frame(&ServerMessage::RoundResult {
            winner: outsider[0].clone(),
            players: players(4),
        }),
        frame(&ServerMessage::PlayerJoined {
            name: "marker".into(),
        }),
    ]);
    let (mut client, mut events) =
        SpinWheelClient::start(transport, &StaticIdentity::development(), ClientConfig::new())
            .unwrap();

    let seen: Vec<GameEvent> = {
        let mut seen = Vec::new();
        while let Some(event) = events.recv().await {
            let done = matches!(event, GameEvent::PlayerJoined { .. });
            seen.push(event);
            if done {
                break;
            }
        }
        seen
    };
    assert!(seen
        .iter()
        .all(|e| !matches!(e, GameEvent::RoundResolved { .. })));
    let state = client.state();
    assert!(state.round_winner.is_none());
    assert!(state.players.iter().all(|p| p.is_spinning));

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Commands
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn start_is_never_sent_with_three_players() {
    let (transport, sent, _closed) = MockTransport::new(vec![
        frame(&roster(4)),
        frame(&ServerMessage::PlayerLeft { name: "P3".into() }),
        frame(&roster(3)),
    ]);
    let (mut client, mut events) =
        SpinWheelClient::start(transport, &StaticIdentity::development(), ClientConfig::new())
            .unwrap();

    let mut rosters = 0;
    while rosters < 2 {
        if let Some(GameEvent::RosterUpdated { .. }) = events.recv().await {
            rosters += 1;
        }
    }
    assert_eq!(client.state().players.len(), 3);
    assert_eq!(client.state().status_message(), "Waiting for players... (3/4)");
    assert_err!(client.start_game());

    tokio::task::yield_now().await;
    assert!(sent_messages(&sent)
        .iter()
        .all(|m| !matches!(m, ClientMessage::StartGame { .. })));

    client.shutdown().await;
}

#[tokio::test]
async fn rejected_start_surfaces_a_transient_error() {
    let (mut client, mut events, mut server) = live_client(ClientConfig::new());
    let _join = server.recv().await;
    server.send(&roster(4)).unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::RosterUpdated { .. })).await;

    let ack = client.start_game().unwrap();
    let _start = server.recv().await;
    server
        .send(&ServerMessage::Ack {
            ack,
            success: false,
            message: None,
        })
        .unwrap();

    let rejected =
        wait_for(&mut events, |e| matches!(e, GameEvent::CommandRejected { .. })).await;
    assert_eq!(
        rejected,
        GameEvent::CommandRejected {
            message: START_REJECTED_MESSAGE.into()
        }
    );
    let state = client.state();
    assert_eq!(state.error.as_deref(), Some(START_REJECTED_MESSAGE));
    assert_eq!(state.game_status, GameStatus::Waiting);

    // A later roster update clears the transient error.
    server.send(&roster(4)).unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::RosterUpdated { .. })).await;
    assert!(client.state().error.is_none());

    client.shutdown().await;
}

#[tokio::test]
async fn rejection_message_from_server_is_kept() {
    let (mut client, mut events, mut server) = live_client(ClientConfig::new());
    let _join = server.recv().await;
    server.send(&roster(4)).unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::RosterUpdated { .. })).await;

    let ack = client.start_game().unwrap();
    let _start = server.recv().await;
    // An ack for some other command is ignored.
    server
        .send(&ServerMessage::Ack {
            ack: uuid::Uuid::nil(),
            success: false,
            message: Some("ignored".into()),
        })
        .unwrap();
    server
        .send(&ServerMessage::Ack {
            ack,
            success: false,
            message: Some("Game already running".into()),
        })
        .unwrap();

    let rejected =
        wait_for(&mut events, |e| matches!(e, GameEvent::CommandRejected { .. })).await;
    assert_eq!(
        rejected,
        GameEvent::CommandRejected {
            message: "Game already running".into()
        }
    );
    client.shutdown().await;
}

#[tokio::test]
async fn late_rejection_after_game_start_is_ignored() {
    let (mut client, mut events, mut server) = live_client(ClientConfig::new());
    let _join = server.recv().await;
    server.send(&roster(4)).unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::RosterUpdated { .. })).await;

    let ack = client.start_game().unwrap();
    let _start = server.recv().await;
    server
        .send(&ServerMessage::GameStart { total_rounds: 2 })
        .unwrap();
    server
        .send(&ServerMessage::Ack {
            ack,
            success: false,
            message: Some("too late".into()),
        })
        .unwrap();
    server
        .send(&ServerMessage::PlayerJoined { name: "Eve".into() })
        .unwrap();

    let mut seen = Vec::new();
    loop {
        let event = wait_for(&mut events, |_| true).await;
        let done = matches!(event, GameEvent::PlayerJoined { .. });
        seen.push(event);
        if done {
            break;
        }
    }
    assert!(seen
        .iter()
        .all(|e| !matches!(e, GameEvent::CommandRejected { .. })));
    assert!(client.state().error.is_none());
    assert_eq!(client.state().game_status, GameStatus::Starting);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Local player
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn local_player_is_found_in_the_roster_and_in_the_winners() {
    let mut lobby = players(4);
    lobby[3].name = "Test User".into();
    let mut finals = lobby.clone();
    finals[3].score = 1;
    let (transport, _sent, _closed) = MockTransport::new(vec![
        frame(&ServerMessage::RosterUpdate {
            players: lobby.clone(),
        }),
        frame(&ServerMessage::GameStart { total_rounds: 1 }),
        frame(&ServerMessage::NewRound {
            round: 1,
            total_rounds: 1,
        }),
        frame(&round_result(finals.clone(), 3)),
        frame(&ServerMessage::GameOver {
            players: finals.clone(),
            winners: vec![finals[3].clone()],
        }),
    ]);
    let (mut client, mut events) =
        SpinWheelClient::start(transport, &StaticIdentity::development(), ClientConfig::new())
            .unwrap();

    wait_for(&mut events, |e| matches!(e, GameEvent::RosterUpdated { .. })).await;
    let state = client.state();
    assert_eq!(state.local_player_id.as_deref(), Some("p3"));
    assert!(state.is_local_player("p3"));
    assert!(!state.is_local_player("p0"));

    wait_for(&mut events, |e| matches!(e, GameEvent::GameOver { .. })).await;
    assert!(client.state().is_local_winner());

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Connection faults
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn connection_error_keeps_the_phase() {
    let (transport, _sent, _closed) = MockTransport::new(vec![
        frame(&roster(4)),
        frame(&ServerMessage::GameStart { total_rounds: 2 }),
        Some(Ok(r#"{"type":"connection_error","data":{}}"#.into())),
    ]);
    let (mut client, mut events) =
        SpinWheelClient::start(transport, &StaticIdentity::development(), ClientConfig::new())
            .unwrap();

    let event = wait_for(&mut events, |e| matches!(e, GameEvent::ConnectionError { .. })).await;
    assert_eq!(
        event,
        GameEvent::ConnectionError {
            message: CONNECTION_ERROR_MESSAGE.into()
        }
    );
    let state = client.state();
    assert_eq!(state.game_status, GameStatus::Starting);
    assert_eq!(state.error.as_deref(), Some(CONNECTION_ERROR_MESSAGE));
    assert!(client.is_connected());

    client.shutdown().await;
}

#[tokio::test]
async fn dropping_the_server_ends_the_session() {
    let (mut client, mut events, server) = live_client(ClientConfig::new());
    drop(server);
    let event = wait_for(&mut events, |e| matches!(e, GameEvent::Disconnected { .. })).await;
    assert!(matches!(event, GameEvent::Disconnected { reason: Some(_) }));
    assert!(events.recv().await.is_none());
    assert!(!client.is_connected());
    assert_eq!(
        client.state().error.as_deref(),
        Some(CONNECTION_ERROR_MESSAGE)
    );
    client.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn resumed_session_picks_up_the_game_mid_round() {
    let (mut client, mut events, server) = live_client(ClientConfig::new());
    server.send(&roster(4)).unwrap();
    server
        .send(&ServerMessage::GameStart { total_rounds: 3 })
        .unwrap();
    server
        .send(&ServerMessage::NewRound {
            round: 1,
            total_rounds: 3,
        })
        .unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::RoundBegun { .. })).await;
    drop(server);
    wait_for(&mut events, |e| matches!(e, GameEvent::Disconnected { .. })).await;
    let last = client.state();
    assert_eq!(last.error.as_deref(), Some(CONNECTION_ERROR_MESSAGE));
    client.shutdown().await;

    let (transport, mut server) = ChannelTransport::pair();
    let (mut client, mut events) = SpinWheelClient::resume(
        transport,
        &StaticIdentity::development(),
        ClientConfig::new(),
        last,
    )
    .unwrap();
    assert!(matches!(
        server.recv().await,
        Some(Ok(ClientMessage::Join { .. }))
    ));
    let state = client.state();
    assert_eq!(state.game_status, GameStatus::InProgress);
    assert_eq!(state.current_round, 1);
    assert!(state.error.is_none());
    assert!(state.players.iter().all(|p| !p.is_spinning));
    assert_eq!(client.wheel().phase, WheelPhase::Idle);

    // Round 1 resolves on the new connection without an animation.
    server.send(&round_result(scored(4, 0, 1), 0)).unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::RoundResolved { round: 1, .. })).await;
    assert_eq!(client.wheel().phase, WheelPhase::Idle);

    server
        .send(&ServerMessage::NewRound {
            round: 2,
            total_rounds: 3,
        })
        .unwrap();
    wait_for(&mut events, |e| matches!(e, GameEvent::RoundBegun { round: 2, .. })).await;
    assert_eq!(client.wheel().phase, WheelPhase::Armed);

    server.send(&round_result(scored(4, 2, 1), 2)).unwrap();
    let settled = wait_for(&mut events, |e| matches!(e, GameEvent::SpinSettled { .. })).await;
    assert_eq!(settled, GameEvent::SpinSettled { winner_index: 2 });

    client.shutdown().await;
}

#[tokio::test]
async fn full_event_channel_never_blocks_the_session() {
    let mut script: Vec<_> = (0..50)
        .map(|i| {
            frame(&ServerMessage::PlayerJoined {
                name: format!("guest{i}"),
            })
        })
        .collect();
    script.push(frame(&roster(4)));
    script.push(None);
    let (transport, _sent, _closed) = MockTransport::new(script);
    let (mut client, mut events) = SpinWheelClient::start(
        transport,
        &StaticIdentity::development(),
        ClientConfig::new().with_event_channel_capacity(2),
    )
    .unwrap();

    // Let the loop run to completion without draining events.
    let mut state_rx = client.subscribe();
    tokio::time::timeout(
        Duration::from_secs(5),
        state_rx.wait_for(|s| s.players.len() == 4),
    )
    .await
    .unwrap()
    .unwrap();

    let delivered: Vec<_> = {
        let mut all = Vec::new();
        while let Some(event) = events.recv().await {
            all.push(event);
        }
        all
    };
    assert!(delivered.len() < 52);
    assert!(matches!(
        delivered.last(),
        Some(GameEvent::Disconnected { .. })
    ));
    client.shutdown().await;
}

#[tokio::test]
async fn subscribers_see_state_changes() {
    let (mut client, _events, server) = live_client(ClientConfig::new());
    let mut state_rx = client.subscribe();
    let mut wheel_rx = client.subscribe_wheel();

    server.send(&roster(2)).unwrap();
    state_rx.changed().await.unwrap();
    assert_eq!(state_rx.borrow_and_update().players.len(), 2);
    wheel_rx.changed().await.unwrap();
    let view = wheel_rx.borrow_and_update().clone();
    assert_eq!(view.segments.len(), 2);
    assert_eq!(view.segments[0].label, "P0");

    client.shutdown().await;
}

#[tokio::test]
async fn shutdown_gives_up_on_a_stuck_transport() {
    struct Stuck;

    #[async_trait::async_trait]
    impl spin_wheel_client::Transport for Stuck {
        async fn send(&mut self, _m: String) -> spin_wheel_client::Result<()> {
            Ok(())
        }
        async fn recv(&mut self) -> Option<spin_wheel_client::Result<String>> {
            std::future::pending().await
        }
        async fn close(&mut self) -> spin_wheel_client::Result<()> {
            std::future::pending().await
        }
    }

    let (mut client, _events) = SpinWheelClient::start(
        Stuck,
        &StaticIdentity::development(),
        ClientConfig::new().with_shutdown_timeout(Duration::from_millis(50)),
    )
    .unwrap();
    tokio::time::timeout(Duration::from_secs(2), client.shutdown())
        .await
        .expect("shutdown must not hang");
    assert!(!client.is_connected());
}
