#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared utilities for spin-wheel client integration tests.
//!
//! - [`MockTransport`] replays a fixed script, for flows where timing does
//!   not matter.
//! - [`live_client`] wires a client to a [`ServerEnd`] the test drives by
//!   hand, for timer-driven flows under paused time.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use spin_wheel_client::protocol::{ClientMessage, Player, ServerMessage};
use spin_wheel_client::{
    ChannelTransport, ClientConfig, GameEvent, ServerEnd, SpinWheelClient, StaticIdentity,
    Transport, WheelClientError,
};
use tokio::sync::mpsc;

// ── MockTransport ───────────────────────────────────────────────────

type Frame = Option<Result<String, WheelClientError>>;

/// Scripted transport: `recv` yields `incoming` in order, then hangs.
/// An explicit `None` entry is a clean close.
pub struct MockTransport {
    incoming: VecDeque<Frame>,
    pub sent: Arc<StdMutex<Vec<String>>>,
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    pub fn new(incoming: Vec<Frame>) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), WheelClientError> {
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, WheelClientError>> {
        match self.incoming.pop_front() {
            Some(item) => item,
            None => std::future::pending().await,
        }
    }

    async fn close(&mut self) -> Result<(), WheelClientError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

/// Decode every frame the client has sent so far.
pub fn sent_messages(sent: &Arc<StdMutex<Vec<String>>>) -> Vec<ClientMessage> {
    sent.lock()
        .unwrap()
        .iter()
        .map(|raw| serde_json::from_str(raw).unwrap())
        .collect()
}

// ── Fixtures ────────────────────────────────────────────────────────

/// Players `p0..pn`, named `P0..Pn`, zero scores.
pub fn players(n: usize) -> Vec<Player> {
    (0..n)
        .map(|i| Player::new(format!("p{i}"), format!("P{i}")))
        .collect()
}

/// `players(n)` with `winner` holding `score` points.
pub fn scored(n: usize, winner: usize, score: u32) -> Vec<Player> {
    players(n)
        .into_iter()
        .enumerate()
        .map(|(i, p)| if i == winner { p.with_score(score) } else { p })
        .collect()
}

pub fn frame(msg: &ServerMessage) -> Frame {
    Some(Ok(serde_json::to_string(msg).unwrap()))
}

pub fn roster(n: usize) -> ServerMessage {
    ServerMessage::RosterUpdate {
        players: players(n),
    }
}

pub fn round_result(roster: Vec<Player>, winner: usize) -> ServerMessage {
    ServerMessage::RoundResult {
        winner: roster[winner].clone(),
        players: roster,
    }
}

// ── Live server ─────────────────────────────────────────────────────

/// Start a client against an in-process server end.
pub fn live_client(
    config: ClientConfig,
) -> (SpinWheelClient, mpsc::Receiver<GameEvent>, ServerEnd) {
    let (transport, server) = ChannelTransport::pair();
    let (client, events) =
        SpinWheelClient::start(transport, &StaticIdentity::development(), config).unwrap();
    (client, events, server)
}

/// Receive events until one matches `pred`, returning it.
///
/// Panics if the channel closes or nothing matches within a minute of
/// (possibly paused) time.
pub async fn wait_for(
    events: &mut mpsc::Receiver<GameEvent>,
    mut pred: impl FnMut(&GameEvent) -> bool,
) -> GameEvent {
    let found = tokio::time::timeout(Duration::from_secs(60), async {
        while let Some(event) = events.recv().await {
            if pred(&event) {
                return Some(event);
            }
        }
        None
    })
    .await
    .expect("timed out waiting for event");
    found.expect("event channel closed")
}

/// Everything currently buffered on the event channel.
pub fn drain(events: &mut mpsc::Receiver<GameEvent>) -> Vec<GameEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}
