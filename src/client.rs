//! Async client for the spin-wheel game.
//!
//! [`SpinWheelClient`] is a thin handle over one background task that owns
//! everything mutable: the transport, the [`SessionStore`] and the
//! [`WheelEngine`]. The handle talks to the task over an unbounded command
//! channel and observes it through two `watch` channels (game state and
//! wheel view) plus a bounded [`GameEvent`] channel.
//!
//! # Example
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect("ws://localhost:3000/game").await?;
//! let (client, mut events) =
//!     SpinWheelClient::start(transport, &StaticIdentity::development(), ClientConfig::new())?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GameEvent::RosterUpdated { .. } if client.state().can_start_game() => {
//!             client.start_game()?;
//!         }
//!         GameEvent::SpinSettled { winner_index } => { /* celebrate */ }
//!         GameEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{Result, WheelClientError};
use crate::event::GameEvent;
use crate::identity::{self, Identity, IdentityProvider};
use crate::protocol::{AckId, ClientMessage, ServerMessage};
use crate::state::{
    Effect, SessionState, SessionStore, CONNECTION_ERROR_MESSAGE, MAX_PLAYERS,
    START_REJECTED_MESSAGE,
};
use crate::transport::Transport;
use crate::wheel::{segments_for, WheelEngine, WheelEvent, WheelTiming, WheelView};

/// Default capacity of the bounded event channel.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Configuration for a [`SpinWheelClient`].
///
/// ```
/// use spin_wheel_client::client::ClientConfig;
/// use spin_wheel_client::wheel::WheelTiming;
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .with_event_channel_capacity(64)
///     .with_shutdown_timeout(Duration::from_secs(3))
///     .with_wheel_timing(WheelTiming {
///         spin_duration: Duration::from_millis(1500),
///         ..WheelTiming::default()
///     });
/// assert_eq!(config.event_channel_capacity, 64);
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Capacity of the bounded event channel.
    ///
    /// When the consumer falls behind, events are dropped with a warning so
    /// the session loop never stalls. `Disconnected` is always delivered.
    /// State is unaffected: [`SpinWheelClient::state`] is always current.
    ///
    /// Defaults to **256**. Values below 1 are clamped to 1.
    pub event_channel_capacity: usize,
    /// How long [`SpinWheelClient::shutdown`] waits for the transport to close
    /// before aborting the task. Defaults to **1 second**.
    pub shutdown_timeout: Duration,
    /// Spin animation timing.
    pub wheel_timing: WheelTiming,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    /// Configuration with all defaults.
    pub fn new() -> Self {
        Self {
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            wheel_timing: WheelTiming::default(),
        }
    }

    /// Set the capacity of the bounded event channel. Values below 1 are
    /// clamped to 1.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the graceful shutdown timeout. Zero aborts immediately.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Override spin animation timing.
    #[must_use]
    pub fn with_wheel_timing(mut self, timing: WheelTiming) -> Self {
        self.wheel_timing = timing;
        self
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running game session.
///
/// Created by [`SpinWheelClient::start`]. Commands are queued to the session
/// task and return as soon as they are queued. Dropping the handle aborts
/// the task.
pub struct SpinWheelClient {
    cmd_tx: mpsc::UnboundedSender<ClientMessage>,
    connected: Arc<AtomicBool>,
    state_rx: watch::Receiver<SessionState>,
    wheel_rx: watch::Receiver<WheelView>,
    identity: Identity,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl SpinWheelClient {
    /// Acquire the local identity, start the session task and join the game.
    ///
    /// The first frame sent is always `join`, carrying the identity's display
    /// name and user id. The first event is always [`GameEvent::Connected`].
    ///
    /// # Errors
    ///
    /// Returns [`WheelClientError::Authentication`] if `provider` has no
    /// usable user. Nothing is spawned and nothing is sent in that case.
    pub fn start(
        transport: impl Transport,
        provider: &impl IdentityProvider,
        config: ClientConfig,
    ) -> Result<(Self, mpsc::Receiver<GameEvent>)> {
        Self::launch(transport, provider, config, SessionState::default())
    }

    /// Rejoin on a new connection, carrying on from `last`, the state an
    /// earlier session ended in (see [`state`](Self::state)).
    ///
    /// The game phase, rounds, roster and local player carry over, so the
    /// server's next `new_round` or `round_result` is accepted instead of
    /// being refused as out of sequence. The transient error and spinning
    /// flags are cleared; the wheel starts idle. Like [`start`](Self::start),
    /// the first frame sent is `join`.
    ///
    /// # Errors
    ///
    /// Same as [`start`](Self::start).
    pub fn resume(
        transport: impl Transport,
        provider: &impl IdentityProvider,
        config: ClientConfig,
        last: SessionState,
    ) -> Result<(Self, mpsc::Receiver<GameEvent>)> {
        info!(
            status = %last.game_status,
            round = last.current_round,
            "resuming spin-wheel session"
        );
        Self::launch(transport, provider, config, last.resumed())
    }

    fn launch(
        transport: impl Transport,
        provider: &impl IdentityProvider,
        config: ClientConfig,
        initial: SessionState,
    ) -> Result<(Self, mpsc::Receiver<GameEvent>)> {
        let identity = identity::acquire(provider)?;

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientMessage>();
        let (event_tx, event_rx) = mpsc::channel::<GameEvent>(config.event_channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let store = SessionStore::with_state(initial).with_local_name(identity.display_name());
        let state_rx = store.subscribe();

        // Idle engine: a layout change reports nothing.
        let mut wheel = WheelEngine::new(config.wheel_timing);
        let _ = wheel.set_segments(segments_for(&store.state().players));
        let (wheel_tx, wheel_rx) = watch::channel(wheel.view());
        let connected = Arc::new(AtomicBool::new(true));

        let join = ClientMessage::Join {
            player_name: identity.display_name(),
            user_id: identity.id,
        };
        // Cannot fail: the receiver is alive until the task is spawned.
        let _ = cmd_tx.send(join);

        let session = Session {
            store,
            wheel,
            wheel_tx,
            event_tx,
            pending_acks: HashSet::new(),
            connected: Arc::clone(&connected),
        };
        let task = tokio::spawn(session_loop(transport, session, cmd_rx, shutdown_rx));

        info!(user_id = identity.id, "spin-wheel session started");
        let client = Self {
            cmd_tx,
            connected,
            state_rx,
            wheel_rx,
            identity,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        Ok((client, event_rx))
    }

    // ── Commands ────────────────────────────────────────────────────

    /// Ask the server to start the game.
    ///
    /// Guarded locally: nothing is sent unless the lobby is waiting with a
    /// full roster. A server-side refusal arrives later as
    /// [`GameEvent::CommandRejected`].
    ///
    /// # Errors
    ///
    /// Returns [`WheelClientError::StartNotAllowed`] if the guard refuses, or
    /// [`WheelClientError::NotConnected`] if the session has ended.
    pub fn start_game(&self) -> Result<AckId> {
        {
            let state = self.state_rx.borrow();
            if !state.can_start_game() {
                return Err(WheelClientError::StartNotAllowed {
                    players: state.players.len(),
                    required: MAX_PLAYERS,
                    status: state.game_status,
                });
            }
        }
        let ack = Uuid::new_v4();
        self.send(ClientMessage::StartGame { ack })?;
        Ok(ack)
    }

    /// Ask the server to reset a finished game.
    ///
    /// # Errors
    ///
    /// Returns [`WheelClientError::RestartNotAllowed`] unless the game is
    /// finished, or [`WheelClientError::NotConnected`] if the session has ended.
    pub fn restart_game(&self) -> Result<()> {
        {
            let state = self.state_rx.borrow();
            if !state.can_restart() {
                return Err(WheelClientError::RestartNotAllowed {
                    status: state.game_status,
                });
            }
        }
        self.send(ClientMessage::RestartGame)
    }

    /// Close the transport and stop the session task.
    ///
    /// Waits up to the configured shutdown timeout, then aborts. The event
    /// receiver yields `None` once the task has exited.
    pub async fn shutdown(&mut self) {
        debug!("SpinWheelClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.connected.store(false, Ordering::Release);
    }

    // ── Observation ─────────────────────────────────────────────────

    /// A snapshot of the current game state.
    pub fn state(&self) -> SessionState {
        self.state_rx.borrow().clone()
    }

    /// A receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state_rx.clone()
    }

    /// A snapshot of the wheel.
    pub fn wheel(&self) -> WheelView {
        self.wheel_rx.borrow().clone()
    }

    /// A receiver notified whenever the wheel view changes.
    pub fn subscribe_wheel(&self) -> watch::Receiver<WheelView> {
        self.wheel_rx.clone()
    }

    /// The identity this session joined with.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Returns `true` until the transport closes or the client shuts down.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn send(&self, msg: ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(WheelClientError::NotConnected);
        }
        self.cmd_tx
            .send(msg)
            .map_err(|_| WheelClientError::NotConnected)
    }
}

impl std::fmt::Debug for SpinWheelClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpinWheelClient")
            .field("user_id", &self.identity.id)
            .field("connected", &self.is_connected())
            .field("status", &self.state_rx.borrow().game_status)
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for SpinWheelClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close from here; abort instead.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

/// Everything the session task owns besides the transport.
struct Session {
    store: SessionStore,
    wheel: WheelEngine,
    wheel_tx: watch::Sender<WheelView>,
    event_tx: mpsc::Sender<GameEvent>,
    pending_acks: HashSet<AckId>,
    connected: Arc<AtomicBool>,
}

/// Multiplexes commands, shutdown, inbound frames and the wheel timer.
///
/// Exits when the handle shuts down or is dropped, or when the transport
/// closes or fails.
async fn session_loop(
    mut transport: impl Transport,
    mut session: Session,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientMessage>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!("session loop started");
    session.emit(GameEvent::Connected);

    loop {
        let deadline = session.wheel.next_deadline();
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(msg) = cmd else {
                    debug!("command channel closed, shutting down session loop");
                    let _ = transport.close().await;
                    session.disconnect(Some("client shut down".into())).await;
                    break;
                };
                if let ClientMessage::StartGame { ack } = &msg {
                    session.pending_acks.insert(*ack);
                }
                let json = match serde_json::to_string(&msg) {
                    Ok(json) => json,
                    Err(e) => {
                        error!("failed to serialize ClientMessage: {e}");
                        continue;
                    }
                };
                if let Err(e) = transport.send(json).await {
                    error!("transport send error: {e}");
                    session.fail(format!("transport send error: {e}")).await;
                    break;
                }
            }

            _ = &mut shutdown_rx => {
                debug!("shutdown signal received");
                let _ = transport.close().await;
                session.disconnect(Some("client shut down".into())).await;
                break;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                        Ok(msg) => session.handle_server_message(msg, Instant::now()),
                        Err(e) => warn!("dropping undecodable frame: {e}; raw: {text}"),
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        session.fail(format!("transport receive error: {e}")).await;
                        break;
                    }
                    None => {
                        debug!("transport closed by server");
                        session.fail("connection closed by server".into()).await;
                        break;
                    }
                }
            }

            () = wheel_timer(deadline) => {
                session.poll_wheel(Instant::now());
            }
        }
    }

    debug!("session loop exited");
}

/// Sleeps until `deadline`, or forever if there is none.
async fn wheel_timer(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

impl Session {
    fn handle_server_message(&mut self, msg: ServerMessage, now: Instant) {
        debug!(event = msg.event_name(), "server message");
        if let ServerMessage::Ack {
            ack,
            success,
            message,
        } = msg
        {
            self.handle_ack(ack, success, message);
            return;
        }

        let Some(effect) = self.store.apply(&msg) else {
            return;
        };

        // The layout must match the new roster before a winner index is
        // resolved against it.
        let mut wheel_events = Vec::new();
        wheel_events.extend(
            self.wheel
                .set_segments(segments_for(&self.store.state().players)),
        );
        match &effect {
            Effect::GameStarted { .. } => {
                // Any start request still unanswered is moot now.
                self.pending_acks.clear();
            }
            Effect::RoundBegun { .. } => {
                wheel_events.extend(self.wheel.set_spin_requested(true));
            }
            Effect::RoundResolved { winner_index, .. } => {
                wheel_events.extend(self.wheel.resolve_winner(Some(*winner_index), now));
            }
            _ => {}
        }

        if let Some(event) = GameEvent::from_effect(effect, &self.store.state().players) {
            self.emit(event);
        }
        for event in wheel_events {
            self.on_wheel_event(event);
        }
        self.publish_wheel();
    }

    fn handle_ack(&mut self, ack: AckId, success: bool, message: Option<String>) {
        if !self.pending_acks.remove(&ack) {
            debug!(%ack, "acknowledgement for unknown command; ignoring");
            return;
        }
        if success {
            debug!(%ack, "command acknowledged");
            return;
        }
        let message = message.unwrap_or_else(|| START_REJECTED_MESSAGE.to_string());
        warn!(%ack, "command rejected: {message}");
        self.store.set_error(message.clone());
        self.emit(GameEvent::CommandRejected { message });
    }

    fn poll_wheel(&mut self, now: Instant) {
        while let Some(event) = self.wheel.poll(now) {
            self.on_wheel_event(event);
        }
        self.publish_wheel();
    }

    fn on_wheel_event(&mut self, event: WheelEvent) {
        if let WheelEvent::Settled { .. } = event {
            self.store.finish_spin();
        }
        self.emit(event.into());
    }

    fn publish_wheel(&self) {
        let view = self.wheel.view();
        self.wheel_tx.send_if_modified(|current| {
            if *current == view {
                return false;
            }
            *current = view;
            true
        });
    }

    /// Transport fault: surface it, then end the session.
    async fn fail(&mut self, reason: String) {
        self.store.set_error(CONNECTION_ERROR_MESSAGE);
        self.disconnect(Some(reason)).await;
    }

    /// Emit an event, dropping it with a warning if the channel is full.
    fn emit(&self, event: GameEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                warn!("event channel full, dropping event: {dropped:?}");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event channel closed, receiver dropped");
            }
        }
    }

    /// Emit [`GameEvent::Disconnected`]. Blocks for capacity: it is the last
    /// event and must not be dropped.
    async fn disconnect(&mut self, reason: Option<String>) {
        self.connected.store(false, Ordering::Release);
        self.pending_acks.clear();
        if self
            .event_tx
            .send(GameEvent::Disconnected { reason })
            .await
            .is_err()
        {
            debug!("event channel closed, receiver dropped");
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::identity::StaticIdentity;
    use crate::protocol::Player;
    use crate::state::GameStatus;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Records sent frames and replays scripted inbound ones.
    struct MockTransport {
        incoming: VecDeque<Option<Result<String>>>,
        sent: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockTransport {
        fn new(
            incoming: Vec<Option<Result<String>>>,
        ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
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
        async fn send(&mut self, message: String) -> Result<()> {
            self.sent.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            match self.incoming.pop_front() {
                Some(item) => item,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    fn frame(msg: &ServerMessage) -> Option<Result<String>> {
        Some(Ok(serde_json::to_string(msg).unwrap()))
    }

    fn roster(n: usize) -> Vec<Player> {
        (0..n)
            .map(|i| Player::new(format!("p{i}"), format!("P{i}")))
            .collect()
    }

    fn start(
        incoming: Vec<Option<Result<String>>>,
    ) -> (
        SpinWheelClient,
        mpsc::Receiver<GameEvent>,
        Arc<StdMutex<Vec<String>>>,
        Arc<AtomicBool>,
    ) {
        let (transport, sent, closed) = MockTransport::new(incoming);
        let (client, events) =
            SpinWheelClient::start(transport, &StaticIdentity::development(), ClientConfig::new())
                .unwrap();
        (client, events, sent, closed)
    }

    #[tokio::test]
    async fn join_is_the_first_frame() {
        let (mut client, mut events, sent, _closed) = start(vec![]);
        assert_eq!(events.recv().await, Some(GameEvent::Connected));
        tokio::task::yield_now().await;

        let first: ClientMessage = serde_json::from_str(&sent.lock().unwrap()[0]).unwrap();
        match first {
            ClientMessage::Join {
                player_name,
                user_id,
            } => {
                assert_eq!(player_name, "Test User");
                assert_eq!(user_id, 123_456_789);
            }
            other => panic!("expected Join, got {other:?}"),
        }
        client.shutdown().await;
    }

    #[tokio::test]
    async fn missing_identity_fails_before_spawning() {
        struct Nobody;
        impl IdentityProvider for Nobody {
            fn identity(&self) -> Option<Identity> {
                None
            }
        }
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let result = SpinWheelClient::start(transport, &Nobody, ClientConfig::new());
        assert!(matches!(result, Err(WheelClientError::Authentication(_))));
        assert!(sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_game_is_guarded_below_four_players() {
        let (mut client, mut events, sent, _closed) =
            start(vec![frame(&ServerMessage::RosterUpdate {
                players: roster(3),
            })]);
        assert_eq!(events.recv().await, Some(GameEvent::Connected));
        assert!(matches!(
            events.recv().await,
            Some(GameEvent::RosterUpdated { .. })
        ));

        let err = client.start_game().unwrap_err();
        assert!(matches!(
            err,
            WheelClientError::StartNotAllowed {
                players: 3,
                required: 4,
                status: GameStatus::Waiting
            }
        ));
        tokio::task::yield_now().await;
        assert_eq!(sent.lock().unwrap().len(), 1, "only join was sent");
        client.shutdown().await;
    }

    #[tokio::test]
    async fn start_game_sends_a_fresh_ack_id() {
        let (mut client, mut events, sent, _closed) =
            start(vec![frame(&ServerMessage::RosterUpdate {
                players: roster(4),
            })]);
        let _ = events.recv().await; // Connected
        let _ = events.recv().await; // RosterUpdated

        let ack = client.start_game().unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let last: ClientMessage =
            serde_json::from_str(sent.lock().unwrap().last().unwrap()).unwrap();
        assert!(matches!(last, ClientMessage::StartGame { ack: a } if a == ack));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn restart_is_refused_unless_finished() {
        let (mut client, mut events, _sent, _closed) = start(vec![]);
        let _ = events.recv().await;
        assert!(matches!(
            client.restart_game(),
            Err(WheelClientError::RestartNotAllowed {
                status: GameStatus::Waiting
            })
        ));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn server_close_surfaces_connection_error() {
        let (mut client, mut events, _sent, _closed) = start(vec![None]);
        assert_eq!(events.recv().await, Some(GameEvent::Connected));
        assert!(matches!(
            events.recv().await,
            Some(GameEvent::Disconnected { reason: Some(_) })
        ));
        assert!(!client.is_connected());
        assert_eq!(
            client.state().error.as_deref(),
            Some(CONNECTION_ERROR_MESSAGE)
        );
        assert_eq!(client.state().game_status, GameStatus::Waiting);
        client.shutdown().await;
    }

    #[tokio::test]
    async fn receive_error_ends_the_session() {
        let (mut client, mut events, _sent, _closed) = start(vec![Some(Err(
            WheelClientError::TransportReceive("reset".into()),
        ))]);
        let _ = events.recv().await;
        match events.recv().await {
            Some(GameEvent::Disconnected { reason: Some(r) }) => assert!(r.contains("reset")),
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(matches!(
            client.restart_game(),
            Err(WheelClientError::RestartNotAllowed { .. })
        ));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn undecodable_frames_are_skipped() {
        let (mut client, mut events, _sent, _closed) = start(vec![
            Some(Ok("{not json".into())),
            Some(Ok(r#"{"type":"mystery","data":{}}"#.into())),
            frame(&ServerMessage::PlayerJoined { name: "Ada".into() }),
        ]);
        let _ = events.recv().await;
        assert_eq!(
            events.recv().await,
            Some(GameEvent::PlayerJoined { name: "Ada".into() })
        );
        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_transport_and_emits_disconnected() {
        let (mut client, mut events, _sent, closed) = start(vec![]);
        let _ = events.recv().await;
        client.shutdown().await;
        assert!(closed.load(Ordering::Relaxed));
        assert_eq!(
            events.recv().await,
            Some(GameEvent::Disconnected {
                reason: Some("client shut down".into())
            })
        );
        assert!(events.recv().await.is_none());
        assert!(matches!(
            client.start_game(),
            Err(WheelClientError::StartNotAllowed { .. })
        ));
    }

    #[tokio::test]
    async fn double_shutdown_is_harmless() {
        let (mut client, _events, _sent, _closed) = start(vec![]);
        client.shutdown().await;
        client.shutdown().await;
        assert!(!client.is_connected());
    }

    #[test]
    fn config_defaults_and_clamping() {
        let config = ClientConfig::default();
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
        assert_eq!(config.wheel_timing, WheelTiming::default());
        assert_eq!(
            ClientConfig::new()
                .with_event_channel_capacity(0)
                .event_channel_capacity,
            1
        );
    }

    fn session() -> (Session, mpsc::Receiver<GameEvent>) {
        let (event_tx, events) = mpsc::channel(16);
        let wheel = WheelEngine::default();
        let (wheel_tx, _wheel_rx) = watch::channel(wheel.view());
        let session = Session {
            store: SessionStore::new(),
            wheel,
            wheel_tx,
            event_tx,
            pending_acks: HashSet::new(),
            connected: Arc::new(AtomicBool::new(true)),
        };
        (session, events)
    }

    #[tokio::test]
    async fn game_start_and_disconnect_forget_pending_acks() {
        let (mut session, mut events) = session();
        let now = Instant::now();
        let stale = Uuid::new_v4();
        session.pending_acks.insert(stale);
        session.handle_server_message(
            ServerMessage::RosterUpdate {
                players: roster(4),
            },
            now,
        );
        session.handle_server_message(ServerMessage::GameStart { total_rounds: 1 }, now);
        assert!(session.pending_acks.is_empty());

        session.handle_ack(stale, false, None);
        assert!(session.store.state().error.is_none());

        session.pending_acks.insert(Uuid::new_v4());
        session.disconnect(None).await;
        assert!(session.pending_acks.is_empty());

        let mut seen = Vec::new();
        while let Ok(event) = events.try_recv() {
            seen.push(event);
        }
        assert!(seen
            .iter()
            .all(|e| !matches!(e, GameEvent::CommandRejected { .. })));
        assert_eq!(seen.last(), Some(&GameEvent::Disconnected { reason: None }));
    }

    #[tokio::test]
    async fn resume_seeds_the_wheel_with_the_carried_roster() {
        let (transport, sent, _closed) = MockTransport::new(vec![]);
        let last = SessionState {
            players: roster(4),
            is_game_active: true,
            current_round: 2,
            total_rounds: 3,
            game_status: GameStatus::InProgress,
            error: Some(CONNECTION_ERROR_MESSAGE.into()),
            ..SessionState::default()
        };
        let (mut client, mut events) = SpinWheelClient::resume(
            transport,
            &StaticIdentity::development(),
            ClientConfig::new(),
            last,
        )
        .unwrap();
        assert_eq!(events.recv().await, Some(GameEvent::Connected));
        tokio::task::yield_now().await;

        let state = client.state();
        assert_eq!(state.game_status, GameStatus::InProgress);
        assert_eq!(state.current_round, 2);
        assert!(state.error.is_none());
        assert_eq!(client.wheel().segments.len(), 4);
        let first: ClientMessage = serde_json::from_str(&sent.lock().unwrap()[0]).unwrap();
        assert!(matches!(first, ClientMessage::Join { .. }));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn debug_impl_names_the_user() {
        let (mut client, _events, _sent, _closed) = start(vec![]);
        let rendered = format!("{client:?}");
        assert!(rendered.contains("SpinWheelClient"));
        assert!(rendered.contains("123456789"));
        client.shutdown().await;
    }
}
