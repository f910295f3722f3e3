//! Session State Store.
//!
//! [`reduce`] is a pure function from the current [`SessionState`] and one
//! inbound [`ServerMessage`] to the next state plus an [`Effect`] describing
//! what changed. It never guesses an outcome: `new_round` only flags that the
//! wheel is spinning, and the winner exists only once `round_result` says so.
//!
//! [`SessionStore`] owns the live state, absorbs every [`ProtocolFault`] as
//! a logged no-op, and publishes each new state to subscribers over a
//! [`tokio::sync::watch`] channel.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::protocol::{Player, ServerMessage};

/// Roster size the server requires before it accepts `start_game`.
pub const MAX_PLAYERS: usize = 4;

/// Error text surfaced when the connection fails without a server message.
pub const CONNECTION_ERROR_MESSAGE: &str = "Failed to connect to the game server";

/// Error text surfaced when `start_game` is declined without a reason.
pub const START_REJECTED_MESSAGE: &str = "Failed to start game";

// ── Game status ─────────────────────────────────────────────────────

/// Phase of the game as the client last observed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Lobby; no game has started.
    #[default]
    Waiting,
    /// `game_start` received, first round not yet begun.
    Starting,
    /// At least one round has begun.
    InProgress,
    /// `game_over` received.
    Finished,
}

impl GameStatus {
    /// The wire spelling of this status.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Starting => "starting",
            Self::InProgress => "in_progress",
            Self::Finished => "finished",
        }
    }

    /// Position in the forward order `waiting → starting → in_progress → finished`.
    pub fn rank(self) -> u8 {
        match self {
            Self::Waiting => 0,
            Self::Starting => 1,
            Self::InProgress => 2,
            Self::Finished => 3,
        }
    }
}

impl fmt::Display for GameStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Session state ───────────────────────────────────────────────────

/// The client's single source of truth for the game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    /// Roster in join order. Wheel segment `i` is `players[i]`.
    pub players: Vec<Player>,
    pub is_game_active: bool,
    /// 1-based; `0` before any game has started.
    pub current_round: u32,
    /// Fixed when the game starts.
    pub total_rounds: u32,
    /// Winner of the most recent round, cleared when the next round begins.
    pub round_winner: Option<Player>,
    /// Final winners. Non-empty exactly when the game is finished.
    pub winners: Vec<Player>,
    pub game_status: GameStatus,
    /// Transient, user-visible error text.
    pub error: Option<String>,
    /// Winner of round `current_round` when its result arrived while the
    /// game was still `starting`. Consumed by that round's `new_round`.
    pub early_result: Option<Player>,
    /// Roster id of the local player, once it can be told apart.
    pub local_player_id: Option<String>,
}

impl SessionState {
    /// Returns `true` while a round has begun and its winner is not yet known.
    pub fn is_round_open(&self) -> bool {
        self.game_status == GameStatus::InProgress && self.round_winner.is_none()
    }

    /// Whether the local "start game" command may be issued.
    pub fn can_start_game(&self) -> bool {
        self.game_status == GameStatus::Waiting && self.players.len() >= MAX_PLAYERS
    }

    /// Whether the local "restart game" command may be issued.
    pub fn can_restart(&self) -> bool {
        self.game_status == GameStatus::Finished
    }

    /// Look up a roster entry by id.
    pub fn player(&self, id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == id)
    }

    /// Wheel segment index of the given player.
    pub fn segment_index(&self, id: &str) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }

    /// Whether `id` is among the final winners.
    pub fn is_winner(&self, id: &str) -> bool {
        self.winners.iter().any(|w| w.id == id)
    }

    /// Whether `id` is the local player's roster entry.
    pub fn is_local_player(&self, id: &str) -> bool {
        self.local_player_id.as_deref() == Some(id)
    }

    /// The local player's roster entry.
    pub fn local_player(&self) -> Option<&Player> {
        self.local_player_id.as_deref().and_then(|id| self.player(id))
    }

    /// Whether the local player is among the final winners.
    pub fn is_local_winner(&self) -> bool {
        self.local_player_id
            .as_deref()
            .is_some_and(|id| self.is_winner(id))
    }

    /// This state with the per-connection parts cleared, ready to seed a
    /// session on a new connection.
    ///
    /// The game phase, round counters, roster and local player are kept.
    /// The transient error and every spinning flag are dropped: no wheel is
    /// armed on the new connection.
    #[must_use]
    pub fn resumed(mut self) -> Self {
        self.error = None;
        for player in &mut self.players {
            player.is_spinning = false;
        }
        self
    }

    /// One-line status for the lobby/game header.
    pub fn status_message(&self) -> String {
        match self.game_status {
            GameStatus::Waiting => format!(
                "Waiting for players... ({}/{MAX_PLAYERS})",
                self.players.len()
            ),
            GameStatus::Starting => "Game starting...".to_string(),
            GameStatus::InProgress => match &self.round_winner {
                Some(winner) => format!("Round {} Winner: {}!", self.current_round, winner.name),
                None => format!("Round {}: Spinning...", self.current_round),
            },
            GameStatus::Finished => "Game Over!".to_string(),
        }
    }

    /// Checks the cross-field invariants every reachable state satisfies.
    pub fn is_consistent(&self) -> bool {
        let waiting = self.game_status == GameStatus::Waiting;
        let idle = !self.is_game_active && self.current_round == 0;
        let finished = self.game_status == GameStatus::Finished;
        waiting == idle
            && finished == !self.winners.is_empty()
            && self.current_round <= self.total_rounds
            && (self.is_game_active
                == matches!(
                    self.game_status,
                    GameStatus::Starting | GameStatus::InProgress
                ))
            && (self.early_result.is_none() || self.game_status == GameStatus::Starting)
    }
}

// ── Reduction ───────────────────────────────────────────────────────

/// Side-channel announcements that change no state field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    PlayerJoined { name: String },
    PlayerLeft { name: String },
}

/// What a successfully reduced event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// The roster was replaced.
    RosterReplaced,
    Notice(Notice),
    GameStarted { total_rounds: u32 },
    /// A round began. This is what arms the wheel.
    RoundBegun { round: u32, total_rounds: u32 },
    /// The server declared the open round's winner.
    RoundResolved {
        round: u32,
        winner: Player,
        /// Winner's position in the new roster, i.e. its wheel segment.
        winner_index: usize,
    },
    /// A round began whose result was already known. Nothing to animate.
    RoundResolvedEarly {
        round: u32,
        total_rounds: u32,
        winner: Player,
    },
    /// A result arrived with no open round: scores changed, nothing to animate.
    ScoresUpdated,
    GameEnded { winners: Vec<Player> },
    /// A connection problem was surfaced in [`SessionState::error`].
    ConnectionFault { message: String },
    /// Nothing the store tracks changed.
    Unchanged,
}

/// Next state plus what changed.
#[derive(Debug, Clone)]
pub struct Reduced {
    pub state: SessionState,
    pub effect: Effect,
}

/// Reasons an inbound event is refused. The state is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolFault {
    #[error("{event} is not valid while the game is {status}")]
    OutOfSequence {
        event: &'static str,
        status: GameStatus,
    },
    #[error("round {round} is older than the current round {current}")]
    StaleRound { round: u32, current: u32 },
    #[error("round {round} has already begun")]
    DuplicateRound { round: u32 },
    #[error("round {round} is outside a {total}-round game")]
    RoundOutOfRange { round: u32, total: u32 },
    #[error("round winner {winner_id} is not in the accompanying player list")]
    UnknownWinner { winner_id: String },
    #[error("game_start declared zero rounds")]
    EmptyGame,
    #[error("game_over carried no winners")]
    NoWinners,
}

/// Reduce one inbound event.
///
/// Acknowledgements are correlated by the client, so [`ServerMessage::Ack`]
/// reduces to [`Effect::Unchanged`].
///
/// # Errors
///
/// Returns a [`ProtocolFault`] for events that are out of sequence,
/// duplicated, or internally inconsistent.
pub fn reduce(state: &SessionState, msg: &ServerMessage) -> Result<Reduced, ProtocolFault> {
    let out_of_sequence = || ProtocolFault::OutOfSequence {
        event: msg.event_name(),
        status: state.game_status,
    };
    let mut next = state.clone();

    let effect = match msg {
        ServerMessage::RosterUpdate { players } => {
            next.players = players.clone();
            next.error = None;
            Effect::RosterReplaced
        }
        ServerMessage::PlayerJoined { name } => {
            Effect::Notice(Notice::PlayerJoined { name: name.clone() })
        }
        ServerMessage::PlayerLeft { name } => {
            Effect::Notice(Notice::PlayerLeft { name: name.clone() })
        }
        ServerMessage::GameStart { total_rounds } => {
            if !matches!(state.game_status, GameStatus::Waiting | GameStatus::Finished) {
                return Err(out_of_sequence());
            }
            if *total_rounds == 0 {
                return Err(ProtocolFault::EmptyGame);
            }
            next.is_game_active = true;
            next.total_rounds = *total_rounds;
            next.current_round = 1;
            next.game_status = GameStatus::Starting;
            next.round_winner = None;
            next.early_result = None;
            next.winners.clear();
            next.error = None;
            Effect::GameStarted {
                total_rounds: *total_rounds,
            }
        }
        ServerMessage::NewRound {
            round,
            total_rounds,
        } => {
            if !matches!(
                state.game_status,
                GameStatus::Starting | GameStatus::InProgress
            ) {
                return Err(out_of_sequence());
            }
            if *round == 0 || *round > state.total_rounds {
                return Err(ProtocolFault::RoundOutOfRange {
                    round: *round,
                    total: state.total_rounds,
                });
            }
            if *round < state.current_round {
                return Err(ProtocolFault::StaleRound {
                    round: *round,
                    current: state.current_round,
                });
            }
            if state.game_status == GameStatus::InProgress && *round == state.current_round {
                return Err(ProtocolFault::DuplicateRound { round: *round });
            }
            if *total_rounds != state.total_rounds {
                warn!(
                    declared = total_rounds,
                    fixed = state.total_rounds,
                    "new_round disagrees with the round count fixed at game start"
                );
            }
            let early = next.early_result.take();
            next.current_round = *round;
            next.game_status = GameStatus::InProgress;
            match early {
                Some(winner) if *round == state.current_round => {
                    debug!(round, winner = %winner.id, "round already resolved; not spinning");
                    next.round_winner = Some(winner.clone());
                    Effect::RoundResolvedEarly {
                        round: *round,
                        total_rounds: state.total_rounds,
                        winner,
                    }
                }
                _ => {
                    next.round_winner = None;
                    for player in &mut next.players {
                        player.is_spinning = true;
                    }
                    Effect::RoundBegun {
                        round: *round,
                        total_rounds: state.total_rounds,
                    }
                }
            }
        }
        ServerMessage::RoundResult { winner, players } => {
            if matches!(state.game_status, GameStatus::Waiting | GameStatus::Finished) {
                return Err(out_of_sequence());
            }
            let winner_index = players
                .iter()
                .position(|p| p.id == winner.id)
                .ok_or_else(|| ProtocolFault::UnknownWinner {
                    winner_id: winner.id.clone(),
                })?;
            next.players = players
                .iter()
                .cloned()
                .map(|mut p| {
                    p.is_spinning = false;
                    p
                })
                .collect();
            let mut declared = winner.clone();
            declared.is_spinning = false;
            if state.is_round_open() {
                next.round_winner = Some(declared.clone());
                Effect::RoundResolved {
                    round: state.current_round,
                    winner: declared,
                    winner_index,
                }
            } else if state.game_status == GameStatus::Starting {
                debug!(
                    round = state.current_round,
                    winner = %declared.id,
                    "round_result before its new_round; holding it for that round"
                );
                next.early_result = Some(declared);
                Effect::ScoresUpdated
            } else {
                debug!(
                    status = %state.game_status,
                    round = state.current_round,
                    "round_result without an open round; updating scores only"
                );
                Effect::ScoresUpdated
            }
        }
        ServerMessage::GameOver { players, winners } => {
            if !matches!(
                state.game_status,
                GameStatus::Starting | GameStatus::InProgress
            ) {
                return Err(out_of_sequence());
            }
            if winners.is_empty() {
                return Err(ProtocolFault::NoWinners);
            }
            next.is_game_active = false;
            next.early_result = None;
            next.players = players
                .iter()
                .cloned()
                .map(|mut p| {
                    p.is_spinning = false;
                    p
                })
                .collect();
            next.winners = winners.clone();
            next.game_status = GameStatus::Finished;
            Effect::GameEnded {
                winners: winners.clone(),
            }
        }
        ServerMessage::ConnectionError { message } => {
            let message = message
                .as_deref()
                .map(str::trim)
                .filter(|m| !m.is_empty())
                .unwrap_or(CONNECTION_ERROR_MESSAGE)
                .to_string();
            next.error = Some(message.clone());
            Effect::ConnectionFault { message }
        }
        ServerMessage::Ack { .. } => Effect::Unchanged,
    };

    Ok(Reduced {
        state: next,
        effect,
    })
}

// ── Store ───────────────────────────────────────────────────────────

/// Owns the live [`SessionState`] and notifies subscribers of every change.
#[derive(Debug)]
pub struct SessionStore {
    state: SessionState,
    tx: watch::Sender<SessionState>,
    local_name: Option<String>,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Create a store holding the empty lobby state.
    pub fn new() -> Self {
        Self::with_state(SessionState::default())
    }

    /// Create a store seeded with `state`, e.g. the last state of a session
    /// whose connection dropped.
    pub fn with_state(state: SessionState) -> Self {
        let (tx, _rx) = watch::channel(state.clone());
        Self {
            state,
            tx,
            local_name: None,
        }
    }

    /// Track the local player by the display name it joined with.
    ///
    /// The protocol never tells a client its own roster id, so the store
    /// resolves [`SessionState::local_player_id`] on each roster change: the
    /// only entry carrying `name`, or else the only such entry new since the
    /// previous roster. A resolved id is kept while it stays in the roster.
    #[must_use]
    pub fn with_local_name(mut self, name: impl Into<String>) -> Self {
        self.local_name = Some(name.into());
        let mut next = self.state.clone();
        self.resolve_local_player(&mut next);
        self.commit(next);
        self
    }

    /// The current state.
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    /// Subscribe to state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Reduce `msg` into the store.
    ///
    /// Returns `None` if the event was refused; the fault is logged and the
    /// state is unchanged.
    pub fn apply(&mut self, msg: &ServerMessage) -> Option<Effect> {
        match reduce(&self.state, msg) {
            Ok(Reduced { mut state, effect }) => {
                debug_assert!(state.is_consistent(), "reducer produced {state:?}");
                self.resolve_local_player(&mut state);
                self.commit(state);
                Some(effect)
            }
            Err(fault) => {
                warn!(
                    event = msg.event_name(),
                    status = %self.state.game_status,
                    "dropping event: {fault}"
                );
                None
            }
        }
    }

    /// Surface a transient error without touching the game phase.
    pub fn set_error(&mut self, message: impl Into<String>) {
        let mut next = self.state.clone();
        next.error = Some(message.into());
        self.commit(next);
    }

    /// Completion hook for the wheel: clears every player's spinning flag.
    pub fn finish_spin(&mut self) {
        if !self.state.players.iter().any(|p| p.is_spinning) {
            return;
        }
        let mut next = self.state.clone();
        for player in &mut next.players {
            player.is_spinning = false;
        }
        self.commit(next);
    }

    fn resolve_local_player(&self, next: &mut SessionState) {
        let Some(name) = self.local_name.as_deref() else {
            return;
        };
        if next
            .local_player_id
            .as_deref()
            .is_some_and(|id| next.player(id).is_some())
        {
            return;
        }
        let named: Vec<&Player> = next.players.iter().filter(|p| p.name == name).collect();
        let resolved = match named.as_slice() {
            [only] => Some(only.id.clone()),
            _ => {
                let mut fresh = named
                    .iter()
                    .filter(|p| self.state.player(&p.id).is_none());
                match (fresh.next(), fresh.next()) {
                    (Some(p), None) => Some(p.id.clone()),
                    _ => None,
                }
            }
        };
        if resolved.is_none() && !named.is_empty() {
            debug!(
                name,
                candidates = named.len(),
                "cannot tell the local player apart yet"
            );
        }
        if resolved != next.local_player_id {
            debug!(id = ?resolved, "local player changed");
        }
        next.local_player_id = resolved;
    }

    fn commit(&mut self, next: SessionState) {
        if next == self.state {
            return;
        }
        self.state = next;
        self.tx.send_replace(self.state.clone());
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

    fn roster(n: usize) -> Vec<Player> {
        (1..=n)
            .map(|i| Player::new(format!("p{i}"), format!("Player {i}")))
            .collect()
    }

    fn apply_all(msgs: &[ServerMessage]) -> SessionState {
        let mut state = SessionState::default();
        for msg in msgs {
            state = reduce(&state, msg).unwrap().state;
        }
        state
    }

    fn started(total_rounds: u32) -> SessionState {
        apply_all(&[
            ServerMessage::RosterUpdate {
                players: roster(4),
            },
            ServerMessage::GameStart { total_rounds },
        ])
    }

    fn result_for(winner: usize, players: &[Player]) -> ServerMessage {
        ServerMessage::RoundResult {
            winner: players[winner].clone(),
            players: players.to_vec(),
        }
    }

    #[test]
    fn default_state_is_waiting_lobby() {
        let state = SessionState::default();
        assert_eq!(state.game_status, GameStatus::Waiting);
        assert!(!state.is_game_active);
        assert_eq!(state.current_round, 0);
        assert!(state.is_consistent());
        assert_eq!(state.status_message(), "Waiting for players... (0/4)");
    }

    #[test]
    fn roster_update_replaces_players_and_clears_error() {
        let mut state = SessionState::default();
        state.error = Some("boom".into());
        let next = reduce(
            &state,
            &ServerMessage::RosterUpdate {
                players: roster(2),
            },
        )
        .unwrap();
        assert_eq!(next.state.players.len(), 2);
        assert!(next.state.error.is_none());
        assert_eq!(next.effect, Effect::RosterReplaced);
    }

    #[test]
    fn notices_change_no_fields() {
        let state = started(3);
        for msg in [
            ServerMessage::PlayerJoined { name: "Eve".into() },
            ServerMessage::PlayerLeft { name: "Eve".into() },
        ] {
            let next = reduce(&state, &msg).unwrap();
            assert_eq!(next.state, state);
            assert!(matches!(next.effect, Effect::Notice(_)));
        }
    }

    #[test]
    fn game_start_enters_starting_at_round_one() {
        let state = started(3);
        assert!(state.is_game_active);
        assert_eq!(state.total_rounds, 3);
        assert_eq!(state.current_round, 1);
        assert_eq!(state.game_status, GameStatus::Starting);
        assert_eq!(state.status_message(), "Game starting...");
    }

    #[test]
    fn duplicate_game_start_is_refused() {
        let state = started(3);
        let err = reduce(&state, &ServerMessage::GameStart { total_rounds: 5 }).unwrap_err();
        assert_eq!(
            err,
            ProtocolFault::OutOfSequence {
                event: "game_start",
                status: GameStatus::Starting
            }
        );
    }

    #[test]
    fn zero_round_game_is_refused() {
        let err = reduce(
            &SessionState::default(),
            &ServerMessage::GameStart { total_rounds: 0 },
        )
        .unwrap_err();
        assert_eq!(err, ProtocolFault::EmptyGame);
    }

    #[test]
    fn new_round_flags_every_player_spinning() {
        let state = started(3);
        let next = reduce(
            &state,
            &ServerMessage::NewRound {
                round: 1,
                total_rounds: 3,
            },
        )
        .unwrap();
        assert_eq!(next.state.game_status, GameStatus::InProgress);
        assert!(next.state.players.iter().all(|p| p.is_spinning));
        assert!(next.state.round_winner.is_none());
        assert!(next.state.is_round_open());
        assert_eq!(
            next.effect,
            Effect::RoundBegun {
                round: 1,
                total_rounds: 3
            }
        );
        assert_eq!(next.state.status_message(), "Round 1: Spinning...");
    }

    #[test]
    fn new_round_before_game_start_is_refused() {
        let err = reduce(
            &SessionState::default(),
            &ServerMessage::NewRound {
                round: 1,
                total_rounds: 3,
            },
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolFault::OutOfSequence { .. }));
    }

    #[test]
    fn stale_and_duplicate_rounds_are_refused() {
        let state = apply_all(&[
            ServerMessage::RosterUpdate {
                players: roster(4),
            },
            ServerMessage::GameStart { total_rounds: 3 },
            ServerMessage::NewRound {
                round: 2,
                total_rounds: 3,
            },
        ]);
        assert_eq!(
            reduce(
                &state,
                &ServerMessage::NewRound {
                    round: 1,
                    total_rounds: 3
                }
            )
            .unwrap_err(),
            ProtocolFault::StaleRound {
                round: 1,
                current: 2
            }
        );
        assert_eq!(
            reduce(
                &state,
                &ServerMessage::NewRound {
                    round: 2,
                    total_rounds: 3
                }
            )
            .unwrap_err(),
            ProtocolFault::DuplicateRound { round: 2 }
        );
        assert_eq!(
            reduce(
                &state,
                &ServerMessage::NewRound {
                    round: 4,
                    total_rounds: 3
                }
            )
            .unwrap_err(),
            ProtocolFault::RoundOutOfRange { round: 4, total: 3 }
        );
    }

    #[test]
    fn round_result_declares_winner_and_stops_spinning() {
        let mut state = started(3);
        state = reduce(
            &state,
            &ServerMessage::NewRound {
                round: 1,
                total_rounds: 3,
            },
        )
        .unwrap()
        .state;
        let mut scored = roster(4);
        scored[1].score = 1;
        let next = reduce(&state, &result_for(1, &scored)).unwrap();

        assert!(next.state.players.iter().all(|p| !p.is_spinning));
        assert_eq!(next.state.players[1].score, 1);
        assert_eq!(next.state.round_winner.as_ref().unwrap().id, "p2");
        match next.effect {
            Effect::RoundResolved {
                round,
                winner_index,
                ref winner,
            } => {
                assert_eq!(round, 1);
                assert_eq!(winner_index, 1);
                assert_eq!(winner.id, "p2");
            }
            ref other => panic!("expected RoundResolved, got {other:?}"),
        }
        assert_eq!(next.state.status_message(), "Round 1 Winner: Player 2!");
    }

    #[test]
    fn round_result_with_unknown_winner_changes_nothing() {
        let state = reduce(
            &started(3),
            &ServerMessage::NewRound {
                round: 1,
                total_rounds: 3,
            },
        )
        .unwrap()
        .state;
        let err = reduce(
            &state,
            &ServerMessage::RoundResult {
                winner: Player::new("ghost", "Ghost"),
                players: roster(4),
            },
        )
        .unwrap_err();
        assert_eq!(
            err,
            ProtocolFault::UnknownWinner {
                winner_id: "ghost".into()
            }
        );
    }

    #[test]
    fn early_round_result_updates_scores_only() {
        let state = started(3);
        let mut scored = roster(4);
        scored[2].score = 1;
        let next = reduce(&state, &result_for(2, &scored)).unwrap();
        assert_eq!(next.effect, Effect::ScoresUpdated);
        assert_eq!(next.state.players[2].score, 1);
        assert!(next.state.round_winner.is_none());
        assert_eq!(next.state.game_status, GameStatus::Starting);
        assert_eq!(next.state.early_result.as_ref().map(|p| p.id.as_str()), Some("p3"));
        assert!(next.state.is_consistent());
    }

    #[test]
    fn new_round_after_its_own_result_does_not_spin() {
        let mut scored = roster(4);
        scored[1].score = 1;
        let state = reduce(&started(2), &result_for(1, &scored)).unwrap().state;

        let next = reduce(
            &state,
            &ServerMessage::NewRound {
                round: 1,
                total_rounds: 2,
            },
        )
        .unwrap();
        assert_eq!(
            next.effect,
            Effect::RoundResolvedEarly {
                round: 1,
                total_rounds: 2,
                winner: scored[1].clone(),
            }
        );
        let state = next.state;
        assert_eq!(state.game_status, GameStatus::InProgress);
        assert!(!state.is_round_open());
        assert!(state.early_result.is_none());
        assert!(state.players.iter().all(|p| !p.is_spinning));
        assert_eq!(state.status_message(), "Round 1 Winner: Player 2!");
        assert!(state.is_consistent());

        let next = reduce(
            &state,
            &ServerMessage::NewRound {
                round: 2,
                total_rounds: 2,
            },
        )
        .unwrap();
        assert!(matches!(next.effect, Effect::RoundBegun { round: 2, .. }));
    }

    #[test]
    fn held_result_is_dropped_when_a_later_round_begins() {
        let players = roster(4);
        let state = reduce(&started(3), &result_for(0, &players)).unwrap().state;
        let next = reduce(
            &state,
            &ServerMessage::NewRound {
                round: 2,
                total_rounds: 3,
            },
        )
        .unwrap();
        assert!(matches!(next.effect, Effect::RoundBegun { round: 2, .. }));
        assert!(next.state.early_result.is_none());
        assert!(next.state.round_winner.is_none());
        assert!(next.state.players.iter().all(|p| p.is_spinning));
    }

    #[test]
    fn second_result_for_a_closed_round_does_not_move_the_winner() {
        let players = roster(4);
        let state = apply_all(&[
            ServerMessage::RosterUpdate {
                players: players.clone(),
            },
            ServerMessage::GameStart { total_rounds: 2 },
            ServerMessage::NewRound {
                round: 1,
                total_rounds: 2,
            },
            result_for(0, &players),
        ]);
        let next = reduce(&state, &result_for(3, &players)).unwrap();
        assert_eq!(next.effect, Effect::ScoresUpdated);
        assert_eq!(next.state.round_winner.unwrap().id, "p1");
    }

    #[test]
    fn game_over_sets_winners_once() {
        let players = roster(4);
        let state = apply_all(&[
            ServerMessage::RosterUpdate {
                players: players.clone(),
            },
            ServerMessage::GameStart { total_rounds: 1 },
            ServerMessage::NewRound {
                round: 1,
                total_rounds: 1,
            },
            result_for(0, &players),
            ServerMessage::GameOver {
                players: players.clone(),
                winners: vec![players[0].clone()],
            },
        ]);
        assert_eq!(state.game_status, GameStatus::Finished);
        assert!(!state.is_game_active);
        assert!(state.is_winner("p1"));
        assert!(!state.is_winner("p2"));
        assert!(state.can_restart());
        assert_eq!(state.status_message(), "Game Over!");

        let again = reduce(
            &state,
            &ServerMessage::GameOver {
                players: players.clone(),
                winners: vec![players[1].clone()],
            },
        );
        assert!(matches!(
            again,
            Err(ProtocolFault::OutOfSequence {
                event: "game_over",
                ..
            })
        ));
    }

    #[test]
    fn game_over_without_winners_is_refused() {
        let err = reduce(
            &started(1),
            &ServerMessage::GameOver {
                players: roster(4),
                winners: vec![],
            },
        )
        .unwrap_err();
        assert_eq!(err, ProtocolFault::NoWinners);
    }

    #[test]
    fn fresh_game_start_after_finish_clears_winners() {
        let players = roster(4);
        let state = apply_all(&[
            ServerMessage::RosterUpdate {
                players: players.clone(),
            },
            ServerMessage::GameStart { total_rounds: 1 },
            ServerMessage::GameOver {
                players: players.clone(),
                winners: vec![players[3].clone()],
            },
            ServerMessage::GameStart { total_rounds: 2 },
        ]);
        assert_eq!(state.game_status, GameStatus::Starting);
        assert!(state.winners.is_empty());
        assert_eq!(state.current_round, 1);
        assert_eq!(state.total_rounds, 2);
    }

    #[test]
    fn connection_error_keeps_phase() {
        let state = started(3);
        let next = reduce(&state, &ServerMessage::ConnectionError { message: None }).unwrap();
        assert_eq!(next.state.game_status, GameStatus::Starting);
        assert_eq!(next.state.error.as_deref(), Some(CONNECTION_ERROR_MESSAGE));
    }

    #[test]
    fn start_guard_needs_full_lobby_while_waiting() {
        let mut state = SessionState::default();
        state.players = roster(3);
        assert!(!state.can_start_game());
        state.players = roster(4);
        assert!(state.can_start_game());
        assert!(!started(3).can_start_game());
    }

    #[test]
    fn lookups_follow_roster_order() {
        let state = started(3);
        assert_eq!(state.segment_index("p3"), Some(2));
        assert_eq!(state.player("p4").unwrap().name, "Player 4");
        assert!(state.segment_index("nobody").is_none());
    }

    /// Exhaustively drives every four-event sequence drawn from a small
    /// vocabulary and checks the phase order and cross-field invariants.
    #[test]
    fn phase_only_moves_forward_or_restarts() {
        let players = roster(4);
        let vocabulary = vec![
            ServerMessage::RosterUpdate {
                players: players.clone(),
            },
            ServerMessage::GameStart { total_rounds: 2 },
            ServerMessage::NewRound {
                round: 1,
                total_rounds: 2,
            },
            ServerMessage::NewRound {
                round: 2,
                total_rounds: 2,
            },
            result_for(1, &players),
            ServerMessage::GameOver {
                players: players.clone(),
                winners: vec![players[1].clone()],
            },
            ServerMessage::ConnectionError { message: None },
            ServerMessage::PlayerLeft { name: "x".into() },
        ];
        let n = vocabulary.len();
        for code in 0..n.pow(4) {
            let mut state = SessionState::default();
            let mut c = code;
            for _ in 0..4 {
                let msg = &vocabulary[c % n];
                c /= n;
                let before = state.game_status;
                let before_round = state.current_round;
                if let Ok(next) = reduce(&state, msg) {
                    state = next.state;
                }
                assert!(state.is_consistent(), "inconsistent after {msg:?}: {state:?}");
                let after = state.game_status;
                if after.rank() < before.rank() {
                    assert_eq!(after, GameStatus::Starting);
                    assert!(matches!(msg, ServerMessage::GameStart { .. }));
                } else if after != GameStatus::Starting {
                    assert!(state.current_round >= before_round);
                }
                assert_ne!(
                    (before != GameStatus::Waiting, after),
                    (true, GameStatus::Waiting)
                );
            }
        }
    }

    #[test]
    fn store_publishes_changes_and_absorbs_faults() {
        let mut store = SessionStore::new();
        let mut rx = store.subscribe();
        assert!(!rx.has_changed().unwrap());

        let effect = store.apply(&ServerMessage::RosterUpdate {
            players: roster(4),
        });
        assert_eq!(effect, Some(Effect::RosterReplaced));
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().players.len(), 4);

        let refused = store.apply(&ServerMessage::NewRound {
            round: 1,
            total_rounds: 1,
        });
        assert!(refused.is_none());
        assert!(!rx.has_changed().unwrap());
        assert_eq!(store.state().game_status, GameStatus::Waiting);
    }

    #[test]
    fn finish_spin_clears_flags() {
        let mut store = SessionStore::new();
        store.apply(&ServerMessage::RosterUpdate {
            players: roster(4),
        });
        store.apply(&ServerMessage::GameStart { total_rounds: 1 });
        store.apply(&ServerMessage::NewRound {
            round: 1,
            total_rounds: 1,
        });
        assert!(store.state().players.iter().all(|p| p.is_spinning));
        store.finish_spin();
        assert!(store.state().players.iter().all(|p| !p.is_spinning));
    }

    #[test]
    fn local_player_is_resolved_by_display_name() {
        let mut store = SessionStore::new().with_local_name("Player 3");
        assert!(store.state().local_player_id.is_none());

        store.apply(&ServerMessage::RosterUpdate {
            players: roster(4),
        });
        let state = store.state();
        assert_eq!(state.local_player_id.as_deref(), Some("p3"));
        assert!(state.is_local_player("p3"));
        assert!(!state.is_local_player("p1"));
        assert_eq!(state.local_player().map(|p| p.name.as_str()), Some("Player 3"));
        assert!(!state.is_local_winner());
    }

    #[test]
    fn resolved_local_player_survives_a_namesake_joining() {
        let mut players = roster(2);
        players[1].name = "Test User".into();
        let mut store = SessionStore::new().with_local_name("Test User");
        store.apply(&ServerMessage::RosterUpdate {
            players: players.clone(),
        });
        assert_eq!(store.state().local_player_id.as_deref(), Some("p2"));

        // A second "Test User" joins; the resolved id stays put.
        players.push(Player::new("p3", "Test User"));
        store.apply(&ServerMessage::RosterUpdate { players });
        assert_eq!(store.state().local_player_id.as_deref(), Some("p2"));
    }

    #[test]
    fn ambiguous_name_stays_unresolved_until_a_newcomer_appears() {
        let twins = vec![Player::new("a", "Sam"), Player::new("b", "Sam")];
        let mut store = SessionStore::new().with_local_name("Sam");
        store.apply(&ServerMessage::RosterUpdate {
            players: twins.clone(),
        });
        assert!(store.state().local_player_id.is_none());

        let mut grown = twins;
        grown.push(Player::new("c", "Sam"));
        store.apply(&ServerMessage::RosterUpdate { players: grown });
        assert_eq!(store.state().local_player_id.as_deref(), Some("c"));
    }

    #[test]
    fn local_winner_follows_final_winners() {
        let players = roster(4);
        let mut store = SessionStore::new().with_local_name("Player 1");
        for msg in [
            ServerMessage::RosterUpdate {
                players: players.clone(),
            },
            ServerMessage::GameStart { total_rounds: 1 },
            ServerMessage::NewRound {
                round: 1,
                total_rounds: 1,
            },
            result_for(0, &players),
            ServerMessage::GameOver {
                players: players.clone(),
                winners: vec![players[0].clone()],
            },
        ] {
            assert!(store.apply(&msg).is_some());
        }
        assert!(store.state().is_local_winner());
    }

    #[test]
    fn resumed_state_keeps_the_phase_and_drops_transients() {
        let mut store = SessionStore::new().with_local_name("Player 2");
        store.apply(&ServerMessage::RosterUpdate {
            players: roster(4),
        });
        store.apply(&ServerMessage::GameStart { total_rounds: 3 });
        store.apply(&ServerMessage::NewRound {
            round: 1,
            total_rounds: 3,
        });
        store.set_error(CONNECTION_ERROR_MESSAGE);

        let resumed = store.state().clone().resumed();
        assert_eq!(resumed.game_status, GameStatus::InProgress);
        assert_eq!(resumed.current_round, 1);
        assert_eq!(resumed.local_player_id.as_deref(), Some("p2"));
        assert!(resumed.error.is_none());
        assert!(resumed.players.iter().all(|p| !p.is_spinning));

        let mut store = SessionStore::with_state(resumed);
        assert!(matches!(
            store.apply(&ServerMessage::NewRound {
                round: 2,
                total_rounds: 3,
            }),
            Some(Effect::RoundBegun { round: 2, .. })
        ));
    }

    #[test]
    fn set_error_leaves_phase_alone() {
        let mut store = SessionStore::new();
        store.set_error(START_REJECTED_MESSAGE);
        assert_eq!(store.state().error.as_deref(), Some(START_REJECTED_MESSAGE));
        assert_eq!(store.state().game_status, GameStatus::Waiting);
    }
}
