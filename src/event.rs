//! Events delivered to the presentation layer.
//!
//! The session loop emits a [`GameEvent`] for everything a UI would react
//! to: roster notices, phase changes, spin animation milestones and
//! connection faults. The full state is always available separately through
//! [`SpinWheelClient::state`](crate::client::SpinWheelClient::state); events
//! exist for transient reactions such as toasts, sounds and confetti.

use crate::protocol::Player;
use crate::state::{Effect, Notice};
use crate::wheel::{AbortReason, WheelEvent};

/// High-level events emitted by the client.
#[derive(Debug, Clone, PartialEq)]
pub enum GameEvent {
    /// Synthetic event emitted once the session loop is running.
    Connected,
    /// The roster was replaced.
    RosterUpdated { players: Vec<Player> },
    /// Transient notice: someone joined.
    PlayerJoined { name: String },
    /// Transient notice: someone left.
    PlayerLeft { name: String },
    /// A game started.
    GameStarted { total_rounds: u32 },
    /// A round began; the wheel is armed.
    RoundBegun { round: u32, total_rounds: u32 },
    /// The server declared the round winner. Also emitted, with no spin, when
    /// a round begins whose result had already arrived.
    RoundResolved { round: u32, winner: Player },
    /// Scores changed without a new winner (late or repeated result).
    ScoresUpdated { players: Vec<Player> },
    /// The game finished.
    GameOver { winners: Vec<Player> },
    /// The wheel committed its target and is turning.
    SpinStarted {
        winner_index: usize,
        target_rotation: f64,
    },
    /// The wheel stopped on the declared winner.
    SpinSettled { winner_index: usize },
    /// The spin was abandoned without completing.
    SpinAborted { reason: AbortReason },
    /// The server declined a command.
    CommandRejected { message: String },
    /// The server reported a connection problem.
    ConnectionError { message: String },
    /// The session ended. Always the last event.
    Disconnected { reason: Option<String> },
}

impl GameEvent {
    /// Translate a reducer effect, given the roster it produced.
    ///
    /// Returns `None` for effects that carry nothing worth announcing.
    pub(crate) fn from_effect(effect: Effect, players: &[Player]) -> Option<Self> {
        let event = match effect {
            Effect::RosterReplaced => Self::RosterUpdated {
                players: players.to_vec(),
            },
            Effect::Notice(Notice::PlayerJoined { name }) => Self::PlayerJoined { name },
            Effect::Notice(Notice::PlayerLeft { name }) => Self::PlayerLeft { name },
            Effect::GameStarted { total_rounds } => Self::GameStarted { total_rounds },
            Effect::RoundBegun {
                round,
                total_rounds,
            } => Self::RoundBegun {
                round,
                total_rounds,
            },
            Effect::RoundResolved { round, winner, .. }
            | Effect::RoundResolvedEarly { round, winner, .. } => {
                Self::RoundResolved { round, winner }
            }
            Effect::ScoresUpdated => Self::ScoresUpdated {
                players: players.to_vec(),
            },
            Effect::GameEnded { winners } => Self::GameOver { winners },
            Effect::ConnectionFault { message } => Self::ConnectionError { message },
            Effect::Unchanged => return None,
        };
        Some(event)
    }
}

impl From<WheelEvent> for GameEvent {
    fn from(event: WheelEvent) -> Self {
        match event {
            WheelEvent::SpinStarted {
                winner_index,
                target_rotation,
            } => Self::SpinStarted {
                winner_index,
                target_rotation,
            },
            WheelEvent::Settled { winner_index } => Self::SpinSettled { winner_index },
            WheelEvent::Aborted { reason } => Self::SpinAborted { reason },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_effect_is_silent() {
        assert!(GameEvent::from_effect(Effect::Unchanged, &[]).is_none());
    }

    #[test]
    fn roster_effect_carries_the_new_roster() {
        let players = vec![Player::new("a", "Ada")];
        assert_eq!(
            GameEvent::from_effect(Effect::RosterReplaced, &players),
            Some(GameEvent::RosterUpdated { players })
        );
    }

    #[test]
    fn resolved_round_keeps_winner() {
        let winner = Player::new("b", "Bo").with_score(1);
        let event = GameEvent::from_effect(
            Effect::RoundResolved {
                round: 2,
                winner: winner.clone(),
                winner_index: 1,
            },
            &[],
        );
        assert_eq!(event, Some(GameEvent::RoundResolved { round: 2, winner }));
    }

    #[test]
    fn round_resolved_early_announces_the_winner() {
        let winner = Player::new("c", "Cy").with_score(1);
        let event = GameEvent::from_effect(
            Effect::RoundResolvedEarly {
                round: 1,
                total_rounds: 3,
                winner: winner.clone(),
            },
            &[],
        );
        assert_eq!(event, Some(GameEvent::RoundResolved { round: 1, winner }));
    }

    #[test]
    fn wheel_abort_maps_to_spin_aborted() {
        let event = GameEvent::from(WheelEvent::Aborted {
            reason: AbortReason::Superseded,
        });
        assert_eq!(
            event,
            GameEvent::SpinAborted {
                reason: AbortReason::Superseded
            }
        );
    }
}
