//! Error types for the spin-wheel client.

use thiserror::Error;

/// Errors that can occur when using the spin-wheel client.
#[derive(Debug, Error)]
pub enum WheelClientError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Attempted an operation that requires an active connection, but the client is not connected.
    #[error("not connected to server")]
    NotConnected,

    /// The local start guard refused to issue `start_game`.
    #[error("cannot start the game: {players} of {required} players present while {status}")]
    StartNotAllowed {
        /// Roster size at the time of the attempt.
        players: usize,
        /// Players required before a game may start.
        required: usize,
        /// Game status at the time of the attempt.
        status: crate::state::GameStatus,
    },

    /// `restart_game` was requested before the current game finished.
    #[error("cannot restart the game while {status}")]
    RestartNotAllowed {
        /// Game status at the time of the attempt.
        status: crate::state::GameStatus,
    },

    /// The server declined a command.
    #[error("command rejected: {message}")]
    CommandRejected {
        /// Human-readable reason supplied by the server.
        message: String,
    },

    /// The declared winner does not map onto the wheel's segments.
    #[error("winner index {index} is out of range for {segments} segment(s)")]
    WinnerOutOfRange {
        /// Index the server's winner resolved to.
        index: usize,
        /// Segment count the wheel was laid out with.
        segments: usize,
    },

    /// No usable identity was available from the identity provider.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Broad fault classes used to decide how an error is surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Connect, disconnect, or timeout. Transient and user-visible.
    Transport,
    /// Malformed or out-of-sequence traffic. Dropped with a diagnostic.
    Protocol,
    /// Winner does not fit the wheel layout. Aborts the round's animation.
    AnimationDesync,
    /// The server, or the local guard, declined a command.
    CommandRejection,
    /// Identity could not be acquired.
    Authentication,
}

impl WheelClientError {
    /// Classify this error.
    pub fn kind(&self) -> FaultKind {
        match self {
            Self::TransportSend(_)
            | Self::TransportReceive(_)
            | Self::TransportClosed
            | Self::NotConnected
            | Self::Timeout
            | Self::Io(_) => FaultKind::Transport,
            Self::Serialization(_) => FaultKind::Protocol,
            Self::WinnerOutOfRange { .. } => FaultKind::AnimationDesync,
            Self::StartNotAllowed { .. }
            | Self::RestartNotAllowed { .. }
            | Self::CommandRejected { .. } => FaultKind::CommandRejection,
            Self::Authentication(_) => FaultKind::Authentication,
        }
    }

    /// Returns `true` when the error should be shown to the player as a
    /// transient message rather than only logged.
    pub fn is_user_visible(&self) -> bool {
        matches!(
            self.kind(),
            FaultKind::Transport | FaultKind::CommandRejection | FaultKind::Authentication
        )
    }
}

/// A specialized [`Result`] type for spin-wheel client operations.
pub type Result<T> = std::result::Result<T, WheelClientError>;
