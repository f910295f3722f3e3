//! # Spin Wheel Client
//!
//! Transport-agnostic async client for a real-time multiplayer "spin the
//! wheel" game.
//!
//! Up to four players join a shared session; the server runs a fixed number
//! of rounds and picks each round's winner. This crate reconciles the
//! server's event stream into one consistent [`SessionState`] and turns each
//! declared winner into a spin animation that always stops on that winner.
//!
//! ## Features
//!
//! - **Race-tolerant state**: out-of-order, duplicate and stale events are
//!   refused by a pure reducer ([`state::reduce`]) instead of corrupting state
//! - **Verifiable spins**: [`wheel::target_rotation`] parks the winner's
//!   segment under the pointer for any wheel size
//! - **Transport-agnostic**: implement [`Transport`] for any backend;
//!   [`ChannelTransport`] runs in-process, `WebSocketTransport` ships behind
//!   the default `transport-websocket` feature
//! - **Observable**: typed [`GameEvent`]s plus `watch` channels for state and
//!   wheel view
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use spin_wheel_client::{ChannelTransport, ClientConfig, GameEvent, SpinWheelClient, StaticIdentity};
//!
//! # async fn run() -> spin_wheel_client::Result<()> {
//! let (transport, _server) = ChannelTransport::pair();
//! let (mut client, mut events) =
//!     SpinWheelClient::start(transport, &StaticIdentity::development(), ClientConfig::new())?;
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         GameEvent::SpinSettled { winner_index } => println!("segment {winner_index} wins"),
//!         GameEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod event;
pub mod identity;
pub mod protocol;
pub mod state;
pub mod transport;
pub mod transports;
pub mod wheel;

// Re-export primary types for ergonomic imports.
pub use client::{ClientConfig, SpinWheelClient};
pub use error::{FaultKind, Result, WheelClientError};
pub use event::GameEvent;
pub use identity::{Identity, IdentityProvider, InitDataIdentity, StaticIdentity};
pub use protocol::{ClientMessage, Player, ServerMessage};
pub use state::{GameStatus, SessionState};
pub use transport::Transport;
pub use transports::{ChannelTransport, ServerEnd};
pub use wheel::{WheelEngine, WheelEvent, WheelTiming, WheelView};

#[cfg(feature = "transport-websocket")]
pub use transports::WebSocketTransport;
