//! Concrete [`Transport`](crate::Transport) implementations.
//!
//! | Module      | Transport              | Feature               |
//! |-------------|------------------------|-----------------------|
//! | `channel`   | [`ChannelTransport`]   | always available      |
//! | `websocket` | [`WebSocketTransport`] | `transport-websocket` |
//!
//! # Example
//!
//! ```rust,ignore
//! # async fn example() -> Result<(), spin_wheel_client::WheelClientError> {
//! use spin_wheel_client::{Transport, WebSocketTransport};
//!
//! let mut ws = WebSocketTransport::connect("ws://localhost:3000/game").await?;
//! ws.send(r#"{"type":"restart_game"}"#.to_string()).await?;
//! ws.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;

#[cfg(feature = "transport-websocket")]
pub mod websocket;

pub use channel::{ChannelTransport, ServerEnd};

#[cfg(feature = "transport-websocket")]
pub use websocket::WebSocketTransport;
