//! Connection boundary.
//!
//! The [`Transport`] trait is the only thing the client knows about the
//! network: a bidirectional channel of complete JSON text frames. Framing,
//! TLS and handshakes belong to the implementation.
//!
//! # Connection Setup
//!
//! Connecting is not part of this trait; the host hands an already-connected
//! transport to [`SpinWheelClient::start`](crate::client::SpinWheelClient::start).
//! Reconnect and backoff policy also live outside the client: when a transport
//! fails the session ends with a `Disconnected` event and the host decides
//! whether to start a new one.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use spin_wheel_client::error::WheelClientError;
//! use spin_wheel_client::transport::Transport;
//! use tokio::sync::mpsc;
//!
//! struct PipeTransport {
//!     outbound: mpsc::UnboundedSender<String>,
//!     inbound: mpsc::UnboundedReceiver<String>,
//! }
//!
//! #[async_trait]
//! impl Transport for PipeTransport {
//!     async fn send(&mut self, message: String) -> Result<(), WheelClientError> {
//!         self.outbound
//!             .send(message)
//!             .map_err(|_| WheelClientError::TransportClosed)
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, WheelClientError>> {
//!         self.inbound.recv().await.map(Ok)
//!     }
//!
//!     async fn close(&mut self) -> Result<(), WheelClientError> {
//!         self.inbound.close();
//!         Ok(())
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::error::WheelClientError;

/// A bidirectional JSON text channel to the game server.
///
/// Each [`send`](Transport::send) carries one complete frame and each
/// [`recv`](Transport::recv) yields one.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is polled inside `tokio::select!` alongside
/// commands and wheel timers, so it **must** be cancel-safe: dropping a
/// pending `recv` future must not lose a frame.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON frame to the server.
    ///
    /// # Errors
    ///
    /// Returns [`WheelClientError::TransportSend`] or
    /// [`WheelClientError::TransportClosed`] if the frame could not be sent.
    async fn send(&mut self, message: String) -> Result<(), WheelClientError>;

    /// Receive the next JSON frame.
    ///
    /// - `Some(Ok(text))`: a frame arrived
    /// - `Some(Err(e))`: the connection failed
    /// - `None`: the server closed the connection cleanly
    async fn recv(&mut self) -> Option<Result<String, WheelClientError>>;

    /// Close the connection. Must release resources even if the close
    /// handshake fails.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful close failed.
    async fn close(&mut self) -> Result<(), WheelClientError>;
}
