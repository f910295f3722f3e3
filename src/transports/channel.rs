//! In-process transport backed by tokio channels.
//!
//! [`ChannelTransport::pair`] returns the client half plus a [`ServerEnd`]
//! that plays the game server: it pushes [`ServerMessage`]s and reads the
//! client's [`ClientMessage`]s. Used by the loopback demo and by tests that
//! want a live peer instead of a scripted one.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{Result, WheelClientError};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::transport::Transport;

/// Client half of an in-process connection.
#[derive(Debug)]
pub struct ChannelTransport {
    outbound: mpsc::UnboundedSender<String>,
    inbound: mpsc::UnboundedReceiver<Result<String>>,
    closed: bool,
}

/// Server half of an in-process connection.
#[derive(Debug)]
pub struct ServerEnd {
    to_client: mpsc::UnboundedSender<Result<String>>,
    from_client: mpsc::UnboundedReceiver<String>,
}

impl ChannelTransport {
    /// Create a connected client/server pair.
    pub fn pair() -> (Self, ServerEnd) {
        let (outbound, from_client) = mpsc::unbounded_channel();
        let (to_client, inbound) = mpsc::unbounded_channel();
        (
            Self {
                outbound,
                inbound,
                closed: false,
            },
            ServerEnd {
                to_client,
                from_client,
            },
        )
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&mut self, message: String) -> Result<()> {
        if self.closed {
            return Err(WheelClientError::TransportClosed);
        }
        self.outbound
            .send(message)
            .map_err(|_| WheelClientError::TransportSend("server end dropped".into()))
    }

    async fn recv(&mut self) -> Option<Result<String>> {
        self.inbound.recv().await
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            debug!("closing channel transport");
            self.closed = true;
            self.inbound.close();
        }
        Ok(())
    }
}

impl ServerEnd {
    /// Push a server message to the client.
    ///
    /// # Errors
    ///
    /// Returns [`WheelClientError::TransportClosed`] if the client half is
    /// gone, or a serialization error.
    pub fn send(&self, msg: &ServerMessage) -> Result<()> {
        self.send_raw(serde_json::to_string(msg)?)
    }

    /// Push a raw frame, well-formed or not.
    ///
    /// # Errors
    ///
    /// Returns [`WheelClientError::TransportClosed`] if the client half is gone.
    pub fn send_raw(&self, frame: impl Into<String>) -> Result<()> {
        self.to_client
            .send(Ok(frame.into()))
            .map_err(|_| WheelClientError::TransportClosed)
    }

    /// Make the client's next `recv` fail with `error`.
    ///
    /// # Errors
    ///
    /// Returns [`WheelClientError::TransportClosed`] if the client half is gone.
    pub fn fail(&self, error: WheelClientError) -> Result<()> {
        self.to_client
            .send(Err(error))
            .map_err(|_| WheelClientError::TransportClosed)
    }

    /// Next command from the client, decoded.
    ///
    /// Returns `None` once the client half is dropped.
    pub async fn recv(&mut self) -> Option<Result<ClientMessage>> {
        let frame = self.from_client.recv().await?;
        Some(serde_json::from_str(&frame).map_err(WheelClientError::from))
    }

    /// Next raw frame from the client.
    pub async fn recv_raw(&mut self) -> Option<String> {
        self.from_client.recv().await
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

    #[tokio::test]
    async fn frames_flow_both_ways() {
        let (mut client, mut server) = ChannelTransport::pair();

        client
            .send(serde_json::to_string(&ClientMessage::RestartGame).unwrap())
            .await
            .unwrap();
        assert!(matches!(
            server.recv().await,
            Some(Ok(ClientMessage::RestartGame))
        ));

        server
            .send(&ServerMessage::PlayerJoined { name: "Ada".into() })
            .unwrap();
        let frame = client.recv().await.unwrap().unwrap();
        assert!(frame.contains("player_joined"));
    }

    #[tokio::test]
    async fn dropping_server_end_closes_client() {
        let (mut client, server) = ChannelTransport::pair();
        drop(server);
        assert!(client.recv().await.is_none());
        assert!(matches!(
            client.send("x".into()).await,
            Err(WheelClientError::TransportSend(_))
        ));
    }

    #[tokio::test]
    async fn injected_failure_reaches_client() {
        let (mut client, server) = ChannelTransport::pair();
        server
            .fail(WheelClientError::TransportReceive("reset".into()))
            .unwrap();
        assert!(matches!(
            client.recv().await,
            Some(Err(WheelClientError::TransportReceive(_)))
        ));
    }

    #[tokio::test]
    async fn send_after_close_is_refused() {
        let (mut client, _server) = ChannelTransport::pair();
        client.close().await.unwrap();
        client.close().await.unwrap();
        assert!(matches!(
            client.send("x".into()).await,
            Err(WheelClientError::TransportClosed)
        ));
    }
}
