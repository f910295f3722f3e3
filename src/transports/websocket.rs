//! WebSocket transport over `tokio-tungstenite`.
//!
//! Game servers speak the JSON protocol over a WebSocket; `ws://` and
//! `wss://` are both accepted. Only available with the `transport-websocket`
//! feature, which is on by default.
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), spin_wheel_client::WheelClientError> {
//! use spin_wheel_client::WebSocketTransport;
//!
//! let transport = WebSocketTransport::connect("ws://localhost:3000/game").await?;
//! # drop(transport);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::error::WheelClientError;
use crate::transport::Transport;

/// The underlying stream, public so callers can wrap a stream they built
/// themselves (custom TLS, proxies, extra headers).
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over one WebSocket connection.
///
/// Text frames carry protocol messages. Binary frames are skipped with a
/// warning; ping/pong is answered by tungstenite.
///
/// [`recv`](Transport::recv) is cancel-safe: the underlying stream buffers
/// whole messages, so a dropped `recv` future loses nothing.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to a game server.
    ///
    /// # Errors
    ///
    /// Returns [`WheelClientError::Io`] if the URL is invalid or the server is
    /// unreachable. An underlying I/O error keeps its
    /// [`ErrorKind`](std::io::ErrorKind); anything else maps to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, WheelClientError> {
        debug!(%url, "connecting to game server");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            WheelClientError::Io(std::io::Error::new(kind, e))
        })?;

        info!(%url, "connected to game server");
        Ok(Self::from_stream(stream))
    }

    /// [`connect`](Self::connect), bounded by `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`WheelClientError::Timeout`] if the deadline passes first, or
    /// any error [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: Duration,
    ) -> Result<Self, WheelClientError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| WheelClientError::Timeout)?
    }

    /// Wrap an already-open stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), WheelClientError> {
        if self.closed {
            return Err(WheelClientError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| WheelClientError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, WheelClientError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(WheelClientError::TransportReceive(e.to_string()))),
            };
            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    debug!(?frame, "server sent close frame");
                    return None;
                }
                Message::Binary(_) => warn!("skipping binary frame"),
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), WheelClientError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| WheelClientError::TransportSend(e.to_string()))
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
    use crate::protocol::{ClientMessage, ServerMessage};
    use tokio::net::TcpListener;

    /// Serve exactly one WebSocket connection with `handler`.
    async fn serve_once<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });
        format!("ws://{addr}")
    }

    #[tokio::test]
    async fn invalid_url_is_an_io_error() {
        let err = WebSocketTransport::connect("not-a-url").await.unwrap_err();
        assert!(matches!(err, WheelClientError::Io(_)));
    }

    #[tokio::test]
    async fn unreachable_host_is_an_io_error() {
        let err = WebSocketTransport::connect("ws://127.0.0.1:1")
            .await
            .unwrap_err();
        assert!(matches!(err, WheelClientError::Io(_)));
    }

    #[tokio::test]
    async fn receives_server_messages_and_skips_binary() {
        let url = serve_once(|mut ws| async move {
            ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
            let frame =
                serde_json::to_string(&ServerMessage::PlayerJoined { name: "Ada".into() }).unwrap();
            ws.send(Message::Text(frame.into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        let text = transport.recv().await.unwrap().unwrap();
        let msg: ServerMessage = serde_json::from_str(&text).unwrap();
        assert!(matches!(msg, ServerMessage::PlayerJoined { name } if name == "Ada"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn client_frames_reach_the_server() {
        let (tx, rx) = tokio::sync::oneshot::channel::<String>();
        let url = serve_once(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = tx.send(text.to_string());
            }
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(serde_json::to_string(&ClientMessage::RestartGame).unwrap())
            .await
            .unwrap();
        assert_eq!(rx.await.unwrap(), r#"{"type":"restart_game"}"#);
    }

    #[tokio::test]
    async fn close_is_idempotent_and_blocks_sends() {
        let url =
            serve_once(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} }).await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();
        assert!(matches!(
            transport.send("late".into()).await,
            Err(WheelClientError::TransportClosed)
        ));
    }

    #[tokio::test]
    async fn connect_times_out_on_unroutable_address() {
        let err =
            WebSocketTransport::connect_with_timeout("ws://192.0.2.1:1", Duration::from_millis(50))
                .await
                .unwrap_err();
        assert!(matches!(err, WheelClientError::Timeout));
    }
}
