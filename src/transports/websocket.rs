//! WebSocket transport for the game socket, built on `tokio-tungstenite`.
//!
//! One [`WebSocketTransport`] is one connection to one room
//! (`{ws_base}/ws/{room_id}`). `ws://` and `wss://` are both supported; TLS
//! goes through [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), escape_sync_client::SyncError> {
//! use escape_sync_client::{BackendEndpoint, Transport, WebSocketTransport};
//!
//! let endpoint = BackendEndpoint::new("http://localhost:8000");
//! let mut transport = WebSocketTransport::connect_room(&endpoint, "R1").await?;
//! transport.send(r#"{"type":"set_name","name":"Alice"}"#.to_string()).await?;
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::endpoint::BackendEndpoint;
use crate::error::SyncError;
use crate::transport::Transport;

/// The underlying WebSocket stream type.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over one WebSocket connection.
///
/// `recv` is cancel-safe: dropping its future before completion does not
/// consume a frame.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Connect to an explicit WebSocket URL.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Io`] if the URL is invalid or the connection
    /// fails. An underlying I/O error keeps its
    /// [`ErrorKind`](std::io::ErrorKind); anything else maps to `Other`.
    pub async fn connect(url: &str) -> Result<Self, SyncError> {
        tracing::debug!(url = %url, "connecting to game socket");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            SyncError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "game socket connected");

        Ok(Self::from_stream(stream))
    }

    /// Connect to the socket of `room_id` on the given backend.
    ///
    /// # Errors
    ///
    /// Same as [`connect`](Self::connect).
    pub async fn connect_room(endpoint: &BackendEndpoint, room_id: &str) -> Result<Self, SyncError> {
        Self::connect(&endpoint.room_socket_url(room_id)).await
    }

    /// Wrap an already-established stream (custom TLS, headers, proxies).
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }

    /// Like [`connect`](Self::connect), failing with [`SyncError::Timeout`]
    /// if the handshake does not finish within `timeout`.
    ///
    /// # Errors
    ///
    /// [`SyncError::Timeout`] or anything [`connect`](Self::connect) returns.
    pub async fn connect_with_timeout(
        url: &str,
        timeout: std::time::Duration,
    ) -> Result<Self, SyncError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| SyncError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), SyncError> {
        if self.closed {
            return Err(SyncError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| SyncError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, SyncError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => return Some(Err(SyncError::TransportReceive(e.to_string()))),
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "game socket close frame");
                    return None;
                }
                // tungstenite queues the pong itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => {
                    tracing::warn!("unexpected binary frame on game socket, skipping");
                }
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), SyncError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| SyncError::TransportSend(e.to_string()))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    /// Accept one WebSocket connection on a random port and run `handler`
    /// on it. Returns the backend base URL (`http://127.0.0.1:port`) and the
    /// path the client requested.
    async fn start_room_server<F, Fut>(
        handler: F,
    ) -> (String, tokio::sync::oneshot::Receiver<String>)
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (path_tx, path_rx) = tokio::sync::oneshot::channel();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut path_tx = Some(path_tx);
            let ws = tokio_tungstenite::accept_hdr_async(tcp, |req: &Request, resp: Response| {
                if let Some(tx) = path_tx.take() {
                    let _ = tx.send(req.uri().path().to_string());
                }
                Ok(resp)
            })
            .await
            .unwrap();
            handler(ws).await;
        });

        (format!("http://{addr}"), path_rx)
    }

    #[test]
    fn websocket_transport_is_send_and_debug() {
        fn assert_bounds<T: Send + std::fmt::Debug>() {}
        assert_bounds::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Io(_)));
    }

    #[tokio::test]
    async fn connect_room_uses_room_path() {
        let (base, path_rx) = start_room_server(|mut ws| async move {
            ws.close(None).await.unwrap();
        })
        .await;

        let endpoint = BackendEndpoint::new(base);
        let mut transport = WebSocketTransport::connect_room(&endpoint, "R1")
            .await
            .unwrap();
        assert_eq!(path_rx.await.unwrap(), "/ws/R1");
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn recv_preserves_order_and_skips_binary() {
        let (base, _path) = start_room_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"type":"frame"}"#.into()))
                .await
                .unwrap();
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text(r#"{"type":"global_alarm"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let endpoint = BackendEndpoint::new(base);
        let mut transport = WebSocketTransport::connect_room(&endpoint, "R1")
            .await
            .unwrap();

        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"type":"frame"}"#
        );
        assert_eq!(
            transport.recv().await.unwrap().unwrap(),
            r#"{"type":"global_alarm"}"#
        );
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let (base, _path) =
            start_room_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let endpoint = BackendEndpoint::new(base);
        let mut transport = WebSocketTransport::connect_room(&endpoint, "R1")
            .await
            .unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport
            .send(r#"{"type":"get_alarm_state"}"#.to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::TransportClosed));
    }

    #[tokio::test]
    async fn sent_text_reaches_server() {
        let (seen_tx, seen_rx) = tokio::sync::oneshot::channel();
        let (base, _path) = start_room_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                let _ = seen_tx.send(text.to_string());
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let endpoint = BackendEndpoint::new(base);
        let mut transport = WebSocketTransport::connect_room(&endpoint, "R1")
            .await
            .unwrap();
        transport
            .send(r#"{"type":"set_name","name":"Alice"}"#.to_string())
            .await
            .unwrap();

        assert_eq!(
            seen_rx.await.unwrap(),
            r#"{"type":"set_name","name":"Alice"}"#
        );
    }

    #[tokio::test]
    async fn connect_with_timeout_times_out() {
        let err = WebSocketTransport::connect_with_timeout(
            "ws://192.0.2.1:1",
            std::time::Duration::from_millis(50),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SyncError::Timeout));
    }
}
