//! WebSocket connector for the OneBot forward WebSocket endpoint.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, trace, warn};

use kestrel_core::{Connector, FrameStream, TransportError, TransportResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default handshake timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens WebSocket connections to the gateway's event endpoint.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    access_token: Option<String>,
    connect_timeout: Duration,
}

impl WsConnector {
    /// Creates a connector for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            access_token: None,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Sends `Authorization: Bearer <token>` during the handshake.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Bounds the handshake duration.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    fn request(&self) -> TransportResult<Request> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| TransportError::InvalidConfig(format!("invalid WebSocket URL: {e}")))?;

        if let Some(token) = &self.access_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| TransportError::InvalidConfig(format!("invalid access token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        Ok(request)
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> TransportResult<Box<dyn FrameStream>> {
        let request = self.request()?;

        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| TransportError::Timeout(self.connect_timeout))?
            .map_err(|e| TransportError::ConnectionFailed {
                url: self.url.clone(),
                reason: e.to_string(),
            })?;

        Ok(Box::new(WsFrameStream { inner: stream }))
    }

    fn endpoint(&self) -> String {
        self.url.clone()
    }
}

/// An open WebSocket connection yielding text frames.
struct WsFrameStream {
    inner: WsStream,
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn next_frame(&mut self) -> Option<TransportResult<String>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => {
                    trace!(len = text.len(), "Received text");
                    return Some(Ok(text.to_string()));
                }
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => warn!(len = data.len(), "Dropping non-UTF-8 binary frame"),
                },
                Ok(Message::Ping(data)) => {
                    trace!("Received ping, sending pong");
                    if let Err(e) = self.inner.send(Message::Pong(data)).await {
                        return Some(Err(TransportError::ReceiveFailed(e.to_string())));
                    }
                }
                Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    debug!(frame = ?frame, "Server closed connection");
                    return None;
                }
                Err(e) => return Some(Err(TransportError::ReceiveFailed(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close(None).await {
            debug!(error = %e, "Error while closing WebSocket");
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_tungstenite::accept_hdr_async;
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

    use super::*;

    #[tokio::test]
    async fn test_connect_receives_frames_and_sends_token() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (auth_tx, auth_rx) = oneshot::channel();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let callback = |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                let auth = req
                    .headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(String::from);
                let _ = auth_tx.send(auth);
                Ok(resp)
            };
            let mut ws = accept_hdr_async(tcp, callback).await.unwrap();
            ws.send(Message::text(r#"{"post_type":"meta_event"}"#))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        });

        let connector = WsConnector::new(format!("ws://{addr}")).access_token("secret");
        let mut stream = connector.connect().await.unwrap();

        let frame = stream.next_frame().await.unwrap().unwrap();
        assert_eq!(frame, r#"{"post_type":"meta_event"}"#);
        assert!(stream.next_frame().await.is_none());
        assert_eq!(auth_rx.await.unwrap().as_deref(), Some("Bearer secret"));

        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_refused_connection_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = WsConnector::new(format!("ws://{addr}")).connect().await;
        assert!(matches!(result, Err(TransportError::ConnectionFailed { .. })));
    }

    #[tokio::test]
    async fn test_invalid_url_rejected() {
        let result = WsConnector::new("not a url").connect().await;
        assert!(matches!(result, Err(TransportError::InvalidConfig(_))));
    }
}
