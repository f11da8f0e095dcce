//! HTTP outbound gateway for the OneBot v11 HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use kestrel_core::{Gateway, GatewayError, GatewayResult, ReplyTarget, Segment, TransportError};

/// Default connect timeout for API calls.
pub const DEFAULT_HTTP_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default total timeout for API calls.
pub const DEFAULT_HTTP_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Builder for [`HttpGateway`].
#[derive(Debug, Clone)]
pub struct HttpGatewayBuilder {
    api_url: String,
    access_token: Option<String>,
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl HttpGatewayBuilder {
    /// Sends `Authorization: Bearer <token>` with every call.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Bounds connection establishment.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Bounds the whole request.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builds the gateway.
    pub fn build(self) -> Result<HttpGateway, TransportError> {
        let client = ClientBuilder::new()
            .connect_timeout(self.connect_timeout)
            .timeout(self.request_timeout)
            .build()
            .map_err(|e| TransportError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpGateway {
            client,
            api_url: self.api_url.trim_end_matches('/').to_string(),
            access_token: self.access_token,
        })
    }
}

/// Sends messages through `send_group_msg` / `send_private_msg`.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    api_url: String,
    access_token: Option<String>,
}

/// The parts of an API response the gateway inspects.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    retcode: i64,
    #[serde(default)]
    message: String,
    #[serde(default)]
    wording: String,
}

impl HttpGateway {
    /// Starts building a gateway for the API rooted at `api_url`.
    pub fn builder(api_url: impl Into<String>) -> HttpGatewayBuilder {
        HttpGatewayBuilder {
            api_url: api_url.into(),
            access_token: None,
            connect_timeout: DEFAULT_HTTP_CONNECT_TIMEOUT,
            request_timeout: DEFAULT_HTTP_REQUEST_TIMEOUT,
        }
    }

    /// The API base URL.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

/// Returns the API action and JSON body that deliver `text` to `target`.
pub fn send_request(target: ReplyTarget, text: &str) -> (&'static str, Value) {
    let message = vec![Segment::text(text)];
    match target {
        ReplyTarget::Group(group_id) => (
            "send_group_msg",
            json!({ "group_id": group_id, "message": message }),
        ),
        ReplyTarget::Private(user_id) => (
            "send_private_msg",
            json!({ "user_id": user_id, "message": message }),
        ),
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn send(&self, target: ReplyTarget, text: &str) -> GatewayResult<()> {
        let (action, body) = send_request(target, text);
        let url = format!("{}/{}", self.api_url, action);

        let mut request = self.client.post(&url).json(&body);
        if let Some(token) = &self.access_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Request(e.to_string())
            }
        })?;

        let status = response.status();
        let text_body = response
            .text()
            .await
            .map_err(|e| GatewayError::Request(e.to_string()))?;

        if !status.is_success() {
            warn!(reply_to = %target, status = status.as_u16(), "Send failed");
            return Err(GatewayError::Status {
                status: status.as_u16(),
                body: text_body,
            });
        }

        if let Ok(api) = serde_json::from_str::<ApiResponse>(&text_body)
            && api.retcode != 0
        {
            warn!(reply_to = %target, retcode = api.retcode, "Send rejected by gateway");
            let message = if api.wording.is_empty() {
                api.message
            } else {
                api.wording
            };
            return Err(GatewayError::Api {
                retcode: api.retcode,
                message,
            });
        }

        debug!(reply_to = %target, "Message sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;
    use tokio_test::{assert_err, assert_ok};

    use super::*;

    /// Serves one HTTP request, returning the raw request text.
    async fn serve_once(status: &'static str, body: &'static str) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                if request_complete(&buf) {
                    break;
                }
            }

            let response = format!(
                "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
        });

        (format!("http://{addr}"), rx)
    }

    fn request_complete(buf: &[u8]) -> bool {
        let text = String::from_utf8_lossy(buf);
        let Some(split) = text.find("\r\n\r\n") else {
            return false;
        };
        let content_length = text[..split]
            .lines()
            .find_map(|line| {
                let (name, value) = line.split_once(':')?;
                name.eq_ignore_ascii_case("content-length")
                    .then(|| value.trim().parse::<usize>().ok())
                    .flatten()
            })
            .unwrap_or(0);
        buf.len() >= split + 4 + content_length
    }

    #[test]
    fn test_send_request_shape() {
        let (action, body) = send_request(ReplyTarget::Group(123), "hello");
        assert_eq!(action, "send_group_msg");
        assert_eq!(
            body,
            json!({"group_id": 123, "message": [{"type": "text", "data": {"text": "hello"}}]})
        );

        let (action, body) = send_request(ReplyTarget::Private(9), "hi");
        assert_eq!(action, "send_private_msg");
        assert_eq!(body["user_id"], 9);
    }

    #[tokio::test]
    async fn test_send_posts_with_bearer_token() {
        let (url, request) = serve_once("200 OK", r#"{"status":"ok","retcode":0}"#).await;
        let gateway = HttpGateway::builder(format!("{url}/"))
            .access_token("secret")
            .build()
            .unwrap();

        assert_ok!(gateway.send(ReplyTarget::Group(1), "io").await);

        let raw = request.await.unwrap();
        assert!(raw.starts_with("POST /send_group_msg "));
        assert!(raw.to_ascii_lowercase().contains("authorization: bearer secret"));
        assert!(raw.contains(r#""text":"io""#));
    }

    #[tokio::test]
    async fn test_nonzero_retcode_is_failure() {
        let (url, _request) =
            serve_once("200 OK", r#"{"status":"failed","retcode":100,"wording":"no such group"}"#)
                .await;
        let gateway = HttpGateway::builder(url).build().unwrap();

        let err = assert_err!(gateway.send(ReplyTarget::Group(1), "io").await);
        assert!(matches!(err, GatewayError::Api { retcode: 100, ref message } if message == "no such group"));
    }

    #[tokio::test]
    async fn test_http_error_status_is_failure() {
        let (url, _request) = serve_once("500 Internal Server Error", "oops").await;
        let gateway = HttpGateway::builder(url).build().unwrap();

        let err = assert_err!(gateway.send(ReplyTarget::Private(1), "io").await);
        assert!(matches!(err, GatewayError::Status { status: 500, .. }));
    }
}
