//! WebSocket client for connecting to a ComfyUI instance.
//!
//! [`ComfyUIClient`] holds the WebSocket base URL of one ComfyUI server.
//! Call [`ComfyUIClient::connect`] to open a live [`ComfyUIConnection`]
//! registered under a given client id.

use reqwest::Url;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Raw WebSocket stream type returned by [`connect_async`].
pub type ComfyUIStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Connection configuration for a ComfyUI instance.
#[derive(Debug, Clone)]
pub struct ComfyUIClient {
    ws_url: String,
}

/// A live WebSocket connection to a ComfyUI instance.
#[derive(Debug)]
pub struct ComfyUIConnection {
    /// Client id sent during the handshake; ComfyUI addresses
    /// prompt-specific events to it.
    pub client_id: String,
    /// The raw WebSocket stream for reading frames.
    pub ws_stream: ComfyUIStream,
}

/// Derive the WebSocket base URL from the HTTP API URL
/// (`http` -> `ws`, `https` -> `wss`).
pub fn ws_url_from_api_url(api_url: &str) -> String {
    let trimmed = api_url.trim_end_matches('/');
    if let Some(rest) = trimmed.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = trimmed.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        trimmed.to_string()
    }
}

impl ComfyUIClient {
    /// * `ws_url` - WebSocket base URL, e.g. `ws://host:8188`.
    pub fn new(ws_url: impl Into<String>) -> Self {
        Self {
            ws_url: ws_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Build a client for the server behind an HTTP API URL.
    pub fn from_api_url(api_url: &str) -> Self {
        Self::new(ws_url_from_api_url(api_url))
    }

    /// Full endpoint URL for a given client id, with the id
    /// percent-encoded.
    pub fn endpoint(&self, client_id: &str) -> Result<String, ComfyUIClientError> {
        let url = Url::parse_with_params(&format!("{}/ws", self.ws_url), [("clientId", client_id)])
            .map_err(|e| {
                ComfyUIClientError::Connection(format!("Invalid ComfyUI URL {}: {e}", self.ws_url))
            })?;
        Ok(url.to_string())
    }

    /// Connect to the ComfyUI WebSocket endpoint as `client_id`.
    pub async fn connect(&self, client_id: &str) -> Result<ComfyUIConnection, ComfyUIClientError> {
        let url = self.endpoint(client_id)?;

        let (ws_stream, _response) = connect_async(&url).await.map_err(|e| {
            ComfyUIClientError::Connection(format!(
                "Failed to connect to ComfyUI at {}: {e}",
                self.ws_url
            ))
        })?;

        tracing::debug!(client_id, "Connected to ComfyUI at {}", self.ws_url);

        Ok(ComfyUIConnection {
            client_id: client_id.to_string(),
            ws_stream,
        })
    }
}

/// Errors that can occur when opening the WebSocket.
#[derive(Debug, thiserror::Error)]
pub enum ComfyUIClientError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Connecting was abandoned because the caller cancelled.
    #[error("Connection attempt cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_becomes_ws() {
        assert_eq!(ws_url_from_api_url("http://localhost:8188"), "ws://localhost:8188");
    }

    #[test]
    fn https_becomes_wss() {
        assert_eq!(
            ws_url_from_api_url("https://comfy.example.com/"),
            "wss://comfy.example.com"
        );
    }

    #[test]
    fn endpoint_carries_client_id() {
        let client = ComfyUIClient::from_api_url("http://127.0.0.1:8188");
        assert_eq!(
            client.endpoint("comfyui-1").unwrap(),
            "ws://127.0.0.1:8188/ws?clientId=comfyui-1"
        );
    }

    #[test]
    fn endpoint_encodes_reserved_characters() {
        let client = ComfyUIClient::from_api_url("http://127.0.0.1:8188");
        assert_eq!(
            client.endpoint("my gate&x=1#frag").unwrap(),
            "ws://127.0.0.1:8188/ws?clientId=my+gate%26x%3D1%23frag"
        );
    }

    #[test]
    fn unparseable_base_url_is_a_connection_error() {
        let client = ComfyUIClient::new("not a url");
        assert!(matches!(
            client.endpoint("comfyui-1"),
            Err(ComfyUIClientError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        // Port 9 (discard) is not expected to run a WebSocket server.
        let client = ComfyUIClient::new("ws://127.0.0.1:9");
        assert!(client.connect("test").await.is_err());
    }
}
