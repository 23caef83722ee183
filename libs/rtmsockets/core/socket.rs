//! WebSocket transport over tokio-tungstenite

use crate::traits::*;
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::io::ErrorKind;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{http, Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

pub const DEFAULT_ORIGIN: &str = "https://api.slack.com/";
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens real WebSocket connections
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    origin: Option<String>,
    headers: Vec<(String, String)>,
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self {
            origin: Some(DEFAULT_ORIGIN.to_string()),
            headers: Vec::new(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Override the `Origin` sent with the upgrade request
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn without_origin(mut self) -> Self {
        self.origin = None;
        self
    }

    /// Add an extra header to the upgrade request
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<(Box<dyn FrameWriter>, Box<dyn FrameReader>)> {
        let mut request = url
            .into_client_request()
            .map_err(|e| RtmError::SocketFatal(format!("Invalid socket url '{}': {}", url, e)))?;

        let origin = self.origin.iter().map(|origin| ("Origin", origin.as_str()));
        let extra = self.headers.iter().map(|(k, v)| (k.as_str(), v.as_str()));
        for (key, value) in origin.chain(extra) {
            match key.parse::<http::header::HeaderName>() {
                Ok(header_name) => match value.parse::<http::header::HeaderValue>() {
                    Ok(header_value) => {
                        request.headers_mut().insert(header_name, header_value);
                    }
                    Err(_) => {
                        warn!("Invalid header value for key '{}': {}", key, value);
                    }
                },
                Err(_) => {
                    warn!("Invalid header name: {}", key);
                }
            }
        }

        let (ws_stream, _) = tokio::time::timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| RtmError::SocketFatal(format!("Timed out connecting to {}", url)))?
            .map_err(|e| RtmError::SocketFatal(format!("Failed to connect to {}: {}", url, e)))?;

        debug!("Socket open: {}", url);
        let (sink, stream) = ws_stream.split();

        Ok((Box::new(WsWriter { sink }), Box::new(WsReader { stream })))
    }
}

struct WsReader {
    stream: SplitStream<WsStream>,
}

#[async_trait]
impl FrameReader for WsReader {
    async fn read_frame(&mut self) -> FrameResult<String> {
        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Ok(text),
                Some(Ok(Message::Binary(data))) => {
                    return Ok(String::from_utf8_lossy(&data).into_owned());
                }
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame
                        .map(|f| format!("closed by server: {} {}", f.code, f.reason))
                        .unwrap_or_else(|| "closed by server".to_string());
                    return Err(TransportError::fatal(reason));
                }
                // Control frames are answered by tungstenite itself
                Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => continue,
                Some(Err(e)) => return Err(classify_ws_error(&e)),
                None => return Err(TransportError::fatal("stream ended")),
            }
        }
    }
}

struct WsWriter {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameWriter for WsWriter {
    async fn write_frame(&mut self, frame: &str) -> FrameResult<()> {
        self.sink
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(|e| classify_ws_error(&e))
    }

    async fn close(&mut self) {
        if let Err(e) = self.sink.close().await {
            debug!("Error closing socket: {}", e);
        }
    }
}

/// Decide whether a tungstenite error leaves the socket usable
pub fn classify_ws_error(error: &WsError) -> TransportError {
    let message = error.to_string();
    match error {
        WsError::ConnectionClosed | WsError::AlreadyClosed => TransportError::fatal(message),
        WsError::Io(io) => match io.kind() {
            ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionRefused
            | ErrorKind::BrokenPipe
            | ErrorKind::NotConnected
            | ErrorKind::UnexpectedEof
            | ErrorKind::TimedOut
            | ErrorKind::AddrNotAvailable => TransportError::fatal(message),
            _ if is_network_down(&message) => TransportError::fatal(message),
            _ => TransportError::transient(message),
        },
        WsError::Protocol(
            ProtocolError::ResetWithoutClosingHandshake
            | ProtocolError::SendAfterClosing
            | ProtocolError::ReceivedAfterClosing,
        ) => TransportError::fatal(message),
        WsError::Url(_) | WsError::Http(_) | WsError::HttpFormat(_) => {
            TransportError::fatal(message)
        }
        _ => TransportError::transient(message),
    }
}

fn is_network_down(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("network is unreachable") || lower.contains("network is down")
}
