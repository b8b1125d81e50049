//! WebSocket transport.
//!
//! One background task owns the socket. It reconnects on its own after a
//! lost connection, with a fixed delay and a bounded number of consecutive
//! failed attempts, and reports everything it sees as [`TransportEvent`]s.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, error, info, warn};
use url::Url;

use switchboard_core::{HistoryQuery, OutboundMessage, Transport, TransportError, TransportEvent};

use crate::protocol::{ClientFrame, ServerFrame};

/// Default number of consecutive failed connection attempts before giving up.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 5;

/// Default pause between connection attempts.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

const TENANT_HEADER: &str = "X-Tenant-Id";
const API_KEY_HEADER: &str = "X-Api-Key";
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// How the client authenticates the upgrade request.
#[derive(Clone, PartialEq, Eq, Default)]
pub enum Credential {
    #[default]
    None,
    ApiKey(String),
    Bearer(String),
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::ApiKey(_) => write!(f, "ApiKey(***)"),
            Self::Bearer(_) => write!(f, "Bearer(***)"),
        }
    }
}

/// Connection parameters for [`WsTransport`].
#[derive(Debug, Clone)]
pub struct WsSettings {
    /// Server URL (HTTP or WS; converted to the `/ws` endpoint).
    pub server_url: String,
    pub tenant_id: Option<String>,
    pub credential: Credential,
    pub reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl WsSettings {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            tenant_id: None,
            credential: Credential::None,
            reconnect_attempts: DEFAULT_RECONNECT_ATTEMPTS,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = credential;
        self
    }

    /// Set the reconnect bound. At least one attempt is always made.
    pub fn with_reconnect(mut self, attempts: u32, delay: Duration) -> Self {
        self.reconnect_attempts = attempts.max(1);
        self.reconnect_delay = delay;
        self
    }
}

enum Outgoing {
    Frame(ClientFrame),
    Close,
}

struct Link {
    tx: mpsc::UnboundedSender<Outgoing>,
    task: JoinHandle<()>,
}

/// [`Transport`] over a single WebSocket.
pub struct WsTransport {
    settings: WsSettings,
    events: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
    link: Option<Link>,
}

impl WsTransport {
    /// Create a transport. Events arrive on the returned receiver.
    pub fn new(settings: WsSettings) -> (Self, mpsc::UnboundedReceiver<TransportEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Self {
            settings,
            events,
            connected: Arc::new(AtomicBool::new(false)),
            link: None,
        };
        (transport, rx)
    }

    pub fn settings(&self) -> &WsSettings {
        &self.settings
    }

    fn send_frame(&self, frame: ClientFrame) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let link = self.link.as_ref().ok_or(TransportError::NotConnected)?;
        link.tx
            .send(Outgoing::Frame(frame))
            .map_err(|_| TransportError::Closed)
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if let Some(link) = &self.link
            && !link.task.is_finished()
        {
            return Ok(());
        }

        let ws_url = http_to_ws_url(&self.settings.server_url)?;
        // Fail fast on bad headers instead of inside the loop.
        build_request(&ws_url, &self.settings)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(connection_loop(
            ws_url,
            self.settings.clone(),
            rx,
            self.events.clone(),
            self.connected.clone(),
        ));
        self.link = Some(Link { tx, task });
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(link) = self.link.take() {
            let _ = link.tx.send(Outgoing::Close);
            let mut task = link.task;
            if tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await.is_err() {
                debug!("Connection task did not close in time, aborting");
                task.abort();
            }
        }
        self.connected.store(false, Ordering::SeqCst);
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe_to_agent(
        &mut self,
        channel_id: &str,
        participant_id: &str,
    ) -> Result<(), TransportError> {
        self.send_frame(ClientFrame::Subscribe {
            workflow: channel_id.to_string(),
            participant_id: participant_id.to_string(),
        })
    }

    async fn unsubscribe_from_agent(
        &mut self,
        channel_id: &str,
        participant_id: &str,
    ) -> Result<(), TransportError> {
        self.send_frame(ClientFrame::Unsubscribe {
            workflow: channel_id.to_string(),
            participant_id: participant_id.to_string(),
        })
    }

    async fn send_inbound_message(
        &mut self,
        message: OutboundMessage,
    ) -> Result<(), TransportError> {
        self.send_frame(ClientFrame::Send { message })
    }

    async fn get_thread_history(&mut self, query: HistoryQuery) -> Result<(), TransportError> {
        self.send_frame(ClientFrame::from(query))
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            link.task.abort();
        }
    }
}

/// Why a live connection ended.
enum Closed {
    /// The client asked for it; do not reconnect.
    Requested,
    /// Lost; reconnect.
    Lost(String),
}

/// Connect, serve, and reconnect until closed or out of attempts.
async fn connection_loop(
    ws_url: String,
    settings: WsSettings,
    mut rx: mpsc::UnboundedReceiver<Outgoing>,
    events: mpsc::UnboundedSender<TransportEvent>,
    connected: Arc<AtomicBool>,
) {
    let max_attempts = settings.reconnect_attempts.max(1);
    let mut failures = 0u32;

    loop {
        let request = match build_request(&ws_url, &settings) {
            Ok(request) => request,
            Err(e) => {
                error!(error = %e, "Cannot build connection request");
                let _ = events.send(TransportEvent::Disconnected {
                    reason: e.to_string(),
                });
                return;
            }
        };

        info!(url = %ws_url, "Connecting to server");
        match connect_async(request).await {
            Ok((stream, _)) => {
                failures = 0;
                connected.store(true, Ordering::SeqCst);
                info!("Connected to server");
                let _ = events.send(TransportEvent::Connected);

                let closed = handle_connection(stream, &mut rx, &events).await;
                connected.store(false, Ordering::SeqCst);
                match closed {
                    Closed::Requested => {
                        debug!("Connection closed by client");
                        return;
                    }
                    Closed::Lost(reason) => {
                        warn!(reason = %reason, "Connection lost, will reconnect");
                        let _ = events.send(TransportEvent::Disconnected { reason });
                    }
                }
            }
            Err(e) => {
                failures += 1;
                let status_code = match &e {
                    WsError::Http(response) => Some(response.status().as_u16()),
                    _ => None,
                };
                warn!(attempt = failures, ?status_code, error = %e, "Connection attempt failed");
                let _ = events.send(TransportEvent::ConnectionError {
                    status_code,
                    message: e.to_string(),
                });
                if failures >= max_attempts {
                    let _ = events.send(TransportEvent::Disconnected {
                        reason: format!("gave up after {failures} attempt(s)"),
                    });
                    return;
                }
            }
        }

        debug!(delay = ?settings.reconnect_delay, "Reconnecting after delay");
        if !wait_unless_closed(&mut rx, settings.reconnect_delay).await {
            return;
        }
    }
}

/// Sleep for `delay`. Returns false if the client closed the link meanwhile.
async fn wait_unless_closed(rx: &mut mpsc::UnboundedReceiver<Outgoing>, delay: Duration) -> bool {
    let sleep = tokio::time::sleep(delay);
    tokio::pin!(sleep);
    loop {
        tokio::select! {
            _ = &mut sleep => return true,
            outgoing = rx.recv() => match outgoing {
                Some(Outgoing::Frame(_)) => debug!("Dropping frame while reconnecting"),
                Some(Outgoing::Close) | None => return false,
            },
        }
    }
}

/// Serve one live connection.
async fn handle_connection(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    rx: &mut mpsc::UnboundedReceiver<Outgoing>,
    events: &mpsc::UnboundedSender<TransportEvent>,
) -> Closed {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();

    loop {
        tokio::select! {
            outgoing = rx.recv() => match outgoing {
                Some(Outgoing::Frame(frame)) => {
                    let json = match serde_json::to_string(&frame) {
                        Ok(json) => json,
                        Err(e) => {
                            error!(error = %e, "Failed to serialize frame");
                            continue;
                        }
                    };
                    if let Err(e) = ws_sink.send(WsMessage::Text(json.into())).await {
                        return Closed::Lost(e.to_string());
                    }
                }
                Some(Outgoing::Close) | None => {
                    let _ = ws_sink.send(WsMessage::Close(None)).await;
                    return Closed::Requested;
                }
            },

            incoming = ws_stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ServerFrame>(&text) {
                        Ok(frame) => {
                            if let Some(event) = frame.into_event()
                                && events.send(event).is_err()
                            {
                                // Nobody is listening any more.
                                return Closed::Requested;
                            }
                        }
                        Err(e) => warn!(error = %e, "Failed to parse server frame"),
                    }
                }
                Some(Ok(WsMessage::Ping(data))) => {
                    let _ = ws_sink.send(WsMessage::Pong(data)).await;
                }
                Some(Ok(WsMessage::Close(_))) => {
                    return Closed::Lost("server closed connection".to_string());
                }
                Some(Ok(WsMessage::Binary(_))) => warn!("Unexpected binary frame"),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Closed::Lost(e.to_string()),
                None => return Closed::Lost("stream ended".to_string()),
            },
        }
    }
}

/// Upgrade request carrying tenant and credential headers.
fn build_request(ws_url: &str, settings: &WsSettings) -> Result<Request, TransportError> {
    let mut request = ws_url
        .into_client_request()
        .map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
    let headers = request.headers_mut();

    if let Some(tenant) = &settings.tenant_id {
        headers.insert(TENANT_HEADER, header_value(tenant)?);
    }
    match &settings.credential {
        Credential::None => {}
        Credential::ApiKey(key) => {
            headers.insert(API_KEY_HEADER, header_value(key)?);
        }
        Credential::Bearer(token) => {
            headers.insert(AUTHORIZATION, header_value(&format!("Bearer {token}"))?);
        }
    }
    Ok(request)
}

fn header_value(value: &str) -> Result<HeaderValue, TransportError> {
    HeaderValue::from_str(value)
        .map_err(|_| TransportError::Other("header value contains invalid characters".into()))
}

/// Convert an HTTP URL to a WebSocket URL with /ws path.
pub fn http_to_ws_url(http_url: &str) -> Result<String, TransportError> {
    let mut url =
        Url::parse(http_url).map_err(|e| TransportError::InvalidUrl(format!("{http_url}: {e}")))?;

    let new_scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported URL scheme: {other}"
            )));
        }
    };

    url.set_scheme(new_scheme)
        .map_err(|_| TransportError::InvalidUrl("failed to set scheme".into()))?;
    url.set_path("/ws");

    Ok(url.to_string())
}
