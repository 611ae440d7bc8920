//! CDP client for communicating with the browser
//!
//! Holds one WebSocket connection to the browser endpoint. A background task
//! reads frames, completes pending commands by id and forwards events to the
//! receiver handed out by [`CdpClient::take_event_receiver`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::common::config::{BrowserConfig, Config};
use crate::common::{Error, Result};

use super::codec;
use super::transport::{CdpTransport, CommandTarget, TransportEvent};
use super::types::{IncomingMessage, ResponseMessage, VersionInfo};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<ResponseMessage>>>>;

/// CDP client connected to a browser endpoint
pub struct CdpClient {
    /// Write half of the WebSocket
    sink: Mutex<SplitSink<WsStream, Message>>,
    /// Commands waiting for their response
    pending: PendingMap,
    /// Command id counter
    seq: AtomicU64,
    /// Per-command timeout
    request_timeout: Duration,
    /// Receiver for events (given to the daemon)
    event_rx: Option<mpsc::UnboundedReceiver<TransportEvent>>,
    /// Background frame reader
    reader: JoinHandle<()>,
}

impl CdpClient {
    /// Connect to the browser described by the configuration
    pub async fn connect(config: &Config) -> Result<Self> {
        let connect_timeout = Duration::from_secs(config.timeouts.connect_secs);
        let url = resolve_ws_url(&config.browser, connect_timeout).await?;

        tracing::info!(url = %url, "Connecting to browser");

        let (ws, _response) = tokio::time::timeout(
            connect_timeout,
            tokio_tungstenite::connect_async(url.as_str()),
        )
        .await
        .map_err(|_| Error::BrowserConnect {
            endpoint: url.clone(),
            reason: format!("timed out after {}s", connect_timeout.as_secs()),
        })?
        .map_err(|e| Error::BrowserConnect {
            endpoint: url.clone(),
            reason: e.to_string(),
        })?;

        let (sink, stream) = ws.split();
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let reader = tokio::spawn(read_loop(stream, pending.clone(), event_tx));

        Ok(Self {
            sink: Mutex::new(sink),
            pending,
            seq: AtomicU64::new(1),
            request_timeout: Duration::from_secs(config.timeouts.cdp_request_secs),
            event_rx: Some(event_rx),
            reader,
        })
    }

    /// Take the event receiver (can only be called once)
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<TransportEvent>> {
        self.event_rx.take()
    }

    fn next_seq(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst)
    }
}

#[async_trait]
impl CdpTransport for CdpClient {
    async fn send_command(
        &self,
        target: CommandTarget,
        method: &str,
        params: Value,
    ) -> Result<Value> {
        let id = self.next_seq();
        let json = codec::encode_command(id, method, &params, target.session_id())?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        tracing::trace!("CDP >>> {}", json);

        let sent = self.sink.lock().await.send(Message::text(json)).await;
        if let Err(e) = sent {
            self.pending.lock().await.remove(&id);
            return Err(Error::Transport(format!("Failed to send {}: {}", method, e)));
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(response)) => response.into_result(method),
            // Sender dropped: the reader task exited
            Ok(Err(_)) => Err(Error::BrowserDisconnected),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Timeout(self.request_timeout.as_secs()))
            }
        }
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Read frames until the connection closes
async fn read_loop(
    mut stream: SplitStream<WsStream>,
    pending: PendingMap,
    event_tx: mpsc::UnboundedSender<TransportEvent>,
) {
    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(frame)) => {
                tracing::info!(?frame, "Browser closed the connection");
                break;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "WebSocket read failed");
                break;
            }
        };

        tracing::trace!("CDP <<< {}", &*text);

        match codec::decode_message(&text) {
            Ok(IncomingMessage::Response(response)) => {
                match pending.lock().await.remove(&response.id) {
                    Some(tx) => {
                        let _ = tx.send(response);
                    }
                    None => tracing::debug!(id = response.id, "Response for unknown command id"),
                }
            }
            Ok(IncomingMessage::Event(event)) => {
                if event_tx.send(TransportEvent::Event(event)).is_err() {
                    tracing::debug!("Event receiver dropped; stopping reader");
                    break;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable CDP frame");
            }
        }
    }

    // Fail everything still waiting
    pending.lock().await.clear();
    let _ = event_tx.send(TransportEvent::Closed);
}

/// Find the browser WebSocket URL
///
/// Uses the configured URL when present, otherwise asks the HTTP endpoint.
pub async fn resolve_ws_url(browser: &BrowserConfig, timeout: Duration) -> Result<String> {
    if let Some(url) = &browser.ws_url {
        return Ok(url.clone());
    }

    let endpoint = browser.http_endpoint();
    let connect_error = |reason: String| Error::BrowserConnect {
        endpoint: endpoint.clone(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| connect_error(e.to_string()))?;

    let version: VersionInfo = client
        .get(format!("{}/json/version", endpoint))
        .send()
        .await
        .map_err(|e| connect_error(e.to_string()))?
        .error_for_status()
        .map_err(|e| connect_error(e.to_string()))?
        .json()
        .await
        .map_err(|e| connect_error(format!("unexpected /json/version payload: {}", e)))?;

    tracing::debug!(browser = %version.browser, "Discovered browser endpoint");
    Ok(version.web_socket_debugger_url)
}
