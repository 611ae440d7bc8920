//! Daemon server - IPC listener and the core event loop
//!
//! The loop is the single owner of the [`Interceptor`]. Commands from
//! connections, browser events and channel-closed notifications are handled
//! one at a time, in arrival order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use interprocess::local_socket::traits::tokio::Listener as ListenerTrait;
use tokio::sync::mpsc;

use crate::cdp::{CdpClient, TransportEvent};
use crate::common::{config::Config, paths, Error, Result};
use crate::intercept::{ChannelId, Interceptor};
use crate::ipc::protocol::{Command, Response};
use crate::ipc::transport;

use super::connection::{self, Inbound};
use super::handler;

/// How often the loop wakes up to check the idle timeout
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Why the loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Exit {
    Signal,
    ShutdownRequested,
    IdleTimeout,
    BrowserGone,
}

/// Main daemon server
pub struct Daemon {
    config: Config,
    interceptor: Interceptor,
    browser_events: mpsc::UnboundedReceiver<TransportEvent>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: mpsc::UnboundedReceiver<Inbound>,
    next_channel: u64,
    /// Last activity timestamp for idle timeout
    last_activity: Instant,
}

impl Daemon {
    /// Load configuration and connect to the browser
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;

        let mut client = CdpClient::connect(&config).await?;
        let browser_events = client
            .take_event_receiver()
            .ok_or_else(|| Error::Internal("CDP event receiver already taken".to_string()))?;

        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            interceptor: Interceptor::new(Arc::new(client)),
            browser_events,
            inbound_tx,
            inbound_rx,
            next_channel: 1,
            last_activity: Instant::now(),
        })
    }

    /// Run the daemon main loop
    pub async fn run(&mut self) -> Result<()> {
        let listener = transport::create_listener().await?;
        tracing::info!("Daemon listening on {}", paths::socket_name());

        let exit = self.run_loop(&listener).await;

        match exit {
            Ok(Exit::BrowserGone) => tracing::warn!("Browser connection lost; exiting"),
            Ok(reason) => tracing::info!(?reason, "Daemon stopping"),
            Err(ref e) => tracing::error!(error = %e, "Daemon loop failed"),
        }

        tracing::info!("Cleaning up daemon resources");
        self.interceptor.shutdown().await;

        paths::remove_socket()?;
        tracing::info!("Daemon shutdown complete");

        exit.map(|_| ())
    }

    async fn run_loop(&mut self, listener: &transport::Listener) -> Result<Exit> {
        let idle_timeout = Duration::from_secs(self.config.daemon.idle_timeout_minutes * 60);
        let mut ticker = tokio::time::interval(IDLE_CHECK_INTERVAL);
        let mut signals = Signals::new()?;

        loop {
            tokio::select! {
                name = signals.recv() => {
                    tracing::info!("Received {}, shutting down gracefully", name);
                    return Ok(Exit::Signal);
                }
                accepted = listener.accept() => {
                    match accepted {
                        Ok(stream) => {
                            self.last_activity = Instant::now();
                            let id = ChannelId(self.next_channel);
                            self.next_channel += 1;
                            connection::spawn(stream, id, self.inbound_tx.clone());
                        }
                        Err(e) => tracing::error!("Accept error: {}", e),
                    }
                }
                Some(inbound) = self.inbound_rx.recv() => {
                    self.last_activity = Instant::now();
                    if self.handle_inbound(inbound).await {
                        return Ok(Exit::ShutdownRequested);
                    }
                }
                event = self.browser_events.recv() => {
                    let event = event.unwrap_or(TransportEvent::Closed);
                    let closed = matches!(event, TransportEvent::Closed);
                    self.interceptor.handle_transport_event(event).await;
                    if closed {
                        return Ok(Exit::BrowserGone);
                    }
                }
                _ = ticker.tick() => {
                    if self.interceptor.registry().is_empty()
                        && self.last_activity.elapsed() > idle_timeout
                    {
                        tracing::info!("Idle timeout reached, shutting down daemon");
                        return Ok(Exit::IdleTimeout);
                    }
                }
            }
        }
    }

    /// Process one inbound item; returns true when shutdown was requested
    async fn handle_inbound(&mut self, inbound: Inbound) -> bool {
        match inbound {
            Inbound::Command { channel, request } => {
                if matches!(request.command, Command::Shutdown) {
                    let _ = channel.respond(Response::ok(request.id));
                    return true;
                }

                let response =
                    handler::handle_command(&mut self.interceptor, &channel, request.id, request.command)
                        .await;
                if let Err(e) = channel.respond(response) {
                    tracing::debug!(error = %e, "Response not delivered");
                }
                false
            }
            Inbound::ChannelClosed(id) => {
                self.interceptor.channel_closed(id).await;
                false
            }
        }
    }
}

/// Termination signals the daemon reacts to
#[cfg(unix)]
struct Signals {
    sigterm: tokio::signal::unix::Signal,
    sigint: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl Signals {
    fn new() -> Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            sigterm: signal(SignalKind::terminate())?,
            sigint: signal(SignalKind::interrupt())?,
        })
    }

    async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.sigterm.recv() => "SIGTERM",
            _ = self.sigint.recv() => "SIGINT",
        }
    }
}

#[cfg(not(unix))]
struct Signals;

#[cfg(not(unix))]
impl Signals {
    fn new() -> Result<Self> {
        Ok(Self)
    }

    async fn recv(&mut self) -> &'static str {
        let _ = tokio::signal::ctrl_c().await;
        "Ctrl+C"
    }
}
