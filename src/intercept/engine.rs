//! Interception engine
//!
//! State machine over paused exchanges. Protocol pauses are classified by
//! stage, projected into editable events and stored; operator commands look
//! the exchange up, compose the resume command and dispatch it once. An
//! exchange leaves the store once its resume command was accepted or the
//! browser reports the id as unknown, or when its session is torn down.

use std::sync::Arc;

use chrono::Utc;

use crate::cdp::{CdpTransport, HeaderEntry, RequestPausedParams, TargetInfo, TransportEvent};
use crate::common::Result;
use crate::ipc::protocol::{
    BodyFetched, DetachReason, Event, ExchangeSummary, RequestIntercepted, RequestPatch,
    ResponseIntercepted, ResponsePatch, StatusResult,
};

use super::adapter::{FetchedBody, ProtocolAdapter, ProtocolEvent, RequestOverrides};
use super::body::{decode_chunks_to_text, encode_body};
use super::channel::OutputChannel;
use super::headers::{normalize, patch_to_list};
use super::ids::{ChannelId, ExchangeId, TargetId};
use super::registry::{Registration, Session, SessionRegistry, Teardown};
use super::status::status_text;
use super::store::{Direction, ExchangeStore, PausedExchange, ResponseMeta};

/// Status used when fulfilling an exchange that has no captured response
const DEFAULT_FULFILL_STATUS: i64 = 200;

/// Resource category reported when the protocol omits one
const UNKNOWN_RESOURCE: &str = "Other";

/// Outcome of a resolution command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The resume command was accepted and the exchange removed
    Dispatched,
    /// No paused exchange with that id, or the browser had already released it
    UnknownExchange,
    /// The transport rejected the command; the exchange is still paused
    TransportFailed(String),
}

/// Arguments for `Fetch.fulfillRequest`
#[derive(Debug, Clone, PartialEq)]
pub struct Fulfillment {
    pub code: i64,
    pub headers: Vec<HeaderEntry>,
    /// Base64-encoded body; `None` omits the field
    pub body: Option<String>,
}

/// The interception core: adapter, sessions and paused exchanges
pub struct Interceptor {
    adapter: ProtocolAdapter,
    registry: SessionRegistry,
    store: ExchangeStore,
}

impl Interceptor {
    pub fn new(transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            adapter: ProtocolAdapter::new(transport),
            registry: SessionRegistry::new(),
            store: ExchangeStore::new(),
        }
    }

    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    pub fn store(&self) -> &ExchangeStore {
        &self.store
    }

    // === Session lifecycle ===

    /// Start intercepting a tab on behalf of `channel`
    ///
    /// Interception events for the tab go to the channel that first attached
    /// it. A repeated attach is acknowledged with `Attached` and changes
    /// nothing.
    #[tracing::instrument(skip_all, fields(tab = %target, channel = %channel.id()))]
    pub async fn attach(&mut self, target: &TargetId, channel: &OutputChannel) -> Result<Registration> {
        if let Some(session) = self.registry.get(target) {
            tracing::info!(owner = %session.channel.id(), "Target already attached");
            let owned = session.channel.id() == channel.id();
            if let Err(e) = channel.deliver(Event::Attached {
                target: target.clone(),
            }) {
                tracing::debug!(error = %e, "Attach acknowledgment not delivered");
                if owned {
                    self.teardown(target).await;
                }
            }
            return Ok(Registration::AlreadyAttached);
        }

        let outcome = match self.adapter.attach(target).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::warn!(error = %e, "Attach failed");
                channel.deliver_best_effort(Event::AttachFailed {
                    target: target.clone(),
                    error: e.to_string(),
                });
                return Err(e);
            }
        };

        let session = Session::new(
            target.clone(),
            outcome.session_id().to_string(),
            channel.clone(),
        );
        let registration = self.registry.register(session);

        if let Err(e) = channel.deliver(Event::Attached {
            target: target.clone(),
        }) {
            tracing::warn!(error = %e, "Attach acknowledgment not delivered; tearing down session");
            self.teardown(target).await;
        }

        Ok(registration)
    }

    /// Stop intercepting a tab
    ///
    /// Returns whether a session existed. `Detached` goes to the requester
    /// and, when different, to the channel that owned the session.
    #[tracing::instrument(skip_all, fields(tab = %target))]
    pub async fn detach(&mut self, target: &TargetId, requester: &OutputChannel) -> bool {
        let session = self.teardown(target).await;
        let event = Event::Detached {
            target: target.clone(),
            reason: DetachReason::Requested,
        };

        if let Some(session) = &session {
            if session.channel.id() != requester.id() {
                session.channel.deliver_best_effort(event.clone());
            }
        }
        requester.deliver_best_effort(event);

        session.is_some()
    }

    /// Tear down every session owned by a collaborator that went away
    pub async fn channel_closed(&mut self, channel: ChannelId) {
        let targets = self.registry.targets_for_channel(channel);
        if targets.is_empty() {
            return;
        }
        tracing::info!(channel = %channel, sessions = targets.len(), "Channel closed; ending its sessions");
        for target in targets {
            self.teardown(&target).await;
        }
    }

    /// Detach from every tab
    pub async fn shutdown(&mut self) {
        for target in self.registry.targets() {
            if let Some(session) = self.teardown(&target).await {
                session.channel.deliver_best_effort(Event::Detached {
                    target,
                    reason: DetachReason::Requested,
                });
            }
        }
    }

    async fn teardown(&mut self, target: &TargetId) -> Option<Session> {
        self.registry
            .unregister(target, Teardown::Detach, &mut self.store, &mut self.adapter)
            .await
    }

    /// Drop a session the browser already ended; nothing is sent
    async fn forget(&mut self, target: &TargetId) -> Option<Session> {
        self.registry
            .unregister(target, Teardown::Forget, &mut self.store, &mut self.adapter)
            .await
    }

    // === Resolution ===

    /// Let a paused exchange continue, applying only the fields the patch sets
    #[tracing::instrument(skip_all, fields(exchange = %exchange_id))]
    pub async fn continue_request(
        &mut self,
        exchange_id: &ExchangeId,
        patch: Option<&RequestPatch>,
    ) -> Resolution {
        let Some(exchange) = self.store.get(exchange_id) else {
            tracing::info!("Continue for unknown exchange; ignoring");
            return Resolution::UnknownExchange;
        };
        let target = exchange.target.clone();
        let overrides = patch.map(build_continue_request).unwrap_or_default();

        let result = self
            .adapter
            .resume_request(&target, exchange_id, overrides)
            .await;
        self.settle(exchange_id, result)
    }

    /// Deliver a response, captured values overridden by the patch
    #[tracing::instrument(skip_all, fields(exchange = %exchange_id))]
    pub async fn continue_response(
        &mut self,
        exchange_id: &ExchangeId,
        patch: Option<&ResponsePatch>,
    ) -> Resolution {
        let Some(exchange) = self.store.get(exchange_id) else {
            tracing::info!("Fulfill for unknown exchange; ignoring");
            return Resolution::UnknownExchange;
        };
        let target = exchange.target.clone();
        let fulfillment = build_fulfill(exchange, patch);

        let result = self
            .adapter
            .fulfill_response(
                &target,
                exchange_id,
                fulfillment.code,
                fulfillment.headers,
                fulfillment.body,
            )
            .await;
        self.settle(exchange_id, result)
    }

    /// Fail a paused exchange as blocked by the client
    #[tracing::instrument(skip_all, fields(exchange = %exchange_id))]
    pub async fn block(&mut self, exchange_id: &ExchangeId) -> Resolution {
        let Some(exchange) = self.store.get(exchange_id) else {
            tracing::info!("Block for unknown exchange; ignoring");
            return Resolution::UnknownExchange;
        };
        let target = exchange.target.clone();

        let result = self.adapter.fail_request(&target, exchange_id).await;
        self.settle(exchange_id, result)
    }

    fn settle(&mut self, exchange_id: &ExchangeId, result: Result<()>) -> Resolution {
        match result {
            Ok(()) => {
                self.store.remove(exchange_id);
                tracing::debug!(exchange = %exchange_id, "Exchange resolved");
                Resolution::Dispatched
            }
            Err(e) if e.is_unknown_interception() => {
                self.store.remove(exchange_id);
                tracing::info!(exchange = %exchange_id, error = %e, "Browser no longer knows the exchange; dropping it");
                Resolution::UnknownExchange
            }
            Err(e) if e.is_transport() => {
                tracing::warn!(exchange = %exchange_id, error = %e, "Resume command failed; exchange stays paused");
                Resolution::TransportFailed(e.to_string())
            }
            Err(e) => {
                tracing::error!(exchange = %exchange_id, error = %e, "Resume command could not be sent; exchange stays paused");
                Resolution::TransportFailed(e.to_string())
            }
        }
    }

    /// Fetch the body of a paused exchange and send it to `requester`
    ///
    /// The store is left untouched.
    pub async fn fetch_body(
        &mut self,
        target: &TargetId,
        exchange_id: &ExchangeId,
        requester: &OutputChannel,
    ) -> BodyFetched {
        let network_id = self
            .store
            .get(exchange_id)
            .and_then(|e| e.network_id.clone());

        let fetched = match self
            .adapter
            .fetch_body(target, exchange_id, network_id.as_deref())
            .await
        {
            FetchedBody::Available {
                body,
                base64_encoded,
            } => BodyFetched {
                exchange_id: exchange_id.clone(),
                body,
                is_binary_encoded: base64_encoded,
                available: true,
            },
            FetchedBody::NotAvailable => BodyFetched::not_available(exchange_id.clone()),
        };

        requester.deliver_best_effort(Event::BodyFetched(fetched.clone()));
        fetched
    }

    // === Inspection ===

    pub async fn list_targets(&self) -> Result<Vec<TargetInfo>> {
        self.adapter.list_targets().await
    }

    pub fn status(&self) -> StatusResult {
        let pending = self
            .store
            .pending(None)
            .into_iter()
            .map(|e| ExchangeSummary {
                exchange_id: e.id.clone(),
                target: e.target.clone(),
                direction: e.direction.to_string(),
                method: e.method.clone(),
                url: e.url.clone(),
                status: e.response.as_ref().map(|r| r.status),
                captured_at: e.captured_at,
            })
            .collect();

        StatusResult {
            sessions: self.registry.snapshot(),
            pending,
        }
    }

    // === Protocol events ===

    pub async fn handle_transport_event(&mut self, event: TransportEvent) {
        if let Some(event) = self.adapter.normalize(event) {
            self.handle_protocol_event(event).await;
        }
    }

    pub async fn handle_protocol_event(&mut self, event: ProtocolEvent) {
        match event {
            ProtocolEvent::RequestPaused { target, params } => self.on_paused(target, params),
            ProtocolEvent::ResponseReceived { target, params } => {
                let meta = ResponseMeta {
                    status: params.response.status,
                    status_text: params.response.status_text,
                    headers: normalize(&params.response.headers).list,
                };
                if !self
                    .store
                    .attach_response_metadata(&target, &params.request_id, meta)
                {
                    tracing::trace!(tab = %target, request = %params.request_id, "Response metadata for exchange that is not paused");
                }
            }
            ProtocolEvent::Detached { target, reason } => {
                tracing::info!(tab = %target, reason = %reason, "Session ended by the browser");
                if let Some(session) = self.forget(&target).await {
                    session
                        .channel
                        .deliver_best_effort(Event::Detached { target, reason });
                }
            }
            ProtocolEvent::TransportClosed { targets } => {
                tracing::warn!(sessions = targets.len(), "Browser connection closed");
                for target in self.registry.targets() {
                    if let Some(session) = self.forget(&target).await {
                        session.channel.deliver_best_effort(Event::Detached {
                            target,
                            reason: DetachReason::BrowserDisconnected,
                        });
                    }
                }
            }
        }
    }

    fn on_paused(&mut self, target: TargetId, params: RequestPausedParams) {
        let Some(session) = self.registry.get(&target) else {
            tracing::debug!(tab = %target, request = %params.request_id, "Pause for unregistered target");
            return;
        };
        let channel = session.channel.clone();

        let (exchange, event) = capture(target, params);
        tracing::debug!(
            exchange = %exchange.id,
            direction = %exchange.direction,
            method = %exchange.method,
            url = %exchange.url,
            "Exchange paused"
        );
        self.store.put(exchange);
        channel.deliver_best_effort(event);
    }
}

/// Classify a pause and build the stored exchange plus its event
///
/// A present status code means the response stage. `0` is kept as a response
/// but is not a real HTTP status.
pub fn capture(target: TargetId, params: RequestPausedParams) -> (PausedExchange, Event) {
    let id = ExchangeId::new(params.request_id);
    let request = params.request;
    let request_headers = normalize(&request.headers);
    let resource_category = params
        .resource_type
        .unwrap_or_else(|| UNKNOWN_RESOURCE.to_string());
    let timestamp = Utc::now();

    let body = request.post_data.or_else(|| {
        let entries = request.post_data_entries?;
        decode_chunks_to_text(entries.iter().filter_map(|entry| entry.bytes.as_deref()))
    });

    let mut exchange = PausedExchange {
        id: id.clone(),
        target: target.clone(),
        direction: Direction::Request,
        url: request.url,
        method: request.method,
        headers: request_headers.list.clone(),
        body,
        response: None,
        resource_category: resource_category.clone(),
        network_id: params.network_id,
        captured_at: timestamp,
    };

    match params.response_status_code {
        Some(code) => {
            if code == 0 {
                tracing::warn!(exchange = %id, "Response pause with status code 0");
            }
            let headers = normalize(&params.response_headers).list;
            let meta = ResponseMeta {
                status: code,
                status_text: status_text(code).to_string(),
                headers: headers.clone(),
            };
            exchange.direction = Direction::Response;
            exchange.response = Some(meta.clone());

            let event = Event::ResponseIntercepted(ResponseIntercepted {
                exchange_id: id,
                target,
                url: exchange.url.clone(),
                method: exchange.method.clone(),
                status: meta.status,
                status_text: meta.status_text,
                headers,
                resource_category,
                timestamp,
            });
            (exchange, event)
        }
        None => {
            if let Some(reason) = &params.response_error_reason {
                tracing::debug!(exchange = %id, reason = %reason, "Pause carries a network error");
            }
            let event = Event::RequestIntercepted(RequestIntercepted {
                exchange_id: id,
                target,
                url: exchange.url.clone(),
                method: exchange.method.clone(),
                headers: request_headers.map,
                headers_list: request_headers.list,
                body: exchange.body.clone(),
                resource_category,
                timestamp,
            });
            (exchange, event)
        }
    }
}

/// Overrides for a plain continuation: only fields the patch sets
pub fn build_continue_request(patch: &RequestPatch) -> RequestOverrides {
    RequestOverrides {
        url: patch.url.clone(),
        method: patch.method.clone(),
        headers: patch.headers.as_ref().map(patch_to_list),
        post_data: patch
            .body
            .as_deref()
            .and_then(encode_body)
            .map(|encoded| encoded.data),
    }
}

/// Fulfillment arguments: patch values, else captured values, else defaults
pub fn build_fulfill(exchange: &PausedExchange, patch: Option<&ResponsePatch>) -> Fulfillment {
    let captured = exchange.response.as_ref();

    let code = patch
        .and_then(|p| p.status)
        .or_else(|| captured.map(|r| r.status))
        .unwrap_or(DEFAULT_FULFILL_STATUS);

    let headers = match patch.and_then(|p| p.headers.as_ref()) {
        Some(headers) => patch_to_list(headers),
        None => captured.map(|r| r.headers.clone()).unwrap_or_default(),
    };

    let body = patch
        .and_then(|p| p.body.as_deref())
        .and_then(encode_body)
        .map(|encoded| encoded.data);

    Fulfillment {
        code,
        headers,
        body,
    }
}
