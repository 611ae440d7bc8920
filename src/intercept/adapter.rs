//! Protocol adapter
//!
//! Thin translation layer between the interception engine and CDP. Owns the
//! target → flat-session table, issues the `Target`, `Network` and `Fetch`
//! commands, and turns raw transport events into [`ProtocolEvent`]s keyed by
//! target.

use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::cdp::{
    AttachToTargetParams, AttachToTargetResult, CdpTransport, CommandTarget,
    ContinueRequestParams, DetachFromTargetParams, DetachedFromTargetParams, EventMessage,
    FailRequestParams, FetchEnableParams, FulfillRequestParams, GetResponseBodyParams,
    GetResponseBodyResult, GetTargetsResult, HeaderEntry, InspectorDetachedParams,
    RequestPattern, RequestPausedParams, RequestStage, ResponseReceivedParams,
    TargetDestroyedParams, TargetInfo, TransportEvent,
};
use crate::common::{Error, Result};
use crate::ipc::protocol::DetachReason;

use super::ids::{ExchangeId, TargetId};

/// Error reason sent with `Fetch.failRequest`
const BLOCKED_REASON: &str = "BlockedByClient";

/// Protocol events the engine cares about, keyed by target
#[derive(Debug, Clone)]
pub enum ProtocolEvent {
    /// `Fetch.requestPaused`
    RequestPaused {
        target: TargetId,
        params: RequestPausedParams,
    },
    /// `Network.responseReceived`
    ResponseReceived {
        target: TargetId,
        params: ResponseReceivedParams,
    },
    /// The session for a target ended without us asking
    Detached {
        target: TargetId,
        reason: DetachReason,
    },
    /// The browser connection is gone, taking these sessions with it
    TransportClosed { targets: Vec<TargetId> },
}

/// Result of a successful attach
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    Attached { session_id: String },
    AlreadyAttached { session_id: String },
}

impl AttachOutcome {
    pub fn session_id(&self) -> &str {
        match self {
            Self::Attached { session_id } | Self::AlreadyAttached { session_id } => session_id,
        }
    }
}

/// Overrides for `Fetch.continueRequest`, already in wire form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOverrides {
    pub url: Option<String>,
    pub method: Option<String>,
    pub headers: Option<Vec<HeaderEntry>>,
    /// Base64-encoded body
    pub post_data: Option<String>,
}

/// Body returned by [`ProtocolAdapter::fetch_body`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchedBody {
    Available { body: String, base64_encoded: bool },
    NotAvailable,
}

/// Adapter over a CDP transport
pub struct ProtocolAdapter {
    transport: Arc<dyn CdpTransport>,
    /// Target → flat session id
    sessions: HashMap<TargetId, String>,
    /// Flat session id → target
    targets: HashMap<String, TargetId>,
}

impl ProtocolAdapter {
    pub fn new(transport: Arc<dyn CdpTransport>) -> Self {
        Self {
            transport,
            sessions: HashMap::new(),
            targets: HashMap::new(),
        }
    }

    /// Flat session id for the target
    pub fn session_id(&self, target: &TargetId) -> Option<&str> {
        self.sessions.get(target).map(String::as_str)
    }

    /// Open a session on the target and enable two-stage interception
    #[tracing::instrument(skip_all, fields(tab = %target))]
    pub async fn attach(&mut self, target: &TargetId) -> Result<AttachOutcome> {
        if let Some(session_id) = self.sessions.get(target) {
            tracing::debug!("Target already attached");
            return Ok(AttachOutcome::AlreadyAttached {
                session_id: session_id.clone(),
            });
        }

        let params = AttachToTargetParams {
            target_id: target.to_string(),
            flatten: true,
        };
        let result: AttachToTargetResult = self
            .call(CommandTarget::Browser, "Target.attachToTarget", &params)
            .await
            .map_err(|e| Error::attach_failed(target.as_str(), e))?;

        let session = CommandTarget::Session(result.session_id.clone());
        if let Err(e) = self.enable_interception(session).await {
            tracing::warn!(error = %e, "Enabling interception failed; detaching");
            self.detach_session(&result.session_id).await;
            return Err(Error::attach_failed(target.as_str(), e));
        }

        tracing::info!(session_id = %result.session_id, "Attached to target");
        self.sessions.insert(target.clone(), result.session_id.clone());
        self.targets.insert(result.session_id.clone(), target.clone());

        Ok(AttachOutcome::Attached {
            session_id: result.session_id,
        })
    }

    async fn enable_interception(&self, session: CommandTarget) -> Result<()> {
        self.send(session.clone(), "Network.enable", Value::Object(Default::default()))
            .await?;

        let params = FetchEnableParams {
            patterns: vec![
                RequestPattern {
                    url_pattern: "*".to_string(),
                    request_stage: RequestStage::Request,
                },
                RequestPattern {
                    url_pattern: "*".to_string(),
                    request_stage: RequestStage::Response,
                },
            ],
        };
        self.send(session, "Fetch.enable", serde_json::to_value(&params)?)
            .await?;
        Ok(())
    }

    /// Close the session on the target; safe when not attached
    #[tracing::instrument(skip_all, fields(tab = %target))]
    pub async fn detach(&mut self, target: &TargetId) {
        match self.forget(target) {
            Some(session_id) => self.detach_session(&session_id).await,
            None => tracing::debug!("Detach requested for target that is not attached"),
        }
    }

    async fn detach_session(&self, session_id: &str) {
        let params = DetachFromTargetParams {
            session_id: session_id.to_string(),
        };
        let result = match serde_json::to_value(&params) {
            Ok(params) => {
                self.send(CommandTarget::Browser, "Target.detachFromTarget", params)
                    .await
            }
            Err(e) => Err(e.into()),
        };
        if let Err(e) = result {
            tracing::warn!(session_id, error = %e, "Detach failed; ignoring");
        }
    }

    /// `Fetch.continueRequest` with only the supplied overrides
    pub async fn resume_request(
        &self,
        target: &TargetId,
        exchange_id: &ExchangeId,
        overrides: RequestOverrides,
    ) -> Result<()> {
        let params = ContinueRequestParams {
            request_id: exchange_id.to_string(),
            url: overrides.url,
            method: overrides.method,
            post_data: overrides.post_data,
            headers: overrides.headers,
        };
        self.session_call(target, "Fetch.continueRequest", &params)
            .await
    }

    /// `Fetch.fulfillRequest`; code and headers are always sent
    pub async fn fulfill_response(
        &self,
        target: &TargetId,
        exchange_id: &ExchangeId,
        code: i64,
        headers: Vec<HeaderEntry>,
        body: Option<String>,
    ) -> Result<()> {
        let params = FulfillRequestParams {
            request_id: exchange_id.to_string(),
            response_code: code,
            response_headers: headers,
            body,
        };
        self.session_call(target, "Fetch.fulfillRequest", &params)
            .await
    }

    /// `Fetch.failRequest` with `BlockedByClient`
    pub async fn fail_request(&self, target: &TargetId, exchange_id: &ExchangeId) -> Result<()> {
        let params = FailRequestParams {
            request_id: exchange_id.to_string(),
            error_reason: BLOCKED_REASON.to_string(),
        };
        self.session_call(target, "Fetch.failRequest", &params)
            .await
    }

    /// Fetch a paused body, trying the `Fetch` accessor then the `Network` one
    ///
    /// Never fails; anything that goes wrong yields `NotAvailable`.
    pub async fn fetch_body(
        &self,
        target: &TargetId,
        exchange_id: &ExchangeId,
        network_id: Option<&str>,
    ) -> FetchedBody {
        let Some(session_id) = self.session_id(target) else {
            tracing::debug!(tab = %target, "Body requested for detached target");
            return FetchedBody::NotAvailable;
        };
        let session = CommandTarget::Session(session_id.to_string());

        let fetch_params = GetResponseBodyParams {
            request_id: exchange_id.to_string(),
        };
        match self
            .call::<_, GetResponseBodyResult>(session.clone(), "Fetch.getResponseBody", &fetch_params)
            .await
        {
            Ok(result) => {
                return FetchedBody::Available {
                    body: result.body,
                    base64_encoded: result.base64_encoded,
                }
            }
            Err(e) => tracing::debug!(
                exchange = %exchange_id,
                error = %e,
                "Fetch.getResponseBody failed; falling back to Network domain"
            ),
        }

        let network_params = GetResponseBodyParams {
            request_id: network_id.unwrap_or(exchange_id.as_str()).to_string(),
        };
        match self
            .call::<_, GetResponseBodyResult>(session, "Network.getResponseBody", &network_params)
            .await
        {
            Ok(result) => FetchedBody::Available {
                body: result.body,
                base64_encoded: result.base64_encoded,
            },
            Err(e) => {
                tracing::debug!(exchange = %exchange_id, error = %e, "Body not available");
                FetchedBody::NotAvailable
            }
        }
    }

    /// Page targets known to the browser
    pub async fn list_targets(&self) -> Result<Vec<TargetInfo>> {
        let result: GetTargetsResult = self
            .call(
                CommandTarget::Browser,
                "Target.getTargets",
                &Value::Object(Default::default()),
            )
            .await?;
        Ok(result
            .target_infos
            .into_iter()
            .filter(|t| t.target_type == "page")
            .collect())
    }

    /// Translate a transport event into a protocol event
    ///
    /// Session-ending events update the session table here, so a later
    /// `detach` for the same target is a no-op.
    pub fn normalize(&mut self, event: TransportEvent) -> Option<ProtocolEvent> {
        let event = match event {
            TransportEvent::Event(event) => event,
            TransportEvent::Closed => {
                let targets: Vec<TargetId> = self.sessions.keys().cloned().collect();
                self.sessions.clear();
                self.targets.clear();
                return Some(ProtocolEvent::TransportClosed { targets });
            }
        };

        match event.method.as_str() {
            "Fetch.requestPaused" => {
                let target = self.event_target(&event)?;
                let params = parse_params::<RequestPausedParams>(&event)?;
                Some(ProtocolEvent::RequestPaused { target, params })
            }
            "Network.responseReceived" => {
                let target = self.event_target(&event)?;
                let params = parse_params::<ResponseReceivedParams>(&event)?;
                Some(ProtocolEvent::ResponseReceived { target, params })
            }
            "Inspector.detached" => {
                let target = self.event_target(&event)?;
                let params = parse_params::<InspectorDetachedParams>(&event)?;
                self.forget(&target);
                Some(ProtocolEvent::Detached {
                    target,
                    reason: DetachReason::from_protocol(&params.reason),
                })
            }
            "Target.detachedFromTarget" => {
                let params = parse_params::<DetachedFromTargetParams>(&event)?;
                let target = self.targets.get(&params.session_id)?.clone();
                self.forget(&target);
                Some(ProtocolEvent::Detached {
                    target,
                    reason: DetachReason::TargetClosed,
                })
            }
            "Target.targetDestroyed" => {
                let params = parse_params::<TargetDestroyedParams>(&event)?;
                let target = TargetId::new(params.target_id);
                self.forget(&target)?;
                Some(ProtocolEvent::Detached {
                    target,
                    reason: DetachReason::TargetClosed,
                })
            }
            other => {
                tracing::trace!(method = other, "Ignoring CDP event");
                None
            }
        }
    }

    fn event_target(&self, event: &EventMessage) -> Option<TargetId> {
        let session_id = event.session_id.as_deref()?;
        let target = self.targets.get(session_id).cloned();
        if target.is_none() {
            tracing::debug!(session_id, method = %event.method, "Event for unknown session");
        }
        target
    }

    fn forget(&mut self, target: &TargetId) -> Option<String> {
        let session_id = self.sessions.remove(target)?;
        self.targets.remove(&session_id);
        Some(session_id)
    }

    async fn session_call<P: serde::Serialize>(
        &self,
        target: &TargetId,
        method: &str,
        params: &P,
    ) -> Result<()> {
        let session_id = self
            .session_id(target)
            .ok_or_else(|| Error::NotAttached(target.to_string()))?;
        self.send(
            CommandTarget::Session(session_id.to_string()),
            method,
            serde_json::to_value(params)?,
        )
        .await?;
        Ok(())
    }

    async fn call<P: serde::Serialize, R: DeserializeOwned>(
        &self,
        target: CommandTarget,
        method: &str,
        params: &P,
    ) -> Result<R> {
        let value = self
            .send(target, method, serde_json::to_value(params)?)
            .await?;
        serde_json::from_value(value)
            .map_err(|e| Error::CdpProtocol(format!("Failed to parse {} result: {}", method, e)))
    }

    async fn send(&self, target: CommandTarget, method: &str, params: Value) -> Result<Value> {
        tracing::trace!(method, ?target, "Sending CDP command");
        self.transport.send_command(target, method, params).await
    }
}

fn parse_params<T: DeserializeOwned>(event: &EventMessage) -> Option<T> {
    match serde_json::from_value(event.params.clone()) {
        Ok(params) => Some(params),
        Err(e) => {
            tracing::warn!(method = %event.method, error = %e, "Malformed event parameters; ignoring");
            None
        }
    }
}
