//! IPC protocol message types
//!
//! Defines the command/event format between collaborators and the daemon.
//! Uses a simple length-prefixed JSON protocol. Every request receives a
//! `Response`; events are pushed as they happen on the same connection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cdp::HeaderEntry;
use crate::common::error::IpcError;
use crate::intercept::headers::{HeaderMap, HeadersPatch};
use crate::intercept::{ExchangeId, TargetId};

/// IPC request from a collaborator to the daemon
#[derive(Debug, Serialize, Deserialize)]
pub struct Request {
    /// Request ID for matching responses
    pub id: u64,
    /// The command to execute
    pub command: Command,
}

/// IPC response from daemon to collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// Request ID this response corresponds to
    pub id: u64,
    /// Whether the command succeeded
    pub success: bool,
    /// Result data on success
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    /// Error information on failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<IpcError>,
}

impl Response {
    /// Create a success response
    pub fn success(id: u64, result: serde_json::Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: u64, error: IpcError) -> Self {
        Self {
            id,
            success: false,
            result: None,
            error: Some(error),
        }
    }

    /// Create a success response with no data
    pub fn ok(id: u64) -> Self {
        Self::success(id, serde_json::json!({}))
    }
}

/// Any frame the daemon writes to a collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ServerMessage {
    Response(Response),
    Event(Event),
}

/// Commands that can be sent to the daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    // === Session Management ===
    /// Start intercepting a tab
    Attach { target: TargetId },

    /// Stop intercepting a tab
    Detach { target: TargetId },

    // === Resolution ===
    /// Let a paused request continue, optionally modified
    ContinueRequest {
        exchange_id: ExchangeId,
        #[serde(default)]
        patch: Option<RequestPatch>,
    },

    /// Deliver a paused response, optionally replaced
    ContinueResponse {
        exchange_id: ExchangeId,
        #[serde(default)]
        patch: Option<ResponsePatch>,
    },

    /// Fail a paused exchange as blocked by the client
    Block { exchange_id: ExchangeId },

    // === Inspection ===
    /// Fetch the body of a paused response
    FetchBody {
        target: TargetId,
        exchange_id: ExchangeId,
    },

    /// List browser tabs that can be attached
    ListTargets,

    /// Get attached sessions and pending exchanges
    Status,

    // === Shutdown ===
    /// Shutdown the daemon
    Shutdown,
}

/// Edits applied when continuing a request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeadersPatch>,
    /// Raw body text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Edits applied when fulfilling a response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headers: Option<HeadersPatch>,
    /// Raw body text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// Events pushed to collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    Attached {
        target: TargetId,
    },
    Detached {
        target: TargetId,
        reason: DetachReason,
    },
    AttachFailed {
        target: TargetId,
        error: String,
    },
    RequestIntercepted(RequestIntercepted),
    ResponseIntercepted(ResponseIntercepted),
    BodyFetched(BodyFetched),
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetachReason {
    /// A collaborator asked for it
    Requested,
    /// The collaborator owning the session went away
    ChannelClosed,
    /// The tab was closed
    TargetClosed,
    /// Another client (e.g. DevTools) took over the tab
    ReplacedWithDevtools,
    /// The user dismissed the debugging infobar
    CanceledByUser,
    /// The browser connection was lost
    BrowserDisconnected,
    /// Anything else the protocol reported
    Other(String),
}

impl DetachReason {
    /// Map an `Inspector.detached` reason string
    pub fn from_protocol(reason: &str) -> Self {
        match reason {
            "target_closed" => Self::TargetClosed,
            "replaced_with_devtools" => Self::ReplacedWithDevtools,
            "canceled_by_user" => Self::CanceledByUser,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for DetachReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Requested => write!(f, "requested"),
            Self::ChannelClosed => write!(f, "channel closed"),
            Self::TargetClosed => write!(f, "target closed"),
            Self::ReplacedWithDevtools => write!(f, "replaced with devtools"),
            Self::CanceledByUser => write!(f, "canceled by user"),
            Self::BrowserDisconnected => write!(f, "browser disconnected"),
            Self::Other(reason) => write!(f, "{}", reason),
        }
    }
}

/// A request paused before it was sent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestIntercepted {
    pub exchange_id: ExchangeId,
    pub target: TargetId,
    pub url: String,
    pub method: String,
    pub headers: HeaderMap,
    pub headers_list: Vec<HeaderEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub resource_category: String,
    pub timestamp: DateTime<Utc>,
}

/// A response paused before it was delivered
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseIntercepted {
    pub exchange_id: ExchangeId,
    pub target: TargetId,
    pub url: String,
    pub method: String,
    pub status: i64,
    pub status_text: String,
    pub headers: Vec<HeaderEntry>,
    pub resource_category: String,
    pub timestamp: DateTime<Utc>,
}

/// Result of a body fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyFetched {
    pub exchange_id: ExchangeId,
    pub body: String,
    pub is_binary_encoded: bool,
    pub available: bool,
}

impl BodyFetched {
    /// Sentinel for a body the protocol would not give us
    pub fn not_available(exchange_id: ExchangeId) -> Self {
        Self {
            exchange_id,
            body: String::new(),
            is_binary_encoded: false,
            available: false,
        }
    }
}

/// Daemon status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResult {
    pub sessions: Vec<SessionInfo>,
    pub pending: Vec<ExchangeSummary>,
}

/// One attached tab
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionInfo {
    pub target: TargetId,
    pub active: bool,
    pub channel: u64,
    pub created_at: DateTime<Utc>,
}

/// One paused exchange
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeSummary {
    pub exchange_id: ExchangeId,
    pub target: TargetId,
    pub direction: String,
    pub method: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    pub captured_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_command_wire_format() {
        let command: Command = serde_json::from_value(json!({
            "type": "continue_request",
            "exchange_id": "interception-1",
            "patch": { "method": "POST", "headers": { "X-A": "1" } }
        }))
        .unwrap();

        match command {
            Command::ContinueRequest { exchange_id, patch } => {
                assert_eq!(exchange_id.as_str(), "interception-1");
                let patch = patch.unwrap();
                assert_eq!(patch.method.as_deref(), Some("POST"));
                assert!(matches!(patch.headers, Some(HeadersPatch::Map(_))));
                assert!(patch.url.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_patch_is_optional() {
        let command: Command = serde_json::from_value(json!({
            "type": "continue_response",
            "exchange_id": "interception-2"
        }))
        .unwrap();
        assert!(matches!(command, Command::ContinueResponse { patch: None, .. }));
    }

    #[test]
    fn test_event_wire_format() {
        let message = ServerMessage::Event(Event::Detached {
            target: TargetId::new("T1"),
            reason: DetachReason::TargetClosed,
        });
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(
            value,
            json!({ "kind": "event", "event": "detached", "target": "T1", "reason": "target_closed" })
        );
    }

    #[test]
    fn test_body_fetched_sentinel() {
        let body = BodyFetched::not_available(ExchangeId::new("x"));
        assert!(!body.available);
        assert!(body.body.is_empty());
    }

    #[test]
    fn test_detach_reason_mapping() {
        assert_eq!(DetachReason::from_protocol("target_closed"), DetachReason::TargetClosed);
        assert_eq!(
            DetachReason::from_protocol("Render process gone."),
            DetachReason::Other("Render process gone.".to_string())
        );
    }
}
