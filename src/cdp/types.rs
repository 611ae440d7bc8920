//! CDP message types
//!
//! These types represent the subset of the Chrome DevTools Protocol used for
//! request interception (`Target`, `Network`, `Fetch` and `Inspector` domains).
//! See: https://chromedevtools.github.io/devtools-protocol/

use serde::{Deserialize, Serialize};
use serde_json::Value;

// === Base Protocol Messages ===

/// Outgoing CDP command
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandMessage<'a> {
    pub id: u64,
    pub method: &'a str,
    pub params: &'a Value,
    /// Flat-mode session the command is addressed to; absent for browser commands
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a str>,
}

/// Response to a command, correlated by `id`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMessage {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ProtocolError>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Error object carried by a failed response
#[derive(Debug, Clone, Deserialize)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<String>,
}

/// Unsolicited event
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMessage {
    pub method: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Any message the browser can send us
#[derive(Debug, Clone)]
pub enum IncomingMessage {
    Response(ResponseMessage),
    Event(EventMessage),
}

// === Shared Structures ===

/// `Fetch.HeaderEntry`: one header as an ordered name/value pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderEntry {
    pub name: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// `Fetch.RequestPattern`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPattern {
    pub url_pattern: String,
    pub request_stage: RequestStage,
}

/// Stage at which to pause an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RequestStage {
    Request,
    Response,
}

/// `Target.TargetInfo`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub target_id: String,
    #[serde(rename = "type")]
    pub target_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub attached: bool,
}

/// Response of the HTTP `/json/version` endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    #[serde(rename = "Browser", default)]
    pub browser: String,
    pub web_socket_debugger_url: String,
}

// === Command Parameters ===

/// `Target.attachToTarget` parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetParams {
    pub target_id: String,
    pub flatten: bool,
}

/// `Target.attachToTarget` result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachToTargetResult {
    pub session_id: String,
}

/// `Target.detachFromTarget` parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachFromTargetParams {
    pub session_id: String,
}

/// `Target.getTargets` result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetTargetsResult {
    #[serde(default)]
    pub target_infos: Vec<TargetInfo>,
}

/// `Fetch.enable` parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchEnableParams {
    pub patterns: Vec<RequestPattern>,
}

/// `Fetch.continueRequest` parameters
///
/// Every override is optional; an absent field leaves the original untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContinueRequestParams {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    /// Base64-encoded request body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<Vec<HeaderEntry>>,
}

/// `Fetch.fulfillRequest` parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillRequestParams {
    pub request_id: String,
    pub response_code: i64,
    pub response_headers: Vec<HeaderEntry>,
    /// Base64-encoded response body
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

/// `Fetch.failRequest` parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FailRequestParams {
    pub request_id: String,
    pub error_reason: String,
}

/// `Fetch.getResponseBody` / `Network.getResponseBody` parameters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResponseBodyParams {
    pub request_id: String,
}

/// `Fetch.getResponseBody` / `Network.getResponseBody` result
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetResponseBodyResult {
    pub body: String,
    #[serde(default)]
    pub base64_encoded: bool,
}

// === Event Parameters ===

/// `Fetch.requestPaused` parameters
///
/// Everything except the id is lenient: a pause we cannot fully read must
/// still be surfaced so it can be resumed.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPausedParams {
    pub request_id: String,
    #[serde(default)]
    pub request: PausedRequest,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub response_error_reason: Option<String>,
    #[serde(default)]
    pub response_status_code: Option<i64>,
    #[serde(default)]
    pub response_status_text: Option<String>,
    /// Ordered list on the wire; kept raw and normalized by the engine
    #[serde(default)]
    pub response_headers: Value,
    #[serde(default)]
    pub network_id: Option<String>,
}

/// `Network.Request` as carried inside `Fetch.requestPaused`
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedRequest {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub method: String,
    /// Flat mapping on the wire; kept raw and normalized by the engine
    #[serde(default)]
    pub headers: Value,
    #[serde(default)]
    pub post_data: Option<String>,
    #[serde(default)]
    pub has_post_data: Option<bool>,
    #[serde(default)]
    pub post_data_entries: Option<Vec<PostDataEntry>>,
}

/// `Network.PostDataEntry`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostDataEntry {
    /// Base64-encoded chunk
    #[serde(default)]
    pub bytes: Option<String>,
}

/// `Network.responseReceived` parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseReceivedParams {
    pub request_id: String,
    #[serde(default, rename = "type")]
    pub resource_type: Option<String>,
    pub response: ResponseInfo,
}

/// `Network.Response` (fields we use)
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseInfo {
    #[serde(default)]
    pub url: String,
    pub status: i64,
    #[serde(default)]
    pub status_text: String,
    #[serde(default)]
    pub headers: Value,
}

/// `Target.detachedFromTarget` parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetachedFromTargetParams {
    pub session_id: String,
    #[serde(default)]
    pub target_id: Option<String>,
}

/// `Target.targetDestroyed` parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDestroyedParams {
    pub target_id: String,
}

/// `Inspector.detached` parameters
#[derive(Debug, Clone, Deserialize)]
pub struct InspectorDetachedParams {
    #[serde(default)]
    pub reason: String,
}
