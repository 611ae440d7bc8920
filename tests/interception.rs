//! Interception engine tests against a recording CDP transport
//!
//! Every test drives the real `Interceptor` (adapter, registry and store)
//! and asserts on the exact commands that would have reached the browser
//! and the events delivered to collaborators.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;

use interceptor::cdp::{CdpTransport, CommandTarget, EventMessage, TransportEvent};
use interceptor::intercept::{ChannelId, OutputChannel, ProtocolEvent, Registration, Resolution};
use interceptor::ipc::protocol::{DetachReason, RequestPatch, ServerMessage};
use interceptor::{Error, Event, ExchangeId, Interceptor, Result, TargetId};

/// One command seen by the mock browser
#[derive(Debug, Clone)]
struct Call {
    target: CommandTarget,
    method: String,
    params: Value,
}

/// Transport that records commands and answers from canned results
#[derive(Default)]
struct MockTransport {
    calls: Mutex<Vec<Call>>,
    failures: Mutex<HashMap<String, String>>,
    timeouts: Mutex<HashSet<String>>,
    results: Mutex<HashMap<String, Value>>,
}

impl MockTransport {
    fn fail(&self, method: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(method.to_string(), message.to_string());
    }

    fn time_out(&self, method: &str) {
        self.timeouts.lock().unwrap().insert(method.to_string());
    }

    fn succeed(&self, method: &str) {
        self.failures.lock().unwrap().remove(method);
        self.timeouts.lock().unwrap().remove(method);
    }

    fn answer(&self, method: &str, result: Value) {
        self.results
            .lock()
            .unwrap()
            .insert(method.to_string(), result);
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn methods(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.method).collect()
    }

    fn calls_to(&self, method: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }

    fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl CdpTransport for MockTransport {
    async fn send_command(&self, target: CommandTarget, method: &str, params: Value) -> Result<Value> {
        self.calls.lock().unwrap().push(Call {
            target,
            method: method.to_string(),
            params: params.clone(),
        });

        if self.timeouts.lock().unwrap().contains(method) {
            return Err(Error::Timeout(30));
        }
        if let Some(message) = self.failures.lock().unwrap().get(method) {
            return Err(Error::cdp_request_failed(method, message));
        }
        if let Some(result) = self.results.lock().unwrap().get(method) {
            return Ok(result.clone());
        }

        match method {
            "Target.attachToTarget" => {
                let target_id = params["targetId"].as_str().unwrap_or_default();
                Ok(json!({ "sessionId": format!("S-{}", target_id) }))
            }
            _ => Ok(json!({})),
        }
    }
}

struct Harness {
    transport: Arc<MockTransport>,
    interceptor: Interceptor,
    channel: OutputChannel,
    events: UnboundedReceiver<ServerMessage>,
}

impl Harness {
    fn new() -> Self {
        let transport = Arc::new(MockTransport::default());
        let interceptor = Interceptor::new(transport.clone());
        let (channel, events) = OutputChannel::new(ChannelId(1));
        Self {
            transport,
            interceptor,
            channel,
            events,
        }
    }

    async fn attached(target: &str) -> Self {
        let mut harness = Self::new();
        harness
            .interceptor
            .attach(&TargetId::new(target), &harness.channel)
            .await
            .unwrap();
        assert!(matches!(harness.next_event(), Some(Event::Attached { .. })));
        harness.transport.reset();
        harness
    }

    fn next_event(&mut self) -> Option<Event> {
        match self.events.try_recv() {
            Ok(ServerMessage::Event(event)) => Some(event),
            _ => None,
        }
    }

    async fn browser_event(&mut self, method: &str, session: Option<&str>, params: Value) {
        let message: EventMessage = serde_json::from_value(json!({
            "method": method,
            "params": params,
            "sessionId": session,
        }))
        .unwrap();
        self.interceptor
            .handle_transport_event(TransportEvent::Event(message))
            .await;
    }

    async fn pause_request(&mut self, target: &str, id: &str) {
        self.browser_event(
            "Fetch.requestPaused",
            Some(&format!("S-{}", target)),
            json!({
                "requestId": id,
                "request": {
                    "url": format!("https://example.com/{}", id),
                    "method": "GET",
                    "headers": { "Accept": "*/*" }
                },
                "resourceType": "XHR",
                "networkId": format!("net-{}", id)
            }),
        )
        .await;
    }

    async fn pause_response(&mut self, target: &str, id: &str) {
        self.browser_event(
            "Fetch.requestPaused",
            Some(&format!("S-{}", target)),
            json!({
                "requestId": id,
                "request": { "url": "https://example.com/api", "method": "GET", "headers": {} },
                "resourceType": "Fetch",
                "responseStatusCode": 404,
                "responseHeaders": [
                    { "name": "Content-Type", "value": "application/json" },
                    { "name": "Set-Cookie", "value": "a=1" },
                    { "name": "Set-Cookie", "value": "b=2" }
                ]
            }),
        )
        .await;
    }
}

// === Session lifecycle ===

#[tokio::test]
async fn attach_enables_both_interception_stages() {
    let mut h = Harness::new();
    let registration = h
        .interceptor
        .attach(&TargetId::new("T1"), &h.channel)
        .await
        .unwrap();
    assert_eq!(registration, Registration::Registered);

    assert_eq!(
        h.transport.methods(),
        vec!["Target.attachToTarget", "Network.enable", "Fetch.enable"]
    );
    let calls = h.transport.calls();
    assert_eq!(calls[0].params, json!({ "targetId": "T1", "flatten": true }));
    assert_eq!(calls[1].target, CommandTarget::Session("S-T1".to_string()));
    assert_eq!(
        calls[2].params,
        json!({ "patterns": [
            { "urlPattern": "*", "requestStage": "Request" },
            { "urlPattern": "*", "requestStage": "Response" }
        ]})
    );
    assert!(matches!(h.next_event(), Some(Event::Attached { .. })));
}

#[tokio::test]
async fn second_attach_acknowledges_without_new_session() {
    let mut h = Harness::attached("T1").await;

    let registration = h
        .interceptor
        .attach(&TargetId::new("T1"), &h.channel)
        .await
        .unwrap();

    assert_eq!(registration, Registration::AlreadyAttached);
    assert!(h.transport.calls().is_empty());
    assert_eq!(h.interceptor.registry().len(), 1);
    assert!(matches!(h.next_event(), Some(Event::Attached { .. })));
}

#[tokio::test]
async fn rejected_attach_reports_failure() {
    let mut h = Harness::new();
    h.transport
        .fail("Target.attachToTarget", "Another debugger is already attached");

    let err = h
        .interceptor
        .attach(&TargetId::new("T1"), &h.channel)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::AttachFailed { .. }));
    assert!(h.interceptor.registry().is_empty());
    match h.next_event() {
        Some(Event::AttachFailed { target, error }) => {
            assert_eq!(target.as_str(), "T1");
            assert!(error.contains("Another debugger"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn failed_enable_detaches_half_open_session() {
    let mut h = Harness::new();
    h.transport.fail("Fetch.enable", "Fetch domain unavailable");

    assert!(h
        .interceptor
        .attach(&TargetId::new("T1"), &h.channel)
        .await
        .is_err());

    let detaches = h.transport.calls_to("Target.detachFromTarget");
    assert_eq!(detaches.len(), 1);
    assert_eq!(detaches[0].params, json!({ "sessionId": "S-T1" }));
    assert!(h.interceptor.registry().is_empty());
}

#[tokio::test]
async fn undeliverable_attach_ack_tears_down_session() {
    let transport = Arc::new(MockTransport::default());
    let mut interceptor = Interceptor::new(transport.clone());
    let (channel, events) = OutputChannel::new(ChannelId(7));
    drop(events);

    interceptor
        .attach(&TargetId::new("T1"), &channel)
        .await
        .unwrap();

    assert!(interceptor.registry().is_empty());
    assert_eq!(transport.calls_to("Target.detachFromTarget").len(), 1);
}

#[tokio::test]
async fn explicit_detach_purges_and_notifies() {
    let mut h = Harness::attached("T1").await;
    h.pause_request("T1", "a").await;
    h.next_event();

    assert!(h.interceptor.detach(&TargetId::new("T1"), &h.channel).await);

    assert!(h.interceptor.store().is_empty());
    assert_eq!(h.transport.methods(), vec!["Target.detachFromTarget"]);
    assert_eq!(
        h.next_event(),
        Some(Event::Detached {
            target: TargetId::new("T1"),
            reason: DetachReason::Requested,
        })
    );

    // detaching again is harmless
    assert!(!h.interceptor.detach(&TargetId::new("T1"), &h.channel).await);
}

#[tokio::test]
async fn involuntary_detach_purges_without_resuming() {
    let mut h = Harness::attached("T1").await;
    h.pause_request("T1", "a").await;
    h.pause_response("T1", "b").await;
    h.next_event();
    h.next_event();
    assert_eq!(h.interceptor.store().len(), 2);

    h.browser_event(
        "Target.detachedFromTarget",
        None,
        json!({ "sessionId": "S-T1", "targetId": "T1" }),
    )
    .await;

    assert!(h.interceptor.store().is_empty());
    assert!(h.interceptor.registry().is_empty());
    // no resume and no detach for a session that is already gone
    assert!(h.transport.calls().is_empty());
    assert_eq!(
        h.next_event(),
        Some(Event::Detached {
            target: TargetId::new("T1"),
            reason: DetachReason::TargetClosed,
        })
    );
}

#[tokio::test]
async fn browser_ended_session_is_not_detached_again() {
    let mut h = Harness::attached("T1").await;
    h.pause_request("T1", "a").await;
    h.next_event();

    h.interceptor
        .handle_protocol_event(ProtocolEvent::Detached {
            target: TargetId::new("T1"),
            reason: DetachReason::TargetClosed,
        })
        .await;

    assert!(h.interceptor.registry().is_empty());
    assert!(h.interceptor.store().is_empty());
    assert!(h.transport.calls_to("Target.detachFromTarget").is_empty());
}

#[tokio::test]
async fn inspector_detached_maps_reason() {
    let mut h = Harness::attached("T1").await;

    h.browser_event(
        "Inspector.detached",
        Some("S-T1"),
        json!({ "reason": "replaced_with_devtools" }),
    )
    .await;

    assert!(h.interceptor.registry().is_empty());
    assert!(matches!(
        h.next_event(),
        Some(Event::Detached {
            reason: DetachReason::ReplacedWithDevtools,
            ..
        })
    ));
}

#[tokio::test]
async fn closed_transport_ends_every_session() {
    let mut h = Harness::attached("T1").await;
    h.interceptor
        .attach(&TargetId::new("T2"), &h.channel)
        .await
        .unwrap();
    h.next_event();
    h.pause_request("T2", "x").await;
    h.next_event();
    h.transport.reset();

    h.interceptor
        .handle_transport_event(TransportEvent::Closed)
        .await;

    assert!(h.interceptor.registry().is_empty());
    assert!(h.interceptor.store().is_empty());
    assert!(h.transport.calls().is_empty());
    for _ in 0..2 {
        assert!(matches!(
            h.next_event(),
            Some(Event::Detached {
                reason: DetachReason::BrowserDisconnected,
                ..
            })
        ));
    }
}

#[tokio::test]
async fn closed_channel_releases_its_sessions() {
    let mut h = Harness::attached("T1").await;
    let (other, _other_events) = OutputChannel::new(ChannelId(2));
    h.interceptor
        .attach(&TargetId::new("T2"), &other)
        .await
        .unwrap();
    h.transport.reset();

    h.interceptor.channel_closed(ChannelId(1)).await;

    assert!(!h.interceptor.registry().contains(&TargetId::new("T1")));
    assert!(h.interceptor.registry().contains(&TargetId::new("T2")));
    let detaches = h.transport.calls_to("Target.detachFromTarget");
    assert_eq!(detaches.len(), 1);
    assert_eq!(detaches[0].params, json!({ "sessionId": "S-T1" }));
}

// === Pauses ===

#[tokio::test]
async fn request_pause_with_empty_headers() {
    let mut h = Harness::attached("T1").await;
    h.browser_event(
        "Fetch.requestPaused",
        Some("S-T1"),
        json!({
            "requestId": "a",
            "request": { "url": "https://example.com/", "method": "GET", "headers": {} },
            "resourceType": "Document"
        }),
    )
    .await;

    match h.next_event() {
        Some(Event::RequestIntercepted(request)) => {
            assert_eq!(request.target.as_str(), "T1");
            assert!(request.headers.is_empty());
            assert!(request.headers_list.is_empty());
            assert_eq!(serde_json::to_value(&request).unwrap()["headers"], json!({}));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(h.interceptor.store().len(), 1);
}

#[tokio::test]
async fn request_pause_with_malformed_headers_degrades_to_empty() {
    let mut h = Harness::attached("T1").await;
    h.browser_event(
        "Fetch.requestPaused",
        Some("S-T1"),
        json!({
            "requestId": "a",
            "request": { "url": "https://example.com/", "method": "GET", "headers": "garbage" }
        }),
    )
    .await;

    match h.next_event() {
        Some(Event::RequestIntercepted(request)) => {
            let wire = serde_json::to_value(&request).unwrap();
            assert_eq!(wire["headers"], json!({}));
            assert_eq!(wire["headers_list"], json!([]));
        }
        other => panic!("unexpected event {:?}", other),
    }
    assert_eq!(h.interceptor.store().len(), 1);
}

#[tokio::test]
async fn response_pause_keeps_duplicate_headers() {
    let mut h = Harness::attached("T1").await;
    h.pause_response("T1", "b").await;

    match h.next_event() {
        Some(Event::ResponseIntercepted(response)) => {
            assert_eq!(response.status, 404);
            assert_eq!(response.status_text, "Not Found");
            assert_eq!(response.headers.len(), 3);
            assert_eq!(response.resource_category, "Fetch");
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn later_pause_replaces_stored_exchange() {
    let mut h = Harness::attached("T1").await;
    h.pause_request("T1", "a").await;
    h.pause_response("T1", "a").await;

    assert_eq!(h.interceptor.store().len(), 1);
    let status = h.interceptor.status();
    assert_eq!(status.pending[0].direction, "response");
    assert_eq!(status.pending[0].status, Some(404));
}

#[tokio::test]
async fn events_for_unknown_sessions_are_ignored() {
    let mut h = Harness::attached("T1").await;
    h.pause_request("T9", "z").await;
    assert!(h.next_event().is_none());
    assert!(h.interceptor.store().is_empty());
}

// === Resolution ===

#[tokio::test]
async fn continue_with_method_only_sends_method() {
    let mut h = Harness::attached("T1").await;
    h.pause_request("T1", "a").await;

    let patch = RequestPatch {
        method: Some("POST".to_string()),
        ..Default::default()
    };
    let resolution = h
        .interceptor
        .continue_request(&ExchangeId::new("a"), Some(&patch))
        .await;

    assert_eq!(resolution, Resolution::Dispatched);
    let calls = h.transport.calls_to("Fetch.continueRequest");
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].target, CommandTarget::Session("S-T1".to_string()));
    assert_eq!(calls[0].params, json!({ "requestId": "a", "method": "POST" }));
    assert!(h.interceptor.store().is_empty());
}

#[tokio::test]
async fn exchange_is_resolved_exactly_once() {
    let mut h = Harness::attached("T1").await;
    h.pause_request("T1", "a").await;

    assert_eq!(
        h.interceptor.continue_request(&ExchangeId::new("a"), None).await,
        Resolution::Dispatched
    );
    assert_eq!(
        h.interceptor.block(&ExchangeId::new("a")).await,
        Resolution::UnknownExchange
    );
    assert_eq!(h.transport.methods(), vec!["Fetch.continueRequest"]);
    assert_eq!(
        h.transport.calls()[0].params,
        json!({ "requestId": "a" })
    );
}

#[tokio::test]
async fn continue_response_without_patch_uses_captured_values() {
    let mut h = Harness::attached("T1").await;
    h.pause_response("T1", "b").await;

    let resolution = h
        .interceptor
        .continue_response(&ExchangeId::new("b"), None)
        .await;

    assert_eq!(resolution, Resolution::Dispatched);
    let calls = h.transport.calls_to("Fetch.fulfillRequest");
    assert_eq!(
        calls[0].params,
        json!({
            "requestId": "b",
            "responseCode": 404,
            "responseHeaders": [
                { "name": "Content-Type", "value": "application/json" },
                { "name": "Set-Cookie", "value": "a=1" },
                { "name": "Set-Cookie", "value": "b=2" }
            ]
        })
    );
}

#[tokio::test]
async fn late_response_metadata_feeds_fulfillment() {
    let mut h = Harness::attached("T1").await;
    h.pause_request("T1", "a").await;

    h.browser_event(
        "Network.responseReceived",
        Some("S-T1"),
        json!({
            "requestId": "net-a",
            "type": "XHR",
            "response": {
                "url": "https://example.com/a",
                "status": 304,
                "statusText": "Not Modified",
                "headers": { "ETag": "\"abc\"" }
            }
        }),
    )
    .await;
    // metadata never produces an interception event
    h.next_event();
    assert!(h.next_event().is_none());

    h.interceptor
        .continue_response(&ExchangeId::new("a"), None)
        .await;
    let calls = h.transport.calls_to("Fetch.fulfillRequest");
    assert_eq!(calls[0].params["responseCode"], json!(304));
    assert_eq!(
        calls[0].params["responseHeaders"],
        json!([{ "name": "ETag", "value": "\"abc\"" }])
    );
}

#[tokio::test]
async fn block_fails_request_as_blocked_by_client() {
    let mut h = Harness::attached("T1").await;
    h.pause_request("T1", "a").await;

    assert_eq!(
        h.interceptor.block(&ExchangeId::new("a")).await,
        Resolution::Dispatched
    );
    assert_eq!(
        h.transport.calls_to("Fetch.failRequest")[0].params,
        json!({ "requestId": "a", "errorReason": "BlockedByClient" })
    );
}

#[tokio::test]
async fn block_unknown_exchange_sends_nothing() {
    let mut h = Harness::attached("T1").await;
    assert_eq!(
        h.interceptor.block(&ExchangeId::new("missing")).await,
        Resolution::UnknownExchange
    );
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn exchange_unknown_to_browser_is_dropped_quietly() {
    let mut h = Harness::attached("T1").await;
    h.pause_request("T1", "a").await;
    h.transport.fail("Fetch.continueRequest", "Invalid InterceptionId.");

    assert_eq!(
        h.interceptor.continue_request(&ExchangeId::new("a"), None).await,
        Resolution::UnknownExchange
    );
    assert!(h.interceptor.store().is_empty());

    // a second attempt is a local no-op
    h.transport.reset();
    assert_eq!(
        h.interceptor.block(&ExchangeId::new("a")).await,
        Resolution::UnknownExchange
    );
    assert!(h.transport.calls().is_empty());
}

#[tokio::test]
async fn timed_out_resume_leaves_exchange_paused() {
    let mut h = Harness::attached("T1").await;
    h.pause_request("T1", "a").await;
    h.transport.time_out("Fetch.continueRequest");

    let resolution = h
        .interceptor
        .continue_request(&ExchangeId::new("a"), None)
        .await;
    assert!(matches!(resolution, Resolution::TransportFailed(_)));
    assert_eq!(h.interceptor.store().len(), 1);

    // a retry succeeds once the browser accepts it
    h.transport.succeed("Fetch.continueRequest");
    assert_eq!(
        h.interceptor.continue_request(&ExchangeId::new("a"), None).await,
        Resolution::Dispatched
    );
    assert!(h.interceptor.store().is_empty());
}

// === Bodies ===

#[tokio::test]
async fn fetch_body_falls_back_to_network_domain() {
    let mut h = Harness::attached("T1").await;
    h.pause_request("T1", "a").await;
    h.next_event();
    h.transport.fail("Fetch.getResponseBody", "Can only get response body on HeadersReceived pattern matched requests.");
    h.transport.answer(
        "Network.getResponseBody",
        json!({ "body": "aGVsbG8=", "base64Encoded": true }),
    );

    let body = h
        .interceptor
        .fetch_body(&TargetId::new("T1"), &ExchangeId::new("a"), &h.channel)
        .await;

    assert!(body.available);
    assert!(body.is_binary_encoded);
    assert_eq!(body.body, "aGVsbG8=");
    assert_eq!(
        h.transport.calls_to("Network.getResponseBody")[0].params,
        json!({ "requestId": "net-a" })
    );
    assert!(matches!(h.next_event(), Some(Event::BodyFetched(_))));
    // the store is untouched
    assert_eq!(h.interceptor.store().len(), 1);
}

#[tokio::test]
async fn fetch_body_not_available_sentinel() {
    let mut h = Harness::attached("T1").await;
    h.transport.fail("Fetch.getResponseBody", "No resource");
    h.transport.fail("Network.getResponseBody", "No resource");

    let body = h
        .interceptor
        .fetch_body(&TargetId::new("T1"), &ExchangeId::new("gone"), &h.channel)
        .await;

    assert!(!body.available);
    assert!(body.body.is_empty());
    match h.next_event() {
        Some(Event::BodyFetched(fetched)) => assert!(!fetched.available),
        other => panic!("unexpected event {:?}", other),
    }
}

// === Targets ===

#[tokio::test]
async fn list_targets_keeps_pages_only() {
    let h = Harness::new();
    h.transport.answer(
        "Target.getTargets",
        json!({ "targetInfos": [
            { "targetId": "P1", "type": "page", "title": "Example", "url": "https://example.com/", "attached": false },
            { "targetId": "W1", "type": "service_worker", "title": "sw", "url": "https://example.com/sw.js", "attached": false }
        ]}),
    );

    let targets = h.interceptor.list_targets().await.unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].target_id, "P1");
}
