//! CDP wire codec
//!
//! CDP messages are JSON objects carried one per WebSocket text frame:
//! ```text
//! --> {"id":1,"method":"Fetch.enable","params":{...},"sessionId":"..."}
//! <-- {"id":1,"result":{},"sessionId":"..."}
//! <-- {"method":"Fetch.requestPaused","params":{...},"sessionId":"..."}
//! ```
//! Responses carry an `id`, events carry a `method` and no `id`.

use serde_json::Value;

use crate::common::Error;

use super::types::{CommandMessage, EventMessage, IncomingMessage, ResponseMessage};

/// Encode a command into the JSON text of one WebSocket frame
pub fn encode_command(
    id: u64,
    method: &str,
    params: &Value,
    session_id: Option<&str>,
) -> Result<String, Error> {
    let message = CommandMessage {
        id,
        method,
        params,
        session_id,
    };
    Ok(serde_json::to_string(&message)?)
}

/// Decode the JSON text of one WebSocket frame
pub fn decode_message(text: &str) -> Result<IncomingMessage, Error> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| Error::CdpProtocol(format!("Invalid JSON: {}", e)))?;

    if value.get("id").is_some() {
        let response: ResponseMessage = serde_json::from_value(value)
            .map_err(|e| Error::CdpProtocol(format!("Invalid response: {}", e)))?;
        return Ok(IncomingMessage::Response(response));
    }

    if value.get("method").is_some() {
        let event: EventMessage = serde_json::from_value(value)
            .map_err(|e| Error::CdpProtocol(format!("Invalid event: {}", e)))?;
        return Ok(IncomingMessage::Event(event));
    }

    Err(Error::CdpProtocol(
        "Message has neither 'id' nor 'method'".to_string(),
    ))
}

impl ResponseMessage {
    /// Convert into the command result, mapping protocol errors
    pub fn into_result(self, method: &str) -> Result<Value, Error> {
        if let Some(error) = self.error {
            let message = match error.data {
                Some(data) => format!("{} ({})", error.message, data),
                None => error.message,
            };
            return Err(Error::cdp_request_failed(method, &message));
        }
        Ok(self.result.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_browser_command() {
        let text = encode_command(1, "Target.getTargets", &json!({}), None).unwrap();
        assert_eq!(text, r#"{"id":1,"method":"Target.getTargets","params":{}}"#);
    }

    #[test]
    fn test_encode_session_command() {
        let text = encode_command(
            7,
            "Fetch.failRequest",
            &json!({ "requestId": "r1", "errorReason": "BlockedByClient" }),
            Some("S1"),
        )
        .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["sessionId"], "S1");
        assert_eq!(value["params"]["errorReason"], "BlockedByClient");
    }

    #[test]
    fn test_decode_response() {
        let msg = decode_message(r#"{"id":3,"result":{"sessionId":"S9"}}"#).unwrap();
        match msg {
            IncomingMessage::Response(r) => {
                assert_eq!(r.id, 3);
                let result = r.into_result("Target.attachToTarget").unwrap();
                assert_eq!(result["sessionId"], "S9");
            }
            other => panic!("expected response, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_error_response() {
        let msg = decode_message(
            r#"{"id":4,"error":{"code":-32602,"message":"Invalid InterceptionId."}}"#,
        )
        .unwrap();
        let IncomingMessage::Response(r) = msg else {
            panic!("expected response");
        };
        let err = r.into_result("Fetch.continueRequest").unwrap_err();
        assert!(err.to_string().contains("Invalid InterceptionId"));
    }

    #[test]
    fn test_decode_event_with_session() {
        let msg = decode_message(
            r#"{"method":"Fetch.requestPaused","params":{"requestId":"interception-1"},"sessionId":"S1"}"#,
        )
        .unwrap();
        let IncomingMessage::Event(e) = msg else {
            panic!("expected event");
        };
        assert_eq!(e.method, "Fetch.requestPaused");
        assert_eq!(e.session_id.as_deref(), Some("S1"));
    }

    #[test]
    fn test_decode_rejects_shapeless_message() {
        assert!(decode_message(r#"{"foo":1}"#).is_err());
        assert!(decode_message("not json").is_err());
    }
}
