//! Envelope codec.
//!
//! Every socket frame is a JSON array of exactly five elements:
//!
//! ```json
//! [joinRef, ref, topic, event, payload]
//! ```
//!
//! `joinRef` and `ref` are strings or `null`. A `null` join ref decodes to
//! `None`; a `null` ref decodes to the empty string, which also means "no
//! reply expected" on the way out.
//!
//! # Replies
//!
//! A `phx_reply` payload has the shape `{"status": S, "response": R}`.
//! Decoding keeps only `{"status": S}` as the envelope payload and exposes
//! `R` separately through [`Envelope::response`]. Any other top-level reply
//! keys are discarded. A missing `response` decodes to `{}`.

// ============================================================================
// Imports
// ============================================================================

use serde::ser::{SerializeMap, SerializeTuple};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};

use super::event::{HEARTBEAT, PHOENIX_TOPIC, PHX_JOIN, PHX_LEAVE, PHX_REPLY, ReplyStatus};

// ============================================================================
// Constants
// ============================================================================

/// Number of elements in a wire frame.
const FRAME_ARITY: usize = 5;

// ============================================================================
// Envelope
// ============================================================================

/// One wire message exchanged over the socket.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Join operation this message belongs to, if any.
    pub join_ref: Option<String>,

    /// Correlation ref. Empty when no reply is expected.
    pub message_ref: String,

    /// Topic name, e.g. `predictions:stops`.
    pub topic: String,

    /// Event name, e.g. `phx_join` or `stream_data`.
    pub event: String,

    /// Event payload. For replies this holds only the `status` entry.
    pub payload: Value,

    /// Inner `response` of a reply. `None` for every other event.
    pub response: Option<Value>,
}

impl Envelope {
    /// Creates a non-reply envelope.
    #[must_use]
    pub fn new(
        join_ref: Option<String>,
        message_ref: impl Into<String>,
        topic: impl Into<String>,
        event: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self {
            join_ref,
            message_ref: message_ref.into(),
            topic: topic.into(),
            event: event.into(),
            payload,
            response: None,
        }
    }

    /// Creates a `phx_reply` envelope.
    #[must_use]
    pub fn reply(
        join_ref: Option<String>,
        message_ref: impl Into<String>,
        topic: impl Into<String>,
        status: ReplyStatus,
        response: Value,
    ) -> Self {
        let mut payload = Map::new();
        payload.insert("status".to_string(), Value::String(status.as_str().to_string()));

        Self {
            join_ref,
            message_ref: message_ref.into(),
            topic: topic.into(),
            event: PHX_REPLY.to_string(),
            payload: Value::Object(payload),
            response: Some(response),
        }
    }

    /// Creates a join request. The join ref doubles as the message ref.
    #[must_use]
    pub fn join(topic: impl Into<String>, join_ref: impl Into<String>, payload: Value) -> Self {
        let join_ref = join_ref.into();
        Self::new(Some(join_ref.clone()), join_ref, topic, PHX_JOIN, payload)
    }

    /// Creates a leave request for an existing join.
    #[must_use]
    pub fn leave(
        topic: impl Into<String>,
        join_ref: impl Into<String>,
        message_ref: impl Into<String>,
    ) -> Self {
        Self::new(
            Some(join_ref.into()),
            message_ref,
            topic,
            PHX_LEAVE,
            empty_object(),
        )
    }

    /// Creates a heartbeat on the control topic.
    #[must_use]
    pub fn heartbeat(message_ref: impl Into<String>) -> Self {
        Self::new(None, message_ref, PHOENIX_TOPIC, HEARTBEAT, empty_object())
    }

    /// Returns `true` if this is a `phx_reply`.
    #[inline]
    #[must_use]
    pub fn is_reply(&self) -> bool {
        self.event == PHX_REPLY
    }

    /// Returns the reply status, if this is a reply carrying one.
    #[must_use]
    pub fn reply_status(&self) -> Option<ReplyStatus> {
        if !self.is_reply() {
            return None;
        }

        self.payload
            .get("status")
            .and_then(Value::as_str)
            .map(ReplyStatus::parse)
    }

    /// Returns the data carried by this envelope.
    ///
    /// For replies this is the inner `response`, otherwise the payload.
    #[inline]
    #[must_use]
    pub fn data(&self) -> &Value {
        self.response.as_ref().unwrap_or(&self.payload)
    }

    /// Consumes the envelope and returns its carried data.
    #[inline]
    #[must_use]
    pub fn into_data(self) -> Value {
        self.response.unwrap_or(self.payload)
    }
}

// ============================================================================
// Envelope - Codec
// ============================================================================

impl Envelope {
    /// Encodes the envelope as wire text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Json`] if serialization fails.
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(Error::from)
    }

    /// Decodes wire text into an envelope.
    ///
    /// Unknown events decode fine; only the frame shape is checked.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the text is not JSON, not an array of
    /// exactly five elements, or an element has the wrong type.
    pub fn decode(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| Error::decode(format!("invalid JSON: {e}")))?;

        let Value::Array(parts) = value else {
            return Err(Error::decode("frame is not a JSON array"));
        };

        let [join_ref, message_ref, topic, event, payload]: [Value; FRAME_ARITY] =
            parts.try_into().map_err(|parts: Vec<Value>| {
                Error::decode(format!(
                    "expected {FRAME_ARITY} elements, got {}",
                    parts.len()
                ))
            })?;

        let join_ref = optional_ref(join_ref, "join_ref")?;
        let message_ref = optional_ref(message_ref, "ref")?.unwrap_or_default();
        let topic = required_string(topic, "topic")?;
        let event = required_string(event, "event")?;

        let payload = match payload {
            Value::Null => empty_object(),
            other => other,
        };

        if event == PHX_REPLY
            && let Value::Object(mut fields) = payload
        {
            let response = fields.remove("response").unwrap_or_else(empty_object);

            let mut status = Map::new();
            if let Some(value) = fields.remove("status") {
                status.insert("status".to_string(), value);
            }

            return Ok(Self {
                join_ref,
                message_ref,
                topic,
                event,
                payload: Value::Object(status),
                response: Some(response),
            });
        }

        Ok(Self {
            join_ref,
            message_ref,
            topic,
            event,
            payload,
            response: None,
        })
    }
}

impl Serialize for Envelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let message_ref = (!self.message_ref.is_empty()).then_some(self.message_ref.as_str());

        let mut frame = serializer.serialize_tuple(FRAME_ARITY)?;
        frame.serialize_element(&self.join_ref)?;
        frame.serialize_element(&message_ref)?;
        frame.serialize_element(&self.topic)?;
        frame.serialize_element(&self.event)?;
        match &self.response {
            Some(response) => frame.serialize_element(&ReplyPayload {
                status: &self.payload,
                response,
            })?,
            None => frame.serialize_element(&self.payload)?,
        }
        frame.end()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Re-wraps a decoded reply as `{..status, "response": R}`.
struct ReplyPayload<'a> {
    status: &'a Value,
    response: &'a Value,
}

impl Serialize for ReplyPayload<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        if let Some(fields) = self.status.as_object() {
            for (key, value) in fields.iter().filter(|(key, _)| *key != "response") {
                map.serialize_entry(key, value)?;
            }
        }
        map.serialize_entry("response", self.response)?;
        map.end()
    }
}

#[inline]
fn empty_object() -> Value {
    Value::Object(Map::new())
}

/// Decodes a ref slot. Servers send strings, but numeric refs are tolerated.
fn optional_ref(value: Value, field: &str) -> Result<Option<String>> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(Error::decode(format!(
            "{field} must be a string or null, got {other}"
        ))),
    }
}

fn required_string(value: Value, field: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(Error::decode(format!("{field} must be a string, got {other}"))),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_null_join_ref_decodes_to_none() {
        let envelope = Envelope::decode(r#"[null, "1", "t", "e", {}]"#).expect("decode");
        assert_eq!(envelope.join_ref, None);
        assert_eq!(envelope.message_ref, "1");
    }

    #[test]
    fn test_null_ref_decodes_to_empty_string() {
        let envelope = Envelope::decode(r#"[null, null, "t", "e", {}]"#).expect("decode");
        assert_eq!(envelope.message_ref, "");
        assert_ne!(envelope.message_ref, "null");
    }

    #[test]
    fn test_reply_unwrapping() {
        let envelope = Envelope::decode(
            r#"["0","0","predictions:stops","phx_reply",{"status":"ok","response":{}}]"#,
        )
        .expect("decode");

        assert_eq!(envelope.event, "phx_reply");
        assert_eq!(envelope.payload, json!({"status": "ok"}));
        assert_eq!(envelope.response, Some(json!({})));
        assert_eq!(envelope.reply_status(), Some(ReplyStatus::Ok));
        assert_eq!(envelope.data(), &json!({}));
    }

    #[test]
    fn test_reply_without_response_degrades_to_empty_object() {
        let envelope =
            Envelope::decode(r#"["3","3","alerts","phx_reply",{"status":"error"}]"#).expect("decode");
        assert_eq!(envelope.reply_status(), Some(ReplyStatus::Error));
        assert_eq!(envelope.response, Some(json!({})));
    }

    #[test]
    fn test_reply_extra_keys_are_discarded() {
        let envelope = Envelope::decode(
            r#"["1","1","alerts","phx_reply",{"status":"ok","response":{"a":1},"extra":true}]"#,
        )
        .expect("decode");
        assert_eq!(envelope.payload, json!({"status": "ok"}));
        assert_eq!(envelope.into_data(), json!({"a": 1}));
    }

    #[test]
    fn test_heartbeat_payload() {
        let envelope = Envelope::decode(r#"[null,"2","phoenix","heartbeat",{}]"#).expect("decode");
        assert_eq!(envelope.topic, PHOENIX_TOPIC);
        assert_eq!(envelope.payload, json!({}));
        assert_eq!(envelope.response, None);
    }

    #[test]
    fn test_null_payload_defaults_to_empty_object() {
        let envelope = Envelope::decode(r#"[null,"2","alerts","stream_data",null]"#).expect("decode");
        assert_eq!(envelope.payload, json!({}));
    }

    #[test]
    fn test_unknown_event_decodes() {
        let envelope =
            Envelope::decode(r#"["1",null,"alerts","something_new",{"x":1}]"#).expect("decode");
        assert_eq!(envelope.event, "something_new");
        assert_eq!(envelope.join_ref.as_deref(), Some("1"));
    }

    #[test]
    fn test_numeric_refs_are_tolerated() {
        let envelope = Envelope::decode(r#"[5, 6, "t", "e", {}]"#).expect("decode");
        assert_eq!(envelope.join_ref.as_deref(), Some("5"));
        assert_eq!(envelope.message_ref, "6");
    }

    #[test]
    fn test_wrong_arity_fails() {
        let err = Envelope::decode(r#"[null, "1", "t", "e"]"#).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));

        let err = Envelope::decode(r#"[null, "1", "t", "e", {}, 7]"#).unwrap_err();
        assert!(matches!(err, Error::Decode { .. }));
    }

    #[test]
    fn test_non_array_fails() {
        assert!(matches!(
            Envelope::decode(r#"{"topic": "t"}"#),
            Err(Error::Decode { .. })
        ));
        assert!(matches!(Envelope::decode("not json"), Err(Error::Decode { .. })));
    }

    #[test]
    fn test_non_string_topic_fails() {
        assert!(matches!(
            Envelope::decode(r#"[null, "1", 4, "e", {}]"#),
            Err(Error::Decode { .. })
        ));
    }

    #[test]
    fn test_encode_join() {
        let envelope = Envelope::join("predictions:stops", "3", json!({"stop_ids": ["1", "2"]}));
        let text = envelope.encode().expect("encode");
        assert_eq!(
            text,
            r#"["3","3","predictions:stops","phx_join",{"stop_ids":["1","2"]}]"#
        );
    }

    #[test]
    fn test_encode_empty_ref_as_null() {
        let envelope = Envelope::new(None, "", "t", "e", json!({}));
        assert_eq!(envelope.encode().expect("encode"), r#"[null,null,"t","e",{}]"#);
    }

    #[test]
    fn test_encode_reply_rewraps_response() {
        let envelope = Envelope::reply(
            Some("1".into()),
            "1",
            "alerts",
            ReplyStatus::Ok,
            json!({"alerts": {}}),
        );
        let text = envelope.encode().expect("encode");
        assert_eq!(
            text,
            r#"["1","1","alerts","phx_reply",{"status":"ok","response":{"alerts":{}}}]"#
        );
    }

    #[test]
    fn test_heartbeat_constructor() {
        let text = Envelope::heartbeat("9").encode().expect("encode");
        assert_eq!(text, r#"[null,"9","phoenix","heartbeat",{}]"#);
    }

    fn json_leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i32>().prop_map(|n| json!(n)),
            "[a-z0-9 ]{0,8}".prop_map(Value::String),
        ]
    }

    fn json_object() -> impl Strategy<Value = Value> {
        prop::collection::btree_map("[a-z_]{1,6}", json_leaf(), 0..4)
            .prop_map(|fields| Value::Object(fields.into_iter().collect()))
    }

    fn ref_slot() -> impl Strategy<Value = Value> {
        prop_oneof![Just(Value::Null), "[0-9]{1,3}".prop_map(Value::String)]
    }

    fn wire_frame() -> impl Strategy<Value = String> {
        let event = prop_oneof![
            Just(PHX_REPLY.to_string()),
            Just(PHX_JOIN.to_string()),
            Just("stream_data".to_string()),
        ];
        let payload = prop_oneof![
            json_object(),
            (json_object(), prop_oneof![Just("ok"), Just("error")]).prop_map(
                |(response, status)| json!({"status": status, "response": response})
            ),
        ];

        (ref_slot(), ref_slot(), "[a-z:]{1,12}", event, payload).prop_map(
            |(join_ref, message_ref, topic, event, payload)| {
                json!([join_ref, message_ref, topic, event, payload]).to_string()
            },
        )
    }

    proptest! {
        #[test]
        fn test_decode_encode_round_trip(frame in wire_frame()) {
            let decoded = Envelope::decode(&frame).expect("decode");
            let encoded = decoded.encode().expect("encode");
            let redecoded = Envelope::decode(&encoded).expect("re-decode");
            prop_assert_eq!(redecoded, decoded);
        }
    }
}
