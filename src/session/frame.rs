//! Wire frames
//!
//! Every message is a compact JSON array `[kind, id, payload, ...]`:
//!
//! ```text
//! client -> service   ["PUB",   "r0-1700000000000", {event}]
//!                     ["SUB",   "r1-1700000000000", {filter}]
//!                     ["UNSUB", "r1-1700000000000", {}]
//! service -> client   [kind, id, payload, ...]   payload "EOSE" ends stored events
//! ```

use serde_json::{Map, Value};

use super::error::{SessionError, SessionResult};
use crate::event::Event;

/// Payload marking the end of stored events on a subscription
pub const EOSE: &str = "EOSE";

/// Kind of an outbound request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Publish an event
    Publish,
    /// Open a subscription
    Subscribe,
    /// Close a subscription
    Unsubscribe,
}

impl RequestKind {
    /// Wire name
    pub fn as_str(self) -> &'static str {
        match self {
            RequestKind::Publish => "PUB",
            RequestKind::Subscribe => "SUB",
            RequestKind::Unsubscribe => "UNSUB",
        }
    }
}

/// An outbound request frame
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    /// Request kind
    pub kind: RequestKind,
    /// Correlation id
    pub id: String,
    /// Event, filter or empty object
    pub payload: Value,
}

impl Request {
    /// `PUB` carrying a signed event
    pub fn publish(id: impl Into<String>, event: &Event) -> SessionResult<Self> {
        Ok(Request {
            kind: RequestKind::Publish,
            id: id.into(),
            payload: serde_json::to_value(event)?,
        })
    }

    /// `SUB` carrying a filter
    pub fn subscribe(id: impl Into<String>, filter: Value) -> Self {
        Request {
            kind: RequestKind::Subscribe,
            id: id.into(),
            payload: filter,
        }
    }

    /// `UNSUB` with an empty payload
    pub fn unsubscribe(id: impl Into<String>) -> Self {
        Request {
            kind: RequestKind::Unsubscribe,
            id: id.into(),
            payload: Value::Object(Map::new()),
        }
    }

    /// Compact JSON text
    pub fn encode(&self) -> String {
        Value::Array(vec![
            Value::String(self.kind.as_str().to_string()),
            Value::String(self.id.clone()),
            self.payload.clone(),
        ])
        .to_string()
    }
}

/// A frame received from the service
#[derive(Debug, Clone, PartialEq)]
pub struct InboundFrame {
    /// First element, e.g. `EVENT` or `OK`
    pub kind: String,
    /// Correlation id of the request this answers
    pub id: String,
    /// Third element
    pub payload: Value,
    /// Any elements after the payload
    pub extra: Vec<Value>,
}

impl InboundFrame {
    /// Parse frame text
    pub fn parse(text: &str) -> SessionResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| SessionError::MalformedFrame(e.to_string()))?;

        let Value::Array(items) = value else {
            return Err(SessionError::MalformedFrame("not an array".to_string()));
        };
        if items.len() < 3 {
            return Err(SessionError::MalformedFrame(format!(
                "expected at least 3 elements, got {}",
                items.len()
            )));
        }

        let mut items = items.into_iter();
        let kind = match items.next() {
            Some(Value::String(kind)) => kind,
            _ => return Err(SessionError::MalformedFrame("kind is not a string".to_string())),
        };
        let id = match items.next() {
            Some(Value::String(id)) => id,
            _ => return Err(SessionError::MalformedFrame("id is not a string".to_string())),
        };
        let payload = items.next().unwrap_or(Value::Null);

        Ok(InboundFrame {
            kind,
            id,
            payload,
            extra: items.collect(),
        })
    }

    /// Whether this frame ends the stored events of a subscription
    pub fn is_eose(&self) -> bool {
        self.payload.as_str() == Some(EOSE)
    }

    /// Payload as an event, if it is one
    pub fn event(&self) -> Option<Event> {
        if !self.payload.is_object() {
            return None;
        }
        serde_json::from_value(self.payload.clone()).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Ops;
    use serde_json::json;

    #[test]
    fn test_encode_requests() {
        let sub = Request::subscribe("r1-5", json!({"code": 100}));
        assert_eq!(sub.encode(), r#"["SUB","r1-5",{"code":100}]"#);

        let unsub = Request::unsubscribe("r1-5");
        assert_eq!(unsub.encode(), r#"["UNSUB","r1-5",{}]"#);

        let event = Event::new(Ops::Create, 1).with_created_at(2);
        let publish = Request::publish("r0-5", &event).unwrap();
        let sent: Value = serde_json::from_str(&publish.encode()).unwrap();
        assert_eq!(sent, json!(["PUB", "r0-5", {"ops": "C", "code": 1, "created_at": 2}]));
    }

    #[test]
    fn test_parse_inbound() {
        let frame = InboundFrame::parse(r#"["OK","r0-5",true,"stored"]"#).unwrap();
        assert_eq!(frame.kind, "OK");
        assert_eq!(frame.id, "r0-5");
        assert_eq!(frame.payload, json!(true));
        assert_eq!(frame.extra, vec![json!("stored")]);
        assert!(!frame.is_eose());
    }

    #[test]
    fn test_parse_eose_and_event() {
        let eose = InboundFrame::parse(r#"["EVENT","r1-5","EOSE"]"#).unwrap();
        assert!(eose.is_eose());
        assert!(eose.event().is_none());

        let event = InboundFrame::parse(r#"["EVENT","r1-5",{"ops":"C","code":7}]"#).unwrap();
        assert_eq!(event.event().map(|e| e.code), Some(7));
    }

    #[test]
    fn test_parse_malformed() {
        for text in ["not json", "{}", r#"["A","b"]"#, r#"["A",5,{}]"#, r#"[1,"b",{}]"#] {
            assert!(
                matches!(InboundFrame::parse(text), Err(SessionError::MalformedFrame(_))),
                "accepted {}",
                text
            );
        }
    }
}
