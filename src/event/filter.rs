use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::Ops;

/// Subscription filter sent as the payload of a `SUB` frame
///
/// Only the fields that are set are serialized; the service treats missing
/// fields as "match anything". Server-specific keys go in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Operation tag to match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ops: Option<Ops>,
    /// Event code to match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u64>,
    /// Author public key (hex) to match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Tags that must be present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Vec<String>>>,
    /// Any other filter keys
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Filter {
    /// Empty filter matching every event
    pub fn new() -> Self {
        Self::default()
    }

    /// Match an operation tag
    pub fn ops(mut self, ops: impl Into<Ops>) -> Self {
        self.ops = Some(ops.into());
        self
    }

    /// Match an event code
    pub fn code(mut self, code: u64) -> Self {
        self.code = Some(code);
        self
    }

    /// Match an author
    pub fn user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Require a tag
    pub fn tag<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags
            .get_or_insert_with(Vec::new)
            .push(parts.into_iter().map(Into::into).collect());
        self
    }

    /// Set an arbitrary filter key
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Filter as a JSON value for the wire
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| Value::Object(Map::new()))
    }
}
