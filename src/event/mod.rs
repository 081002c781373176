//! Signed events
//!
//! An [`Event`] is the unit exchanged with the service. Signing is done by
//! [`sign`], which returns a new event carrying:
//! - `id`: lowercase hex SHA-256 of the canonical serialization of every
//!   other field
//! - `sig`: a BIP-340 Schnorr signature over that digest
//!
//! # Example
//!
//! ```rust
//! use es_client::event::{self, Event, Ops};
//! use es_client::KeyPair;
//! use serde_json::json;
//!
//! let keys = KeyPair::generate();
//! let unsigned = Event::new(Ops::Create, 100).with_data(json!({"email": "a@b.com"}));
//!
//! let signed = event::sign(&unsigned, &keys).unwrap();
//! assert!(event::verify(&signed, &keys.public_key().to_hex()));
//! ```

pub mod auth;
pub mod canonical;
mod filter;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::de::{Deserializer, Error as _, MapAccess, Visitor};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

use crate::crypto::CryptoError;

pub use auth::{event_id, sign, verify, verify_author};
pub use canonical::{canonical_bytes, canonicalize};
pub use filter::Filter;

/// Errors from building or signing events
#[derive(Error, Debug)]
pub enum EventError {
    /// The event could not be turned into JSON
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Key handling or signing failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The event already carries `id`/`sig` and may not be changed
    #[error("Event is already signed")]
    AlreadySigned,

    /// The event names a different author than the signing key
    #[error("Event user {user} does not match signing key {signer}")]
    UserMismatch {
        /// `user` field of the event
        user: String,
        /// Public key of the signer
        signer: String,
    },
}

/// Result type for event operations
pub type EventResult<T> = Result<T, EventError>;

/// Operation tag of an event
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Ops {
    /// `C`
    Create,
    /// `R`
    Read,
    /// `U`
    Update,
    /// `D`
    Delete,
    /// Any other tag, kept verbatim
    Other(String),
}

impl Ops {
    /// Wire form of the tag
    pub fn as_str(&self) -> &str {
        match self {
            Ops::Create => "C",
            Ops::Read => "R",
            Ops::Update => "U",
            Ops::Delete => "D",
            Ops::Other(tag) => tag,
        }
    }
}

impl From<String> for Ops {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "C" => Ops::Create,
            "R" => Ops::Read,
            "U" => Ops::Update,
            "D" => Ops::Delete,
            _ => Ops::Other(tag),
        }
    }
}

impl From<&str> for Ops {
    fn from(tag: &str) -> Self {
        Ops::from(tag.to_string())
    }
}

impl From<Ops> for String {
    fn from(ops: Ops) -> Self {
        ops.as_str().to_string()
    }
}

impl std::fmt::Display for Ops {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An indexing tag: an ordered tuple of strings such as `["t", "blog"]`
///
/// Tags are stored verbatim so uncommon or custom tags are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag(pub Vec<String>);

impl Tag {
    /// Build a tag from its parts
    pub fn new<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Tag(parts.into_iter().map(Into::into).collect())
    }

    /// First element, conventionally the tag name
    pub fn name(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Second element, conventionally the tag value
    pub fn value(&self) -> Option<&str> {
        self.0.get(1).map(String::as_str)
    }
}

/// An event as exchanged with the service
///
/// ```json
/// {
///   "ops": "C",
///   "code": 200,
///   "user": "f54659fe...",
///   "data": {"content": "hello"},
///   "tags": [["t", "blog"], ["d", "12345678"]],
///   "created_at": 1700000000,
///   "id": "6f64766a...",
///   "sig": "..."
/// }
/// ```
///
/// Absent optional fields are left out of the JSON entirely, which keeps the
/// canonical form identical to what other implementations hash. Unknown
/// top-level fields are kept in `extra` and take part in signing.
///
/// A received `null` for `user`, `data`, `tags` or `created_at` is not the
/// same as a missing field: it is hashed as `null`. Parsing keeps such nulls
/// in `extra`, and the `with_*` builders and [`sign`] clear them when they
/// fill the field. A top-level key that appears twice is rejected.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    /// Operation tag
    pub ops: Ops,
    /// Numeric subtype
    pub code: u64,
    /// Author public key (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Application payload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// Indexing tags
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,
    /// Unix timestamp in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
    /// Content identifier (hex SHA-256)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Schnorr signature over `id` (hex)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sig: Option<String>,
    /// Any other top-level fields, plus explicit nulls of optional ones
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Event {
    /// Create an unsigned event
    pub fn new(ops: impl Into<Ops>, code: u64) -> Self {
        Event {
            ops: ops.into(),
            code,
            user: None,
            data: None,
            tags: None,
            created_at: None,
            id: None,
            sig: None,
            extra: Map::new(),
        }
    }

    /// Set the author public key (hex)
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.extra.remove("user");
        self.user = Some(user.into());
        self
    }

    /// Set the application payload
    pub fn with_data(mut self, data: Value) -> Self {
        self.extra.remove("data");
        self.data = Some(data);
        self
    }

    /// Append a tag
    pub fn with_tag<I, S>(mut self, parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra.remove("tags");
        self.tags.get_or_insert_with(Vec::new).push(Tag::new(parts));
        self
    }

    /// Pin the creation timestamp
    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.extra.remove("created_at");
        self.created_at = Some(created_at);
        self
    }

    /// Attach a file to `data` as `fileName` / base64 `fileData`
    ///
    /// Must happen before signing so the attachment is covered by `sig`.
    pub fn with_attachment(mut self, file_name: &str, contents: &[u8]) -> EventResult<Self> {
        if self.id.is_some() || self.sig.is_some() {
            return Err(EventError::AlreadySigned);
        }

        self.extra.remove("data");
        let data = self.data.get_or_insert_with(|| Value::Object(Map::new()));
        if !data.is_object() {
            let previous = std::mem::take(data);
            let mut map = Map::new();
            map.insert("value".to_string(), previous);
            *data = Value::Object(map);
        }
        if let Value::Object(map) = data {
            map.insert("fileName".to_string(), Value::String(file_name.to_string()));
            map.insert("fileData".to_string(), Value::String(BASE64.encode(contents)));
        }

        Ok(self)
    }

    /// Whether both `id` and `sig` are present
    pub fn is_signed(&self) -> bool {
        self.id.is_some() && self.sig.is_some()
    }

    /// Copy of this event without `id` and `sig`
    pub fn unsigned(&self) -> Event {
        Event {
            id: None,
            sig: None,
            ..self.clone()
        }
    }

    /// Iterate over tags with the given name
    pub fn tags_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Tag> + 'a {
        self.tags
            .iter()
            .flatten()
            .filter(move |tag| tag.name() == Some(name))
    }
}

/// Optional fields whose explicit `null` is part of the signed content
const NULLABLE_FIELDS: [&str; 4] = ["user", "data", "tags", "created_at"];

/// Typed view of an event object, once explicit nulls are set aside
#[derive(Deserialize)]
struct EventFields {
    ops: Ops,
    code: u64,
    #[serde(default)]
    user: Option<String>,
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    tags: Option<Vec<Tag>>,
    #[serde(default)]
    created_at: Option<u64>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    sig: Option<String>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

/// Collects a JSON object, failing on repeated keys
struct UniqueKeys;

impl<'de> Visitor<'de> for UniqueKeys {
    type Value = Map<String, Value>;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an event object")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut object = Map::new();
        while let Some((key, value)) = access.next_entry::<String, Value>()? {
            if object.contains_key(&key) {
                return Err(A::Error::custom(format_args!("duplicate field `{}`", key)));
            }
            object.insert(key, value);
        }
        Ok(object)
    }
}

impl<'de> Deserialize<'de> for Event {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let mut object = deserializer.deserialize_map(UniqueKeys)?;

        let mut nulls = Map::new();
        for field in NULLABLE_FIELDS {
            if object.get(field) == Some(&Value::Null) {
                object.remove(field);
                nulls.insert(field.to_string(), Value::Null);
            }
        }

        let fields: EventFields =
            serde_json::from_value(Value::Object(object)).map_err(D::Error::custom)?;
        let mut extra = fields.extra;
        extra.extend(nulls);

        Ok(Event {
            ops: fields.ops,
            code: fields.code,
            user: fields.user,
            data: fields.data,
            tags: fields.tags,
            created_at: fields.created_at,
            id: fields.id,
            sig: fields.sig,
            extra,
        })
    }
}

/// Get current Unix timestamp
pub(crate) fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
