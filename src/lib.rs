//! # es-client
//!
//! Client for a signed-event publish/subscribe service.
//!
//! ## Features
//!
//! - **Signed events** with canonical JSON, SHA-256 ids and BIP-340 Schnorr signatures
//! - **Human-friendly keys** as bech32 `esec1...` / `epub1...` text
//! - **One multiplexed connection** for concurrent publishes and subscriptions
//! - **Automatic reconnection** with replay of live subscriptions
//!
//! ## Quick Start
//!
//! ```rust
//! use es_client::event::{self, Event, Ops};
//! use es_client::KeyPair;
//! use serde_json::json;
//!
//! // Generate keys
//! let keys = KeyPair::generate();
//! println!("My public key: {}", keys.public_key().to_bech32().unwrap());
//!
//! // Sign an event
//! let unsigned = Event::new(Ops::Create, 100).with_data(json!({"email": "a@b.com"}));
//! let signed = event::sign(&unsigned, &keys).unwrap();
//!
//! // Anyone can verify
//! assert!(event::verify(&signed, &keys.public_key().to_hex()));
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │              APPLICATION LAYER              │
//! │              es-cli  |  your app            │
//! └─────────────────────┬───────────────────────┘
//!                       │
//! ┌─────────────────────▼───────────────────────┐
//! │               SESSION LAYER                 │
//! │  Connection state | Router | Reconnect      │
//! └──────────┬──────────────────────┬───────────┘
//!            │                      │
//! ┌──────────▼──────────┐ ┌─────────▼───────────┐
//! │     EVENT LAYER     │ │   TRANSPORT LAYER   │
//! │ Canonical | Sign    │ │ WebSocket | Memory  │
//! └──────────┬──────────┘ └─────────────────────┘
//!            │
//! ┌──────────▼──────────────────────────────────┐
//! │                CRYPTO LAYER                 │
//! │     secp256k1 Schnorr | SHA-256 | bech32    │
//! └─────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crypto;
pub mod event;
pub mod permissions;
pub mod session;
pub mod transport;

// Re-export main types at crate root
pub use crypto::{CryptoError, CryptoResult, KeyPair, PublicKey, SecretKey, SignatureBytes};
pub use event::{Event, EventError, Filter, Ops, Tag};
pub use permissions::{Permissions, Role};
pub use session::{ConnectionState, Session, SessionConfig, SessionError};
