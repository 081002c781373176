//! Event signing and verification

use tracing::debug;

use super::{canonicalize, current_timestamp, Event, EventError, EventResult};
use crate::crypto::{CryptoError, CryptoResult, Hash, KeyPair, PublicKey, SignatureBytes};

/// Content id of an event: hex SHA-256 of its canonical form without `id`/`sig`
pub fn event_id(event: &Event) -> EventResult<String> {
    let canonical = canonicalize(&event.unsigned())?;
    Ok(Hash::hash_hex(&canonical))
}

/// Sign an event, returning the signed copy
///
/// `created_at` is set to the current time and `user` to the signer's public
/// key when they are absent. Any previous `id`/`sig` are replaced. The input
/// is left untouched.
pub fn sign(event: &Event, keys: &KeyPair) -> EventResult<Event> {
    let signer = keys.public_key().to_hex();
    let mut signed = event.unsigned();

    match &signed.user {
        Some(user) if !user.eq_ignore_ascii_case(&signer) => {
            return Err(EventError::UserMismatch {
                user: user.clone(),
                signer,
            });
        }
        Some(_) => {}
        None => {
            signed.extra.remove("user");
            signed.user = Some(signer);
        }
    }
    if signed.created_at.is_none() {
        signed.extra.remove("created_at");
        signed.created_at = Some(current_timestamp());
    }

    let digest = Hash::hash(&canonicalize(&signed)?);
    let signature = keys.sign_digest(&digest)?;

    signed.id = Some(hex::encode(digest));
    signed.sig = Some(signature.to_hex());
    Ok(signed)
}

/// Verify an event against a public key given as hex or `epub1...` text
///
/// Returns false when `id`/`sig` are missing, the id does not match the
/// content, or the key or signature cannot be decoded.
pub fn verify(event: &Event, public_key: &str) -> bool {
    let (Some(id), Some(sig)) = (&event.id, &event.sig) else {
        return false;
    };

    match event_id(event) {
        Ok(expected) if expected == *id => {}
        Ok(_) => {
            debug!("Event id does not match content");
            return false;
        }
        Err(e) => {
            debug!("Could not canonicalize event: {}", e);
            return false;
        }
    }

    match check_signature(id, sig, public_key) {
        Ok(()) => true,
        Err(e) => {
            debug!("Signature rejected: {}", e);
            false
        }
    }
}

/// Verify an event against its own `user` field
pub fn verify_author(event: &Event) -> bool {
    match &event.user {
        Some(user) => verify(event, user),
        None => false,
    }
}

fn check_signature(id: &str, sig: &str, public_key: &str) -> CryptoResult<()> {
    let key = PublicKey::parse(public_key)?;
    let digest =
        Hash::from_hex(id).ok_or_else(|| CryptoError::InvalidHex(format!("event id {}", id)))?;
    let signature = SignatureBytes::from_hex(sig)?;
    key.verify(&digest, &signature)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::SecretKey;
    use crate::event::{Ops, Tag};
    use proptest::prelude::*;
    use serde_json::json;

    const SECRET_HEX: &str = "e2a90b45181b6b08d3d42ca785509b6e8cd0e12480324291de95f7d023abdf2c";
    const PUBLIC_HEX: &str = "f54659feff021a5437745019cceb2c09b9da8cc21dfb29ec25d774210d067fd3";
    const PUBLIC_TEXT: &str = "epub174r9nlhlqgd9gdm52qvue6evpxua4rxzrhajnmp96a6zzrgx0lfsdwtstf";
    const KNOWN_ID: &str = "6f64766a8350b2df4d81f068258905b4099a7c68412e95a75f7f614736f232dc";

    fn known_keys() -> KeyPair {
        KeyPair::from_secret(&SecretKey::from_hex(SECRET_HEX).unwrap()).unwrap()
    }

    fn known_event() -> Event {
        Event::new(Ops::Create, 100)
            .with_user(PUBLIC_HEX)
            .with_data(json!({"email": "a@b.com"}))
            .with_created_at(1_700_000_000)
    }

    #[test]
    fn test_known_canonical_form_and_id() {
        let canonical = canonicalize(&known_event()).unwrap();
        assert_eq!(
            String::from_utf8(canonical).unwrap(),
            format!(
                r#"{{"code":100,"created_at":1700000000,"data":{{"email":"a@b.com"}},"ops":"C","user":"{}"}}"#,
                PUBLIC_HEX
            )
        );
        assert_eq!(event_id(&known_event()).unwrap(), KNOWN_ID);
    }

    #[test]
    fn test_sign_known_event() {
        let keys = known_keys();
        let signed = sign(&known_event(), &keys).unwrap();

        assert_eq!(signed.id.as_deref(), Some(KNOWN_ID));

        let digest = Hash::from_hex(KNOWN_ID).unwrap();
        let expected_sig = keys.sign_digest(&digest).unwrap().to_hex();
        assert_eq!(signed.sig.as_deref(), Some(expected_sig.as_str()));

        assert!(verify(&signed, PUBLIC_HEX));
        assert!(verify(&signed, PUBLIC_TEXT));
        assert!(verify_author(&signed));
    }

    #[test]
    fn test_sign_is_pure() {
        let unsigned = known_event();
        let before = unsigned.clone();
        let _ = sign(&unsigned, &known_keys()).unwrap();
        assert_eq!(unsigned, before);
    }

    #[test]
    fn test_sign_fills_user_and_timestamp() {
        let keys = KeyPair::generate();
        let signed = sign(&Event::new(Ops::Create, 1), &keys).unwrap();

        assert_eq!(signed.user, Some(keys.public_key().to_hex()));
        assert!(signed.created_at.unwrap() > 1_600_000_000);
        assert!(verify_author(&signed));
    }

    #[test]
    fn test_sign_rejects_foreign_user() {
        let other = KeyPair::generate();
        let event = Event::new(Ops::Create, 1).with_user(other.public_key().to_hex());

        assert!(matches!(
            sign(&event, &known_keys()),
            Err(EventError::UserMismatch { .. })
        ));
    }

    #[test]
    fn test_resign_replaces_signature() {
        let keys = known_keys();
        let once = sign(&known_event(), &keys).unwrap();
        let twice = sign(&once, &keys).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_verify_wrong_key() {
        let signed = sign(&known_event(), &known_keys()).unwrap();
        let other = KeyPair::generate();
        assert!(!verify(&signed, &other.public_key().to_hex()));
    }

    #[test]
    fn test_verify_unsigned_is_false() {
        assert!(!verify(&known_event(), PUBLIC_HEX));
        assert!(!verify_author(&Event::new(Ops::Read, 1)));
    }

    #[test]
    fn test_verify_garbage_inputs() {
        let signed = sign(&known_event(), &known_keys()).unwrap();

        assert!(!verify(&signed, "not a key"));
        assert!(!verify(&signed, "epub1qqqqqq"));

        let mut bad_sig = signed.clone();
        bad_sig.sig = Some("zz".to_string());
        assert!(!verify(&bad_sig, PUBLIC_HEX));
    }

    #[test]
    fn test_tampering_detected() {
        let signed = sign(&known_event(), &known_keys()).unwrap();

        let mutations: Vec<Box<dyn Fn(&mut Event)>> = vec![
            Box::new(|e| e.ops = Ops::Delete),
            Box::new(|e| e.code = 101),
            Box::new(|e| e.data = Some(json!({"email": "x@b.com"}))),
            Box::new(|e| e.created_at = Some(1_700_000_001)),
            Box::new(|e| e.tags = Some(vec![Tag::new(["t", "x"])])),
            Box::new(|e| {
                e.extra.insert("note".to_string(), json!(1));
            }),
            Box::new(|e| {
                let mut sig = e.sig.take().unwrap();
                let flipped = if sig.starts_with('0') { "1" } else { "0" };
                sig.replace_range(0..1, flipped);
                e.sig = Some(sig);
            }),
        ];

        for mutate in mutations {
            let mut tampered = signed.clone();
            mutate(&mut tampered);
            assert!(!verify(&tampered, PUBLIC_HEX));
        }
    }

    #[test]
    fn test_received_json_verifies() {
        let signed = sign(&known_event(), &known_keys()).unwrap();

        // Reorder fields the way a peer might send them
        let text = format!(
            r#"{{"sig":"{}","id":"{}","data":{{"email":"a@b.com"}},"user":"{}","created_at":1700000000,"code":100,"ops":"C"}}"#,
            signed.sig.as_deref().unwrap(),
            KNOWN_ID,
            PUBLIC_HEX
        );
        let parsed: Event = serde_json::from_str(&text).unwrap();
        assert!(verify(&parsed, PUBLIC_TEXT));
    }

    #[test]
    fn test_event_with_explicit_nulls_verifies() {
        let keys = known_keys();
        let canonical = format!(
            r#"{{"code":1,"created_at":1700000000,"data":null,"ops":"C","tags":null,"user":"{}"}}"#,
            PUBLIC_HEX
        );
        let digest = Hash::hash(canonical.as_bytes());
        let id = hex::encode(digest);
        let sig = keys.sign_digest(&digest).unwrap().to_hex();

        let text = format!(
            r#"{{"tags":null,"sig":"{}","user":"{}","ops":"C","id":"{}","data":null,"code":1,"created_at":1700000000}}"#,
            sig, PUBLIC_HEX, id
        );
        let parsed: Event = serde_json::from_str(&text).unwrap();

        assert_eq!(event_id(&parsed).unwrap(), id);
        assert!(verify(&parsed, PUBLIC_HEX));
        assert!(verify_author(&parsed));

        // Dropping a null changes the content
        let mut stripped = parsed.clone();
        stripped.extra.remove("data");
        assert!(!verify(&stripped, PUBLIC_HEX));
    }

    #[test]
    fn test_sign_fills_null_timestamp() {
        let event: Event =
            serde_json::from_str(r#"{"ops":"C","code":1,"created_at":null}"#).unwrap();
        let signed = sign(&event, &known_keys()).unwrap();

        assert!(signed.created_at.is_some());
        assert!(!signed.extra.contains_key("created_at"));
        assert!(verify_author(&signed));
    }

    #[test]
    fn test_duplicate_top_level_field_rejected() {
        let text = r#"{"ops":"C","code":1,"code":2}"#;
        assert!(serde_json::from_str::<Event>(text).is_err());
    }

    fn object_text(fields: &[(String, serde_json::Value)]) -> String {
        let body: Vec<String> = fields
            .iter()
            .map(|(key, value)| format!("{}:{}", serde_json::to_string(key).unwrap(), value))
            .collect();
        format!("{{{}}}", body.join(","))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_sign_verify_roundtrip(
            code in any::<u64>(),
            content in ".{0,32}",
            ts in 0u64..4_000_000_000,
        ) {
            let keys = known_keys();
            let event = Event::new(Ops::Update, code)
                .with_data(json!({"content": content}))
                .with_created_at(ts);

            let signed = sign(&event, &keys).unwrap();
            prop_assert!(verify(&signed, PUBLIC_HEX));
        }

        #[test]
        fn prop_field_order_does_not_change_id(
            order in Just((0..7).collect::<Vec<usize>>()).prop_shuffle(),
            code in any::<u32>(),
            note in "[a-z ]{0,12}",
        ) {
            let fields = vec![
                ("ops".to_string(), json!("U")),
                ("code".to_string(), json!(code)),
                ("user".to_string(), json!(PUBLIC_HEX)),
                ("data".to_string(), json!({"note": note, "b": [1, {"y": 2, "x": 1}], "a": null})),
                ("tags".to_string(), json!([["t", "blog"]])),
                ("created_at".to_string(), json!(1_700_000_000u64)),
                ("custom".to_string(), json!({"z": true, "m": 0})),
            ];
            let shuffled: Vec<_> = order.iter().map(|&i| fields[i].clone()).collect();

            let original: Event = serde_json::from_str(&object_text(&fields)).unwrap();
            let permuted: Event = serde_json::from_str(&object_text(&shuffled)).unwrap();
            let signed = sign(&permuted, &known_keys()).unwrap();

            prop_assert_eq!(event_id(&original).unwrap(), event_id(&permuted).unwrap());
            prop_assert_eq!(signed.id, Some(event_id(&original).unwrap()));
        }
    }
}
