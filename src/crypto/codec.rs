//! Bech32 text encoding for key material
//!
//! Keys travel as `esec1...` (secret) and `epub1...` (public) strings: a
//! human-readable prefix, the `1` separator, the payload regrouped into 5-bit
//! words and a six character BCH checksum. Any single-character change is
//! detected on decode.
//!
//! [`decode`] reports the prefix it found but does not check it; the typed
//! constructors on [`SecretKey`](super::SecretKey) and
//! [`PublicKey`](super::PublicKey) do.

use bech32::primitives::decode::CheckedHrpstring;
use bech32::{Bech32, Hrp};

use super::error::{CryptoError, CryptoResult};

/// Longest encoded string accepted or produced
pub const MAX_ENCODED_LEN: usize = 1023;

/// Prefix for secret keys
pub const SECRET_KEY_PREFIX: &str = "esec";

/// Prefix for public keys
pub const PUBLIC_KEY_PREFIX: &str = "epub";

/// Encode raw bytes under the given prefix
pub fn encode(prefix: &str, data: &[u8]) -> CryptoResult<String> {
    let hrp = Hrp::parse(prefix).map_err(|e| CryptoError::EncodingError(e.to_string()))?;
    let encoded = bech32::encode::<Bech32>(hrp, data)
        .map_err(|e| CryptoError::EncodingError(e.to_string()))?;

    if encoded.len() > MAX_ENCODED_LEN {
        return Err(CryptoError::EncodingError(format!(
            "encoded length {} exceeds {}",
            encoded.len(),
            MAX_ENCODED_LEN
        )));
    }

    Ok(encoded)
}

/// Decode text into its (lowercase) prefix and raw bytes
pub fn decode(text: &str) -> CryptoResult<(String, Vec<u8>)> {
    if text.len() > MAX_ENCODED_LEN {
        return Err(CryptoError::DecodingError(format!(
            "input length {} exceeds {}",
            text.len(),
            MAX_ENCODED_LEN
        )));
    }

    let checked = CheckedHrpstring::new::<Bech32>(text)
        .map_err(|e| CryptoError::DecodingError(e.to_string()))?;
    let prefix = checked.hrp().to_lowercase();
    let data = checked.byte_iter().collect();

    Ok((prefix, data))
}

/// Decode text that must carry `expected` as its prefix
pub(crate) fn decode_expecting(text: &str, expected: &str) -> CryptoResult<Vec<u8>> {
    let (prefix, data) = decode(text)?;
    if prefix != expected {
        return Err(CryptoError::UnexpectedPrefix {
            expected: expected.to_string(),
            actual: prefix,
        });
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const SECRET_HEX: &str = "e2a90b45181b6b08d3d42ca785509b6e8cd0e12480324291de95f7d023abdf2c";
    const SECRET_TEXT: &str = "esec1u25sk3gcrd4s35759jnc25ymd6xdpcfysqey9yw7jhmaqgatmukqyljrgp";
    const PUBLIC_HEX: &str = "f54659feff021a5437745019cceb2c09b9da8cc21dfb29ec25d774210d067fd3";
    const PUBLIC_TEXT: &str = "epub174r9nlhlqgd9gdm52qvue6evpxua4rxzrhajnmp96a6zzrgx0lfsdwtstf";

    #[test]
    fn test_known_vectors() {
        let secret = hex::decode(SECRET_HEX).unwrap();
        let public = hex::decode(PUBLIC_HEX).unwrap();

        assert_eq!(encode(SECRET_KEY_PREFIX, &secret).unwrap(), SECRET_TEXT);
        assert_eq!(encode(PUBLIC_KEY_PREFIX, &public).unwrap(), PUBLIC_TEXT);

        assert_eq!(decode(SECRET_TEXT).unwrap(), ("esec".to_string(), secret));
        assert_eq!(decode(PUBLIC_TEXT).unwrap(), ("epub".to_string(), public));
    }

    #[test]
    fn test_uppercase_accepted() {
        let (prefix, data) = decode(&PUBLIC_TEXT.to_uppercase()).unwrap();
        assert_eq!(prefix, "epub");
        assert_eq!(hex::encode(data), PUBLIC_HEX);
    }

    #[test]
    fn test_mixed_case_rejected() {
        let mut mixed = PUBLIC_TEXT.to_string();
        mixed.replace_range(0..1, "E");
        assert!(matches!(decode(&mixed), Err(CryptoError::DecodingError(_))));
    }

    #[test]
    fn test_every_single_character_change_rejected() {
        for (i, c) in PUBLIC_TEXT.char_indices() {
            let replacement = if c == 'q' { "p" } else { "q" };
            let mut corrupted = PUBLIC_TEXT.to_string();
            corrupted.replace_range(i..i + 1, replacement);
            assert!(decode(&corrupted).is_err(), "position {} accepted", i);
        }
    }

    #[test]
    fn test_missing_separator_rejected() {
        assert!(decode("epubqqqqqq").is_err());
        assert!(decode("").is_err());
    }

    #[test]
    fn test_prefix_not_asserted_by_decode() {
        let (prefix, _) = decode(SECRET_TEXT).unwrap();
        assert_eq!(prefix, SECRET_KEY_PREFIX);
        assert!(matches!(
            decode_expecting(SECRET_TEXT, PUBLIC_KEY_PREFIX),
            Err(CryptoError::UnexpectedPrefix { .. })
        ));
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let data = vec![0u8; 700];
        assert!(matches!(
            encode(PUBLIC_KEY_PREFIX, &data),
            Err(CryptoError::EncodingError(_))
        ));
    }

    #[test]
    fn test_invalid_prefix_rejected() {
        assert!(encode("", &[1, 2, 3]).is_err());
        assert!(encode("bad prefix", &[1, 2, 3]).is_err());
    }

    proptest! {
        #[test]
        fn prop_key_roundtrip(bytes in proptest::array::uniform32(any::<u8>())) {
            for prefix in [SECRET_KEY_PREFIX, PUBLIC_KEY_PREFIX] {
                let text = encode(prefix, &bytes).unwrap();
                let (decoded_prefix, decoded) = decode(&text).unwrap();
                prop_assert_eq!(decoded_prefix, prefix);
                prop_assert_eq!(decoded, bytes.to_vec());
            }
        }
    }
}
