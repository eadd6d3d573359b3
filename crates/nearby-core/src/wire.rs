//! Nearby wire format — the service-specific info carried in advertisements.
//!
//! A publisher advertises a single human-readable line:
//!
//! ```text
//! Model: <model>, OS: <os version>, Battery: <percent>%
//! ```
//!
//! Exactly three `", "`-separated fields, each `<key>: <value>`, in the fixed
//! order Model, OS, Battery. The payload arrives from unauthenticated nearby
//! peers, so `decode` is total over every byte input: it returns a typed error
//! and never indexes into a split result it has not checked.

use bytes::Bytes;

// ── Format ────────────────────────────────────────────────────────────────────

/// Separator between the three fields.
pub const FIELD_SEPARATOR: &str = ", ";

/// Separator between a field's key and its value.
pub const KEY_SEPARATOR: &str = ": ";

pub const KEY_MODEL: &str = "Model";
pub const KEY_OS: &str = "OS";
pub const KEY_BATTERY: &str = "Battery";

/// Service name used when the config does not override it.
pub const DEFAULT_SERVICE_NAME: &str = "TestService";

// ── Service Hashes ────────────────────────────────────────────────────────────

/// Service identifier — BLAKE3 hash of the service name.
/// Publishers and subscribers match on this, never on the raw name.
pub type ServiceHash = [u8; 32];

/// Compute a ServiceHash from a service name.
pub fn service_hash(name: &str) -> ServiceHash {
    *blake3::hash(name.as_bytes()).as_bytes()
}

// ── Codec ─────────────────────────────────────────────────────────────────────

/// A decoded advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// Advertised identity (the Model field). Never empty.
    pub name: String,
    /// Remaining fields, re-joined: `"OS: <os>, Battery: <battery>"`.
    pub details: String,
}

/// Encode this device's advertisement payload.
///
/// Deterministic. Values containing `", "` cannot be decoded back into the
/// same triple; callers advertising free-form strings should avoid them.
pub fn encode(model: &str, os_version: &str, battery_percent: u8) -> Bytes {
    Bytes::from(format!(
        "{KEY_MODEL}{KEY_SEPARATOR}{model}{FIELD_SEPARATOR}\
         {KEY_OS}{KEY_SEPARATOR}{os_version}{FIELD_SEPARATOR}\
         {KEY_BATTERY}{KEY_SEPARATOR}{battery_percent}%"
    ))
}

/// Decode an advertisement received from a peer.
pub fn decode(payload: &[u8]) -> Result<ServiceInfo, DecodeError> {
    let text = std::str::from_utf8(payload)?;

    let mut fields = text.split(FIELD_SEPARATOR);
    let (Some(model), Some(os), Some(battery), None) =
        (fields.next(), fields.next(), fields.next(), fields.next())
    else {
        return Err(DecodeError::Malformed("expected exactly three fields"));
    };

    let name = field_value(model, KEY_MODEL)?;
    let os = field_value(os, KEY_OS)?;
    let battery = field_value(battery, KEY_BATTERY)?;

    if name.is_empty() {
        return Err(DecodeError::Malformed("empty model"));
    }

    Ok(ServiceInfo {
        name: name.to_string(),
        details: format!(
            "{KEY_OS}{KEY_SEPARATOR}{os}{FIELD_SEPARATOR}{KEY_BATTERY}{KEY_SEPARATOR}{battery}"
        ),
    })
}

/// Split one `<key>: <value>` field and check the key.
fn field_value<'a>(field: &'a str, expected_key: &'static str) -> Result<&'a str, DecodeError> {
    match field.split_once(KEY_SEPARATOR) {
        Some((key, value)) if key == expected_key => Ok(value),
        Some(_) => Err(DecodeError::Malformed("unexpected field key")),
        None => Err(DecodeError::Malformed("field missing key separator")),
    }
}

// ── Errors ────────────────────────────────────────────────────────────────────

/// Errors that can arise when interpreting a peer's advertisement.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("malformed service info: {0}")]
    Malformed(&'static str),

    #[error("service info is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_matches_documented_format() {
        let payload = encode("Pixel 7", "14", 87);
        assert_eq!(&payload[..], b"Model: Pixel 7, OS: 14, Battery: 87%");
    }

    #[test]
    fn decode_documented_example() {
        let info = decode(b"Model: Pixel 7, OS: 14, Battery: 87%").unwrap();
        assert_eq!(info.name, "Pixel 7");
        assert_eq!(info.details, "OS: 14, Battery: 87%");
    }

    #[test]
    fn encoded_payload_decodes_to_name_and_details() {
        for (model, os, battery) in [
            ("Pixel 7", "14", 87u8),
            ("SM-G991B", "13", 0),
            ("ThinkPad X1: Gen 9", "6.8.0-45-generic", 100),
            ("x", "", 255),
        ] {
            let info = decode(&encode(model, os, battery)).unwrap();
            assert_eq!(info.name, model);
            assert_eq!(info.details, format!("OS: {os}, Battery: {battery}%"));
        }
    }

    #[test]
    fn wrong_field_count_is_malformed() {
        for input in [
            &b""[..],
            b"garbage",
            b"Model: Pixel 7, OS: 14",
            b"Model: Pixel 7, OS: 14, Battery: 87%, Extra: 1",
            b"Model: a, b, OS: 14, Battery: 87%",
        ] {
            assert!(
                matches!(decode(input), Err(DecodeError::Malformed(_))),
                "expected Malformed for {:?}",
                String::from_utf8_lossy(input)
            );
        }
    }

    #[test]
    fn missing_key_separator_is_malformed() {
        let err = decode(b"Model Pixel 7, OS: 14, Battery: 87%").unwrap_err();
        assert_eq!(err, DecodeError::Malformed("field missing key separator"));

        let err = decode(b"Model: Pixel 7, OS:14, Battery: 87%").unwrap_err();
        assert_eq!(err, DecodeError::Malformed("field missing key separator"));
    }

    #[test]
    fn reordered_keys_are_malformed() {
        let err = decode(b"OS: 14, Model: Pixel 7, Battery: 87%").unwrap_err();
        assert_eq!(err, DecodeError::Malformed("unexpected field key"));
    }

    #[test]
    fn empty_model_is_malformed() {
        let err = decode(b"Model: , OS: 14, Battery: 87%").unwrap_err();
        assert_eq!(err, DecodeError::Malformed("empty model"));
    }

    #[test]
    fn invalid_utf8_is_encoding_error() {
        let err = decode(&[b'M', 0xff, 0xfe, b':']).unwrap_err();
        assert!(matches!(err, DecodeError::Encoding(_)));
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn every_truncation_decodes_without_panicking() {
        let full = b"Model: Pixel 7, OS: 14, Battery: 87%";
        // Before the battery separator is complete there is no valid third field.
        let battery_value_start = 33;
        assert_eq!(&full[battery_value_start - 9..battery_value_start], b"Battery: ");

        for cut in 0..=full.len() {
            let result = decode(&full[..cut]);
            if cut < battery_value_start {
                assert!(
                    matches!(result, Err(DecodeError::Malformed(_))),
                    "cut {cut} should be malformed"
                );
            } else {
                assert_eq!(result.unwrap().name, "Pixel 7");
            }
        }
    }

    #[test]
    fn arbitrary_bytes_never_panic() {
        let mut seed: u32 = 0x9e37_79b9;
        for len in 0..256usize {
            let bytes: Vec<u8> = (0..len)
                .map(|_| {
                    seed ^= seed << 13;
                    seed ^= seed >> 17;
                    seed ^= seed << 5;
                    (seed & 0xff) as u8
                })
                .collect();
            let _ = decode(&bytes);
        }
    }

    #[test]
    fn service_hashes_are_deterministic() {
        let a = service_hash("nearby.device_info");
        let b = service_hash("nearby.device_info");
        let c = service_hash("TestService");
        assert_eq!(a, b, "same input must produce same hash");
        assert_ne!(a, c, "different inputs must produce different hashes");
    }
}
