//! The four-field cipher bundle and its JSON transport form
//!
//! # Wire Format
//!
//! ```json
//! {"kdf_salt": "<b64>", "ciphertext": "<b64>", "nonce": "<b64>", "auth_tag": "<b64>"}
//! ```
//!
//! Values are standard base64 with padding. Key order is not significant.
//! This shape must stay stable: a QR code minted by one process is opened by
//! another, possibly much later.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Error, FormatError, Result};
use crate::MAX_TRANSPORT_CHARS;

/// Keys every serialized bundle must carry
pub const REQUIRED_FIELDS: [&str; 4] = ["kdf_salt", "ciphertext", "nonce", "auth_tag"];

/// Output of one sealing operation. Immutable once built.
///
/// Deserializing goes through [`CipherBundle::from_parts`], so empty fields
/// are rejected there as well.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBundle")]
pub struct CipherBundle {
    #[serde(serialize_with = "b64_field::serialize")]
    kdf_salt: Vec<u8>,
    #[serde(serialize_with = "b64_field::serialize")]
    ciphertext: Vec<u8>,
    #[serde(serialize_with = "b64_field::serialize")]
    nonce: Vec<u8>,
    #[serde(serialize_with = "b64_field::serialize")]
    auth_tag: Vec<u8>,
}

/// Decoded but unchecked fields
#[derive(Deserialize)]
struct RawBundle {
    #[serde(deserialize_with = "b64_field::deserialize")]
    kdf_salt: Vec<u8>,
    #[serde(deserialize_with = "b64_field::deserialize")]
    ciphertext: Vec<u8>,
    #[serde(deserialize_with = "b64_field::deserialize")]
    nonce: Vec<u8>,
    #[serde(deserialize_with = "b64_field::deserialize")]
    auth_tag: Vec<u8>,
}

impl TryFrom<RawBundle> for CipherBundle {
    type Error = Error;

    fn try_from(raw: RawBundle) -> Result<Self> {
        Self::from_parts(raw.kdf_salt, raw.ciphertext, raw.nonce, raw.auth_tag)
    }
}

impl CipherBundle {
    /// Assemble a bundle from raw parts. Every part must be non-empty.
    pub fn from_parts(
        kdf_salt: Vec<u8>,
        ciphertext: Vec<u8>,
        nonce: Vec<u8>,
        auth_tag: Vec<u8>,
    ) -> Result<Self> {
        if kdf_salt.is_empty() || ciphertext.is_empty() || nonce.is_empty() || auth_tag.is_empty()
        {
            return Err(Error::malformed());
        }
        Ok(Self {
            kdf_salt,
            ciphertext,
            nonce,
            auth_tag,
        })
    }

    pub fn kdf_salt(&self) -> &[u8] {
        &self.kdf_salt
    }

    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    pub fn auth_tag(&self) -> &[u8] {
        &self.auth_tag
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Serialize for embedding in a QR symbol, enforcing the size ceiling
    pub fn to_transport(&self) -> Result<String> {
        let json = self.to_json()?;
        let len = json.chars().count();
        if len > MAX_TRANSPORT_CHARS {
            return Err(Error::PayloadTooLarge {
                len,
                max: MAX_TRANSPORT_CHARS,
            });
        }
        Ok(json)
    }

    /// Parse the JSON wire form.
    ///
    /// Structure is checked first (valid JSON, an object, all four keys);
    /// field contents second. A field that is present but not a non-empty
    /// base64 string makes the bundle undecryptable rather than misshapen.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(text).map_err(|_| Error::Format(FormatError::InvalidJson))?;
        match value {
            Value::Object(map) => Self::from_map(&map),
            _ => Err(Error::Format(FormatError::InvalidStructure)),
        }
    }

    /// Build from an already-parsed JSON value.
    ///
    /// Accepts either the bundle object itself or a JSON string holding it.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(text) => Self::parse(text),
            Value::Object(map) => Self::from_map(map),
            _ => Err(Error::Format(FormatError::InvalidStructure)),
        }
    }

    fn from_map(map: &Map<String, Value>) -> Result<Self> {
        if !REQUIRED_FIELDS.iter().all(|field| map.contains_key(*field)) {
            return Err(Error::Format(FormatError::InvalidStructure));
        }

        Self::from_parts(
            decode_field(map, "kdf_salt")?,
            decode_field(map, "ciphertext")?,
            decode_field(map, "nonce")?,
            decode_field(map, "auth_tag")?,
        )
    }
}

fn decode_field(map: &Map<String, Value>, name: &str) -> Result<Vec<u8>> {
    let encoded = map
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(Error::malformed)?;
    BASE64.decode(encoded).map_err(|_| Error::malformed())
}

mod b64_field {
    use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&BASE64.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        BASE64.decode(s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DecryptFailure;

    fn sample() -> CipherBundle {
        CipherBundle::from_parts(vec![1; 16], vec![2; 11], vec![3; 12], vec![4; 16]).unwrap()
    }

    #[test]
    fn test_json_has_all_fields() {
        let json = sample().to_json().unwrap();
        let value: Value = serde_json::from_str(&json).unwrap();
        for field in REQUIRED_FIELDS {
            assert!(value[field].is_string(), "missing {}", field);
        }
        assert_eq!(value["kdf_salt"], "AQEBAQEBAQEBAQEBAQEBAQ==");
    }

    #[test]
    fn test_parse_round_trip() {
        let bundle = sample();
        let parsed = CipherBundle::parse(&bundle.to_json().unwrap()).unwrap();
        assert_eq!(parsed, bundle);
    }

    #[test]
    fn test_parse_accepts_spaced_json() {
        let text = r#"{"kdf_salt": "AQEBAQEBAQEBAQEBAQEBAQ==", "ciphertext": "AgICAgICAgICAgI=", "nonce": "AwMDAwMDAwMDAwMD", "auth_tag": "BAQEBAQEBAQEBAQEBAQEBA=="}"#;
        assert_eq!(CipherBundle::parse(text).unwrap(), sample());
    }

    #[test]
    fn test_parse_rejects_invalid_json() {
        assert!(matches!(
            CipherBundle::parse("not json {"),
            Err(Error::Format(FormatError::InvalidJson))
        ));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(
            CipherBundle::parse("[1, 2, 3]"),
            Err(Error::Format(FormatError::InvalidStructure))
        ));
        assert!(matches!(
            CipherBundle::parse("\"kdf_salt ciphertext nonce auth_tag\""),
            Err(Error::Format(FormatError::InvalidStructure))
        ));
    }

    #[test]
    fn test_parse_rejects_missing_field() {
        for missing in REQUIRED_FIELDS {
            let mut value: Value = serde_json::from_str(&sample().to_json().unwrap()).unwrap();
            value.as_object_mut().unwrap().remove(missing);
            let err = CipherBundle::parse(&value.to_string()).unwrap_err();
            assert!(
                matches!(err, Error::Format(FormatError::InvalidStructure)),
                "removing {} gave {:?}",
                missing,
                err
            );
        }
    }

    #[test]
    fn test_bad_field_contents_are_malformed() {
        let text = r#"{"kdf_salt": "!!!", "ciphertext": "AgI=", "nonce": "AwM=", "auth_tag": "BAQ="}"#;
        assert_eq!(
            CipherBundle::parse(text).unwrap_err().decrypt_failure(),
            Some(DecryptFailure::Malformed)
        );

        let text = r#"{"kdf_salt": 42, "ciphertext": "AgI=", "nonce": "AwM=", "auth_tag": "BAQ="}"#;
        assert_eq!(
            CipherBundle::parse(text).unwrap_err().decrypt_failure(),
            Some(DecryptFailure::Malformed)
        );

        let text = r#"{"kdf_salt": "", "ciphertext": "AgI=", "nonce": "AwM=", "auth_tag": "BAQ="}"#;
        assert_eq!(
            CipherBundle::parse(text).unwrap_err().decrypt_failure(),
            Some(DecryptFailure::Malformed)
        );
    }

    #[test]
    fn test_serde_deserialize_checks_parts() {
        let json = sample().to_json().unwrap();
        let bundle: CipherBundle = serde_json::from_str(&json).unwrap();
        assert_eq!(bundle, sample());

        let text = r#"{"kdf_salt": "", "ciphertext": "AgI=", "nonce": "AwM=", "auth_tag": "BAQ="}"#;
        assert!(serde_json::from_str::<CipherBundle>(text).is_err());

        let text = r#"{"kdf_salt": "AQE=", "ciphertext": "AgI=", "nonce": "AwM=", "auth_tag": ""}"#;
        assert!(serde_json::from_str::<CipherBundle>(text).is_err());
    }

    #[test]
    fn test_from_value_accepts_string_or_object() {
        let json = sample().to_json().unwrap();
        let object: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(CipherBundle::from_value(&object).unwrap(), sample());
        assert_eq!(
            CipherBundle::from_value(&Value::String(json)).unwrap(),
            sample()
        );
        assert!(CipherBundle::from_value(&Value::Bool(true)).is_err());
    }

    #[test]
    fn test_transport_ceiling() {
        let small = sample();
        assert!(small.to_transport().is_ok());

        let big = CipherBundle::from_parts(vec![1; 16], vec![2; 1200], vec![3; 12], vec![4; 16])
            .unwrap();
        match big.to_transport() {
            Err(Error::PayloadTooLarge { len, max }) => {
                assert!(len > max);
                assert_eq!(max, MAX_TRANSPORT_CHARS);
            }
            other => panic!("expected PayloadTooLarge, got {:?}", other),
        }
    }
}
