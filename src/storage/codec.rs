//! Key namespacing and envelope encoding.
//!
//! A [`KeyCodec`] owns the fixed prefix of one cache and the serializer pair
//! used to turn envelopes into strings. Envelopes pass through the format as
//! a `serde_json::Value`, so a custom format can wrap or reshape the record
//! as long as it hands the same structure back on decode.

use super::types::Envelope;
use crate::constants::DEFAULT_PREFIX;
use crate::error::{Error, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Serializer pair applied to every stored envelope.
pub trait EnvelopeFormat: Send + Sync + 'static {
    /// Turns an envelope record into its stored string form.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be represented.
    fn encode(&self, envelope: &Value) -> anyhow::Result<String>;

    /// Parses a stored string back into the envelope record.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not a valid encoding.
    fn decode(&self, raw: &str) -> anyhow::Result<Value>;
}

/// Plain JSON text, the default format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormat;

impl EnvelopeFormat for JsonFormat {
    fn encode(&self, envelope: &Value) -> anyhow::Result<String> {
        Ok(serde_json::to_string(envelope)?)
    }

    fn decode(&self, raw: &str) -> anyhow::Result<Value> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Format built from a pair of closures.
///
/// ```
/// use crux::storage::FnFormat;
/// use serde_json::{Value, json};
///
/// let wrapped = FnFormat::new(
///     |v: &Value| Ok(serde_json::to_string(&json!({ "wrapped": v }))?),
///     |s: &str| {
///         let mut outer: Value = serde_json::from_str(s)?;
///         Ok(outer["wrapped"].take())
///     },
/// );
/// # let _ = wrapped;
/// ```
pub struct FnFormat<E, D> {
    encode: E,
    decode: D,
}

impl<E, D> FnFormat<E, D>
where
    E: Fn(&Value) -> anyhow::Result<String> + Send + Sync + 'static,
    D: Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    /// Creates a format from an encode and a decode function.
    pub fn new(encode: E, decode: D) -> Self {
        Self { encode, decode }
    }
}

impl<E, D> EnvelopeFormat for FnFormat<E, D>
where
    E: Fn(&Value) -> anyhow::Result<String> + Send + Sync + 'static,
    D: Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    fn encode(&self, envelope: &Value) -> anyhow::Result<String> {
        (self.encode)(envelope)
    }

    fn decode(&self, raw: &str) -> anyhow::Result<Value> {
        (self.decode)(raw)
    }
}

/// Builds namespaced keys and encodes/decodes envelopes.
#[derive(Clone)]
pub struct KeyCodec {
    prefix: Arc<str>,
    format: Arc<dyn EnvelopeFormat>,
}

impl KeyCodec {
    /// Creates a codec with the given prefix and the JSON format.
    pub fn new(prefix: impl Into<String>) -> Self {
        Self::with_format(prefix, JsonFormat)
    }

    /// Creates a codec with a custom format.
    pub fn with_format(prefix: impl Into<String>, format: impl EnvelopeFormat) -> Self {
        Self::from_parts(prefix, Arc::new(format))
    }

    /// Creates a codec from a shared format.
    pub fn from_parts(prefix: impl Into<String>, format: Arc<dyn EnvelopeFormat>) -> Self {
        Self {
            prefix: Arc::from(prefix.into()),
            format,
        }
    }

    /// The fixed namespace prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Qualifies a logical key with the prefix.
    pub fn namespaced(&self, key: &str) -> String {
        let mut full = String::with_capacity(self.prefix.len() + key.len());
        full.push_str(&self.prefix);
        full.push_str(key);
        full
    }

    /// Strips the prefix from a raw key, or `None` if the key belongs to
    /// another namespace.
    pub fn logical<'a>(&self, raw_key: &'a str) -> Option<&'a str> {
        raw_key.strip_prefix(&*self.prefix)
    }

    /// Encodes an envelope for storage under `key` (used in error messages).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if the value cannot be serialized or the
    /// format rejects the record.
    pub fn encode<T: Serialize>(&self, key: &str, envelope: &Envelope<T>) -> Result<String> {
        let record = serde_json::to_value(envelope).map_err(|e| Error::encode(key, e))?;
        self.format
            .encode(&record)
            .map_err(|e| Error::encode(key, e))
    }

    /// Decodes a stored string into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Decode`] if the format rejects the string or the
    /// record does not match `Envelope<T>`.
    pub fn decode<T: DeserializeOwned>(&self, key: &str, raw: &str) -> Result<Envelope<T>> {
        let record = self.format.decode(raw).map_err(|e| Error::decode(key, e))?;
        serde_json::from_value(record).map_err(|e| Error::decode(key, e))
    }
}

impl Default for KeyCodec {
    fn default() -> Self {
        Self::new(DEFAULT_PREFIX)
    }
}

impl fmt::Debug for KeyCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyCodec")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn wrapped_format() -> impl EnvelopeFormat {
        FnFormat::new(
            |v: &Value| Ok(serde_json::to_string(&json!({ "wrapped": v }))?),
            |s: &str| {
                let mut outer: Value = serde_json::from_str(s)?;
                Ok(outer["wrapped"].take())
            },
        )
    }

    #[test]
    fn test_default_prefix() {
        let codec = KeyCodec::default();
        assert_eq!(codec.prefix(), "crux:");
        assert_eq!(codec.namespaced("theme"), "crux:theme");
    }

    #[test]
    fn test_logical_rejects_foreign_namespace() {
        let codec = KeyCodec::new("app1:");
        assert_eq!(codec.logical("app1:x"), Some("x"));
        assert_eq!(codec.logical("app2:x"), None);
        assert_eq!(codec.logical("x"), None);
    }

    #[test]
    fn test_json_round_trip() {
        let codec = KeyCodec::default();
        let envelope = Envelope::new(json!({ "a": [1, 2, { "b": null }] }), None);
        let raw = codec.encode("k", &envelope).unwrap();
        let back: Envelope<Value> = codec.decode("k", &raw).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn test_custom_format_is_applied() {
        let codec = KeyCodec::with_format("t:", wrapped_format());
        let envelope = Envelope::new("data".to_string(), None);
        let raw = codec.encode("k", &envelope).unwrap();
        assert!(raw.starts_with(r#"{"wrapped":"#));

        let back: Envelope<String> = codec.decode("k", &raw).unwrap();
        assert_eq!(back.value, "data");
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let codec = KeyCodec::default();
        let err = codec.decode::<String>("crux:k", "not-json").unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_decode_wrong_shape_is_decode_error() {
        let codec = KeyCodec::default();
        let err = codec
            .decode::<String>("crux:k", r#"{"something":"else"}"#)
            .unwrap_err();
        assert!(err.is_decode());
    }

    proptest! {
        #[test]
        fn prop_namespacing_is_reversible(prefix in "[a-z0-9]{0,8}:", key in ".{0,32}") {
            let codec = KeyCodec::new(prefix);
            let full = codec.namespaced(&key);
            prop_assert_eq!(codec.logical(&full), Some(key.as_str()));
        }

        #[test]
        fn prop_distinct_prefixes_never_collide(key in "[a-z]{1,16}") {
            let one = KeyCodec::new("app1:");
            let two = KeyCodec::new("app2:");
            prop_assert_ne!(one.namespaced(&key), two.namespaced(&key));
            let full = one.namespaced(&key);
            prop_assert_eq!(two.logical(&full), None);
        }
    }
}
