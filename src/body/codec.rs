//! Typed decoding and encoding of aggregated bodies.
//!
//! # Responsibilities
//! - Select a decode strategy from the declared content type and target type
//! - Re-serialize typed values and recompute their length
//! - Decide the content type of a re-encoded body
//!
//! # Design Decisions
//! - Closed set of target types (`BodyType`), chosen at route configuration time
//! - A missing content type is treated as `application/octet-stream`
//! - JSON targets require a JSON media type; mismatches fail in decode

use std::fmt;

use bytes::Bytes;
use serde_json::{Map, Value};

use crate::body::sink::AggregatedBody;

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Target type tag for decoding and encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyType {
    /// UTF-8 text.
    Text,
    /// JSON object.
    Map,
    /// Any JSON value.
    Json,
    /// Raw bytes, never inspected.
    Bytes,
}

impl BodyType {
    /// Content type used when nothing else is declared.
    pub fn default_content_type(self) -> &'static str {
        match self {
            BodyType::Text => "text/plain;charset=UTF-8",
            BodyType::Map | BodyType::Json => "application/json",
            BodyType::Bytes => DEFAULT_MEDIA_TYPE,
        }
    }
}

impl fmt::Display for BodyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BodyType::Text => "text",
            BodyType::Map => "map",
            BodyType::Json => "json",
            BodyType::Bytes => "bytes",
        };
        f.write_str(name)
    }
}

/// A decoded body tagged with its type.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Text(String),
    Map(Map<String, Value>),
    Json(Value),
    Bytes(Bytes),
}

impl TypedValue {
    pub fn body_type(&self) -> BodyType {
        match self {
            TypedValue::Text(_) => BodyType::Text,
            TypedValue::Map(_) => BodyType::Map,
            TypedValue::Json(_) => BodyType::Json,
            TypedValue::Bytes(_) => BodyType::Bytes,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TypedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            TypedValue::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn into_text(self) -> Option<String> {
        match self {
            TypedValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn into_map(self) -> Option<Map<String, Value>> {
        match self {
            TypedValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

impl From<String> for TypedValue {
    fn from(s: String) -> Self {
        TypedValue::Text(s)
    }
}

impl From<Map<String, Value>> for TypedValue {
    fn from(m: Map<String, Value>) -> Self {
        TypedValue::Map(m)
    }
}

impl From<Bytes> for TypedValue {
    fn from(b: Bytes) -> Self {
        TypedValue::Bytes(b)
    }
}

/// Errors raised while decoding an aggregated body.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// No decode strategy for this content type and target.
    #[error("cannot decode '{content_type}' as {target}")]
    UnsupportedMediaType {
        content_type: String,
        target: BodyType,
    },

    /// Text declared with a charset other than UTF-8.
    #[error("unsupported charset '{0}'")]
    UnsupportedCharset(String),

    /// Body carries a content coding (gzip, br, ...) the codec cannot undo.
    #[error("unsupported content encoding '{0}'")]
    UnsupportedEncoding(String),

    /// Payload is empty and the target has no empty representation.
    #[error("empty payload cannot be decoded as {0}")]
    EmptyPayload(BodyType),

    /// Payload is not valid UTF-8.
    #[error("invalid UTF-8 payload: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),

    /// Payload is not valid JSON.
    #[error("invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload parsed but has the wrong shape for the target.
    #[error("expected {expected}, found JSON {found}")]
    TypeMismatch {
        expected: BodyType,
        found: &'static str,
    },
}

/// Errors raised while encoding a typed value.
#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    /// Declared content type cannot carry this value.
    #[error("cannot encode {value} as '{content_type}'")]
    UnsupportedMediaType {
        content_type: String,
        value: BodyType,
    },

    /// Value does not have the declared output type.
    #[error("expected {expected} output, transform produced {actual}")]
    TypeMismatch { expected: BodyType, actual: BodyType },

    /// Serialization failed.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parsed `type/subtype; params` header value.
#[derive(Debug)]
struct MediaType<'a> {
    essence: String,
    charset: Option<&'a str>,
}

impl<'a> MediaType<'a> {
    fn parse(raw: Option<&'a str>) -> Self {
        let raw = raw.unwrap_or(DEFAULT_MEDIA_TYPE);
        let mut parts = raw.split(';');
        let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let charset = parts
            .filter_map(|p| p.split_once('='))
            .find(|(k, _)| k.trim().eq_ignore_ascii_case("charset"))
            .map(|(_, v)| v.trim().trim_matches('"'));
        Self { essence, charset }
    }

    fn is_json(&self) -> bool {
        self.essence == "application/json" || self.essence.ends_with("+json")
    }

    fn is_utf8_compatible(&self) -> bool {
        match self.charset {
            None => true,
            Some(cs) => cs.eq_ignore_ascii_case("utf-8") || cs.eq_ignore_ascii_case("us-ascii"),
        }
    }
}

/// Stateless codec over the closed [`BodyType`] set.
#[derive(Debug, Clone, Copy, Default)]
pub struct BodyCodec;

impl BodyCodec {
    pub fn new() -> Self {
        Self
    }

    /// Whether an empty payload has a representation in `target`.
    pub fn supports_empty(&self, target: BodyType) -> bool {
        matches!(target, BodyType::Text | BodyType::Bytes)
    }

    pub fn decode(
        &self,
        body: &AggregatedBody,
        target: BodyType,
    ) -> Result<TypedValue, DecodeError> {
        if body.is_empty() && !self.supports_empty(target) {
            return Err(DecodeError::EmptyPayload(target));
        }

        let media = MediaType::parse(body.content_type());
        if let Some(charset) = media.charset.filter(|_| !media.is_utf8_compatible()) {
            if target != BodyType::Bytes {
                return Err(DecodeError::UnsupportedCharset(charset.to_owned()));
            }
        }

        match target {
            BodyType::Bytes => Ok(TypedValue::Bytes(body.bytes().clone())),
            BodyType::Text => {
                let text = std::str::from_utf8(body.bytes())?;
                Ok(TypedValue::Text(text.to_owned()))
            }
            BodyType::Map | BodyType::Json => {
                if !media.is_json() {
                    return Err(DecodeError::UnsupportedMediaType {
                        content_type: media.essence,
                        target,
                    });
                }
                let value: Value = serde_json::from_slice(body.bytes())?;
                match (target, value) {
                    (BodyType::Map, Value::Object(map)) => Ok(TypedValue::Map(map)),
                    (BodyType::Map, other) => Err(DecodeError::TypeMismatch {
                        expected: BodyType::Map,
                        found: json_kind(&other),
                    }),
                    (_, value) => Ok(TypedValue::Json(value)),
                }
            }
        }
    }

    /// Serialize `value`, labelled with `content_type` or the value's default.
    pub fn encode(
        &self,
        value: TypedValue,
        content_type: Option<&str>,
    ) -> Result<AggregatedBody, EncodeError> {
        let body_type = value.body_type();
        let content_type = match content_type {
            Some(declared) => {
                if !self.can_carry(declared, body_type) {
                    return Err(EncodeError::UnsupportedMediaType {
                        content_type: declared.to_owned(),
                        value: body_type,
                    });
                }
                declared.to_owned()
            }
            None => body_type.default_content_type().to_owned(),
        };

        let bytes = match value {
            TypedValue::Text(s) => Bytes::from(s),
            TypedValue::Map(m) => Bytes::from(serde_json::to_vec(&m)?),
            TypedValue::Json(v) => Bytes::from(serde_json::to_vec(&v)?),
            TypedValue::Bytes(b) => b,
        };
        Ok(AggregatedBody::new(bytes, Some(content_type)))
    }

    /// Pick the content type for a re-encoded body of type `output`.
    ///
    /// An explicit override wins; otherwise the original content type is kept
    /// when it can still carry the output, else the output's default is used.
    pub fn decide_content_type(
        &self,
        original: Option<&str>,
        output: BodyType,
        declared: Option<&str>,
    ) -> String {
        if let Some(declared) = declared {
            return declared.to_owned();
        }
        match original {
            Some(original) if self.can_carry(original, output) => original.to_owned(),
            _ => output.default_content_type().to_owned(),
        }
    }

    fn can_carry(&self, content_type: &str, value: BodyType) -> bool {
        let media = MediaType::parse(Some(content_type));
        match value {
            BodyType::Bytes => true,
            BodyType::Text => media.is_utf8_compatible(),
            BodyType::Map | BodyType::Json => media.is_json() && media.is_utf8_compatible(),
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(bytes: &'static str, content_type: Option<&str>) -> AggregatedBody {
        AggregatedBody::new(bytes, content_type.map(str::to_owned))
    }

    #[test]
    fn test_decode_text_from_any_media_type() {
        let codec = BodyCodec::new();
        let value = codec
            .decode(&body("httpbin compatible home", Some("text/plain")), BodyType::Text)
            .unwrap();
        assert_eq!(value.as_text(), Some("httpbin compatible home"));

        let value = codec
            .decode(&body("{\"a\":1}", Some("application/json")), BodyType::Text)
            .unwrap();
        assert_eq!(value.as_text(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_decode_map_requires_json_media_type() {
        let codec = BodyCodec::new();
        let err = codec
            .decode(&body("{\"a\":1}", Some("text/plain")), BodyType::Map)
            .unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedMediaType { target: BodyType::Map, .. }));

        let err = codec.decode(&body("{\"a\":1}", None), BodyType::Map).unwrap_err();
        assert!(matches!(err, DecodeError::UnsupportedMediaType { .. }));

        let value = codec
            .decode(
                &body("{\"a\":1}", Some("application/problem+json; charset=utf-8")),
                BodyType::Map,
            )
            .unwrap();
        assert_eq!(value.as_map().unwrap()["a"], json!(1));
    }

    #[test]
    fn test_decode_map_rejects_non_object() {
        let codec = BodyCodec::new();
        let err = codec
            .decode(&body("[1,2]", Some("application/json")), BodyType::Map)
            .unwrap_err();
        assert!(matches!(err, DecodeError::TypeMismatch { found: "array", .. }));

        let value = codec
            .decode(&body("[1,2]", Some("application/json")), BodyType::Json)
            .unwrap();
        assert_eq!(value, TypedValue::Json(json!([1, 2])));
    }

    #[test]
    fn test_decode_failures() {
        let codec = BodyCodec::new();
        assert!(matches!(
            codec.decode(&body("{not json", Some("application/json")), BodyType::Map),
            Err(DecodeError::Json(_))
        ));
        assert!(matches!(
            codec.decode(&body("", Some("application/json")), BodyType::Map),
            Err(DecodeError::EmptyPayload(BodyType::Map))
        ));
        assert!(matches!(
            codec.decode(&body("abc", Some("text/plain; charset=ISO-8859-1")), BodyType::Text),
            Err(DecodeError::UnsupportedCharset(_))
        ));

        let invalid = AggregatedBody::new(vec![0xffu8, 0xfe], Some("text/plain".into()));
        assert!(matches!(
            codec.decode(&invalid, BodyType::Text),
            Err(DecodeError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_empty_text_and_bytes_decode() {
        let codec = BodyCodec::new();
        assert_eq!(
            codec.decode(&body("", None), BodyType::Text).unwrap(),
            TypedValue::Text(String::new())
        );
        assert_eq!(
            codec.decode(&body("", None), BodyType::Bytes).unwrap(),
            TypedValue::Bytes(Bytes::new())
        );
    }

    #[test]
    fn test_encode_recomputes_length() {
        let codec = BodyCodec::new();
        let mut map = Map::new();
        map.insert("value".into(), json!("httpbin compatible home"));
        map.insert("length".into(), json!(23));

        let encoded = codec.encode(TypedValue::Map(map.clone()), None).unwrap();
        assert_eq!(encoded.content_type(), Some("application/json"));
        assert_eq!(encoded.len(), serde_json::to_vec(&map).unwrap().len());
    }

    #[test]
    fn test_encode_rejects_incompatible_declared_type() {
        let codec = BodyCodec::new();
        let err = codec
            .encode(TypedValue::Map(Map::new()), Some("text/plain"))
            .unwrap_err();
        assert!(matches!(err, EncodeError::UnsupportedMediaType { value: BodyType::Map, .. }));
    }

    #[test]
    fn test_round_trip_same_type() {
        let codec = BodyCodec::new();
        let cases = [
            (body("{\"k\":\"v\",\"n\":2,\"b\":true}", Some("application/json")), BodyType::Map),
            (body("plain words", Some("text/plain")), BodyType::Text),
            (body("[null,1.5]", Some("application/json")), BodyType::Json),
        ];
        for (original, ty) in cases {
            let decoded = codec.decode(&original, ty).unwrap();
            let encoded = codec.encode(decoded.clone(), original.content_type()).unwrap();
            assert_eq!(codec.decode(&encoded, ty).unwrap(), decoded);
        }
    }

    #[test]
    fn test_decide_content_type() {
        let codec = BodyCodec::new();
        assert_eq!(
            codec.decide_content_type(Some("text/plain"), BodyType::Map, None),
            "application/json"
        );
        assert_eq!(
            codec.decide_content_type(Some("application/hal+json"), BodyType::Map, None),
            "application/hal+json"
        );
        assert_eq!(
            codec.decide_content_type(Some("text/plain"), BodyType::Text, Some("text/html")),
            "text/html"
        );
        assert_eq!(
            codec.decide_content_type(None, BodyType::Text, None),
            "text/plain;charset=UTF-8"
        );
    }
}
