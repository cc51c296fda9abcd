//! Content-type aware body decoding.
//!
//! # Responsibilities
//! - Bounded read of the request body (see `reader.rs`)
//! - Turn bytes into text using the configured encoding
//! - Dispatch on content type: JSON, urlencoded form, XML, text, raw
//! - Convert every failure into a `DecodeError` carrying status and raw bytes
//!
//! # Design Decisions
//! - Decoding never fails the request pipeline: errors are values
//! - Empty bodies with a structured type decode to an empty object/mapping
//! - Deterministic for identical bytes and config

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;

use axum::body::Bytes;
use axum::http::StatusCode;
use futures_util::Stream;
use serde_json::Value;
use thiserror::Error;

use crate::body::reader::{read_limited, ReadError};
use crate::body::xml::xml_to_tree;
use crate::config::BodyConfig;

/// Text encodings accepted by `body.encoding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    /// ISO-8859-1, every byte maps to the code point of the same value.
    Latin1,
}

impl Encoding {
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Some(Self::Utf8),
            "latin1" | "binary" | "iso-8859-1" => Some(Self::Latin1),
            _ => None,
        }
    }

    fn decode<'a>(&self, bytes: &'a [u8]) -> Option<Cow<'a, str>> {
        match self {
            Self::Utf8 => std::str::from_utf8(bytes).ok().map(Cow::Borrowed),
            Self::Latin1 => Some(Cow::Owned(bytes.iter().map(|&b| b as char).collect())),
        }
    }
}

/// Body format selected from the `Content-Type` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyKind {
    Json,
    Form,
    Xml,
    Text,
    Raw,
}

impl BodyKind {
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return Self::Raw;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "application/json" => Self::Json,
            "application/x-www-form-urlencoded" => Self::Form,
            "application/xml" | "text/xml" => Self::Xml,
            s if s.ends_with("+json") => Self::Json,
            s if s.ends_with("+xml") => Self::Xml,
            s if s.starts_with("text/") => Self::Text,
            _ => Self::Raw,
        }
    }
}

/// Failure category of a body decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    PayloadTooLarge,
    MalformedJson,
    MalformedForm,
    MalformedXml,
    MalformedText,
    Aborted,
}

impl DecodeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PayloadTooLarge => "PayloadTooLarge",
            Self::MalformedJson => "MalformedJson",
            Self::MalformedForm => "MalformedForm",
            Self::MalformedXml => "MalformedXml",
            Self::MalformedText => "MalformedText",
            Self::Aborted => "Aborted",
        }
    }

    /// Status code suggested for a response to this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A body that could not be decoded, with the bytes that were read.
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct DecodeError {
    pub kind: DecodeErrorKind,
    pub message: String,
    pub raw: Bytes,
    pub status: StatusCode,
}

impl DecodeError {
    fn new(kind: DecodeErrorKind, message: impl Into<String>, raw: Bytes) -> Self {
        Self {
            kind,
            message: message.into(),
            raw,
            status: kind.status(),
        }
    }
}

/// Typed result of reading and parsing a request body.
#[derive(Debug, Clone)]
pub enum DecodedBody {
    Raw(Bytes),
    Text(String),
    Json(Value),
    FormFields(BTreeMap<String, String>),
    XmlTree(Value),
    Error(DecodeError),
}

impl Default for DecodedBody {
    fn default() -> Self {
        Self::Raw(Bytes::new())
    }
}

impl DecodedBody {
    /// JSON-shaped view of structured bodies (JSON, XML and forms).
    pub fn as_value(&self) -> Option<Cow<'_, Value>> {
        match self {
            Self::Json(v) | Self::XmlTree(v) => Some(Cow::Borrowed(v)),
            Self::FormFields(fields) => Some(Cow::Owned(Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                    .collect(),
            ))),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&DecodeError> {
        match self {
            Self::Error(e) => Some(e),
            _ => None,
        }
    }
}

/// Read `stream` within the configured limit and decode it by content type.
pub async fn decode<S, E>(
    stream: S,
    content_type: Option<&str>,
    content_length: Option<u64>,
    config: &BodyConfig,
) -> DecodedBody
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    let raw = match read_limited(stream, content_length, config.limit.as_usize()).await {
        Ok(raw) => raw,
        Err(err @ (ReadError::DeclaredTooLarge { .. } | ReadError::TooLarge { .. })) => {
            return DecodedBody::Error(DecodeError::new(
                DecodeErrorKind::PayloadTooLarge,
                err.to_string(),
                Bytes::new(),
            ));
        }
        Err(err @ ReadError::Aborted(_)) => {
            return DecodedBody::Error(DecodeError::new(
                DecodeErrorKind::Aborted,
                err.to_string(),
                Bytes::new(),
            ));
        }
    };

    decode_bytes(raw, BodyKind::from_content_type(content_type), config)
}

/// Decode an already buffered body.
pub fn decode_bytes(raw: Bytes, kind: BodyKind, config: &BodyConfig) -> DecodedBody {
    if kind == BodyKind::Raw {
        return DecodedBody::Raw(raw);
    }

    // Validation rejects unknown encodings; fall back to UTF-8 regardless.
    let encoding = Encoding::parse(&config.encoding).unwrap_or(Encoding::Utf8);
    let malformed = match kind {
        BodyKind::Json => DecodeErrorKind::MalformedJson,
        BodyKind::Form => DecodeErrorKind::MalformedForm,
        BodyKind::Xml => DecodeErrorKind::MalformedXml,
        _ => DecodeErrorKind::MalformedText,
    };

    let Some(text) = encoding.decode(&raw) else {
        let message = format!("body is not valid {}", config.encoding);
        return DecodedBody::Error(DecodeError::new(malformed, message, raw.clone()));
    };

    match kind {
        BodyKind::Json => decode_json(&text, config.strict_json)
            .map(DecodedBody::Json)
            .unwrap_or_else(|message| DecodedBody::Error(DecodeError::new(malformed, message, raw.clone()))),
        BodyKind::Form => serde_urlencoded::from_str::<Vec<(String, String)>>(&text)
            .map(|pairs| DecodedBody::FormFields(pairs.into_iter().collect()))
            .unwrap_or_else(|e| DecodedBody::Error(DecodeError::new(malformed, e.to_string(), raw.clone()))),
        BodyKind::Xml => xml_to_tree(&text)
            .map(DecodedBody::XmlTree)
            .unwrap_or_else(|e| DecodedBody::Error(DecodeError::new(malformed, e.to_string(), raw.clone()))),
        BodyKind::Text => DecodedBody::Text(text.into_owned()),
        BodyKind::Raw => DecodedBody::Raw(raw.clone()),
    }
}

fn decode_json(text: &str, strict: bool) -> Result<Value, String> {
    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    let value: Value = serde_json::from_str(text).map_err(|e| e.to_string())?;
    if strict && !(value.is_object() || value.is_array()) {
        return Err("top-level JSON value must be an object or array".to_string());
    }
    Ok(value)
}
