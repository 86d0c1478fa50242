//! Envelope codec: the JSON message bodies exchanged with the cloud.
//!
//! Every outbound request and inbound frame fits in a fixed-size buffer
//! ([`PACKET_SIZE`](crate::cloud::PACKET_SIZE) bytes of payload,
//! [`FRAME_SIZE`](crate::cloud::FRAME_SIZE) bytes for the whole frame).
//! A payload that does not fit is rejected with
//! [`Error::Serialization`] before any network action, never truncated.
//!
//! The wire shape is a small header carrying the correlation id and task
//! name, plus a task-specific payload:
//!
//! ```json
//! {"header":{"id":7,"task":"/device/data/set"},
//!  "payload":{"deviceID":"dev1","path":"room/fan","data":true}}
//! ```
//!
//! Unsolicited push events carry id `0` and an `event` discriminator in
//! the payload.
//!
//! Structured fields go through `serde-json-core`. The free-form `data`
//! field cannot: its type is only known at runtime, and the crate has no
//! allocator to buffer self-describing values with. Instead its raw text
//! is located with a small string-and-depth scanner and classified by its
//! first byte.

use heapless::String;
use serde::{Deserialize, Serialize, Serializer};

use super::error::Error;
use super::{FRAME_SIZE, PACKET_SIZE};

/// A scalar JSON value carried in the `data` field of an envelope.
///
/// The crate runs without an allocator, so arbitrary nested JSON cannot be
/// represented; `data` is restricted to scalars. Composite payloads are
/// rejected during parsing and surface as [`Error::Serialization`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value<'a> {
    /// JSON `null`.
    Null,
    /// JSON `true` / `false`.
    Bool(bool),
    /// A JSON number without a fractional part.
    Integer(i64),
    /// A JSON number with a fractional part.
    Float(f64),
    /// A JSON string, borrowed from the frame buffer.
    Str(&'a str),
}

impl Serialize for Value<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(b) => serializer.serialize_bool(b),
            Value::Integer(i) => serializer.serialize_i64(i),
            Value::Float(f) => serializer.serialize_f64(f),
            Value::Str(s) => serializer.serialize_str(s),
        }
    }
}

impl<'a> Value<'a> {
    /// Parse a scalar from its raw JSON text, classified by first byte.
    ///
    /// Objects and arrays are rejected, as are strings carrying escape
    /// sequences (they cannot be unescaped in place without a buffer).
    pub fn from_json(raw: &'a str) -> Result<Self, Error> {
        let raw = raw.trim();
        match raw.as_bytes().first() {
            None => Err(Error::Serialization),
            Some(b'n') if raw == "null" => Ok(Value::Null),
            Some(b't') if raw == "true" => Ok(Value::Bool(true)),
            Some(b'f') if raw == "false" => Ok(Value::Bool(false)),
            Some(b'"') => {
                if raw.len() < 2 || !raw.ends_with('"') {
                    return Err(Error::Serialization);
                }
                let inner = &raw[1..raw.len() - 1];
                if inner.contains(['\\', '"']) {
                    return Err(Error::Serialization);
                }
                Ok(Value::Str(inner))
            }
            Some(b'{') | Some(b'[') => Err(Error::Serialization),
            Some(b'-') | Some(b'0'..=b'9') => {
                if raw.contains(['.', 'e', 'E']) {
                    raw.parse::<f64>()
                        .map(Value::Float)
                        .map_err(|_| Error::Serialization)
                } else {
                    raw.parse::<i64>()
                        .map(Value::Integer)
                        .map_err(|_| Error::Serialization)
                }
            }
            Some(_) => Err(Error::Serialization),
        }
    }
}

/// The message body sent to the cloud for every device operation.
///
/// Ephemeral by design: constructed per call, serialized immediately,
/// never stored in its structured form.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Envelope<'a> {
    /// The device this message concerns.
    #[serde(rename = "deviceID")]
    pub device_id: &'a str,
    /// The data path the operation targets, when it targets one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<&'a str>,
    /// The value carried by set operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value<'a>>,
    /// The event class for subscription requests.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<&'a str>,
}

impl<'a> Envelope<'a> {
    /// Parse an envelope back from its serialized JSON text.
    pub fn from_json(text: &'a str) -> Result<Self, Error> {
        #[derive(Deserialize)]
        struct Fields<'f> {
            #[serde(rename = "deviceID")]
            device_id: &'f str,
            #[serde(borrow, default)]
            path: Option<&'f str>,
            #[serde(borrow, default)]
            event: Option<&'f str>,
        }
        let (fields, _) =
            serde_json_core::from_str::<Fields<'_>>(text).map_err(|_| Error::Serialization)?;
        let data = match raw_field(text, "data") {
            Some(value_text) => Some(Value::from_json(value_text)?),
            None => None,
        };
        Ok(Self {
            device_id: fields.device_id,
            path: fields.path,
            data,
            event: fields.event,
        })
    }
}

/// Credentials presented during the authentication handshake.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AuthPayload<'a> {
    /// The project API key.
    #[serde(rename = "apiKey")]
    pub api_key: &'a str,
    /// The device access token.
    pub token: &'a str,
}

/// The header of every frame on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Header<'a> {
    /// Correlation id; `0` marks unsolicited push frames.
    pub id: u32,
    /// The task (for requests/responses) or push class this frame carries.
    #[serde(borrow)]
    pub task: &'a str,
}

/// The payload of an inbound frame, as a superset of every shape the cloud
/// sends: response data, push events, or nothing at all.
#[derive(Debug, Clone, Copy)]
pub struct InboundPayload<'a> {
    /// Push event discriminator (`"data"`, `"summaryUpdated"`, ...).
    pub event: Option<&'a str>,
    /// The data path a push update refers to.
    pub path: Option<&'a str>,
    /// Response or update value.
    pub data: Option<Value<'a>>,
}

/// One parsed inbound frame.
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    /// Correlation id and task name.
    pub header: Header<'a>,
    /// Task-specific body.
    pub payload: InboundPayload<'a>,
}

#[derive(Deserialize)]
struct PayloadFields<'a> {
    #[serde(borrow, default)]
    event: Option<&'a str>,
    #[serde(borrow, default)]
    path: Option<&'a str>,
}

#[derive(Deserialize)]
struct FrameFields<'a> {
    #[serde(borrow)]
    header: Header<'a>,
    #[serde(borrow, default)]
    payload: Option<PayloadFields<'a>>,
}

/// Serialize a payload into a fixed-size packet buffer.
///
/// Fails with [`Error::Serialization`] when the encoded form exceeds
/// [`PACKET_SIZE`](crate::cloud::PACKET_SIZE) bytes.
pub fn to_packet<T: Serialize>(value: &T) -> Result<String<PACKET_SIZE>, Error> {
    serde_json_core::to_string(value).map_err(|_| Error::Serialization)
}

/// Parse an inbound frame from its raw bytes.
///
/// The structured fields go through `serde-json-core`; the free-form
/// `data` value is located in the raw text and classified separately. A
/// frame whose `data` is not a scalar is rejected whole.
pub fn parse_frame(raw: &[u8]) -> Result<Frame<'_>, Error> {
    let text = core::str::from_utf8(raw).map_err(|_| Error::Protocol)?;
    let (fields, _) =
        serde_json_core::from_str::<FrameFields<'_>>(text).map_err(|_| Error::Protocol)?;
    let data = match raw_field(text, "payload").and_then(|p| raw_field(p, "data")) {
        Some(value_text) => Some(Value::from_json(value_text).map_err(|_| Error::Protocol)?),
        None => None,
    };
    let (event, path) = match fields.payload {
        Some(p) => (p.event, p.path),
        None => (None, None),
    };
    Ok(Frame {
        header: fields.header,
        payload: InboundPayload { event, path, data },
    })
}

/// Compose a complete wire frame around an already-serialized payload.
///
/// The payload must be a serialized JSON object (see [`to_packet`]); it is
/// spliced in verbatim so the envelope is encoded exactly once.
pub fn compose_frame(id: u32, task: &str, payload: &str) -> Result<String<FRAME_SIZE>, Error> {
    use core::fmt::Write;
    let mut out: String<FRAME_SIZE> = String::new();
    write!(
        out,
        "{{\"header\":{{\"id\":{},\"task\":\"{}\"}},\"payload\":{}}}",
        id, task, payload
    )
    .map_err(|_| Error::Serialization)?;
    Ok(out)
}

/// Locate the raw text of `key`'s value at the top level of a JSON object.
///
/// Walks key/value pairs tracking string and nesting state, so braces,
/// commas, or the key's own name occurring inside string values never
/// confuse the search. Returns `None` when the key is absent.
fn raw_field<'a>(json: &'a str, key: &str) -> Option<&'a str> {
    let bytes = json.as_bytes();
    let mut i = 0;
    while i < bytes.len() && bytes[i] != b'{' {
        i += 1;
    }
    if i >= bytes.len() {
        return None;
    }
    i += 1;
    loop {
        while i < bytes.len() && matches!(bytes[i], b' ' | b'\t' | b'\r' | b'\n' | b',') {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] == b'}' {
            return None;
        }
        if bytes[i] != b'"' {
            return None;
        }
        // Key string.
        let key_start = i + 1;
        i += 1;
        let mut escape_next = false;
        while i < bytes.len() {
            match bytes[i] {
                b'\\' if !escape_next => escape_next = true,
                b'"' if !escape_next => break,
                _ => escape_next = false,
            }
            i += 1;
        }
        if i >= bytes.len() {
            return None;
        }
        let name = &json[key_start..i];
        i += 1;
        while i < bytes.len() && matches!(bytes[i], b' ' | b'\t' | b'\r' | b'\n') {
            i += 1;
        }
        if i >= bytes.len() || bytes[i] != b':' {
            return None;
        }
        i += 1;
        while i < bytes.len() && matches!(bytes[i], b' ' | b'\t' | b'\r' | b'\n') {
            i += 1;
        }
        // Value: scan to its end at this nesting level.
        let value_start = i;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escape_next = false;
        while i < bytes.len() {
            let b = bytes[i];
            if escape_next {
                escape_next = false;
                i += 1;
                continue;
            }
            match b {
                b'\\' if in_string => escape_next = true,
                b'"' => in_string = !in_string,
                b'{' | b'[' if !in_string => depth += 1,
                b'}' | b']' if !in_string => {
                    if depth == 0 {
                        break;
                    }
                    depth -= 1;
                }
                b',' if !in_string && depth == 0 => break,
                _ => {}
            }
            i += 1;
        }
        if name == key {
            let value = json[value_start..i].trim();
            if value.is_empty() {
                return None;
            }
            return Some(value);
        }
    }
}
