//! Recorded request bodies and the decoders that turn them into values tests can inspect.
//!
//! MockServer hands back request bodies in a few different shapes: nothing at all, a bare
//! string, or a wrapper object whose `type` field tells how the payload was encoded
//! (`{"type": "JSON", "json": ...}`, `{"type": "STRING", "string": "..."}`, ...).
//! [`RecordedBody`] makes those shapes explicit and each [`BodyDecoder`] states which of them
//! it accepts.
use base64::prelude::{Engine as _, BASE64_STANDARD};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

/// Decoded `application/x-www-form-urlencoded` payload: every key maps to all the values it was
/// sent with, in order.
pub type FormData = BTreeMap<String, Vec<String>>;

/// The body of a request recorded by MockServer.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedBody {
    /// No body was sent.
    Empty,
    /// Raw bytes, as received. MockServer reports them base64-encoded in a `BINARY` wrapper.
    Raw(Vec<u8>),
    /// A plain string.
    Text(String),
    /// A structured value, usually a wrapper object carrying a `type` discriminator.
    Wrapped(Value),
}

impl RecordedBody {
    pub fn is_empty(&self) -> bool {
        match self {
            RecordedBody::Empty => true,
            RecordedBody::Raw(b) => b.is_empty(),
            RecordedBody::Text(s) => s.is_empty(),
            RecordedBody::Wrapped(_) => false,
        }
    }

    /// The `type` field of a wrapped body, if any.
    pub fn discriminator(&self) -> Option<&str> {
        match self {
            RecordedBody::Wrapped(v) => v.get("type").and_then(Value::as_str),
            _ => None,
        }
    }
}

impl From<Value> for RecordedBody {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RecordedBody::Empty,
            Value::String(s) => RecordedBody::Text(s),
            other => match binary_payload(&other) {
                Some(bytes) => RecordedBody::Raw(bytes),
                None => RecordedBody::Wrapped(other),
            },
        }
    }
}

fn binary_payload(value: &Value) -> Option<Vec<u8>> {
    if value.get("type").and_then(Value::as_str) != Some("BINARY") {
        return None;
    }
    let encoded = value.get("base64Bytes").and_then(Value::as_str)?;
    BASE64_STANDARD.decode(encoded).ok()
}

impl fmt::Display for RecordedBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordedBody::Empty => Ok(()),
            RecordedBody::Raw(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            RecordedBody::Text(s) => f.write_str(s),
            RecordedBody::Wrapped(v) => write!(f, "{}", v),
        }
    }
}

/// A slot shared between a test and an [`Assertion`], filled in when the assertion is
/// evaluated.
///
/// Cloning a `Capture` gives another handle to the same slot.
///
/// ### Example:
/// ```rust
/// use mock_server_client::{Assertion, Capture};
///
/// #[derive(serde::Deserialize)]
/// struct Pet {
///     name: String,
/// }
///
/// let pet: Capture<Pet> = Capture::new();
/// let assertion = Assertion::new().json_body(pet.clone());
/// // ... mount the expectation, exercise the system under test, verify ...
/// // then `pet.take()` holds the decoded request body.
/// # assert!(pet.take().is_none());
/// ```
///
/// [`Assertion`]: crate::Assertion
pub struct Capture<T>(Arc<Mutex<Option<T>>>);

impl<T> Capture<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(None)))
    }

    /// Start from an existing value, e.g. a pre-filled [`FormData`] to append to.
    pub fn with_value(value: T) -> Self {
        Self(Arc::new(Mutex::new(Some(value))))
    }

    /// Move the captured value out, leaving the slot empty.
    pub fn take(&self) -> Option<T> {
        self.lock().take()
    }

    pub fn is_filled(&self) -> bool {
        self.lock().is_some()
    }

    fn set(&self, value: T) {
        *self.lock() = Some(value);
    }

    fn lock(&self) -> MutexGuard<'_, Option<T>> {
        // A poisoned slot only means a panic happened while a test held it.
        self.0.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<T: Clone> Capture<T> {
    /// Clone the captured value, leaving it in place.
    pub fn get(&self) -> Option<T> {
        self.lock().clone()
    }
}

impl<T> Clone for Capture<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T> Default for Capture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Capture<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Capture")
            .field("filled", &self.lock().is_some())
            .finish()
    }
}

type JsonSink = Box<dyn Fn(Value) -> Result<(), serde_json::Error> + Send + Sync>;

/// How the body of a recorded request should be interpreted.
pub(crate) enum BodyDecoder {
    Json(JsonSink),
    Form(Capture<FormData>),
    PlainText(Capture<String>),
    NoBody,
}

impl fmt::Debug for BodyDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BodyDecoder::Json(_) => "Json",
            BodyDecoder::Form(_) => "Form",
            BodyDecoder::PlainText(_) => "PlainText",
            BodyDecoder::NoBody => "NoBody",
        };
        f.write_str(name)
    }
}

const JSON_TYPES: &[&str] = &["JSON"];
const FORM_TYPES: &[&str] = &["STRING"];

impl BodyDecoder {
    pub(crate) fn json<T>(capture: Capture<T>) -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        BodyDecoder::Json(Box::new(move |value| {
            capture.set(serde_json::from_value(value)?);
            Ok(())
        }))
    }

    /// Run the decoder, returning a human-readable reason on failure.
    pub(crate) fn decode(&self, body: &RecordedBody) -> Result<(), String> {
        match self {
            BodyDecoder::Json(sink) => decode_json(body, sink),
            BodyDecoder::Form(capture) => decode_form(body, capture),
            BodyDecoder::PlainText(capture) => decode_plain_text(body, capture),
            BodyDecoder::NoBody => decode_no_body(body),
        }
    }
}

fn decode_json(body: &RecordedBody, sink: &JsonSink) -> Result<(), String> {
    let value = match body {
        RecordedBody::Raw(bytes) => serde_json::from_slice::<Value>(bytes).map_err(|_| {
            format!(
                "request {} was invalid json",
                String::from_utf8_lossy(bytes)
            )
        })?,
        RecordedBody::Text(s) => serde_json::from_str::<Value>(s)
            .map_err(|_| format!("request {} was invalid json", s))?,
        RecordedBody::Wrapped(wrapper) => match body.discriminator() {
            Some("JSON") => wrapper
                .get("json")
                .cloned()
                .ok_or_else(|| format!("no json payload in body [{}]", wrapper))?,
            other => return Err(unknown_type("json", JSON_TYPES, other)),
        },
        RecordedBody::Empty => return Err("expected a json body, but got none".into()),
    };
    let payload = value.to_string();
    sink(value).map_err(|e| format!("unable to unmarshal request {}: {}", payload, e))
}

fn decode_form(body: &RecordedBody, capture: &Capture<FormData>) -> Result<(), String> {
    let line = match body.discriminator() {
        Some("STRING") => body_field(body, "string")
            .ok_or_else(|| format!("no string parameters in form [{}]", body))?,
        other => return Err(unknown_type("form", FORM_TYPES, other)),
    };

    // Parse everything first: a malformed pair must leave the capture untouched.
    let mut pairs = Vec::new();
    for pair in line.split('&') {
        let kv: Vec<&str> = pair.split('=').collect();
        match kv.as_slice() {
            [key, value] => pairs.push((key.to_string(), value.to_string())),
            _ => return Err(format!("form parameter violates requirements {:?}", kv)),
        }
    }

    let mut form = capture.take().unwrap_or_default();
    for (key, value) in pairs {
        form.entry(key).or_default().push(value);
    }
    capture.set(form);
    Ok(())
}

fn decode_plain_text(body: &RecordedBody, capture: &Capture<String>) -> Result<(), String> {
    match body {
        RecordedBody::Raw(bytes) => capture.set(String::from_utf8_lossy(bytes).into_owned()),
        RecordedBody::Text(s) => capture.set(s.clone()),
        RecordedBody::Empty => {
            return Err("expected body can not be interpreted as string: no body".into());
        }
        RecordedBody::Wrapped(v) => {
            return Err(format!(
                "expected body can not be interpreted as string {}",
                v
            ));
        }
    }
    Ok(())
}

fn decode_no_body(body: &RecordedBody) -> Result<(), String> {
    if body.is_empty() {
        Ok(())
    } else {
        Err(format!("expected no body, but got {}", body))
    }
}

fn body_field<'a>(body: &'a RecordedBody, field: &str) -> Option<&'a str> {
    match body {
        RecordedBody::Wrapped(v) => v.get(field).and_then(Value::as_str),
        _ => None,
    }
}

fn unknown_type(kind: &str, allowed: &[&str], got: Option<&str>) -> String {
    format!(
        "unknown {} type, expected one of {:?}; got {}",
        kind,
        allowed,
        got.unwrap_or("<none>")
    )
}
