use crate::wire;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use http::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// The blueprint for what the MockServer instance sends back when one of the rules compiled
/// from an [`Expectation`] matches an incoming request.
///
/// A template either describes a regular HTTP response or, via [`drop_connection`], asks the
/// MockServer to write some raw bytes and then drop the connection.
///
/// [`Expectation`]: crate::Expectation
/// [`drop_connection`]: ResponseTemplate::drop_connection
#[derive(Clone, Debug, PartialEq)]
pub struct ResponseTemplate {
    status_code: StatusCode,
    reason_phrase: Option<String>,
    headers: BTreeMap<String, Vec<String>>,
    body: Option<Value>,
    delay: Option<Duration>,
    mode: Mode,
}

#[derive(Clone, Debug, PartialEq)]
enum Mode {
    Respond,
    DropConnection { error_bytes: Vec<u8> },
}

// Same principle as the rest of the crate: templates are built in tests, so we panic on
// conversion failures instead of returning `Result`s.
impl ResponseTemplate {
    /// Start building a `ResponseTemplate` specifying the status code of the response.
    pub fn new<S>(s: S) -> Self
    where
        S: TryInto<StatusCode>,
        <S as TryInto<StatusCode>>::Error: std::fmt::Debug,
    {
        let status_code = s.try_into().expect("Failed to convert into status code.");
        Self {
            status_code,
            reason_phrase: None,
            headers: BTreeMap::new(),
            body: None,
            delay: None,
            mode: Mode::Respond,
        }
    }

    /// Insert a header `value` with `key` as header name, dropping any value previously set
    /// for the same name.
    pub fn insert_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), vec![value.into()]);
        self
    }

    /// Append a header `value` to the list of values for `key`.
    pub fn append_header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers
            .entry(key.into())
            .or_default()
            .push(value.into());
        self
    }

    /// Set the response body from a JSON-serializable value.
    pub fn set_body_json<B: Serialize>(mut self, body: B) -> Self {
        let body = serde_json::to_value(&body).expect("Failed to convert into body.");
        self.body = Some(body);
        self
    }

    /// Set the response body to a string.
    pub fn set_body_string<T: Into<String>>(mut self, body: T) -> Self {
        self.body = Some(Value::String(body.into()));
        self
    }

    /// Set the response body with bytes.
    ///
    /// MockServer expects binary bodies base64-encoded, wrapped in a `BINARY` body.
    pub fn set_body_bytes<B: AsRef<[u8]>>(mut self, body: B) -> Self {
        self.body = Some(json!({
            "type": "BINARY",
            "base64Bytes": BASE64_STANDARD.encode(body.as_ref()),
        }));
        self
    }

    /// Set the reason phrase sent along with the status code.
    pub fn set_reason_phrase<T: Into<String>>(mut self, reason: T) -> Self {
        self.reason_phrase = Some(reason.into());
        self
    }

    /// Ask the MockServer to wait before answering.
    ///
    /// Handy to exercise the timeout policies of the system under test.
    pub fn set_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Instead of answering, write `error_bytes` on the socket and drop the connection.
    ///
    /// Status code, reason phrase, headers and body are ignored for such a template; the
    /// delay is still honoured.
    pub fn drop_connection<B: Into<Vec<u8>>>(mut self, error_bytes: B) -> Self {
        self.mode = Mode::DropConnection {
            error_bytes: error_bytes.into(),
        };
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status_code
    }

    pub fn delay(&self) -> Option<Duration> {
        self.delay
    }

    pub fn drops_connection(&self) -> bool {
        matches!(self.mode, Mode::DropConnection { .. })
    }

    /// Fill the response half of a rule: exactly one of the two is set.
    pub(crate) fn to_wire(&self) -> (Option<wire::HttpResponse>, Option<wire::HttpError>) {
        let delay = wire_delay(self.delay);
        match &self.mode {
            Mode::DropConnection { error_bytes } => {
                let response_bytes = if error_bytes.is_empty() {
                    None
                } else {
                    Some(BASE64_STANDARD.encode(error_bytes))
                };
                let error = wire::HttpError {
                    delay,
                    drop_connection: true,
                    response_bytes,
                };
                (None, Some(error))
            }
            Mode::Respond => {
                let response = wire::HttpResponse {
                    body: self.body.clone().unwrap_or(Value::Null),
                    status_code: self.status_code.as_u16(),
                    reason_phrase: self.reason_phrase.clone(),
                    headers: self
                        .headers
                        .iter()
                        .map(|(k, v)| (k.clone(), Value::from(v.clone())))
                        .collect(),
                    delay,
                };
                (Some(response), None)
            }
        }
    }
}

impl Default for ResponseTemplate {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

fn wire_delay(delay: Option<Duration>) -> Option<wire::Delay> {
    match delay {
        Some(d) if !d.is_zero() => Some(wire::Delay {
            time_unit: wire::TimeUnit::Milliseconds,
            value: d.as_millis() as u64,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_responses_carry_status_headers_and_delay() {
        let template = ResponseTemplate::new(201)
            .insert_header("X-Correlation-ID", "abc")
            .append_header("Set-Cookie", "a=1")
            .append_header("Set-Cookie", "b=2")
            .set_body_json(json!({"pet-1": "JoJo"}))
            .set_delay(Duration::from_millis(1500));

        let (response, error) = template.to_wire();
        let response = response.unwrap();

        assert!(error.is_none());
        assert_eq!(response.status_code, 201);
        assert_eq!(response.headers["Set-Cookie"], json!(["a=1", "b=2"]));
        assert_eq!(response.body, json!({"pet-1": "JoJo"}));
        assert_eq!(
            response.delay,
            Some(wire::Delay {
                time_unit: wire::TimeUnit::Milliseconds,
                value: 1500
            })
        );
    }

    #[test]
    fn zero_delay_is_not_sent() {
        let (response, _) = ResponseTemplate::new(200)
            .set_delay(Duration::ZERO)
            .to_wire();

        assert_eq!(response.unwrap().delay, None);
    }

    #[test]
    fn dropped_connections_become_http_errors() {
        let template = ResponseTemplate::new(200)
            .set_delay(Duration::from_millis(500))
            .drop_connection(b"oops".to_vec());

        let (response, error) = template.to_wire();
        let error = error.unwrap();

        assert!(response.is_none());
        assert!(template.drops_connection());
        assert!(error.drop_connection);
        assert_eq!(error.response_bytes.as_deref(), Some("b29wcw=="));
        assert_eq!(error.delay.unwrap().value, 500);
    }

    #[test]
    fn bytes_bodies_are_base64_encoded() {
        let (response, _) = ResponseTemplate::new(200).set_body_bytes("hi").to_wire();

        assert_eq!(
            response.unwrap().body,
            json!({"type": "BINARY", "base64Bytes": "aGk="})
        );
    }

    #[test]
    #[should_panic]
    fn invalid_status_codes_are_rejected() {
        ResponseTemplate::new(1000u16);
    }
}
