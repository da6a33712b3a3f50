use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

use crate::body::RecordedBody;
use crate::wire;

pub const BODY_PRINT_LIMIT: usize = 10_000;

/// Specifies limitations on printing request bodies when logging recorded requests. Bodies may
/// be too large to reasonably print and it may be desirable to limit them.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum BodyPrintLimit {
    /// Maximum length of a body to print in bytes.
    Limited(usize),
    /// There is no limit to the size of a body that may be printed.
    Unlimited,
}

/// A request recorded by the MockServer instance, as returned when verifying an
/// [`Expectation`](crate::Expectation).
///
/// Header values are always exposed as a list, even when MockServer reported a single value.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub path_parameters: BTreeMap<String, Vec<String>>,
    pub query_parameters: BTreeMap<String, Vec<String>>,
    pub headers: BTreeMap<String, Vec<Value>>,
    pub body: RecordedBody,
}

impl RecordedRequest {
    /// The values of header `key`. Header names are compared case-insensitively.
    pub fn header_values(&self, key: &str) -> Option<&[Value]> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(key))
            .map(|(_, values)| values.as_slice())
    }

    pub fn query_values(&self, key: &str) -> Option<&[String]> {
        self.query_parameters.get(key).map(Vec::as_slice)
    }

    pub(crate) fn print_with_limit(
        &self,
        mut buffer: impl fmt::Write,
        body_print_limit: BodyPrintLimit,
    ) -> fmt::Result {
        write!(buffer, "{} {}", self.method, self.path)?;
        let mut separator = '?';
        for (key, values) in &self.query_parameters {
            for value in values {
                write!(buffer, "{}{}={}", separator, key, value)?;
                separator = '&';
            }
        }
        writeln!(buffer)?;
        for (name, values) in &self.headers {
            let values = values.iter().map(display_value).collect::<Vec<_>>();
            writeln!(buffer, "{}: {}", name, values.join(","))?;
        }

        let body = self.body.to_string();
        match body_print_limit {
            BodyPrintLimit::Limited(limit) if body.len() > limit => {
                let mut end = limit;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                writeln!(buffer, "{}", &body[..end])?;
                writeln!(
                    buffer,
                    "We truncated the body because it was too large: {} bytes (limit: {} bytes)",
                    body.len(),
                    limit
                )?;
                writeln!(
                    buffer,
                    "Increase this limit by setting `MOCKSERVER_BODY_PRINT_LIMIT`, or calling `MockServerClientBuilder::body_print_limit` when building your client"
                )
            }
            _ => writeln!(buffer, "{}", body),
        }
    }
}

impl fmt::Display for RecordedRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print_with_limit(f, BodyPrintLimit::Unlimited)
    }
}

impl From<wire::HttpRequest> for RecordedRequest {
    fn from(request: wire::HttpRequest) -> Self {
        let headers = request
            .headers
            .into_iter()
            .map(|(key, value)| {
                let values = match value {
                    Value::Array(values) => values,
                    other => vec![other],
                };
                (key, values)
            })
            .collect();
        Self {
            method: request.method,
            path: request.path,
            path_parameters: request.path_parameters,
            query_parameters: request.query_string_parameters,
            headers,
            body: RecordedBody::from(request.body),
        }
    }
}

/// Strings without their JSON quotes, everything else as JSON.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
