//! Describe which incoming requests an [`Expectation`] should respond to.
//!
//! Unlike an in-process mock server, matching is performed by the remote MockServer instance:
//! a [`RequestMatcher`] is just a description that gets shipped over the wire, and it is also
//! used to fetch the requests the MockServer recorded when it is time to verify.
//!
//! [`Expectation`]: crate::Expectation
use crate::wire;
use http::Method;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

/// Match an incoming request on its method and path, plus any number of optional
/// path parameters, query parameters, headers and an expected body.
///
/// All keyed options behave like a map: setting the same key twice keeps the last value.
///
/// ### Example:
/// ```rust
/// use mock_server_client::matchers::RequestMatcher;
///
/// let matcher = RequestMatcher::new("GET", "/pets/{pet_id}")
///     .path_parameter("pet_id", "[0-9]{1}")
///     .query_parameter("expand", "owner")
///     .header("Accept", "application/json");
///
/// assert_eq!(matcher.path(), "/pets/{pet_id}");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RequestMatcher {
    method: Method,
    path: String,
    path_parameters: BTreeMap<String, String>,
    query_parameters: BTreeMap<String, String>,
    headers: BTreeMap<String, String>,
    body: Option<Value>,
}

impl RequestMatcher {
    /// Match requests with the given method on the given path.
    ///
    /// Panics if `method` is not a valid HTTP method.
    pub fn new<M, P>(method: M, path: P) -> Self
    where
        M: AsRef<str>,
        P: Into<String>,
    {
        let method = Method::from_str(&method.as_ref().to_ascii_uppercase())
            .expect("Failed to convert to HTTP method.");
        let path = path.into();
        // Prepend "/" to the path if missing.
        let path = if path.starts_with('/') {
            path
        } else {
            format!("/{}", path)
        };
        Self {
            method,
            path,
            path_parameters: BTreeMap::new(),
            query_parameters: BTreeMap::new(),
            headers: BTreeMap::new(),
            body: None,
        }
    }

    /// Require a path parameter, declared as `{key}` in the path, to match `value`.
    /// MockServer interprets `value` as a regular expression.
    pub fn path_parameter<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.path_parameters.insert(key.into(), value.into());
        self
    }

    /// Require a query parameter to be present with the given value.
    pub fn query_parameter<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query_parameters.insert(key.into(), value.into());
        self
    }

    /// Require a header to be present with the given value.
    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Require the request body to match a JSON-serializable value.
    ///
    /// Panics if `body` cannot be serialized to JSON.
    pub fn body_json<B: Serialize>(mut self, body: B) -> Self {
        let body = serde_json::to_value(body).expect("Failed to convert into body.");
        self.body = Some(body);
        self
    }

    /// Require the request body to be exactly the given string.
    pub fn body_string<T: Into<String>>(mut self, body: T) -> Self {
        self.body = Some(Value::String(body.into()));
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn to_wire(&self) -> wire::HttpRequest {
        wire::HttpRequest {
            method: self.method.to_string(),
            path: self.path.clone(),
            path_parameters: single_valued(&self.path_parameters),
            query_string_parameters: single_valued(&self.query_parameters),
            headers: single_valued(&self.headers)
                .into_iter()
                .map(|(k, v)| (k, Value::from(v)))
                .collect(),
            body: self.body.clone().unwrap_or(Value::Null),
        }
    }
}

pub(crate) fn single_valued(m: &BTreeMap<String, String>) -> BTreeMap<String, Vec<String>> {
    m.iter()
        .map(|(k, v)| (k.clone(), vec![v.clone()]))
        .collect()
}
