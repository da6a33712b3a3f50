//! Check the shape of the calls a MockServer instance recorded for an expectation.
use crate::body::{BodyDecoder, Capture, FormData};
use crate::error::Error;
use crate::expectation::MountedExpectation;
use crate::request::{display_value, RecordedRequest};
use log::error;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A set of structural constraints on a single recorded call, registered on an
/// [`Expectation`] with [`assertion_at_call`].
///
/// Every category is optional: what is not configured is not checked.
/// All configured constraints are evaluated independently, so a single verification pass
/// reports every problem at once.
///
/// ### Example:
/// ```rust
/// use mock_server_client::Assertion;
///
/// let assertion = Assertion::new()
///     .no_body()
///     .path("/some/endpoint")
///     .header_regex("Authorization", r"Bearer .+\..+\..+")
///     .query_parameter_regex("option", r"^dev_\d{1,2}$")
///     .no_query_parameter("foo")
///     .no_header("X-Unexpected-Header");
/// ```
///
/// [`Expectation`]: crate::Expectation
/// [`assertion_at_call`]: crate::Expectation::assertion_at_call
#[derive(Debug, Default)]
pub struct Assertion {
    body: Option<BodyDecoder>,
    path: Option<String>,
    headers: BTreeMap<String, String>,
    header_regexes: BTreeMap<String, Regex>,
    absent_headers: BTreeSet<String>,
    query_parameters: BTreeMap<String, String>,
    query_parameter_regexes: BTreeMap<String, Regex>,
    absent_query_parameters: BTreeSet<String>,
}

impl Assertion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the recorded body as JSON into `target`.
    ///
    /// Both raw JSON payloads and MockServer's `{"type": "JSON", "json": ...}` wrapper are
    /// accepted. Inspect the decoded value through `target` once verification is over.
    pub fn json_body<T>(mut self, target: Capture<T>) -> Self
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.body = Some(BodyDecoder::json(target));
        self
    }

    /// Decode an `application/x-www-form-urlencoded` body, appending every pair to `target`.
    pub fn form_body(mut self, target: Capture<FormData>) -> Self {
        self.body = Some(BodyDecoder::Form(target));
        self
    }

    /// Capture the recorded body verbatim.
    pub fn plain_text_body(mut self, target: Capture<String>) -> Self {
        self.body = Some(BodyDecoder::PlainText(target));
        self
    }

    /// Fail if the call carried a body.
    pub fn no_body(mut self) -> Self {
        self.body = Some(BodyDecoder::NoBody);
        self
    }

    /// The call must have been made on exactly this path.
    pub fn path<T: Into<String>>(mut self, path: T) -> Self {
        self.path = Some(path.into());
        self
    }

    /// The header must have been sent with `value` among its values.
    pub fn header<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Add several exact header constraints at once.
    pub fn headers<K, V, I>(mut self, headers: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.headers
            .extend(headers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// At least one value of the header must match `pattern`.
    ///
    /// Panics if `pattern` is not a valid regular expression.
    pub fn header_regex<K: Into<String>>(mut self, key: K, pattern: &str) -> Self {
        let regex = Regex::new(pattern).expect("Failed to create regex for header assertion");
        self.header_regexes.insert(key.into(), regex);
        self
    }

    /// The header must not have been sent at all.
    pub fn no_header<K: Into<String>>(mut self, key: K) -> Self {
        self.absent_headers.insert(key.into());
        self
    }

    /// The query parameter must have been sent with `value` among its values.
    pub fn query_parameter<K: Into<String>, V: Into<String>>(mut self, key: K, value: V) -> Self {
        self.query_parameters.insert(key.into(), value.into());
        self
    }

    /// Add several exact query parameter constraints at once.
    pub fn query_parameters<K, V, I>(mut self, parameters: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.query_parameters
            .extend(parameters.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// At least one value of the query parameter must match `pattern`.
    ///
    /// Panics if `pattern` is not a valid regular expression.
    pub fn query_parameter_regex<K: Into<String>>(mut self, key: K, pattern: &str) -> Self {
        let regex =
            Regex::new(pattern).expect("Failed to create regex for query parameter assertion");
        self.query_parameter_regexes.insert(key.into(), regex);
        self
    }

    /// The query parameter must not have been sent at all.
    pub fn no_query_parameter<K: Into<String>>(mut self, key: K) -> Self {
        self.absent_query_parameters.insert(key.into());
        self
    }

    /// Evaluate every configured constraint against `request`, returning all failures.
    pub(crate) fn evaluate(&self, request: &RecordedRequest) -> Vec<String> {
        let mut failures = Vec::new();
        let mut check = |outcome: Result<(), String>| {
            if let Err(reason) = outcome {
                failures.push(reason);
            }
        };

        if let Some(decoder) = &self.body {
            check(decoder.decode(&request.body));
        }
        if let Some(path) = &self.path {
            check(assert_path(request, path));
        }
        for (key, regex) in &self.query_parameter_regexes {
            check(assert_query_parameter_regex(request, key, regex));
        }
        for (key, value) in &self.query_parameters {
            check(assert_query_parameter(request, key, value));
        }
        for key in &self.absent_query_parameters {
            check(assert_no_query_parameter(request, key));
        }
        for (key, value) in &self.headers {
            check(assert_header(request, key, value));
        }
        for (key, regex) in &self.header_regexes {
            check(assert_header_regex(request, key, regex));
        }
        for key in &self.absent_headers {
            check(assert_no_header(request, key));
        }
        failures
    }
}

fn assert_path(request: &RecordedRequest, path: &str) -> Result<(), String> {
    if request.path == path {
        Ok(())
    } else {
        Err(format!("expected path {}; actual path {}", path, request.path))
    }
}

fn assert_header(request: &RecordedRequest, key: &str, value: &str) -> Result<(), String> {
    let actual = request
        .header_values(key)
        .ok_or_else(|| format!("no expected header: {}", key))?;
    if actual.iter().any(|v| v.as_str() == Some(value)) {
        Ok(())
    } else {
        Err(format!(
            "for header {} expected value {}; actual values {}",
            key,
            value,
            list(actual.iter().map(display_value))
        ))
    }
}

fn assert_header_regex(
    request: &RecordedRequest,
    key: &str,
    regex: &Regex,
) -> Result<(), String> {
    let actual = request
        .header_values(key)
        .ok_or_else(|| missing_for_pattern("header", key, regex))?;
    if actual
        .iter()
        .filter_map(Value::as_str)
        .any(|v| regex.is_match(v))
    {
        Ok(())
    } else {
        Err(format!(
            "for header {} : {} no one matches pattern: {}",
            key,
            list(actual.iter().map(display_value)),
            regex
        ))
    }
}

fn assert_no_header(request: &RecordedRequest, key: &str) -> Result<(), String> {
    match request.header_values(key) {
        None => Ok(()),
        Some(values) => Err(format!(
            "unexpected header found {} for key '{}'",
            list(values.iter().map(display_value)),
            key
        )),
    }
}

fn assert_query_parameter(
    request: &RecordedRequest,
    key: &str,
    value: &str,
) -> Result<(), String> {
    let actual = request
        .query_values(key)
        .ok_or_else(|| format!("no expected query parameter: {}", key))?;
    if actual.iter().any(|v| v == value) {
        Ok(())
    } else {
        Err(format!(
            "for query parameter {} expected value {}; actual values {}",
            key,
            value,
            list(actual.iter())
        ))
    }
}

fn assert_query_parameter_regex(
    request: &RecordedRequest,
    key: &str,
    regex: &Regex,
) -> Result<(), String> {
    let actual = request
        .query_values(key)
        .ok_or_else(|| missing_for_pattern("query parameter", key, regex))?;
    if actual.iter().any(|v| regex.is_match(v)) {
        Ok(())
    } else {
        Err(format!(
            "for query parameter {} : {} no one matches pattern: {}",
            key,
            list(actual.iter()),
            regex
        ))
    }
}

fn assert_no_query_parameter(request: &RecordedRequest, key: &str) -> Result<(), String> {
    match request.query_values(key) {
        None => Ok(()),
        Some(values) => Err(format!(
            "unexpected query parameter found {} for key '{}'",
            list(values.iter()),
            key
        )),
    }
}

fn missing_for_pattern(kind: &str, key: &str, regex: &Regex) -> String {
    format!("no expected {} {} to match pattern: {}", kind, key, regex)
}

fn list<T: fmt::Display>(values: impl Iterator<Item = T>) -> String {
    let values: Vec<String> = values.map(|v| v.to_string()).collect();
    format!("[{}]", values.join(" "))
}

/// A single reason why an expectation failed verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    /// The call the failing assertion was registered for, `None` for the call count.
    pub call: Option<usize>,
    pub reason: String,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(call) = self.call {
            writeln!(f, "Assertion at call [{}]", call)?;
        }
        write!(f, "Reason: {}", self.reason)
    }
}

/// The result of checking one expectation against the requests MockServer recorded for it.
#[derive(Debug, Clone)]
pub struct VerificationReport {
    /// The expectation name, or its id if no name was given.
    pub expectation: String,
    pub n_recorded_requests: usize,
    pub mismatches: Vec<Mismatch>,
}

impl VerificationReport {
    pub fn is_satisfied(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// The context line the mismatches are reported under.
    pub fn context(&self) -> String {
        format!("FAIL assertion:\nExpectation name [{}]", self.expectation)
    }

    pub fn error_messages(&self) -> Vec<String> {
        self.mismatches.iter().map(|m| m.to_string()).collect()
    }
}

pub(crate) enum VerificationOutcome {
    /// All assertions set on the expectation were satisfied.
    Success,
    /// One or more assertions did not hold. All mismatches are reported.
    Failure(VerificationReport),
}

impl From<VerificationReport> for VerificationOutcome {
    fn from(report: VerificationReport) -> Self {
        if report.is_satisfied() {
            VerificationOutcome::Success
        } else {
            VerificationOutcome::Failure(report)
        }
    }
}

/// Match the recorded requests against the call-count constraint and the per-call assertions
/// of `expectation`.
pub(crate) fn verify(
    expectation: &MountedExpectation,
    requests: &[RecordedRequest],
) -> VerificationReport {
    let mut mismatches = Vec::new();

    if let Some(expected) = expectation.expected_calls() {
        if requests.len() != expected {
            mismatches.push(Mismatch {
                call: None,
                reason: format!(
                    "expected num calls to {}: {}; actual: {}",
                    expectation.request_matcher().path(),
                    expected,
                    requests.len()
                ),
            });
        }
    }

    for (&call, assertion) in expectation.assertions() {
        match requests.get(call) {
            Some(request) => {
                mismatches.extend(
                    assertion
                        .evaluate(request)
                        .into_iter()
                        .map(|reason| Mismatch {
                            call: Some(call),
                            reason,
                        }),
                );
            }
            None => mismatches.push(Mismatch {
                call: Some(call),
                reason: format!(
                    "assertion index {} is out of bounds made calls {}",
                    call,
                    requests.len()
                ),
            }),
        }
    }

    VerificationReport {
        expectation: expectation.to_string(),
        n_recorded_requests: requests.len(),
        mismatches,
    }
}

/// Where verification failures end up.
///
/// For every failed verification pass, [`report`] is called once per mismatch and then
/// [`fail`] is called exactly once with the whole report.
///
/// [`report`]: Reporter::report
/// [`fail`]: Reporter::fail
pub trait Reporter {
    fn report(&mut self, context: &str, message: &str);

    fn fail(&mut self, report: &VerificationReport);
}

/// Accumulate the mismatches of a verification pass and flush them to a [`Reporter`].
pub(crate) fn flush(outcome: VerificationOutcome, reporter: &mut dyn Reporter) {
    if let VerificationOutcome::Failure(report) = outcome {
        let context = report.context();
        for message in report.error_messages() {
            reporter.report(&context, &message);
        }
        reporter.fail(&report);
    }
}

/// The default [`Reporter`]: log every mismatch and panic once with all of them.
///
/// If the thread is already panicking the failure is only logged.
#[derive(Debug, Default)]
pub struct PanicReporter {
    messages: Vec<String>,
}

impl Reporter for PanicReporter {
    fn report(&mut self, context: &str, message: &str) {
        error!("{}\n{}", context, message);
        self.messages.push(message.to_owned());
    }

    fn fail(&mut self, report: &VerificationReport) {
        let error_message = format!(
            "Verifications failed:\n{}\n{}",
            report.context(),
            std::mem::take(&mut self.messages)
                .iter()
                .map(|m| format!("- {}\n", m.replace('\n', "\n  ")))
                .collect::<String>()
        );
        if std::thread::panicking() {
            error!("{}", &error_message);
        } else {
            panic!("{}", &error_message);
        }
    }
}

/// A [`Reporter`] that keeps every failure around instead of panicking.
///
/// ### Example:
/// ```rust
/// use mock_server_client::{CollectingReporter, Mismatch, Reporter, VerificationReport};
///
/// let report = VerificationReport {
///     expectation: "pets".into(),
///     n_recorded_requests: 1,
///     mismatches: vec![Mismatch {
///         call: Some(0),
///         reason: "no expected header: Accept".into(),
///     }],
/// };
/// let mut reporter = CollectingReporter::default();
/// for message in report.error_messages() {
///     reporter.report(&report.context(), &message);
/// }
/// reporter.fail(&report);
///
/// assert!(reporter.has_failed());
/// assert!(reporter.into_result().is_err());
/// ```
#[derive(Debug, Default)]
pub struct CollectingReporter {
    failures: Vec<(String, String)>,
    failed: Vec<String>,
}

impl CollectingReporter {
    pub fn has_failed(&self) -> bool {
        !self.failed.is_empty()
    }

    /// Every message reported so far, with the context it was reported under.
    pub fn failures(&self) -> &[(String, String)] {
        &self.failures
    }

    /// `Ok` if nothing failed, otherwise an [`Error::Verification`] naming the failed
    /// expectations and carrying every message.
    pub fn into_result(self) -> Result<(), Error> {
        if self.failed.is_empty() {
            return Ok(());
        }
        Err(Error::Verification {
            expectation: self.failed.join(", "),
            failures: self.failures.into_iter().map(|(_, m)| m).collect(),
        })
    }
}

impl Reporter for CollectingReporter {
    fn report(&mut self, context: &str, message: &str) {
        self.failures.push((context.to_owned(), message.to_owned()));
    }

    fn fail(&mut self, report: &VerificationReport) {
        self.failed.push(report.expectation.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(headers: Value, query: Value, body: Value) -> RecordedRequest {
        serde_json::from_value::<crate::wire::HttpRequest>(json!({
            "method": "GET",
            "path": "/some/endpoint",
            "headers": headers,
            "queryStringParameters": query,
            "body": body
        }))
        .unwrap()
        .into()
    }

    #[test]
    fn exact_header_matches_scalars_and_lists() {
        let scalar = request(json!({"User-Agent": "curl"}), json!({}), Value::Null);
        let list = request(json!({"User-Agent": ["wget", "curl"]}), json!({}), Value::Null);
        let assertion = Assertion::new().header("User-Agent", "curl");

        assert!(assertion.evaluate(&scalar).is_empty());
        assert!(assertion.evaluate(&list).is_empty());
    }

    #[test]
    fn exact_header_failures_name_the_key() {
        let request = request(json!({"User-Agent": ["wget"]}), json!({}), Value::Null);

        let failures = Assertion::new()
            .header("User-Agent", "curl")
            .header("Accept", "text/plain")
            .evaluate(&request);

        assert_eq!(
            failures,
            vec![
                "no expected header: Accept".to_string(),
                "for header User-Agent expected value curl; actual values [wget]".to_string(),
            ]
        );
    }

    #[test]
    fn header_regex_needs_a_single_match() {
        let request = request(
            json!({"X-User-Role": ["READ_ADMIN", "READ_USER"]}),
            json!({}),
            Value::Null,
        );

        assert!(Assertion::new()
            .header_regex("X-User-Role", ".+_ADMIN")
            .evaluate(&request)
            .is_empty());

        let failures = Assertion::new()
            .header_regex("X-User-Role", "^OWNER$")
            .evaluate(&request);
        assert_eq!(
            failures,
            vec![
                "for header X-User-Role : [READ_ADMIN READ_USER] no one matches pattern: ^OWNER$"
            ]
        );
    }

    #[test]
    fn header_regex_ignores_non_string_values() {
        let request = request(json!({"X-Count": [42]}), json!({}), Value::Null);

        let failures = Assertion::new()
            .header_regex("X-Count", "4")
            .evaluate(&request);

        assert_eq!(failures.len(), 1);
    }

    #[test]
    fn absence_checks_list_every_observed_value() {
        let request = request(
            json!({"X-User-Id": "abc"}),
            json!({"option": ["dev_14", "admin_67"]}),
            Value::Null,
        );

        let failures = Assertion::new()
            .no_query_parameter("option")
            .no_query_parameter("foo")
            .no_header("X-User-Id")
            .evaluate(&request);

        assert_eq!(
            failures,
            vec![
                "unexpected query parameter found [dev_14 admin_67] for key 'option'",
                "unexpected header found [abc] for key 'X-User-Id'",
            ]
        );
    }

    #[test]
    fn query_parameter_checks() {
        let request = request(
            json!({}),
            json!({"option": ["dev_14", "admin_67"]}),
            Value::Null,
        );

        assert!(Assertion::new()
            .query_parameter("option", "admin_67")
            .query_parameter_regex("option", r"^dev_\d{1,2}$")
            .evaluate(&request)
            .is_empty());

        let failures = Assertion::new()
            .query_parameters([("option", "nope"), ("limit", "10")])
            .evaluate(&request);
        assert_eq!(
            failures,
            vec![
                "no expected query parameter: limit",
                "for query parameter option expected value nope; actual values [dev_14 admin_67]",
            ]
        );
    }

    #[test]
    fn header_checks_ignore_the_case_of_recorded_names() {
        let request = request(
            json!({
                "authorization": ["Bearer x"],
                "content-type": ["application/x-www-form-urlencoded"]
            }),
            json!({}),
            Value::Null,
        );

        let failures = Assertion::new()
            .no_header("Authorization")
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header_regex("Content-Type", "^application/")
            .evaluate(&request);

        assert_eq!(
            failures,
            vec!["unexpected header found [Bearer x] for key 'Authorization'".to_string()]
        );
    }

    #[test]
    fn regex_checks_on_missing_keys_name_the_pattern() {
        let request = request(json!({}), json!({}), Value::Null);

        let failures = Assertion::new()
            .header_regex("X-User-Role", "^ADMIN$")
            .query_parameter_regex("option", "^dev_.+$")
            .evaluate(&request);

        assert_eq!(
            failures,
            vec![
                "no expected query parameter option to match pattern: ^dev_.+$".to_string(),
                "no expected header X-User-Role to match pattern: ^ADMIN$".to_string(),
            ]
        );
    }

    #[test]
    fn every_category_is_evaluated() {
        let request = request(json!({}), json!({}), json!("unexpected"));

        let failures = Assertion::new()
            .no_body()
            .path("/elsewhere")
            .header("Accept", "application/json")
            .evaluate(&request);

        assert_eq!(failures.len(), 3);
        assert_eq!(failures[1], "expected path /elsewhere; actual path /some/endpoint");
    }

    #[test]
    fn mismatches_render_with_their_call_index() {
        let mismatch = Mismatch {
            call: Some(0),
            reason: "no expected header: Accept".into(),
        };

        assert_eq!(
            mismatch.to_string(),
            "Assertion at call [0]\nReason: no expected header: Accept"
        );
    }

    #[test]
    #[should_panic(expected = "Verifications failed:")]
    fn panic_reporter_panics_once_on_fail() {
        let report = VerificationReport {
            expectation: "pets".into(),
            n_recorded_requests: 0,
            mismatches: vec![],
        };
        let mut reporter = PanicReporter::default();
        reporter.report(&report.context(), "first");
        reporter.report(&report.context(), "second");
        reporter.fail(&report);
    }

    #[test]
    fn collected_failures_name_the_expectation_only() {
        let report = VerificationReport {
            expectation: "Submit".into(),
            n_recorded_requests: 0,
            mismatches: vec![Mismatch {
                call: None,
                reason: "expected num calls to /form/submit: 1; actual: 0".into(),
            }],
        };
        let mut reporter = CollectingReporter::default();

        flush(report.into(), &mut reporter);

        let error = reporter.into_result().unwrap_err();
        assert!(matches!(
            &error,
            Error::Verification { expectation, .. } if expectation == "Submit"
        ));
        let message = error.to_string();
        assert!(message.starts_with("verification failed on expectation Submit:\nReason: "));
    }

    #[test]
    fn nothing_is_flushed_on_success() {
        let mut reporter = CollectingReporter::default();
        let report = VerificationReport {
            expectation: "pets".into(),
            n_recorded_requests: 1,
            mismatches: vec![],
        };

        flush(report.into(), &mut reporter);

        assert!(!reporter.has_failed());
        assert!(reporter.into_result().is_ok());
    }
}
