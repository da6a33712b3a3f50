use crate::matchers::RequestMatcher;
use crate::response_template::ResponseTemplate;
use crate::verification::Assertion;
use crate::wire;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Given a [`RequestMatcher`], an `Expectation` describes how a MockServer instance should answer
/// matching requests and what the recorded calls should look like afterwards.
///
/// Responses come in two flavours:
/// - sequential responses, each served **once**, in the order they were registered;
/// - a default response, served indefinitely once all sequential responses have been used up.
///
/// `Expectation`s have to be mounted with [`MockServerClient::setup`] to become effective.
/// Mounting consumes the `Expectation`: what has been pushed to MockServer can no longer be
/// changed locally.
///
/// ### Example:
/// ```rust,no_run
/// use mock_server_client::{Assertion, MockServerClient, ResponseTemplate};
///
/// #[async_std::main]
/// async fn main() {
///     let mut mock_server = MockServerClient::builder().build().unwrap();
///
///     let expectation = mock_server
///         .on("GET", "/pets/{pet_id}")
///         .request(|r| r.path_parameter("pet_id", "[0-9]{1}"))
///         .sequential_response(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "JoJo"})))
///         .sequential_response(ResponseTemplate::new(200).set_body_json(serde_json::json!({"name": "PoPo"})))
///         .default_response(ResponseTemplate::new(404))
///         .expect_calls(4)
///         .assertion_at_call(0, Assertion::new().no_body().path("/pets/1"));
///     let id = mock_server.setup(expectation).await.unwrap();
///
///     // ... exercise the system under test ...
///
///     mock_server.verify_expectation(&id).await.unwrap();
/// }
/// ```
///
/// Compiling twice is impossible - the first compilation takes ownership:
/// ```rust,compile_fail
/// use mock_server_client::Expectation;
///
/// let expectation = Expectation::new("GET", "/pets");
/// let first = expectation.compile();
/// let second = expectation.compile();
/// ```
///
/// [`MockServerClient::setup`]: crate::MockServerClient::setup
#[derive(Debug)]
pub struct Expectation {
    id: String,
    name: Option<String>,
    request: RequestMatcher,
    sequential_responses: Vec<ResponseTemplate>,
    default_response: Option<ResponseTemplate>,
    assertions: BTreeMap<usize, Assertion>,
    expected_calls: Option<usize>,
}

impl Expectation {
    /// Start building an `Expectation` for requests with the given method on the given path.
    ///
    /// Usually created through [`MockServerClient::on`](crate::MockServerClient::on).
    pub fn new<M, P>(method: M, path: P) -> Self
    where
        M: AsRef<str>,
        P: Into<String>,
    {
        Self {
            id: Uuid::new_v4().to_string(),
            name: None,
            request: RequestMatcher::new(method, path),
            sequential_responses: Vec::new(),
            default_response: None,
            assertions: BTreeMap::new(),
            expected_calls: None,
        }
    }

    /// The generated identifier of this expectation.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Assign a name to the expectation.
    ///
    /// The name shows up in verification failures instead of the generated id:
    /// ```text
    /// FAIL assertion:
    /// Expectation name [Submit headers]
    /// Assertion at call [0]
    /// Reason: unexpected query parameter found [dev_modifier_14 admin_change_67] for key 'option'
    /// ```
    pub fn named<T: Into<String>>(mut self, name: T) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Refine the request matcher - e.g. with path parameters, query parameters or headers.
    pub fn request<F>(mut self, refine: F) -> Self
    where
        F: FnOnce(RequestMatcher) -> RequestMatcher,
    {
        self.request = refine(self.request);
        self
    }

    /// Append a response that is served once, after all previously registered sequential
    /// responses have been served.
    pub fn sequential_response(mut self, template: ResponseTemplate) -> Self {
        self.sequential_responses.push(template);
        self
    }

    /// The response served once all sequential responses have been used up.
    ///
    /// Defaults to an empty `200 OK`.
    pub fn default_response(mut self, template: ResponseTemplate) -> Self {
        self.default_response = Some(template);
        self
    }

    /// Expect exactly `n` matching calls when verifying.
    pub fn expect_calls(mut self, n: usize) -> Self {
        self.expected_calls = Some(n);
        self
    }

    /// Check the shape of the `call`-th matching request (0-indexed) when verifying.
    ///
    /// Registering another assertion for the same call replaces the previous one.
    pub fn assertion_at_call(mut self, call: usize, assertion: Assertion) -> Self {
        self.assertions.insert(call, assertion);
        self
    }

    /// Turn the expectation into the rules MockServer understands.
    ///
    /// MockServer has no notion of "these responses in order, then that one": it only knows
    /// rule priorities and how many times a rule may still fire. Sequencing is obtained by
    /// giving each one-shot sequential rule a higher priority than the next one, with the
    /// default rule at the bottom and no limit on its use.
    pub fn compile(self) -> MountedExpectation {
        let k = self.sequential_responses.len();
        let request = self.request.to_wire();

        let mut rules: Vec<CompiledRule> = self
            .sequential_responses
            .iter()
            .enumerate()
            .map(|(i, template)| {
                CompiledRule::new(
                    &request,
                    template,
                    (k + 1 - i) as i64,
                    wire::Times {
                        remaining_times: 1,
                        unlimited: false,
                    },
                )
            })
            .collect();

        let default_response = self.default_response.unwrap_or_default();
        rules.push(CompiledRule::new(
            &request,
            &default_response,
            DEFAULT_PRIORITY,
            wire::Times {
                remaining_times: 0,
                unlimited: true,
            },
        ));

        MountedExpectation {
            id: self.id,
            name: self.name,
            request: self.request,
            rules,
            assertions: self.assertions,
            expected_calls: self.expected_calls,
        }
    }
}

const DEFAULT_PRIORITY: i64 = 0;

/// One rule as pushed to MockServer.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledRule {
    inner: wire::Expectation,
}

impl CompiledRule {
    fn new(
        request: &wire::HttpRequest,
        template: &ResponseTemplate,
        priority: i64,
        times: wire::Times,
    ) -> Self {
        let (http_response, http_error) = template.to_wire();
        Self {
            inner: wire::Expectation {
                id: Uuid::new_v4().to_string(),
                priority,
                http_request: Some(request.clone()),
                http_response,
                http_error,
                times: Some(times),
                time_to_live: Some(wire::TimeToLive::unlimited()),
            },
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn priority(&self) -> i64 {
        self.inner.priority
    }

    /// `None` if the rule can fire an unlimited number of times.
    pub fn remaining_times(&self) -> Option<u64> {
        match self.inner.times {
            Some(t) if !t.unlimited => Some(t.remaining_times),
            _ => None,
        }
    }

    pub fn as_wire(&self) -> &wire::Expectation {
        &self.inner
    }
}

/// An [`Expectation`] that has been compiled into rules.
///
/// It cannot be changed anymore: it is only used to verify the recorded calls and to remove the
/// rules from MockServer.
#[derive(Debug)]
pub struct MountedExpectation {
    id: String,
    name: Option<String>,
    request: RequestMatcher,
    rules: Vec<CompiledRule>,
    assertions: BTreeMap<usize, Assertion>,
    expected_calls: Option<usize>,
}

impl MountedExpectation {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn request_matcher(&self) -> &RequestMatcher {
        &self.request
    }

    /// Sequential rules in registration order, followed by the default rule.
    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn expected_calls(&self) -> Option<usize> {
        self.expected_calls
    }

    pub(crate) fn assertions(&self) -> &BTreeMap<usize, Assertion> {
        &self.assertions
    }

    /// Nothing to check: no call count and no assertions.
    pub(crate) fn is_unconstrained(&self) -> bool {
        self.expected_calls.is_none() && self.assertions.is_empty()
    }
}

impl fmt::Display for MountedExpectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name.as_deref().unwrap_or(&self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequential_rules_come_first_with_decreasing_priorities() {
        let mounted = Expectation::new("GET", "/pets")
            .sequential_response(ResponseTemplate::new(200))
            .sequential_response(ResponseTemplate::new(201))
            .sequential_response(ResponseTemplate::new(202))
            .default_response(ResponseTemplate::new(404))
            .compile();

        let rules = mounted.rules();
        let priorities: Vec<i64> = rules.iter().map(CompiledRule::priority).collect();
        let statuses: Vec<u16> = rules
            .iter()
            .map(|r| r.as_wire().http_response.as_ref().unwrap().status_code)
            .collect();

        let remaining: Vec<Option<u64>> = rules.iter().map(CompiledRule::remaining_times).collect();

        assert_eq!(priorities, vec![4, 3, 2, 0]);
        assert_eq!(statuses, vec![200, 201, 202, 404]);
        assert_eq!(remaining, vec![Some(1), Some(1), Some(1), None]);
    }

    #[test]
    fn all_rules_share_the_matcher_and_live_forever() {
        let mounted = Expectation::new("POST", "/pets")
            .request(|r| r.header("Content-Type", "application/json"))
            .sequential_response(ResponseTemplate::new(201))
            .compile();

        let request = mounted.request_matcher().to_wire();
        for rule in mounted.rules() {
            assert_eq!(rule.as_wire().http_request.as_ref(), Some(&request));
            assert_eq!(rule.as_wire().time_to_live, Some(wire::TimeToLive::unlimited()));
        }
        assert_ne!(mounted.rules()[0].id(), mounted.rules()[1].id());
    }

    #[test]
    fn no_sequential_responses_leaves_only_the_default_rule() {
        let mounted = Expectation::new("GET", "/pets").compile();

        assert_eq!(mounted.rules().len(), 1);
        let rule = mounted.rules()[0].as_wire();
        assert_eq!(rule.priority, 0);
        assert_eq!(
            rule.times,
            Some(wire::Times {
                remaining_times: 0,
                unlimited: true
            })
        );
        assert_eq!(rule.http_response.as_ref().unwrap().status_code, 200);
    }

    #[test]
    fn dropped_connections_compile_to_http_errors() {
        let mounted = Expectation::new("GET", "/some/endpoint")
            .default_response(ResponseTemplate::new(200).drop_connection("boom"))
            .compile();

        let rule = mounted.rules()[0].as_wire();
        assert!(rule.http_response.is_none());
        assert!(rule.http_error.as_ref().unwrap().drop_connection);
    }

    #[test]
    fn display_prefers_the_name() {
        let unnamed = Expectation::new("GET", "/");
        let id = unnamed.id().to_owned();

        assert_eq!(unnamed.compile().to_string(), id);
        assert_eq!(
            Expectation::new("GET", "/")
                .named("Timeout endpoint submission")
                .compile()
                .to_string(),
            "Timeout endpoint submission"
        );
    }

    #[test]
    fn verification_settings_survive_compilation() {
        let mounted = Expectation::new("GET", "/")
            .expect_calls(3)
            .assertion_at_call(1, Assertion::new().no_body())
            .compile();

        assert_eq!(mounted.expected_calls(), Some(3));
        assert!(mounted.assertions().contains_key(&1));
        assert!(!mounted.is_unconstrained());
        assert!(Expectation::new("GET", "/").compile().is_unconstrained());
    }
}
