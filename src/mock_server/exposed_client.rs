use crate::error::{Error, Operation};
use crate::expectation::{Expectation, MountedExpectation};
use crate::matchers::RequestMatcher;
use crate::mock_server::MockServerClientBuilder;
use crate::request::{BodyPrintLimit, RecordedRequest};
use crate::transport::Transport;
use crate::verification::{self, PanicReporter, Reporter, VerificationOutcome, VerificationReport};
use crate::wire;
use log::debug;
use std::collections::HashMap;

/// A client for a MockServer instance running next to your tests (e.g. in a container).
///
/// It keeps a local registry of the [`Expectation`]s it mounted, so that they can be verified,
/// cleared or reset later on.
///
/// ## Best practices
///
/// Call [`reset`] before each test to make sure the expectations and recorded requests of a
/// previous test do not leak into the next one.
///
/// The registry is not synchronised: one client per test fixture. If several fixtures share a
/// MockServer instance concurrently, it is up to you to serialise them.
///
/// [`reset`]: MockServerClient::reset
pub struct MockServerClient {
    transport: Box<dyn Transport>,
    expectations: HashMap<String, MountedExpectation>,
    body_print_limit: BodyPrintLimit,
}

impl MockServerClient {
    pub(super) fn new(transport: Box<dyn Transport>, body_print_limit: BodyPrintLimit) -> Self {
        Self {
            transport,
            expectations: HashMap::new(),
            body_print_limit,
        }
    }

    /// Configure a `MockServerClient` - e.g. to point it to a specific host and port or to plug
    /// in a custom [`Transport`].
    pub fn builder() -> MockServerClientBuilder {
        MockServerClientBuilder::new()
    }

    /// Start building an [`Expectation`] for requests with the given method on the given path.
    ///
    /// The expectation is not effective until it is passed to [`setup`](MockServerClient::setup).
    pub fn on<M, P>(&self, method: M, path: P) -> Expectation
    where
        M: AsRef<str>,
        P: Into<String>,
    {
        Expectation::new(method, path)
    }

    /// Compile `expectation`, push all its rules to MockServer and register it locally.
    ///
    /// Returns the expectation id, to be used with [`verify_expectation`] and [`clear`].
    ///
    /// If a push fails, the error is returned straight away: the expectation is not registered
    /// locally and rules that were already pushed stay on MockServer until the next [`reset`].
    ///
    /// [`verify_expectation`]: MockServerClient::verify_expectation
    /// [`clear`]: MockServerClient::clear
    /// [`reset`]: MockServerClient::reset
    pub async fn setup(&mut self, expectation: Expectation) -> Result<String, Error> {
        let mounted = expectation.compile();
        for rule in mounted.rules() {
            debug!(
                "Pushing rule {} (priority {}) for expectation {}.",
                rule.id(),
                rule.priority(),
                mounted
            );
            let target = format!("{} of {}", rule.id(), mounted);
            self.transport
                .push(rule.as_wire())
                .await
                .map_err(|e| Error::transport(Operation::Setup, target, e))?;
        }
        let id = mounted.id().to_owned();
        self.expectations.insert(id.clone(), mounted);
        Ok(id)
    }

    /// Mount several expectations, in order. Stops at the first failure.
    pub async fn setup_all<I>(&mut self, expectations: I) -> Result<Vec<String>, Error>
    where
        I: IntoIterator<Item = Expectation>,
    {
        let mut ids = Vec::new();
        for expectation in expectations {
            ids.push(self.setup(expectation).await?);
        }
        Ok(ids)
    }

    /// A mounted expectation, if `id` is known to this client.
    pub fn expectation(&self, id: &str) -> Option<&MountedExpectation> {
        self.expectations.get(id)
    }

    /// Fetch the requests MockServer recorded for `matcher`, in arrival order.
    pub async fn retrieve(&self, matcher: &RequestMatcher) -> Result<Vec<RecordedRequest>, Error> {
        let requests = self
            .transport
            .retrieve(&matcher.to_wire())
            .await
            .map_err(|e| {
                Error::transport(
                    Operation::Retrieve,
                    format!("{} {}", matcher.method(), matcher.path()),
                    e,
                )
            })?;
        Ok(requests.into_iter().map(RecordedRequest::from).collect())
    }

    /// Verify every mounted expectation, panicking with all failures if any assertion does not
    /// hold.
    ///
    /// Transport failures are returned as errors.
    pub async fn verify(&self) -> Result<(), Error> {
        self.verify_with(&mut PanicReporter::default()).await
    }

    /// Verify every mounted expectation, sending failures to `reporter`.
    ///
    /// Expectations are verified in id order; `reporter` is failed once per failing
    /// expectation.
    pub async fn verify_with(&self, reporter: &mut dyn Reporter) -> Result<(), Error> {
        let mut ids: Vec<&String> = self.expectations.keys().collect();
        ids.sort();
        for id in ids {
            self.verify_mounted(&self.expectations[id], reporter).await?;
        }
        Ok(())
    }

    /// Verify a single mounted expectation, panicking with all failures if any assertion does
    /// not hold.
    pub async fn verify_expectation(&self, id: &str) -> Result<(), Error> {
        let mut reporter = PanicReporter::default();
        self.verify_expectation_with(id, &mut reporter).await
    }

    /// Verify a single mounted expectation, sending failures to `reporter`.
    pub async fn verify_expectation_with(
        &self,
        id: &str,
        reporter: &mut dyn Reporter,
    ) -> Result<(), Error> {
        let mounted = self.mounted(id)?;
        self.verify_mounted(mounted, reporter).await
    }

    /// Check a single mounted expectation and hand back the full report instead of failing.
    pub async fn verification_report(&self, id: &str) -> Result<VerificationReport, Error> {
        let mounted = self.mounted(id)?;
        let requests = self.retrieve(mounted.request_matcher()).await?;
        Ok(verification::verify(mounted, &requests))
    }

    async fn verify_mounted(
        &self,
        mounted: &MountedExpectation,
        reporter: &mut dyn Reporter,
    ) -> Result<(), Error> {
        if mounted.is_unconstrained() {
            return Ok(());
        }
        debug!("Verifying expectation {}.", mounted);
        let requests = self.retrieve(mounted.request_matcher()).await?;
        let outcome = VerificationOutcome::from(verification::verify(mounted, &requests));
        if let VerificationOutcome::Failure(_) = &outcome {
            debug!(
                "Recorded requests for expectation {}:\n{}",
                mounted,
                self.print_requests(&requests)
            );
        }
        verification::flush(outcome, reporter);
        Ok(())
    }

    /// Ask MockServer to check that it received between `at_least` and `at_most` requests
    /// matching expectation `id`.
    ///
    /// All rules of an expectation share its request matcher, so any of them identifies it.
    pub async fn verify_remote(&self, id: &str, at_least: u64, at_most: u64) -> Result<(), Error> {
        let request = wire::Verify {
            expectation_id: self.representative_rule(id)?,
            times: Some(wire::VerificationTimes { at_least, at_most }),
        };
        self.transport
            .verify(&request)
            .await
            .map_err(|e| Error::transport(Operation::Verify, id, e))
    }

    /// Ask MockServer to check that requests matching the given expectations were received in
    /// this order.
    pub async fn verify_sequence(&self, ids: &[&str]) -> Result<(), Error> {
        let expectation_ids = ids
            .iter()
            .map(|id| self.representative_rule(id))
            .collect::<Result<Vec<_>, _>>()?;
        let request = wire::VerifySequence { expectation_ids };
        self.transport
            .verify_sequence(&request)
            .await
            .map_err(|e| Error::transport(Operation::VerifySequence, ids.join(", "), e))
    }

    /// Remove the rules of expectation `id` from MockServer and forget about it locally.
    pub async fn clear(&mut self, id: &str) -> Result<(), Error> {
        let mounted = self.mounted(id)?;
        for rule in mounted.rules() {
            debug!("Clearing rule {} of expectation {}.", rule.id(), mounted);
            let request = wire::ClearRequest {
                expectation_id: wire::ExpectationId {
                    id: rule.id().to_owned(),
                },
            };
            let target = format!("{} of {}", rule.id(), mounted);
            self.transport
                .clear(&request)
                .await
                .map_err(|e| Error::transport(Operation::Clear, target, e))?;
        }
        self.expectations.remove(id);
        Ok(())
    }

    /// Remove every rule and recorded request from MockServer and forget all mounted
    /// expectations.
    pub async fn reset(&mut self) -> Result<(), Error> {
        debug!("Resetting mockserver.");
        self.transport
            .reset()
            .await
            .map_err(|e| Error::transport(Operation::Reset, "mockserver", e))?;
        self.expectations.clear();
        Ok(())
    }

    fn mounted(&self, id: &str) -> Result<&MountedExpectation, Error> {
        self.expectations
            .get(id)
            .ok_or_else(|| Error::configuration(format!("unknown expectation {}", id)))
    }

    fn representative_rule(&self, id: &str) -> Result<wire::ExpectationId, Error> {
        let mounted = self.mounted(id)?;
        // `compile` always emits at least the default rule.
        let rule = mounted
            .rules()
            .first()
            .ok_or_else(|| Error::configuration(format!("expectation {} has no rules", id)))?;
        Ok(wire::ExpectationId {
            id: rule.id().to_owned(),
        })
    }

    fn print_requests(&self, requests: &[RecordedRequest]) -> String {
        if requests.is_empty() {
            return "The server did not record any request.".into();
        }
        let mut out = String::new();
        for (index, request) in requests.iter().enumerate() {
            out.push_str(&format!("- Request #{}\n", index + 1));
            // Writing to a `String` cannot fail.
            let _ = request.print_with_limit(&mut out, self.body_print_limit);
        }
        out
    }
}
