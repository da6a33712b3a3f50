//! `mock_server_client` drives a [MockServer](https://www.mock-server.com) instance to perform
//! black-box testing of Rust applications that interact with third-party HTTP APIs.
//!
//! You declare which calls you expect, what MockServer should answer, and - once the system
//! under test has done its job - what the recorded calls should have looked like.
//!
//! # Table of Contents
//! 1. [Getting started](#getting-started)
//! 2. [Sequential responses](#sequential-responses)
//! 3. [Verification](#verification)
//! 4. [Test isolation](#test-isolation)
//! 5. [Configuration](#configuration)
//!
//! ## Getting started
//! ```rust,no_run
//! use mock_server_client::{Assertion, Capture, FormData, MockServerClient, ResponseTemplate};
//!
//! #[async_std::main]
//! async fn main() {
//!     // Talk to the MockServer instance listening on localhost:1080
//!     let mut mock_server = MockServerClient::builder().build().unwrap();
//!     mock_server.reset().await.unwrap();
//!
//!     // Arrange: when MockServer receives a POST on '/form/submit' it will respond with a 202.
//!     let form: Capture<FormData> = Capture::new();
//!     let expectation = mock_server
//!         .on("POST", "/form/submit")
//!         .default_response(ResponseTemplate::new(202))
//!         .expect_calls(1)
//!         .assertion_at_call(
//!             0,
//!             Assertion::new()
//!                 .form_body(form.clone())
//!                 .header("Content-Type", "application/x-www-form-urlencoded"),
//!         );
//!     mock_server.setup(expectation).await.unwrap();
//!
//!     // Act: exercise the system under test...
//!
//!     // Assert
//!     mock_server.verify().await.unwrap();
//!     assert_eq!(form.take().unwrap()["username"], vec!["John"]);
//! }
//! ```
//!
//! ## Sequential responses
//!
//! An [`Expectation`] can serve a list of one-shot responses, in registration order, before
//! falling back to its default response for every following call. MockServer has no native
//! support for sequences: [`Expectation::compile`] emulates them with rule priorities.
//!
//! ## Verification
//!
//! [`MockServerClient::verify`] fetches the requests MockServer recorded for each mounted
//! expectation and checks them against the call count set with [`Expectation::expect_calls`]
//! and the per-call [`Assertion`]s. Every mismatch is reported, then the test fails once.
//! Plug a different [`Reporter`] with [`MockServerClient::verify_with`] to change what
//! "failing" means.
//!
//! ## Test isolation
//!
//! MockServer state is shared by everybody talking to the same instance. Call
//! [`MockServerClient::reset`] before each test and do not run tests that share an instance in
//! parallel.
//!
//! ## Configuration
//!
//! Check [`MockServerClientBuilder`] for the available knobs and the environment variables
//! providing their defaults.
mod body;
mod error;
mod expectation;
pub mod matchers;
mod mock_server;
mod request;
mod response_template;
mod transport;
mod verification;
pub mod wire;

pub use body::{Capture, FormData, RecordedBody};
pub use error::{Error, Operation, TransportError};
pub use expectation::{CompiledRule, Expectation, MountedExpectation};
pub use mock_server::{MockServerClient, MockServerClientBuilder};
pub use request::{BodyPrintLimit, RecordedRequest};
pub use response_template::ResponseTemplate;
pub use transport::{HttpTransport, Transport};
pub use verification::{
    Assertion, CollectingReporter, Mismatch, PanicReporter, Reporter, VerificationReport,
};
