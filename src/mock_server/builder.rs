use crate::error::Error;
use crate::mock_server::MockServerClient;
use crate::request::{BodyPrintLimit, BODY_PRINT_LIMIT};
use crate::transport::{HttpTransport, Transport};
use std::env;
use std::time::Duration;
use url::Url;

const DEFAULT_HOST: &str = "localhost";
const DEFAULT_PORT: u16 = 1080;

/// A builder providing a fluent API to assemble a [`MockServerClient`] step-by-step.
/// Use [`MockServerClient::builder`] to get started.
///
/// Defaults are read from the environment:
/// - `MOCKSERVER_HOST` (default `localhost`);
/// - `MOCKSERVER_PORT` (default `1080`);
/// - `MOCKSERVER_VERBOSE`, `true` or `1` to include MockServer's answer in transport errors;
/// - `MOCKSERVER_BODY_PRINT_LIMIT`, the maximum number of body bytes to log per recorded request.
pub struct MockServerClientBuilder {
    host: String,
    port: u16,
    verbose: bool,
    timeout: Option<Duration>,
    body_print_limit: BodyPrintLimit,
    transport: Option<Box<dyn Transport>>,
}

impl MockServerClientBuilder {
    pub(super) fn new() -> Self {
        let host = env::var("MOCKSERVER_HOST").unwrap_or_else(|_| DEFAULT_HOST.to_string());
        let port = env::var("MOCKSERVER_PORT")
            .ok()
            .and_then(|x| x.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let verbose = matches!(
            env::var("MOCKSERVER_VERBOSE").as_deref(),
            Ok("true") | Ok("1")
        );
        let body_print_limit = match env::var("MOCKSERVER_BODY_PRINT_LIMIT")
            .ok()
            .and_then(|x| x.parse::<usize>().ok())
        {
            Some(limit) => BodyPrintLimit::Limited(limit),
            None => BodyPrintLimit::Limited(BODY_PRINT_LIMIT),
        };
        Self {
            host,
            port,
            verbose,
            timeout: None,
            body_print_limit,
            transport: None,
        }
    }

    /// The host MockServer is reachable on.
    pub fn host<T: Into<String>>(mut self, host: T) -> Self {
        self.host = host.into();
        self
    }

    /// The port MockServer is listening on.
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Include MockServer's response body in transport errors.
    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Give up on any single round trip to MockServer after `timeout`.
    ///
    /// By default there is no timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Recorded requests are logged at `debug` level when verification fails.
    /// By default, the size of the logged body is limited.
    pub fn body_print_limit(mut self, limit: BodyPrintLimit) -> Self {
        self.body_print_limit = limit;
        self
    }

    /// Use a custom [`Transport`] instead of talking HTTP to `host:port`.
    ///
    /// `host`, `port`, `verbose` and `timeout` are ignored when a transport is provided.
    pub fn transport<T: Transport + 'static>(mut self, transport: T) -> Self {
        self.transport = Some(Box::new(transport));
        self
    }

    /// The URL MockServer's REST API is reachable on.
    pub fn base_url(&self) -> Result<Url, Error> {
        Url::parse(&format!("http://{}:{}/", self.host, self.port)).map_err(|e| {
            Error::configuration(format!(
                "invalid mockserver address {}:{}: {}",
                self.host, self.port, e
            ))
        })
    }

    /// Finalise the builder and get a [`MockServerClient`].
    pub fn build(self) -> Result<MockServerClient, Error> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => {
                let base_url = self.base_url()?;
                match HttpTransport::new(base_url, self.verbose, self.timeout) {
                    Ok(transport) => Box::new(transport),
                    Err(e) => {
                        let message = format!("unable to build http client: {}", e);
                        return Err(Error::configuration(message));
                    }
                }
            }
        };
        Ok(MockServerClient::new(transport, self.body_print_limit))
    }
}
