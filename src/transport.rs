//! How the client talks to a MockServer instance.
use crate::error::TransportError;
use crate::wire;
use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use url::Url;

/// The remote side of [`MockServerClient`]: a registrar for rules and a recorder of the requests
/// they matched.
///
/// [`HttpTransport`] talks to a real MockServer over its REST API; implement this trait to plug
/// in anything else (e.g. an in-memory fake in your own tests).
///
/// Calls are made one at a time, in order, and awaited before the next one starts.
///
/// [`MockServerClient`]: crate::MockServerClient
#[async_trait]
pub trait Transport: Send + Sync {
    /// Register one rule.
    async fn push(&self, expectation: &wire::Expectation) -> Result<(), TransportError>;

    /// Fetch, in arrival order, the requests recorded for a matcher.
    async fn retrieve(
        &self,
        matcher: &wire::HttpRequest,
    ) -> Result<Vec<wire::HttpRequest>, TransportError>;

    /// Remove one rule.
    async fn clear(&self, request: &wire::ClearRequest) -> Result<(), TransportError>;

    /// Remove all rules and recorded requests.
    async fn reset(&self) -> Result<(), TransportError>;

    /// Ask MockServer to check how many times a rule was matched.
    async fn verify(&self, request: &wire::Verify) -> Result<(), TransportError>;

    /// Ask MockServer to check that rules were matched in a given order.
    async fn verify_sequence(&self, request: &wire::VerifySequence) -> Result<(), TransportError>;
}

const EXPECTATION_URI: &str = "expectation";
const RETRIEVE_URI: &str = "retrieve";
const CLEAR_URI: &str = "clear";
const RESET_URI: &str = "reset";
const VERIFY_URI: &str = "verify";
const VERIFY_SEQUENCE_URI: &str = "verifySequence";

/// A [`Transport`] speaking MockServer's REST API over HTTP.
///
/// Every operation is a `PUT` with a JSON body. Any status outside of `2xx` is an error; the
/// response body is included in the error when the transport is verbose.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    verbose: bool,
}

impl HttpTransport {
    pub fn new(
        base_url: Url,
        verbose: bool,
        timeout: Option<Duration>,
    ) -> Result<Self, TransportError> {
        let mut builder = Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            base_url,
            verbose,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn put<B: Serialize + ?Sized>(
        &self,
        uri: &str,
        body: Option<&B>,
    ) -> Result<String, TransportError> {
        let url = self
            .base_url
            .join(uri)
            .map_err(|e| TransportError::Other(format!("invalid endpoint {}: {}", uri, e)))?;
        debug!("PUT {}", url);

        let mut request = self.client.put(url);
        if let Some(body) = body {
            request = request.body(serde_json::to_vec(body)?);
            request = request.header(http::header::CONTENT_TYPE, "application/json");
        }
        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(TransportError::Status {
                status,
                body: self.verbose.then_some(text),
            });
        }
        Ok(text)
    }

    async fn put_and_parse<B, T>(&self, uri: &str, body: &B) -> Result<T, TransportError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let text = self.put(uri, Some(body)).await?;
        if text.trim().is_empty() {
            // MockServer answers an empty body when nothing was recorded.
            return Ok(serde_json::from_str("[]")?);
        }
        Ok(serde_json::from_str(&text)?)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn push(&self, expectation: &wire::Expectation) -> Result<(), TransportError> {
        self.put(EXPECTATION_URI, Some(expectation)).await?;
        Ok(())
    }

    async fn retrieve(
        &self,
        matcher: &wire::HttpRequest,
    ) -> Result<Vec<wire::HttpRequest>, TransportError> {
        self.put_and_parse(RETRIEVE_URI, matcher).await
    }

    async fn clear(&self, request: &wire::ClearRequest) -> Result<(), TransportError> {
        self.put(CLEAR_URI, Some(request)).await?;
        Ok(())
    }

    async fn reset(&self) -> Result<(), TransportError> {
        self.put::<()>(RESET_URI, None).await?;
        Ok(())
    }

    async fn verify(&self, request: &wire::Verify) -> Result<(), TransportError> {
        self.put(VERIFY_URI, Some(request)).await?;
        Ok(())
    }

    async fn verify_sequence(&self, request: &wire::VerifySequence) -> Result<(), TransportError> {
        self.put(VERIFY_SEQUENCE_URI, Some(request)).await?;
        Ok(())
    }
}
