use std::fmt;

/// Everything that can go wrong while talking to a MockServer instance or while
/// verifying the calls it recorded.
///
/// Programmer mistakes that would leave local and remote state out of sync (e.g. mounting the
/// same expectation twice) are ruled out by the type system and never show up here.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The client was configured with values it cannot work with, or it was asked about an
    /// expectation it never mounted.
    #[error("invalid configuration: {message}")]
    Configuration { message: String },
    /// A round trip to the MockServer instance failed.
    #[error("unable to {operation} {target}")]
    Transport {
        operation: Operation,
        target: String,
        #[source]
        source: TransportError,
    },
    /// One or more assertions configured on an expectation did not hold.
    #[error("verification failed on expectation {expectation}:\n{}", .failures.join("\n"))]
    Verification {
        expectation: String,
        failures: Vec<String>,
    },
}

impl Error {
    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    pub(crate) fn transport(
        operation: Operation,
        target: impl Into<String>,
        source: TransportError,
    ) -> Self {
        Error::Transport {
            operation,
            target: target.into(),
            source,
        }
    }
}

/// The remote operation that was in flight when a [`Error::Transport`] was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Setup,
    Retrieve,
    Clear,
    Reset,
    Verify,
    VerifySequence,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operation::Setup => "setup expectation",
            Operation::Retrieve => "retrieve recorded requests for",
            Operation::Clear => "clear expectation",
            Operation::Reset => "reset",
            Operation::Verify => "verify",
            Operation::VerifySequence => "verify sequence",
        };
        f.write_str(s)
    }
}

/// Failures raised by a [`Transport`](crate::Transport) implementation.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unable to call mockserver: {0}")]
    Request(#[from] reqwest::Error),
    #[error("unexpected http status {status} instead of 2xx{}", response_suffix(.body))]
    Status {
        status: http::StatusCode,
        body: Option<String>,
    },
    #[error("unable to (de)serialize mockserver payload: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

fn response_suffix(body: &Option<String>) -> String {
    match body {
        Some(body) => format!("; response: {}", body),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_show_the_response_body_when_kept() {
        let quiet = TransportError::Status {
            status: http::StatusCode::BAD_REQUEST,
            body: None,
        };
        let verbose = TransportError::Status {
            status: http::StatusCode::BAD_REQUEST,
            body: Some("incorrect request format".into()),
        };

        assert_eq!(
            quiet.to_string(),
            "unexpected http status 400 Bad Request instead of 2xx"
        );
        assert_eq!(
            verbose.to_string(),
            "unexpected http status 400 Bad Request instead of 2xx; response: incorrect request format"
        );
    }
}
