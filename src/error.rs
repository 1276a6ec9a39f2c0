//! Error types for request execution.
//!
//! Every failure surfaced by a dispatcher, an auth provider or a stream reader is
//! an [`Error`]. The variants follow the failure taxonomy of the pipeline:
//! transport faults, terminal HTTP failures, decoding failures and caller
//! defects (unknown query styles, unsupported provider operations, invalid
//! configuration). Retryable HTTP failures never surface on their own; they only
//! become an [`Error::Api`] once retries are exhausted.

use http::{HeaderMap, StatusCode};
use serde_json::Value;

/// The main error type for request execution.
///
/// # Examples
///
/// ```no_run
/// use sdk_dispatch::{Client, Error, RequestMetadata};
/// use http::Method;
///
/// # async fn example() -> Result<(), Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// match client
///     .request::<serde_json::Value>(RequestMetadata::new(Method::GET, "/endpoint"))
///     .await
/// {
///     Ok(response) => println!("Success: {:?}", response.data),
///     Err(Error::Api { status, body, .. }) => {
///         eprintln!("API error {}: {:?}", status, body);
///     }
///     Err(Error::DeserializationFailed { raw_response, serde_error, .. }) => {
///         eprintln!("Failed to decode {}: {}", raw_response, serde_error);
///     }
///     Err(e) => eprintln!("Other error: {}", e),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// A network-level error occurred (connection failed, DNS lookup failed, etc.).
    ///
    /// Transport faults are never retried by the dispatcher.
    #[error("Network error: {0}")]
    Network(#[source] reqwest::Error),

    /// The transport gave up waiting for the server.
    #[error("Request timed out")]
    Timeout,

    /// The server returned a non-success status and no retry was available.
    ///
    /// # Fields
    ///
    /// * `status` - The HTTP status code of the last response
    /// * `body` - The body parsed as JSON, or `None` when it is not valid JSON
    /// * `raw_response` - The raw response body
    /// * `headers` - The response headers
    #[error("status_code: {}, body: {}", .status.as_u16(), display_body(.body))]
    Api {
        /// The HTTP status code
        status: StatusCode,
        /// The best-effort parsed body
        body: Option<Value>,
        /// The raw response body
        raw_response: String,
        /// The response headers
        headers: HeaderMap,
    },

    /// The response body could not be decoded into the requested type.
    #[error("Failed to deserialize response (status {status}): {serde_error}")]
    DeserializationFailed {
        /// The raw payload that failed to decode
        raw_response: String,
        /// The serde error message
        serde_error: String,
        /// The HTTP status code
        status: StatusCode,
    },

    /// A query parameter was given a serialization style this crate does not know.
    #[error("query param style '{0}' not implemented")]
    UnsupportedStyle(String),

    /// An auth provider was asked to do something it cannot do.
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Invalid configuration was provided.
    ///
    /// This indicates a problem with how the client or request was configured,
    /// such as an invalid header value or an out-of-range retry status code.
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// The token endpoint answered successfully but the access token could not be extracted.
    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    /// Failed to serialize the request body.
    #[error("Failed to serialize request: {0}")]
    SerializationFailed(String),

    /// An invalid URL was provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Reading a blocking response body failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Error::Timeout
        } else {
            Error::Network(err)
        }
    }
}

impl Error {
    /// Builds an [`Error::Api`] from a terminal response.
    ///
    /// The body is parsed as JSON on a best-effort basis.
    pub fn api(status: StatusCode, headers: HeaderMap, raw_response: String) -> Self {
        let body = serde_json::from_str(&raw_response).ok();
        Error::Api {
            status,
            body,
            raw_response,
            headers,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Api { status, .. } => Some(*status),
            Error::DeserializationFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Returns the raw response body if this error has one.
    pub fn raw_response(&self) -> Option<&str> {
        match self {
            Error::Api { raw_response, .. } => Some(raw_response),
            Error::DeserializationFailed { raw_response, .. } => Some(raw_response),
            _ => None,
        }
    }

    /// Returns the parsed body of an [`Error::Api`], if it was valid JSON.
    pub fn body(&self) -> Option<&Value> {
        match self {
            Error::Api { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Returns `true` if this error signals a caller defect rather than a runtime condition.
    ///
    /// # Examples
    ///
    /// ```
    /// use sdk_dispatch::Error;
    ///
    /// assert!(Error::UnsupportedStyle("matrix".into()).is_programming_error());
    /// assert!(!Error::Timeout.is_programming_error());
    /// ```
    pub fn is_programming_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedStyle(_)
                | Error::UnsupportedOperation(_)
                | Error::ConfigurationError(_)
        )
    }
}

fn display_body(body: &Option<Value>) -> String {
    match body {
        Some(value) => value.to_string(),
        None => "None".to_string(),
    }
}

/// A specialized `Result` type for request execution.
pub type Result<T> = std::result::Result<T, Error>;
