//! Response wrapper and payload classification.
//!
//! A successful response is classified by status and content type into a
//! [`Payload`]: nothing for `204 No Content`, decoded data for JSON and text,
//! and an opaque [`BinaryResponse`] for everything else. Classification is
//! shared by the async and blocking dispatchers.

use crate::{Error, Result};
use bytes::Bytes;
use http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Negotiated content category of a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCategory {
    /// `application/json` or any `+json` type.
    Json,
    /// Any `text/*` type.
    Text,
    /// Anything else, including a missing content type.
    Binary,
}

impl ContentCategory {
    /// Classifies a `Content-Type` value, ignoring parameters and case.
    ///
    /// # Examples
    ///
    /// ```
    /// use sdk_dispatch::response::ContentCategory;
    ///
    /// assert_eq!(ContentCategory::from_mime("application/problem+json"), ContentCategory::Json);
    /// assert_eq!(ContentCategory::from_mime("text/plain; charset=utf-8"), ContentCategory::Text);
    /// assert_eq!(ContentCategory::from_mime("image/png"), ContentCategory::Binary);
    /// ```
    pub fn from_mime(content_type: &str) -> Self {
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if essence == "application/json" || essence.ends_with("+json") {
            ContentCategory::Json
        } else if essence.starts_with("text/") {
            ContentCategory::Text
        } else {
            ContentCategory::Binary
        }
    }

    /// Classifies a response by its headers.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(Self::from_mime)
            .unwrap_or(ContentCategory::Binary)
    }
}

/// A response body that is neither JSON nor text.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryResponse {
    /// The raw body.
    pub content: Bytes,
    /// The response headers.
    pub headers: HeaderMap,
}

/// The classified body of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload<T> {
    /// `204 No Content`.
    Empty,
    /// A JSON or text body decoded into `T`.
    Data(T),
    /// An opaque body.
    Binary(BinaryResponse),
}

impl<T> Payload<T> {
    /// The decoded data, if any.
    pub fn data(&self) -> Option<&T> {
        match self {
            Payload::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Consumes the payload, returning the decoded data, if any.
    pub fn into_data(self) -> Option<T> {
        match self {
            Payload::Data(data) => Some(data),
            _ => None,
        }
    }

    /// The binary body, if any.
    pub fn binary(&self) -> Option<&BinaryResponse> {
        match self {
            Payload::Binary(binary) => Some(binary),
            _ => None,
        }
    }

    /// Whether the response had no content.
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }
}

/// Classifies and decodes a successful response body.
///
/// JSON bodies are deserialized into `T`; text bodies are offered to `T` as a
/// JSON string.
///
/// # Errors
///
/// Returns [`Error::DeserializationFailed`] if the body does not fit `T`.
pub fn decode_payload<T: DeserializeOwned>(
    status: StatusCode,
    headers: &HeaderMap,
    body: Bytes,
) -> Result<Payload<T>> {
    if status == StatusCode::NO_CONTENT {
        return Ok(Payload::Empty);
    }

    let decoded = match ContentCategory::from_headers(headers) {
        ContentCategory::Json => serde_json::from_slice::<T>(&body),
        ContentCategory::Text => {
            let text = String::from_utf8_lossy(&body).into_owned();
            serde_json::from_value::<T>(Value::String(text))
        }
        ContentCategory::Binary => {
            return Ok(Payload::Binary(BinaryResponse {
                content: body,
                headers: headers.clone(),
            }))
        }
    };

    decoded.map(Payload::Data).map_err(|e| {
        tracing::error!(status = %status, error = %e, "Failed to decode response body");
        Error::DeserializationFailed {
            raw_response: String::from_utf8_lossy(&body).into_owned(),
            serde_error: e.to_string(),
            status,
        }
    })
}

/// A wrapper around a successful HTTP response.
///
/// This type provides the decoded data along with metadata about the HTTP
/// transaction: latency, status code, headers and attempt count.
///
/// # Examples
///
/// ```no_run
/// use sdk_dispatch::{Client, RequestMetadata};
/// use http::Method;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct User {
///     id: u64,
///     name: String,
/// }
///
/// # async fn example() -> Result<(), sdk_dispatch::Error> {
/// let client = Client::builder()
///     .base_url("https://api.example.com")?
///     .build()?;
///
/// let response = client
///     .request::<User>(RequestMetadata::new(Method::GET, "/users/123"))
///     .await?;
///
/// if let Some(user) = response.data.data() {
///     println!("User: {}", user.name);
/// }
/// println!("Request took {:?}", response.latency);
/// println!("Retry attempts: {}", response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Response<T> {
    /// The decoded response data.
    pub data: T,

    /// The HTTP status code of the response.
    pub status: StatusCode,

    /// The response headers.
    pub headers: HeaderMap,

    /// The total latency of the request, including all retry attempts and sleeps.
    pub latency: Duration,

    /// The number of attempts made to complete this request.
    pub attempts: usize,
}

impl<T> Response<T> {
    /// Creates a new `Response`.
    pub fn new(
        data: T,
        status: StatusCode,
        headers: HeaderMap,
        latency: Duration,
        attempts: usize,
    ) -> Self {
        Self {
            data,
            status,
            headers,
            latency,
            attempts,
        }
    }

    /// Maps the response data to a different type, preserving the metadata.
    ///
    /// # Examples
    ///
    /// ```
    /// # use sdk_dispatch::Response;
    /// # use http::{HeaderMap, StatusCode};
    /// # use std::time::Duration;
    /// let latency = Duration::from_millis(100);
    /// let response = Response::new(42, StatusCode::OK, HeaderMap::new(), latency, 1);
    ///
    /// let string_response = response.map(|n| n.to_string());
    /// assert_eq!(string_response.data, "42");
    /// ```
    pub fn map<U, F>(self, f: F) -> Response<U>
    where
        F: FnOnce(T) -> U,
    {
        Response {
            data: f(self.data),
            status: self.status,
            headers: self.headers,
            latency: self.latency,
            attempts: self.attempts,
        }
    }

    /// Returns `true` if the request required retries.
    pub fn was_retried(&self) -> bool {
        self.attempts > 1
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }
}

impl<T> AsRef<T> for Response<T> {
    fn as_ref(&self) -> &T {
        &self.data
    }
}

impl<T> std::ops::Deref for Response<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.data
    }
}
