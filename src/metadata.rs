//! Per-call request metadata and options.

use crate::{
    query::{self, QueryParams, QueryValue},
    request::{parse_header, Body, Multipart, DEFAULT_SERVICE},
    retry::RetryConfig,
    Error, Result,
};
use bytes::Bytes;
use http::{HeaderMap, Method};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;

/// Per-call overrides supplied by the caller.
///
/// Additional headers and parameters are layered over everything the
/// generated operation sets; `retries` is merged field-by-field over the
/// client-wide retry configuration.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Timeout for this call only.
    pub timeout: Option<Duration>,

    /// Headers layered over the operation's headers.
    pub additional_headers: HeaderMap,

    /// Query parameters layered over the operation's parameters.
    pub additional_params: QueryParams,

    /// Retry overrides for this call.
    pub retries: Option<RetryConfig>,
}

impl RequestOptions {
    /// Creates empty options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the timeout for this call.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Adds a header.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn additional_header(
        mut self,
        name: impl AsRef<str>,
        value: impl AsRef<str>,
    ) -> Result<Self> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.additional_headers.insert(name, value);
        Ok(self)
    }

    /// Adds a query parameter.
    pub fn additional_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<QueryValue>,
    ) -> Self {
        self.additional_params.insert(key.into(), value.into());
        self
    }

    /// Overrides retry settings for this call.
    pub fn retries(mut self, retries: RetryConfig) -> Self {
        self.retries = Some(retries);
        self
    }
}

/// Metadata for an individual HTTP request.
///
/// This carries everything a generated operation knows about one call:
/// method, path, target service, headers, encoded query parameters, body,
/// content type, the names of the auth schemes it accepts, and the caller's
/// [`RequestOptions`].
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    /// The HTTP method (GET, POST, etc.).
    pub method: Method,

    /// The request path (relative to the service URL).
    pub path: String,

    /// The service whose base URL the path is resolved against.
    pub service: Option<String>,

    /// Headers for this request.
    pub headers: HeaderMap,

    /// Encoded query parameters for this request.
    pub query_params: QueryParams,

    /// The request body.
    pub body: Body,

    /// The `Content-Type` header; always wins over any other source.
    pub content_type: Option<String>,

    /// Auth scheme names, applied in order.
    pub auth_names: Vec<String>,

    /// Caller overrides.
    pub options: RequestOptions,
}

impl RequestMetadata {
    /// Creates a new `RequestMetadata` with the given method and path.
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            service: None,
            headers: HeaderMap::new(),
            query_params: QueryParams::new(),
            body: Body::None,
            content_type: None,
            auth_names: Vec::new(),
            options: RequestOptions::default(),
        }
    }

    /// Targets a named service instead of the default one.
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Adds a header to the request.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Adds an already-encoded query parameter to the request.
    pub fn with_query_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<QueryValue>,
    ) -> Self {
        self.query_params.insert(key.into(), value.into());
        self
    }

    /// Encodes a parameter with an OpenAPI style and adds it to the request.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedStyle`] for an unknown style name.
    pub fn with_styled_query_param(
        mut self,
        key: &str,
        value: &Value,
        style: &str,
        explode: bool,
    ) -> Result<Self> {
        query::encode_query_param(&mut self.query_params, key, value, style, explode)?;
        Ok(self)
    }

    /// Sets a JSON body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if `body` cannot be serialized.
    pub fn with_json<B: Serialize>(mut self, body: &B) -> Result<Self> {
        let value =
            serde_json::to_value(body).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        self.body = Body::Json(value);
        self.content_type = Some("application/json".to_string());
        Ok(self)
    }

    /// Sets a form body, encoding each top-level field with its style.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SerializationFailed`] if `body` is not an object and
    /// [`Error::UnsupportedStyle`] for an unknown style.
    pub fn with_form<B: Serialize>(
        mut self,
        body: &B,
        styles: &HashMap<String, String>,
        explode: &HashMap<String, bool>,
    ) -> Result<Self> {
        let value =
            serde_json::to_value(body).map_err(|e| Error::SerializationFailed(e.to_string()))?;
        self.body = Body::Form(query::to_form_urlencoded(&value, styles, explode)?);
        self.content_type = Some("application/x-www-form-urlencoded".to_string());
        Ok(self)
    }

    /// Sets a raw body with its content type.
    pub fn with_bytes(mut self, body: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        self.body = Body::Raw(body.into());
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets a multipart body. The transport chooses the boundary and content type.
    pub fn with_multipart(mut self, body: Multipart) -> Self {
        self.body = Body::Multipart(body);
        self.content_type = None;
        self
    }

    /// Overrides the content type.
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Appends an auth scheme name.
    pub fn with_auth(mut self, name: impl Into<String>) -> Self {
        self.auth_names.push(name.into());
        self
    }

    /// Sets the caller's options.
    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    /// The service this request targets.
    pub fn service(&self) -> &str {
        self.service.as_deref().unwrap_or(DEFAULT_SERVICE)
    }
}
