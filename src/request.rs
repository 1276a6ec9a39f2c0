//! Request descriptors and the stages that assemble them.
//!
//! A [`RequestDescriptor`] is the fully specified, not-yet-sent form of one HTTP
//! call. Each builder stage consumes a descriptor and returns the updated one, so
//! nothing outside the current call observes a half-built request.

use crate::{
    auth::AuthProvider,
    metadata::RequestMetadata,
    query::{QueryParams, QueryValue},
    Error, Result,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Service name used when a request does not name one.
pub const DEFAULT_SERVICE: &str = "default";

/// The body of a request.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Body {
    /// No body.
    #[default]
    None,
    /// A JSON document.
    Json(Value),
    /// `application/x-www-form-urlencoded` fields.
    Form(QueryParams),
    /// Raw bytes, sent as-is.
    Raw(Bytes),
    /// `multipart/form-data` files and fields.
    Multipart(Multipart),
}

/// Files and text fields of a multipart body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Multipart {
    /// File parts.
    pub files: Vec<FilePart>,
    /// Plain text fields.
    pub fields: Vec<(String, String)>,
}

impl Multipart {
    /// Creates an empty multipart body.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file part.
    pub fn file(mut self, part: FilePart) -> Self {
        self.files.push(part);
        self
    }

    /// Adds a text field.
    pub fn text(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((name.into(), value.into()));
        self
    }
}

/// One file of a multipart body.
#[derive(Debug, Clone, PartialEq)]
pub struct FilePart {
    /// The form field name.
    pub field: String,
    /// The file name reported to the server.
    pub file_name: Option<String>,
    /// The MIME type of the content.
    pub content_type: Option<String>,
    /// The file content.
    pub content: Bytes,
}

impl FilePart {
    /// Creates a part from its field name and content.
    pub fn new(field: impl Into<String>, content: impl Into<Bytes>) -> Self {
        Self {
            field: field.into(),
            file_name: None,
            content_type: None,
            content: content.into(),
        }
    }

    /// Sets the file name.
    pub fn file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    /// Sets the MIME type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// A fully assembled HTTP call.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// The HTTP method.
    pub method: Method,
    /// The absolute request URL.
    pub url: String,
    /// Request headers; inserting an existing name replaces it.
    pub headers: HeaderMap,
    /// Encoded query parameters.
    pub query: QueryParams,
    /// Cookies, sent as a single `Cookie` header.
    pub cookies: BTreeMap<String, String>,
    /// The request body.
    pub body: Body,
    /// Per-request timeout; `None` uses the transport default.
    pub timeout: Option<Duration>,
}

impl RequestDescriptor {
    /// Creates an empty descriptor for `method` and `url`.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            query: QueryParams::new(),
            cookies: BTreeMap::new(),
            body: Body::None,
            timeout: None,
        }
    }

    /// Sets a header, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.headers.insert(name, value);
        Ok(self)
    }

    /// Copies every header of `headers` over the current ones.
    pub fn with_headers(mut self, headers: &HeaderMap) -> Self {
        merge_headers(&mut self.headers, headers);
        self
    }

    /// Sets a query parameter, replacing any previous value.
    pub fn with_query_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<QueryValue>,
    ) -> Self {
        self.query.insert(key.into(), value.into());
        self
    }

    /// Copies every parameter of `params` over the current ones.
    pub fn with_query_params(mut self, params: &QueryParams) -> Self {
        self.query
            .extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Sets a cookie.
    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.insert(name.into(), value.into());
        self
    }

    /// Sets `Authorization: Basic <credentials>`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns an error if the encoded credentials are not a valid header value.
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Result<Self> {
        let credentials = STANDARD.encode(format!("{username}:{password}"));
        let mut value = HeaderValue::try_from(format!("Basic {credentials}"))
            .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(self)
    }

    /// Sets the body.
    pub fn with_body(mut self, body: Body) -> Self {
        self.body = body;
        self
    }

    /// Sets the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns a header value by name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)?.to_str().ok()
    }

    /// Renders the cookies as a `Cookie` header value.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }
        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// The headers to put on the wire.
    ///
    /// Cookies are folded into one `Cookie` header; a cookie set on the
    /// descriptor replaces a same-named one from an explicit `Cookie` header.
    /// Multipart bodies drop the content type so the transport can add the
    /// boundary.
    pub(crate) fn transport_headers(&self) -> Result<HeaderMap> {
        let mut headers = self.headers.clone();
        if matches!(self.body, Body::Multipart(_)) {
            headers.remove(CONTENT_TYPE);
        }
        if self.cookies.is_empty() {
            return Ok(headers);
        }

        let mut pairs: Vec<String> = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .map(str::trim)
            .filter(|pair| {
                let name = pair.split('=').next().unwrap_or_default();
                !pair.is_empty() && !self.cookies.contains_key(name)
            })
            .map(str::to_string)
            .collect();
        pairs.extend(self.cookies.iter().map(|(name, value)| format!("{name}={value}")));

        let value = HeaderValue::try_from(pairs.join("; "))
            .map_err(|e| Error::ConfigurationError(format!("Invalid cookie: {}", e)))?;
        headers.insert(COOKIE, value);
        Ok(headers)
    }
}

pub(crate) fn parse_header(name: &str, value: &str) -> Result<(HeaderName, HeaderValue)> {
    let name = HeaderName::try_from(name)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header name: {}", e)))?;
    let value = HeaderValue::try_from(value)
        .map_err(|e| Error::ConfigurationError(format!("Invalid header value: {}", e)))?;
    Ok((name, value))
}

fn merge_headers(target: &mut HeaderMap, source: &HeaderMap) {
    for (name, value) in source {
        target.insert(name.clone(), value.clone());
    }
}

/// Joins a base URL and a path with exactly one `/`.
///
/// One trailing slash is stripped from `base` and one leading slash from `path`.
///
/// # Examples
///
/// ```
/// use sdk_dispatch::request::join_url;
///
/// assert_eq!(join_url("https://api.example.com/", "/users"), "https://api.example.com/users");
/// assert_eq!(join_url("", "/users"), "/users");
/// ```
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.strip_suffix('/').unwrap_or(base);
    let path = path.strip_prefix('/').unwrap_or(path);
    format!("{base}/{path}")
}

/// Client-wide inputs shared by every request: service URLs, default headers and
/// named auth providers.
#[derive(Debug, Clone, Default)]
pub(crate) struct DescriptorBuilder {
    pub(crate) base_urls: HashMap<String, String>,
    pub(crate) default_headers: HeaderMap,
    pub(crate) auths: HashMap<String, AuthProvider>,
}

impl DescriptorBuilder {
    /// Resolves `path` against the URL of `service` (empty when unknown).
    pub(crate) fn build_url(&self, path: &str, service: Option<&str>) -> String {
        let base = self
            .base_urls
            .get(service.unwrap_or(DEFAULT_SERVICE))
            .map(String::as_str)
            .unwrap_or("");
        join_url(base, path)
    }

    /// Builds the descriptor for one call, without auth contributions.
    ///
    /// Headers are layered as client defaults, then per-call headers, then the
    /// options' additional headers; the content type always wins over all of
    /// them. Query parameters are layered the same way.
    pub(crate) fn prepare(&self, metadata: &RequestMetadata) -> Result<RequestDescriptor> {
        let options = &metadata.options;
        let mut descriptor = RequestDescriptor::new(
            metadata.method.clone(),
            self.build_url(&metadata.path, Some(metadata.service())),
        )
        .with_headers(&self.default_headers)
        .with_headers(&metadata.headers)
        .with_headers(&options.additional_headers);

        if let Some(content_type) = &metadata.content_type {
            descriptor = descriptor.with_header(CONTENT_TYPE.as_str(), content_type)?;
        }

        descriptor = descriptor
            .with_query_params(&metadata.query_params)
            .with_query_params(&options.additional_params)
            .with_body(metadata.body.clone());

        if let Some(timeout) = options.timeout {
            descriptor = descriptor.with_timeout(timeout);
        }

        Ok(descriptor)
    }

    /// Providers for the listed names, in listing order. Unknown names are skipped.
    pub(crate) fn providers<'a>(
        &'a self,
        names: &'a [String],
    ) -> impl Iterator<Item = &'a AuthProvider> + 'a {
        names.iter().filter_map(|name| self.auths.get(name))
    }

    /// Builds a descriptor and applies auth, refreshing OAuth2 tokens by blocking.
    pub(crate) fn build_blocking(&self, metadata: &RequestMetadata) -> Result<RequestDescriptor> {
        let mut descriptor = self.prepare(metadata)?;
        for provider in self.providers(&metadata.auth_names) {
            descriptor = provider.add_to_request(descriptor)?;
        }
        Ok(descriptor)
    }

    /// Builds a descriptor and applies auth, refreshing OAuth2 tokens asynchronously.
    pub(crate) async fn build(&self, metadata: &RequestMetadata) -> Result<RequestDescriptor> {
        let mut descriptor = self.prepare(metadata)?;
        for provider in self.providers(&metadata.auth_names) {
            descriptor = provider.add_to_request_async(descriptor).await?;
        }
        Ok(descriptor)
    }
}
