//! Async request dispatcher and the builder shared with the blocking one.
//!
//! The [`Client`] type is the main entry point for making HTTP requests under an
//! async runtime. Use [`ClientBuilder`] to configure it; the same builder also
//! produces a [`BlockingClient`](crate::blocking::BlockingClient).

use crate::{
    auth::AuthProvider,
    blocking::BlockingClient,
    metadata::RequestMetadata,
    query,
    request::{parse_header, Body, DescriptorBuilder, Multipart, RequestDescriptor, DEFAULT_SERVICE},
    response::{decode_payload, Payload},
    retry::{RetryConfig, RetryDecision, RetryPolicy},
    stream::AsyncStreamResponse,
    Error, Response, Result,
};
use futures::TryStreamExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// An async HTTP client that executes generated API operations.
///
/// The client is designed to be reused across multiple requests. It maintains
/// a connection pool and configuration that applies to all requests.
///
/// # Examples
///
/// ```no_run
/// use sdk_dispatch::{AuthBearer, Client, RequestMetadata, RetryConfig};
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
///     .auth("bearer", AuthBearer::new("secret-token"))
///     .retries(RetryConfig::new().status_codes([5, 429]).max_retries(3))
///     .build()?;
///
/// let metadata = RequestMetadata::new(Method::GET, "/users/123").with_auth("bearer");
/// let user = client.request::<User>(metadata).await?;
/// if let Some(user) = user.data.data() {
///     println!("User {}: {}", user.id, user.name);
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http_client: reqwest::Client,
    descriptors: DescriptorBuilder,
    retries: RetryConfig,
    timeout: Option<Duration>,
}

impl Client {
    /// Creates a new `ClientBuilder` for configuring a client.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// Builds the descriptor for a call, applying auth (refreshing OAuth2 tokens if needed).
    pub async fn prepare(&self, metadata: &RequestMetadata) -> Result<RequestDescriptor> {
        self.inner.descriptors.build(metadata).await
    }

    /// The retry policy for a call: the client configuration with the call's
    /// overrides merged over it.
    pub fn retry_policy(&self, metadata: &RequestMetadata) -> Result<RetryPolicy> {
        self.inner
            .retries
            .merge(metadata.options.retries.as_ref())
            .resolve()
    }

    /// Makes a request and decodes the response into `T`.
    ///
    /// JSON and text bodies are decoded, `204 No Content` yields
    /// [`Payload::Empty`], and any other content type is returned as
    /// [`Payload::Binary`].
    ///
    /// # Errors
    ///
    /// Transport faults are returned immediately. A non-success status is
    /// returned as [`Error::Api`] once retries are exhausted or not applicable.
    pub async fn request<T>(&self, metadata: RequestMetadata) -> Result<Response<Payload<T>>>
    where
        T: DeserializeOwned,
    {
        let response = self.execute(&metadata).await?;
        let body = response.data.bytes().await?;
        let payload = decode_payload(response.status, &response.headers, body)?;
        Ok(Response::new(
            payload,
            response.status,
            response.headers,
            response.latency,
            response.attempts,
        ))
    }

    /// Makes a request whose response carries no value. The body is discarded.
    pub async fn request_empty(&self, metadata: RequestMetadata) -> Result<Response<()>> {
        let response = self.execute(&metadata).await?;
        Ok(response.map(drop))
    }

    /// Makes a request and hands back the transport response untouched.
    pub async fn request_raw(
        &self,
        metadata: RequestMetadata,
    ) -> Result<Response<reqwest::Response>> {
        self.execute(&metadata).await
    }

    /// Makes a request and reads the response as a stream of server-sent events.
    pub async fn stream<T>(&self, metadata: RequestMetadata) -> Result<AsyncStreamResponse<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.execute(&metadata).await?;
        let source = response.data.bytes_stream().map_err(Error::from);
        Ok(AsyncStreamResponse::new(response.status, response.headers, source))
    }

    async fn execute(&self, metadata: &RequestMetadata) -> Result<Response<reqwest::Response>> {
        let policy = self.retry_policy(metadata)?;
        let descriptor = self.prepare(metadata).await?;
        self.dispatch(&descriptor, &policy).await
    }

    /// Sends a descriptor until it succeeds or the policy gives up.
    ///
    /// Each transport call and each backoff sleep is a suspension point.
    ///
    /// # Errors
    ///
    /// Transport faults propagate immediately and are never retried. The last
    /// non-success response becomes an [`Error::Api`].
    pub async fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        policy: &RetryPolicy,
    ) -> Result<Response<reqwest::Response>> {
        let start_time = Instant::now();
        let mut backoff = policy.backoff();
        let mut attempt = 0;

        loop {
            attempt += 1;

            tracing::debug!(
                method = %descriptor.method,
                url = %descriptor.url,
                attempt = attempt,
                "Executing HTTP request"
            );

            let response = self.to_request(descriptor)?.send().await?;
            let status = response.status();

            match backoff.next_decision(status) {
                RetryDecision::Done => {
                    let latency = start_time.elapsed();
                    tracing::info!(
                        status = status.as_u16(),
                        latency_ms = latency.as_millis(),
                        attempts = attempt,
                        "Received HTTP response"
                    );
                    let headers = response.headers().clone();
                    return Ok(Response::new(response, status, headers, latency, attempt));
                }
                RetryDecision::RetryAfter(delay) => {
                    tracing::warn!(
                        status = status.as_u16(),
                        delay_ms = delay.as_millis(),
                        attempt = attempt,
                        "Retrying request after delay"
                    );
                    drop(response);
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::GiveUp => {
                    let headers = response.headers().clone();
                    let raw_response = match response.text().await {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::warn!(
                                status = status.as_u16(),
                                error = %e,
                                "Failed to read error response body"
                            );
                            String::new()
                        }
                    };
                    tracing::error!(
                        status = status.as_u16(),
                        attempts = attempt,
                        response = %raw_response,
                        "Request failed"
                    );
                    return Err(Error::api(status, headers, raw_response));
                }
            }
        }
    }

    fn to_request(&self, descriptor: &RequestDescriptor) -> Result<reqwest::RequestBuilder> {
        let mut request = self
            .inner
            .http_client
            .request(descriptor.method.clone(), &descriptor.url)
            .headers(descriptor.transport_headers()?);

        if !descriptor.query.is_empty() {
            request = request.query(&query::to_pairs(&descriptor.query));
        }
        if let Some(timeout) = descriptor.timeout.or(self.inner.timeout) {
            request = request.timeout(timeout);
        }

        Ok(match &descriptor.body {
            Body::None => request,
            Body::Json(value) => request.json(value),
            Body::Form(fields) => request.form(&query::to_pairs(fields)),
            Body::Raw(bytes) => request.body(bytes.clone()),
            Body::Multipart(multipart) => request.multipart(multipart_form(multipart)?),
        })
    }
}

fn multipart_form(multipart: &Multipart) -> Result<reqwest::multipart::Form> {
    let mut form = reqwest::multipart::Form::new();
    for (name, value) in &multipart.fields {
        form = form.text(name.clone(), value.clone());
    }
    for file in &multipart.files {
        let mut part = reqwest::multipart::Part::bytes(file.content.to_vec());
        if let Some(file_name) = &file.file_name {
            part = part.file_name(file_name.clone());
        }
        if let Some(content_type) = &file.content_type {
            part = part.mime_str(content_type).map_err(|e| {
                Error::ConfigurationError(format!("Invalid multipart content type: {}", e))
            })?;
        }
        form = form.part(file.field.clone(), part);
    }
    Ok(form)
}

/// Builder for configuring and creating a [`Client`] or a [`BlockingClient`].
///
/// # Examples
///
/// ```no_run
/// use sdk_dispatch::{AuthKey, ClientBuilder, KeyLocation, RetryConfig};
/// use std::time::Duration;
///
/// # fn example() -> Result<(), sdk_dispatch::Error> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.example.com")?
///     .service_url("auth", "https://auth.example.com")?
///     .timeout(Duration::from_secs(30))
///     .retries(RetryConfig::new().status_codes([5]).max_retries(2))
///     .auth("api_key", AuthKey::new("X-API-Key", KeyLocation::Header).with_value("k"))
///     .default_header("User-Agent", "my-sdk/1.0")?
///     .build_blocking()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct ClientBuilder {
    descriptors: DescriptorBuilder,
    retries: RetryConfig,
    timeout: Option<Duration>,
    http_client: Option<reqwest::Client>,
    blocking_http_client: Option<reqwest::blocking::Client>,
}

impl ClientBuilder {
    /// Creates a new `ClientBuilder` with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the URL of the default service.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(self, url: impl AsRef<str>) -> Result<Self> {
        self.service_url(DEFAULT_SERVICE, url)
    }

    /// Sets the URL of a named service.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn service_url(mut self, service: impl Into<String>, url: impl AsRef<str>) -> Result<Self> {
        Url::parse(url.as_ref())?;
        self.descriptors
            .base_urls
            .insert(service.into(), url.as_ref().to_string());
        Ok(self)
    }

    /// Adds a default header that will be included in all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the header name or value is invalid.
    pub fn default_header(mut self, name: impl AsRef<str>, value: impl AsRef<str>) -> Result<Self> {
        let (name, value) = parse_header(name.as_ref(), value.as_ref())?;
        self.descriptors.default_headers.insert(name, value);
        Ok(self)
    }

    /// Registers an auth provider under a scheme name.
    pub fn auth(mut self, name: impl Into<String>, provider: impl Into<AuthProvider>) -> Self {
        self.descriptors.auths.insert(name.into(), provider.into());
        self
    }

    /// Sets the client-wide retry configuration.
    pub fn retries(mut self, retries: RetryConfig) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the default request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Uses an existing async transport.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Uses an existing blocking transport.
    pub fn blocking_http_client(mut self, client: reqwest::blocking::Client) -> Self {
        self.blocking_http_client = Some(client);
        self
    }

    /// Builds the configured async `Client`.
    ///
    /// # Errors
    ///
    /// Returns an error if the retry configuration is invalid or the transport
    /// cannot be built.
    pub fn build(self) -> Result<Client> {
        self.retries.resolve()?;

        let http_client = match self.http_client {
            Some(client) => client,
            None => reqwest::Client::builder().build().map_err(|e| {
                Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?,
        };

        Ok(Client {
            inner: Arc::new(ClientInner {
                http_client,
                descriptors: self.descriptors,
                retries: self.retries,
                timeout: self.timeout,
            }),
        })
    }

    /// Builds the configured [`BlockingClient`].
    ///
    /// Must not be called from within an async runtime unless a blocking
    /// transport was supplied.
    ///
    /// # Errors
    ///
    /// Returns an error if the retry configuration is invalid or the transport
    /// cannot be built.
    pub fn build_blocking(self) -> Result<BlockingClient> {
        self.retries.resolve()?;

        let http_client = match self.blocking_http_client {
            Some(client) => client,
            None => reqwest::blocking::Client::builder().build().map_err(|e| {
                Error::ConfigurationError(format!("Failed to build HTTP client: {}", e))
            })?,
        };

        Ok(BlockingClient::from_parts(
            http_client,
            self.descriptors,
            self.retries,
            self.timeout,
        ))
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("base_urls", &self.inner.descriptors.base_urls)
            .field("retries", &self.inner.retries)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthBearer;
    use http::Method;

    #[test]
    fn test_builder_rejects_invalid_url() {
        assert!(matches!(
            Client::builder().base_url("not a url"),
            Err(Error::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_builder_rejects_invalid_retry_codes() {
        let result = Client::builder()
            .retries(RetryConfig::new().status_codes([42]))
            .build();
        assert!(matches!(result, Err(Error::ConfigurationError(_))));
    }

    #[test]
    fn test_retry_policy_merges_call_overrides() {
        let client = Client::builder()
            .retries(RetryConfig::new().status_codes([5]).max_retries(1).initial_delay(10))
            .build()
            .unwrap();

        let metadata = RequestMetadata::new(Method::GET, "/users").with_options(
            crate::RequestOptions::new().retries(RetryConfig::new().max_retries(4)),
        );
        let policy = client.retry_policy(&metadata).unwrap();

        assert_eq!(policy.status_codes, vec![5]);
        assert_eq!(policy.max_retries, 4);
        assert_eq!(policy.initial_delay, Duration::from_millis(10));
    }

    #[tokio::test]
    async fn test_prepare_applies_auth() {
        let client = Client::builder()
            .base_url("https://api.example.com/")
            .unwrap()
            .auth("bearer", AuthBearer::new("abc"))
            .build()
            .unwrap();

        let descriptor = client
            .prepare(&RequestMetadata::new(Method::GET, "/users").with_auth("bearer"))
            .await
            .unwrap();

        assert_eq!(descriptor.url, "https://api.example.com/users");
        assert_eq!(descriptor.header("authorization"), Some("Bearer abc"));
    }
}
