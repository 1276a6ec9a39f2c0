//! Blocking request dispatcher.
//!
//! [`BlockingClient`] makes the same retry decisions as the async
//! [`Client`](crate::Client) from the same inputs; the calling thread is occupied
//! for the whole retry loop, including backoff sleeps. It must not be used from
//! within an async runtime.

use crate::{
    metadata::RequestMetadata,
    query,
    request::{Body, DescriptorBuilder, Multipart, RequestDescriptor},
    response::{decode_payload, Payload},
    retry::{RetryConfig, RetryDecision, RetryPolicy},
    stream::StreamResponse,
    ClientBuilder, Error, Response, Result,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A blocking HTTP client that executes generated API operations.
///
/// # Examples
///
/// ```no_run
/// use sdk_dispatch::{BlockingClient, RequestMetadata};
/// use http::Method;
///
/// # fn example() -> Result<(), sdk_dispatch::Error> {
/// let client = BlockingClient::builder()
///     .base_url("https://api.example.com")?
///     .build_blocking()?;
///
/// let metadata = RequestMetadata::new(Method::GET, "/health");
/// let response = client.request::<serde_json::Value>(metadata)?;
/// println!("{:?} after {} attempt(s)", response.data, response.attempts);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct BlockingClient {
    inner: Arc<BlockingInner>,
}

struct BlockingInner {
    http_client: reqwest::blocking::Client,
    descriptors: DescriptorBuilder,
    retries: RetryConfig,
    timeout: Option<Duration>,
}

impl BlockingClient {
    /// Creates a new `ClientBuilder`; finish it with [`ClientBuilder::build_blocking`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    pub(crate) fn from_parts(
        http_client: reqwest::blocking::Client,
        descriptors: DescriptorBuilder,
        retries: RetryConfig,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            inner: Arc::new(BlockingInner {
                http_client,
                descriptors,
                retries,
                timeout,
            }),
        }
    }

    /// Builds the descriptor for a call, applying auth (refreshing OAuth2 tokens if needed).
    pub fn prepare(&self, metadata: &RequestMetadata) -> Result<RequestDescriptor> {
        self.inner.descriptors.build_blocking(metadata)
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
    /// See [`Client::request`](crate::Client::request).
    pub fn request<T>(&self, metadata: RequestMetadata) -> Result<Response<Payload<T>>>
    where
        T: DeserializeOwned,
    {
        let response = self.execute(&metadata)?;
        let body = response.data.bytes()?;
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
    pub fn request_empty(&self, metadata: RequestMetadata) -> Result<Response<()>> {
        let response = self.execute(&metadata)?;
        Ok(response.map(drop))
    }

    /// Makes a request and hands back the transport response untouched.
    pub fn request_raw(
        &self,
        metadata: RequestMetadata,
    ) -> Result<Response<reqwest::blocking::Response>> {
        self.execute(&metadata)
    }

    /// Makes a request and reads the response as server-sent events.
    pub fn stream<T>(&self, metadata: RequestMetadata) -> Result<StreamResponse<T>>
    where
        T: DeserializeOwned,
    {
        let response = self.execute(&metadata)?;
        Ok(StreamResponse::new(response.status, response.headers, response.data))
    }

    fn execute(&self, metadata: &RequestMetadata) -> Result<Response<reqwest::blocking::Response>> {
        let policy = self.retry_policy(metadata)?;
        let descriptor = self.prepare(metadata)?;
        self.dispatch(&descriptor, &policy)
    }

    /// Sends a descriptor until it succeeds or the policy gives up.
    ///
    /// # Errors
    ///
    /// Transport faults propagate immediately and are never retried. The last
    /// non-success response becomes an [`Error::Api`].
    pub fn dispatch(
        &self,
        descriptor: &RequestDescriptor,
        policy: &RetryPolicy,
    ) -> Result<Response<reqwest::blocking::Response>> {
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

            let response = self.to_request(descriptor)?.send()?;
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
                    std::thread::sleep(delay);
                }
                RetryDecision::GiveUp => {
                    let headers = response.headers().clone();
                    let raw_response = match response.text() {
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

    fn to_request(
        &self,
        descriptor: &RequestDescriptor,
    ) -> Result<reqwest::blocking::RequestBuilder> {
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
            Body::Raw(bytes) => request.body(bytes.to_vec()),
            Body::Multipart(multipart) => request.multipart(multipart_form(multipart)?),
        })
    }
}

fn multipart_form(multipart: &Multipart) -> Result<reqwest::blocking::multipart::Form> {
    let mut form = reqwest::blocking::multipart::Form::new();
    for (name, value) in &multipart.fields {
        form = form.text(name.clone(), value.clone());
    }
    for file in &multipart.files {
        let mut part = reqwest::blocking::multipart::Part::bytes(file.content.to_vec());
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

impl std::fmt::Debug for BlockingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockingClient")
            .field("base_urls", &self.inner.descriptors.base_urls)
            .field("retries", &self.inner.retries)
            .field("timeout", &self.inner.timeout)
            .finish()
    }
}
