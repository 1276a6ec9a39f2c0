//! # sdk-dispatch - request execution for generated API clients
//!
//! `sdk-dispatch` is the runtime that generated API client SDKs call into. It
//! assembles a request from per-call metadata, applies the configured auth
//! schemes (including an OAuth2 token cache), sends it with status-driven retries
//! and decodes the result, or hands back a lazily decoded server-sent event
//! stream. Every operation is available in an async and a blocking flavor that
//! make identical retry decisions.
//!
//! ## Quick Start
//!
//! ```no_run
//! use sdk_dispatch::{AuthBearer, Client, RequestMetadata, RetryConfig};
//! use http::Method;
//! use serde::{Deserialize, Serialize};
//! use std::time::Duration;
//!
//! #[derive(Serialize)]
//! struct CreateUser {
//!     name: String,
//!     email: String,
//! }
//!
//! #[derive(Deserialize)]
//! struct User {
//!     id: u64,
//!     name: String,
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), sdk_dispatch::Error> {
//!     let client = Client::builder()
//!         .base_url("https://api.example.com")?
//!         .timeout(Duration::from_secs(30))
//!         .auth("bearer", AuthBearer::new("secret-token"))
//!         .retries(
//!             RetryConfig::new()
//!                 .status_codes([5, 429])
//!                 .initial_delay(100)
//!                 .backoff_factor(2.0)
//!                 .max_retries(3),
//!         )
//!         .build()?;
//!
//!     let metadata = RequestMetadata::new(Method::POST, "/users")
//!         .with_json(&CreateUser {
//!             name: "Alice".to_string(),
//!             email: "alice@example.com".to_string(),
//!         })?
//!         .with_auth("bearer");
//!
//!     let created = client.request::<User>(metadata).await?;
//!     if let Some(user) = created.data.data() {
//!         println!("Created user {} ({})", user.name, user.id);
//!     }
//!     println!("Took {:?} over {} attempt(s)", created.latency, created.attempts);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Transport faults propagate immediately. Non-success statuses are retried only
//! when the policy matches them; the last response of a failed call becomes an
//! [`Error::Api`] carrying the status and the best-effort parsed body:
//!
//! ```no_run
//! use sdk_dispatch::{Client, Error, RequestMetadata};
//! use http::Method;
//!
//! # async fn example() -> Result<(), Error> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! match client
//!     .request::<serde_json::Value>(RequestMetadata::new(Method::GET, "/endpoint"))
//!     .await
//! {
//!     Ok(response) => println!("Success: {:?}", response.data),
//!     Err(Error::Api { status, body, .. }) => eprintln!("HTTP error {}: {:?}", status, body),
//!     Err(Error::DeserializationFailed { raw_response, serde_error, .. }) => {
//!         eprintln!("Could not decode {}: {}", raw_response, serde_error);
//!     }
//!     Err(e) => eprintln!("Other error: {}", e),
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Server-Sent Events
//!
//! ```no_run
//! use futures::StreamExt;
//! use sdk_dispatch::{Client, RequestMetadata};
//! use http::Method;
//!
//! # async fn example() -> Result<(), sdk_dispatch::Error> {
//! # let client = Client::builder().base_url("https://api.example.com")?.build()?;
//! let mut events = client
//!     .stream::<serde_json::Value>(RequestMetadata::new(Method::GET, "/events"))
//!     .await?;
//! while let Some(event) = events.next().await {
//!     println!("{:?}", event?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod blocking;
mod client;
mod error;
pub mod metadata;
pub mod oauth2;
pub mod query;
pub mod request;
pub mod response;
pub mod retry;
pub mod stream;

pub use auth::{AuthBasic, AuthBearer, AuthKey, AuthProvider, KeyLocation};
pub use blocking::BlockingClient;
pub use client::{Client, ClientBuilder};
pub use error::{Error, Result};
pub use metadata::{RequestMetadata, RequestOptions};
pub use oauth2::{OAuth2, OAuth2Form};
pub use query::{QueryParams, QueryStyle, QueryValue};
pub use request::{Body, FilePart, Multipart, RequestDescriptor};
pub use response::{BinaryResponse, Payload, Response};
pub use retry::{RetryConfig, RetryPolicy};
pub use stream::{AsyncStreamResponse, StreamResponse};
