//! Example demonstrating status-driven retry policies.
//!
//! This example shows how to:
//! - Configure a client-wide retry policy
//! - Override it for a single call
//! - Inspect the terminal error once retries are exhausted
//! - Load a policy from a JSON document
//!
//! Run with: `cargo run --example retry_policy`

use http::Method;
use sdk_dispatch::{Client, Error, RequestMetadata, RequestOptions, RetryConfig};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("sdk_dispatch=debug,retry_policy=info")
        .init();

    // Retry any 5xx and 429, starting at 200ms and doubling up to 2s.
    let client = Client::builder()
        .base_url("https://httpbin.org")?
        .retries(
            RetryConfig::new()
                .status_codes([5, 429])
                .initial_delay(200)
                .backoff_factor(2.0)
                .max_delay(2_000)
                .max_retries(3),
        )
        .build()?;

    println!("=== Exhausting retries on 503 ===");
    match client
        .request::<serde_json::Value>(RequestMetadata::new(Method::GET, "/status/503"))
        .await
    {
        Ok(response) => println!("Unexpected success after {} attempt(s)", response.attempts),
        Err(Error::Api { status, .. }) => println!("Gave up with status {}", status),
        Err(e) => println!("Transport failure: {}", e),
    }
    println!();

    println!("=== Per-call override: no retries ===");
    let metadata = RequestMetadata::new(Method::GET, "/status/500")
        .with_options(RequestOptions::new().retries(RetryConfig::new().max_retries(0)));
    if let Err(e) = client.request_empty(metadata).await {
        println!("Failed on first attempt: {}", e);
    }
    println!();

    println!("=== Policy from configuration ===");
    let config: RetryConfig = serde_json::from_str(
        r#"{"statusCodes": [502, 503], "initialDelay": 100, "maxRetries": 2}"#,
    )
    .map_err(|e| Error::ConfigurationError(e.to_string()))?;
    let policy = config.resolve()?;
    println!("Resolved policy: {:?}", policy);

    let mut backoff = policy.backoff();
    for status in [503, 502, 503] {
        let status = http::StatusCode::from_u16(status)
            .map_err(|e| Error::ConfigurationError(e.to_string()))?;
        println!("{} -> {:?}", status, backoff.next_decision(status));
    }

    Ok(())
}
