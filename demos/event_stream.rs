//! Example demonstrating server-sent event streams.
//!
//! This example shows how to:
//! - Decode events from an in-memory body with the blocking reader
//! - Wrap plain payloads into a typed event with a data field
//! - Stream events from a live endpoint with the async client
//!
//! Run with: `cargo run --example event_stream -- https://host/events`

use futures::StreamExt;
use http::Method;
use sdk_dispatch::{Client, Error, RequestMetadata, StreamResponse};
use serde::Deserialize;
use std::io::Cursor;
use url::Url;

#[derive(Debug, Deserialize)]
struct Chunk {
    data: serde_json::Value,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter("sdk_dispatch=debug,event_stream=info")
        .init();

    println!("=== Decoding a buffered body ===");
    let body = "data: {\"delta\":\"Hel\"}\n\n: keep-alive\n\ndata: lo\r\n\r\ndata: [1, 2]";
    let events = StreamResponse::<Chunk>::from_reader(Cursor::new(body)).with_data_field("data");
    for event in events {
        println!("{:?}", event?);
    }
    println!();

    let Some(url) = std::env::args().nth(1) else {
        println!("Pass an event-stream URL to read a live stream.");
        return Ok(());
    };

    println!("=== Streaming from {} ===", url);
    let url = Url::parse(&url)?;
    let client = Client::builder()
        .base_url(url.origin().ascii_serialization())?
        .build()?;

    let mut metadata = RequestMetadata::new(Method::GET, url.path());
    for (key, value) in url.query_pairs() {
        metadata = metadata.with_query_param(key.into_owned(), value.into_owned());
    }
    let mut stream = client.stream::<serde_json::Value>(metadata).await?;
    println!("Status: {}", stream.status());

    let mut received = 0;
    while let Some(event) = stream.next().await {
        println!("{}", event?);
        received += 1;
        if received == 5 {
            // Stop early; the connection is released here.
            stream.close();
        }
    }

    Ok(())
}
