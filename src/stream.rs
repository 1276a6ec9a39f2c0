//! Server-sent event readers.
//!
//! [`SseBuffer`] accumulates raw bytes and cuts them into messages at the
//! earliest blank-line boundary (`\r\n\r\n`, `\n\n` or `\r\r`). Each message is
//! reduced to its joined `data:` payload, which is decoded as JSON (falling back
//! to a plain string) into the destination type. Messages without a `data:`
//! line are skipped.
//!
//! [`StreamResponse`] drives the buffer from a blocking reader and
//! [`AsyncStreamResponse`] from an async byte stream. Both release their source
//! exactly once: on exhaustion, on [`close`](StreamResponse::close), or on drop.

use crate::{Error, Result};
use bytes::Bytes;
use futures::stream::{BoxStream, Stream, StreamExt};
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::io::{self, Read};
use std::marker::PhantomData;
use std::pin::Pin;
use std::task::{Context, Poll};

const BOUNDARIES: [&[u8]; 3] = [b"\r\n\r\n", b"\n\n", b"\r\r"];

const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Byte accumulator with a read cursor.
///
/// Bytes before the cursor have been emitted; bytes after it are an incomplete
/// message waiting for more input.
#[derive(Debug, Default)]
pub struct SseBuffer {
    buf: Vec<u8>,
    pos: usize,
}

impl SseBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk, discarding already-emitted bytes.
    pub fn extend(&mut self, chunk: &[u8]) {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }
        self.buf.extend_from_slice(chunk);
    }

    /// Cuts the next complete message, if the buffer holds one.
    pub fn next_message(&mut self) -> Option<String> {
        let pending = &self.buf[self.pos..];
        let (start, len) = BOUNDARIES
            .iter()
            .filter_map(|marker| find(pending, marker).map(|at| (at, marker.len())))
            .min_by_key(|(at, _)| *at)?;

        let message = String::from_utf8_lossy(&pending[..start]).into_owned();
        self.pos += start + len;
        Some(message)
    }

    /// Takes whatever follows the cursor as a final message, if non-empty.
    pub fn take_remaining(&mut self) -> Option<String> {
        let rest = &self.buf[self.pos..];
        let message = (!rest.is_empty()).then(|| String::from_utf8_lossy(rest).into_owned());
        self.buf.clear();
        self.pos = 0;
        message
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Joins the trimmed `data:` payloads of one message with `\n`.
///
/// Returns `None` when the message has no `data:` line.
///
/// # Examples
///
/// ```
/// use sdk_dispatch::stream::parse_sse;
///
/// assert_eq!(parse_sse("event: ping\ndata: a\ndata: b").as_deref(), Some("a\nb"));
/// assert_eq!(parse_sse(": keep-alive"), None);
/// ```
pub fn parse_sse(message: &str) -> Option<String> {
    let lines: Vec<&str> = message
        .split(['\n', '\r'])
        .map(str::trim)
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Decodes one event payload into `T`.
///
/// The payload is parsed as JSON, or kept as a string if it is not JSON. With a
/// `data_field`, the value is wrapped as `{data_field: value}` unless it is
/// already an object carrying that field.
///
/// # Errors
///
/// Returns [`Error::DeserializationFailed`] if the value does not fit `T`.
pub fn decode_event<T: DeserializeOwned>(
    data: &str,
    data_field: Option<&str>,
    status: StatusCode,
) -> Result<T> {
    let parsed =
        serde_json::from_str::<Value>(data).unwrap_or_else(|_| Value::String(data.to_string()));
    let value = match data_field {
        Some(field) if !matches!(&parsed, Value::Object(map) if map.contains_key(field)) => {
            let mut wrapper = Map::new();
            wrapper.insert(field.to_string(), parsed);
            Value::Object(wrapper)
        }
        _ => parsed,
    };

    serde_json::from_value(value).map_err(|e| Error::DeserializationFailed {
        raw_response: data.to_string(),
        serde_error: e.to_string(),
        status,
    })
}

fn decode_message<T: DeserializeOwned>(
    message: &str,
    data_field: Option<&str>,
    status: StatusCode,
) -> Option<Result<T>> {
    let data = parse_sse(message)?;
    Some(decode_event(&data, data_field, status))
}

/// Lifecycle of a stream reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Pulling chunks from the source.
    Open,
    /// The source is exhausted; the buffer may hold one final message.
    Draining,
    /// The source has been released.
    Closed,
}

/// A blocking iterator over decoded server-sent events.
pub struct StreamResponse<T> {
    status: StatusCode,
    headers: HeaderMap,
    source: Option<Box<dyn Read + Send>>,
    buffer: SseBuffer,
    state: StreamState,
    data_field: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> StreamResponse<T> {
    /// Wraps a blocking byte source.
    pub fn new(status: StatusCode, headers: HeaderMap, source: impl Read + Send + 'static) -> Self {
        Self {
            status,
            headers,
            source: Some(Box::new(source)),
            buffer: SseBuffer::new(),
            state: StreamState::Open,
            data_field: None,
            _marker: PhantomData,
        }
    }

    /// Wraps a reader with a `200 OK` status and no headers.
    pub fn from_reader(source: impl Read + Send + 'static) -> Self {
        Self::new(StatusCode::OK, HeaderMap::new(), source)
    }

    /// Wraps each payload as `{field: payload}` before decoding.
    pub fn with_data_field(mut self, field: impl Into<String>) -> Self {
        self.data_field = Some(field.into());
        self
    }

    /// The response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Releases the source. Further iteration yields nothing.
    pub fn close(&mut self) {
        if let Some(source) = self.source.take() {
            drop(source);
            tracing::debug!(status = %self.status, "Event stream closed");
        }
        self.state = StreamState::Closed;
    }
}

impl<T: DeserializeOwned> Iterator for StreamResponse<T> {
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.state {
                StreamState::Open => {
                    if let Some(message) = self.buffer.next_message() {
                        match decode_message(&message, self.data_field.as_deref(), self.status) {
                            Some(event) => return Some(event),
                            None => continue,
                        }
                    }

                    let Some(source) = self.source.as_mut() else {
                        self.state = StreamState::Draining;
                        continue;
                    };
                    let mut chunk = [0u8; READ_CHUNK_SIZE];
                    match source.read(&mut chunk) {
                        Ok(0) => self.state = StreamState::Draining,
                        Ok(n) => self.buffer.extend(&chunk[..n]),
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        Err(e) => {
                            tracing::error!(error = %e, "Event stream read failed");
                            self.close();
                            return Some(Err(Error::Io(e)));
                        }
                    }
                }
                StreamState::Draining => {
                    let remaining = self.buffer.take_remaining();
                    self.close();
                    return remaining.and_then(|message| {
                        decode_message(&message, self.data_field.as_deref(), self.status)
                    });
                }
                StreamState::Closed => return None,
            }
        }
    }
}

impl<T> Drop for StreamResponse<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> std::fmt::Debug for StreamResponse<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResponse")
            .field("status", &self.status)
            .field("state", &self.state)
            .field("data_field", &self.data_field)
            .finish()
    }
}

/// An async stream of decoded server-sent events.
pub struct AsyncStreamResponse<T> {
    status: StatusCode,
    headers: HeaderMap,
    source: Option<BoxStream<'static, Result<Bytes>>>,
    buffer: SseBuffer,
    state: StreamState,
    data_field: Option<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> AsyncStreamResponse<T> {
    /// Wraps an async byte source.
    pub fn new<S>(status: StatusCode, headers: HeaderMap, source: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self {
            status,
            headers,
            source: Some(source.boxed()),
            buffer: SseBuffer::new(),
            state: StreamState::Open,
            data_field: None,
            _marker: PhantomData,
        }
    }

    /// Wraps a byte stream with a `200 OK` status and no headers.
    pub fn from_stream<S>(source: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self::new(StatusCode::OK, HeaderMap::new(), source)
    }

    /// Wraps each payload as `{field: payload}` before decoding.
    pub fn with_data_field(mut self, field: impl Into<String>) -> Self {
        self.data_field = Some(field.into());
        self
    }

    /// The response status.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The current lifecycle state.
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Releases the source. The stream then ends.
    pub fn close(&mut self) {
        if let Some(source) = self.source.take() {
            drop(source);
            tracing::debug!(status = %self.status, "Event stream closed");
        }
        self.state = StreamState::Closed;
    }
}

impl<T: DeserializeOwned> Stream for AsyncStreamResponse<T> {
    type Item = Result<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        loop {
            match this.state {
                StreamState::Open => {
                    if let Some(message) = this.buffer.next_message() {
                        match decode_message(&message, this.data_field.as_deref(), this.status) {
                            Some(event) => return Poll::Ready(Some(event)),
                            None => continue,
                        }
                    }

                    let Some(source) = this.source.as_mut() else {
                        this.state = StreamState::Draining;
                        continue;
                    };
                    match source.poll_next_unpin(cx) {
                        Poll::Pending => return Poll::Pending,
                        Poll::Ready(Some(Ok(chunk))) => this.buffer.extend(&chunk),
                        Poll::Ready(Some(Err(e))) => {
                            tracing::error!(error = %e, "Event stream read failed");
                            this.close();
                            return Poll::Ready(Some(Err(e)));
                        }
                        Poll::Ready(None) => this.state = StreamState::Draining,
                    }
                }
                StreamState::Draining => {
                    let remaining = this.buffer.take_remaining();
                    this.close();
                    return Poll::Ready(remaining.and_then(|message| {
                        decode_message(&message, this.data_field.as_deref(), this.status)
                    }));
                }
                StreamState::Closed => return Poll::Ready(None),
            }
        }
    }
}

impl<T> Drop for AsyncStreamResponse<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> std::fmt::Debug for AsyncStreamResponse<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncStreamResponse")
            .field("status", &self.status)
            .field("state", &self.state)
            .field("data_field", &self.data_field)
            .finish()
    }
}
