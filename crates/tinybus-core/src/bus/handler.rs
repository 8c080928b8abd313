//! Callback capabilities
//!
//! Each kind of callback the bus invokes is a trait with a blanket
//! implementation for matching closures, so modules can pass either a
//! closure or a type of their own.

use std::sync::Arc;

use crate::error::{BusError, BusResult};

/// Services `module.action` requests.
pub trait RequestHandler: Send + Sync + 'static {
    /// Handle `action` with the request bytes, writing any reply into
    /// `response`. Checking that the reply fits is up to the handler.
    fn on_request(&self, action: &str, request: &[u8], response: &mut Response<'_>)
        -> BusResult<()>;
}

impl<F> RequestHandler for F
where
    F: Fn(&str, &[u8], &mut Response<'_>) -> BusResult<()> + Send + Sync + 'static,
{
    fn on_request(
        &self,
        action: &str,
        request: &[u8],
        response: &mut Response<'_>,
    ) -> BusResult<()> {
        self(action, request, response)
    }
}

/// Receives events delivered to a subscription.
pub trait EventHandler: Send + Sync + 'static {
    /// Called on the worker; must not block.
    fn on_event(&self, event: &Event<'_>);
}

impl<F> EventHandler for F
where
    F: Fn(&Event<'_>) + Send + Sync + 'static,
{
    fn on_event(&self, event: &Event<'_>) {
        self(event)
    }
}

/// Derives an outgoing request from a triggering event.
pub trait Transform: Send + Sync + 'static {
    /// Return `None` to issue nothing for this event.
    fn transform(&self, event: &Event<'_>) -> Option<RoutedRequest>;
}

impl<F> Transform for F
where
    F: Fn(&Event<'_>) -> Option<RoutedRequest> + Send + Sync + 'static,
{
    fn transform(&self, event: &Event<'_>) -> Option<RoutedRequest> {
        self(event)
    }
}

/// Timer callback.
pub trait TimerCallback: Send + Sync + 'static {
    /// Called on the worker; must not block.
    fn fire(&self);
}

impl<F> TimerCallback for F
where
    F: Fn() + Send + Sync + 'static,
{
    fn fire(&self) {
        self()
    }
}

/// Out-of-band observer for failures: `(pattern, error)`.
pub type ErrorCallback = Arc<dyn Fn(&str, &BusError) + Send + Sync>;

/// An event as seen by subscribers and transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event<'a> {
    /// Emitting module.
    pub source: &'a str,
    /// Event name.
    pub name: &'a str,
    /// Raw payload; empty when none was sent.
    pub payload: &'a [u8],
}

impl<'a> Event<'a> {
    /// The `source:name` key.
    pub fn key(&self) -> String {
        format!("{}:{}", self.source, self.name)
    }

    /// Payload as UTF-8 with any trailing NUL bytes removed.
    pub fn payload_str(&self) -> Option<&'a str> {
        let end = self
            .payload
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        std::str::from_utf8(&self.payload[..end]).ok()
    }
}

/// Request produced by a [`Transform`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutedRequest {
    /// `module.action` to call.
    pub pattern: String,
    /// Request bytes.
    pub payload: Vec<u8>,
}

impl RoutedRequest {
    /// Build a routed request.
    pub fn new(pattern: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            pattern: pattern.into(),
            payload: payload.into(),
        }
    }
}

/// Response buffer handed to a [`RequestHandler`].
///
/// Wraps the caller's buffer; its capacity is whatever the caller supplied
/// (zero for fire-and-forget and routed requests). Writes never run past it.
#[derive(Debug)]
pub struct Response<'a> {
    buf: &'a mut [u8],
    len: usize,
}

impl<'a> Response<'a> {
    /// Wrap a buffer with nothing written yet.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, len: 0 }
    }

    /// Size of the caller's buffer.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether `n` bytes fit.
    pub fn fits(&self, n: usize) -> bool {
        n <= self.buf.len()
    }

    /// Copy as much of `bytes` as fits and return the number copied.
    pub fn write(&mut self, bytes: &[u8]) -> usize {
        let n = bytes.len().min(self.buf.len());
        self.buf[..n].copy_from_slice(&bytes[..n]);
        self.len = n;
        n
    }

    /// The whole buffer, for handlers that encode in place.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut *self.buf
    }

    /// Record how many bytes were encoded in place; clamped to capacity.
    pub fn set_len(&mut self, len: usize) {
        self.len = len.min(self.buf.len());
    }

    /// The written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}
