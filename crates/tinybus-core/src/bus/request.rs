//! Request/response bridge.
//!
//! A call made from any thread other than the worker is queued and the
//! caller blocks on a one-slot reply channel. A call made on the worker
//! (from a handler, subscriber, transform or timer) runs inline: queueing it
//! would deadlock, since the worker cannot dequeue while it is busy with the
//! envelope that issued the call. Comparing thread ids is the only
//! deadlock-avoidance mechanism.

use crossbeam_channel::{RecvTimeoutError, SendTimeoutError, TrySendError};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use super::context::{panic_error, Bus};
use super::envelope::{copy_payload, stopped, Envelope, Reply};
use super::handler::{RequestHandler, Response};
use crate::error::{BusError, BusResult};
use crate::pattern::{self, Separator};

/// Timeout for fire-and-forget calls.
pub const NO_WAIT: Duration = Duration::ZERO;

/// Timeout that never expires.
pub const WAIT_FOREVER: Duration = Duration::MAX;

impl Bus {
    /// Send a request to `module.action` and wait up to `timeout` for the
    /// response, which is copied into `response`. Returns the response
    /// length.
    ///
    /// With a zero timeout the request is only queued and `Ok(0)` is
    /// returned; the handler runs later and its response is discarded.
    /// An expired timeout does not retract the request.
    pub fn call(
        &self,
        pattern: &str,
        request: &[u8],
        response: &mut [u8],
        timeout: Duration,
    ) -> BusResult<usize> {
        if pattern.is_empty() {
            return Err(BusError::invalid_argument("empty request pattern"));
        }
        let (queue, worker_id) = self.sender()?;

        if thread::current().id() == worker_id {
            let mut response = Response::new(response);
            self.process_request(pattern, request, &mut response)?;
            return Ok(response.len());
        }

        let payload = copy_payload(request)?;
        if timeout.is_zero() {
            let envelope = Envelope::Request {
                pattern: pattern.to_string(),
                payload,
                reply: None,
            };
            return match queue.try_send(envelope) {
                Ok(()) => Ok(0),
                Err(TrySendError::Full(_)) => {
                    debug!(pattern, "REQ dropped: queue full");
                    Err(BusError::Timeout)
                }
                Err(TrySendError::Disconnected(_)) => Err(stopped()),
            };
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let envelope = Envelope::Request {
            pattern: pattern.to_string(),
            payload,
            reply: Some(Reply {
                tx,
                capacity: response.len(),
            }),
        };

        // One deadline covers both the enqueue and the wait for the reply
        let deadline = Instant::now().checked_add(timeout);
        let sent = match deadline {
            Some(deadline) => queue.send_deadline(envelope, deadline),
            None => queue.send(envelope).map_err(SendTimeoutError::from),
        };
        match sent {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                debug!(pattern, "REQ timed out waiting for queue space");
                return Err(BusError::Timeout);
            }
            Err(SendTimeoutError::Disconnected(_)) => return Err(stopped()),
        }
        drop(queue);

        let reply = match deadline {
            Some(deadline) => rx.recv_deadline(deadline),
            None => rx.recv().map_err(RecvTimeoutError::from),
        };
        let bytes = match reply {
            Ok(result) => result?,
            Err(RecvTimeoutError::Timeout) => {
                debug!(pattern, "REQ timed out waiting for reply");
                return Err(BusError::Timeout);
            }
            Err(RecvTimeoutError::Disconnected) => return Err(stopped()),
        };

        let len = bytes.len().min(response.len());
        response[..len].copy_from_slice(&bytes[..len]);
        Ok(len)
    }

    /// Queue a request without waiting for it to run.
    pub fn send(&self, pattern: &str, request: &[u8]) -> BusResult<()> {
        self.call(pattern, request, &mut [], NO_WAIT).map(|_| ())
    }

    /// Run a queued request on the worker and hand the outcome back.
    pub(crate) fn serve_request(&self, pattern: &str, payload: &[u8], reply: Option<Reply>) {
        let Some(Reply { tx, capacity }) = reply else {
            self.process_detached(pattern, payload);
            return;
        };
        let target = match self.resolve(pattern) {
            Ok(target) => target,
            Err(err) => {
                let _ = tx.send(Err(err));
                return;
            }
        };
        let mut buf = Vec::new();
        if buf.try_reserve_exact(capacity).is_err() {
            let _ = tx.send(Err(BusError::NoMemory));
            return;
        }
        buf.resize(capacity, 0);

        let mut response = Response::new(&mut buf);
        let outcome = match target {
            Some((action, handler)) => {
                Self::invoke(pattern, &action, &*handler, payload, &mut response)
                    .map(|()| response.len())
            }
            None => Ok(0),
        };
        let outcome = outcome.map(|len| {
            buf.truncate(len);
            buf
        });
        if let Err(returned) = tx.send(outcome) {
            debug!(pattern, "REQ reply discarded: caller gave up");
            if let Err(err) = returned.into_inner() {
                self.report_error(pattern, &err);
            }
        }
    }

    /// Run a request whose response nobody waits for, reporting failures.
    pub(crate) fn process_detached(&self, pattern: &str, payload: &[u8]) {
        let Ok(Some((action, handler))) = self.resolve(pattern) else {
            return;
        };
        let mut empty = [0u8; 0];
        let mut response = Response::new(&mut empty);
        if let Err(err) = Self::invoke(pattern, &action, &*handler, payload, &mut response) {
            self.report_error(pattern, &err);
        }
    }

    /// Resolve the target module and invoke its handler on this thread.
    pub(crate) fn process_request(
        &self,
        pattern: &str,
        request: &[u8],
        response: &mut Response<'_>,
    ) -> BusResult<()> {
        match self.resolve(pattern)? {
            Some((action, handler)) => Self::invoke(pattern, &action, &*handler, request, response),
            None => Ok(()),
        }
    }

    fn invoke(
        pattern: &str,
        action: &str,
        handler: &dyn RequestHandler,
        request: &[u8],
        response: &mut Response<'_>,
    ) -> BusResult<()> {
        debug!(pattern, len = request.len(), "REQ");
        let call = AssertUnwindSafe(|| handler.on_request(action, request, response));
        match panic::catch_unwind(call) {
            Ok(result) => result,
            Err(payload) => Err(panic_error(pattern, payload.as_ref())),
        }
    }

    /// Split `pattern` and look up the module's handler.
    ///
    /// `Ok(None)` means the module does not exist and the bus is lenient.
    /// Failures are reported here whichever way the request was issued.
    fn resolve(&self, pattern: &str) -> BusResult<Option<(String, Arc<dyn RequestHandler>)>> {
        let resolved = self.lookup(pattern);
        match &resolved {
            Err(err) => self.report_error(pattern, err),
            Ok(None) => trace!(pattern, "REQ dropped: no such module"),
            Ok(Some(_)) => {}
        }
        resolved
    }

    fn lookup(&self, pattern: &str) -> BusResult<Option<(String, Arc<dyn RequestHandler>)>> {
        let address = pattern::parse(pattern, self.config().max_name_len).ok_or_else(|| {
            BusError::invalid_argument(format!("module name too long in '{}'", pattern))
        })?;
        if address.separator == Separator::Event {
            return Err(BusError::invalid_argument(format!(
                "'{}' is an event address, requests use 'module.action'",
                pattern
            )));
        }
        let handler = self
            .shared
            .registry
            .lock()
            .request_handler(address.module);
        match handler {
            Some(Some(handler)) => Ok(Some((address.member.to_string(), handler))),
            Some(None) => Err(BusError::not_supported(format!(
                "module '{}' has no request handler",
                address.module
            ))),
            None if self.is_strict() => {
                Err(BusError::not_found(format!("module '{}'", address.module)))
            }
            None => Ok(None),
        }
    }
}
