//! Units of work passed through the bus queue.

use crossbeam_channel::Sender;

use crate::error::{BusError, BusResult};

/// Where the worker sends the outcome of a blocking request.
pub(crate) struct Reply {
    pub(crate) tx: Sender<BusResult<Vec<u8>>>,
    /// Size of the caller's response buffer.
    pub(crate) capacity: usize,
}

/// Queued work. Payloads are owned by the envelope until the worker drops it.
pub(crate) enum Envelope {
    Request {
        pattern: String,
        payload: Box<[u8]>,
        /// `None` for fire-and-forget requests.
        reply: Option<Reply>,
    },
    Event {
        source: String,
        name: String,
        payload: Box<[u8]>,
    },
    /// Forces the loop out of its idle wait.
    Wake,
}

impl Envelope {
    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Envelope::Request { .. } => "request",
            Envelope::Event { .. } => "event",
            Envelope::Wake => "wake",
        }
    }

    /// Drop unprocessed work, failing a waiting caller instead of leaving it
    /// to time out.
    pub(crate) fn discard(self) {
        if let Envelope::Request {
            reply: Some(reply), ..
        } = self
        {
            let _ = reply.tx.send(Err(stopped()));
        }
    }
}

pub(crate) fn stopped() -> BusError {
    BusError::invalid_state("bus stopped before the request completed")
}

/// Copy a caller's payload into an owned buffer, reporting allocation
/// failure instead of aborting.
pub(crate) fn copy_payload(bytes: &[u8]) -> BusResult<Box<[u8]>> {
    let mut owned = Vec::new();
    owned
        .try_reserve_exact(bytes.len())
        .map_err(|_| BusError::NoMemory)?;
    owned.extend_from_slice(bytes);
    Ok(owned.into_boxed_slice())
}
