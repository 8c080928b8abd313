//! The dispatch loop.
//!
//! Idle-waits on the queue for at most the scheduler's next wait, drains
//! every pending envelope once woken, then sweeps timers at most once per
//! scheduling tick. Once the bus is deinitialized, envelopes still queued
//! are discarded and their waiting callers fail with `InvalidState`.

use crossbeam_channel::{select, Receiver, TryRecvError};
use std::sync::Weak;
use tracing::{debug, trace};

use super::context::{Bus, BusShared};
use super::envelope::Envelope;

pub(crate) fn run(shared: Weak<BusShared>, queue: Receiver<Envelope>, shutdown: Receiver<()>) {
    debug!("Bus worker started");
    let mut last_sweep: Option<u64> = None;

    loop {
        // Only hold the bus while working, never while idle
        let wait = match Bus::upgrade(&shared) {
            Some(bus) => bus.next_wait(),
            None => break,
        };

        let first = select! {
            recv(shutdown) -> _ => break,
            recv(queue) -> msg => match msg {
                Ok(envelope) => Some(envelope),
                Err(_) => break,
            },
            default(wait) => None,
        };

        let Some(bus) = Bus::upgrade(&shared) else {
            if let Some(envelope) = first {
                envelope.discard();
            }
            break;
        };

        // A handler may deinit the bus; nothing queued after that runs
        let mut next = first;
        while let Some(envelope) = next {
            if is_stopped(&shutdown) {
                envelope.discard();
                break;
            }
            bus.process(envelope);
            next = queue.try_recv().ok();
        }
        if is_stopped(&shutdown) {
            break;
        }

        let tick = bus.current_tick();
        if last_sweep != Some(tick) {
            last_sweep = Some(tick);
            bus.run_due_timers();
        }
    }

    let mut discarded = 0usize;
    while let Ok(envelope) = queue.try_recv() {
        envelope.discard();
        discarded += 1;
    }
    debug!(discarded, "Bus worker stopped");
}

/// The shutdown sender is never used to send, so disconnection is the only
/// signal it carries.
fn is_stopped(shutdown: &Receiver<()>) -> bool {
    matches!(shutdown.try_recv(), Err(TryRecvError::Disconnected))
}

impl Bus {
    fn process(&self, envelope: Envelope) {
        trace!(kind = envelope.kind(), "Dequeued");
        match envelope {
            Envelope::Request {
                pattern,
                payload,
                reply,
            } => self.serve_request(&pattern, &payload, reply),
            Envelope::Event {
                source,
                name,
                payload,
            } => self.dispatch_event(&source, &name, &payload),
            Envelope::Wake => {}
        }
    }
}
