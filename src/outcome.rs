//! Results reported by the recording and flushing paths.
//!
//! Tracking never surfaces errors to the caller. What happened to an event
//! or a flush is reported as one of these values and logged.

use std::fmt;

/// Why an event or batch was not delivered now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    /// No signed-in user yet; delivery waits for identity resolution.
    IdentityUnresolved,

    /// The transport call failed; the event is retried on the next cycle.
    TransportFailed,
}

impl fmt::Display for DeferReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeferReason::IdentityUnresolved => f.write_str("identity unresolved"),
            DeferReason::TransportFailed => f.write_str("transport failed"),
        }
    }
}

/// What the router did with a recorded event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// Delivered on the immediate path.
    Sent,

    /// Low-weight event appended to the batch queue.
    Queued,

    /// Immediate event demoted to the batch queue.
    Deferred { reason: DeferReason },
}

/// What a single flush attempt did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing was queued; no network call and no storage write happened.
    Empty,

    /// `count` events were delivered in one batch.
    Sent { count: usize },

    /// `count` events were kept (at the front of the queue) for the next cycle.
    Requeued { count: usize, reason: DeferReason },
}

impl FlushOutcome {
    /// Number of events delivered by this flush.
    pub fn sent(&self) -> usize {
        match self {
            FlushOutcome::Sent { count } => *count,
            _ => 0,
        }
    }
}
