//! Delivery of events to the tracking backend.
//!
//! The tracker only depends on the [`TransportClient`] trait:
//!
//! - `send_single`: one event, body is the event's flat JSON (`track`)
//! - `send_batch`: `{ "events": [...], "sessionId": "..." }` (`track-batch`)
//!
//! [`HttpTransport`] is the reqwest-based implementation. Tests substitute
//! recording or failing transports.

pub mod error;
pub mod http;

use std::future::Future;

use crate::types::{BehaviorEvent, SessionId};

pub use error::{TransportError, TransportErrorKind};
pub use http::HttpTransport;

/// Sends events to the tracking backend.
///
/// Neither method retries on its own; the tracker turns failures into
/// retry-next-cycle. Timeouts are the implementation's responsibility.
pub trait TransportClient: Send + Sync + 'static {
    /// Sends one event on the immediate path.
    fn send_single(
        &self,
        event: &BehaviorEvent,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Sends a batch of queued events.
    fn send_batch(
        &self,
        events: &[BehaviorEvent],
        session_id: &SessionId,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}
