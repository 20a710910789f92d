//! Core domain types for behavior tracking.
//!
//! The event model is shared by the queue (persisted JSON) and the transport
//! (wire JSON), so both agree on a single serialized shape.

pub mod event;
pub mod ids;

// Re-export commonly used types at the module level
pub use event::{BehaviorEvent, EventPayload, EventType};
pub use ids::{ItemId, SessionId, UserId};
