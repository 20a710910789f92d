//! Weight classification and delivery routing.
//!
//! High-value events (purchases, cart adds, favorites, searches and long
//! product views) go out immediately through `send_single`. Everything else
//! is appended to the [`BatchQueue`]. An immediate event that cannot be sent
//! now, because no user is signed in or the call failed, is demoted to the
//! batched path rather than dropped.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::batch::BatchQueue;
use crate::identity::IdentityHandle;
use crate::outcome::{DeferReason, RecordOutcome};
use crate::transport::TransportClient;
use crate::types::{BehaviorEvent, EventType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    Immediate,
    Batched,
}

/// Weight and delivery path assigned to one event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub weight: u8,
    pub policy: DeliveryPolicy,
}

impl Route {
    const fn immediate(weight: u8) -> Self {
        Route {
            weight,
            policy: DeliveryPolicy::Immediate,
        }
    }

    const fn batched(weight: u8) -> Self {
        Route {
            weight,
            policy: DeliveryPolicy::Batched,
        }
    }
}

/// Looks up the fixed route for an event.
///
/// Views are split by dwell time: at or above `view_threshold` they count as
/// a strong interest signal, below it they are batched with clicks.
pub fn classify(event_type: EventType, duration_ms: u64, view_threshold: Duration) -> Route {
    match event_type {
        EventType::Purchase => Route::immediate(10),
        EventType::CartAdd => Route::immediate(5),
        EventType::Favorite => Route::immediate(4),
        EventType::Search => Route::immediate(3),
        EventType::View if u128::from(duration_ms) >= view_threshold.as_millis() => {
            Route::immediate(3)
        }
        EventType::View | EventType::Click | EventType::Exposure => Route::batched(1),
    }
}

pub struct EventRouter<T> {
    transport: Arc<T>,
    queue: Arc<BatchQueue<T>>,
    identity: IdentityHandle,
    view_threshold: Duration,
}

impl<T: TransportClient> EventRouter<T> {
    pub fn new(
        transport: Arc<T>,
        queue: Arc<BatchQueue<T>>,
        identity: IdentityHandle,
        view_threshold: Duration,
    ) -> Self {
        EventRouter {
            transport,
            queue,
            identity,
            view_threshold,
        }
    }

    pub fn route_for(&self, event: &BehaviorEvent) -> Route {
        classify(event.event_type, event.duration_ms(), self.view_threshold)
    }

    /// Stamps the event's weight and delivers it on its path.
    pub async fn record(&self, mut event: BehaviorEvent) -> RecordOutcome {
        let route = self.route_for(&event);
        event.weight = Some(route.weight);

        if route.policy == DeliveryPolicy::Batched {
            self.queue.enqueue(event).await;
            return RecordOutcome::Queued;
        }

        if event.user_id.is_none() {
            event.user_id = self.identity.current();
        }
        if event.user_id.is_none() {
            debug!(event_type = %event.event_type, "No signed-in user, deferring to batch");
            return self.defer(event, DeferReason::IdentityUnresolved).await;
        }

        match self.transport.send_single(&event).await {
            Ok(()) => {
                debug!(event_type = %event.event_type, weight = route.weight, "Sent event");
                RecordOutcome::Sent
            }
            Err(e) => {
                warn!(
                    error = %e,
                    event_type = %event.event_type,
                    retriable = e.is_retriable(),
                    "Immediate send failed, deferring to batch"
                );
                self.defer(event, DeferReason::TransportFailed).await
            }
        }
    }

    async fn defer(&self, event: BehaviorEvent, reason: DeferReason) -> RecordOutcome {
        self.queue.enqueue(event).await;
        RecordOutcome::Deferred { reason }
    }
}
