//! The behavior event model.
//!
//! A [`BehaviorEvent`] serializes to one flat camelCase JSON object: the
//! payload fields are merged with the envelope (`eventType`, `userId`,
//! `sessionId`, `deviceType`, `eventTime`, `weight`). The same shape is used
//! for the persisted offline queue and for the transport body, so an event
//! read back after a restart is byte-for-byte what would have been sent.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{ItemId, SessionId, UserId};

/// The kind of user interaction an event records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    View,
    Search,
    CartAdd,
    Favorite,
    Purchase,
    Click,
    Exposure,
}

impl EventType {
    /// Returns the wire name (`cart_add`, `view`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::View => "view",
            EventType::Search => "search",
            EventType::CartAdd => "cart_add",
            EventType::Favorite => "favorite",
            EventType::Purchase => "purchase",
            EventType::Click => "click",
            EventType::Exposure => "exposure",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-dependent payload fields.
///
/// Which fields are populated depends on the event type; absent fields are
/// omitted from the serialized form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<ItemId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,

    /// Where in the app the interaction happened (e.g. `home_feed`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    /// Time spent on a product page, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Fraction of the page scrolled, 0.0 to 1.0.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scroll_depth: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_count: Option<u32>,
}

impl EventPayload {
    /// Payload for an interaction with a single product.
    pub fn product(product_id: impl Into<ItemId>) -> Self {
        EventPayload {
            product_id: Some(product_id.into()),
            ..Default::default()
        }
    }

    /// Payload for a product page view.
    pub fn view(product_id: impl Into<ItemId>, duration_ms: u64) -> Self {
        EventPayload {
            duration_ms: Some(duration_ms),
            ..Self::product(product_id)
        }
    }

    /// Payload for a search query.
    pub fn search(keyword: impl Into<String>, result_count: u32) -> Self {
        EventPayload {
            keyword: Some(keyword.into()),
            result_count: Some(result_count),
            ..Default::default()
        }
    }

    pub fn with_product_name(mut self, name: impl Into<String>) -> Self {
        self.product_name = Some(name.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_scroll_depth(mut self, depth: f64) -> Self {
        self.scroll_depth = Some(depth);
        self
    }
}

/// A single recorded user interaction.
///
/// `event_time` is assigned when the event is created and never changes,
/// no matter how long the event waits in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorEvent {
    pub event_type: EventType,

    #[serde(flatten)]
    pub payload: EventPayload,

    /// Resolved user, if known when the event was recorded or flushed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,

    pub session_id: SessionId,

    pub device_type: String,

    pub event_time: DateTime<Utc>,

    /// Signal weight assigned by the router.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<u8>,
}

impl BehaviorEvent {
    /// Creates an event stamped with the given time.
    pub fn new(
        event_type: EventType,
        payload: EventPayload,
        session_id: SessionId,
        device_type: impl Into<String>,
        event_time: DateTime<Utc>,
    ) -> Self {
        BehaviorEvent {
            event_type,
            payload,
            user_id: None,
            session_id,
            device_type: device_type.into(),
            event_time,
            weight: None,
        }
    }

    pub fn with_user(mut self, user_id: Option<UserId>) -> Self {
        self.user_id = user_id;
        self
    }

    /// View duration, treating a missing duration as zero.
    pub fn duration_ms(&self) -> u64 {
        self.payload.duration_ms.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn sample_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
    }

    #[test]
    fn serializes_flat_camel_case_object() {
        let event = BehaviorEvent::new(
            EventType::CartAdd,
            EventPayload::product("sku-1").with_source("pdp"),
            SessionId::new("sess_1"),
            "ios",
            sample_time(),
        )
        .with_user(Some(UserId::new("u-7")));

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(
            value,
            json!({
                "eventType": "cart_add",
                "productId": "sku-1",
                "source": "pdp",
                "userId": "u-7",
                "sessionId": "sess_1",
                "deviceType": "ios",
                "eventTime": "2024-03-01T12:30:00Z",
            })
        );
    }

    #[test]
    fn missing_optional_fields_are_omitted() {
        let event = BehaviorEvent::new(
            EventType::Search,
            EventPayload::search("shoes", 12),
            SessionId::new("s"),
            "android",
            sample_time(),
        );
        let value = serde_json::to_value(&event).unwrap();
        let obj = value.as_object().unwrap();

        assert!(!obj.contains_key("userId"));
        assert!(!obj.contains_key("productId"));
        assert!(!obj.contains_key("weight"));
        assert_eq!(obj["keyword"], "shoes");
        assert_eq!(obj["resultCount"], 12);
    }

    #[test]
    fn persisted_form_reads_back_unchanged() {
        let mut event = BehaviorEvent::new(
            EventType::View,
            EventPayload::view("sku-9", 4_200).with_scroll_depth(0.5),
            SessionId::new("s"),
            "web",
            sample_time(),
        );
        event.weight = Some(1);

        let text = serde_json::to_string(&vec![event.clone()]).unwrap();
        let back: Vec<BehaviorEvent> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, vec![event]);
    }

    #[test]
    fn missing_duration_reads_as_zero() {
        let event = BehaviorEvent::new(
            EventType::View,
            EventPayload::product("sku-1"),
            SessionId::new("s"),
            "web",
            sample_time(),
        );
        assert_eq!(event.duration_ms(), 0);
    }

    #[test]
    fn event_type_wire_names() {
        assert_eq!(EventType::CartAdd.to_string(), "cart_add");
        assert_eq!(
            serde_json::to_string(&EventType::Exposure).unwrap(),
            "\"exposure\""
        );
    }
}
