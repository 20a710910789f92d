//! HTTP transport for the tracking backend.
//!
//! ```text
//! POST <base>/track        body: <event JSON>
//! POST <base>/track-batch  body: { "events": [<event JSON>...], "sessionId": "..." }
//! ```
//!
//! Any 2xx response is success. The request timeout is owned here; the
//! tracker itself imposes none.

use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use super::{TransportClient, TransportError};
use crate::types::{BehaviorEvent, SessionId};

/// Default request timeout (10 seconds).
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Maximum number of response body bytes kept in an error message.
const MAX_ERROR_BODY_LEN: usize = 256;

/// Body of a `track-batch` request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TrackBatchBody<'a> {
    pub events: &'a [BehaviorEvent],
    pub session_id: &'a SessionId,
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    track_url: String,
    track_batch_url: String,
}

impl HttpTransport {
    /// Creates a transport posting to `base_url` with the default timeout.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_timeout(base_url, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        let base = base_url.trim_end_matches('/');
        Ok(HttpTransport {
            client,
            track_url: format!("{base}/track"),
            track_batch_url: format!("{base}/track-batch"),
        })
    }

    pub fn track_url(&self) -> &str {
        &self.track_url
    }

    pub fn track_batch_url(&self) -> &str {
        &self.track_batch_url
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<(), TransportError> {
        let response = self.client.post(url).json(body).send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let mut text = response.text().await.unwrap_or_default();
        if text.len() > MAX_ERROR_BODY_LEN {
            let mut cut = MAX_ERROR_BODY_LEN;
            while !text.is_char_boundary(cut) {
                cut -= 1;
            }
            text.truncate(cut);
        }
        let message = if text.is_empty() {
            status.canonical_reason().unwrap_or("request failed").to_string()
        } else {
            text
        };
        Err(TransportError::from_status(status.as_u16(), message))
    }
}

impl TransportClient for HttpTransport {
    async fn send_single(&self, event: &BehaviorEvent) -> Result<(), TransportError> {
        debug!(event_type = %event.event_type, "POST track");
        self.post_json(&self.track_url, event).await
    }

    async fn send_batch(
        &self,
        events: &[BehaviorEvent],
        session_id: &SessionId,
    ) -> Result<(), TransportError> {
        debug!(count = events.len(), session = %session_id, "POST track-batch");
        let body = TrackBatchBody { events, session_id };
        self.post_json(&self.track_batch_url, &body).await
    }
}
