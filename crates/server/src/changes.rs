//! In-process change feed. Writes publish a `ChangeNotice`; `GET /api/v1/changes` relays
//! them as Server-Sent Events so clients know when to re-fetch.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};

use crate::auth::Caller;
use crate::state::AppState;

pub const DEFAULT_FEED_CAPACITY: usize = 256;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeTable {
    Messages,
    QuoteRequests,
    QuoteResponses,
    Orders,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Inserted,
    Updated,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeNotice {
    pub table: ChangeTable,
    pub record_id: String,
    pub kind: ChangeKind,
}

impl ChangeNotice {
    pub fn inserted(table: ChangeTable, record_id: impl ToString) -> Self {
        Self { table, record_id: record_id.to_string(), kind: ChangeKind::Inserted }
    }

    pub fn updated(table: ChangeTable, record_id: impl ToString) -> Self {
        Self { table, record_id: record_id.to_string(), kind: ChangeKind::Updated }
    }
}

#[derive(Clone, Debug)]
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeNotice>,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl ChangeFeed {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn publish(&self, notice: ChangeNotice) {
        // Fails only when nobody is listening.
        if self.sender.send(notice.clone()).is_err() {
            debug!(
                event_name = "changes.publish.unobserved",
                table = ?notice.table,
                record_id = %notice.record_id,
                "change notice dropped without subscribers"
            );
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ChangeNotice> {
        self.sender.subscribe()
    }
}

/// Notices as SSE `change` events. Lagging subscribers skip what they missed.
pub fn notice_events(
    receiver: broadcast::Receiver<ChangeNotice>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    BroadcastStream::new(receiver).filter_map(|received| match received {
        Ok(notice) => match Event::default().event("change").json_data(&notice) {
            Ok(event) => Some(Ok(event)),
            Err(error) => {
                warn!(
                    event_name = "changes.stream.encode_failed",
                    error = %error,
                    "could not encode change notice"
                );
                None
            }
        },
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(
                event_name = "changes.stream.lagged",
                skipped,
                "change feed subscriber lagged; notices skipped"
            );
            None
        }
    })
}

pub async fn stream_changes(
    State(state): State<AppState>,
    caller: Caller,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    debug!(
        event_name = "changes.stream.opened",
        correlation_id = %caller.correlation_id,
        user_id = %caller.user_id,
        "change feed subscriber connected"
    );
    Sse::new(notice_events(state.changes.subscribe())).keep_alive(KeepAlive::default())
}
