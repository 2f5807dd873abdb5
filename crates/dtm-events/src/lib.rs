#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]

//! In-process event bus for the live push channel (§6). A bounded backlog
//! lets a reconnecting SSE client replay frames it missed by supplying the
//! last event id it observed; the live tail is served from a broadcast
//! channel beyond that.

mod error;

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, broadcast};
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

pub use error::EventError;

/// Monotonically increasing identifier assigned to each published event.
pub type EventId = u64;

/// Default number of backlog frames retained for SSE replay.
pub const DEFAULT_REPLAY_CAPACITY: usize = 256;

/// One live-event frame, matching the types enumerated in §6.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A catalog or symlink scan has started.
    ScanStart {
        /// Which scan cadence started.
        scan_type: String,
    },
    /// Incremental progress within a running scan.
    ScanProgress {
        /// Items examined so far.
        processed: u64,
        /// Items found to be failed so far.
        failed: u64,
    },
    /// A scan ran to completion.
    ScanComplete {
        /// Free-form summary payload.
        summary: serde_json::Value,
    },
    /// A scan aborted with an error.
    ScanError {
        /// Error message.
        error: String,
    },
    /// A re-submission attempt is about to be made.
    ReinjectStart {
        /// Target torrent id.
        torrent_id: String,
        /// Filename, truncated to 50 characters.
        filename: String,
    },
    /// A re-submission attempt finished.
    ReinjectComplete {
        /// Whether the attempt succeeded.
        success: bool,
        /// Target torrent id.
        torrent_id: String,
        /// Round-trip time in milliseconds.
        response_time_ms: u64,
        /// Error message, when `success` is false.
        error: Option<String>,
    },
    /// A re-submission attempt raised an error before it could complete.
    ReinjectError {
        /// Target torrent id.
        torrent_id: String,
        /// Error message.
        error: String,
    },
    /// The symlink walker has started walking a root path.
    SymlinkScanStart {
        /// Root path being walked.
        path: String,
    },
    /// The symlink walker finished a full walk.
    SymlinkScanComplete {
        /// Total broken symlinks found.
        total_broken: u64,
        /// Wall-clock duration of the walk, in milliseconds.
        scan_duration_ms: u64,
        /// Root path that was walked.
        scan_path: String,
    },
    /// The correlator has started matching extracted names to the catalog.
    SymlinkMatchStart,
    /// The correlator finished matching extracted names to the catalog.
    SymlinkMatchComplete {
        /// Total symlinks considered.
        total_symlinks: u64,
        /// How many were matched to a catalog entry.
        matched_count: u64,
        /// `matched_count / total_symlinks`, or 0 when `total_symlinks` is 0.
        match_rate: f64,
    },
}

impl Event {
    /// Stable frame-type label, used as the SSE `event:` field and for
    /// whitelist-based filtering.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ScanStart { .. } => "scan_start",
            Self::ScanProgress { .. } => "scan_progress",
            Self::ScanComplete { .. } => "scan_complete",
            Self::ScanError { .. } => "scan_error",
            Self::ReinjectStart { .. } => "reinject_start",
            Self::ReinjectComplete { .. } => "reinject_complete",
            Self::ReinjectError { .. } => "reinject_error",
            Self::SymlinkScanStart { .. } => "symlink_scan_start",
            Self::SymlinkScanComplete { .. } => "symlink_scan_complete",
            Self::SymlinkMatchStart => "symlink_match_start",
            Self::SymlinkMatchComplete { .. } => "symlink_match_complete",
        }
    }
}

/// A published event together with its assigned id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Monotonic id, unique within one process lifetime.
    pub id: EventId,
    /// When the event was published, UTC.
    pub timestamp: DateTime<Utc>,
    /// The event payload.
    pub event: Event,
}

/// In-process publish/subscribe bus with bounded backlog-based replay.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
    backlog: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Build a bus whose broadcast channel holds `capacity` live frames
    /// before a slow subscriber starts lagging, and whose replay backlog
    /// retains [`DEFAULT_REPLAY_CAPACITY`] frames.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(DEFAULT_REPLAY_CAPACITY))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: DEFAULT_REPLAY_CAPACITY,
        }
    }

    /// Publish an event, assigning it the next id and the current timestamp.
    ///
    /// Returns the assigned [`EventId`]. Never fails: if there are no live
    /// subscribers the event is still appended to the replay backlog.
    pub async fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut backlog = self.backlog.lock().await;
            backlog.push_back(envelope.clone());
            while backlog.len() > self.replay_capacity {
                backlog.pop_front();
            }
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// The most recently assigned event id, or 0 if nothing has been
    /// published yet.
    pub async fn last_event_id(&self) -> EventId {
        self.backlog
            .lock()
            .await
            .back()
            .map_or(0, |envelope| envelope.id)
    }

    /// Backlog frames strictly newer than `since`, oldest first.
    pub async fn backlog_since(&self, since: Option<EventId>) -> Vec<EventEnvelope> {
        let backlog = self.backlog.lock().await;
        match since {
            None => backlog.iter().cloned().collect(),
            Some(since) => backlog
                .iter()
                .filter(|envelope| envelope.id > since)
                .cloned()
                .collect(),
        }
    }

    /// Subscribe starting from `since` (replaying backlog frames newer than
    /// it) followed by the live tail.
    pub fn subscribe(&self, since: Option<EventId>) -> EventStream {
        let receiver = self.sender.subscribe();
        EventStream::new(self.clone(), receiver, since)
    }
}

/// A stream of [`EventEnvelope`]s: backlog replay followed by the live tail,
/// transparently resubscribing past a [`BroadcastStreamRecvError::Lagged`].
pub struct EventStream {
    bus: EventBus,
    inner: BroadcastStream<EventEnvelope>,
    pending_replay: std::collections::VecDeque<EventEnvelope>,
    last_seen: Option<EventId>,
    replay_done: bool,
}

impl EventStream {
    fn new(bus: EventBus, receiver: broadcast::Receiver<EventEnvelope>, since: Option<EventId>) -> Self {
        Self {
            bus,
            inner: BroadcastStream::new(receiver),
            pending_replay: std::collections::VecDeque::new(),
            last_seen: since,
            replay_done: false,
        }
    }

    async fn fill_replay(&mut self) {
        if self.replay_done {
            return;
        }
        let backlog = self.bus.backlog_since(self.last_seen).await;
        self.pending_replay.extend(backlog);
        self.replay_done = true;
    }

    /// Pull the next envelope, replaying backlog first. Resolves to `None`
    /// only if the underlying broadcast sender has been dropped entirely.
    pub async fn next(&mut self) -> Option<Result<EventEnvelope, EventError>> {
        if !self.replay_done {
            self.fill_replay().await;
        }

        if let Some(envelope) = self.pending_replay.pop_front() {
            self.last_seen = Some(envelope.id);
            return Some(Ok(envelope));
        }

        loop {
            match self.inner.next().await {
                None => return None,
                Some(Ok(envelope)) => {
                    if self.last_seen.is_some_and(|seen| envelope.id <= seen) {
                        continue;
                    }
                    self.last_seen = Some(envelope.id);
                    return Some(Ok(envelope));
                }
                Some(Err(BroadcastStreamRecvError::Lagged(skipped))) => {
                    return Some(Err(EventError::Lagged { skipped }));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn publish_assigns_increasing_ids() {
        let bus = EventBus::with_capacity(16);
        let first = bus.publish(Event::SymlinkMatchStart).await;
        let second = bus.publish(Event::SymlinkMatchStart).await;
        assert_eq!(second, first + 1);
        assert_eq!(bus.last_event_id().await, second);
    }

    #[tokio::test]
    async fn backlog_since_filters_by_id() {
        let bus = EventBus::with_capacity(16);
        let first = bus.publish(Event::SymlinkMatchStart).await;
        bus.publish(Event::SymlinkMatchStart).await;
        let since_first = bus.backlog_since(Some(first)).await;
        assert_eq!(since_first.len(), 1);
        let all = bus.backlog_since(None).await;
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn subscribe_replays_backlog_then_live() {
        let bus = EventBus::with_capacity(16);
        let first = bus.publish(Event::SymlinkMatchStart).await;
        let mut stream = bus.subscribe(None);

        let replayed = stream.next().await.expect("replay event").expect("ok");
        assert_eq!(replayed.id, first);

        let publisher = bus.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            publisher
                .publish(Event::ScanError {
                    error: "boom".to_string(),
                })
                .await;
        });

        let live = tokio::time::timeout(Duration::from_millis(200), stream.next())
            .await
            .expect("timed out")
            .expect("some")
            .expect("ok");
        assert_eq!(live.event.kind(), "scan_error");
    }

    #[tokio::test]
    async fn subscribe_since_skips_already_seen_backlog() {
        let bus = EventBus::with_capacity(16);
        let first = bus.publish(Event::SymlinkMatchStart).await;
        bus.publish(Event::SymlinkMatchStart).await;
        let mut stream = bus.subscribe(Some(first));
        let next = stream.next().await.expect("event").expect("ok");
        assert_eq!(next.id, first + 1);
    }

    #[test]
    fn event_kind_labels_match_spec_frame_types() {
        assert_eq!(
            Event::ScanStart {
                scan_type: "quick".to_string()
            }
            .kind(),
            "scan_start"
        );
        assert_eq!(Event::SymlinkMatchStart.kind(), "symlink_match_start");
    }
}
