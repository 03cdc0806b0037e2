//! Per-download event fan-out
//!
//! The [`Broadcaster`] delivers named, JSON-serializable events to every
//! live subscriber of a download. One download may have many subscribers;
//! each subscriber watches exactly one download. Delivery is synchronous; a
//! sink that fails is evicted without disturbing the rest of the fan-out.
//!
//! The transport side (SSE, websocket, in-process channel) lives behind the
//! [`EventSink`] trait. Transports must call
//! [`Broadcaster::remove_subscriber`] when the remote end disconnects so
//! eviction happens immediately rather than via a failed write later.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::types::DownloadId;

/// Failure pushing an event into a sink
#[derive(Debug, Error)]
pub enum SinkError {
    /// The subscriber's channel or connection is gone
    #[error("subscriber disconnected")]
    Closed,

    /// Transport-level write failure
    #[error("transport error: {0}")]
    Transport(String),
}

/// Push side of one subscriber's event transport
///
/// Any transport handshake happens before registration, when the sink is
/// constructed. `send` must not block on the remote peer; slow consumers
/// should buffer internally and report [`SinkError::Closed`] once the peer
/// is really gone.
pub trait EventSink: Send + Sync {
    /// Deliver one named event with its JSON payload
    fn send(&self, event: &str, payload: &Value) -> std::result::Result<(), SinkError>;
}

/// Identifier handed out for each registered subscriber
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

struct Subscriber {
    download_id: DownloadId,
    sink: Box<dyn EventSink>,
}

/// Fan-out of download lifecycle events to registered sinks
#[derive(Default)]
pub struct Broadcaster {
    subscribers: Mutex<HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
}

impl Broadcaster {
    /// Create an empty broadcaster
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a sink as a subscriber of one download
    pub fn add_subscriber(
        &self,
        download_id: DownloadId,
        sink: Box<dyn EventSink>,
    ) -> SubscriberId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers.insert(id, Subscriber { download_id, sink });
        tracing::info!(
            subscriber_id = id,
            download_id = %download_id,
            "Subscriber connected"
        );
        SubscriberId(id)
    }

    /// Detach and release a subscriber
    ///
    /// Returns true if the subscriber was present. The event transport calls
    /// this on disconnect; calling it twice is harmless.
    pub fn remove_subscriber(&self, id: SubscriberId) -> bool {
        let removed = {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            subscribers.remove(&id.0)
        };
        if let Some(ref subscriber) = removed {
            tracing::info!(
                subscriber_id = id.0,
                download_id = %subscriber.download_id,
                "Subscriber disconnected"
            );
        }
        removed.is_some()
    }

    /// Deliver a named event to every current subscriber of a download
    ///
    /// A delivery failure on one sink evicts that subscriber only; the rest
    /// of the fan-out still receives the payload. Broadcasting to a download
    /// with zero subscribers is a no-op.
    pub fn broadcast(&self, download_id: DownloadId, event: &str, payload: &Value) {
        let mut evicted = Vec::new();
        {
            let subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for (&id, subscriber) in subscribers.iter() {
                if subscriber.download_id != download_id {
                    continue;
                }
                if let Err(e) = subscriber.sink.send(event, payload) {
                    tracing::error!(
                        subscriber_id = id,
                        download_id = %download_id,
                        error = %e,
                        "Failed to deliver event, evicting subscriber"
                    );
                    evicted.push(id);
                }
            }
        }

        if !evicted.is_empty() {
            let mut subscribers = self
                .subscribers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            for id in evicted {
                subscribers.remove(&id);
            }
        }
    }

    /// Current fan-out size for a download, 0 if none
    pub fn subscriber_count(&self, download_id: DownloadId) -> usize {
        let subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        subscribers
            .values()
            .filter(|s| s.download_id == download_id)
            .count()
    }
}

/// One delivered event as seen by a channel subscriber
#[derive(Clone, Debug, PartialEq)]
pub struct SinkEvent {
    /// Event name (e.g. "progress", "completed", "error", "cancelled")
    pub event: String,
    /// JSON payload
    pub payload: Value,
}

/// In-process [`EventSink`] backed by an unbounded channel
///
/// The receiving half is exposed as a stream, which is what SSE-style
/// transports want to forward from.
pub struct ChannelSink {
    tx: tokio::sync::mpsc::UnboundedSender<SinkEvent>,
}

impl ChannelSink {
    /// Create a sink plus the stream of events it will deliver
    pub fn new() -> (Self, UnboundedReceiverStream<SinkEvent>) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        (Self { tx }, UnboundedReceiverStream::new(rx))
    }
}

impl EventSink for ChannelSink {
    fn send(&self, event: &str, payload: &Value) -> std::result::Result<(), SinkError> {
        self.tx
            .send(SinkEvent {
                event: event.to_string(),
                payload: payload.clone(),
            })
            .map_err(|_| SinkError::Closed)
    }
}
