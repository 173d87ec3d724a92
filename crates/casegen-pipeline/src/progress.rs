//! Progress pub/sub
//!
//! One broadcast channel per request. Events are published in state-machine
//! order; a late subscriber receives the current status on join and live
//! events after. The channel also carries the cooperative cancellation
//! flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use casegen_model::{AgentName, MetricStatus, RequestId, RequestStatus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Compact metric attached to a progress event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMetric {
    /// Stage the metric belongs to
    pub agent_name: AgentName,
    /// Attempt duration, milliseconds
    pub duration_ms: u64,
    /// Attempt outcome
    pub status: MetricStatus,
}

/// One progress event on a request's channel
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Owning request
    pub request_id: RequestId,
    /// Stage that produced the event, absent for ingest/terminal markers
    pub stage: Option<AgentName>,
    /// Request status after the event
    pub status: RequestStatus,
    /// 1-based step number (0 for ingest)
    pub step_number: u32,
    /// Publish time
    pub timestamp: DateTime<Utc>,
    /// Metric of the attempt that produced the event
    pub metric: Option<EventMetric>,
}

impl ProgressEvent {
    /// Event for a status change
    #[must_use]
    pub fn new(request_id: RequestId, stage: Option<AgentName>, status: RequestStatus) -> Self {
        Self {
            request_id,
            stage,
            status,
            step_number: stage.map_or(0, |s| s.step_number()),
            timestamp: Utc::now(),
            metric: None,
        }
    }

    /// With an attached metric
    #[inline]
    #[must_use]
    pub fn with_metric(mut self, metric: EventMetric) -> Self {
        self.metric = Some(metric);
        self
    }
}

#[derive(Debug)]
struct ChannelEntry {
    tx: broadcast::Sender<ProgressEvent>,
    last: RwLock<Option<ProgressEvent>>,
    cancelled: AtomicBool,
}

impl ChannelEntry {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            last: RwLock::new(None),
            cancelled: AtomicBool::new(false),
        }
    }
}

/// Registry of per-request progress channels
#[derive(Debug, Default)]
pub struct ProgressBus {
    channels: DashMap<RequestId, Arc<ChannelEntry>>,
}

impl ProgressBus {
    /// Empty bus
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&self, id: RequestId) -> Arc<ChannelEntry> {
        self.channels
            .entry(id)
            .or_insert_with(|| Arc::new(ChannelEntry::new()))
            .clone()
    }

    /// Publish an event; also becomes the join snapshot for late subscribers
    pub fn publish(&self, event: ProgressEvent) {
        let entry = self.entry(event.request_id);
        *entry.last.write() = Some(event.clone());
        // no receivers is fine
        let _ = entry.tx.send(event);
    }

    /// Subscribe; returns the current status (if any) plus the live stream
    #[must_use]
    pub fn subscribe(
        &self,
        id: RequestId,
    ) -> (Option<ProgressEvent>, broadcast::Receiver<ProgressEvent>) {
        let entry = self.entry(id);
        let current = entry.last.read().clone();
        (current, entry.tx.subscribe())
    }

    /// Set the cooperative cancellation flag
    pub fn cancel(&self, id: RequestId) {
        self.entry(id).cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested
    #[must_use]
    pub fn is_cancelled(&self, id: RequestId) -> bool {
        self.channels
            .get(&id)
            .map(|entry| entry.cancelled.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Drop a request's channel (tests / cleanup)
    pub fn remove(&self, id: RequestId) {
        self.channels.remove(&id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let bus = ProgressBus::new();
        let id = RequestId::new();
        let (_, mut rx) = bus.subscribe(id);

        bus.publish(ProgressEvent::new(
            id,
            Some(AgentName::Reconnaissance),
            RequestStatus::Reconnaissance,
        ));
        bus.publish(ProgressEvent::new(
            id,
            Some(AgentName::Generator),
            RequestStatus::Generation,
        ));

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(first.status, RequestStatus::Reconnaissance);
        assert_eq!(second.status, RequestStatus::Generation);
        assert_eq!(first.step_number, 1);
        assert_eq!(second.step_number, 2);
    }

    #[tokio::test]
    async fn late_subscriber_gets_current_status() {
        let bus = ProgressBus::new();
        let id = RequestId::new();

        bus.publish(ProgressEvent::new(
            id,
            Some(AgentName::Validator),
            RequestStatus::Validation,
        ));

        let (current, _rx) = bus.subscribe(id);
        assert_eq!(current.unwrap().status, RequestStatus::Validation);
    }

    #[tokio::test]
    async fn cancellation_flag_roundtrip() {
        let bus = ProgressBus::new();
        let id = RequestId::new();
        assert!(!bus.is_cancelled(id));
        bus.cancel(id);
        assert!(bus.is_cancelled(id));
        // other requests are untouched
        assert!(!bus.is_cancelled(RequestId::new()));
    }

    #[tokio::test]
    async fn independent_channels_per_request() {
        let bus = ProgressBus::new();
        let a = RequestId::new();
        let b = RequestId::new();
        let (_, mut rx_b) = bus.subscribe(b);

        bus.publish(ProgressEvent::new(a, None, RequestStatus::Pending));
        bus.publish(ProgressEvent::new(b, None, RequestStatus::Completed));

        let only = rx_b.recv().await.unwrap();
        assert_eq!(only.request_id, b);
        assert_eq!(only.status, RequestStatus::Completed);
    }
}
