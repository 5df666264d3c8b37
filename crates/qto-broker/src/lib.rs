// SPDX-License-Identifier: MIT OR Apache-2.0
//! In-process event broker with per-subscriber back-pressure.
//!
//! A [`Broker`] maps channel names to lists of bounded subscriber queues.
//! Publishing never blocks: a full queue evicts its oldest event to make
//! room for the newest ("drop-oldest"), so a slow consumer loses history
//! but always sees the latest state. Each subscription runs a heartbeat
//! task that enqueues `{"type":"heartbeat"}` on an interval — skipped
//! outright when the queue is full so heartbeats can never displace
//! application events.
//!
//! Guarantees: FIFO per subscriber, delivery to every subscriber alive at
//! publish time (modulo overflow drops), no ordering across channels.
//! Consumers that cannot tolerate loss must replay the persisted event log
//! instead of relying on the live channel.
//!
//! [`EventBus`] is the seam for multi-process fan-out: a deployment can
//! swap in an adapter backed by an external pub/sub without touching
//! call sites.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use futures::Stream;
use serde_json::{Value, json};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tracing::{debug, trace};

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
/// Default heartbeat interval in seconds.
pub const DEFAULT_HEARTBEAT_SECS: u64 = 25;

/// The payload enqueued by heartbeat tasks.
pub fn heartbeat_event() -> Value {
    json!({"type": "heartbeat"})
}

/// Returns `true` for heartbeat payloads.
pub fn is_heartbeat(event: &Value) -> bool {
    event.get("type").and_then(Value::as_str) == Some("heartbeat")
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Publish/subscribe seam.
///
/// The in-process [`Broker`] is the default implementation; an external
/// adapter (e.g. a Redis-backed fan-out) can replace it behind this trait.
pub trait EventBus: Send + Sync {
    /// Deliver `event` to every current subscriber of `channel`.
    fn publish(&self, channel: &str, event: Value);

    /// Register a new bounded subscription on `channel`.
    fn subscribe(&self, channel: &str) -> Subscription;
}

// ---------------------------------------------------------------------------
// SubscriberQueue
// ---------------------------------------------------------------------------

struct SubscriberQueue {
    events: Mutex<VecDeque<Value>>,
    notify: tokio::sync::Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl SubscriberQueue {
    fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: tokio::sync::Notify::new(),
            capacity,
            closed: AtomicBool::new(false),
        }
    }

    /// Enqueue an application event; evicts the oldest entry on overflow.
    /// Returns `false` when the consumer is gone.
    fn push(&self, event: Value) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let mut q = self.events.lock().expect("queue lock poisoned");
        if q.len() >= self.capacity {
            q.pop_front();
            trace!(capacity = self.capacity, "subscriber queue full, dropped oldest");
        }
        q.push_back(event);
        drop(q);
        self.notify.notify_one();
        true
    }

    /// Enqueue a heartbeat, or skip silently when the queue is full.
    fn push_heartbeat(&self) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        let mut q = self.events.lock().expect("queue lock poisoned");
        if q.len() >= self.capacity {
            return true;
        }
        q.push_back(heartbeat_event());
        drop(q);
        self.notify.notify_one();
        true
    }

    async fn pop(&self) -> Option<Value> {
        loop {
            // Arm the wakeup before inspecting the queue so a concurrent
            // push between check and await cannot be missed.
            let notified = self.notify.notified();
            {
                let mut q = self.events.lock().expect("queue lock poisoned");
                if let Some(ev) = q.pop_front() {
                    return Some(ev);
                }
                if self.closed.load(Ordering::Acquire) {
                    return None;
                }
            }
            notified.await;
        }
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}

// ---------------------------------------------------------------------------
// Broker
// ---------------------------------------------------------------------------

struct BrokerInner {
    channels: Mutex<HashMap<String, Vec<Arc<SubscriberQueue>>>>,
    capacity: usize,
    heartbeat: Duration,
}

/// The in-process channel registry. Cheap to clone.
#[derive(Clone)]
pub struct Broker {
    inner: Arc<BrokerInner>,
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}

impl Broker {
    /// Create a broker with the default queue capacity and heartbeat.
    pub fn new() -> Self {
        Self::with_settings(
            DEFAULT_QUEUE_CAPACITY,
            Duration::from_secs(DEFAULT_HEARTBEAT_SECS),
        )
    }

    /// Create a broker with explicit queue capacity and heartbeat interval.
    pub fn with_settings(capacity: usize, heartbeat: Duration) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                channels: Mutex::new(HashMap::new()),
                capacity,
                heartbeat,
            }),
        }
    }

    /// Number of live subscriptions on `channel`.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .lock()
            .expect("broker lock poisoned")
            .get(channel)
            .map_or(0, Vec::len)
    }

    fn remove_queue(inner: &BrokerInner, channel: &str, queue: &Arc<SubscriberQueue>) {
        let mut channels = inner.channels.lock().expect("broker lock poisoned");
        if let Some(queues) = channels.get_mut(channel) {
            queues.retain(|q| !Arc::ptr_eq(q, queue));
            if queues.is_empty() {
                channels.remove(channel);
            }
        }
    }
}

impl EventBus for Broker {
    fn publish(&self, channel: &str, event: Value) {
        let mut channels = self.inner.channels.lock().expect("broker lock poisoned");
        let Some(queues) = channels.get_mut(channel) else {
            return;
        };
        queues.retain(|q| q.push(event.clone()));
        if queues.is_empty() {
            channels.remove(channel);
            debug!(channel, "removed last dead subscriber queue");
        }
    }

    fn subscribe(&self, channel: &str) -> Subscription {
        let queue = Arc::new(SubscriberQueue::new(self.inner.capacity));
        self.inner
            .channels
            .lock()
            .expect("broker lock poisoned")
            .entry(channel.to_string())
            .or_default()
            .push(queue.clone());

        // The heartbeat keeps idle SSE connections alive; it requires a
        // runtime, which every real subscriber has. Runtime-less tests
        // simply get no heartbeats.
        let heartbeat = tokio::runtime::Handle::try_current().ok().map(|handle| {
            let queue = Arc::downgrade(&queue);
            let interval = self.inner.heartbeat;
            handle.spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
                ticker.tick().await; // first tick fires immediately; skip it
                loop {
                    ticker.tick().await;
                    match queue.upgrade() {
                        Some(q) if q.push_heartbeat() => {}
                        _ => break,
                    }
                }
            })
        });

        Subscription {
            channel: channel.to_string(),
            queue,
            broker: Arc::downgrade(&self.inner),
            heartbeat,
        }
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// A live, bounded subscription. Dropping it cancels the heartbeat and
/// unregisters the queue.
pub struct Subscription {
    channel: String,
    queue: Arc<SubscriberQueue>,
    broker: Weak<BrokerInner>,
    heartbeat: Option<tokio::task::JoinHandle<()>>,
}

impl Subscription {
    /// Channel this subscription is attached to.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Receive the next event in FIFO order; `None` once closed and
    /// drained.
    pub async fn recv(&self) -> Option<Value> {
        self.queue.pop().await
    }

    /// Receive without waiting; `None` when the queue is momentarily empty.
    pub fn try_recv(&self) -> Option<Value> {
        self.queue
            .events
            .lock()
            .expect("queue lock poisoned")
            .pop_front()
    }

    /// Convert into a [`Stream`] of events, for SSE responses.
    pub fn into_stream(self) -> impl Stream<Item = Value> + Send {
        futures::stream::unfold(self, |sub| async move {
            sub.recv().await.map(|ev| (ev, sub))
        })
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hb) = self.heartbeat.take() {
            hb.abort();
        }
        self.queue.close();
        if let Some(inner) = self.broker.upgrade() {
            Broker::remove_queue(&inner, &self.channel, &self.queue);
        }
    }
}
