use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use seeker_types::{EventKind, EventSink, ResearchEvent};

pub const DEFAULT_SUBSCRIBER_BUFFER: usize = 100;

// NOTE: Why not tokio::sync::broadcast
//
// The bus contract is drop-oldest with a per-subscriber counter: a slow
// subscriber silently loses its oldest events and can ask how many.
// broadcast's lagging receivers instead get an error and skip to the
// newest event, which breaks "events from one publisher arrive in publish
// order" for everything after the gap. Hand-rolled ring buffers keep the
// contract exact and the implementation small.

struct Subscriber {
    filter: Option<HashSet<EventKind>>,
    queue: Mutex<VecDeque<ResearchEvent>>,
    dropped: AtomicU64,
    notify: Notify,
    detached: AtomicBool,
}

struct BusInner {
    subscribers: Mutex<Vec<Arc<Subscriber>>>,
    capacity: usize,
    closed: AtomicBool,
}

/// Typed publish/subscribe with bounded per-subscriber buffers.
///
/// `publish` never blocks: a full buffer drops its oldest event and bumps
/// the subscriber's drop counter. Subscribers are independent; one slow
/// consumer cannot block others. Closing the bus lets every stream drain
/// what it has, then yields `None`.
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(Vec::new()),
                capacity: capacity.max(1),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Subscribe to all events, or to a specific set of kinds.
    pub fn subscribe(&self, kinds: impl IntoIterator<Item = EventKind>) -> EventStream {
        let filter: HashSet<EventKind> = kinds.into_iter().collect();
        let subscriber = Arc::new(Subscriber {
            filter: if filter.is_empty() { None } else { Some(filter) },
            queue: Mutex::new(VecDeque::new()),
            dropped: AtomicU64::new(0),
            notify: Notify::new(),
            detached: AtomicBool::new(false),
        });
        self.inner
            .subscribers
            .lock()
            .expect("bus lock poisoned")
            .push(subscriber.clone());
        EventStream {
            subscriber,
            bus: self.inner.clone(),
        }
    }

    pub fn subscribe_all(&self) -> EventStream {
        self.subscribe([])
    }

    /// Non-blocking fan-out to every matching subscriber.
    pub fn publish(&self, event: ResearchEvent) {
        if self.inner.closed.load(Ordering::Acquire) {
            return;
        }
        let mut subscribers = self.inner.subscribers.lock().expect("bus lock poisoned");
        subscribers.retain(|s| !s.detached.load(Ordering::Acquire));

        let kind = event.kind();
        for subscriber in subscribers.iter() {
            if let Some(filter) = &subscriber.filter {
                if !filter.contains(&kind) {
                    continue;
                }
            }
            {
                let mut queue = subscriber.queue.lock().expect("subscriber lock poisoned");
                if queue.len() >= self.inner.capacity {
                    queue.pop_front();
                    subscriber.dropped.fetch_add(1, Ordering::Relaxed);
                }
                queue.push_back(event.clone());
            }
            subscriber.notify.notify_one();
        }
    }

    /// Close the bus: no further events are accepted, streams drain.
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
        for subscriber in self
            .inner
            .subscribers
            .lock()
            .expect("bus lock poisoned")
            .iter()
        {
            subscriber.notify.notify_one();
        }
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: ResearchEvent) {
        self.publish(event);
    }
}

/// Finite stream of events for one subscriber.
pub struct EventStream {
    subscriber: Arc<Subscriber>,
    bus: Arc<BusInner>,
}

impl EventStream {
    /// Next event, or `None` once the bus is closed and the buffer drained.
    pub async fn recv(&mut self) -> Option<ResearchEvent> {
        loop {
            if let Some(event) = self.try_recv() {
                return Some(event);
            }
            if self.bus.closed.load(Ordering::Acquire) {
                return None;
            }
            self.subscriber.notify.notified().await;
        }
    }

    pub fn try_recv(&mut self) -> Option<ResearchEvent> {
        self.subscriber
            .queue
            .lock()
            .expect("subscriber lock poisoned")
            .pop_front()
    }

    /// How many events this subscriber lost to backpressure.
    pub fn dropped(&self) -> u64 {
        self.subscriber.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        self.subscriber.detached.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seeker_types::{ProgressPayload, SessionId};

    fn event(session_id: SessionId, worker: u32) -> ResearchEvent {
        ResearchEvent::new(
            session_id,
            ProgressPayload::WorkerStarted {
                worker,
                objective: "x".to_string(),
            },
        )
    }

    #[tokio::test]
    async fn publish_order_is_preserved_per_subscriber() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe_all();
        let id = SessionId::new();

        for i in 0..10 {
            bus.publish(event(id, i));
        }
        bus.close();

        let mut seen = Vec::new();
        while let Some(e) = stream.recv().await {
            if let ProgressPayload::WorkerStarted { worker, .. } = e.payload {
                seen.push(worker);
            }
        }
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn overflow_drops_oldest_and_counts() {
        let bus = EventBus::with_capacity(3);
        let mut stream = bus.subscribe_all();
        let id = SessionId::new();

        for i in 0..5 {
            bus.publish(event(id, i));
        }
        bus.close();

        assert_eq!(stream.dropped(), 2);
        let mut seen = Vec::new();
        while let Some(e) = stream.recv().await {
            if let ProgressPayload::WorkerStarted { worker, .. } = e.payload {
                seen.push(worker);
            }
        }
        // Oldest two were dropped.
        assert_eq!(seen, vec![2, 3, 4]);
    }

    #[tokio::test]
    async fn kind_filter_applies() {
        let bus = EventBus::new();
        let mut only_failures = bus.subscribe([EventKind::WorkerFailed]);
        let id = SessionId::new();

        bus.publish(event(id, 1));
        bus.publish(ResearchEvent::new(
            id,
            ProgressPayload::WorkerFailed {
                worker: 1,
                error: "boom".to_string(),
            },
        ));
        bus.close();

        let first = only_failures.recv().await.unwrap();
        assert_eq!(first.kind(), EventKind::WorkerFailed);
        assert!(only_failures.recv().await.is_none());
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_block_publisher_or_others() {
        let bus = EventBus::with_capacity(2);
        let mut fast = bus.subscribe_all();
        let _slow = bus.subscribe_all(); // never reads

        let id = SessionId::new();
        for i in 0..50 {
            bus.publish(event(id, i));
        }
        // Publisher never blocked; fast subscriber still receives.
        assert!(fast.try_recv().is_some());
        bus.close();
    }

    #[tokio::test]
    async fn close_drains_then_ends() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe_all();
        bus.publish(event(SessionId::new(), 7));
        bus.close();

        assert!(stream.recv().await.is_some());
        assert!(stream.recv().await.is_none());
    }
}
