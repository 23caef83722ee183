//! Consumer fan-out
//!
//! Each consumer owns a bounded [`DeliveryQueue`] drained by its own tokio
//! task. The inbound reader only pushes into queues, so a slow consumer can
//! back up its own queue but never the reader or its siblings (unless the
//! consumer opted into [`OverflowPolicy::Block`]).
//!
//! Consumers are independent of socket generations: reconnects neither
//! touch the queues nor restart delivery tasks.

use crate::model::Event;
use crate::traits::{CallbackSink, EventSink, RtmError};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// What to do when a consumer's queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverflowPolicy {
    /// Evict the oldest queued event to make room
    #[default]
    DropOldest,
    /// Make the reader wait until the consumer catches up
    Block,
}

/// Bounded single-producer, single-consumer event queue
#[derive(Debug)]
pub struct DeliveryQueue {
    items: Mutex<VecDeque<Event>>,
    capacity: usize,
    policy: OverflowPolicy,
    available: Notify,
    space: Notify,
    closed: AtomicBool,
    dropped: AtomicU64,
}

impl DeliveryQueue {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity: capacity.max(1),
            policy,
            available: Notify::new(),
            space: Notify::new(),
            closed: AtomicBool::new(false),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue an event, applying the overflow policy when full
    ///
    /// Returns `false` if the queue is closed.
    pub async fn push(&self, event: Event) -> bool {
        loop {
            if self.is_closed() {
                return false;
            }
            {
                let mut items = self.items.lock();
                if items.len() < self.capacity {
                    items.push_back(event);
                    drop(items);
                    self.available.notify_one();
                    return true;
                }
                if self.policy == OverflowPolicy::DropOldest {
                    items.pop_front();
                    items.push_back(event);
                    drop(items);
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    self.available.notify_one();
                    return true;
                }
            }
            // Block: wait for the consumer to take something
            self.space.notified().await;
        }
    }

    /// Take the next event, waiting if the queue is empty
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<Event> {
        loop {
            let next = self.items.lock().pop_front();
            if let Some(event) = next {
                self.space.notify_one();
                return Some(event);
            }
            if self.is_closed() {
                return None;
            }
            self.available.notified().await;
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.available.notify_one();
        self.space.notify_one();
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Events evicted by `DropOldest`
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct ConsumerSlot {
    queue: Arc<DeliveryQueue>,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Named consumers and their delivery tasks
pub struct ConsumerRegistry {
    consumers: RwLock<HashMap<String, Arc<ConsumerSlot>>>,
    capacity: usize,
    policy: OverflowPolicy,
}

impl ConsumerRegistry {
    pub fn new(capacity: usize, policy: OverflowPolicy) -> Self {
        Self {
            consumers: RwLock::new(HashMap::new()),
            capacity,
            policy,
        }
    }

    /// Register a sink under `name`, replacing (and closing) any previous one
    ///
    /// Must be called from within a tokio runtime.
    pub fn register<S>(&self, name: impl Into<String>, sink: S)
    where
        S: EventSink,
    {
        self.register_boxed(name.into(), Box::new(sink));
    }

    /// Register a plain function run for every user-facing event
    pub fn register_callback<F>(&self, name: impl Into<String>, callback: F)
    where
        F: FnMut(Event) + Send + 'static,
    {
        self.register(name, CallbackSink::new(callback));
    }

    pub(crate) fn register_boxed(&self, name: String, sink: Box<dyn EventSink>) {
        let queue = Arc::new(DeliveryQueue::new(self.capacity, self.policy));
        let task = tokio::spawn(delivery_task(name.clone(), Arc::clone(&queue), sink));
        let slot = Arc::new(ConsumerSlot {
            queue,
            task: Mutex::new(Some(task)),
        });

        info!("Registering consumer '{}'", name);
        if let Some(previous) = self.consumers.write().insert(name.clone(), slot) {
            debug!("Consumer '{}' replaced, closing previous queue", name);
            previous.queue.close();
        }
    }

    /// Remove a consumer; its queue is drained before its task exits
    pub fn unregister(&self, name: &str) -> bool {
        match self.consumers.write().remove(name) {
            Some(slot) => {
                slot.queue.close();
                true
            }
            None => false,
        }
    }

    /// Push an event to every consumer's queue
    pub async fn dispatch(&self, event: &Event) {
        let slots: Vec<Arc<ConsumerSlot>> = self.consumers.read().values().cloned().collect();
        for slot in slots {
            slot.queue.push(event.clone()).await;
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.consumers.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.consumers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.consumers.read().is_empty()
    }

    /// Events dropped for a consumer because its queue overflowed
    pub fn dropped(&self, name: &str) -> Option<u64> {
        self.consumers.read().get(name).map(|slot| slot.queue.dropped())
    }

    /// Close every queue and wait for the delivery tasks to drain
    pub async fn shutdown(&self) {
        let slots: Vec<Arc<ConsumerSlot>> = self.consumers.write().drain().map(|(_, s)| s).collect();
        for slot in &slots {
            slot.queue.close();
        }
        for slot in slots {
            let task = slot.task.lock().take();
            if let Some(mut task) = task {
                if tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await.is_err() {
                    warn!("Consumer did not drain within {:?}, aborting it", DRAIN_TIMEOUT);
                    task.abort();
                }
            }
        }
    }
}

async fn delivery_task(name: String, queue: Arc<DeliveryQueue>, mut sink: Box<dyn EventSink>) {
    debug!("Delivery task for consumer '{}' started", name);

    while let Some(event) = queue.pop().await {
        match sink.deliver(event).await {
            Ok(()) => {}
            Err(RtmError::ConsumerGone(reason)) => {
                warn!("Consumer '{}' is gone ({}), stopping delivery", name, reason);
                queue.close();
                break;
            }
            Err(e) => {
                error!("Consumer '{}' failed: {}", name, e);
            }
        }
    }

    debug!("Delivery task for consumer '{}' exiting", name);
}
