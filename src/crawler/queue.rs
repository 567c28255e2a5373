//! Bounded work queue with producer completion tracking
//!
//! Producers register before they start and hold a [`ProducerHandle`] while
//! they may still add work. Dropping the handle clears the producer's flag,
//! also when the producer panics. Consumers block in [`WorkQueue::pop`],
//! which returns `None` only once every flag is clear and the queue is
//! empty. Waiting is notification-driven: a consumer arms its notification
//! before inspecting the queue, so a push or a finishing producer between
//! the inspection and the wait still wakes it.
//!
//! At least one producer must be registered before consumers start,
//! otherwise they see a finished, empty queue and return immediately.

use crate::crawler::backoff::QueueBackoff;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Returned by [`WorkQueue::try_push`] with the rejected item
#[derive(Debug, PartialEq, Eq)]
pub enum PushError<T> {
    Full(T),
}

#[derive(Debug)]
struct ProducerFlag {
    name: String,
    feeding: bool,
}

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    producers: HashMap<u64, ProducerFlag>,
    next_producer: u64,
    high_water_mark: usize,
    pushed: u64,
}

impl<T> QueueState<T> {
    fn producers_finished(&self) -> bool {
        self.producers.values().all(|p| !p.feeding)
    }
}

/// Bounded multi-producer multi-consumer queue
#[derive(Debug)]
pub struct WorkQueue<T> {
    capacity: usize,
    state: Mutex<QueueState<T>>,
    /// An item arrived or a producer finished
    available: Notify,
    /// A producer registered or finished
    producers_changed: Notify,
}

impl<T> WorkQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity.min(1024)),
                producers: HashMap::new(),
                next_producer: 0,
                high_water_mark: 0,
                pushed: 0,
            }),
            available: Notify::new(),
            producers_changed: Notify::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    /// Largest number of items ever held at once
    pub fn high_water_mark(&self) -> usize {
        self.state.lock().high_water_mark
    }

    /// Number of items ever accepted
    pub fn pushed(&self) -> u64 {
        self.state.lock().pushed
    }

    /// Number of producers still feeding
    pub fn active_producers(&self) -> usize {
        self.state.lock().producers.values().filter(|p| p.feeding).count()
    }

    /// Names of the producers still feeding, sorted
    pub fn active_producer_names(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut names: Vec<String> = state
            .producers
            .values()
            .filter(|p| p.feeding)
            .map(|p| p.name.clone())
            .collect();
        names.sort();
        names
    }

    /// True once every registered producer has finished
    pub fn producers_finished(&self) -> bool {
        self.state.lock().producers_finished()
    }

    /// Adds an item unless the queue is at capacity
    pub fn try_push(&self, item: T) -> Result<(), PushError<T>> {
        {
            let mut state = self.state.lock();
            if state.items.len() >= self.capacity {
                return Err(PushError::Full(item));
            }
            state.items.push_back(item);
            state.pushed += 1;
            let len = state.items.len();
            if len > state.high_water_mark {
                state.high_water_mark = len;
            }
        }
        self.available.notify_one();
        Ok(())
    }

    /// Takes the next item, waiting while producers may still add one
    ///
    /// Returns `None` when all producers have finished and nothing is left.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.producers_finished() {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Resolves once every registered producer has finished
    pub async fn wait_until_producers_finished(&self) {
        loop {
            let notified = self.producers_changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.producers_finished() {
                return;
            }

            notified.await;
        }
    }

    fn finish_producer(&self, key: u64) {
        let name = {
            let mut state = self.state.lock();
            match state.producers.get_mut(&key) {
                Some(flag) => {
                    flag.feeding = false;
                    flag.name.clone()
                }
                None => return,
            }
        };
        tracing::trace!("Producer {} finished", name);
        self.available.notify_waiters();
        self.producers_changed.notify_waiters();
    }
}

impl<T: Send> WorkQueue<T> {
    /// Registers a producer; its flag stays set until the handle is dropped
    pub fn register_producer(
        self: &Arc<Self>,
        name: &str,
        backoff: QueueBackoff,
    ) -> ProducerHandle<T> {
        let key = {
            let mut state = self.state.lock();
            let key = state.next_producer;
            state.next_producer += 1;
            state.producers.insert(
                key,
                ProducerFlag {
                    name: name.to_string(),
                    feeding: true,
                },
            );
            key
        };
        self.producers_changed.notify_waiters();

        ProducerHandle {
            queue: Arc::clone(self),
            key,
            name: name.to_string(),
            backoff,
        }
    }
}

/// A registered producer's right to push
///
/// Dropping the handle marks the producer finished.
#[derive(Debug)]
pub struct ProducerHandle<T> {
    queue: Arc<WorkQueue<T>>,
    key: u64,
    name: String,
    backoff: QueueBackoff,
}

impl<T: Send> ProducerHandle<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registers another producer while this one is still feeding
    pub fn register_sibling(&self, name: &str) -> ProducerHandle<T> {
        self.queue.register_producer(name, self.backoff)
    }

    /// Pushes an item, backing off while the queue is full
    ///
    /// Never drops the item. Returns the number of times the queue was full.
    pub async fn push(&self, item: T) -> u32 {
        self.push_with(item, |_| {}).await
    }

    /// Like [`push`](Self::push), calling `on_wait` before each non-zero wait
    pub async fn push_with<F>(&self, mut item: T, mut on_wait: F) -> u32
    where
        F: FnMut(Duration),
    {
        let mut attempt: u32 = 0;
        loop {
            match self.queue.try_push(item) {
                Ok(()) => return attempt,
                Err(PushError::Full(rejected)) => {
                    item = rejected;
                    attempt = attempt.saturating_add(1);
                    let delay = self.backoff.delay(attempt);
                    if delay.is_zero() {
                        tokio::task::yield_now().await;
                    } else {
                        tracing::debug!(
                            "{}: queue full, waiting {:?} (attempt {})",
                            self.name,
                            delay,
                            attempt
                        );
                        on_wait(delay);
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }
    }
}

impl<T> Drop for ProducerHandle<T> {
    fn drop(&mut self) {
        self.queue.finish_producer(self.key);
    }
}
