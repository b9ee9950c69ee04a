//! Unbounded FIFO queue shared between run tasks and the stream consumer
//!
//! Producers never block. Consumers can block (`pop`), poll (`try_pop`) or
//! drain. Closing the queue wakes every blocked consumer so no `pop` can hang
//! once a run has been torn down.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::Notify;

/// Returned by `push` once the queue has been closed
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("queue closed")]
pub struct QueueClosed;

/// Multi-producer, multi-consumer FIFO with async blocking pop
#[derive(Debug)]
pub struct AsyncQueue<T> {
    items: Mutex<VecDeque<T>>,
    notify: Notify,
    closed: AtomicBool,
}

impl<T> AsyncQueue<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append an item; fails only after `close`
    pub fn push(&self, item: T) -> Result<(), QueueClosed> {
        {
            let mut items = self.lock();
            if self.closed.load(Ordering::Acquire) {
                return Err(QueueClosed);
            }
            items.push_back(item);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Wait for the next item.
    ///
    /// Returns `None` only when the queue is closed and empty.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a push or close between the check
            // and the await is not missed.
            notified.as_mut().enable();

            if let Some(item) = self.try_pop() {
                return Some(item);
            }
            if self.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Take the next item without waiting
    pub fn try_pop(&self) -> Option<T> {
        self.lock().pop_front()
    }

    /// Remove and return everything currently queued
    pub fn drain(&self) -> Vec<T> {
        self.lock().drain(..).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Reject further pushes and wake all waiting consumers
    pub fn close(&self) {
        {
            let _items = self.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl<T> Default for AsyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = AsyncQueue::new();
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        assert_eq!(queue.len(), 5);

        let mut popped = Vec::new();
        while let Some(i) = queue.try_pop() {
            popped.push(i);
        }
        assert_eq!(popped, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_pop_waits_for_push() {
        let queue = Arc::new(AsyncQueue::new());

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.push("hello").unwrap();

        let item = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("consumer should wake")
            .unwrap();
        assert_eq!(item, Some("hello"));
    }

    #[tokio::test]
    async fn test_close_releases_blocked_consumer() {
        let queue: Arc<AsyncQueue<u32>> = Arc::new(AsyncQueue::new());

        let consumer = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.pop().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let item = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .expect("close should wake consumer")
            .unwrap();
        assert_eq!(item, None);
        assert_eq!(queue.push(1), Err(QueueClosed));
    }

    #[tokio::test]
    async fn test_pop_after_close_returns_remaining_items() {
        let queue = AsyncQueue::new();
        queue.push(1).unwrap();
        queue.close();

        assert_eq!(queue.pop().await, Some(1));
        assert_eq!(queue.pop().await, None);
    }

    #[test]
    fn test_drain() {
        let queue = AsyncQueue::new();
        queue.push('a').unwrap();
        queue.push('b').unwrap();
        assert_eq!(queue.drain(), vec!['a', 'b']);
        assert!(queue.is_empty());
    }
}
