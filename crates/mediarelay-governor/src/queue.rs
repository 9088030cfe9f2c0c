//! Bounded FIFO queue for provider-backed fetches.
//!
//! Admission goes through a fair [`Semaphore`], so waiters are served in
//! arrival order. The slot is an RAII guard: it is released when the task
//! returns, errors, panics, or the caller drops the future.

use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Semaphore, SemaphorePermit};

use crate::error::GovernorError;
use crate::mirror::ThrottleMirror;

/// Default number of provider-backed fetches allowed in flight.
pub const DEFAULT_MAX_CONCURRENT: usize = 2;

#[derive(Debug, Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    queued: AtomicUsize,
    completed: AtomicU64,
}

/// Point-in-time queue statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStats {
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub queued: usize,
    pub completed: u64,
    pub max_concurrent: usize,
}

pub struct RequestQueue {
    permits: Semaphore,
    max_concurrent: usize,
    mirror: Arc<ThrottleMirror>,
    counters: Counters,
}

impl RequestQueue {
    pub fn new(max_concurrent: usize, mirror: Arc<ThrottleMirror>) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            permits: Semaphore::new(max_concurrent),
            max_concurrent,
            mirror,
            counters: Counters::default(),
        }
    }

    /// Run `task` once a slot is free.
    ///
    /// Refused up front while the mirror reports a rate limit, and refused again
    /// if the window opened while the task was waiting.
    pub async fn run<F, Fut, T, E>(&self, task: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<GovernorError>,
    {
        self.check_mirror()?;

        let permit = {
            let _waiting = Waiting::enter(&self.counters);
            self.permits
                .acquire()
                .await
                .map_err(|_| GovernorError::Closed)?
        };

        self.check_mirror()?;

        let _slot = Slot::enter(&self.counters, permit);
        task().await
    }

    /// Reject every waiting and future task with [`GovernorError::Closed`].
    pub fn close(&self) {
        self.permits.close();
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            in_flight: self.counters.in_flight.load(Ordering::SeqCst),
            peak_in_flight: self.counters.peak_in_flight.load(Ordering::SeqCst),
            queued: self.counters.queued.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            max_concurrent: self.max_concurrent,
        }
    }

    fn check_mirror(&self) -> Result<(), GovernorError> {
        let status = self.mirror.status();
        if status.limited {
            tracing::debug!(
                remaining_secs = status.remaining_secs,
                "Queue refusing task while rate limited"
            );
            return Err(GovernorError::RateLimited {
                remaining_secs: status.remaining_secs,
            });
        }
        Ok(())
    }
}

struct Waiting<'a> {
    counters: &'a Counters,
}

impl<'a> Waiting<'a> {
    fn enter(counters: &'a Counters) -> Self {
        counters.queued.fetch_add(1, Ordering::SeqCst);
        Self { counters }
    }
}

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        self.counters.queued.fetch_sub(1, Ordering::SeqCst);
    }
}

struct Slot<'a> {
    counters: &'a Counters,
    _permit: SemaphorePermit<'a>,
}

impl<'a> Slot<'a> {
    fn enter(counters: &'a Counters, permit: SemaphorePermit<'a>) -> Self {
        let now = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        counters.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        Self {
            counters,
            _permit: permit,
        }
    }
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.counters.completed.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    fn queue(max: usize) -> Arc<RequestQueue> {
        Arc::new(RequestQueue::new(max, Arc::new(ThrottleMirror::new())))
    }

    #[tokio::test(start_paused = true)]
    async fn test_ceiling_is_respected() {
        let queue = queue(2);
        let mut handles = Vec::new();
        for i in 0..6u32 {
            let queue = queue.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .run(|| async move {
                        sleep(Duration::from_millis(100)).await;
                        Ok::<_, GovernorError>(i)
                    })
                    .await
            }));
        }

        let mut results = Vec::new();
        for handle in handles {
            results.push(handle.await.unwrap().unwrap());
        }
        results.sort();
        assert_eq!(results, vec![0, 1, 2, 3, 4, 5]);

        let stats = queue.stats();
        assert_eq!(stats.peak_in_flight, 2);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.queued, 0);
        assert_eq!(stats.completed, 6);
    }

    #[tokio::test]
    async fn test_failing_task_releases_slot() {
        let queue = queue(1);

        let first: Result<(), GovernorError> = queue
            .run(|| async { Err(GovernorError::Status { status: 500 }) })
            .await;
        assert_eq!(first, Err(GovernorError::Status { status: 500 }));

        let second = queue.run(|| async { Ok::<_, GovernorError>("next") }).await;
        assert_eq!(second, Ok("next"));
        assert_eq!(queue.stats().in_flight, 0);
    }

    #[tokio::test]
    async fn test_rate_limited_admission_refused() {
        let mirror = Arc::new(ThrottleMirror::new());
        let queue = RequestQueue::new(2, mirror.clone());
        mirror.set_rate_limited(30);

        let ran = std::sync::atomic::AtomicBool::new(false);
        let result: Result<(), GovernorError> = queue
            .run(|| async {
                ran.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(GovernorError::RateLimited { .. })));
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(queue.stats().completed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_rejected_when_limit_appears() {
        let mirror = Arc::new(ThrottleMirror::new());
        let queue = Arc::new(RequestQueue::new(1, mirror.clone()));

        let (started_tx, started_rx) = tokio::sync::oneshot::channel();
        let blocker = {
            let queue = queue.clone();
            let mirror = mirror.clone();
            tokio::spawn(async move {
                queue
                    .run(|| async move {
                        let _ = started_tx.send(());
                        sleep(Duration::from_millis(50)).await;
                        mirror.set_rate_limited(60);
                        Ok::<_, GovernorError>(())
                    })
                    .await
            })
        };
        started_rx.await.unwrap();

        let waiter: Result<(), GovernorError> = queue.run(|| async { Ok(()) }).await;
        assert!(matches!(waiter, Err(GovernorError::RateLimited { .. })));
        assert!(blocker.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_closed_queue() {
        let queue = queue(1);
        queue.close();
        let result: Result<(), GovernorError> = queue.run(|| async { Ok(()) }).await;
        assert_eq!(result, Err(GovernorError::Closed));
    }
}
