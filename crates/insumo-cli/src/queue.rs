//! Outbound request queue.
//!
//! Bounds concurrent dispatches with a semaphore and enforces a minimum gap
//! between consecutive dispatches. Waiters beyond the cap queue in FIFO
//! order, which is the semaphore's fairness guarantee.

use std::time::Duration;

use tokio::sync::{Mutex, Semaphore, SemaphorePermit};
use tokio::time::Instant;

use crate::error::CliError;

const MAX_CONCURRENT: usize = 5;
const MIN_DISPATCH_GAP: Duration = Duration::from_millis(100);

pub struct RequestQueue {
    permits: Semaphore,
    last_dispatch: Mutex<Option<Instant>>,
    min_gap: Duration,
}

/// Held for the lifetime of one outbound request; dropping it releases the
/// concurrency slot.
pub struct DispatchPermit<'a> {
    _permit: SemaphorePermit<'a>,
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new(MAX_CONCURRENT, MIN_DISPATCH_GAP)
    }
}

impl RequestQueue {
    pub fn new(max_concurrent: usize, min_gap: Duration) -> Self {
        Self {
            permits: Semaphore::new(max_concurrent),
            last_dispatch: Mutex::new(None),
            min_gap,
        }
    }

    /// Wait for a concurrency slot, then for the inter-dispatch gap.
    pub async fn acquire(&self) -> Result<DispatchPermit<'_>, CliError> {
        let permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| CliError::QueueClosed)?;

        let mut last = self.last_dispatch.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_gap {
                tokio::time::sleep(self.min_gap - elapsed).await;
            }
        }
        *last = Some(Instant::now());
        drop(last);

        Ok(DispatchPermit { _permit: permit })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrency_never_exceeds_the_cap() {
        let queue = Arc::new(RequestQueue::new(3, Duration::ZERO));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let queue = queue.clone();
            let in_flight = in_flight.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let permit = queue.acquire().await.expect("queue open");
                let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(current, Ordering::SeqCst);
                tokio::task::yield_now().await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            }));
        }
        for handle in handles {
            handle.await.expect("task ran");
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(queue.available(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_are_spaced_by_the_minimum_gap() {
        let queue = RequestQueue::new(5, Duration::from_millis(100));

        let start = Instant::now();
        drop(queue.acquire().await.expect("queue open"));
        drop(queue.acquire().await.expect("queue open"));
        drop(queue.acquire().await.expect("queue open"));

        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
