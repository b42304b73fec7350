//! Per-key single-flight coordination.
//!
//! Concurrent misses for the same derived key share one in-flight
//! computation: the first caller runs it, later callers await the same cell
//! and receive a clone of the result. A failed computation is not cached and
//! releases the key so the next caller retries.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

#[derive(Default)]
pub struct FlightGroup<T> {
    cells: DashMap<String, Arc<OnceCell<T>>>,
}

impl<T: Clone> FlightGroup<T> {
    pub fn new() -> Self {
        Self {
            cells: DashMap::new(),
        }
    }

    /// Run `compute` for `key`, joining an in-flight computation for the same
    /// key if one exists.
    pub async fn run<F, Fut, E>(&self, key: &str, compute: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let cell = self
            .cells
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();

        let result = cell.get_or_try_init(compute).await.cloned();

        // Retire only our own cell; a concurrent caller may already have
        // replaced it after a failure.
        self.cells
            .remove_if(key, |_, current| Arc::ptr_eq(current, &cell));

        result
    }

    /// Number of keys with an in-flight computation.
    pub fn in_flight(&self) -> usize {
        self.cells.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Barrier;

    #[tokio::test]
    async fn concurrent_runs_share_one_computation() {
        let group = Arc::new(FlightGroup::<u32>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let group = group.clone();
            let calls = calls.clone();
            let barrier = barrier.clone();
            handles.push(tokio::spawn(async move {
                barrier.wait().await;
                group
                    .run("key", || async {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok::<_, ()>(42)
                    })
                    .await
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.expect("task ran"), Ok(42));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(group.in_flight(), 0);
    }

    #[tokio::test]
    async fn distinct_keys_do_not_share() {
        let group = FlightGroup::<&'static str>::new();

        let a = group.run("a", || async { Ok::<_, ()>("a") }).await;
        let b = group.run("b", || async { Ok::<_, ()>("b") }).await;

        assert_eq!(a, Ok("a"));
        assert_eq!(b, Ok("b"));
    }

    #[tokio::test]
    async fn failure_releases_key_for_retry() {
        let group = FlightGroup::<u32>::new();
        let calls = AtomicUsize::new(0);

        let first: Result<u32, &str> = group
            .run("key", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err("warehouse down")
            })
            .await;
        assert_eq!(first, Err("warehouse down"));
        assert_eq!(group.in_flight(), 0);

        let second = group
            .run("key", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(7)
            })
            .await;
        assert_eq!(second, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn completed_runs_do_not_pin_results() {
        let group = FlightGroup::<u32>::new();
        let first = group.run("key", || async { Ok::<_, ()>(1) }).await;
        // The flight retires with the run; a later run recomputes.
        let second = group.run("key", || async { Ok::<_, ()>(2) }).await;
        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(2));
    }
}
