use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;

struct CacheEntry<T> {
    value: Arc<T>,
    fetched_at: Instant,
}

/// Single-slot read-through cache with a fixed time-to-live.
///
/// The lock is held across the fetch, so concurrent callers that find the
/// slot stale wait for one fetch instead of each issuing their own.
pub struct ResponseCache<T> {
    ttl: Duration,
    slot: Mutex<Option<CacheEntry<T>>>,
}

impl<T> ResponseCache<T> {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if it is younger than the TTL, otherwise runs
    /// `fetch` and stores its result. Errors are returned and not stored.
    ///
    /// # Errors
    ///
    /// Returns whatever `fetch` returns on failure.
    pub async fn get_or_fetch<F, Fut, E>(&self, fetch: F) -> Result<Arc<T>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(entry) = slot.as_ref() {
            if entry.fetched_at.elapsed() < self.ttl {
                return Ok(Arc::clone(&entry.value));
            }
        }

        let value = Arc::new(fetch().await?);
        *slot = Some(CacheEntry {
            value: Arc::clone(&value),
            fetched_at: Instant::now(),
        });
        Ok(value)
    }

    /// Drops the cached value so the next call fetches.
    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    async fn counting_fetch(calls: &AtomicUsize) -> Result<usize, String> {
        Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reuses_value_within_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        let calls = AtomicUsize::new(0);

        let first = cache.get_or_fetch(|| counting_fetch(&calls)).await.unwrap();
        tokio::time::advance(Duration::from_secs(29)).await;
        let second = cache.get_or_fetch(|| counting_fetch(&calls)).await.unwrap();

        assert_eq!(*first, 1);
        assert_eq!(*second, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refetches_after_ttl() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch(|| counting_fetch(&calls)).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        let value = cache.get_or_fetch(|| counting_fetch(&calls)).await.unwrap();

        assert_eq!(*value, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_errors_are_not_cached() {
        let cache: ResponseCache<usize> = ResponseCache::new(Duration::from_secs(30));
        let calls = AtomicUsize::new(0);

        let counter = &calls;
        let failed = cache
            .get_or_fetch(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err::<usize, _>("boom".to_string())
            })
            .await;
        assert!(failed.is_err());

        let value = cache.get_or_fetch(|| counting_fetch(&calls)).await.unwrap();
        assert_eq!(*value, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        let calls = AtomicUsize::new(0);

        let counter = &calls;
        let slow_fetch = move || async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            counting_fetch(counter).await
        };

        let (a, b) = tokio::join!(cache.get_or_fetch(slow_fetch), cache.get_or_fetch(slow_fetch));

        assert_eq!(*a.unwrap(), 1);
        assert_eq!(*b.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_fetch() {
        let cache = ResponseCache::new(Duration::from_secs(30));
        let calls = AtomicUsize::new(0);

        cache.get_or_fetch(|| counting_fetch(&calls)).await.unwrap();
        cache.invalidate().await;
        cache.get_or_fetch(|| counting_fetch(&calls)).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
