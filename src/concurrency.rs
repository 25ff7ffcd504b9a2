//! Concurrency & Cache Layer
//!
//! Shared optimistic-concurrency envelope: an opaque [`ETag`], a TTL'd
//! [`Cache`], a [`CancellationToken`], and the [`with_retry`] backoff loop.
//! Backends parameterize this over their own cache-coherence token type
//! (file size+mtime for the JSON backend, a row-version pointer for the SQL
//! backend) the same way the teacher's `ModelLoader<B: StorageBackend>` is
//! generic over the backend it drives.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::{IcebergError, Result};
use crate::io::FileStat;

/// Opaque cache-coherence token. Two reads that observed equal underlying
/// state must produce equal ETags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ETag(String);

impl ETag {
    pub fn from_raw(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Derive an ETag from a file's size and nanosecond mtime.
    pub fn from_file_stat(stat: FileStat) -> Self {
        Self(format!("{}-{}", stat.size, stat.modified_at_nanos))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ETag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A TTL'd single-slot cache for a decoded state document plus its etag.
/// Invalidated on every successful local write; expires by TTL otherwise,
/// since the cache does not observe external writers.
pub struct Cache<T: Clone> {
    ttl: Duration,
    slot: Mutex<Option<(T, ETag, Instant)>>,
}

impl<T: Clone> Cache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: Mutex::new(None),
        }
    }

    /// Default TTL: 30 seconds.
    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(30))
    }

    pub fn get(&self) -> Option<(T, ETag)> {
        let slot = self.slot.lock().unwrap();
        match &*slot {
            Some((value, etag, inserted_at)) if inserted_at.elapsed() < self.ttl => {
                Some((value.clone(), etag.clone()))
            }
            _ => None,
        }
    }

    pub fn put(&self, value: T, etag: ETag) {
        *self.slot.lock().unwrap() = Some((value, etag, Instant::now()));
    }

    pub fn invalidate(&self) {
        *self.slot.lock().unwrap() = None;
    }
}

/// Cooperative cancellation token, propagated end-to-end through blocking
/// calls and retry backoff sleeps.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Retry policy parameters for the concurrency envelope.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Attempt-count-tagged error, attached when retries are exhausted or
/// cancellation fires mid-retry.
#[derive(Debug)]
pub struct RetryOutcome<E> {
    pub last_error: E,
    pub attempts: u32,
}

/// Run `op` up to `policy.max_attempts` times, retrying only when it
/// returns an [`IcebergError::ConcurrentModification`]. Sleeps
/// `base_delay * attempt` between attempts (linear backoff) and aborts the
/// loop if `cancel` fires, surfacing the last error with the attempt count
/// attached.
pub async fn with_retry<F, Fut, T>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    static ATTEMPT_COUNTER: AtomicU32 = AtomicU32::new(0);
    let _ = &ATTEMPT_COUNTER; // silence unused-in-some-feature-combinations lints

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if cancel.is_cancelled() {
            return Err(IcebergError::Cancelled { attempts: attempt });
        }
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if matches!(e, IcebergError::ConcurrentModification { .. }) => {
                if attempt >= policy.max_attempts {
                    return Err(e);
                }
                if cancel.is_cancelled() {
                    return Err(e);
                }
                let delay = policy.base_delay * attempt;
                #[cfg(feature = "native-fs")]
                tokio::time::sleep(delay).await;
                #[cfg(not(feature = "native-fs"))]
                std::thread::sleep(delay);
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[tokio::test]
    async fn cache_expires_after_ttl() {
        let cache: Cache<i32> = Cache::new(Duration::from_millis(10));
        cache.put(42, ETag::from_raw("a"));
        assert!(cache.get().is_some());
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(cache.get().is_none());
    }

    #[tokio::test]
    async fn cache_invalidate_clears_slot() {
        let cache: Cache<i32> = Cache::new(Duration::from_secs(30));
        cache.put(1, ETag::from_raw("a"));
        cache.invalidate();
        assert!(cache.get().is_none());
    }

    #[tokio::test]
    async fn retry_gives_up_after_max_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
        };
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(policy, &cancel, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                Err(IcebergError::ConcurrentModification {
                    operation: "commit-table".into(),
                    identifier: "a.t".into(),
                    attempts: 0,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn retry_does_not_retry_other_errors() {
        let policy = RetryPolicy::default();
        let cancel = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(policy, &cancel, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(IcebergError::NoSuchTable("a.t".into())) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_aborts_retry_loop() {
        let policy = RetryPolicy {
            max_attempts: 10,
            base_delay: Duration::from_millis(1),
        };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: Result<()> = with_retry(policy, &cancel, |_attempt| async {
            Err(IcebergError::ConcurrentModification {
                operation: "commit-table".into(),
                identifier: "a.t".into(),
                attempts: 0,
            })
        })
        .await;
        match result {
            Err(IcebergError::Cancelled { attempts }) => assert_eq!(attempts, 1),
            other => panic!("expected Cancelled, got {other:?}"),
        }
    }
}
