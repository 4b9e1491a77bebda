//! Fixed-window request counting per caller.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;

pub const DEFAULT_WINDOW: Duration = Duration::from_secs(15 * 60);
pub const DEFAULT_MAX_REQUESTS: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    pub window_reset_at: Instant,
}

/// Counts requests per key inside a fixed window.
///
/// The map is the only state shared between concurrent callers; the lock is
/// never held across an await.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    max_requests: u32,
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_MAX_REQUESTS)
    }
}

impl RateLimiter {
    /// `max_requests` is at least 1.
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            window,
            max_requests: max_requests.max(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, RateLimitEntry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Count a request for `key`; `false` once the window's ceiling is reached.
    pub fn is_allowed(&self, key: &str) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();

        match entries.get_mut(key) {
            Some(entry) if now < entry.window_reset_at => {
                if entry.count >= self.max_requests {
                    tracing::warn!(
                        caller_id = %key,
                        count = entry.count,
                        max_requests = self.max_requests,
                        "rate limit exceeded"
                    );
                    return false;
                }
                entry.count += 1;
                true
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    RateLimitEntry {
                        count: 1,
                        window_reset_at: now + self.window,
                    },
                );
                true
            }
        }
    }

    pub fn entry(&self, key: &str) -> Option<RateLimitEntry> {
        self.lock().get(key).copied()
    }

    /// Drop entries whose window has elapsed. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, entry| now < entry.window_reset_at);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sweep every `interval` until the limiter is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let limiter = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = limiter.upgrade() else {
                    break;
                };
                let removed = limiter.sweep();
                if removed > 0 {
                    tracing::debug!(removed, remaining = limiter.len(), "swept rate limit entries");
                }
            }
        })
    }
}
