use dashmap::DashMap;
use std::net::IpAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::security::config::RateLimitSettings;

struct Bucket {
    count: u32,
    window_start: Instant,
}

/// Fixed-window counter per key. Buckets whose window has passed are swept
/// once per window, so the map only holds recently active keys.
pub struct RateLimiter {
    buckets: DashMap<String, Bucket>,
    limit: u32,
    window: Duration,
    trusted_proxies: Vec<IpAddr>,
    last_sweep: Mutex<Instant>,
}

impl RateLimiter {
    pub fn new(settings: &RateLimitSettings) -> Self {
        Self {
            buckets: DashMap::new(),
            limit: settings.max_requests,
            window: Duration::from_secs(settings.window_secs),
            trusted_proxies: settings.trusted_proxies.clone(),
            last_sweep: Mutex::new(Instant::now()),
        }
    }

    pub fn trusts(&self, peer: &IpAddr) -> bool {
        self.trusted_proxies.contains(peer)
    }

    /// Counts one hit for `key`; false once the window's budget is spent.
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> bool {
        // No entry guard may be held while sweeping.
        self.sweep(now);

        let mut entry = self.buckets.entry(key.to_string()).or_insert(Bucket {
            count: 0,
            window_start: now,
        });
        if now.duration_since(entry.window_start) > self.window {
            entry.count = 0;
            entry.window_start = now;
        }
        if entry.count >= self.limit {
            return false;
        }
        entry.count += 1;
        true
    }

    fn sweep(&self, now: Instant) {
        let Ok(mut last) = self.last_sweep.try_lock() else {
            return;
        };
        if now.saturating_duration_since(*last) <= self.window {
            return;
        }
        *last = now;
        drop(last);
        self.buckets
            .retain(|_, b| now.saturating_duration_since(b.window_start) <= self.window);
    }

    #[cfg(test)]
    fn tracked_keys(&self) -> usize {
        self.buckets.len()
    }
}
