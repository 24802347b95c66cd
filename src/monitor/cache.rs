use std::time::{Duration, Instant};

use crate::pulsar::BatteryStatus;

/// How long a successful reading may stand in for a failed one.
pub const STATUS_CACHE_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone)]
pub struct CachedStatus {
    pub status: BatteryStatus,
    pub captured_at: Instant,
}

/// Last successful reading, used only when a live read comes back empty.
#[derive(Debug, Clone)]
pub struct StatusCache {
    entry: Option<CachedStatus>,
    ttl: Duration,
}

/// Where a resolved status came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub status: BatteryStatus,
    pub from_cache: bool,
}

impl Default for StatusCache {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusCache {
    pub fn new() -> Self {
        Self::with_ttl(STATUS_CACHE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self { entry: None, ttl }
    }

    /// Replaces the entry, whatever its age.
    pub fn store(&mut self, status: BatteryStatus, now: Instant) {
        self.entry = Some(CachedStatus {
            status,
            captured_at: now,
        });
    }

    /// The cached status if it is no older than the TTL at `now`.
    pub fn fallback(&self, now: Instant) -> Option<&BatteryStatus> {
        let entry = self.entry.as_ref()?;
        let age = now.saturating_duration_since(entry.captured_at);
        (age <= self.ttl).then_some(&entry.status)
    }

    /// Live result first; cache only when the live read failed.
    pub fn resolve(&mut self, live: Option<BatteryStatus>, now: Instant) -> Option<Resolved> {
        if let Some(status) = live {
            self.store(status.clone(), now);
            return Some(Resolved {
                status,
                from_cache: false,
            });
        }

        self.fallback(now).map(|status| Resolved {
            status: status.clone(),
            from_cache: true,
        })
    }

    pub fn entry(&self) -> Option<&CachedStatus> {
        self.entry.as_ref()
    }
}
