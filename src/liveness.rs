//! Liveness prober: cached, bounded health checks of database handles.
//!
//! Results are cached per `(host identity, handle, check kind)` for the configured TTL. A failed
//! or timed-out probe is recorded as `alive = false` and never surfaces as an error.

use crate::config::RouterConfig;
use crate::error::ProbeError;
use crate::handle::DatabaseHandle;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::Instant;

/// What a probe verifies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    /// Reachable and answering a trivial query.
    Alive,
    /// Reachable and not read-only (not a hot standby).
    Writable,
}

/// One performed probe against a database handle.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, handle: &DatabaseHandle, kind: CheckKind) -> Result<(), ProbeError>;
}

#[derive(Clone, Debug)]
pub struct LivenessRecord {
    pub alive: bool,
    pub checked_at: Instant,
    pub checked_at_utc: DateTime<Utc>,
    pub ttl: Duration,
}

impl LivenessRecord {
    pub fn is_stale(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.checked_at) >= self.ttl
    }
}

/// Cached record as reported by `/ready`.
#[derive(Clone, Debug, Serialize)]
pub struct LivenessStatus {
    pub database: String,
    pub kind: CheckKind,
    pub alive: bool,
    pub checked_at: DateTime<Utc>,
    pub stale: bool,
}

#[derive(Clone, Debug)]
pub struct ProbeSettings {
    pub ttl: Duration,
    pub attempts: u32,
    pub timeout: Duration,
    pub host_identity: String,
}

impl ProbeSettings {
    pub fn from_config(config: &RouterConfig) -> Self {
        ProbeSettings {
            ttl: Duration::from_secs(config.liveness_cache_ttl_seconds),
            attempts: config.liveness_probe_retries.max(1),
            timeout: Duration::from_millis(config.probe_timeout_ms),
            host_identity: config.host_identity(),
        }
    }
}

impl Default for ProbeSettings {
    fn default() -> Self {
        ProbeSettings {
            ttl: Duration::from_secs(60),
            attempts: 1,
            timeout: Duration::from_millis(500),
            host_identity: "localhost".into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct CacheKey {
    host: String,
    database: String,
    kind: CheckKind,
}

pub struct LivenessProber {
    probe: Arc<dyn Probe>,
    settings: ProbeSettings,
    cache: Mutex<HashMap<CacheKey, LivenessRecord>>,
    /// One in-flight probe per key; waiters read the record it leaves behind.
    in_flight: Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>,
}

impl LivenessProber {
    pub fn new(probe: Arc<dyn Probe>, settings: ProbeSettings) -> Self {
        LivenessProber {
            probe,
            settings,
            cache: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub async fn is_alive(&self, handle: &DatabaseHandle) -> bool {
        self.check(handle, CheckKind::Alive).await
    }

    pub async fn is_writable(&self, handle: &DatabaseHandle) -> bool {
        self.check(handle, CheckKind::Writable).await
    }

    /// Cached result when fresh, otherwise probe and cache.
    pub async fn check(&self, handle: &DatabaseHandle, kind: CheckKind) -> bool {
        let key = self.key(handle, kind);
        if let Some(alive) = self.fresh(&key) {
            return alive;
        }

        let slot = self.slot(&key);
        let _probing = slot.lock().await;
        if let Some(alive) = self.fresh(&key) {
            return alive;
        }

        let alive = self.probe_with_retries(handle, kind).await;
        let previous = self.lock().insert(
            key,
            LivenessRecord {
                alive,
                checked_at: Instant::now(),
                checked_at_utc: Utc::now(),
                ttl: self.settings.ttl,
            },
        );
        match (previous.map(|r| r.alive), alive) {
            (Some(true) | None, false) => {
                tracing::warn!(database = %handle.name, ?kind, "database marked down");
            }
            (Some(false), true) => {
                tracing::info!(database = %handle.name, ?kind, "database back up");
            }
            _ => {}
        }
        alive
    }

    async fn probe_with_retries(&self, handle: &DatabaseHandle, kind: CheckKind) -> bool {
        let timeout = self.settings.timeout;
        for attempt in 1..=self.settings.attempts {
            let result = match tokio::time::timeout(timeout, self.probe.probe(handle, kind)).await {
                Ok(r) => r,
                Err(_) => Err(ProbeError::Timeout(timeout.as_millis() as u64)),
            };
            match result {
                Ok(()) => return true,
                Err(e) => {
                    tracing::debug!(database = %handle.name, ?kind, attempt, error = %e, "probe failed");
                }
            }
        }
        false
    }

    /// Cached record for `handle`, fresh or not.
    pub fn record(&self, handle: &DatabaseHandle, kind: CheckKind) -> Option<LivenessRecord> {
        self.lock().get(&self.key(handle, kind)).cloned()
    }

    pub fn snapshot(&self) -> Vec<LivenessStatus> {
        let now = Instant::now();
        let mut out: Vec<LivenessStatus> = self
            .lock()
            .iter()
            .filter(|(k, _)| k.host == self.settings.host_identity)
            .map(|(k, r)| LivenessStatus {
                database: k.database.clone(),
                kind: k.kind,
                alive: r.alive,
                checked_at: r.checked_at_utc,
                stale: r.is_stale(now),
            })
            .collect();
        out.sort_by(|a, b| a.database.cmp(&b.database));
        out
    }

    /// Forget cached results for `handle` so the next check probes again.
    pub fn invalidate(&self, handle: &DatabaseHandle) {
        self.lock().retain(|k, _| k.database != handle.name);
    }

    fn fresh(&self, key: &CacheKey) -> Option<bool> {
        let now = Instant::now();
        self.lock()
            .get(key)
            .filter(|r| !r.is_stale(now))
            .map(|r| r.alive)
    }

    fn slot(&self, key: &CacheKey) -> Arc<AsyncMutex<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|e| e.into_inner());
        in_flight.entry(key.clone()).or_default().clone()
    }

    fn key(&self, handle: &DatabaseHandle, kind: CheckKind) -> CacheKey {
        CacheKey {
            host: self.settings.host_identity.clone(),
            database: handle.name.clone(),
            kind,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CacheKey, LivenessRecord>> {
        // records are plain values, a poisoned map is still consistent
        self.cache.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` calls, then succeeds.
    struct FlakyProbe {
        calls: AtomicUsize,
        failures: usize,
        delay: Option<Duration>,
    }

    impl FlakyProbe {
        fn new(failures: usize) -> Self {
            FlakyProbe {
                calls: AtomicUsize::new(0),
                failures,
                delay: None,
            }
        }
    }

    #[async_trait]
    impl Probe for FlakyProbe {
        async fn probe(&self, _handle: &DatabaseHandle, _kind: CheckKind) -> Result<(), ProbeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            if n < self.failures {
                Err(ProbeError::Other("connection refused".into()))
            } else {
                Ok(())
            }
        }
    }

    fn settings(attempts: u32) -> ProbeSettings {
        ProbeSettings {
            ttl: Duration::from_secs(60),
            attempts,
            timeout: Duration::from_millis(200),
            host_identity: "test-host".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_within_ttl() {
        let probe = Arc::new(FlakyProbe::new(0));
        let prober = LivenessProber::new(probe.clone(), settings(1));
        let r1 = DatabaseHandle::replica("r1");

        assert!(prober.is_alive(&r1).await);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(prober.is_alive(&r1).await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(prober.is_alive(&r1).await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_cached_as_down() {
        let probe = Arc::new(FlakyProbe::new(usize::MAX));
        let prober = LivenessProber::new(probe.clone(), settings(1));
        let r1 = DatabaseHandle::replica("r1");

        assert!(!prober.is_alive(&r1).await);
        assert!(!prober.is_alive(&r1).await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        let record = prober.record(&r1, CheckKind::Alive).unwrap();
        assert!(!record.alive);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_success() {
        let probe = Arc::new(FlakyProbe::new(2));
        let prober = LivenessProber::new(probe.clone(), settings(3));
        assert!(prober.is_alive(&DatabaseHandle::replica("r1")).await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_budget_exhausted() {
        let probe = Arc::new(FlakyProbe::new(5));
        let prober = LivenessProber::new(probe.clone(), settings(2));
        assert!(!prober.is_alive(&DatabaseHandle::replica("r1")).await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_down() {
        let probe = Arc::new(FlakyProbe {
            calls: AtomicUsize::new(0),
            failures: 0,
            delay: Some(Duration::from_secs(5)),
        });
        let prober = LivenessProber::new(probe, settings(1));
        assert!(!prober.is_alive(&DatabaseHandle::replica("slow")).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_kinds_cached_separately() {
        let probe = Arc::new(FlakyProbe::new(0));
        let prober = LivenessProber::new(probe.clone(), settings(1));
        let p = DatabaseHandle::primary("default");
        assert!(prober.is_alive(&p).await);
        assert!(prober.is_writable(&p).await);
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        assert_eq!(prober.snapshot().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_checks_share_one_probe() {
        let probe = Arc::new(FlakyProbe {
            calls: AtomicUsize::new(0),
            failures: usize::MAX,
            delay: Some(Duration::from_millis(100)),
        });
        let prober = Arc::new(LivenessProber::new(probe.clone(), settings(1)));
        let r1 = DatabaseHandle::replica("r1");

        let tasks: Vec<_> = (0..20)
            .map(|_| {
                let prober = prober.clone();
                let r1 = r1.clone();
                tokio::spawn(async move { prober.is_alive(&r1).await })
            })
            .collect();
        for task in tasks {
            assert!(!task.await.unwrap());
        }
        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalidate_forces_probe() {
        let probe = Arc::new(FlakyProbe::new(0));
        let prober = LivenessProber::new(probe.clone(), settings(1));
        let r1 = DatabaseHandle::replica("r1");
        prober.is_alive(&r1).await;
        prober.invalidate(&r1);
        assert!(prober.record(&r1, CheckKind::Alive).is_none());
        prober.is_alive(&r1).await;
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
    }
}
