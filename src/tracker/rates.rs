use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;

use super::config::RatesConfig;
use super::store::unix_ms;
use crate::constants::{BASE_CURRENCY, SUPPORTED_CURRENCIES};

mod fetch;

pub use fetch::RateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RateStatus {
    /// Fetched within the TTL, or loaded from a cache file that is still within it.
    Fresh,
    /// Last good data, served because a refresh failed.
    Stale,
    /// Hard-coded placeholder: base currency 1, everything else 0.
    Degraded,
}

impl RateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fresh => "fresh",
            Self::Stale => "stale",
            Self::Degraded => "degraded",
        }
    }
}

/// One immutable rate table. Replaced as a whole, never edited in place.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSnapshot {
    /// "1 unit of this currency = factor units of the base currency".
    pub rates: BTreeMap<String, f64>,
    pub fetched_at_unix_ms: u64,
    pub status: RateStatus,
}

impl RateSnapshot {
    pub fn degraded(now_unix_ms: u64) -> Self {
        let rates = SUPPORTED_CURRENCIES
            .iter()
            .map(|code| {
                let factor = if *code == BASE_CURRENCY { 1.0 } else { 0.0 };
                (code.to_string(), factor)
            })
            .collect();
        Self {
            rates,
            fetched_at_unix_ms: now_unix_ms,
            status: RateStatus::Degraded,
        }
    }

    /// Factor for `code`; unknown codes count as 1.
    pub fn rate(&self, code: &str) -> f64 {
        self.rates.get(code).copied().unwrap_or(1.0)
    }

    fn as_stale(&self) -> Self {
        Self {
            status: RateStatus::Stale,
            ..self.clone()
        }
    }

    pub fn to_json(&self) -> Value {
        serde_json::json!({
            "base": BASE_CURRENCY,
            "rates": self.rates,
            "fetchedAtUnixMs": self.fetched_at_unix_ms,
            "status": self.status.as_str(),
        })
    }
}

type SharedRefresh = Shared<BoxFuture<'static, Arc<RateSnapshot>>>;

/// Time-bounded exchange-rate cache backed by a JSON file.
///
/// Lookups never fail: when the remote source is unusable the last good snapshot is served
/// as [`RateStatus::Stale`], or the degraded table when nothing was ever fetched. Concurrent
/// misses share a single in-flight fetch.
#[derive(Clone)]
pub struct RateCache {
    inner: Arc<RateCacheInner>,
}

struct RateCacheInner {
    cfg: RatesConfig,
    cache_path: PathBuf,
    client: reqwest::Client,
    /// Last good snapshot.
    current: RwLock<Option<Arc<RateSnapshot>>>,
    last_failure_unix_ms: AtomicU64,
    in_flight: Mutex<Option<SharedRefresh>>,
}

impl RateCache {
    pub fn new(cfg: RatesConfig, data_dir: &Path) -> Result<Self, RateError> {
        let cache_path = {
            let p = PathBuf::from(cfg.cache_file.trim());
            if p.is_absolute() {
                p
            } else {
                data_dir.join(p)
            }
        };
        let client = fetch::build_client()?;

        let current = match cache_path
            .exists()
            .then(|| fetch::read_cache_file(&cache_path))
        {
            Some(Ok((rates, modified_unix_ms))) => {
                let age_ms = unix_ms().saturating_sub(modified_unix_ms);
                let status = if age_ms < cfg.ttl_seconds.saturating_mul(1000) {
                    RateStatus::Fresh
                } else {
                    RateStatus::Stale
                };
                Some(Arc::new(RateSnapshot {
                    rates,
                    fetched_at_unix_ms: modified_unix_ms,
                    status,
                }))
            }
            Some(Err(e)) => {
                log::warn!("ignoring rate cache {}: {e}", cache_path.display());
                None
            }
            None => None,
        };

        Ok(Self {
            inner: Arc::new(RateCacheInner {
                cfg,
                cache_path,
                client,
                current: RwLock::new(current),
                last_failure_unix_ms: AtomicU64::new(0),
                in_flight: Mutex::new(None),
            }),
        })
    }

    pub fn cache_path(&self) -> &Path {
        &self.inner.cache_path
    }

    /// The last good snapshot, without touching the network.
    pub fn current(&self) -> Option<Arc<RateSnapshot>> {
        self.inner.current.read().clone()
    }

    /// Cached snapshot while it is younger than the TTL; otherwise refreshes.
    pub async fn get(&self) -> Arc<RateSnapshot> {
        let now = unix_ms();
        if let Some(snap) = self.inner.fresh_snapshot(now) {
            return snap;
        }
        if self.inner.in_failure_backoff(now) {
            return self.inner.fallback(now);
        }
        self.join_refresh(true).await
    }

    /// Fetches now (joining a fetch already in flight) and returns the outcome.
    pub async fn refresh(&self) -> Arc<RateSnapshot> {
        self.join_refresh(false).await
    }

    async fn join_refresh(&self, only_if_expired: bool) -> Arc<RateSnapshot> {
        let fut = {
            let mut slot = self.inner.in_flight.lock();
            match slot.as_ref() {
                Some(f) => f.clone(),
                None => {
                    // A refresh may have completed between the caller's check and this lock.
                    if only_if_expired {
                        if let Some(snap) = self.inner.fresh_snapshot(unix_ms()) {
                            return snap;
                        }
                    }
                    let inner = self.inner.clone();
                    let f = async move {
                        let snap = inner.fetch_and_install().await;
                        inner.in_flight.lock().take();
                        snap
                    }
                    .boxed()
                    .shared();
                    *slot = Some(f.clone());
                    f
                }
            }
        };
        fut.await
    }
}

impl RateCacheInner {
    fn fresh_snapshot(&self, now: u64) -> Option<Arc<RateSnapshot>> {
        let ttl_ms = self.cfg.ttl_seconds.saturating_mul(1000);
        self.current
            .read()
            .as_ref()
            .filter(|s| now.saturating_sub(s.fetched_at_unix_ms) < ttl_ms)
            .cloned()
    }

    fn in_failure_backoff(&self, now: u64) -> bool {
        let last = self.last_failure_unix_ms.load(Ordering::Relaxed);
        let window_ms = self.cfg.retry_after_failure_seconds.saturating_mul(1000);
        last > 0 && now.saturating_sub(last) < window_ms
    }

    fn fallback(&self, now: u64) -> Arc<RateSnapshot> {
        match self.current.read().as_ref() {
            Some(last_good) => Arc::new(last_good.as_stale()),
            None => Arc::new(RateSnapshot::degraded(now)),
        }
    }

    async fn fetch_and_install(&self) -> Arc<RateSnapshot> {
        match fetch::fetch_rates(&self.client, &self.cfg).await {
            Ok(rates) => {
                if let Err(e) = fetch::write_cache_file(&self.cache_path, &rates) {
                    log::warn!("failed to persist exchange rates: {e}");
                }
                let snap = Arc::new(RateSnapshot {
                    rates,
                    fetched_at_unix_ms: unix_ms(),
                    status: RateStatus::Fresh,
                });
                *self.current.write() = Some(snap.clone());
                self.last_failure_unix_ms.store(0, Ordering::Relaxed);
                log::info!("exchange rates refreshed ({} currencies)", snap.rates.len());
                snap
            }
            Err(e) => {
                let now = unix_ms();
                self.last_failure_unix_ms.store(now, Ordering::Relaxed);
                let out = self.fallback(now);
                log::warn!(
                    "exchange rate refresh failed, serving {} rates: {e}",
                    out.status.as_str()
                );
                out
            }
        }
    }
}
