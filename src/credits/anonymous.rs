/// In-process credit pool for unauthenticated callers.
///
/// Balances are keyed by client identifier and live only for the process's
/// lifetime. All callers behind one shared network address share a single
/// balance; that approximation is accepted policy. Entries carry a
/// last-seen instant so the pool can stay bounded: idle entries are pruned
/// by a background job and the oldest entry is evicted when the pool is at
/// capacity.
use crate::credits::ANONYMOUS_ALLOWANCE;
use crate::error::{ApiError, ApiResult};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Anonymous pool bounds
#[derive(Debug, Clone)]
pub struct AnonymousPoolConfig {
    pub max_entries: usize,
    pub idle_expiry: Duration,
}

impl Default for AnonymousPoolConfig {
    fn default() -> Self {
        Self {
            max_entries: 100_000,
            idle_expiry: Duration::from_secs(86_400),
        }
    }
}

#[derive(Debug)]
struct PoolEntry {
    remaining: i64,
    last_seen: Instant,
}

/// Volatile credit balances for unauthenticated callers
pub struct AnonymousCreditPool {
    entries: Mutex<HashMap<String, PoolEntry>>,
    config: AnonymousPoolConfig,
}

impl AnonymousCreditPool {
    pub fn new(config: AnonymousPoolConfig) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            config,
        }
    }

    /// Current balance for a client key, creating the entry at the full
    /// allowance on first sight.
    pub async fn peek(&self, key: &str) -> i64 {
        let mut entries = self.entries.lock().await;
        self.touch(&mut entries, key).remaining
    }

    /// Reserve `cost` credits for a client key.
    ///
    /// Fails without mutation when the balance is below the cost. The map
    /// lock is held across the check and the decrement, so two concurrent
    /// reservations against the same key can never both succeed on one
    /// remaining credit.
    pub async fn reserve(&self, key: &str, cost: i64) -> ApiResult<i64> {
        let mut entries = self.entries.lock().await;
        let entry = self.touch(&mut entries, key);

        if entry.remaining < cost {
            return Err(ApiError::InsufficientCredits {
                available: entry.remaining,
            });
        }

        entry.remaining -= cost;
        Ok(entry.remaining)
    }

    /// Drop entries idle longer than the configured expiry. Returns the
    /// number of entries removed.
    pub async fn prune_idle(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let before = entries.len();
        let expiry = self.config.idle_expiry;
        entries.retain(|_, entry| entry.last_seen.elapsed() < expiry);
        before - entries.len()
    }

    /// Number of tracked client keys
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    fn touch<'a>(
        &self,
        entries: &'a mut HashMap<String, PoolEntry>,
        key: &str,
    ) -> &'a mut PoolEntry {
        if !entries.contains_key(key) && entries.len() >= self.config.max_entries {
            self.evict_oldest(entries);
        }

        let entry = entries.entry(key.to_string()).or_insert_with(|| PoolEntry {
            remaining: ANONYMOUS_ALLOWANCE,
            last_seen: Instant::now(),
        });
        entry.last_seen = Instant::now();
        entry
    }

    fn evict_oldest(&self, entries: &mut HashMap<String, PoolEntry>) {
        if let Some(oldest) = entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_seen)
            .map(|(key, _)| key.clone())
        {
            entries.remove(&oldest);
        }
    }
}
