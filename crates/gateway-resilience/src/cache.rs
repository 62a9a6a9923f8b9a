//! Content-addressed response cache.
//!
//! Entries are keyed by a [`Fingerprint`] of the normalized payload, the
//! answering provider and model, and sampling parameters. The tenant is not
//! part of the key. Expiry is checked on every read; an optional background sweep
//! reclaims memory, and a max-entry cap evicts the oldest entries first.

use dashmap::DashMap;
use gateway_core::{CompletionResponse, GatewayRequest, TaskBucket, TenantConfig, Usage};
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Deterministic cache key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Hash a request against an explicit model selector.
    #[must_use]
    pub fn compute(request: &GatewayRequest, model_selector: &str) -> Self {
        let mut hasher = Sha256::new();
        let mut field = |label: &str, value: &str| {
            hasher.update(label.as_bytes());
            hasher.update((value.len() as u64).to_le_bytes());
            hasher.update(value.as_bytes());
        };

        field("model", model_selector);
        for message in &request.messages {
            field("role", &message.role.to_string());
            field("content", &normalize_content(&message.content));
        }
        field(
            "temperature",
            &request
                .temperature
                .map_or_else(|| "default".to_string(), |t| format!("{t:.3}")),
        );
        field(
            "max_tokens",
            &request
                .max_tokens
                .map_or_else(|| "default".to_string(), |m| m.to_string()),
        );

        Self(hex::encode(hasher.finalize()))
    }

    /// Hash a request for the provider and model that answers it.
    ///
    /// Two requests share an entry only when the same model would serve them,
    /// whichever tenant sent them.
    #[must_use]
    pub fn for_model(request: &GatewayRequest, provider: &str, model: &str) -> Self {
        Self::compute(request, &format!("{provider}/{model}"))
    }

    /// Hex digest
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn normalize_content(content: &str) -> String {
    content.replace("\r\n", "\n").trim().to_string()
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether caching is enabled
    pub enabled: bool,
    /// TTL when neither tenant nor task bucket overrides it
    pub default_ttl: Duration,
    /// Entry cap
    pub max_entries: usize,
    /// Highest temperature cached without an explicit opt-in
    pub max_cacheable_temperature: f32,
    /// Per task bucket TTL overrides
    pub task_ttls: HashMap<TaskBucket, Duration>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl: Duration::from_secs(300),
            max_entries: 10_000,
            max_cacheable_temperature: 0.3,
            task_ttls: HashMap::new(),
        }
    }
}

/// Cached upstream response. Immutable once stored.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Key
    pub fingerprint: Fingerprint,
    /// Response served on hit
    pub response: CompletionResponse,
    /// Usage of the original call
    pub usage: Usage,
    /// When the entry was stored
    pub created_at: Instant,
    /// Lifetime
    pub ttl: Duration,
    seq: u64,
}

impl CacheEntry {
    /// Whether the entry may still be served at `now`
    #[must_use]
    pub fn is_fresh(&self, now: Instant) -> bool {
        now.checked_duration_since(self.created_at)
            .map_or(true, |age| age < self.ttl)
    }

    /// Time left before expiry
    #[must_use]
    pub fn remaining_ttl(&self, now: Instant) -> Duration {
        self.ttl
            .saturating_sub(now.saturating_duration_since(self.created_at))
    }
}

/// Cache statistics
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Live and not yet reclaimed entries
    pub entries: usize,
    /// Lookups served
    pub hits: u64,
    /// Lookups missed, including expired entries
    pub misses: u64,
    /// Entries dropped by the size cap
    pub evictions: u64,
    /// Entries dropped for expiry
    pub expirations: u64,
}

impl CacheStats {
    /// Hits over lookups
    #[must_use]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Concurrent response cache
#[derive(Debug)]
pub struct ResponseCache {
    config: CacheConfig,
    entries: DashMap<Fingerprint, Arc<CacheEntry>>,
    insertion_order: Mutex<VecDeque<(u64, Fingerprint)>>,
    seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl ResponseCache {
    /// Create an empty cache
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            entries: DashMap::new(),
            insertion_order: Mutex::new(VecDeque::new()),
            seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Cache configuration
    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether responses to this request may be stored or served.
    ///
    /// Streaming requests never are. An explicit caller flag wins; otherwise
    /// the request is cacheable when its temperature is unset or at most
    /// `max_cacheable_temperature`.
    #[must_use]
    pub fn is_cacheable(&self, request: &GatewayRequest) -> bool {
        if !self.config.enabled || request.stream {
            return false;
        }
        match request.cacheable {
            Some(flag) => flag,
            None => request
                .temperature
                .map_or(true, |t| t <= self.config.max_cacheable_temperature),
        }
    }

    /// TTL for a tenant and task bucket
    #[must_use]
    pub fn ttl_for(&self, tenant: &TenantConfig, bucket: TaskBucket) -> Duration {
        tenant
            .cache_ttl
            .or_else(|| self.config.task_ttls.get(&bucket).copied())
            .unwrap_or(self.config.default_ttl)
    }

    /// Look up a fresh entry
    #[must_use]
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<Arc<CacheEntry>> {
        let now = Instant::now();
        let found = self.entries.get(fingerprint).map(|e| Arc::clone(e.value()));

        match found {
            Some(entry) if entry.is_fresh(now) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %fingerprint, "Cache hit");
                Some(entry)
            }
            Some(stale) => {
                if self
                    .entries
                    .remove_if(fingerprint, |_, e| e.seq == stale.seq)
                    .is_some()
                {
                    self.expirations.fetch_add(1, Ordering::Relaxed);
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %fingerprint, "Cache entry expired");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                trace!(fingerprint = %fingerprint, "Cache miss");
                None
            }
        }
    }

    /// Store a response.
    ///
    /// Concurrent puts for the same fingerprint are last-write-wins.
    pub fn put(
        &self,
        fingerprint: Fingerprint,
        response: CompletionResponse,
        usage: Usage,
        ttl: Duration,
    ) {
        if !self.config.enabled || ttl.is_zero() {
            return;
        }

        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(CacheEntry {
            fingerprint: fingerprint.clone(),
            response,
            usage,
            created_at: Instant::now(),
            ttl,
            seq,
        });

        let mut order = self.insertion_order.lock();
        self.entries.insert(fingerprint.clone(), entry);
        order.push_back((seq, fingerprint));

        while self.entries.len() > self.config.max_entries {
            let Some((oldest_seq, oldest)) = order.pop_front() else {
                break;
            };
            if self
                .entries
                .remove_if(&oldest, |_, e| e.seq == oldest_seq)
                .is_some()
            {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                debug!(fingerprint = %oldest, "Evicted oldest cache entry");
            }
        }

        if order.len() > self.config.max_entries.saturating_mul(2) {
            order.retain(|(seq, fp)| self.entries.get(fp).is_some_and(|e| e.seq == *seq));
        }
    }

    /// Remove every expired entry, returning how many were removed
    pub fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_fresh(now));
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
            debug!(removed = removed, "Swept expired cache entries");
        }
        removed
    }

    /// Sweep expired entries periodically until the cache is dropped
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let cache: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match cache.upgrade() {
                    Some(cache) => {
                        cache.sweep_expired();
                    }
                    None => break,
                }
            }
        })
    }

    /// Number of stored entries, including expired ones not yet reclaimed
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut order = self.insertion_order.lock();
        self.entries.clear();
        order.clear();
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}
