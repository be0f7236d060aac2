//! Response cache keyed by request fingerprint.
//!
//! The fingerprint hashes normalized prompt text, task kind, and model —
//! deliberately not user identity, so identical questions from different
//! users share an entry. TTL expiry is checked lazily on read; an LRU
//! policy bounds the entry count when TTL alone is not enough.

use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use oxigate_core::config::CacheConfig;
use oxigate_core::types::TaskPayload;

// ─────────────────────────────────────────────
// Fingerprint
// ─────────────────────────────────────────────

/// Deterministic fingerprint identifying cacheable-equivalent requests.
///
/// Prompt text is lowercased and whitespace-collapsed first, so cosmetic
/// differences ("What is  Rust?" vs "what is rust?") still share an entry.
/// Task kind and model are hashed in, so the same text under a different
/// kind or model never collides.
pub fn fingerprint(payload: &TaskPayload, model: &str) -> String {
    let normalized = normalize(&payload.canonical_text());

    let mut hasher = Sha256::new();
    hasher.update(normalized.as_bytes());
    hasher.update([0x1f]);
    hasher.update(payload.kind().as_str().as_bytes());
    hasher.update([0x1f]);
    hasher.update(model.as_bytes());

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        use std::fmt::Write;
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

fn normalize(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

// ─────────────────────────────────────────────
// Cache
// ─────────────────────────────────────────────

/// A cached response, ready to serve without a provider call.
#[derive(Clone, Debug, PartialEq)]
pub struct CachedResponse {
    pub content: String,
    /// Provider that originally produced the content.
    pub provider: String,
    pub model: String,
    pub tokens_in: u32,
    pub tokens_out: u32,
}

struct Entry {
    response: CachedResponse,
    expires_at: Instant,
    last_access: u64,
}

struct CacheInner {
    map: HashMap<String, Entry>,
    /// Monotonic access stamp for LRU ordering.
    clock: u64,
}

/// Bounded TTL + LRU response cache. Writes racing on the same
/// fingerprint are last-write-wins; entries for one fingerprint are
/// expected to be equivalent.
pub struct ResponseCache {
    inner: Mutex<CacheInner>,
    ttl: Duration,
    max_entries: usize,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        ResponseCache {
            inner: Mutex::new(CacheInner {
                map: HashMap::new(),
                clock: 0,
            }),
            ttl: Duration::from_secs(config.ttl_secs),
            max_entries: config.max_entries.max(1),
        }
    }

    /// Look up a fingerprint; expired entries are dropped on the spot.
    pub fn get(&self, fingerprint: &str) -> Option<CachedResponse> {
        let mut inner = self.lock();
        let now = Instant::now();

        let expired = match inner.map.get(fingerprint) {
            Some(entry) => entry.expires_at <= now,
            None => return None,
        };
        if expired {
            inner.map.remove(fingerprint);
            return None;
        }

        inner.clock += 1;
        let clock = inner.clock;
        let entry = inner.map.get_mut(fingerprint)?;
        entry.last_access = clock;
        Some(entry.response.clone())
    }

    /// Insert a response, evicting the least-recently-used entry when at
    /// capacity.
    pub fn put(&self, fingerprint: String, response: CachedResponse) {
        let mut inner = self.lock();
        let expires_at = Instant::now() + self.ttl;

        if inner.map.len() >= self.max_entries && !inner.map.contains_key(&fingerprint) {
            let victim = inner
                .map
                .iter()
                .min_by_key(|(_, entry)| entry.last_access)
                .map(|(key, _)| key.clone());
            if let Some(key) = victim {
                debug!(fingerprint = %key, "Evicting least-recently-used cache entry");
                inner.map.remove(&key);
            }
        }

        inner.clock += 1;
        let last_access = inner.clock;
        inner.map.insert(
            fingerprint,
            Entry {
                response,
                expires_at,
                last_access,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────
