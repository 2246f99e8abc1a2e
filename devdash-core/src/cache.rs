//! Response cache: timestamped snapshots of external data with a TTL per domain.
//!
//! Lookup order:
//! - fresh entry for the exact key: served, no fetch, no write
//! - otherwise: fetch; success overwrites the entry, failure leaves any stale
//!   entry in place and is handed back to the caller
//!
//! Entries that no longer parse are deleted and count as misses.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

use crate::error::FetchError;
use crate::store::{KeyValueStore, StoreResult};
use crate::time::Clock;

const KEY_PREFIX: &str = "cache:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheDomain {
    Github,
    Leetcode,
    Contests,
    /// The aggregated dashboard snapshot.
    Dashboard,
}

impl CacheDomain {
    pub const ALL: [CacheDomain; 4] = [
        CacheDomain::Github,
        CacheDomain::Leetcode,
        CacheDomain::Contests,
        CacheDomain::Dashboard,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CacheDomain::Github => "github",
            CacheDomain::Leetcode => "leetcode",
            CacheDomain::Contests => "contests",
            CacheDomain::Dashboard => "dashboard",
        }
    }

    /// Domains whose entries are keyed by the queried username.
    pub fn is_per_user(self) -> bool {
        !matches!(self, CacheDomain::Contests)
    }
}

impl fmt::Display for CacheDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheDomain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CacheDomain::ALL
            .into_iter()
            .find(|d| d.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown cache domain: {s}"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub domain: CacheDomain,
    pub username: Option<String>,
}

impl CacheKey {
    pub fn global(domain: CacheDomain) -> Self {
        Self { domain, username: None }
    }

    pub fn for_user(domain: CacheDomain, username: impl AsRef<str>) -> Self {
        Self {
            domain,
            username: Some(username.as_ref().trim().to_string()),
        }
    }

    /// `domain` or `domain:username`; this is what an entry records as its key.
    pub fn composite(&self) -> String {
        match &self.username {
            Some(u) => format!("{}:{}", self.domain, u),
            None => self.domain.to_string(),
        }
    }

    /// Key under which the entry lives in the store.
    pub fn storage_key(&self) -> String {
        format!("{KEY_PREFIX}{}", self.composite())
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.composite())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

impl CacheEntry {
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.timestamp
    }

    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.age(now) < ttl
    }
}

/// TTL per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    pub github: Duration,
    pub leetcode: Duration,
    pub contests: Duration,
    pub dashboard: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            github: Duration::hours(1),
            leetcode: Duration::hours(1),
            contests: Duration::hours(6),
            dashboard: Duration::hours(1),
        }
    }
}

impl CachePolicy {
    pub fn ttl(&self, domain: CacheDomain) -> Duration {
        match domain {
            CacheDomain::Github => self.github,
            CacheDomain::Leetcode => self.leetcode,
            CacheDomain::Contests => self.contests,
            CacheDomain::Dashboard => self.dashboard,
        }
    }

    pub fn with_ttl(mut self, domain: CacheDomain, ttl: Duration) -> Self {
        match domain {
            CacheDomain::Github => self.github = ttl,
            CacheDomain::Leetcode => self.leetcode = ttl,
            CacheDomain::Contests => self.contests = ttl,
            CacheDomain::Dashboard => self.dashboard = ttl,
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// Served from the cache without fetching.
    Cached,
    /// Fetched just now.
    Fetched,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cached {
    pub data: Value,
    pub fetched_at: DateTime<Utc>,
    pub freshness: Freshness,
}

impl Cached {
    fn from_entry(entry: CacheEntry, freshness: Freshness) -> Self {
        Self {
            data: entry.data,
            fetched_at: entry.timestamp,
            freshness,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Fresh(CacheEntry),
    Stale(CacheEntry),
    Missing,
}

pub struct ResponseCache<S: KeyValueStore, C: Clock> {
    store: S,
    clock: C,
    policy: CachePolicy,
}

impl<S: KeyValueStore, C: Clock> ResponseCache<S, C> {
    pub fn new(store: S, clock: C, policy: CachePolicy) -> Self {
        Self { store, clock, policy }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// The cache's notion of "now".
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn store_ref(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Classify the entry for `key` without fetching.
    pub fn lookup(&mut self, key: &CacheKey) -> Lookup {
        let Some(entry) = self.read_entry(key) else {
            return Lookup::Missing;
        };
        let now = self.clock.now();
        if entry.is_fresh(now, self.policy.ttl(key.domain)) {
            Lookup::Fresh(entry)
        } else {
            Lookup::Stale(entry)
        }
    }

    /// Last known data for `key`, fresh or not. For fallback rendering after a failed fetch.
    pub fn stale(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        self.read_entry(key)
    }

    /// Overwrite the entry for `key` with `data` stamped now.
    pub fn store(&mut self, key: &CacheKey, data: Value) -> StoreResult<CacheEntry> {
        let entry = CacheEntry {
            key: key.composite(),
            data,
            timestamp: self.clock.now(),
        };
        let json = serde_json::to_string(&entry)?;
        self.store.set(&key.storage_key(), &json)?;
        tracing::debug!(key = %key, "cache entry written");
        Ok(entry)
    }

    pub fn get_or_fetch<F>(&mut self, key: &CacheKey, fetch: F) -> Result<Cached, FetchError>
    where
        F: FnOnce() -> Result<Value, FetchError>,
    {
        if let Lookup::Fresh(entry) = self.lookup(key) {
            tracing::debug!(key = %key, "cache hit");
            return Ok(Cached::from_entry(entry, Freshness::Cached));
        }
        tracing::debug!(key = %key, "cache miss; fetching");
        let result = fetch();
        self.commit(key, result)
    }

    /// Same as [`get_or_fetch`](Self::get_or_fetch); `fetch` is only polled on a miss.
    pub async fn get_or_fetch_async<F>(&mut self, key: &CacheKey, fetch: F) -> Result<Cached, FetchError>
    where
        F: Future<Output = Result<Value, FetchError>>,
    {
        if let Lookup::Fresh(entry) = self.lookup(key) {
            tracing::debug!(key = %key, "cache hit");
            return Ok(Cached::from_entry(entry, Freshness::Cached));
        }
        tracing::debug!(key = %key, "cache miss; fetching");
        let result = fetch.await;
        self.commit(key, result)
    }

    /// Record a fetch result: success overwrites, failure leaves the old entry alone.
    pub fn commit(&mut self, key: &CacheKey, result: Result<Value, FetchError>) -> Result<Cached, FetchError> {
        match result {
            Ok(data) => {
                let fetched_at = self.clock.now();
                match self.store(key, data.clone()) {
                    Ok(entry) => Ok(Cached::from_entry(entry, Freshness::Fetched)),
                    Err(e) => {
                        tracing::warn!(key = %key, error = %e, "cache write failed; serving uncached data");
                        Ok(Cached {
                            data,
                            fetched_at,
                            freshness: Freshness::Fetched,
                        })
                    }
                }
            }
            Err(e) => {
                tracing::warn!(key = %key, status = e.status_code(), error = %e, "fetch failed");
                Err(e)
            }
        }
    }

    /// All readable cache entries, sorted by key.
    pub fn entries(&mut self) -> StoreResult<Vec<CacheEntry>> {
        let mut out = Vec::new();
        for storage_key in self.store.keys()? {
            if !storage_key.starts_with(KEY_PREFIX) {
                continue;
            }
            if let Some(entry) = self.read_raw(&storage_key) {
                out.push(entry);
            }
        }
        out.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(out)
    }

    pub fn remove(&mut self, key: &CacheKey) -> StoreResult<bool> {
        self.store.remove(&key.storage_key())
    }

    /// Drop every entry, or every entry of one domain. Returns how many were removed.
    pub fn clear(&mut self, domain: Option<CacheDomain>) -> StoreResult<usize> {
        let prefix = match domain {
            Some(d) => format!("{KEY_PREFIX}{d}"),
            None => KEY_PREFIX.to_string(),
        };
        let mut removed = 0;
        for storage_key in self.store.keys()? {
            let matches = match domain {
                Some(_) => storage_key == prefix || storage_key.starts_with(&format!("{prefix}:")),
                None => storage_key.starts_with(&prefix),
            };
            if matches && self.store.remove(&storage_key)? {
                removed += 1;
            }
        }
        tracing::info!(removed, domain = domain.map(|d| d.as_str()).unwrap_or("all"), "cache cleared");
        Ok(removed)
    }

    fn read_entry(&mut self, key: &CacheKey) -> Option<CacheEntry> {
        let entry = self.read_raw(&key.storage_key())?;
        if entry.key != key.composite() {
            tracing::debug!(key = %key, stored = %entry.key, "cache entry belongs to another key");
            return None;
        }
        Some(entry)
    }

    fn read_raw(&mut self, storage_key: &str) -> Option<CacheEntry> {
        let raw = match self.store.get(storage_key) {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(key = storage_key, error = %e, "cache read failed");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(entry) => Some(entry),
            Err(e) => {
                tracing::warn!(key = storage_key, error = %e, "discarding malformed cache entry");
                if let Err(e) = self.store.remove(storage_key) {
                    tracing::warn!(key = storage_key, error = %e, "could not remove malformed cache entry");
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::time::FixedClock;
    use chrono::TimeZone;
    use serde_json::json;
    use std::cell::Cell;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
    }

    fn seeded(key: &CacheKey, data: Value, at: DateTime<Utc>) -> MemoryStore {
        let mut store = MemoryStore::new();
        let entry = CacheEntry { key: key.composite(), data, timestamp: at };
        store.set(&key.storage_key(), &serde_json::to_string(&entry).unwrap()).unwrap();
        store
    }

    #[test]
    fn test_keys() {
        let k = CacheKey::for_user(CacheDomain::Github, " alice ");
        assert_eq!(k.composite(), "github:alice");
        assert_eq!(k.storage_key(), "cache:github:alice");
        assert_eq!(CacheKey::global(CacheDomain::Contests).storage_key(), "cache:contests");
        assert!(!CacheDomain::Contests.is_per_user());
        assert_eq!("LeetCode".parse::<CacheDomain>().unwrap(), CacheDomain::Leetcode);
    }

    #[test]
    fn test_default_policy() {
        let p = CachePolicy::default();
        assert_eq!(p.ttl(CacheDomain::Contests), Duration::hours(6));
        assert_eq!(p.ttl(CacheDomain::Dashboard), Duration::hours(1));
        let p = p.with_ttl(CacheDomain::Github, Duration::seconds(1));
        assert_eq!(p.github, Duration::seconds(1));
    }

    #[test]
    fn test_miss_fetches_and_writes() {
        let key = CacheKey::global(CacheDomain::Contests);
        let mut cache = ResponseCache::new(MemoryStore::new(), FixedClock(t0()), CachePolicy::default());

        let got = cache.get_or_fetch(&key, || Ok(json!([{"id": 1}]))).unwrap();
        assert_eq!(got.freshness, Freshness::Fetched);
        assert_eq!(got.fetched_at, t0());

        let hit = cache
            .get_or_fetch(&key, || Err(FetchError::upstream("must not fetch")))
            .unwrap();
        assert_eq!(hit.freshness, Freshness::Cached);
        assert_eq!(hit.data, json!([{"id": 1}]));
    }

    #[test]
    fn test_freshness_boundary() {
        let key = CacheKey::for_user(CacheDomain::Github, "alice");
        let ttl = Duration::hours(1);
        let policy = CachePolicy::default().with_ttl(CacheDomain::Github, ttl);

        let just_inside = t0() + ttl - Duration::seconds(1);
        let mut cache = ResponseCache::new(seeded(&key, json!("old"), t0()), FixedClock(just_inside), policy);
        let calls = Cell::new(0);
        let got = cache
            .get_or_fetch(&key, || {
                calls.set(calls.get() + 1);
                Ok(json!("new"))
            })
            .unwrap();
        assert_eq!(calls.get(), 0);
        assert_eq!(got.data, json!("old"));

        let exactly = t0() + ttl;
        let mut cache = ResponseCache::new(seeded(&key, json!("old"), t0()), FixedClock(exactly), policy);
        assert!(matches!(cache.lookup(&key), Lookup::Stale(_)));

        let just_outside = t0() + ttl + Duration::seconds(1);
        let mut cache = ResponseCache::new(seeded(&key, json!("old"), t0()), FixedClock(just_outside), policy);
        let got = cache
            .get_or_fetch(&key, || {
                calls.set(calls.get() + 1);
                Ok(json!("new"))
            })
            .unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(got.data, json!("new"));
    }

    #[test]
    fn test_failure_keeps_stale_entry() {
        let key = CacheKey::for_user(CacheDomain::Leetcode, "bob");
        let store = seeded(&key, json!({"solved": 3}), t0());
        let later = t0() + Duration::days(2);
        let mut cache = ResponseCache::new(store, FixedClock(later), CachePolicy::default());

        let err = cache
            .get_or_fetch(&key, || Err(FetchError::NotFound("bob".into())))
            .unwrap_err();
        assert!(err.is_not_found());

        let stale = cache.stale(&key).unwrap();
        assert_eq!(stale.data, json!({"solved": 3}));
        assert_eq!(stale.timestamp, t0());
    }

    #[test]
    fn test_other_user_entry_is_not_served() {
        let alice = CacheKey::for_user(CacheDomain::Github, "alice");
        let bob = CacheKey::for_user(CacheDomain::Github, "bob");
        let mut store = MemoryStore::new();
        // an entry stored under bob's slot but recording alice's key
        let entry = CacheEntry { key: alice.composite(), data: json!("alice"), timestamp: t0() };
        store.set(&bob.storage_key(), &serde_json::to_string(&entry).unwrap()).unwrap();

        let mut cache = ResponseCache::new(store, FixedClock(t0()), CachePolicy::default());
        assert_eq!(cache.lookup(&bob), Lookup::Missing);
        let got = cache.get_or_fetch(&bob, || Ok(json!("bob"))).unwrap();
        assert_eq!(got.freshness, Freshness::Fetched);
    }

    #[test]
    fn test_malformed_entry_is_discarded() {
        let key = CacheKey::global(CacheDomain::Contests);
        let mut store = MemoryStore::new();
        store.set(&key.storage_key(), "{ nope").unwrap();
        let mut cache = ResponseCache::new(store, FixedClock(t0()), CachePolicy::default());

        assert_eq!(cache.lookup(&key), Lookup::Missing);
        assert_eq!(cache.store_ref().get(&key.storage_key()).unwrap(), None);
    }

    #[test]
    fn test_clear_by_domain() {
        let mut cache = ResponseCache::new(MemoryStore::new(), FixedClock(t0()), CachePolicy::default());
        cache.store(&CacheKey::for_user(CacheDomain::Github, "a"), json!(1)).unwrap();
        cache.store(&CacheKey::for_user(CacheDomain::Github, "b"), json!(2)).unwrap();
        cache.store(&CacheKey::global(CacheDomain::Contests), json!(3)).unwrap();

        assert_eq!(cache.entries().unwrap().len(), 3);
        assert_eq!(cache.clear(Some(CacheDomain::Github)).unwrap(), 2);
        assert_eq!(cache.entries().unwrap()[0].key, "contests");
        assert_eq!(cache.clear(None).unwrap(), 1);
        assert!(cache.entries().unwrap().is_empty());
    }

    #[test]
    fn test_clear_leaves_non_cache_keys() {
        let mut store = MemoryStore::new();
        store.set("quests", "[]").unwrap();
        let mut cache = ResponseCache::new(store, FixedClock(t0()), CachePolicy::default());
        cache.store(&CacheKey::global(CacheDomain::Contests), json!([])).unwrap();
        cache.clear(None).unwrap();
        assert!(cache.store_ref().get("quests").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_async_fetch_not_polled_on_hit() {
        let key = CacheKey::global(CacheDomain::Contests);
        let mut cache = ResponseCache::new(seeded(&key, json!([]), t0()), FixedClock(t0()), CachePolicy::default());
        let got = cache
            .get_or_fetch_async(&key, async { Err(FetchError::upstream("must not be polled")) })
            .await
            .unwrap();
        assert_eq!(got.freshness, Freshness::Cached);
    }
}
