//! In-process TTL cache with Redis-like string and list values.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use rigchat_core::cache::Cache;
use rigchat_core::error::CacheError;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

enum Value {
    Str(String),
    List(VecDeque<String>),
}

struct Slot {
    value: Value,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

struct Slots {
    map: HashMap<String, Slot>,
    next_sweep: Instant,
}

impl Slots {
    /// Drop every expired slot, at most once per `interval`.
    fn sweep(&mut self, now: Instant, interval: Duration) {
        if now < self.next_sweep {
            return;
        }
        let before = self.map.len();
        self.map.retain(|_, slot| slot.is_live(now));
        self.next_sweep = now + interval;
        let swept = before - self.map.len();
        if swept > 0 {
            debug!(swept, remaining = self.map.len(), "Swept expired cache keys");
        }
    }
}

/// Default spacing between full sweeps of expired keys.
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// A cache living in process memory.
///
/// Expiry is checked on access. Writes also sweep out every expired key
/// once per sweep interval, so keys nobody touches again do not pile up.
pub struct InMemoryCache {
    slots: Mutex<Slots>,
    sweep_interval: Duration,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(Slots {
                map: HashMap::new(),
                next_sweep: Instant::now() + DEFAULT_SWEEP_INTERVAL,
            }),
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = interval;
        self.slots.get_mut().next_sweep = Instant::now() + interval;
        self
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.lock().await.map.values().filter(|s| s.is_live(now)).count()
    }

    /// Keys held in memory, expired ones not yet dropped included.
    pub async fn slot_count(&self) -> usize {
        self.slots.lock().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Drop `key` if it has expired.
fn evict_expired(slots: &mut HashMap<String, Slot>, key: &str, now: Instant) {
    if slots.get(key).is_some_and(|s| !s.is_live(now)) {
        slots.remove(key);
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    fn name(&self) -> &str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let now = Instant::now();
        let mut guard = self.slots.lock().await;
        let slots = &mut guard.map;
        evict_expired(slots, key, now);
        match slots.get(key).map(|s| &s.value) {
            None => Ok(None),
            Some(Value::Str(s)) => Ok(Some(s.clone())),
            Some(Value::List(_)) => Err(CacheError::WrongType(key.into())),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
        let now = Instant::now();
        let expires_at = Some(now + ttl);
        let mut guard = self.slots.lock().await;
        guard.sweep(now, self.sweep_interval);
        guard.map.insert(
            key.into(),
            Slot {
                value: Value::Str(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut guard = self.slots.lock().await;
        Ok(guard.map.remove(key).is_some_and(|s| s.is_live(now)))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut guard = self.slots.lock().await;
        let slots = &mut guard.map;
        evict_expired(slots, key, now);
        match slots.get_mut(key) {
            Some(slot) => {
                slot.expires_at = Some(now + ttl);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_push(&self, key: &str, value: String) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut guard = self.slots.lock().await;
        guard.sweep(now, self.sweep_interval);
        let slots = &mut guard.map;
        evict_expired(slots, key, now);
        let slot = slots.entry(key.into()).or_insert_with(|| Slot {
            value: Value::List(VecDeque::new()),
            expires_at: None,
        });
        match &mut slot.value {
            Value::List(list) => {
                list.push_front(value);
                Ok(list.len())
            }
            Value::Str(_) => Err(CacheError::WrongType(key.into())),
        }
    }

    async fn list_trim(&self, key: &str, start: usize, stop: usize) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut guard = self.slots.lock().await;
        let slots = &mut guard.map;
        evict_expired(slots, key, now);
        let emptied = match slots.get_mut(key).map(|s| &mut s.value) {
            None => return Ok(()),
            Some(Value::Str(_)) => return Err(CacheError::WrongType(key.into())),
            Some(Value::List(list)) => {
                if start > stop || start >= list.len() {
                    list.clear();
                } else {
                    list.truncate(stop + 1);
                    list.drain(..start);
                }
                list.is_empty()
            }
        };
        if emptied {
            slots.remove(key);
        }
        Ok(())
    }

    async fn list_range(&self, key: &str, start: usize, stop: usize) -> Result<Vec<String>, CacheError> {
        let now = Instant::now();
        let mut guard = self.slots.lock().await;
        let slots = &mut guard.map;
        evict_expired(slots, key, now);
        match slots.get(key).map(|s| &s.value) {
            None => Ok(vec![]),
            Some(Value::Str(_)) => Err(CacheError::WrongType(key.into())),
            Some(Value::List(list)) => {
                if start > stop {
                    return Ok(vec![]);
                }
                Ok(list
                    .iter()
                    .skip(start)
                    .take(stop - start + 1)
                    .cloned()
                    .collect())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn string_values_expire() {
        let cache = InMemoryCache::new();
        cache.set_ex("session:a", "blob".into(), Duration::from_secs(10)).await.unwrap();
        assert_eq!(cache.get("session:a").await.unwrap().as_deref(), Some("blob"));

        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get("session:a").await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test(start_paused = true)]
    async fn expire_extends_only_existing_keys() {
        let cache = InMemoryCache::new();
        assert!(!cache.expire("missing", Duration::from_secs(5)).await.unwrap());

        cache.set_ex("k", "v".into(), Duration::from_secs(5)).await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(cache.expire("k", Duration::from_secs(5)).await.unwrap());
        tokio::time::advance(Duration::from_secs(4)).await;
        assert_eq!(cache.get("k").await.unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn list_push_trim_range() {
        let cache = InMemoryCache::new();
        for i in 0..5 {
            cache.list_push("history:a", format!("m{i}")).await.unwrap();
        }
        // Head is the newest
        assert_eq!(cache.list_range("history:a", 0, 1).await.unwrap(), vec!["m4", "m3"]);

        cache.list_trim("history:a", 0, 2).await.unwrap();
        assert_eq!(
            cache.list_range("history:a", 0, 100).await.unwrap(),
            vec!["m4", "m3", "m2"]
        );

        cache.list_trim("history:a", 5, 9).await.unwrap();
        assert!(cache.list_range("history:a", 0, 10).await.unwrap().is_empty());
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn wrong_type_is_reported() {
        let cache = InMemoryCache::new();
        cache.set_ex("k", "v".into(), Duration::from_secs(60)).await.unwrap();
        assert!(matches!(
            cache.list_push("k", "x".into()).await,
            Err(CacheError::WrongType(_))
        ));
        cache.list_push("l", "x".into()).await.unwrap();
        assert!(matches!(cache.get("l").await, Err(CacheError::WrongType(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_keys_are_swept_on_write() {
        let cache = InMemoryCache::new().with_sweep_interval(Duration::from_secs(2));
        for i in 0..1000 {
            cache
                .set_ex(&format!("session:{i}"), "blob".into(), Duration::from_secs(1))
                .await
                .unwrap();
        }
        assert_eq!(cache.slot_count().await, 1000);

        tokio::time::advance(Duration::from_secs(5)).await;
        cache.set_ex("session:new", "blob".into(), Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.slot_count().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn sweep_runs_at_most_once_per_interval() {
        let cache = InMemoryCache::new();
        cache.set_ex("a", "v".into(), Duration::from_secs(1)).await.unwrap();
        tokio::time::advance(Duration::from_secs(5)).await;

        // Within the default interval the expired key is only dropped on access
        cache.list_push("history:b", "m".into()).await.unwrap();
        assert_eq!(cache.slot_count().await, 2);

        tokio::time::advance(DEFAULT_SWEEP_INTERVAL).await;
        cache.list_push("history:b", "m".into()).await.unwrap();
        assert_eq!(cache.slot_count().await, 1);
    }

    #[tokio::test]
    async fn delete_reports_removal() {
        let cache = InMemoryCache::new();
        cache.set_ex("k", "v".into(), Duration::from_secs(60)).await.unwrap();
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
    }
}
