//! Typed adapter over the remote key-value cache.
//!
//! Every operation is fallible and callers treat failures as non-fatal:
//! the repository stays the source of truth and cache errors are logged
//! and swallowed at each call site.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;

/// Capabilities the session core needs from the cache: plain strings,
/// hashes, sets and atomic counters, with optional expiry.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn exists(&self, key: &str) -> Result<bool>;

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>>;
    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()>;
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>>;
    async fn hdel(&self, key: &str, field: &str) -> Result<bool>;

    async fn sadd(&self, key: &str, member: &str) -> Result<bool>;
    async fn srem(&self, key: &str, member: &str) -> Result<bool>;
    async fn sismember(&self, key: &str, member: &str) -> Result<bool>;
    async fn scard(&self, key: &str) -> Result<usize>;

    /// Atomic increment; a missing key counts from zero.
    async fn incr(&self, key: &str) -> Result<i64>;
    async fn decr(&self, key: &str) -> Result<i64>;
}

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    Hash(HashMap<String, String>),
    Set(HashSet<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn live(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

/// In-memory cache with the same observable semantics as the remote store.
/// Expired entries are evicted lazily on access.
#[derive(Default)]
pub struct InMemoryCacheStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn parse_counter(raw: &str) -> Result<i64> {
        raw.parse::<i64>()
            .map_err(|_| anyhow!("value is not an integer"))
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        let now = Utc::now();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.value {
                Value::Str(s) => Ok(Some(s.clone())),
                _ => Err(anyhow!("wrong type for key {key}")),
            },
            _ => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry::live(Value::Str(value.to_string())));
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let expires_at = Utc::now() + chrono::Duration::from_std(ttl)?;
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Some(expires_at),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        Ok(entries.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        let now = Utc::now();
        Ok(entries.get(key).is_some_and(|e| !e.is_expired(now)))
    }

    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        let now = Utc::now();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.value {
                Value::Hash(map) => Ok(map.get(field).cloned()),
                _ => Err(anyhow!("wrong type for key {key}")),
            },
            _ => Ok(None),
        }
    }

    async fn hset(&self, key: &str, field: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.is_expired(now) {
                    *e = Entry::live(Value::Hash(HashMap::new()));
                }
            })
            .or_insert_with(|| Entry::live(Value::Hash(HashMap::new())));
        match &mut entry.value {
            Value::Hash(map) => {
                map.insert(field.to_string(), value.to_string());
                Ok(())
            }
            _ => Err(anyhow!("wrong type for key {key}")),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>> {
        let entries = self.entries.read().await;
        let now = Utc::now();
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now) => match &entry.value {
                Value::Hash(map) => Ok(map.clone()),
                _ => Err(anyhow!("wrong type for key {key}")),
            },
            _ => Ok(HashMap::new()),
        }
    }

    async fn hdel(&self, key: &str, field: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) => match &mut entry.value {
                Value::Hash(map) => Ok(map.remove(field).is_some()),
                _ => Err(anyhow!("wrong type for key {key}")),
            },
            None => Ok(false),
        }
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::live(Value::Set(HashSet::new())));
        match &mut entry.value {
            Value::Set(set) => Ok(set.insert(member.to_string())),
            _ => Err(anyhow!("wrong type for key {key}")),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) => match &mut entry.value {
                Value::Set(set) => Ok(set.remove(member)),
                _ => Err(anyhow!("wrong type for key {key}")),
            },
            None => Ok(false),
        }
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.contains(member)),
                _ => Err(anyhow!("wrong type for key {key}")),
            },
            None => Ok(false),
        }
    }

    async fn scard(&self, key: &str) -> Result<usize> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) => match &entry.value {
                Value::Set(set) => Ok(set.len()),
                _ => Err(anyhow!("wrong type for key {key}")),
            },
            None => Ok(0),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let mut entries = self.entries.write().await;
        let now = Utc::now();
        let entry = entries
            .entry(key.to_string())
            .and_modify(|e| {
                if e.is_expired(now) {
                    *e = Entry::live(Value::Str("0".to_string()));
                }
            })
            .or_insert_with(|| Entry::live(Value::Str("0".to_string())));
        match &mut entry.value {
            Value::Str(raw) => {
                let next = Self::parse_counter(raw)? + 1;
                *raw = next.to_string();
                Ok(next)
            }
            _ => Err(anyhow!("wrong type for key {key}")),
        }
    }

    async fn decr(&self, key: &str) -> Result<i64> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::live(Value::Str("0".to_string())));
        match &mut entry.value {
            Value::Str(raw) => {
                let next = Self::parse_counter(raw)? - 1;
                *raw = next.to_string();
                Ok(next)
            }
            _ => Err(anyhow!("wrong type for key {key}")),
        }
    }
}
