//! In-process store
//!
//! Lives for the lifetime of the process and is never persisted. Backs the
//! test suite and single-instance development runs without Redis.

use async_trait::async_trait;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};
use tokio::sync::Mutex;

use super::{AtomicStore, KvCommand, KvStore, StoreError, StoreResult};

#[derive(Default)]
struct Inner {
    strings: BTreeMap<String, (String, Option<Instant>)>,
    hashes: BTreeMap<String, HashMap<String, String>>,
    zsets: BTreeMap<String, HashMap<String, f64>>,
}

impl Inner {
    fn purge_expired(&mut self, now: Instant) {
        self.strings
            .retain(|_, (_, expires_at)| expires_at.map_or(true, |at| at > now));
    }

    fn del(&mut self, key: &str) {
        self.strings.remove(key);
        self.hashes.remove(key);
        self.zsets.remove(key);
    }

    fn apply(&mut self, command: KvCommand) {
        match command {
            KvCommand::Set { key, value } => {
                self.strings.insert(key, (value, None));
            }
            KvCommand::HReplace { key, fields } => {
                self.del(&key);
                if !fields.is_empty() {
                    self.hashes.insert(key, fields.into_iter().collect());
                }
            }
            KvCommand::HSet { key, fields } => {
                if !fields.is_empty() {
                    self.hashes.entry(key).or_default().extend(fields);
                }
            }
            KvCommand::ZReplace { key, members } => {
                self.del(&key);
                if !members.is_empty() {
                    self.zsets.insert(key, members.into_iter().collect());
                }
            }
        }
    }

    fn sorted_zset(&self, key: &str) -> Vec<(String, f64)> {
        let mut members: Vec<(String, f64)> = self
            .zsets
            .get(key)
            .map(|set| set.iter().map(|(m, s)| (m.clone(), *s)).collect())
            .unwrap_or_default();
        // Redis orders ties lexicographically; reversed for ZREVRANGE
        members.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.0.cmp(&a.0))
        });
        members
    }

    fn all_keys(&self) -> BTreeSet<String> {
        self.strings
            .keys()
            .chain(self.hashes.keys())
            .chain(self.zsets.keys())
            .cloned()
            .collect()
    }
}

/// Process-local store with the same semantics the ledger expects from Redis
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
    atomic_release: bool,
    unavailable: Arc<AtomicBool>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Store with atomic compare-and-delete support
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner::default())),
            atomic_release: true,
            unavailable: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Store without scripting support; locks taken on it can only expire
    pub fn basic() -> Self {
        Self {
            atomic_release: false,
            ..Self::new()
        }
    }

    /// Simulate an outage: every operation fails with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> StoreResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("memory store marked unavailable".to_string()))
        } else {
            Ok(())
        }
    }

    async fn lock(&self) -> StoreResult<tokio::sync::MutexGuard<'_, Inner>> {
        self.check_available()?;
        let mut inner = self.inner.lock().await;
        inner.purge_expired(Instant::now());
        Ok(inner)
    }
}

/// Glob matching for SCAN patterns (`*` and `?`)
fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();
    let (mut p, mut t) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == text[t]) {
            p += 1;
            t += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some((p, t));
            p += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

fn slice_range(len: usize, start: isize, stop: isize) -> Option<(usize, usize)> {
    let len = len as isize;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };
    if len == 0 || start > stop || start >= len {
        None
    } else {
        Some((start as usize, stop as usize))
    }
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let inner = self.lock().await?;
        Ok(inner.strings.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut inner = self.lock().await?;
        inner.apply(KvCommand::Set {
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn del(&self, key: &str) -> StoreResult<()> {
        let mut inner = self.lock().await?;
        inner.del(key);
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> StoreResult<bool> {
        let mut inner = self.lock().await?;
        if inner.strings.contains_key(key) {
            return Ok(false);
        }
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds.max(1));
        inner
            .strings
            .insert(key.to_string(), (value.to_string(), Some(expires_at)));
        Ok(true)
    }

    async fn hgetall(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let inner = self.lock().await?;
        Ok(inner.hashes.get(key).cloned().unwrap_or_default())
    }

    async fn hgetall_many(&self, keys: &[String]) -> StoreResult<Vec<HashMap<String, String>>> {
        let inner = self.lock().await?;
        Ok(keys
            .iter()
            .map(|key| inner.hashes.get(key).cloned().unwrap_or_default())
            .collect())
    }

    async fn hset_multiple(&self, key: &str, fields: &[(String, String)]) -> StoreResult<()> {
        let mut inner = self.lock().await?;
        inner.apply(KvCommand::HSet {
            key: key.to_string(),
            fields: fields.to_vec(),
        });
        Ok(())
    }

    async fn zrevrange_withscores(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> StoreResult<Vec<(String, f64)>> {
        let inner = self.lock().await?;
        let members = inner.sorted_zset(key);
        Ok(match slice_range(members.len(), start, stop) {
            Some((from, to)) => members[from..=to].to_vec(),
            None => Vec::new(),
        })
    }

    async fn zrevrank(&self, key: &str, member: &str) -> StoreResult<Option<u64>> {
        let inner = self.lock().await?;
        Ok(inner
            .sorted_zset(key)
            .iter()
            .position(|(m, _)| m == member)
            .map(|rank| rank as u64))
    }

    async fn zcard(&self, key: &str) -> StoreResult<u64> {
        let inner = self.lock().await?;
        Ok(inner.zsets.get(key).map_or(0, |set| set.len() as u64))
    }

    async fn scan_match(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> StoreResult<(u64, Vec<String>)> {
        let inner = self.lock().await?;
        let keys: Vec<String> = inner.all_keys().into_iter().collect();
        let start = (cursor as usize).min(keys.len());
        let end = (start + count.max(1)).min(keys.len());
        let page = keys[start..end]
            .iter()
            .filter(|key| glob_match(pattern, key))
            .cloned()
            .collect();
        let next = if end >= keys.len() { 0 } else { end as u64 };
        Ok((next, page))
    }

    async fn exec_batch(&self, commands: Vec<KvCommand>) -> StoreResult<()> {
        let mut inner = self.lock().await?;
        for command in commands {
            inner.apply(command);
        }
        Ok(())
    }

    async fn ping(&self) -> StoreResult<()> {
        self.check_available()
    }

    fn atomic(&self) -> Option<&dyn AtomicStore> {
        if self.atomic_release {
            Some(self)
        } else {
            None
        }
    }
}

#[async_trait]
impl AtomicStore for MemoryStore {
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut inner = self.lock().await?;
        let matches = inner
            .strings
            .get(key)
            .map_or(false, |(value, _)| value == expected);
        if matches {
            inner.strings.remove(key);
        }
        Ok(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match("cx:whitelist:entry:*", "cx:whitelist:entry:0xabc"));
        assert!(!glob_match("cx:whitelist:entry:*", "cx:points:s1:wallet:0xabc"));
        assert!(glob_match("a?c", "abc"));
        assert!(glob_match("*", ""));
    }

    #[tokio::test]
    async fn test_set_nx_respects_existing_key() {
        let store = MemoryStore::new();
        assert!(store.set_nx_ex("lock", "a", 10).await.unwrap());
        assert!(!store.set_nx_ex("lock", "b", 10).await.unwrap());
        assert_eq!(store.get("lock").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_zrevrange_orders_by_score() {
        let store = MemoryStore::new();
        store
            .exec_batch(vec![KvCommand::ZReplace {
                key: "board".to_string(),
                members: vec![
                    ("0xa".to_string(), 5.0),
                    ("0xb".to_string(), 9.0),
                    ("0xc".to_string(), 1.0),
                ],
            }])
            .await
            .unwrap();

        let top = store.zrevrange_withscores("board", 0, -1).await.unwrap();
        let order: Vec<&str> = top.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(order, vec!["0xb", "0xa", "0xc"]);
        assert_eq!(store.zrevrank("board", "0xc").await.unwrap(), Some(2));
        assert_eq!(store.zcard("board").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_scan_pages_until_cursor_returns_to_zero() {
        let store = MemoryStore::new();
        for i in 0..25 {
            store
                .hset_multiple(
                    &format!("cx:whitelist:entry:0x{:02}", i),
                    &[("address".to_string(), format!("0x{:02}", i))],
                )
                .await
                .unwrap();
        }
        store.set("cx:other", "x").await.unwrap();

        let mut cursor = 0;
        let mut seen = Vec::new();
        loop {
            let (next, keys) = store.scan_match(cursor, "cx:whitelist:entry:*", 10).await.unwrap();
            seen.extend(keys);
            if next == 0 {
                break;
            }
            cursor = next;
        }
        assert_eq!(seen.len(), 25);
    }

    #[tokio::test]
    async fn test_basic_store_has_no_atomic_capability() {
        assert!(MemoryStore::new().atomic().is_some());
        assert!(MemoryStore::basic().atomic().is_none());
    }

    #[tokio::test]
    async fn test_unavailable_store_fails_every_call() {
        let store = MemoryStore::new();
        store.set_unavailable(true);
        assert!(matches!(store.get("k").await, Err(StoreError::Unavailable(_))));
        assert!(store.ping().await.is_err());
    }
}
