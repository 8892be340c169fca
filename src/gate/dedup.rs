//! Dedup Guard - drop byte-identical detector payloads
//!
//! Upstream APIs often return the same response several times in a row.
//! The guard keeps the content hash of the last payload seen per key and
//! flags an identical payload as a duplicate until the window runs out.
//! Payloads are canonicalized (object keys sorted) before hashing, so field
//! order never makes two equal payloads look different.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::Result;
use crate::signal::SignalKey;

/// Last payload seen for a key
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupEntry {
    /// Hex SHA-256 of the canonical payload
    pub content_hash: String,
    pub recorded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DedupEntry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Read-only view of a key's dedup state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DedupStatus {
    pub content_hash: String,
    pub recorded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    /// Whether an identical payload would be suppressed right now
    pub active: bool,
}

/// Rebuild `value` with every object's keys in sorted order
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut sorted = Map::with_capacity(map.len());
            for k in keys {
                sorted.insert(k.clone(), canonicalize(&map[k.as_str()]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Hex SHA-256 over the canonical JSON form of `payload`
pub fn content_hash<T: Serialize + ?Sized>(payload: &T) -> Result<String> {
    let canonical = canonicalize(&serde_json::to_value(payload)?);
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Per-key last-payload tracker with a short TTL
pub struct DedupGuard {
    window: Duration,
    entries: DashMap<SignalKey, DedupEntry>,
}

impl DedupGuard {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: DashMap::new(),
        }
    }

    /// Hash `payload` and check it against the key's last payload
    pub fn is_duplicate<T: Serialize + ?Sized>(
        &self,
        key: &SignalKey,
        payload: &T,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let hash = content_hash(payload)?;
        Ok(self.check_hash(key, hash, now))
    }

    /// True if `hash` matches a live entry for `key`. A match leaves the
    /// entry untouched, so repeats never extend their own window; anything
    /// else replaces the entry with a fresh one.
    pub fn check_hash(&self, key: &SignalKey, hash: String, now: DateTime<Utc>) -> bool {
        let fresh = DedupEntry {
            content_hash: hash,
            recorded_at: now,
            expires_at: now + self.window,
        };

        match self.entries.entry(key.clone()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied.get();
                if current.content_hash == fresh.content_hash && current.is_live(now) {
                    return true;
                }
                occupied.insert(fresh);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
            }
        }
        false
    }

    pub fn status(&self, key: &SignalKey, now: DateTime<Utc>) -> Option<DedupStatus> {
        self.entries.get(key).map(|e| DedupStatus {
            content_hash: e.content_hash.clone(),
            recorded_at: e.recorded_at,
            expires_at: e.expires_at,
            active: e.is_live(now),
        })
    }

    /// Remove the key's entry if it has expired. Returns true if removed.
    pub fn purge_key(&self, key: &SignalKey, now: DateTime<Utc>) -> bool {
        self.entries.remove_if(key, |_, e| !e.is_live(now)).is_some()
    }

    pub fn keys(&self) -> Vec<SignalKey> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
