use std::collections::HashMap;
use std::num::NonZeroUsize;

use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::core::storage::KeyValueStore;

pub const KEY_SOURCES: &str = "sources";
pub const KEY_LAST_SPEED: &str = "lastSpeed";

/// Records older than this are dropped whenever the map is written back.
const KEEP_RECORDS_FOR_DAYS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeedRecord {
    pub speed: f64,
    #[serde(rename = "updatedAt", with = "chrono::serde::ts_milliseconds")]
    pub updated_at: DateTime<Utc>,
}

/// Reduces a media source URL to its persistence key: `scheme://host[:port]`.
/// `blob:` wrappers are unwrapped first so a blob handed out by a site maps
/// to the same record as the site itself. Unparseable input is used as-is.
pub fn normalize_origin(raw: &str) -> String {
    let trimmed = raw.trim();
    let parsed = Url::parse(trimmed).ok().and_then(|u| {
        if u.scheme() == "blob" {
            Url::parse(u.path()).ok()
        } else {
            Some(u)
        }
    });
    match parsed {
        Some(u) if u.has_host() => u.origin().ascii_serialization(),
        _ => trimmed.to_string(),
    }
}

/// Read-through cache over the persisted per-origin speed records plus the
/// global `lastSpeed`. Reads hit the store once per origin; writes go
/// straight through, merging into the stored map and pruning stale records
/// on the way out.
pub struct SpeedMemory {
    cache: LruCache<String, Option<SpeedRecord>>,
    last_speed: f64,
}

impl SpeedMemory {
    pub fn new() -> Self {
        SpeedMemory {
            cache: LruCache::new(NonZeroUsize::new(64).unwrap()),
            last_speed: 1.0,
        }
    }

    /// Primes `last_speed` from the store. Called once at session start;
    /// a missing or malformed value leaves the 1.0 default.
    pub fn load(&mut self, store: &mut dyn KeyValueStore) {
        match store.get(&[KEY_LAST_SPEED]) {
            Ok(map) => {
                if let Some(value) = map.get(KEY_LAST_SPEED).and_then(Value::as_f64) {
                    self.last_speed = value;
                }
            }
            Err(e) => log::warn!("Could not read {}: {}", KEY_LAST_SPEED, e),
        }
    }

    pub fn last_speed(&self) -> f64 {
        self.last_speed
    }

    /// The persisted speed for an origin, if any.
    pub fn recall(&mut self, store: &mut dyn KeyValueStore, origin: &str) -> Option<f64> {
        if let Some(cached) = self.cache.get(origin) {
            return cached.as_ref().map(|r| r.speed);
        }
        let record = read_sources(store).remove(origin);
        let speed = record.as_ref().map(|r| r.speed);
        self.cache.put(origin.to_string(), record);
        speed
    }

    /// The rate a freshly attached resource should start at.
    pub fn preferred_rate(
        &mut self,
        store: &mut dyn KeyValueStore,
        origin: &str,
        remember_speed: bool,
    ) -> f64 {
        if !remember_speed {
            return 1.0;
        }
        self.recall(store, origin).unwrap_or(self.last_speed)
    }

    /// Persists a speed change for an origin and as the global last speed.
    /// Stale records are pruned as part of the same write. Records are
    /// written even when remembering is off so enabling it later has
    /// history to draw on.
    pub fn record(
        &mut self,
        store: &mut dyn KeyValueStore,
        origin: &str,
        speed: f64,
    ) -> anyhow::Result<()> {
        let now = Utc::now();
        let record = SpeedRecord {
            speed,
            updated_at: now,
        };
        self.cache.put(origin.to_string(), Some(record.clone()));
        self.last_speed = speed;

        let mut sources = read_sources(store);
        sources.insert(origin.to_string(), record);
        let cutoff = now - Duration::days(KEEP_RECORDS_FOR_DAYS);
        sources.retain(|_, r| r.updated_at >= cutoff);

        let mut entries = HashMap::new();
        entries.insert(
            KEY_SOURCES.to_string(),
            serde_json::to_value(&sources).unwrap_or(Value::Null),
        );
        entries.insert(KEY_LAST_SPEED.to_string(), Value::from(speed));
        store.set(entries)
    }
}

impl Default for SpeedMemory {
    fn default() -> Self {
        SpeedMemory::new()
    }
}

/// Loads the stored origin map, dropping entries that fail to parse so a
/// single corrupt record cannot poison the rest.
fn read_sources(store: &mut dyn KeyValueStore) -> HashMap<String, SpeedRecord> {
    let raw = match store.get(&[KEY_SOURCES]) {
        Ok(mut map) => map.remove(KEY_SOURCES),
        Err(e) => {
            log::warn!("Could not read {}: {}", KEY_SOURCES, e);
            None
        }
    };
    let Some(Value::Object(entries)) = raw else {
        return HashMap::new();
    };
    let mut sources = HashMap::new();
    for (origin, value) in entries {
        match serde_json::from_value::<SpeedRecord>(value) {
            Ok(record) => {
                sources.insert(origin, record);
            }
            Err(e) => log::warn!("Dropping malformed speed record for {}: {}", origin, e),
        }
    }
    sources
}
