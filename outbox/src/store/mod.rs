//! Durable record store
//!
//! Each domain is persisted as one JSON array under a fixed key. Loading
//! tolerates missing and corrupted payloads: both read as an empty (or
//! partially recovered) list and never fail the caller.

mod repository;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::{debug, warn};

use crate::adapters::sqlite::SqliteBackend;
use crate::types::error::{OutboxError, Result};

pub use repository::Repository;

/// Record kinds and their storage keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Domain {
    ScheduledEmails,
    OfflineEmails,
    FollowUps,
    Tracking,
}

impl Domain {
    pub const ALL: [Domain; 4] = [
        Domain::ScheduledEmails,
        Domain::OfflineEmails,
        Domain::FollowUps,
        Domain::Tracking,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Self::ScheduledEmails => "scheduled_emails",
            Self::OfflineEmails => "offline_emails",
            Self::FollowUps => "followups",
            Self::Tracking => "tracking",
        }
    }

    fn index(&self) -> usize {
        match self {
            Self::ScheduledEmails => 0,
            Self::OfflineEmails => 1,
            Self::FollowUps => 2,
            Self::Tracking => 3,
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// A typed record owned by exactly one domain
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const DOMAIN: Domain;

    fn id(&self) -> &str;
}

/// Raw key/value persistence underneath the record store
pub trait StorageBackend: Send + Sync {
    fn read(&self, key: &str) -> Result<Option<String>>;
    fn write(&self, key: &str, payload: &str) -> Result<()>;
}

/// Volatile backend, mostly for tests and hosts without a data directory
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| OutboxError::Storage(format!("Failed to lock memory store: {}", e)))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, payload: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|e| OutboxError::Storage(format!("Failed to lock memory store: {}", e)))?;
        entries.insert(key.to_string(), payload.to_string());
        Ok(())
    }
}

/// Shared handle over a storage backend
///
/// Clones share the backend and the per-domain write locks, so every
/// read-modify-write on one domain is serialized within the process.
#[derive(Clone)]
pub struct RecordStore {
    backend: Arc<dyn StorageBackend>,
    locks: Arc<[Mutex<()>; 4]>,
}

impl RecordStore {
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            backend,
            locks: Arc::new(Default::default()),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    pub fn sqlite(path: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(SqliteBackend::open(path)?)))
    }

    /// Load every record of a domain.
    ///
    /// A missing or blank payload is an empty domain. An unparseable payload
    /// is logged and read as empty; entries that fail to decode inside an
    /// otherwise valid array are skipped. Only backend failures are errors.
    pub fn load<T: DeserializeOwned>(&self, domain: Domain) -> Result<Vec<T>> {
        let payload = match self.backend.read(domain.key())? {
            Some(payload) if !payload.trim().is_empty() => payload,
            _ => return Ok(Vec::new()),
        };

        let entries: Vec<serde_json::Value> = match serde_json::from_str(&payload) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Discarding corrupted '{}' payload: {}", domain, e);
                return Ok(Vec::new());
            }
        };

        let total = entries.len();
        let records: Vec<T> = entries
            .into_iter()
            .enumerate()
            .filter_map(|(i, entry)| match serde_json::from_value(entry) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!("Skipping malformed '{}' record #{}: {}", domain, i, e);
                    None
                }
            })
            .collect();

        if records.len() != total {
            debug!("Recovered {}/{} '{}' records", records.len(), total, domain);
        }

        Ok(records)
    }

    /// Replace every record of a domain
    pub fn save<T: Serialize>(&self, domain: Domain, records: &[T]) -> Result<()> {
        let payload = serde_json::to_string(records)?;
        self.backend.write(domain.key(), &payload)
    }

    /// Hold the write lock of a domain for a read-modify-write cycle.
    ///
    /// Never hold the guard across an `.await`.
    pub(crate) fn lock(&self, domain: Domain) -> MutexGuard<'_, ()> {
        self.locks[domain.index()]
            .lock()
            .unwrap_or_else(|e| e.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }
}
