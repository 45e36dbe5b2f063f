use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use time::OffsetDateTime;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::StoreError;
use crate::history::prepend_capped;
use crate::types::{AddressRecord, HistoryEntry, ProbeOutcome, ProbeStatus};

/// Durable keyed store of registered addresses, their last status and history.
///
/// Every mutation is serialized against every other mutation, so a read-modify-write
/// such as a history append can never lose a concurrent update.
#[async_trait]
pub trait RecordRepository: Send + Sync {
    async fn list_all(&self) -> Result<Vec<AddressRecord>, StoreError>;

    async fn get(&self, address: &str) -> Result<Option<AddressRecord>, StoreError>;

    /// Register addresses that are not present yet, keeping existing records untouched.
    /// Returns the full record list afterwards.
    async fn upsert_many(
        &self,
        addresses: &[String],
        notes: Option<&str>,
    ) -> Result<Vec<AddressRecord>, StoreError>;

    async fn update_status(
        &self,
        address: &str,
        status: ProbeStatus,
        latency_ms: Option<u64>,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    async fn update_notes(&self, address: &str, notes: Option<String>) -> Result<bool, StoreError>;

    async fn append_history(
        &self,
        address: &str,
        entry: HistoryEntry,
        cap: usize,
    ) -> Result<bool, StoreError>;

    /// Status update and history append for one probe result, applied as one write.
    async fn record_outcome(
        &self,
        outcome: &ProbeOutcome,
        at: OffsetDateTime,
        history_cap: usize,
    ) -> Result<bool, StoreError>;

    async fn remove(&self, address: &str) -> Result<bool, StoreError>;

    async fn clear_all(&self) -> Result<(), StoreError>;
}

/// Record list kept in memory and mirrored to a pretty-printed JSON file.
///
/// Writers hold the write lock across the file write and only commit the new list in
/// memory once it is on disk, so a failed write leaves both copies unchanged.
#[derive(Debug)]
pub struct JsonRecordStore {
    path: Option<PathBuf>,
    records: RwLock<Vec<AddressRecord>>,
}

impl JsonRecordStore {
    /// Open (or create, empty) the store file at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let records: Vec<AddressRecord> = read_json_or_init(&path, Vec::new).await?;
        debug!(path = %path.display(), count = records.len(), "record store opened");
        Ok(Self {
            path: Some(path),
            records: RwLock::new(records),
        })
    }

    /// A store that is never written to disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            records: RwLock::new(Vec::new()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply `f` to a copy of the records. When it reports a change, persist the copy
    /// and then swap it in.
    async fn mutate<T>(
        &self,
        f: impl FnOnce(&mut Vec<AddressRecord>) -> (T, bool),
    ) -> Result<T, StoreError> {
        let mut guard = self.records.write().await;
        let mut next = guard.clone();
        let (value, changed) = f(&mut next);
        if changed {
            if let Some(path) = &self.path {
                write_json_atomic(path, &next).await?;
            }
            *guard = next;
        }
        Ok(value)
    }
}

fn find<'a>(records: &'a mut [AddressRecord], address: &str) -> Option<&'a mut AddressRecord> {
    records.iter_mut().find(|r| r.address == address)
}

fn apply_status(
    record: &mut AddressRecord,
    status: ProbeStatus,
    latency_ms: Option<u64>,
    at: OffsetDateTime,
) {
    record.last_status = Some(status);
    record.last_latency_ms = match status {
        ProbeStatus::Online => latency_ms,
        ProbeStatus::Offline => None,
    };
    record.updated_at = Some(at);
}

#[async_trait]
impl RecordRepository for JsonRecordStore {
    async fn list_all(&self) -> Result<Vec<AddressRecord>, StoreError> {
        Ok(self.records.read().await.clone())
    }

    async fn get(&self, address: &str) -> Result<Option<AddressRecord>, StoreError> {
        Ok(self
            .records
            .read()
            .await
            .iter()
            .find(|r| r.address == address)
            .cloned())
    }

    async fn upsert_many(
        &self,
        addresses: &[String],
        notes: Option<&str>,
    ) -> Result<Vec<AddressRecord>, StoreError> {
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());
        self.mutate(|records| {
            let mut added = 0usize;
            for address in addresses {
                if records.iter().any(|r| &r.address == address) {
                    continue;
                }
                records.push(AddressRecord::pending(address.as_str(), notes.map(String::from)));
                added += 1;
            }
            (records.clone(), added > 0)
        })
        .await
    }

    async fn update_status(
        &self,
        address: &str,
        status: ProbeStatus,
        latency_ms: Option<u64>,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        self.mutate(|records| match find(records, address) {
            Some(record) => {
                apply_status(record, status, latency_ms, at);
                (true, true)
            }
            None => (false, false),
        })
        .await
    }

    async fn update_notes(&self, address: &str, notes: Option<String>) -> Result<bool, StoreError> {
        let notes = notes.filter(|n| !n.trim().is_empty());
        self.mutate(|records| match find(records, address) {
            Some(record) => {
                record.notes = notes;
                (true, true)
            }
            None => (false, false),
        })
        .await
    }

    async fn append_history(
        &self,
        address: &str,
        entry: HistoryEntry,
        cap: usize,
    ) -> Result<bool, StoreError> {
        self.mutate(|records| match find(records, address) {
            Some(record) => {
                prepend_capped(&mut record.history, entry, cap);
                (true, true)
            }
            None => (false, false),
        })
        .await
    }

    async fn record_outcome(
        &self,
        outcome: &ProbeOutcome,
        at: OffsetDateTime,
        history_cap: usize,
    ) -> Result<bool, StoreError> {
        self.mutate(|records| match find(records, &outcome.address) {
            Some(record) => {
                apply_status(record, outcome.status, outcome.latency_ms, at);
                prepend_capped(
                    &mut record.history,
                    HistoryEntry::from_outcome(outcome, at),
                    history_cap,
                );
                (true, true)
            }
            None => (false, false),
        })
        .await
    }

    async fn remove(&self, address: &str) -> Result<bool, StoreError> {
        self.mutate(|records| {
            let before = records.len();
            records.retain(|r| r.address != address);
            let removed = records.len() != before;
            (removed, removed)
        })
        .await
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.mutate(|records| {
            records.clear();
            ((), true)
        })
        .await
    }
}

/// Read a JSON document, creating it from `default` when the file does not exist yet.
pub(crate) async fn read_json_or_init<T>(
    path: &Path,
    default: impl FnOnce() -> T,
) -> Result<T, StoreError>
where
    T: Serialize + DeserializeOwned,
{
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Decode {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            let value = default();
            write_json_atomic(path, &value).await?;
            Ok(value)
        }
        Err(source) => Err(StoreError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Write pretty JSON to a sibling temp file and rename it over `path`.
pub(crate) async fn write_json_atomic<T: Serialize + ?Sized>(
    path: &Path,
    value: &T,
) -> Result<(), StoreError> {
    let io_err = |source: std::io::Error| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let bytes = serde_json::to_vec_pretty(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, &bytes).await.map_err(io_err)?;
    fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[tokio::test]
    async fn upsert_skips_existing() {
        let store = JsonRecordStore::in_memory();
        store
            .upsert_many(&["10.0.0.1".into(), "10.0.0.2".into()], Some("lab"))
            .await
            .unwrap();
        store
            .update_notes("10.0.0.1", Some("router".into()))
            .await
            .unwrap();
        let all = store
            .upsert_many(&["10.0.0.2".into(), "10.0.0.1".into(), "10.0.0.3".into()], None)
            .await
            .unwrap();
        let addrs: Vec<&str> = all.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addrs, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
        assert_eq!(all[0].notes.as_deref(), Some("router"));
        assert_eq!(all[1].notes.as_deref(), Some("lab"));
        assert!(all.iter().all(AddressRecord::is_pending));
    }

    #[tokio::test]
    async fn unknown_address_is_a_no_op() {
        let store = JsonRecordStore::in_memory();
        let at = datetime!(2024-05-01 12:00 UTC);
        let outcome = ProbeOutcome::online("10.9.9.9", 3);
        assert!(!store.record_outcome(&outcome, at, 50).await.unwrap());
        assert!(!store.update_notes("10.9.9.9", None).await.unwrap());
        assert!(!store.remove("10.9.9.9").await.unwrap());
        assert!(store.list_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn offline_clears_latency() {
        let store = JsonRecordStore::in_memory();
        store.upsert_many(&["10.0.0.1".into()], None).await.unwrap();
        let at = datetime!(2024-05-01 12:00 UTC);
        store
            .update_status("10.0.0.1", ProbeStatus::Online, Some(7), at)
            .await
            .unwrap();
        store
            .update_status("10.0.0.1", ProbeStatus::Offline, Some(7), at)
            .await
            .unwrap();
        let record = store.get("10.0.0.1").await.unwrap().unwrap();
        assert_eq!(record.last_status, Some(ProbeStatus::Offline));
        assert_eq!(record.last_latency_ms, None);
        assert_eq!(record.updated_at, Some(at));
    }
}
