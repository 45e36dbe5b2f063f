use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use crate::error::StoreError;
use crate::store::RecordRepository;
use crate::types::{record_matches, AddressRecord, HistoryEntry, ProbeOutcome, ProbeStatus, StatusFilter};

/// Default number of entries kept per address.
pub const DEFAULT_HISTORY_CAP: usize = 50;

/// Put `entry` at the front of `history` and evict from the tail down to `cap`.
pub fn prepend_capped(history: &mut Vec<HistoryEntry>, entry: HistoryEntry, cap: usize) {
    history.insert(0, entry);
    history.truncate(cap);
}

/// Rolling per-address probe log kept inside the record repository.
#[derive(Clone)]
pub struct HistoryStore {
    records: Arc<dyn RecordRepository>,
    cap: usize,
}

impl HistoryStore {
    pub fn new(records: Arc<dyn RecordRepository>, cap: usize) -> Self {
        Self { records, cap }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Append one outcome. Returns `false` when the address is not registered;
    /// history never creates a record.
    pub async fn append(
        &self,
        outcome: &ProbeOutcome,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        let entry = HistoryEntry::from_outcome(outcome, at);
        self.records.append_history(&outcome.address, entry, self.cap).await
    }

    /// Record a probe result: last status and a history entry, written together.
    /// Returns `false` when the address is not registered.
    pub async fn record(
        &self,
        outcome: &ProbeOutcome,
        at: OffsetDateTime,
    ) -> Result<bool, StoreError> {
        self.records.record_outcome(outcome, at, self.cap).await
    }

    /// History of one address, newest first.
    pub async fn entries(&self, address: &str) -> Result<Vec<HistoryEntry>, StoreError> {
        Ok(self
            .records
            .get(address)
            .await?
            .map(|r| r.history)
            .unwrap_or_default())
    }
}

/// One row of the cross-address timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimelineEntry {
    pub address: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub status: ProbeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// Flatten every record's history into one newest-first list.
///
/// The status filter applies to each entry's own status; the search query matches the
/// owning record's address or notes.
pub fn timeline(
    records: &[AddressRecord],
    filter: StatusFilter,
    query: Option<&str>,
) -> Vec<TimelineEntry> {
    let mut rows: Vec<TimelineEntry> = records
        .iter()
        .filter(|r| record_matches(r, StatusFilter::All, query))
        .flat_map(|r| {
            r.history
                .iter()
                .filter(move |e| filter.matches(Some(e.status)))
                .map(move |e| TimelineEntry {
                    address: r.address.clone(),
                    notes: r.notes.clone(),
                    timestamp: e.timestamp,
                    status: e.status,
                    latency_ms: e.latency_ms,
                })
        })
        .collect();
    // Stable sort keeps per-address order for identical timestamps
    rows.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn entry(minute: u8, status: ProbeStatus) -> HistoryEntry {
        HistoryEntry {
            timestamp: datetime!(2024-05-01 12:00 UTC) + time::Duration::minutes(minute as i64),
            status,
            latency_ms: (status == ProbeStatus::Online).then_some(minute as u64),
        }
    }

    #[test]
    fn prepend_evicts_oldest() {
        let mut history = Vec::new();
        for m in 0..5 {
            prepend_capped(&mut history, entry(m, ProbeStatus::Online), 3);
        }
        let minutes: Vec<u64> = history.iter().filter_map(|e| e.latency_ms).collect();
        assert_eq!(minutes, vec![4, 3, 2]);
    }

    #[test]
    fn timeline_is_newest_first_and_filtered() {
        let mut a = AddressRecord::pending("10.0.0.1", Some("core switch".into()));
        a.history = vec![entry(3, ProbeStatus::Online), entry(1, ProbeStatus::Offline)];
        let mut b = AddressRecord::pending("10.0.0.2", None);
        b.history = vec![entry(2, ProbeStatus::Online)];
        let records = vec![a, b];

        let all = timeline(&records, StatusFilter::All, None);
        let order: Vec<(&str, ProbeStatus)> =
            all.iter().map(|t| (t.address.as_str(), t.status)).collect();
        assert_eq!(
            order,
            vec![
                ("10.0.0.1", ProbeStatus::Online),
                ("10.0.0.2", ProbeStatus::Online),
                ("10.0.0.1", ProbeStatus::Offline),
            ]
        );

        let offline = timeline(&records, StatusFilter::Offline, None);
        assert_eq!(offline.len(), 1);

        let searched = timeline(&records, StatusFilter::All, Some("SWITCH"));
        assert_eq!(searched.len(), 2);
        assert!(searched.iter().all(|t| t.address == "10.0.0.1"));
    }
}
