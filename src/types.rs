use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Reachability of a host as observed by one probe.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ProbeStatus {
    Online,
    Offline,
}

/// One candidate produced by the address-range parser.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ParsedAddress {
    pub address: String,
    pub is_valid: bool,
}

/// Result of a single probe. `latency_ms` is only set when the host answered.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub address: String,
    pub status: ProbeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl ProbeOutcome {
    pub fn online(address: impl Into<String>, latency_ms: u64) -> Self {
        Self {
            address: address.into(),
            status: ProbeStatus::Online,
            latency_ms: Some(latency_ms),
        }
    }

    pub fn offline(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            status: ProbeStatus::Offline,
            latency_ms: None,
        }
    }

    pub fn is_online(&self) -> bool {
        self.status == ProbeStatus::Online
    }
}

/// One entry of an address's rolling history, newest first.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub status: ProbeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

impl HistoryEntry {
    pub fn from_outcome(outcome: &ProbeOutcome, timestamp: OffsetDateTime) -> Self {
        Self {
            timestamp,
            status: outcome.status,
            latency_ms: outcome.latency_ms,
        }
    }
}

/// Persisted state of one registered address.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_status: Option<ProbeStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub updated_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

impl AddressRecord {
    /// A freshly registered address that has never been probed.
    pub fn pending(address: impl Into<String>, notes: Option<String>) -> Self {
        Self {
            address: address.into(),
            last_status: None,
            last_latency_ms: None,
            notes,
            updated_at: None,
            history: Vec::new(),
        }
    }

    pub fn is_pending(&self) -> bool {
        self.last_status.is_none()
    }
}

/// Global scan-cycle bookkeeping. There is exactly one of these per deployment.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CycleState {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_scan_time: Option<OffsetDateTime>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub next_scan_time: Option<OffsetDateTime>,
    #[serde(default)]
    pub total_scans: u64,
}

impl CycleState {
    /// First schedule for a store that has never run a cycle.
    ///
    /// `None` when `now + interval` is not a representable date.
    pub fn bootstrapped(&self, now: OffsetDateTime, interval: std::time::Duration) -> Option<Self> {
        Some(Self {
            last_scan_time: self.last_scan_time,
            next_scan_time: Some(offset_by(now, interval)?),
            total_scans: self.total_scans,
        })
    }

    /// State after a cycle that completed at `completed_at`.
    ///
    /// `None` when `completed_at + interval` is not a representable date.
    pub fn advanced(
        &self,
        completed_at: OffsetDateTime,
        interval: std::time::Duration,
    ) -> Option<Self> {
        Some(Self {
            last_scan_time: Some(completed_at),
            next_scan_time: Some(offset_by(completed_at, interval)?),
            total_scans: self.total_scans.saturating_add(1),
        })
    }

    pub fn is_due(&self, now: OffsetDateTime) -> bool {
        matches!(self.next_scan_time, Some(next) if now >= next)
    }
}

fn offset_by(at: OffsetDateTime, interval: std::time::Duration) -> Option<OffsetDateTime> {
    let interval = time::Duration::try_from(interval).ok()?;
    at.checked_add(interval)
}

/// Closed set of status filters offered to operators.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    #[default]
    All,
    Online,
    Offline,
}

impl StatusFilter {
    pub fn matches(self, status: Option<ProbeStatus>) -> bool {
        match self {
            StatusFilter::All => true,
            StatusFilter::Online => status == Some(ProbeStatus::Online),
            StatusFilter::Offline => status == Some(ProbeStatus::Offline),
        }
    }
}

/// Counts shown next to the address table.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SummaryStats {
    pub total: u64,
    pub online: u64,
    pub offline: u64,
    pub pending: u64,
}

impl SummaryStats {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a AddressRecord>) -> Self {
        let mut stats = SummaryStats::default();
        for record in records {
            stats.total += 1;
            match record.last_status {
                Some(ProbeStatus::Online) => stats.online += 1,
                Some(ProbeStatus::Offline) => stats.offline += 1,
                None => stats.pending += 1,
            }
        }
        stats
    }
}

/// Case-insensitive match of `query` against a record's address or notes.
pub fn record_matches(record: &AddressRecord, filter: StatusFilter, query: Option<&str>) -> bool {
    if !filter.matches(record.last_status) {
        return false;
    }
    match query.map(str::trim).filter(|q| !q.is_empty()) {
        None => true,
        Some(q) => {
            let q = q.to_lowercase();
            record.address.to_lowercase().contains(&q)
                || record
                    .notes
                    .as_deref()
                    .map(|n| n.to_lowercase().contains(&q))
                    .unwrap_or(false)
        }
    }
}
