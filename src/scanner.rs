use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::prober::Prober;
use crate::types::ProbeOutcome;

/// Default number of probes run side by side.
pub const DEFAULT_MAX_CONCURRENCY: usize = 30;

/// Upper bound applied to any requested concurrency.
const MAX_GROUP: usize = 1_000;

/// Probe every address, at most `max_concurrency` at a time.
///
/// - Addresses are split into groups of `max_concurrency`; a group runs fully in
///   parallel and the next group starts only after every probe in it has finished.
/// - Returns exactly one outcome per input address, in input order.
/// - A probe task that panics is reported as offline; the batch always completes.
///
/// There is no cap on the number of addresses. Callers are expected to enforce one.
pub async fn scan_all(
    prober: Arc<dyn Prober>,
    addresses: &[String],
    max_concurrency: usize,
) -> Vec<ProbeOutcome> {
    scan_all_internal(prober, addresses, max_concurrency, None).await
}

/// Variant that publishes progress counters while the batch runs.
pub async fn scan_all_with_progress(
    prober: Arc<dyn Prober>,
    addresses: &[String],
    max_concurrency: usize,
    progress: &ScanProgress,
) -> Vec<ProbeOutcome> {
    scan_all_internal(prober, addresses, max_concurrency, Some(progress)).await
}

/// Live counters for an in-flight batch.
#[derive(Clone, Debug, Default)]
pub struct ScanProgress {
    pub total: Arc<AtomicU64>,
    pub scanned: Arc<AtomicU64>,
    pub online: Arc<AtomicU64>,
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&self, total: usize) {
        self.total.store(total as u64, Ordering::Relaxed);
        self.scanned.store(0, Ordering::Relaxed);
        self.online.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total.load(Ordering::Relaxed),
            scanned: self.scanned.load(Ordering::Relaxed),
            online: self.online.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: &ProbeOutcome) {
        self.scanned.fetch_add(1, Ordering::Relaxed);
        if outcome.is_online() {
            self.online.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct ProgressSnapshot {
    pub total: u64,
    pub scanned: u64,
    pub online: u64,
}

async fn scan_all_internal(
    prober: Arc<dyn Prober>,
    addresses: &[String],
    max_concurrency: usize,
    progress: Option<&ScanProgress>,
) -> Vec<ProbeOutcome> {
    let group_size = max_concurrency.clamp(1, MAX_GROUP);
    let mut slots: Vec<Option<ProbeOutcome>> = vec![None; addresses.len()];

    for (group_no, group) in addresses.chunks(group_size).enumerate() {
        let base = group_no * group_size;
        let mut set = JoinSet::new();

        for (offset, address) in group.iter().enumerate() {
            let prober = prober.clone();
            let address = address.clone();
            set.spawn(async move {
                let outcome = prober.probe(&address).await;
                (base + offset, outcome)
            });
        }

        // Barrier: the whole group finishes before the next one starts
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, outcome)) => {
                    if let Some(p) = progress {
                        p.record(&outcome);
                    }
                    slots[idx] = Some(outcome);
                }
                Err(e) => warn!(error = %e, "probe task failed"),
            }
        }
        debug!(group = group_no, size = group.len(), "probe group finished");
    }

    slots
        .into_iter()
        .zip(addresses)
        .map(|(slot, address)| {
            slot.unwrap_or_else(|| {
                let outcome = ProbeOutcome::offline(address.as_str());
                if let Some(p) = progress {
                    p.record(&outcome);
                }
                outcome
            })
        })
        .collect()
}
