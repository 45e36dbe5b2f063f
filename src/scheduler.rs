use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::addrparse::{check_probe_request, is_valid_ipv4};
use crate::config::{Config, DEFAULT_MAX_ADDRESSES_PER_REQUEST};
use crate::cycle::CycleStore;
use crate::error::{CoreError, InputError, StoreError};
use crate::history::{HistoryStore, DEFAULT_HISTORY_CAP};
use crate::prober::Prober;
use crate::scanner::{self, ProgressSnapshot, ScanProgress, DEFAULT_MAX_CONCURRENCY};
use crate::store::RecordRepository;
use crate::types::{CycleState, ProbeOutcome};

/// Source of wall-clock time for cycle bookkeeping.
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub cycle_interval: Duration,
    pub max_concurrency: usize,
    pub history_cap: usize,
    pub max_addresses_per_request: usize,
    pub tick_period: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_interval: Duration::from_secs(10 * 60),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            history_cap: DEFAULT_HISTORY_CAP,
            max_addresses_per_request: DEFAULT_MAX_ADDRESSES_PER_REQUEST,
            tick_period: Duration::from_secs(1),
        }
    }
}

impl From<&Config> for SchedulerConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            cycle_interval: cfg.cycle_interval(),
            max_concurrency: cfg.max_concurrency,
            history_cap: cfg.history_cap,
            max_addresses_per_request: cfg.max_addresses_per_request,
            tick_period: cfg.tick_period(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerState {
    Idle,
    Scanning,
}

/// What a single tick (or forced run) did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// First observation of an empty cycle state; a schedule was written.
    Bootstrapped(CycleState),
    NotDue,
    /// Another cycle is in flight.
    Busy,
    /// Due, but nothing is registered. The schedule is left as is.
    SkippedEmpty,
    Completed(CycleReport),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub outcomes: Vec<ProbeOutcome>,
    pub online: usize,
    pub offline: usize,
    pub failed_writes: usize,
    pub cycle: CycleState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    pub state: SchedulerState,
    pub cycle: CycleState,
    pub progress: ProgressSnapshot,
}

/// Raised while a batch is in flight; lowered on every exit path.
struct ScanningFlag<'a>(&'a AtomicBool);

impl<'a> ScanningFlag<'a> {
    fn raise(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ScanningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Drives recurring scan cycles over every registered address.
///
/// All reads and writes of the cycle state happen while holding `cycle_lock`. A tick
/// that cannot take the lock reports [`TickOutcome::Busy`] and does nothing else.
pub struct ScanScheduler {
    config: SchedulerConfig,
    records: Arc<dyn RecordRepository>,
    cycles: Arc<dyn CycleStore>,
    prober: Arc<dyn Prober>,
    history: HistoryStore,
    clock: Arc<dyn Clock>,
    cycle_lock: Mutex<()>,
    scanning: AtomicBool,
    progress: ScanProgress,
}

impl ScanScheduler {
    pub fn new(
        config: SchedulerConfig,
        records: Arc<dyn RecordRepository>,
        cycles: Arc<dyn CycleStore>,
        prober: Arc<dyn Prober>,
    ) -> Self {
        let history = HistoryStore::new(records.clone(), config.history_cap);
        Self {
            config,
            records,
            cycles,
            prober,
            history,
            clock: Arc::new(SystemClock),
            cycle_lock: Mutex::new(()),
            scanning: AtomicBool::new(false),
            progress: ScanProgress::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn records(&self) -> &Arc<dyn RecordRepository> {
        &self.records
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn state(&self) -> SchedulerState {
        if self.scanning.load(Ordering::SeqCst) {
            SchedulerState::Scanning
        } else {
            SchedulerState::Idle
        }
    }

    pub async fn status(&self) -> Result<SchedulerStatus, StoreError> {
        Ok(SchedulerStatus {
            state: self.state(),
            cycle: self.cycles.load().await?,
            progress: self.progress.snapshot(),
        })
    }

    /// One scheduler step: bootstrap the schedule, or run a cycle when it is due.
    pub async fn tick(&self) -> Result<TickOutcome, CoreError> {
        let Ok(_cycle) = self.cycle_lock.try_lock() else {
            return Ok(TickOutcome::Busy);
        };

        let state = self.cycles.load().await?;
        let now = self.clock.now();

        if state.next_scan_time.is_none() {
            let scheduled = state
                .bootstrapped(now, self.config.cycle_interval)
                .ok_or_else(|| self.out_of_range())?;
            self.cycles.save(&scheduled).await?;
            if let Some(next) = scheduled.next_scan_time {
                info!(next_scan = %next, "scan schedule initialized");
            }
            return Ok(TickOutcome::Bootstrapped(scheduled));
        }

        if !state.is_due(now) {
            return Ok(TickOutcome::NotDue);
        }

        self.run_cycle_locked().await
    }

    /// Run a full cycle right away, regardless of the schedule.
    ///
    /// The cycle state advances exactly as for a scheduled cycle.
    pub async fn run_now(&self) -> Result<TickOutcome, CoreError> {
        let Ok(_cycle) = self.cycle_lock.try_lock() else {
            return Ok(TickOutcome::Busy);
        };
        self.run_cycle_locked().await
    }

    /// Caller must hold `cycle_lock`.
    async fn run_cycle_locked(&self) -> Result<TickOutcome, CoreError> {
        let addresses: Vec<String> = self
            .records
            .list_all()
            .await?
            .into_iter()
            .map(|r| r.address)
            .collect();
        if addresses.is_empty() {
            debug!("scan due but no addresses registered");
            return Ok(TickOutcome::SkippedEmpty);
        }

        let _scanning = ScanningFlag::raise(&self.scanning);
        info!(count = addresses.len(), "scan cycle started");

        self.progress.reset(addresses.len());
        let outcomes = scanner::scan_all_with_progress(
            self.prober.clone(),
            &addresses,
            self.config.max_concurrency,
            &self.progress,
        )
        .await;

        let completed_at = self.clock.now();
        let mut failed_writes = 0usize;
        for outcome in &outcomes {
            if let Err(e) = self.history.record(outcome, completed_at).await {
                failed_writes += 1;
                warn!(address = %outcome.address, error = %e, "failed to persist probe result");
            }
        }
        if failed_writes == outcomes.len() {
            error!(total = outcomes.len(), "no probe result persisted; cycle not advanced");
            return Err(CoreError::CycleNotPersisted {
                total: outcomes.len(),
            });
        }

        let cycle = self
            .cycles
            .load()
            .await?
            .advanced(completed_at, self.config.cycle_interval)
            .ok_or_else(|| self.out_of_range())?;
        self.cycles.save(&cycle).await?;

        let online = outcomes.iter().filter(|o| o.is_online()).count();
        let report = CycleReport {
            offline: outcomes.len() - online,
            online,
            failed_writes,
            cycle,
            outcomes,
        };
        info!(
            online = report.online,
            offline = report.offline,
            failed_writes,
            total_scans = cycle.total_scans,
            "scan cycle completed"
        );
        Ok(TickOutcome::Completed(report))
    }

    fn out_of_range(&self) -> CoreError {
        CoreError::ScheduleOutOfRange {
            interval_secs: self.config.cycle_interval.as_secs(),
        }
    }

    /// Operator-initiated probe of one address. Independent of the cycle state.
    ///
    /// The result is recorded when the address is registered and returned either way.
    pub async fn probe_one(&self, address: &str) -> Result<ProbeOutcome, CoreError> {
        if !is_valid_ipv4(address) {
            return Err(InputError::InvalidAddresses(vec![address.to_string()]).into());
        }
        let outcome = self.prober.probe(address).await;
        self.history.record(&outcome, self.clock.now()).await?;
        Ok(outcome)
    }

    /// Operator-initiated probe of an explicit list. Independent of the cycle state.
    pub async fn probe_batch(&self, addresses: &[String]) -> Result<Vec<ProbeOutcome>, CoreError> {
        check_probe_request(addresses, self.config.max_addresses_per_request)?;
        if addresses.is_empty() {
            return Ok(Vec::new());
        }

        info!(count = addresses.len(), "bulk probe started");
        let outcomes =
            scanner::scan_all(self.prober.clone(), addresses, self.config.max_concurrency).await;

        let at = self.clock.now();
        let mut last_err = None;
        let mut failed = 0usize;
        for outcome in &outcomes {
            if let Err(e) = self.history.record(outcome, at).await {
                warn!(address = %outcome.address, error = %e, "failed to persist probe result");
                failed += 1;
                last_err = Some(e);
            }
        }
        match last_err {
            Some(e) if failed == outcomes.len() => Err(e.into()),
            _ => Ok(outcomes),
        }
    }

    /// Tick until `cancel` fires. A cycle that has started always runs to completion.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut timer = interval(self.config.tick_period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            interval_secs = self.config.cycle_interval.as_secs(),
            concurrency = self.config.max_concurrency,
            "scheduler started"
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            if let Err(e) = self.tick().await {
                error!(error = %e, "scan tick failed");
            }
        }
        info!("scheduler stopped");
    }
}
