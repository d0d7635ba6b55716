//! Write-behind queue in front of the [`VectorStore`].
//!
//! Producers call [`SyncQueue::queue_store`] and [`SyncQueue::queue_delete`]
//! and return immediately. A single worker thread (`memvec-sync`) waits on a
//! signal channel and drains the queue in batches once the debounce deadline
//! passes or a flush is requested.
//!
//! At most one job is pending per record id; later writes replace earlier ones.
//! Failed jobs are retried a bounded number of times, and a circuit breaker
//! stops all processing for a while after repeated batch failures.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::errors::{MemvecError, MemvecResult};
use crate::vector_store::{MemoryNode, VectorStore};

/// Name of the worker thread.
pub const SYNC_THREAD_NAME: &str = "memvec-sync";

// ============================================================================
// SyncConfig
// ============================================================================

/// Queue tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Quiet period after the last enqueue before a batch runs.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Jobs per batch; reaching this many pending jobs skips the debounce.
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    /// Retries of a failed job before it is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Consecutive failed batches that open the circuit.
    #[serde(default = "default_circuit_threshold")]
    pub circuit_threshold: u32,

    /// How long an open circuit blocks processing.
    #[serde(default = "default_circuit_reset_ms")]
    pub circuit_reset_ms: u64,
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_max_batch_size() -> usize {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_circuit_threshold() -> u32 {
    5
}

fn default_circuit_reset_ms() -> u64 {
    30_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            max_batch_size: default_max_batch_size(),
            max_retries: default_max_retries(),
            circuit_threshold: default_circuit_threshold(),
            circuit_reset_ms: default_circuit_reset_ms(),
        }
    }
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn circuit_reset(&self) -> Duration {
        Duration::from_millis(self.circuit_reset_ms)
    }

    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.debounce_ms = debounce_ms;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_circuit(mut self, threshold: u32, reset_ms: u64) -> Self {
        self.circuit_threshold = threshold;
        self.circuit_reset_ms = reset_ms;
        self
    }

    /// Validate queue settings, returning warnings.
    pub fn validate(&self) -> MemvecResult<Vec<String>> {
        let mut warnings = Vec::new();

        if self.max_batch_size == 0 {
            return Err(MemvecError::invalid_configuration(
                "sync.maxBatchSize must be positive",
                "Set sync.maxBatchSize to at least 1.",
            ));
        }
        if self.circuit_threshold == 0 {
            return Err(MemvecError::invalid_configuration(
                "sync.circuitThreshold must be positive",
                "Set sync.circuitThreshold to at least 1.",
            ));
        }
        if self.debounce_ms > 60_000 {
            warnings.push(format!(
                "sync.debounceMs is {} ms: queued writes may wait over a minute",
                self.debounce_ms
            ));
        }

        Ok(warnings)
    }
}

// ============================================================================
// Jobs
// ============================================================================

/// Processing priority. Higher priorities run first within a batch.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Normal,
    Low,
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Normal => write!(f, "normal"),
            Self::Low => write!(f, "low"),
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(format!(
                "Unknown priority: '{}'. Use 'high', 'normal', or 'low'.",
                s
            )),
        }
    }
}

/// What a job does to its record.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOperation {
    Store(MemoryNode),
    Delete,
}

/// A pending write.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncJob {
    pub record_id: String,
    pub operation: SyncOperation,
    pub priority: Priority,
    pub enqueued_at: DateTime<Utc>,
    pub retry_count: u32,
    /// Enqueue order; ties within a priority run oldest first.
    pub seq: u64,
}

// ============================================================================
// Stats
// ============================================================================

/// Reported queue state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    #[default]
    Idle,
    Scheduled,
    Processing,
    CircuitOpen,
    Paused,
}

/// Snapshot of queue counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    pub state: SyncState,
    pub pending: usize,
    pub dirty: usize,
    pub total_queued: u64,
    pub total_processed: u64,
    pub total_succeeded: u64,
    /// Jobs dropped after exhausting their retries.
    pub total_failed: u64,
    pub total_retried: u64,
    pub batches: u64,
    pub consecutive_failures: u32,
    pub circuit_open: bool,
    pub last_error: Option<String>,
    pub last_sync: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Counters {
    total_queued: u64,
    total_processed: u64,
    total_succeeded: u64,
    total_failed: u64,
    total_retried: u64,
    batches: u64,
    last_error: Option<String>,
    last_sync: Option<DateTime<Utc>>,
}

// ============================================================================
// Circuit breaker
// ============================================================================

#[derive(Debug)]
struct CircuitBreaker {
    threshold: u32,
    reset_after: Duration,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
}

impl CircuitBreaker {
    fn new(threshold: u32, reset_after: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            reset_after,
            consecutive_failures: 0,
            opened_at: None,
        }
    }

    fn is_open(&self, now: Instant) -> bool {
        self.opened_at
            .is_some_and(|opened| now.duration_since(opened) < self.reset_after)
    }

    fn reopens_at(&self) -> Option<Instant> {
        self.opened_at.map(|opened| opened + self.reset_after)
    }

    /// Close the circuit once its reset period has elapsed. Returns true on that transition.
    fn try_close(&mut self, now: Instant) -> bool {
        match self.opened_at {
            Some(_) if !self.is_open(now) => {
                self.opened_at = None;
                self.consecutive_failures = 0;
                true
            }
            _ => false,
        }
    }

    fn record_success(&mut self) {
        self.consecutive_failures = 0;
        self.opened_at = None;
    }

    /// Count a failed batch. Returns true when this failure opened the circuit.
    fn record_failure(&mut self, now: Instant) -> bool {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= self.threshold && self.opened_at.is_none() {
            self.opened_at = Some(now);
            return true;
        }
        false
    }
}

// ============================================================================
// Shared state
// ============================================================================

#[derive(Debug)]
struct QueueState {
    jobs: HashMap<String, SyncJob>,
    dirty: HashSet<String>,
    next_seq: u64,
    /// Mirrors whether the worker holds a pending run.
    scheduled: bool,
    processing: bool,
    paused: bool,
    shutdown: bool,
    circuit: CircuitBreaker,
    counters: Counters,
}

impl QueueState {
    /// Insert a job or collapse it into the pending one for the same id.
    fn enqueue(&mut self, record_id: String, operation: SyncOperation, priority: Priority) {
        self.counters.total_queued += 1;
        self.dirty.insert(record_id.clone());

        if let Some(job) = self.jobs.get_mut(&record_id) {
            job.operation = operation;
            job.priority = job.priority.min(priority);
            job.enqueued_at = Utc::now();
            job.retry_count = 0;
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.jobs.insert(
            record_id.clone(),
            SyncJob {
                record_id,
                operation,
                priority,
                enqueued_at: Utc::now(),
                retry_count: 0,
                seq,
            },
        );
    }

    /// Remove up to `max` jobs, highest priority first, then oldest first.
    fn take_batch(&mut self, max: usize) -> Vec<SyncJob> {
        let mut order: Vec<(Priority, u64, String)> = self
            .jobs
            .values()
            .map(|job| (job.priority, job.seq, job.record_id.clone()))
            .collect();
        order.sort();
        order
            .into_iter()
            .take(max)
            .filter_map(|(_, _, id)| self.jobs.remove(&id))
            .collect()
    }

    /// Apply batch outcomes. Returns true when any job was re-queued for retry.
    fn finish_batch(
        &mut self,
        outcomes: Vec<(SyncJob, Result<(), String>)>,
        max_retries: u32,
        now: Instant,
    ) -> bool {
        let mut succeeded = 0usize;
        let mut failed = 0usize;
        let mut requeued = false;

        for (mut job, outcome) in outcomes {
            self.counters.total_processed += 1;
            let superseded = self.jobs.contains_key(&job.record_id);
            match outcome {
                Ok(()) => {
                    succeeded += 1;
                    self.counters.total_succeeded += 1;
                    if !superseded {
                        self.dirty.remove(&job.record_id);
                    }
                }
                Err(error) => {
                    failed += 1;
                    if superseded {
                        debug!(
                            "Failed job for '{}' superseded by a newer write",
                            job.record_id
                        );
                    } else if job.retry_count < max_retries {
                        job.retry_count += 1;
                        self.counters.total_retried += 1;
                        requeued = true;
                        self.jobs.insert(job.record_id.clone(), job);
                    } else {
                        self.counters.total_failed += 1;
                        warn!(
                            "Dropping sync job for '{}' after {} retries: {}",
                            job.record_id, job.retry_count, error
                        );
                    }
                    self.counters.last_error = Some(error);
                }
            }
        }

        self.counters.batches += 1;
        self.counters.last_sync = Some(Utc::now());

        if succeeded == 0 && failed > 0 {
            if self.circuit.record_failure(now) {
                warn!(
                    "Sync circuit opened after {} failed batches; pausing for {:?}",
                    self.circuit.consecutive_failures, self.circuit.reset_after
                );
            }
        } else if succeeded > 0 {
            self.circuit.record_success();
        }

        debug!(
            "Sync batch: {} succeeded, {} failed, {} pending",
            succeeded,
            failed,
            self.jobs.len()
        );
        requeued
    }

    fn state(&self, now: Instant) -> SyncState {
        if self.processing {
            SyncState::Processing
        } else if self.paused {
            SyncState::Paused
        } else if self.circuit.is_open(now) {
            SyncState::CircuitOpen
        } else if self.scheduled {
            SyncState::Scheduled
        } else {
            SyncState::Idle
        }
    }

    fn stats(&self) -> SyncStats {
        let now = Instant::now();
        SyncStats {
            state: self.state(now),
            pending: self.jobs.len(),
            dirty: self.dirty.len(),
            total_queued: self.counters.total_queued,
            total_processed: self.counters.total_processed,
            total_succeeded: self.counters.total_succeeded,
            total_failed: self.counters.total_failed,
            total_retried: self.counters.total_retried,
            batches: self.counters.batches,
            consecutive_failures: self.circuit.consecutive_failures,
            circuit_open: self.circuit.is_open(now),
            last_error: self.counters.last_error.clone(),
            last_sync: self.counters.last_sync,
        }
    }
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Messages from the queue handle to the worker.
#[derive(Debug)]
enum Signal {
    /// Run a batch after the delay. Zero means now.
    Arm(Duration),
    /// Drain everything, then acknowledge on the enclosed channel.
    Flush(Sender<()>),
    Shutdown,
}

/// The worker's next planned run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Schedule {
    at: Instant,
    immediate: bool,
}

impl Schedule {
    fn after(delay: Duration, now: Instant) -> Self {
        Self {
            at: now + delay,
            immediate: delay.is_zero(),
        }
    }

    /// Fold a new arm request into the pending run.
    ///
    /// A debounce re-arm replaces a pending debounce, but never postpones a
    /// pending immediate run.
    fn merge(current: Option<Self>, delay: Duration, now: Instant) -> Self {
        let requested = Self::after(delay, now);
        match current {
            Some(pending) if pending.immediate && !requested.immediate => pending,
            _ => requested,
        }
    }
}

// ============================================================================
// SyncQueue
// ============================================================================

/// Debounced, batched, retrying write-behind queue.
pub struct SyncQueue {
    shared: Arc<Shared>,
    signals: Sender<Signal>,
    config: SyncConfig,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for SyncQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncQueue")
            .field("config", &self.config)
            .finish()
    }
}

impl SyncQueue {
    /// Start a queue and its worker thread in front of `store`.
    ///
    /// # Errors
    ///
    /// [`MemvecError::InvalidConfiguration`] for invalid settings,
    /// [`MemvecError::Io`] when the worker thread cannot be spawned.
    pub fn new(store: Arc<VectorStore>, config: SyncConfig) -> MemvecResult<Self> {
        for warning in config.validate()? {
            warn!("Config warning: {}", warning);
        }

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                jobs: HashMap::new(),
                dirty: HashSet::new(),
                next_seq: 0,
                scheduled: false,
                processing: false,
                paused: false,
                shutdown: false,
                circuit: CircuitBreaker::new(config.circuit_threshold, config.circuit_reset()),
                counters: Counters::default(),
            }),
        });
        let (signals, receiver) = unbounded();

        let worker = Worker {
            shared: Arc::clone(&shared),
            signals: receiver,
            store,
            config: config.clone(),
        };
        let handle = std::thread::Builder::new()
            .name(SYNC_THREAD_NAME.to_string())
            .spawn(move || worker.run())?;

        Ok(Self {
            shared,
            signals,
            config,
            worker: Mutex::new(Some(handle)),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Queue a store. Returns the record id, assigning one when the node has none.
    pub fn queue_store(&self, mut node: MemoryNode, priority: Priority) -> String {
        let record_id = node.ensure_id().to_string();
        let mut state = self.shared.lock();
        state.enqueue(record_id.clone(), SyncOperation::Store(node), priority);
        self.schedule(&mut state, priority);
        record_id
    }

    /// Queue a delete. Cancels any pending store for the same id.
    pub fn queue_delete(&self, record_id: impl Into<String>) {
        let mut state = self.shared.lock();
        state.enqueue(record_id.into(), SyncOperation::Delete, Priority::Normal);
        self.schedule(&mut state, Priority::Normal);
    }

    fn schedule(&self, state: &mut QueueState, priority: Priority) {
        if priority == Priority::High || state.jobs.len() >= self.config.max_batch_size {
            if self.arm(state, Duration::ZERO) {
                debug!("Sync scheduled immediately ({} pending)", state.jobs.len());
            }
        } else {
            self.arm(state, self.config.debounce());
        }
    }

    /// Ask the worker for a run after `delay`. Returns false when nothing was armed.
    fn arm(&self, state: &mut QueueState, delay: Duration) -> bool {
        if state.paused || state.shutdown {
            return false;
        }
        if state.circuit.is_open(Instant::now()) {
            // The worker waits for the reset instant once it knows jobs are pending.
            let _ = self.signals.send(Signal::Arm(delay));
            return false;
        }
        if self.signals.send(Signal::Arm(delay)).is_err() {
            return false;
        }
        state.scheduled = true;
        true
    }

    /// (Re-)arm the debounce deadline. No-op while paused or while the circuit is open.
    pub fn schedule_sync(&self) -> bool {
        let mut state = self.shared.lock();
        self.arm(&mut state, self.config.debounce())
    }

    /// Drain the queue now and wait for it to finish.
    ///
    /// Runs even while paused. No-op while the circuit is open or after shutdown.
    pub fn sync_now(&self) -> SyncStats {
        {
            let state = self.shared.lock();
            if state.shutdown || state.circuit.is_open(Instant::now()) {
                return state.stats();
            }
        }

        let (done, drained) = bounded(1);
        if self.signals.send(Signal::Flush(done)).is_ok() {
            // Disconnected means the worker is gone; report what is left.
            let _ = drained.recv();
        }
        self.get_stats()
    }

    /// Stop scheduled processing. Jobs keep accumulating.
    pub fn pause(&self) {
        let mut state = self.shared.lock();
        state.paused = true;
        info!("Sync queue paused ({} pending)", state.jobs.len());
    }

    /// Resume scheduled processing, arming the debounce if work is pending.
    pub fn resume(&self) {
        let mut state = self.shared.lock();
        state.paused = false;
        if !state.jobs.is_empty() {
            self.arm(&mut state, self.config.debounce());
        }
        info!("Sync queue resumed ({} pending)", state.jobs.len());
    }

    pub fn get_stats(&self) -> SyncStats {
        self.shared.lock().stats()
    }

    /// Whether `record_id` has writes not yet confirmed by the store.
    pub fn is_dirty(&self, record_id: &str) -> bool {
        self.shared.lock().dirty.contains(record_id)
    }

    /// Flush remaining work and stop the worker. Idempotent.
    pub fn shutdown(&self) {
        self.shared.lock().shutdown = true;
        let _ = self.signals.send(Signal::Shutdown);

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Sync worker panicked");
            }
        }
    }
}

impl Drop for SyncQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Worker
// ============================================================================

struct Worker {
    shared: Arc<Shared>,
    signals: Receiver<Signal>,
    store: Arc<VectorStore>,
    config: SyncConfig,
}

impl Worker {
    fn run(self) {
        debug!("Sync worker started");
        let mut next: Option<Schedule> = None;

        loop {
            let received = match self.wake_at(next) {
                Some(at) => self.signals.recv_deadline(at),
                None => self
                    .signals
                    .recv()
                    .map_err(|_| RecvTimeoutError::Disconnected),
            };

            next = match received {
                Ok(Signal::Arm(delay)) => Some(Schedule::merge(next, delay, Instant::now())),
                Ok(Signal::Flush(done)) => {
                    let next = self.drain();
                    let _ = done.send(());
                    next
                }
                Ok(Signal::Shutdown) | Err(RecvTimeoutError::Disconnected) => {
                    self.drain();
                    self.final_flush();
                    self.shared.lock().scheduled = false;
                    break;
                }
                Err(RecvTimeoutError::Timeout) => self.tick(next),
            };
            self.shared.lock().scheduled = next.is_some();
        }
        debug!("Sync worker stopped");
    }

    fn final_flush(&self) {
        if self.shared.lock().counters.batches == 0 {
            return;
        }
        if let Err(e) = self.store.flush() {
            warn!("Final flush failed: {}", e);
        }
    }

    /// When to stop waiting for signals. `None` blocks until the next one.
    fn wake_at(&self, next: Option<Schedule>) -> Option<Instant> {
        let state = self.shared.lock();
        if state.paused {
            return None;
        }
        // An opened circuit stays tripped until `tick` closes it.
        if let Some(reopen) = state.circuit.reopens_at() {
            return (!state.jobs.is_empty()).then_some(reopen);
        }
        next.map(|schedule| schedule.at)
    }

    /// Handle a timed wake-up: close an expired circuit, run a due batch.
    fn tick(&self, next: Option<Schedule>) -> Option<Schedule> {
        let now = Instant::now();
        let closed = {
            let mut state = self.shared.lock();
            let closed = state.circuit.try_close(now);
            if closed {
                info!("Sync circuit closed");
            }
            if state.paused || state.circuit.is_open(now) {
                return next;
            }
            if state.jobs.is_empty() {
                return None;
            }
            closed
        };

        let due = closed || next.is_some_and(|schedule| schedule.at <= now);
        if !due {
            return next;
        }
        self.process_batch();
        self.rearm()
    }

    /// Run batches until the queue is empty, the circuit opens, or a job is re-queued.
    fn drain(&self) -> Option<Schedule> {
        loop {
            {
                let state = self.shared.lock();
                if state.jobs.is_empty() || state.circuit.is_open(Instant::now()) {
                    break;
                }
            }
            if self.process_batch() {
                break;
            }
        }
        self.rearm()
    }

    /// Debounce leftover work unless the queue cannot run it yet.
    fn rearm(&self) -> Option<Schedule> {
        let state = self.shared.lock();
        let now = Instant::now();
        if state.jobs.is_empty() || state.paused || state.shutdown || state.circuit.is_open(now) {
            return None;
        }
        Some(Schedule::after(self.config.debounce(), now))
    }

    /// Take one batch, run it with the lock released, and record the outcome.
    ///
    /// Returns true when any job was re-queued for retry.
    fn process_batch(&self) -> bool {
        let jobs = {
            let mut state = self.shared.lock();
            state.processing = true;
            state.take_batch(self.config.max_batch_size)
        };

        let outcomes = self.execute(jobs);

        let mut state = self.shared.lock();
        state.processing = false;
        state.finish_batch(outcomes, self.config.max_retries, Instant::now())
    }

    /// Run jobs in order: consecutive stores as one batch, deletes one by one.
    fn execute(&self, jobs: Vec<SyncJob>) -> Vec<(SyncJob, Result<(), String>)> {
        let mut outcomes = Vec::with_capacity(jobs.len());
        let mut stores: Vec<SyncJob> = Vec::new();

        for job in jobs {
            match job.operation {
                SyncOperation::Store(_) => stores.push(job),
                SyncOperation::Delete => {
                    self.store_run(&mut stores, &mut outcomes);
                    let outcome = self
                        .store
                        .delete(&job.record_id)
                        .map(|_| ())
                        .map_err(|e| e.to_string());
                    outcomes.push((job, outcome));
                }
            }
        }
        self.store_run(&mut stores, &mut outcomes);
        outcomes
    }

    fn store_run(
        &self,
        stores: &mut Vec<SyncJob>,
        outcomes: &mut Vec<(SyncJob, Result<(), String>)>,
    ) {
        if stores.is_empty() {
            return;
        }
        let jobs = std::mem::take(stores);
        let nodes: Vec<MemoryNode> = jobs
            .iter()
            .filter_map(|job| match &job.operation {
                SyncOperation::Store(node) => Some(node.clone()),
                SyncOperation::Delete => None,
            })
            .collect();

        match self.store.store_batch(nodes) {
            Ok(result) => {
                for job in jobs {
                    let outcome = match result.failures.iter().find(|f| f.id == job.record_id) {
                        Some(failure) => Err(failure.error.clone()),
                        None => Ok(()),
                    };
                    outcomes.push((job, outcome));
                }
            }
            Err(e) => {
                let error = e.to_string();
                outcomes.extend(jobs.into_iter().map(|job| (job, Err(error.clone()))));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_state() -> QueueState {
        QueueState {
            jobs: HashMap::new(),
            dirty: HashSet::new(),
            next_seq: 0,
            scheduled: false,
            processing: false,
            paused: false,
            shutdown: false,
            circuit: CircuitBreaker::new(2, Duration::from_millis(50)),
            counters: Counters::default(),
        }
    }

    #[test]
    fn test_priority_order_and_parsing() {
        assert!(Priority::High < Priority::Normal);
        assert!(Priority::Normal < Priority::Low);
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert!("urgent".parse::<Priority>().is_err());
        assert_eq!(Priority::Low.to_string(), "low");
    }

    #[test]
    fn test_last_write_wins_collapse() {
        let mut state = job_state();
        state.enqueue(
            "a".into(),
            SyncOperation::Store(MemoryNode::new("one").with_id("a")),
            Priority::Low,
        );
        state.enqueue(
            "a".into(),
            SyncOperation::Store(MemoryNode::new("two").with_id("a")),
            Priority::High,
        );
        assert_eq!(state.jobs.len(), 1);
        let job = &state.jobs["a"];
        assert_eq!(job.priority, Priority::High);
        assert!(matches!(&job.operation, SyncOperation::Store(n) if n.content == "two"));

        state.enqueue("a".into(), SyncOperation::Delete, Priority::Normal);
        assert_eq!(state.jobs["a"].operation, SyncOperation::Delete);
        assert_eq!(state.counters.total_queued, 3);
    }

    #[test]
    fn test_take_batch_orders_by_priority_then_seq() {
        let mut state = job_state();
        for (id, priority) in [
            ("a", Priority::Low),
            ("b", Priority::Normal),
            ("c", Priority::High),
            ("d", Priority::Normal),
        ] {
            state.enqueue(id.into(), SyncOperation::Delete, priority);
        }
        let ids: Vec<String> = state
            .take_batch(3)
            .into_iter()
            .map(|j| j.record_id)
            .collect();
        assert_eq!(ids, vec!["c", "b", "d"]);
        assert_eq!(state.jobs.len(), 1);
    }

    #[test]
    fn test_failed_jobs_retry_then_drop() {
        let mut state = job_state();
        state.enqueue("a".into(), SyncOperation::Delete, Priority::Normal);
        let now = Instant::now();

        let batch = state.take_batch(10);
        let outcomes = batch.into_iter().map(|j| (j, Err("boom".into()))).collect();
        assert!(state.finish_batch(outcomes, 1, now));
        assert_eq!(state.jobs["a"].retry_count, 1);

        let batch = state.take_batch(10);
        let outcomes = batch.into_iter().map(|j| (j, Err("boom".into()))).collect();
        assert!(!state.finish_batch(outcomes, 1, now));
        assert!(state.jobs.is_empty());
        assert_eq!(state.counters.total_failed, 1);
        assert!(state.dirty.contains("a"));
        assert!(state.circuit.is_open(now));
    }

    #[test]
    fn test_circuit_breaker_closes_after_reset() {
        let mut circuit = CircuitBreaker::new(2, Duration::from_millis(50));
        let start = Instant::now();
        assert!(!circuit.record_failure(start));
        assert!(circuit.record_failure(start));
        assert!(circuit.is_open(start));
        assert!(!circuit.try_close(start));

        let later = start + Duration::from_millis(60);
        assert!(!circuit.is_open(later));
        assert!(circuit.try_close(later));
        assert_eq!(circuit.consecutive_failures, 0);

        circuit.record_failure(later);
        circuit.record_success();
        assert_eq!(circuit.consecutive_failures, 0);
    }

    #[test]
    fn test_debounce_never_postpones_immediate_run() {
        let now = Instant::now();
        let debounce = Duration::from_secs(5);

        let immediate = Schedule::merge(None, Duration::ZERO, now);
        assert!(immediate.immediate);
        let merged = Schedule::merge(Some(immediate), debounce, now + Duration::from_millis(1));
        assert_eq!(merged, immediate);

        let debounced = Schedule::merge(None, debounce, now);
        let rearmed = Schedule::merge(Some(debounced), debounce, now + Duration::from_secs(1));
        assert_eq!(rearmed.at, now + Duration::from_secs(6));

        let promoted = Schedule::merge(Some(debounced), Duration::ZERO, now);
        assert!(promoted.immediate);
        assert_eq!(promoted.at, now);
    }

    #[test]
    fn test_config_validation() {
        assert!(SyncConfig::default().validate().unwrap().is_empty());
        let config = SyncConfig {
            max_batch_size: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
        let slow = SyncConfig::default().with_debounce_ms(120_000);
        assert_eq!(slow.validate().unwrap().len(), 1);
    }
}
