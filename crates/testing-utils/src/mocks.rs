//! Mock implementations of the collaborator ports
//!
//! These in-memory doubles record every interaction so that tests can
//! assert on what the control plane asked its collaborators to do.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use orchestrator_domain::events::{DomainEvent, OrchestratorEvent};
use orchestrator_domain::models::PoolMetrics;
use orchestrator_domain::ports::{
    Clock, EventSink, MetricsSource, Ticker, WorkerFailureHandler, WorkerProvisioner,
    WorkerReleaser,
};
use orchestrator_errors::{OrchestratorError, OrchestratorResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Clock whose time only moves when the test advances it
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap();
        *now += duration;
    }

    pub fn advance_secs(&self, seconds: i64) {
        self.advance(Duration::seconds(seconds));
    }

    pub fn set(&self, time: DateTime<Utc>) {
        *self.now.lock().unwrap() = time;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// Event sink that keeps every published event in memory
#[derive(Debug, Clone, Default)]
pub struct RecordingEventSink {
    events: Arc<Mutex<Vec<OrchestratorEvent>>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OrchestratorEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.event_type().to_string())
            .collect()
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.event_type() == event_type)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

#[async_trait]
impl EventSink for RecordingEventSink {
    async fn publish(&self, event: OrchestratorEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Provisioner that hands out sequential ids and records every call
#[derive(Debug, Clone, Default)]
pub struct MockProvisioner {
    spawned: Arc<Mutex<Vec<(String, String)>>>,
    terminated: Arc<Mutex<Vec<String>>>,
    next_id: Arc<AtomicUsize>,
    fail_spawn: Arc<AtomicBool>,
    fail_terminate: Arc<AtomicBool>,
}

impl MockProvisioner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_spawn(&self, fail: bool) {
        self.fail_spawn.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_terminate(&self, fail: bool) {
        self.fail_terminate.store(fail, Ordering::SeqCst);
    }

    /// Ids returned by successful spawn calls
    pub fn spawned_ids(&self) -> Vec<String> {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn spawned_types(&self) -> Vec<String> {
        self.spawned
            .lock()
            .unwrap()
            .iter()
            .map(|(_, worker_type)| worker_type.clone())
            .collect()
    }

    pub fn terminated_ids(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerProvisioner for MockProvisioner {
    async fn spawn(&self, worker_type: &str) -> OrchestratorResult<String> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(OrchestratorError::provisioning("mock spawn failure"));
        }
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("mock-worker-{n}");
        self.spawned
            .lock()
            .unwrap()
            .push((id.clone(), worker_type.to_string()));
        Ok(id)
    }

    async fn terminate(&self, worker_id: &str) -> OrchestratorResult<()> {
        if self.fail_terminate.load(Ordering::SeqCst) {
            return Err(OrchestratorError::provisioning("mock terminate failure"));
        }
        self.terminated.lock().unwrap().push(worker_id.to_string());
        Ok(())
    }
}

/// Metrics source returning a queued sequence of samples, then the last one set
#[derive(Debug, Clone, Default)]
pub struct MockMetricsSource {
    queued: Arc<Mutex<VecDeque<Option<PoolMetrics>>>>,
    current: Arc<Mutex<Option<PoolMetrics>>>,
    samples: Arc<AtomicUsize>,
}

impl MockMetricsSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metrics(metrics: PoolMetrics) -> Self {
        let source = Self::default();
        source.set(Some(metrics));
        source
    }

    pub fn set(&self, metrics: Option<PoolMetrics>) {
        *self.current.lock().unwrap() = metrics;
    }

    pub fn push(&self, metrics: Option<PoolMetrics>) {
        self.queued.lock().unwrap().push_back(metrics);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsSource for MockMetricsSource {
    async fn sample(&self) -> Option<PoolMetrics> {
        self.samples.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.queued.lock().unwrap().pop_front() {
            return next;
        }
        self.current.lock().unwrap().clone()
    }
}

/// Failure handler that records which workers were reported
#[derive(Debug, Clone, Default)]
pub struct MockFailureHandler {
    failed_workers: Arc<Mutex<Vec<String>>>,
    requeued_per_call: Arc<AtomicUsize>,
}

impl MockFailureHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_requeued_count(count: usize) -> Self {
        let handler = Self::default();
        handler.requeued_per_call.store(count, Ordering::SeqCst);
        handler
    }

    pub fn failed_workers(&self) -> Vec<String> {
        self.failed_workers.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerFailureHandler for MockFailureHandler {
    async fn handle_worker_failure(&self, worker_id: &str) -> OrchestratorResult<usize> {
        self.failed_workers
            .lock()
            .unwrap()
            .push(worker_id.to_string());
        Ok(self.requeued_per_call.load(Ordering::SeqCst))
    }
}

/// Releaser that records `(worker_id, success)` for every call
#[derive(Debug, Clone, Default)]
pub struct MockWorkerReleaser {
    released: Arc<Mutex<Vec<(String, bool)>>>,
}

impl MockWorkerReleaser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn released(&self) -> Vec<(String, bool)> {
        self.released.lock().unwrap().clone()
    }
}

#[async_trait]
impl WorkerReleaser for MockWorkerReleaser {
    async fn release_worker(&self, worker_id: &str, success: bool) -> OrchestratorResult<bool> {
        self.released
            .lock()
            .unwrap()
            .push((worker_id.to_string(), success));
        Ok(true)
    }
}

/// Ticker driven explicitly by the test through a [`TickHandle`]
pub struct ManualTicker {
    ticks: mpsc::UnboundedReceiver<()>,
    ready: mpsc::UnboundedSender<()>,
}

/// Test side of a [`ManualTicker`]
pub struct TickHandle {
    ticks: mpsc::UnboundedSender<()>,
    ready: mpsc::UnboundedReceiver<()>,
    primed: bool,
}

impl ManualTicker {
    pub fn channel() -> (Self, TickHandle) {
        let (tick_tx, tick_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        (
            Self {
                ticks: tick_rx,
                ready: ready_tx,
            },
            TickHandle {
                ticks: tick_tx,
                ready: ready_rx,
                primed: false,
            },
        )
    }
}

#[async_trait]
impl Ticker for ManualTicker {
    async fn tick(&mut self) -> bool {
        let _ = self.ready.send(());
        self.ticks.recv().await.is_some()
    }
}

impl TickHandle {
    /// Fire one tick and wait until the loop has finished handling it
    ///
    /// Returns `false` if the loop is no longer running.
    pub async fn advance(&mut self) -> bool {
        if !self.primed {
            if self.ready.recv().await.is_none() {
                return false;
            }
            self.primed = true;
        }
        if self.ticks.send(()).is_err() {
            return false;
        }
        self.ready.recv().await.is_some()
    }

    /// Close the ticker; the loop observes `tick() == false`
    pub fn close(self) {
        drop(self);
    }
}
