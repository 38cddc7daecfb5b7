//! Periodic reconciliation loop
//!
//! A scheduler owns at most one background loop. The loop runs a pass on
//! every interval tick and on demand. Passes never overlap: each one is
//! awaited before the next `select!`, and a pass guard shared by every loop
//! the scheduler spawns keeps a restarted loop from running while a stopped
//! one is still finishing its last pass.

use async_trait::async_trait;
use flume::{Receiver, Sender};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::services::logger::fmt_ms;
use crate::types::error::Result;

/// What a pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub processed: usize,
    pub failed: usize,
}

/// One idempotent reconciliation pass
#[async_trait]
pub trait Reconcile: Send + Sync {
    async fn reconcile(&self) -> Result<PassSummary>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchedulerCommand {
    PollNow,
    Shutdown,
}

struct RunningLoop {
    handle: JoinHandle<()>,
    commands: Sender<SchedulerCommand>,
}

pub struct ReconciliationScheduler {
    name: &'static str,
    interval: Duration,
    running: Mutex<Option<RunningLoop>>,
    pass_guard: Arc<AsyncMutex<()>>,
    passes: Arc<AtomicU64>,
}

impl ReconciliationScheduler {
    pub fn new(name: &'static str, interval: Duration) -> Self {
        Self {
            name,
            interval,
            running: Mutex::new(None),
            pass_guard: Arc::new(AsyncMutex::new(())),
            passes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn the loop; the first pass runs immediately.
    ///
    /// Returns `false` without doing anything when a loop is already running.
    pub fn start(&self, task: Arc<dyn Reconcile>) -> bool {
        let mut running = self.running.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(current) = running.as_ref() {
            if !current.handle.is_finished() {
                debug!("{} scheduler already running", self.name);
                return false;
            }
        }

        let (tx, rx) = flume::unbounded();
        let handle = tokio::spawn(run_loop(
            self.name,
            self.interval,
            task,
            rx,
            self.pass_guard.clone(),
            self.passes.clone(),
        ));

        info!(
            "Started {} scheduler (interval: {:?})",
            self.name, self.interval
        );
        *running = Some(RunningLoop {
            handle,
            commands: tx,
        });
        true
    }

    /// Ask the loop to exit after any pass in flight; `false` if not running.
    ///
    /// A new loop may be started right away; its first pass waits for the
    /// old loop's pass to finish.
    pub fn stop(&self) -> bool {
        let current = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        match current {
            Some(current) => {
                let _ = current.commands.send(SchedulerCommand::Shutdown);
                info!("Stopping {} scheduler", self.name);
                true
            }
            None => false,
        }
    }

    /// Stop and wait until the loop has exited
    pub async fn shutdown(&self) {
        let current = self
            .running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();

        if let Some(current) = current {
            let _ = current.commands.send(SchedulerCommand::Shutdown);
            if let Err(e) = current.handle.await {
                error!("{} scheduler task ended abnormally: {}", self.name, e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|current| !current.handle.is_finished())
            .unwrap_or(false)
    }

    /// Run a pass now instead of waiting for the next tick
    pub fn poll_now(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|current| current.commands.send(SchedulerCommand::PollNow).is_ok())
            .unwrap_or(false)
    }

    /// Completed passes since creation, across restarts
    pub fn pass_count(&self) -> u64 {
        self.passes.load(Ordering::SeqCst)
    }
}

impl Drop for ReconciliationScheduler {
    fn drop(&mut self) {
        if let Some(current) = self
            .running
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            let _ = current.commands.send(SchedulerCommand::Shutdown);
        }
    }
}

async fn run_loop(
    name: &'static str,
    interval: Duration,
    task: Arc<dyn Reconcile>,
    commands: Receiver<SchedulerCommand>,
    pass_guard: Arc<AsyncMutex<()>>,
    passes: Arc<AtomicU64>,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        // Commands first, so a stop sent during a pass wins over a due tick.
        tokio::select! {
            biased;
            command = commands.recv_async() => match command {
                Ok(SchedulerCommand::PollNow) => debug!("{} pass requested", name),
                Ok(SchedulerCommand::Shutdown) | Err(_) => break,
            },
            _ = ticker.tick() => {}
        }

        let _guard = pass_guard.lock().await;
        let started = Instant::now();
        match task.reconcile().await {
            Ok(summary) => {
                let count = passes.fetch_add(1, Ordering::SeqCst) + 1;
                if summary.processed > 0 {
                    info!(
                        "{} pass #{}: {} processed, {} failed in {}",
                        name,
                        count,
                        summary.processed,
                        summary.failed,
                        fmt_ms(started.elapsed())
                    );
                } else {
                    debug!("{} pass #{}: nothing to do", name, count);
                }
            }
            Err(e) => error!("{} pass failed: {}", name, e),
        }
    }

    info!("{} scheduler stopped", name);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingPass {
        runs: AtomicU64,
    }

    #[async_trait]
    impl Reconcile for CountingPass {
        async fn reconcile(&self) -> Result<PassSummary> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(PassSummary::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_immediately_then_on_interval() {
        let pass = Arc::new(CountingPass::default());
        let scheduler = ReconciliationScheduler::new("test", Duration::from_secs(60));

        assert!(scheduler.start(pass.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(pass.runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(pass.runs.load(Ordering::SeqCst), 2);

        scheduler.shutdown().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_start_is_a_no_op() {
        let pass = Arc::new(CountingPass::default());
        let scheduler = ReconciliationScheduler::new("test", Duration::from_secs(60));

        assert!(scheduler.start(pass.clone()));
        assert!(!scheduler.start(pass.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Only one loop, so only one immediate pass.
        assert_eq!(pass.runs.load(Ordering::SeqCst), 1);
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_allows_restart() {
        let pass = Arc::new(CountingPass::default());
        let scheduler = ReconciliationScheduler::new("test", Duration::from_secs(60));

        assert!(scheduler.start(pass.clone()));
        assert!(scheduler.stop());
        assert!(!scheduler.stop());
        assert!(!scheduler.is_running());

        assert!(scheduler.start(pass.clone()));
        assert!(scheduler.is_running());
        scheduler.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_now_runs_an_extra_pass() {
        let pass = Arc::new(CountingPass::default());
        let scheduler = ReconciliationScheduler::new("test", Duration::from_secs(3600));

        scheduler.start(pass.clone());
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(scheduler.poll_now());
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(pass.runs.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.pass_count(), 2);
        scheduler.shutdown().await;
    }

    #[derive(Default)]
    struct SlowPass {
        active: AtomicU64,
        max_active: AtomicU64,
        runs: AtomicU64,
    }

    #[async_trait]
    impl Reconcile for SlowPass {
        async fn reconcile(&self) -> Result<PassSummary> {
            let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(active, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(5)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(PassSummary::default())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_waits_for_pass_in_flight() {
        let pass = Arc::new(SlowPass::default());
        let scheduler = ReconciliationScheduler::new("slow", Duration::from_secs(60));

        assert!(scheduler.start(pass.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(scheduler.stop());
        assert!(scheduler.start(pass.clone()));

        tokio::time::sleep(Duration::from_secs(20)).await;

        // The old loop finishes its pass and exits; the new loop then runs
        // its immediate pass, never alongside the old one.
        assert_eq!(pass.runs.load(Ordering::SeqCst), 2);
        assert_eq!(pass.max_active.load(Ordering::SeqCst), 1);
        scheduler.shutdown().await;
    }

    #[test]
    fn test_poll_now_without_loop() {
        let scheduler = ReconciliationScheduler::new("idle", Duration::from_secs(1));
        assert!(!scheduler.poll_now());
        assert!(!scheduler.is_running());
    }
}
