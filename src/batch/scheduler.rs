//! Periodic flush timer.
//!
//! At most one timer task runs per scheduler. `start` while running cancels
//! the old task before spawning a new one; `stop` cancels without flushing.
//! Ticks run the flush inline, so a slow flush delays the next tick instead
//! of overlapping it.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::BatchQueue;
use crate::outcome::FlushOutcome;
use crate::transport::TransportClient;

/// Something the scheduler can flush on each tick.
pub trait FlushTarget: Send + Sync + 'static {
    fn flush(&self) -> impl Future<Output = FlushOutcome> + Send;
}

impl<T: TransportClient> FlushTarget for BatchQueue<T> {
    fn flush(&self) -> impl Future<Output = FlushOutcome> + Send {
        BatchQueue::flush(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct FlushScheduler<F> {
    target: Arc<F>,
    period: Duration,
    running: Mutex<Option<Running>>,
}

impl<F: FlushTarget> FlushScheduler<F> {
    pub fn new(target: Arc<F>, period: Duration) -> Self {
        FlushScheduler {
            target,
            period,
            running: Mutex::new(None),
        }
    }

    /// Starts the timer, replacing any timer already running.
    ///
    /// The first tick fires one full period after this call. Must be called
    /// from within a tokio runtime.
    pub fn start(&self) {
        let mut running = self.lock();
        if let Some(previous) = running.take() {
            previous.cancel.cancel();
            debug!("Restarting flush timer");
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_timer(self.target.clone(), self.period, cancel.clone()));
        *running = Some(Running { cancel, handle });
        info!(period_ms = self.period.as_millis() as u64, "Flush timer started");
    }

    /// Cancels the timer. Returns the task handle so callers can await its
    /// exit; `None` if the timer was not running.
    ///
    /// A flush already in progress when this is called runs to completion.
    pub fn stop(&self) -> Option<JoinHandle<()>> {
        let running = self.lock().take()?;
        running.cancel.cancel();
        info!("Flush timer stopped");
        Some(running.handle)
    }

    pub fn state(&self) -> SchedulerState {
        match self.lock().as_ref() {
            Some(r) if !r.handle.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl<F> Drop for FlushScheduler<F> {
    fn drop(&mut self) {
        let running = self.running.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(r) = running.take() {
            r.cancel.cancel();
        }
    }
}

async fn run_timer<F: FlushTarget>(target: Arc<F>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                debug!("Flush timer cancelled");
                break;
            }

            _ = ticker.tick() => {
                let outcome = target.flush().await;
                debug!(?outcome, "Scheduled flush finished");
            }
        }
    }
}
