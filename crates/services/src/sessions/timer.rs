use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use exam_core::{Clock, TickAction, TimerEngine, TimerTick};

use super::submission::{SubmissionCoordinator, SubmitTrigger};
use super::{SharedSession, lock_session};

/// Scoped timer task for one ongoing attempt.
///
/// Dropping the handle stops ticking; a submission it already triggered keeps running.
pub(crate) struct TimerHandle {
    task: JoinHandle<()>,
    cancelled: Arc<AtomicBool>,
}

impl TimerHandle {
    pub(crate) fn spawn(
        engine: TimerEngine,
        session: SharedSession,
        coordinator: Arc<SubmissionCoordinator>,
        clock: Clock,
        period: Duration,
        ticks: Arc<watch::Sender<Option<TimerTick>>>,
    ) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let driver = TimerDriver {
            engine,
            session,
            coordinator,
            clock,
            ticks,
            cancelled: Arc::clone(&cancelled),
        };
        let task = tokio::spawn(driver.run(period));
        Self { task, cancelled }
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

struct TimerDriver {
    engine: TimerEngine,
    session: SharedSession,
    coordinator: Arc<SubmissionCoordinator>,
    clock: Clock,
    ticks: Arc<watch::Sender<Option<TimerTick>>>,
    cancelled: Arc<AtomicBool>,
}

impl TimerDriver {
    async fn run(mut self, period: Duration) {
        let attempt_id = self.coordinator.attempt_id().clone();
        let mut halt = self.coordinator.subscribe_halt();
        if *halt.borrow_and_update() {
            return;
        }

        let mut interval = time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                changed = halt.changed() => {
                    if changed.is_err() || *halt.borrow_and_update() {
                        debug!(%attempt_id, "timer halted by submission");
                        break;
                    }
                    continue;
                }
            }

            let status = lock_session(&self.session).status();
            let (tick, action) = self.engine.tick(self.clock.now(), status);
            if !self.publish(tick) {
                break;
            }

            match action {
                TickAction::Continue => {
                    debug!(%attempt_id, remaining = tick.remaining_seconds, "tick");
                }
                TickAction::AutoSubmit => {
                    info!(%attempt_id, elapsed = tick.elapsed_seconds, "time is up, submitting automatically");
                    let coordinator = Arc::clone(&self.coordinator);
                    tokio::spawn(async move {
                        if let Err(err) = coordinator.submit(SubmitTrigger::Auto).await {
                            warn!(attempt_id = %coordinator.attempt_id(), error = %err, "auto-submit failed");
                        }
                    });
                }
                TickAction::Stop => {
                    debug!(%attempt_id, %status, "timer stopped");
                    break;
                }
            }
        }
    }

    /// Publish under the channel lock so a torn-down timer cannot overwrite a reset.
    fn publish(&self, tick: TimerTick) -> bool {
        let mut live = true;
        self.ticks.send_if_modified(|slot| {
            if self.cancelled.load(Ordering::SeqCst) {
                live = false;
                return false;
            }
            *slot = Some(tick);
            true
        });
        live
    }
}
