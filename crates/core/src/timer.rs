//! Time reconciliation against the authoritative start instant.
//!
//! Remaining time is always recomputed from absolute timestamps, never decremented,
//! so a client that was suspended or missed ticks recovers the correct value.

use chrono::{DateTime, Duration, Utc};

use crate::model::AttemptStatus;

/// Deadline arithmetic for an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    started_at: DateTime<Utc>,
    duration_seconds: u32,
}

impl Countdown {
    #[must_use]
    pub fn new(started_at: DateTime<Utc>, duration_seconds: u32) -> Self {
        Self {
            started_at,
            duration_seconds,
        }
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    #[must_use]
    pub fn duration_seconds(&self) -> u32 {
        self.duration_seconds
    }

    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.started_at + Duration::seconds(i64::from(self.duration_seconds))
    }

    /// `max(0, duration - (now - started_at))`, rounded up to whole seconds.
    ///
    /// A clock reading before `started_at` never reports more than the full duration.
    #[must_use]
    pub fn remaining_seconds(&self, now: DateTime<Utc>) -> u32 {
        let left = self.deadline().signed_duration_since(now);
        if left <= Duration::zero() {
            return 0;
        }
        let whole = left.num_seconds();
        let secs = if left > Duration::seconds(whole) {
            whole.saturating_add(1)
        } else {
            whole
        };
        u32::try_from(secs)
            .unwrap_or(u32::MAX)
            .min(self.duration_seconds)
    }

    /// Whole seconds since the start, clamped to `[0, duration]`.
    #[must_use]
    pub fn elapsed_seconds(&self, now: DateTime<Utc>) -> u32 {
        let secs = now.signed_duration_since(self.started_at).num_seconds();
        if secs <= 0 {
            return 0;
        }
        u32::try_from(secs)
            .unwrap_or(u32::MAX)
            .min(self.duration_seconds)
    }

    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.remaining_seconds(now) == 0
    }
}

/// What one tick observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerTick {
    pub remaining_seconds: u32,
    pub elapsed_seconds: u32,
    pub total_seconds: u32,
    pub at: DateTime<Utc>,
}

/// What the driver must do after a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    Continue,
    AutoSubmit,
    Stop,
}

/// Per-attempt timer state with the one-shot auto-submit latch.
///
/// A new engine is built for every loaded attempt; the latch is never reset otherwise.
#[derive(Debug, Clone)]
pub struct TimerEngine {
    countdown: Countdown,
    auto_submit_fired: bool,
    stopped: bool,
}

impl TimerEngine {
    #[must_use]
    pub fn new(countdown: Countdown) -> Self {
        Self {
            countdown,
            auto_submit_fired: false,
            stopped: false,
        }
    }

    #[must_use]
    pub fn countdown(&self) -> Countdown {
        self.countdown
    }

    #[must_use]
    pub fn auto_submit_fired(&self) -> bool {
        self.auto_submit_fired
    }

    /// Evaluate one tick at `now` for an attempt currently in `status`.
    pub fn tick(&mut self, now: DateTime<Utc>, status: AttemptStatus) -> (TimerTick, TickAction) {
        let tick = TimerTick {
            remaining_seconds: self.countdown.remaining_seconds(now),
            elapsed_seconds: self.countdown.elapsed_seconds(now),
            total_seconds: self.countdown.duration_seconds(),
            at: now,
        };

        if status != AttemptStatus::Ongoing {
            self.stopped = true;
        }
        if self.stopped {
            return (tick, TickAction::Stop);
        }

        if tick.remaining_seconds == 0 && !self.auto_submit_fired {
            self.auto_submit_fired = true;
            return (tick, TickAction::AutoSubmit);
        }
        (tick, TickAction::Continue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;

    fn countdown(duration: u32) -> Countdown {
        Countdown::new(fixed_now(), duration)
    }

    #[test]
    fn remaining_is_positive_just_before_deadline() {
        let cd = countdown(60);
        let almost = fixed_now() + Duration::seconds(60) - Duration::milliseconds(1);
        assert!(cd.remaining_seconds(almost) > 0);
    }

    #[test]
    fn sub_millisecond_margin_still_counts_as_time_left() {
        let cd = countdown(60);
        let deadline = fixed_now() + Duration::seconds(60);
        assert_eq!(cd.remaining_seconds(deadline - Duration::microseconds(1)), 1);
        assert_eq!(cd.remaining_seconds(deadline - Duration::microseconds(500)), 1);
        assert!(!cd.is_expired(deadline - Duration::nanoseconds(1)));
        assert_eq!(cd.remaining_seconds(deadline - Duration::seconds(1)), 1);
        assert_eq!(
            cd.remaining_seconds(deadline - Duration::seconds(1) - Duration::microseconds(1)),
            2
        );
    }

    #[test]
    fn microsecond_start_time_does_not_fire_early() {
        let started_at = fixed_now() + Duration::microseconds(123_456);
        let mut engine = TimerEngine::new(Countdown::new(started_at, 60));
        let deadline = started_at + Duration::seconds(60);

        let (tick, action) = engine.tick(deadline - Duration::microseconds(1), AttemptStatus::Ongoing);
        assert_eq!(tick.remaining_seconds, 1);
        assert_eq!(action, TickAction::Continue);

        let (tick, action) = engine.tick(deadline, AttemptStatus::Ongoing);
        assert_eq!(tick.remaining_seconds, 0);
        assert_eq!(action, TickAction::AutoSubmit);
    }

    #[test]
    fn remaining_is_zero_at_deadline_and_clamped_after() {
        let cd = countdown(60);
        assert_eq!(cd.remaining_seconds(fixed_now() + Duration::seconds(60)), 0);
        assert_eq!(cd.remaining_seconds(fixed_now() + Duration::hours(5)), 0);
        assert!(cd.is_expired(fixed_now() + Duration::seconds(61)));
    }

    #[test]
    fn remaining_recomputes_after_a_gap() {
        let cd = countdown(600);
        assert_eq!(cd.remaining_seconds(fixed_now()), 600);
        assert_eq!(cd.remaining_seconds(fixed_now() + Duration::seconds(1)), 599);
        // a suspended client resuming much later sees the true value
        assert_eq!(cd.remaining_seconds(fixed_now() + Duration::seconds(450)), 150);
        assert_eq!(cd.elapsed_seconds(fixed_now() + Duration::seconds(450)), 450);
    }

    #[test]
    fn clock_behind_start_reports_full_duration() {
        let cd = countdown(60);
        let early = fixed_now() - Duration::seconds(30);
        assert_eq!(cd.remaining_seconds(early), 60);
        assert_eq!(cd.elapsed_seconds(early), 0);
    }

    #[test]
    fn auto_submit_fires_once_after_expiry() {
        let mut engine = TimerEngine::new(countdown(60));
        let late = fixed_now() + Duration::seconds(61);

        let (tick, action) = engine.tick(late, AttemptStatus::Ongoing);
        assert_eq!(tick.remaining_seconds, 0);
        assert_eq!(action, TickAction::AutoSubmit);

        for offset in 0..5 {
            let (_, action) =
                engine.tick(late + Duration::seconds(offset), AttemptStatus::Ongoing);
            assert_eq!(action, TickAction::Continue);
        }
        assert!(engine.auto_submit_fired());
    }

    #[test]
    fn ticks_before_expiry_continue() {
        let mut engine = TimerEngine::new(countdown(60));
        let (tick, action) = engine.tick(fixed_now() + Duration::seconds(10), AttemptStatus::Ongoing);
        assert_eq!(tick.remaining_seconds, 50);
        assert_eq!(tick.total_seconds, 60);
        assert_eq!(action, TickAction::Continue);
    }

    #[test]
    fn completed_status_stops_engine_for_good() {
        let mut engine = TimerEngine::new(countdown(60));
        let late = fixed_now() + Duration::seconds(90);
        let (_, action) = engine.tick(late, AttemptStatus::Completed);
        assert_eq!(action, TickAction::Stop);
        let (_, action) = engine.tick(late, AttemptStatus::Ongoing);
        assert_eq!(action, TickAction::Stop);
        assert!(!engine.auto_submit_fired());
    }
}
