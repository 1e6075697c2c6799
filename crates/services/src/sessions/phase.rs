use std::fmt;

use tokio::sync::watch;

/// Which network-bound step is currently in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    LoadingExam,
    Starting,
    Submitting,
}

impl SessionPhase {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Idle => "idle",
            SessionPhase::LoadingExam => "loading exam",
            SessionPhase::Starting => "starting",
            SessionPhase::Submitting => "submitting",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Enter `phase`, and leave it on drop unless another phase took over meanwhile.
pub(crate) struct PhaseGuard<'a> {
    phase: SessionPhase,
    tx: &'a watch::Sender<SessionPhase>,
}

impl<'a> PhaseGuard<'a> {
    pub(crate) fn enter(tx: &'a watch::Sender<SessionPhase>, phase: SessionPhase) -> Self {
        tx.send_replace(phase);
        Self { phase, tx }
    }
}

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        leave(self.tx, self.phase);
    }
}

/// Return to `Idle` if `phase` is still the published one.
pub(crate) fn leave(tx: &watch::Sender<SessionPhase>, phase: SessionPhase) {
    tx.send_if_modified(|current| {
        if *current == phase {
            *current = SessionPhase::Idle;
            true
        } else {
            false
        }
    });
}
