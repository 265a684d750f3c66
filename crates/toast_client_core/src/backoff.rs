//! Throttle for opportunistic sync: after a pass that uploads nothing, hold further
//! `try_sync` calls for a step that grows with each consecutive stalled pass.

use std::time::{Duration, Instant};

/// How a sync pass ended, as far as the throttle cares.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PassOutcome {
    /// At least one record was accepted, or there was nothing to upload.
    Progress,
    /// Records were pending and none went up.
    Stalled,
    /// No usable session; nothing was attempted.
    NoCredential,
}

pub(crate) struct SyncBackoff {
    steps: Vec<Duration>,
    step: usize,
    hold_until: Option<Instant>,
}

impl SyncBackoff {
    pub(crate) fn new(steps: Vec<Duration>) -> Self {
        Self {
            steps,
            step: 0,
            hold_until: None,
        }
    }

    /// 500ms, 500ms, 1s, 1s, 1s, 2s, 2s, 2s, then 3s.
    pub(crate) fn standard() -> Self {
        let ms = [500, 500, 1000, 1000, 1000, 2000, 2000, 2000, 3000];
        Self::new(ms.iter().map(|&m| Duration::from_millis(m)).collect())
    }

    /// `Err(remaining)` while a hold is active.
    pub(crate) fn check(&self) -> Result<(), Duration> {
        match self.hold_until.and_then(|at| at.checked_duration_since(Instant::now())) {
            Some(remaining) if !remaining.is_zero() => Err(remaining),
            _ => Ok(()),
        }
    }

    /// Apply the outcome of a pass. Returns the hold it set, if any.
    /// A missing credential jumps straight to the longest step.
    pub(crate) fn record(&mut self, outcome: PassOutcome) -> Option<Duration> {
        let last = self.steps.len().saturating_sub(1);
        let delay = match outcome {
            PassOutcome::Progress => {
                self.clear();
                return None;
            }
            PassOutcome::Stalled => self.steps.get(self.step).copied(),
            PassOutcome::NoCredential => {
                self.step = last;
                self.steps.last().copied()
            }
        }
        .unwrap_or(Duration::from_secs(1));
        self.step = (self.step + 1).min(last);
        self.hold_until = Some(Instant::now() + delay);
        Some(delay)
    }

    pub(crate) fn clear(&mut self) {
        self.step = 0;
        self.hold_until = None;
    }
}
