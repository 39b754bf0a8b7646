//! Client-facing cooldown for force-check requests
//!
//! This is API-layer policy layered on top of the engine's own single-flight
//! guard: after a force check is accepted, further requests are refused until
//! the cooldown elapses, and clients are told how long to wait.

use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, watch};
use tokio::time::Instant;

/// Why a force-check request was refused by the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    /// Another request holds the gate right now
    InProgress,
    /// The last accepted check was too recent
    CoolingDown {
        /// Time until the next request is allowed
        remaining: Duration,
    },
}

/// Cooldown window between accepted force checks
#[derive(Debug)]
pub struct ForceCheckGate {
    cooldown: Duration,
    in_flight: Mutex<()>,
    last_accepted: watch::Sender<Option<Instant>>,
}

/// Held while a gated force check runs
#[derive(Debug)]
pub struct GatePermit<'a> {
    gate: &'a ForceCheckGate,
    _in_flight: MutexGuard<'a, ()>,
}

impl GatePermit<'_> {
    /// The engine accepted the check: start the cooldown window at `now`
    pub fn accept(self, now: Instant) {
        self.gate.last_accepted.send_replace(Some(now));
    }
}

impl ForceCheckGate {
    pub fn new(cooldown: Duration) -> Self {
        let (last_accepted, _) = watch::channel(None);
        Self {
            cooldown,
            in_flight: Mutex::new(()),
            last_accepted,
        }
    }

    /// Configured cooldown length
    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    /// Time left in the cooldown window at `now`, if any
    pub fn remaining(&self, now: Instant) -> Option<Duration> {
        let last = (*self.last_accepted.borrow())?;
        let elapsed = now.saturating_duration_since(last);
        self.cooldown
            .checked_sub(elapsed)
            .filter(|remaining| !remaining.is_zero())
    }

    /// Try to start a gated force check without waiting
    ///
    /// Dropping the permit without calling [`GatePermit::accept`] leaves the
    /// cooldown window untouched.
    pub fn try_begin(&self, now: Instant) -> Result<GatePermit<'_>, GateRejection> {
        if let Some(remaining) = self.remaining(now) {
            return Err(GateRejection::CoolingDown { remaining });
        }
        let guard = self
            .in_flight
            .try_lock()
            .map_err(|_| GateRejection::InProgress)?;
        Ok(GatePermit {
            gate: self,
            _in_flight: guard,
        })
    }
}

/// Whole seconds, rounded up, for reporting to clients
pub fn ceil_secs(duration: Duration) -> u64 {
    if duration.subsec_nanos() > 0 {
        duration.as_secs() + 1
    } else {
        duration.as_secs()
    }
}
