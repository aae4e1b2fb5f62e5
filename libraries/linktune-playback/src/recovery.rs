//! Stall and failure recovery
//!
//! Bookkeeping for the recovery state machine. Each switch attempt moves
//! `Loading -> Ready | TimedOut | Stalled | Errored`; stalls get a bounded
//! number of in-place retries, every other failure goes straight to
//! auto-advance, and a run of consecutive failures trips a circuit breaker
//! that halts playback until the user intervenes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a playback attempt failed
///
/// These are never returned to callers; they surface through
/// [`crate::PlayerView::failure`] and its error message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum PlaybackFailure {
    /// Deferred URL resolution rejected or yielded nothing
    #[error("Could not resolve a playable address: {0}")]
    Resolution(String),

    /// No "playable" signal within the load window
    #[error("Load timeout")]
    LoadTimeout,

    /// No progress within the stall window, retries exhausted
    #[error("Playback stalled")]
    StallTimeout,

    /// The audio output reported a fatal error
    #[error("Playback failed, check the network or file path: {0}")]
    Output(String),

    /// Too many failures in a row; playback halted
    #[error("Stopped after {0} consecutive failures")]
    ConsecutiveFailureCeiling(u32),
}

/// Outcome of recording a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    /// Schedule an auto-advance
    Advance,

    /// The ceiling was reached; stop playback
    Halt,
}

/// How to handle a stall timeout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallAction {
    /// Re-resolve at a lower quality and resume
    Downgrade,

    /// Reload the current source and resume
    Reload,

    /// Retries exhausted; treat as a failure
    Escalate,
}

/// Recovery counters for one engine
#[derive(Debug, Clone)]
pub struct Recovery {
    failure_ceiling: u32,
    max_stall_retries: u32,
    consecutive_failures: u32,
    stall_retries: u32,
    halted: bool,
}

impl Recovery {
    pub fn new(failure_ceiling: u32, max_stall_retries: u32) -> Self {
        Self {
            failure_ceiling: failure_ceiling.max(1),
            max_stall_retries,
            consecutive_failures: 0,
            stall_retries: 0,
            halted: false,
        }
    }

    /// A new switch attempt gets a fresh stall-retry budget
    pub fn begin_switch(&mut self) {
        self.stall_retries = 0;
    }

    /// The sink became ready or resumed playing
    pub fn record_healthy(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Count a failure and decide whether to keep going
    pub fn record_failure(&mut self) -> FailureAction {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.failure_ceiling {
            self.halted = true;
            FailureAction::Halt
        } else {
            FailureAction::Advance
        }
    }

    /// Decide how to react to a stall timeout, consuming a retry if one is left
    pub fn stall_action(&mut self, can_downgrade: bool) -> StallAction {
        if self.stall_retries >= self.max_stall_retries {
            return StallAction::Escalate;
        }
        self.stall_retries += 1;
        if can_downgrade {
            StallAction::Downgrade
        } else {
            StallAction::Reload
        }
    }

    /// Explicit user intervention clears the breaker
    pub fn reset_viability(&mut self) {
        self.consecutive_failures = 0;
        self.halted = false;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn failure_ceiling(&self) -> u32 {
        self.failure_ceiling
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }
}
