//! Owned, cancellable engine timers
//!
//! Each slot holds at most one pending timer. Arming a slot aborts whatever
//! it held before, and every firing carries the token it was armed with, so a
//! message from a superseded timer that was already in flight is recognised
//! and dropped.

use std::time::Duration;
use tokio::sync::mpsc::WeakUnboundedSender;
use tokio::task::JoinHandle;

use crate::engine::Message;

/// Which engine timer fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    /// No "playable" signal within the load window
    Load,

    /// No progress within the stall window
    Stall,

    /// Debounced auto-advance after a failure
    Advance,
}

struct Armed {
    token: u64,
    handle: JoinHandle<()>,
}

/// A single cancellable timer
pub(crate) struct TimerSlot {
    kind: TimerKind,
    next_token: u64,
    armed: Option<Armed>,
}

impl TimerSlot {
    pub(crate) fn new(kind: TimerKind) -> Self {
        Self {
            kind,
            next_token: 0,
            armed: None,
        }
    }

    /// Arm the slot, cancelling any pending timer first
    pub(crate) fn arm(&mut self, after: Duration, inbox: &WeakUnboundedSender<Message>) {
        self.cancel();

        self.next_token += 1;
        let token = self.next_token;
        let kind = self.kind;
        let inbox = inbox.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(after).await;
            // A pending timer must not keep the engine alive
            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(Message::Timer { kind, token });
            }
        });

        self.armed = Some(Armed { token, handle });
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(armed) = self.armed.take() {
            armed.handle.abort();
        }
    }

    pub(crate) fn is_armed(&self) -> bool {
        self.armed.is_some()
    }

    /// Consume a firing; `true` only for the currently armed timer
    pub(crate) fn fire(&mut self, token: u64) -> bool {
        match &self.armed {
            Some(armed) if armed.token == token => {
                self.armed = None;
                true
            }
            _ => false,
        }
    }
}

impl Drop for TimerSlot {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test(start_paused = true)]
    async fn fires_once_with_current_token() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerKind::Load);

        slot.arm(Duration::from_secs(20), &tx.downgrade());
        assert!(slot.is_armed());

        let Some(Message::Timer { kind, token }) = rx.recv().await else {
            panic!("expected timer message");
        };
        assert_eq!(kind, TimerKind::Load);
        assert!(slot.fire(token));
        assert!(!slot.is_armed());
        assert!(!slot.fire(token));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_supersedes_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerKind::Stall);

        slot.arm(Duration::from_secs(1), &tx.downgrade());
        slot.arm(Duration::from_secs(5), &tx.downgrade());

        let start = tokio::time::Instant::now();
        let Some(Message::Timer { token, .. }) = rx.recv().await else {
            panic!("expected timer message");
        };
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert!(slot.fire(token));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut slot = TimerSlot::new(TimerKind::Advance);

        slot.arm(Duration::from_millis(500), &tx.downgrade());
        slot.cancel();

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }
}
