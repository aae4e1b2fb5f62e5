//! Observable player snapshot

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::queue::QueueWindow;
use crate::recovery::PlaybackFailure;
use crate::settings::DEFAULT_VOLUME;
use crate::types::{PlaybackMode, PlayerStatus, Track};

/// Everything an observer may render, published after every handled message
///
/// The window is shared behind an `Arc` so that snapshots that only change
/// the playback clock do not copy up to `2 * radius + 1` tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerView {
    pub status: PlayerStatus,

    /// User-facing message for the last failure
    pub error_message: Option<String>,

    /// Last failure, if the current attempt failed
    pub failure: Option<PlaybackFailure>,

    pub mode: PlaybackMode,
    pub is_playing: bool,

    /// Playback position in seconds
    pub current_time: f64,

    /// Duration in seconds (0 until known)
    pub duration: f64,

    /// End of the buffered range in seconds
    pub buffered_time: f64,

    /// Buffered fraction of the duration, 0-1
    pub buffered_percent: f64,

    pub volume: f32,
    pub muted: bool,

    pub consecutive_failures: u32,

    /// Playback stopped at the failure ceiling
    pub halted: bool,

    pub window: Arc<QueueWindow>,
}

impl PlayerView {
    pub fn current_track(&self) -> Option<&Track> {
        self.window.current()
    }

    /// Global index of the current track, `None` when nothing is queued
    pub fn current_index(&self) -> Option<usize> {
        self.window.current().map(|_| self.window.global_index())
    }
}

impl Default for PlayerView {
    fn default() -> Self {
        Self {
            status: PlayerStatus::Idle,
            error_message: None,
            failure: None,
            mode: PlaybackMode::default(),
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            buffered_time: 0.0,
            buffered_percent: 0.0,
            volume: DEFAULT_VOLUME,
            muted: false,
            consecutive_failures: 0,
            halted: false,
            window: Arc::new(QueueWindow::default()),
        }
    }
}
