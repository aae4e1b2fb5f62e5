//! Platform-agnostic audio sink
//!
//! Abstracts the single reusable audio output the engine drives. A desktop
//! host wraps its native player, a web host wraps an `<audio>` element; the
//! engine only issues transport commands and consumes lifecycle events.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::WeakUnboundedSender;
use tracing::trace;

use crate::engine::Message;
use crate::error::SinkError;

/// Buffering hint for a sink
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PreloadHint {
    /// Fetch nothing until playback starts
    None,

    /// Fetch duration and headers only
    #[default]
    Metadata,

    /// Buffer as much as possible
    Auto,
}

/// Platform audio output
///
/// All methods are called from the engine task. Lifecycle signals travel the
/// other way through the [`SinkEvents`] handle passed to [`subscribe`].
///
/// [`subscribe`]: AudioSink::subscribe
pub trait AudioSink: Send {
    /// Assign `url` as the source and prime it (equivalent to `src = url; load()`)
    fn load(&mut self, url: &str) -> Result<(), SinkError>;

    /// Reload the current source from scratch
    fn reload(&mut self) -> Result<(), SinkError>;

    /// Start or resume playback
    ///
    /// May be refused by the platform (autoplay policy); the engine treats
    /// that as "wait for the user", not as a failure.
    fn play(&mut self) -> Result<(), SinkError>;

    /// Pause playback
    fn pause(&mut self);

    /// Set the playback position in seconds
    fn seek(&mut self, position: f64);

    /// Set output volume (0.0-1.0)
    fn set_volume(&mut self, volume: f32);

    /// Mute or unmute without touching the volume
    fn set_muted(&mut self, muted: bool);

    /// Buffering hint
    fn set_preload(&mut self, _hint: PreloadHint) {}

    /// Receive the handle used to report lifecycle events
    ///
    /// Sinks that never report events (such as a preload-only output) can
    /// ignore it.
    fn subscribe(&mut self, _events: SinkEvents) {}
}

/// Lifecycle signals reported by a sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SinkEvent {
    /// The sink started fetching a new source
    LoadStart,

    /// Duration (seconds) became known
    LoadedMetadata { duration: f64 },

    /// Duration changed
    DurationChange { duration: f64 },

    /// Enough data to start playing
    CanPlay,

    /// Playback was requested
    Play,

    /// Playback actually (re)started after loading or buffering
    Playing,

    /// Playback paused
    Pause,

    /// Playback position advanced (seconds)
    TimeUpdate { position: f64 },

    /// Buffered range grew; `buffered_end` is the end of the last range
    Progress { buffered_end: Option<f64> },

    /// Waiting for data to continue
    Waiting,

    /// Trying to fetch data, but none is arriving
    Stalled,

    /// The source played to its end
    Ended,

    /// Fatal output error
    Error { message: String },
}

/// Handle for pushing [`SinkEvent`]s into the engine
///
/// Holds a weak reference: a sink storing its handle does not keep the
/// engine alive.
#[derive(Debug, Clone)]
pub struct SinkEvents {
    inbox: WeakUnboundedSender<Message>,
}

impl SinkEvents {
    pub(crate) fn new(inbox: WeakUnboundedSender<Message>) -> Self {
        Self { inbox }
    }

    /// Report an event
    ///
    /// Returns `false` once the engine has shut down.
    pub fn emit(&self, event: SinkEvent) -> bool {
        let Some(inbox) = self.inbox.upgrade() else {
            trace!(?event, "Dropping sink event, engine is gone");
            return false;
        };
        inbox.send(Message::Sink(event)).is_ok()
    }
}

/// Sink that discards everything
///
/// Used as the preload output when the host does not provide one.
#[derive(Debug, Default)]
pub struct NullSink;

impl AudioSink for NullSink {
    fn load(&mut self, _url: &str) -> Result<(), SinkError> {
        Ok(())
    }

    fn reload(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn play(&mut self) -> Result<(), SinkError> {
        Ok(())
    }

    fn pause(&mut self) {}

    fn seek(&mut self, _position: f64) {}

    fn set_volume(&mut self, _volume: f32) {}

    fn set_muted(&mut self, _muted: bool) {}
}

/// Buffered seconds and ratio for a progress report
///
/// Non-finite or negative inputs count as zero; the ratio is capped at 1.
pub(crate) fn buffered(buffered_end: Option<f64>, duration: f64) -> (f64, f64) {
    let end = buffered_end.filter(|e| e.is_finite()).unwrap_or(0.0).max(0.0);
    let percent = if duration.is_finite() && duration > 0.0 {
        (end / duration).min(1.0)
    } else {
        0.0
    };
    (end, if percent.is_finite() { percent } else { 0.0 })
}
