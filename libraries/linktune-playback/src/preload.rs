//! Predictive preloading of the next track
//!
//! A second, otherwise idle sink is primed with the sequential successor so
//! the switch starts from a warm cache. Purely best-effort.

use tracing::debug;

use crate::mode::predicted_next;
use crate::queue::Queue;
use crate::sink::{AudioSink, PreloadHint};
use crate::types::PlaybackMode;

/// Owns the secondary sink
pub struct PreloadScheduler {
    sink: Option<Box<dyn AudioSink>>,
    primed_url: Option<String>,
}

impl PreloadScheduler {
    pub fn new(sink: Option<Box<dyn AudioSink>>) -> Self {
        let sink = sink.map(|mut sink| {
            sink.set_preload(PreloadHint::Metadata);
            sink
        });
        Self {
            sink,
            primed_url: None,
        }
    }

    /// Prime the track after `current`
    ///
    /// Returns the URL that was primed, if any.
    pub fn schedule(
        &mut self,
        queue: &Queue,
        current: usize,
        mode: PlaybackMode,
    ) -> Option<String> {
        let sink = self.sink.as_mut()?;
        let next = predicted_next(queue.len(), current, mode)?;
        let track = queue.get(next)?;
        if !track.has_url() || self.primed_url.as_deref() == Some(track.url.as_str()) {
            return None;
        }

        match sink.load(&track.url) {
            Ok(()) => {
                debug!(track_id = %track.id, index = next, "Preloaded next track");
                self.primed_url = Some(track.url.clone());
                self.primed_url.clone()
            }
            Err(e) => {
                debug!(track_id = %track.id, error = %e, "Preload failed, ignoring");
                None
            }
        }
    }

    /// URL currently held by the preload sink
    pub fn primed_url(&self) -> Option<&str> {
        self.primed_url.as_deref()
    }
}
