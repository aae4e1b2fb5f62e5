//! Shared test infrastructure

#![allow(dead_code)]

use async_trait::async_trait;
use linktune_playback::{
    AudioQuality, AudioSink, HistoryEntry, HistoryError, HistorySink, PreloadHint,
    QualityDowngrade, ResolveError, ResolvedSource, SinkError, SinkEvent, SinkEvents, Track,
    UrlResolver,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything the engine asked a sink to do
#[derive(Debug, Clone, PartialEq)]
pub enum SinkCall {
    Load(String),
    Reload,
    Play,
    Pause,
    Seek(f64),
    SetVolume(f32),
    SetMuted(bool),
    SetPreload(PreloadHint),
}

#[derive(Default)]
struct Shared {
    calls: Mutex<Vec<SinkCall>>,
    events: Mutex<Option<SinkEvents>>,
    fail_loads: Mutex<bool>,
    refuse_play: Mutex<bool>,
}

/// Recording sink; the paired [`SinkProbe`] inspects it and emits events
pub struct MockSink {
    shared: Arc<Shared>,
}

/// Test-side view of a [`MockSink`]
#[derive(Clone)]
pub struct SinkProbe {
    shared: Arc<Shared>,
}

impl MockSink {
    pub fn new() -> (Self, SinkProbe) {
        let shared = Arc::new(Shared::default());
        (
            Self {
                shared: shared.clone(),
            },
            SinkProbe { shared },
        )
    }

    fn record(&self, call: SinkCall) {
        self.shared.calls.lock().unwrap().push(call);
    }
}

impl AudioSink for MockSink {
    fn load(&mut self, url: &str) -> Result<(), SinkError> {
        self.record(SinkCall::Load(url.to_string()));
        if *self.shared.fail_loads.lock().unwrap() {
            return Err(SinkError::Load(format!("cannot open {url}")));
        }
        Ok(())
    }

    fn reload(&mut self) -> Result<(), SinkError> {
        self.record(SinkCall::Reload);
        Ok(())
    }

    fn play(&mut self) -> Result<(), SinkError> {
        self.record(SinkCall::Play);
        if *self.shared.refuse_play.lock().unwrap() {
            return Err(SinkError::NotAllowed("autoplay blocked".to_string()));
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.record(SinkCall::Pause);
    }

    fn seek(&mut self, position: f64) {
        self.record(SinkCall::Seek(position));
    }

    fn set_volume(&mut self, volume: f32) {
        self.record(SinkCall::SetVolume(volume));
    }

    fn set_muted(&mut self, muted: bool) {
        self.record(SinkCall::SetMuted(muted));
    }

    fn set_preload(&mut self, hint: PreloadHint) {
        self.record(SinkCall::SetPreload(hint));
    }

    fn subscribe(&mut self, events: SinkEvents) {
        *self.shared.events.lock().unwrap() = Some(events);
    }
}

impl SinkProbe {
    pub fn calls(&self) -> Vec<SinkCall> {
        self.shared.calls.lock().unwrap().clone()
    }

    /// URLs assigned as sources, in order
    pub fn loads(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                SinkCall::Load(url) => Some(url),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &SinkCall) -> usize {
        self.calls().iter().filter(|call| *call == wanted).count()
    }

    pub fn clear(&self) {
        self.shared.calls.lock().unwrap().clear();
    }

    pub fn fail_loads(&self, fail: bool) {
        *self.shared.fail_loads.lock().unwrap() = fail;
    }

    pub fn refuse_play(&self, refuse: bool) {
        *self.shared.refuse_play.lock().unwrap() = refuse;
    }

    /// Report an event as the platform would
    pub fn emit(&self, event: SinkEvent) {
        let events = self.shared.events.lock().unwrap();
        let events = events.as_ref().expect("engine never subscribed");
        assert!(events.emit(event), "engine is gone");
    }
}

/// Resolver answering `http://media/{id}?q={quality}` after an optional delay
pub struct StreamResolver {
    id: String,
    delay: Duration,
    pub calls: Arc<AtomicUsize>,
}

impl StreamResolver {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            delay: Duration::ZERO,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn url(id: &str, quality: AudioQuality) -> String {
        format!("http://media/{id}?q={}", serde_json::to_value(quality).unwrap().as_str().unwrap())
    }
}

#[async_trait]
impl UrlResolver for StreamResolver {
    async fn resolve(&self, quality: AudioQuality) -> Result<String, ResolveError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(Self::url(&self.id, quality))
    }
}

/// Resolver whose backend always rejects
pub struct RejectingResolver;

#[async_trait]
impl UrlResolver for RejectingResolver {
    async fn resolve(&self, _quality: AudioQuality) -> Result<String, ResolveError> {
        Err(ResolveError::Rejected("403 Forbidden".to_string()))
    }
}

/// Downgrade backend that never answers
pub struct HangingDowngrade;

#[async_trait]
impl QualityDowngrade for HangingDowngrade {
    async fn downgrade(&self, _track: Track) -> Result<Option<ResolvedSource>, ResolveError> {
        std::future::pending().await
    }
}

/// History sink that records entries, optionally failing
#[derive(Default)]
pub struct RecordingHistory {
    pub entries: Mutex<Vec<HistoryEntry>>,
    pub fail: bool,
}

impl HistorySink for RecordingHistory {
    fn record(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        self.entries.lock().unwrap().push(entry);
        if self.fail {
            return Err(HistoryError::Unavailable);
        }
        Ok(())
    }
}

pub fn track(id: &str) -> Track {
    Track::new(id, format!("Track {id}"), format!("http://media/{id}.mp3"))
}

pub fn tracks(ids: &[&str]) -> Vec<Track> {
    ids.iter().map(|id| track(id)).collect()
}

/// Let every ready task run without advancing past any engine timer
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}
