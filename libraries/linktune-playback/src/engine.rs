//! Playback engine orchestrator
//!
//! [`PlaybackEngine`] is a cheap, cloneable handle. All state lives in a
//! single actor task; every public operation is a named command sent to it,
//! and sink events, timer firings and resolution results arrive through the
//! same inbox. Nothing else mutates the queue, the index or the counters.
//!
//! # Example
//!
//! ```rust,no_run
//! use linktune_playback::{NullSink, PlaybackEngine, Track};
//!
//! # async fn run() -> linktune_playback::Result<()> {
//! let engine = PlaybackEngine::builder(NullSink).spawn();
//!
//! engine
//!     .play_tracks(
//!         vec![
//!             Track::new("1", "First", "http://media/1.mp3"),
//!             Track::new("2", "Second", "http://media/2.mp3"),
//!         ],
//!         0,
//!     )
//!     .await?;
//! engine.play_next().await?;
//!
//! assert_eq!(engine.view().current_track().map(|t| t.id.as_str()), Some("2"));
//! # Ok(())
//! # }
//! ```

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::PlaybackConfig;
use crate::error::{PlaybackError, ResolveError, Result, SinkError};
use crate::history::{HistoryEntry, HistorySink};
use crate::mode::{self, EndAction};
use crate::preload::PreloadScheduler;
use crate::queue::{Queue, QueueWindow};
use crate::recovery::{FailureAction, PlaybackFailure, Recovery, StallAction};
use crate::resolve::{resolve_track, QualityDowngrade, ResolvedSource};
use crate::settings::{MemorySettingsStore, PlayerSettings, SettingsStore};
use crate::shell::ShellCommand;
use crate::sink::{self, AudioSink, SinkEvent, SinkEvents};
use crate::timer::{TimerKind, TimerSlot};
use crate::types::{PlaybackMode, PlayerStatus, Track};
use crate::view::PlayerView;

/// Everything the actor can receive
#[derive(Debug)]
pub(crate) enum Message {
    Command {
        command: Command,
        done: oneshot::Sender<()>,
    },
    Sink(SinkEvent),
    Timer {
        kind: TimerKind,
        token: u64,
    },
    Resolved {
        switch_id: u64,
        track_id: String,
        result: std::result::Result<ResolvedSource, ResolveError>,
    },
    Downgraded {
        switch_id: u64,
        track_id: String,
        result: std::result::Result<Option<ResolvedSource>, ResolveError>,
    },
}

/// Public operations, one variant each
#[derive(Debug)]
pub(crate) enum Command {
    PlayTrack(Track),
    PlayTracks { tracks: Vec<Track>, start_index: usize },
    AppendTracks(Vec<Track>),
    PlayPrev,
    PlayNext,
    Toggle,
    Seek(f64),
    SetVolume(f32),
    ToggleMuted,
    SetMode(PlaybackMode),
    CycleMode,
    Shutdown,
}

/// Handle to a running playback engine
///
/// Clones share the same engine. The engine stops when [`shutdown`] is
/// called or the last handle is dropped.
///
/// [`shutdown`]: PlaybackEngine::shutdown
#[derive(Debug, Clone)]
pub struct PlaybackEngine {
    inbox: UnboundedSender<Message>,
    view: watch::Receiver<PlayerView>,
}

impl PlaybackEngine {
    /// Start configuring an engine around its primary audio output
    pub fn builder(sink: impl AudioSink + 'static) -> EngineBuilder {
        EngineBuilder::new(Box::new(sink))
    }

    /// Play `track`, merging it into the queue if its id is already there
    pub async fn play_track(&self, track: Track) -> Result<()> {
        self.send(Command::PlayTrack(track)).await
    }

    /// Replace the queue and play from `start_index` (clamped)
    ///
    /// An empty list leaves playback untouched.
    pub async fn play_tracks(&self, tracks: Vec<Track>, start_index: usize) -> Result<()> {
        self.send(Command::PlayTracks {
            tracks,
            start_index,
        })
        .await
    }

    /// Extend the queue without touching playback
    pub async fn append_tracks(&self, tracks: Vec<Track>) -> Result<()> {
        self.send(Command::AppendTracks(tracks)).await
    }

    /// Go to the previous track according to the mode
    pub async fn play_prev(&self) -> Result<()> {
        self.send(Command::PlayPrev).await
    }

    /// Go to the next track according to the mode
    pub async fn play_next(&self) -> Result<()> {
        self.send(Command::PlayNext).await
    }

    /// Pause or resume; after a failure, reload first
    pub async fn toggle(&self) -> Result<()> {
        self.send(Command::Toggle).await
    }

    /// Seek to `position` seconds
    pub async fn seek(&self, position: f64) -> Result<()> {
        self.send(Command::Seek(position)).await
    }

    /// Set volume (clamped to 0-1); zero mutes, anything above un-mutes
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.send(Command::SetVolume(volume)).await
    }

    /// Flip the mute flag, keeping the volume
    pub async fn toggle_muted(&self) -> Result<()> {
        self.send(Command::ToggleMuted).await
    }

    /// Switch to `mode` and persist it
    pub async fn set_mode(&self, mode: PlaybackMode) -> Result<()> {
        self.send(Command::SetMode(mode)).await
    }

    /// Advance to the next mode (loop, one, shuffle)
    pub async fn cycle_mode(&self) -> Result<()> {
        self.send(Command::CycleMode).await
    }

    /// Handle a command from the desktop shell
    pub async fn dispatch_shell(&self, command: ShellCommand) -> Result<()> {
        match command {
            ShellCommand::Toggle => self.toggle().await,
            ShellCommand::Previous => self.play_prev().await,
            ShellCommand::Next => self.play_next().await,
        }
    }

    /// Receiver that observes every published view
    pub fn subscribe(&self) -> watch::Receiver<PlayerView> {
        self.view.clone()
    }

    /// Latest published view
    pub fn view(&self) -> PlayerView {
        self.view.borrow().clone()
    }

    /// Handle for reporting sink events from outside [`AudioSink::subscribe`]
    pub fn sink_events(&self) -> SinkEvents {
        SinkEvents::new(self.inbox.downgrade())
    }

    /// Pause output, cancel all timers and stop the engine
    ///
    /// Afterwards every operation returns [`PlaybackError::EngineClosed`].
    pub async fn shutdown(&self) -> Result<()> {
        self.send(Command::Shutdown).await
    }

    /// Whether the actor is still accepting commands
    pub fn is_running(&self) -> bool {
        !self.inbox.is_closed()
    }

    async fn send(&self, command: Command) -> Result<()> {
        let (done, handled) = oneshot::channel();
        self.inbox
            .send(Message::Command { command, done })
            .map_err(|_| PlaybackError::EngineClosed)?;
        handled.await.map_err(|_| PlaybackError::EngineClosed)
    }
}

/// Collaborators and tunables for a new engine
pub struct EngineBuilder {
    sink: Box<dyn AudioSink>,
    preload_sink: Option<Box<dyn AudioSink>>,
    config: PlaybackConfig,
    settings: Arc<dyn SettingsStore>,
    history: Option<Arc<dyn HistorySink>>,
    downgrade: Option<Arc<dyn QualityDowngrade>>,
    seed: Option<u64>,
}

impl EngineBuilder {
    fn new(sink: Box<dyn AudioSink>) -> Self {
        Self {
            sink,
            preload_sink: None,
            config: PlaybackConfig::default(),
            settings: Arc::new(MemorySettingsStore::new()),
            history: None,
            downgrade: None,
            seed: None,
        }
    }

    /// Secondary output used to prime the next track
    pub fn preload_sink(mut self, sink: impl AudioSink + 'static) -> Self {
        self.preload_sink = Some(Box::new(sink));
        self
    }

    pub fn config(mut self, config: PlaybackConfig) -> Self {
        self.config = config;
        self
    }

    /// Where volume, mute and mode are read from and persisted to
    pub fn settings(mut self, settings: Arc<dyn SettingsStore>) -> Self {
        self.settings = settings;
        self
    }

    pub fn history(mut self, history: Arc<dyn HistorySink>) -> Self {
        self.history = Some(history);
        self
    }

    /// Stall recovery at a lower bitrate
    pub fn quality_downgrade(mut self, downgrade: Arc<dyn QualityDowngrade>) -> Self {
        self.downgrade = Some(downgrade);
        self
    }

    /// Seed the shuffle generator for reproducible runs
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Start the engine task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(self) -> PlaybackEngine {
        let (inbox, messages) = mpsc::unbounded_channel();
        let (actor, view) = Actor::new(self, inbox.downgrade());

        tokio::spawn(actor.run(messages));

        PlaybackEngine { inbox, view }
    }
}

/// State owned by the engine task
struct Actor {
    config: PlaybackConfig,
    sink: Box<dyn AudioSink>,
    preload: PreloadScheduler,
    settings: Arc<dyn SettingsStore>,
    history: Option<Arc<dyn HistorySink>>,
    downgrade: Option<Arc<dyn QualityDowngrade>>,
    rng: StdRng,
    inbox: WeakUnboundedSender<Message>,
    view_tx: watch::Sender<PlayerView>,

    queue: Queue,
    current: Option<usize>,
    /// Id of the track whose switch is in progress or complete
    loaded_id: Option<String>,
    /// The sink holds the current track's source
    source_loaded: bool,
    switch_id: u64,
    /// History not yet reported for the current switch
    pending_history: bool,
    /// Position to restore once the reloaded source is playable
    pending_resume: Option<f64>,
    resolve_task: Option<JoinHandle<()>>,
    window: Arc<QueueWindow>,
    window_dirty: bool,

    status: PlayerStatus,
    failure: Option<PlaybackFailure>,
    mode: PlaybackMode,
    is_playing: bool,
    current_time: f64,
    duration: f64,
    buffered_time: f64,
    buffered_percent: f64,
    volume: f32,
    muted: bool,
    recovery: Recovery,

    load_timer: TimerSlot,
    stall_timer: TimerSlot,
    advance_timer: TimerSlot,
}

impl Actor {
    fn new(
        builder: EngineBuilder,
        inbox: WeakUnboundedSender<Message>,
    ) -> (Self, watch::Receiver<PlayerView>) {
        let EngineBuilder {
            mut sink,
            preload_sink,
            config,
            settings,
            history,
            downgrade,
            seed,
        } = builder;

        let saved = PlayerSettings::load(settings.as_ref());
        sink.set_volume(saved.volume);
        sink.set_muted(saved.muted);
        sink.subscribe(SinkEvents::new(inbox.clone()));

        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let initial = PlayerView {
            mode: saved.mode,
            volume: saved.volume,
            muted: saved.muted,
            ..PlayerView::default()
        };
        let (view_tx, view_rx) = watch::channel(initial);

        debug!(
            volume = saved.volume,
            muted = saved.muted,
            mode = %saved.mode,
            "Playback engine created"
        );

        let actor = Self {
            recovery: Recovery::new(config.failure_ceiling, config.max_stall_retries),
            config,
            sink,
            preload: PreloadScheduler::new(preload_sink),
            settings,
            history,
            downgrade,
            rng,
            inbox,
            view_tx,
            queue: Queue::new(),
            current: None,
            loaded_id: None,
            source_loaded: false,
            switch_id: 0,
            pending_history: false,
            pending_resume: None,
            resolve_task: None,
            window: Arc::new(QueueWindow::default()),
            window_dirty: false,
            status: PlayerStatus::Idle,
            failure: None,
            mode: saved.mode,
            is_playing: false,
            current_time: 0.0,
            duration: 0.0,
            buffered_time: 0.0,
            buffered_percent: 0.0,
            volume: saved.volume,
            muted: saved.muted,
            load_timer: TimerSlot::new(TimerKind::Load),
            stall_timer: TimerSlot::new(TimerKind::Stall),
            advance_timer: TimerSlot::new(TimerKind::Advance),
        };

        (actor, view_rx)
    }

    async fn run(mut self, mut messages: UnboundedReceiver<Message>) {
        while let Some(message) = messages.recv().await {
            match message {
                Message::Command { command, done } => {
                    let stop = matches!(command, Command::Shutdown);
                    self.handle_command(command);
                    self.publish();
                    // The caller may have stopped waiting
                    let _ = done.send(());
                    if stop {
                        info!("Playback engine stopped");
                        return;
                    }
                }
                Message::Sink(event) => {
                    self.handle_sink_event(event);
                    self.publish();
                }
                Message::Timer { kind, token } => {
                    self.handle_timer(kind, token);
                    self.publish();
                }
                Message::Resolved {
                    switch_id,
                    track_id,
                    result,
                } => {
                    self.handle_resolved(switch_id, &track_id, result);
                    self.publish();
                }
                Message::Downgraded {
                    switch_id,
                    track_id,
                    result,
                } => {
                    self.handle_downgraded(switch_id, &track_id, result);
                    self.publish();
                }
            }
        }

        // Every handle is gone
        self.stop_output();
        info!("Playback engine stopped");
    }

    // ===== Commands =====

    fn handle_command(&mut self, command: Command) {
        trace!(?command, "Handling command");
        match command {
            Command::PlayTrack(track) => {
                self.recovery.reset_viability();
                let index = self.queue.upsert(track);
                self.window_dirty = true;
                self.play_at_index(index);
            }
            Command::PlayTracks {
                tracks,
                start_index,
            } => {
                if tracks.is_empty() {
                    debug!("Ignoring empty track list");
                    return;
                }
                self.recovery.reset_viability();
                self.sink.pause();
                self.cancel_timers();
                // Forget the old index so the next play is always a switch
                self.current = None;
                self.loaded_id = None;
                self.source_loaded = false;
                self.queue.replace(tracks);
                self.window_dirty = true;
                if let Some(index) = self.queue.clamp_index(start_index) {
                    self.play_at_index(index);
                }
            }
            Command::AppendTracks(tracks) => {
                debug!(count = tracks.len(), "Appending tracks");
                self.queue.extend(tracks);
                self.window_dirty = true;
            }
            Command::PlayPrev => {
                let Some(current) = self.current else {
                    return;
                };
                self.recovery.reset_viability();
                if let Some(index) =
                    mode::prev_index(self.queue.len(), current, self.mode, &mut self.rng)
                {
                    self.play_at_index(index);
                }
            }
            Command::PlayNext => {
                let Some(current) = self.current else {
                    return;
                };
                self.recovery.reset_viability();
                if let Some(index) =
                    mode::next_index(self.queue.len(), current, self.mode, &mut self.rng)
                {
                    self.play_at_index(index);
                }
            }
            Command::Toggle => self.toggle(),
            Command::Seek(position) => self.seek(position),
            Command::SetVolume(volume) => self.set_volume(volume),
            Command::ToggleMuted => self.set_muted(!self.muted),
            Command::SetMode(mode) => self.set_mode(mode),
            Command::CycleMode => self.set_mode(self.mode.cycle()),
            Command::Shutdown => {
                debug!("Shutdown requested");
                self.stop_output();
            }
        }
    }

    fn toggle(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        self.recovery.reset_viability();
        self.advance_timer.cancel();

        if self.status == PlayerStatus::Error {
            if self.source_loaded {
                debug!(index = current, "Reloading failed source before resuming");
                self.reload_in_place(self.current_time);
            } else {
                self.begin_switch(current);
            }
            return;
        }

        if self.is_playing {
            self.sink.pause();
            self.is_playing = false;
        } else {
            self.start_playback();
        }
    }

    fn seek(&mut self, position: f64) {
        if self.current.is_none() || !position.is_finite() {
            return;
        }
        let mut position = position.max(0.0);
        if self.duration > 0.0 {
            position = position.min(self.duration);
        }
        self.sink.seek(position);
        self.current_time = position;
        if self.pending_resume.is_some() {
            self.pending_resume = Some(position);
        }
    }

    fn set_volume(&mut self, volume: f32) {
        if !volume.is_finite() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.volume = volume;
        self.sink.set_volume(volume);
        PlayerSettings::save_volume(self.settings.as_ref(), volume);

        if volume == 0.0 {
            self.set_muted(true);
        } else if self.muted {
            self.set_muted(false);
        }
    }

    fn set_muted(&mut self, muted: bool) {
        if self.muted == muted {
            return;
        }
        self.muted = muted;
        self.sink.set_muted(muted);
        PlayerSettings::save_muted(self.settings.as_ref(), muted);
    }

    fn set_mode(&mut self, mode: PlaybackMode) {
        if self.mode == mode {
            return;
        }
        info!(mode = %mode, "Playback mode changed");
        self.mode = mode;
        PlayerSettings::save_mode(self.settings.as_ref(), mode);
    }

    // ===== Switching =====

    /// Single entry point for every navigation
    fn play_at_index(&mut self, index: usize) {
        let Some(index) = self.queue.clamp_index(index) else {
            return;
        };
        self.advance_timer.cancel();

        let same_track = self.current == Some(index)
            && self
                .queue
                .get(index)
                .is_some_and(|track| self.loaded_id.as_deref() == Some(track.id.as_str()));

        if same_track && self.source_loaded && self.status != PlayerStatus::Error {
            if !self.is_playing {
                self.start_playback();
            }
            return;
        }

        self.begin_switch(index);
    }

    fn begin_switch(&mut self, index: usize) {
        let Some(track) = self.queue.get(index).cloned() else {
            return;
        };

        self.cancel_timers();
        self.abort_resolution();

        self.switch_id += 1;
        self.recovery.begin_switch();
        self.current = Some(index);
        self.loaded_id = Some(track.id.clone());
        self.source_loaded = false;
        self.window_dirty = true;
        self.pending_history = true;
        self.pending_resume = None;

        self.current_time = 0.0;
        self.duration = 0.0;
        self.buffered_time = 0.0;
        self.buffered_percent = 0.0;
        self.status = PlayerStatus::Loading;
        self.failure = None;
        self.is_playing = true;

        debug!(
            track_id = %track.id,
            index,
            switch_id = self.switch_id,
            "Switching track"
        );

        // Covers resolution as well as buffering
        self.load_timer
            .arm(self.config.load_timeout(), &self.inbox);

        if track.has_url() {
            let url = track.url.clone();
            self.assign_source(&url);
        } else if track.resolver.is_some() {
            self.sink.pause();
            self.spawn_resolution(track);
        } else {
            self.fail(PlaybackFailure::Resolution(
                ResolveError::Unresolvable.to_string(),
            ));
        }
    }

    fn spawn_resolution(&mut self, track: Track) {
        let inbox = self.inbox.clone();
        let switch_id = self.switch_id;
        let track_id = track.id.clone();
        let quality = track.quality.unwrap_or(self.config.default_quality);

        debug!(track_id = %track_id, ?quality, switch_id, "Resolving track URL");
        self.resolve_task = Some(tokio::spawn(async move {
            let result = resolve_track(track, quality).await;
            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(Message::Resolved {
                    switch_id,
                    track_id,
                    result,
                });
            }
        }));
    }

    fn handle_resolved(
        &mut self,
        switch_id: u64,
        track_id: &str,
        result: std::result::Result<ResolvedSource, ResolveError>,
    ) {
        if switch_id != self.switch_id {
            debug!(track_id, switch_id, "Discarding stale resolution");
            return;
        }
        self.resolve_task = None;

        match result {
            Ok(source) => {
                self.queue
                    .update_source(track_id, &source.url, Some(source.quality));
                self.window_dirty = true;
                self.assign_source(&source.url);
            }
            Err(e) => {
                warn!(track_id, error = %e, "URL resolution failed");
                self.fail(PlaybackFailure::Resolution(e.to_string()));
            }
        }
    }

    fn assign_source(&mut self, url: &str) {
        if let Err(e) = self.sink.load(url) {
            self.fail(PlaybackFailure::Output(e.to_string()));
            return;
        }
        self.source_loaded = true;
        self.load_timer
            .arm(self.config.load_timeout(), &self.inbox);
        self.start_playback();
    }

    fn start_playback(&mut self) {
        match self.sink.play() {
            Ok(()) => self.on_play_started(),
            Err(SinkError::NotAllowed(reason)) => {
                // Wait for the user instead of counting a failure
                debug!(%reason, "Playback start refused by platform");
                self.is_playing = false;
            }
            Err(e) => self.fail(PlaybackFailure::Output(e.to_string())),
        }
    }

    fn on_play_started(&mut self) {
        self.is_playing = true;
        let Some(current) = self.current else {
            return;
        };

        if std::mem::take(&mut self.pending_history) {
            self.report_history(current);
        }
        self.preload.schedule(&self.queue, current, self.mode);
    }

    fn report_history(&self, index: usize) {
        let Some(history) = &self.history else {
            return;
        };
        let Some(entry) = self.queue.get(index).and_then(HistoryEntry::from_track) else {
            return;
        };
        let key = entry.key();
        if let Err(e) = history.record(entry) {
            warn!(%key, error = %e, "Failed to record play history");
        }
    }

    // ===== Sink events =====

    fn handle_sink_event(&mut self, event: SinkEvent) {
        trace!(?event, "Sink event");
        if self.current.is_none() {
            return;
        }

        match event {
            SinkEvent::LoadStart => {
                self.status = PlayerStatus::Loading;
            }
            SinkEvent::LoadedMetadata { duration } => {
                self.set_duration(duration);
                self.apply_pending_resume();
            }
            SinkEvent::DurationChange { duration } => {
                self.set_duration(duration);
            }
            SinkEvent::CanPlay => {
                self.mark_ready();
                self.apply_pending_resume();
            }
            SinkEvent::Play => {
                self.is_playing = true;
            }
            SinkEvent::Playing => {
                self.stall_timer.cancel();
                self.is_playing = true;
                self.mark_ready();
            }
            SinkEvent::Pause => {
                self.is_playing = false;
            }
            SinkEvent::TimeUpdate { position } => {
                if position.is_finite() {
                    self.current_time = position.max(0.0);
                }
                self.stall_timer.cancel();
            }
            SinkEvent::Progress { buffered_end } => {
                let (time, percent) = sink::buffered(buffered_end, self.duration);
                self.buffered_time = time;
                self.buffered_percent = percent;
            }
            SinkEvent::Waiting | SinkEvent::Stalled => {
                if self.can_recover_stall() && !self.stall_timer.is_armed() {
                    debug!("Output is waiting for data, arming stall timer");
                    self.stall_timer
                        .arm(self.config.stall_timeout(), &self.inbox);
                }
            }
            SinkEvent::Ended => self.handle_ended(),
            SinkEvent::Error { message } => {
                self.fail(PlaybackFailure::Output(message));
            }
        }
    }

    fn set_duration(&mut self, duration: f64) {
        self.duration = if duration.is_finite() && duration > 0.0 {
            duration
        } else {
            0.0
        };
    }

    fn mark_ready(&mut self) {
        self.load_timer.cancel();
        self.status = PlayerStatus::Ready;
        self.failure = None;
        self.recovery.record_healthy();
    }

    fn apply_pending_resume(&mut self) {
        if let Some(position) = self.pending_resume.take() {
            debug!(position, "Resuming reloaded source");
            self.sink.seek(position);
            self.current_time = position;
        }
    }

    fn handle_ended(&mut self) {
        let Some(current) = self.current else {
            return;
        };

        match mode::end_of_track(self.queue.len(), current, self.mode, &mut self.rng) {
            EndAction::Restart => self.restart(),
            EndAction::Play(index) if index == current => self.restart(),
            EndAction::Play(index) => self.play_at_index(index),
            EndAction::Stop => {
                self.is_playing = false;
            }
        }
    }

    fn restart(&mut self) {
        self.sink.seek(0.0);
        self.current_time = 0.0;
        self.start_playback();
    }

    // ===== Recovery =====

    fn handle_timer(&mut self, kind: TimerKind, token: u64) {
        let slot = match kind {
            TimerKind::Load => &mut self.load_timer,
            TimerKind::Stall => &mut self.stall_timer,
            TimerKind::Advance => &mut self.advance_timer,
        };
        if !slot.fire(token) {
            trace!(?kind, token, "Ignoring superseded timer");
            return;
        }

        match kind {
            TimerKind::Load => {
                if self.status == PlayerStatus::Loading {
                    self.fail(PlaybackFailure::LoadTimeout);
                }
            }
            TimerKind::Stall => self.handle_stall_timeout(),
            TimerKind::Advance => self.advance_after_failure(),
        }
    }

    fn handle_stall_timeout(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        if !self.source_loaded || !self.can_recover_stall() {
            return;
        }

        let action = self.recovery.stall_action(self.downgrade.is_some());
        warn!(index = current, ?action, "Playback stalled");

        match action {
            StallAction::Downgrade => {
                if let (Some(downgrade), Some(track)) =
                    (self.downgrade.clone(), self.queue.get(current).cloned())
                {
                    self.spawn_downgrade(downgrade, track);
                } else {
                    self.reload_in_place(self.current_time);
                }
            }
            StallAction::Reload => self.reload_in_place(self.current_time),
            StallAction::Escalate => self.fail(PlaybackFailure::StallTimeout),
        }
    }

    /// A failed or halted attempt waits for the user, not for stall recovery
    fn can_recover_stall(&self) -> bool {
        self.status != PlayerStatus::Error && !self.recovery.is_halted()
    }

    fn spawn_downgrade(&mut self, downgrade: Arc<dyn QualityDowngrade>, track: Track) {
        self.abort_resolution();
        self.status = PlayerStatus::Loading;
        // The downgrade is bounded like any other stall window
        self.stall_timer
            .arm(self.config.stall_timeout(), &self.inbox);

        let inbox = self.inbox.clone();
        let switch_id = self.switch_id;
        let track_id = track.id.clone();

        self.resolve_task = Some(tokio::spawn(async move {
            let result = downgrade.downgrade(track).await;
            if let Some(inbox) = inbox.upgrade() {
                let _ = inbox.send(Message::Downgraded {
                    switch_id,
                    track_id,
                    result,
                });
            }
        }));
    }

    fn handle_downgraded(
        &mut self,
        switch_id: u64,
        track_id: &str,
        result: std::result::Result<Option<ResolvedSource>, ResolveError>,
    ) {
        if switch_id != self.switch_id {
            debug!(track_id, switch_id, "Discarding stale downgrade");
            return;
        }
        self.resolve_task = None;
        if !self.can_recover_stall() {
            debug!(track_id, "Discarding downgrade for a failed attempt");
            return;
        }
        self.stall_timer.cancel();
        // Seeks made while the downgrade ran move the resume point
        let resume_at = self.current_time;

        match result {
            Ok(Some(source)) => {
                info!(track_id, quality = ?source.quality, "Downgraded stalled track");
                self.queue
                    .update_source(track_id, &source.url, Some(source.quality));
                self.window_dirty = true;
                self.pending_resume = Some(resume_at);
                self.status = PlayerStatus::Loading;
                self.assign_source(&source.url);
            }
            Ok(None) => {
                debug!(track_id, "No lower quality available, reloading");
                self.reload_in_place(resume_at);
            }
            Err(e) => {
                debug!(track_id, error = %e, "Downgrade failed, reloading");
                self.reload_in_place(resume_at);
            }
        }
    }

    fn reload_in_place(&mut self, resume_at: f64) {
        self.stall_timer.cancel();
        self.pending_resume = Some(resume_at);
        self.status = PlayerStatus::Loading;
        self.failure = None;

        if let Err(e) = self.sink.reload() {
            self.fail(PlaybackFailure::Output(e.to_string()));
            return;
        }
        self.source_loaded = true;
        self.load_timer
            .arm(self.config.load_timeout(), &self.inbox);
        self.start_playback();
    }

    /// Record a failed attempt and decide between advancing and halting
    fn fail(&mut self, failure: PlaybackFailure) {
        self.load_timer.cancel();
        self.stall_timer.cancel();
        self.abort_resolution();
        self.status = PlayerStatus::Error;
        warn!(
            index = ?self.current,
            switch_id = self.switch_id,
            error = %failure,
            "Playback attempt failed"
        );
        self.failure = Some(failure);

        match self.recovery.record_failure() {
            FailureAction::Halt => {
                let count = self.recovery.consecutive_failures();
                warn!(count, "Consecutive failure ceiling reached, halting");
                self.advance_timer.cancel();
                self.sink.pause();
                self.is_playing = false;
                self.failure = Some(PlaybackFailure::ConsecutiveFailureCeiling(count));
            }
            FailureAction::Advance if self.queue.len() > 1 => {
                self.advance_timer
                    .arm(self.config.advance_delay(), &self.inbox);
            }
            FailureAction::Advance => {
                self.sink.pause();
                self.is_playing = false;
            }
        }
    }

    fn advance_after_failure(&mut self) {
        let Some(current) = self.current else {
            return;
        };
        if self.recovery.is_halted() {
            return;
        }
        if let Some(index) =
            mode::failure_advance_index(self.queue.len(), current, self.mode, &mut self.rng)
        {
            debug!(from = current, to = index, "Advancing after failure");
            self.play_at_index(index);
        }
    }

    // ===== Teardown =====

    fn cancel_timers(&mut self) {
        self.load_timer.cancel();
        self.stall_timer.cancel();
        self.advance_timer.cancel();
    }

    fn abort_resolution(&mut self) {
        if let Some(task) = self.resolve_task.take() {
            task.abort();
        }
    }

    fn stop_output(&mut self) {
        self.cancel_timers();
        self.abort_resolution();
        self.sink.pause();
        self.is_playing = false;
    }

    // ===== Publishing =====

    fn publish(&mut self) {
        if self.window_dirty {
            self.window_dirty = false;
            self.window = Arc::new(match self.current {
                Some(index) => self.queue.window(index, self.config.window_radius),
                None => QueueWindow {
                    total: self.queue.len(),
                    ..QueueWindow::default()
                },
            });
        }

        let view = PlayerView {
            status: self.status,
            error_message: self.failure.as_ref().map(ToString::to_string),
            failure: self.failure.clone(),
            mode: self.mode,
            is_playing: self.is_playing,
            current_time: self.current_time,
            duration: self.duration,
            buffered_time: self.buffered_time,
            buffered_percent: self.buffered_percent,
            volume: self.volume,
            muted: self.muted,
            consecutive_failures: self.recovery.consecutive_failures(),
            halted: self.recovery.is_halted(),
            window: Arc::clone(&self.window),
        };

        self.view_tx.send_if_modified(|published| {
            if *published == view {
                false
            } else {
                *published = view;
                true
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::NullSink;

    fn tracks(count: usize) -> Vec<Track> {
        (0..count)
            .map(|i| Track::new(format!("{i}"), format!("Track {i}"), format!("http://a/{i}.mp3")))
            .collect()
    }

    #[tokio::test]
    async fn commands_fail_after_shutdown() {
        let engine = PlaybackEngine::builder(NullSink).spawn();
        engine.shutdown().await.unwrap();

        assert!(matches!(
            engine.play_next().await,
            Err(PlaybackError::EngineClosed)
        ));
        assert!(!engine.is_running());
    }

    #[tokio::test]
    async fn navigation_without_queue_is_a_no_op() {
        let engine = PlaybackEngine::builder(NullSink).spawn();
        engine.play_next().await.unwrap();
        engine.toggle().await.unwrap();
        engine.seek(10.0).await.unwrap();

        let view = engine.view();
        assert_eq!(view.status, PlayerStatus::Idle);
        assert!(view.current_track().is_none());
        assert_eq!(view.current_time, 0.0);
    }

    #[tokio::test]
    async fn append_does_not_start_playback() {
        let engine = PlaybackEngine::builder(NullSink).spawn();
        engine.append_tracks(tracks(3)).await.unwrap();

        let view = engine.view();
        assert_eq!(view.window.total, 3);
        assert!(view.current_track().is_none());
        assert!(!view.is_playing);
    }

    #[tokio::test]
    async fn cycle_mode_persists() {
        let settings = Arc::new(MemorySettingsStore::new());
        let engine = PlaybackEngine::builder(NullSink)
            .settings(settings.clone())
            .spawn();

        engine.cycle_mode().await.unwrap();
        assert_eq!(engine.view().mode, PlaybackMode::RepeatOne);
        assert_eq!(
            PlayerSettings::load(settings.as_ref()).mode,
            PlaybackMode::RepeatOne
        );
    }

    #[tokio::test]
    async fn shell_commands_map_onto_navigation() {
        let engine = PlaybackEngine::builder(NullSink).spawn();
        engine.play_tracks(tracks(3), 0).await.unwrap();

        engine.dispatch_shell(ShellCommand::Next).await.unwrap();
        assert_eq!(engine.view().current_index(), Some(1));

        engine.dispatch_shell(ShellCommand::Previous).await.unwrap();
        assert_eq!(engine.view().current_index(), Some(0));

        engine.dispatch_shell(ShellCommand::Toggle).await.unwrap();
        assert!(!engine.view().is_playing);
    }
}
