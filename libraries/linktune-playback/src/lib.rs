//! LinkTune - Playback Engine
//!
//! Client-side playback core for LinkTune. Tracks come from Subsonic, Emby
//! or aggregation backends; this crate decides what plays, recovers from
//! failures and keeps the observable state consistent.
//!
//! This crate provides:
//! - A full queue with a bounded window published to observers
//! - Loop, repeat-one and shuffle navigation
//! - Load and stall timeouts with in-place retry and quality downgrade
//! - Auto-advance on failure behind a consecutive-failure circuit breaker
//! - Preloading of the next track on a secondary output
//! - Persisted volume, mute and mode
//! - Play history and desktop-shell reporting
//!
//! # Architecture
//!
//! `linktune-playback` is platform-agnostic:
//! - No dependency on a particular audio API
//! - No dependency on a UI toolkit
//! - No dependency on the backend HTTP clients
//!
//! The platform supplies an [`AudioSink`] and pushes [`SinkEvent`]s back.
//! Backends supply [`Track`]s, optionally with a deferred [`UrlResolver`].
//! The engine runs as a single tokio task driven by messages; see
//! [`engine`] for an example.

pub mod config;
pub mod engine;
pub mod error;
pub mod history;
pub mod mode;
pub mod preload;
pub mod queue;
pub mod recovery;
pub mod resolve;
pub mod settings;
pub mod shell;
pub mod sink;
mod timer;
pub mod types;
pub mod view;

// Re-exports
pub use config::PlaybackConfig;
pub use engine::{EngineBuilder, PlaybackEngine};
pub use error::{HistoryError, PlaybackError, ResolveError, Result, SettingsError, SinkError};
pub use history::{HistoryEntry, HistoryRecord, HistorySink, RecentHistory};
pub use mode::EndAction;
pub use queue::{derive_window, Queue, QueueWindow, WINDOW_RADIUS};
pub use recovery::PlaybackFailure;
pub use resolve::{QualityDowngrade, ResolvedSource, StepDownQuality, UrlResolver};
pub use settings::{JsonFileSettingsStore, MemorySettingsStore, PlayerSettings, SettingsStore};
pub use shell::{ShellBridge, ShellCommand, ShellSink, ShellSnapshot, ShellTrack};
pub use sink::{AudioSink, NullSink, PreloadHint, SinkEvent, SinkEvents};
pub use types::{AudioQuality, PlaybackMode, PlayerStatus, Protocol, Track};
pub use view::PlayerView;
