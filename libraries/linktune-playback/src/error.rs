//! Error types for the playback engine
//!
//! Playback-health problems (timeouts, stalls, sink failures) are not errors in
//! this sense: they are reported through [`crate::PlayerView`] as a
//! [`crate::PlaybackFailure`]. The types here cover the API surface only.

use thiserror::Error;

/// Playback engine errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The engine actor has shut down
    #[error("Playback engine is no longer running")]
    EngineClosed,

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Settings persistence failed
    #[error(transparent)]
    Settings(#[from] SettingsError),
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PlaybackError>;

/// Errors reported by a platform audio sink
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// The platform refused to start playback (e.g. autoplay policy)
    #[error("Playback was not allowed: {0}")]
    NotAllowed(String),

    /// The source could not be assigned or loaded
    #[error("Failed to load source: {0}")]
    Load(String),

    /// Any other platform failure
    #[error("Audio sink error: {0}")]
    Platform(String),
}

/// Errors from deferred URL resolution
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    /// The backend rejected the request
    #[error("Backend rejected resolution: {0}")]
    Rejected(String),

    /// The backend answered with an empty address
    #[error("Resolved URL is empty")]
    Empty,

    /// The track has no resolver and no URL
    #[error("Track has no playable URL")]
    Unresolvable,
}

/// Settings store errors
#[derive(Debug, Error)]
pub enum SettingsError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The persisted document is malformed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store lock was poisoned by a panicking writer
    #[error("Settings store is poisoned")]
    Poisoned,
}

/// History sink errors
#[derive(Debug, Error)]
pub enum HistoryError {
    /// The sink rejected the entry
    #[error("History sink rejected entry: {0}")]
    Rejected(String),

    /// The sink is unavailable
    #[error("History sink unavailable")]
    Unavailable,
}
