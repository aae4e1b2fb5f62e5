//! Desktop-shell bridge
//!
//! A tray or taskbar shell shows what is playing and sends back three
//! commands. The outbound side watches the engine view and forwards a small
//! snapshot whenever it changes; the inbound side is
//! [`PlaybackEngine::dispatch_shell`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::engine::PlaybackEngine;
use crate::view::PlayerView;

/// Track details shown by the shell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellTrack {
    pub id: String,
    pub title: String,
    pub artist: Option<String>,
    pub cover_url: Option<String>,
}

/// What the shell displays
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellSnapshot {
    pub is_playing: bool,
    pub current_track: Option<ShellTrack>,
}

impl ShellSnapshot {
    pub fn from_view(view: &PlayerView) -> Self {
        let current_track = view.current_track().map(|track| {
            let artists = track.artist_names();
            ShellTrack {
                id: track.id.clone(),
                title: track.title.clone(),
                artist: if artists.is_empty() {
                    None
                } else {
                    Some(artists.join(" / "))
                },
                cover_url: track.cover_url.clone(),
            }
        });

        Self {
            is_playing: view.is_playing,
            current_track,
        }
    }
}

/// Command sent by the shell
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShellCommand {
    Toggle,
    #[serde(rename = "prev")]
    Previous,
    Next,
}

impl FromStr for ShellCommand {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "toggle" => Ok(ShellCommand::Toggle),
            "prev" => Ok(ShellCommand::Previous),
            "next" => Ok(ShellCommand::Next),
            other => Err(format!("unknown shell command: {other}")),
        }
    }
}

impl fmt::Display for ShellCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ShellCommand::Toggle => "toggle",
            ShellCommand::Previous => "prev",
            ShellCommand::Next => "next",
        })
    }
}

/// Receives snapshots for display
pub trait ShellSink: Send + Sync {
    fn update(&self, snapshot: &ShellSnapshot);
}

/// Outbound half of the bridge
pub struct ShellBridge;

impl ShellBridge {
    /// Forward snapshots to `sink` until the engine shuts down
    ///
    /// The current snapshot is sent immediately; after that only changes are.
    pub fn spawn(engine: &PlaybackEngine, sink: Arc<dyn ShellSink>) -> JoinHandle<()> {
        let mut views = engine.subscribe();

        tokio::spawn(async move {
            let mut last = ShellSnapshot::from_view(&views.borrow_and_update());
            sink.update(&last);

            while views.changed().await.is_ok() {
                let snapshot = ShellSnapshot::from_view(&views.borrow_and_update());
                if snapshot != last {
                    sink.update(&snapshot);
                    last = snapshot;
                }
            }

            debug!("Shell bridge stopped, engine is gone");
        })
    }
}
