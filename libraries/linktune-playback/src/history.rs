//! Play history reporting
//!
//! The engine reports each successful play start to a [`HistorySink`]. The
//! sink is fire-and-forget: its failures are logged and never reach playback.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::HistoryError;
use crate::types::Track;

/// One play start, as reported to the history collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub name: String,
    pub artists: Vec<String>,
    pub platform: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,
}

impl HistoryEntry {
    /// Entry for `track`, or `None` if it carries no platform tag
    pub fn from_track(track: &Track) -> Option<Self> {
        let platform = track.platform.as_deref().filter(|p| !p.is_empty())?;
        Some(Self {
            id: track.id.clone(),
            name: track.title.clone(),
            artists: track.artist_names(),
            platform: platform.to_string(),
            cover_url: track.cover_url.clone(),
        })
    }

    /// Storage key (`platform:id`)
    pub fn key(&self) -> String {
        format!("{}:{}", self.platform, self.id)
    }
}

/// External history persistence
pub trait HistorySink: Send + Sync {
    fn record(&self, entry: HistoryEntry) -> Result<(), HistoryError>;
}

/// A remembered play with its count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub entry: HistoryEntry,
    pub play_count: u32,
}

/// Bounded in-memory history
///
/// Most recent first. Replaying a known track moves it to the front and bumps
/// its play count; once full, the oldest record is discarded.
#[derive(Debug)]
pub struct RecentHistory {
    records: Mutex<VecDeque<HistoryRecord>>,
    max_size: usize,
}

impl RecentHistory {
    pub fn new(max_size: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(max_size)),
            max_size,
        }
    }

    /// All records, most recent first
    pub fn records(&self) -> Vec<HistoryRecord> {
        self.records
            .lock()
            .map(|records| records.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl Default for RecentHistory {
    fn default() -> Self {
        Self::new(100)
    }
}

impl HistorySink for RecentHistory {
    fn record(&self, entry: HistoryEntry) -> Result<(), HistoryError> {
        let mut records = self.records.lock().map_err(|_| HistoryError::Unavailable)?;
        let key = entry.key();

        let play_count = match records.iter().position(|r| r.entry.key() == key) {
            Some(index) => records
                .remove(index)
                .map_or(1, |r| r.play_count.saturating_add(1)),
            None => 1,
        };

        if self.max_size == 0 {
            return Ok(());
        }
        while records.len() >= self.max_size {
            records.pop_back();
        }
        records.push_front(HistoryRecord { entry, play_count });
        Ok(())
    }
}
