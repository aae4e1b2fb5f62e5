//! Full queue and bounded queue window
//!
//! The engine keeps the complete track list privately and only ever publishes
//! a window of at most `2 * radius + 1` entries around the current track, so
//! observers stay cheap no matter how long the queue grows.

use serde::{Deserialize, Serialize};

use crate::types::{AudioQuality, Track};

/// Tracks kept on each side of the current one in a [`QueueWindow`]
pub const WINDOW_RADIUS: usize = 50;

/// Bounded view of the full queue around the current index
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueWindow {
    /// Contiguous slice of the full queue
    pub tracks: Vec<Track>,

    /// Index of the current track within `tracks`
    pub window_index: usize,

    /// Index of `tracks[0]` within the full queue
    pub window_start: usize,

    /// Length of the full queue
    pub total: usize,
}

impl QueueWindow {
    /// Current track, if the queue is not empty
    pub fn current(&self) -> Option<&Track> {
        self.tracks.get(self.window_index)
    }

    /// Global index of the current track
    pub fn global_index(&self) -> usize {
        self.window_start + self.window_index
    }
}

/// Derive the window around `global_index`
///
/// Out-of-range indices are clamped. An empty queue yields an empty window
/// with index 0.
pub fn derive_window(tracks: &[Track], global_index: usize, radius: usize) -> QueueWindow {
    let len = tracks.len();
    if len == 0 {
        return QueueWindow::default();
    }

    let index = global_index.min(len - 1);
    let window_start = index.saturating_sub(radius);
    let window_end = len.min(index.saturating_add(radius).saturating_add(1));

    QueueWindow {
        tracks: tracks[window_start..window_end].to_vec(),
        window_index: index - window_start,
        window_start,
        total: len,
    }
}

/// The authoritative ordered track list of a playback session
#[derive(Debug, Clone, Default)]
pub struct Queue {
    tracks: Vec<Track>,
}

impl Queue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every track
    pub fn replace(&mut self, tracks: Vec<Track>) {
        self.tracks = tracks;
    }

    /// Append tracks at the end
    pub fn extend(&mut self, tracks: Vec<Track>) {
        self.tracks.extend(tracks);
    }

    /// Insert a track, or merge it into the entry with the same id
    ///
    /// Returns the index of the track in the queue.
    pub fn upsert(&mut self, track: Track) -> usize {
        match self.position(&track.id) {
            Some(index) => {
                self.tracks[index].merge_from(track);
                index
            }
            None => {
                self.tracks.push(track);
                self.tracks.len() - 1
            }
        }
    }

    /// Index of the track with `id`
    pub fn position(&self, id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    pub fn get(&self, index: usize) -> Option<&Track> {
        self.tracks.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Track> {
        self.tracks.get_mut(index)
    }

    /// Clamp an index into range (`None` for an empty queue)
    pub fn clamp_index(&self, index: usize) -> Option<usize> {
        if self.tracks.is_empty() {
            None
        } else {
            Some(index.min(self.tracks.len() - 1))
        }
    }

    /// Record a resolved source on the track with `id`
    ///
    /// This is the only in-place mutation the engine performs on a track.
    pub fn update_source(&mut self, id: &str, url: &str, quality: Option<AudioQuality>) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let track = &mut self.tracks[index];
        track.url = url.to_string();
        if quality.is_some() {
            track.quality = quality;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Window around `index`
    pub fn window(&self, index: usize, radius: usize) -> QueueWindow {
        derive_window(&self.tracks, index, radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_tracks(count: usize) -> Vec<Track> {
        (0..count)
            .map(|i| Track::new(format!("{i}"), format!("Track {i}"), format!("http://a/{i}.mp3")))
            .collect()
    }

    #[test]
    fn empty_queue_gives_empty_window() {
        let window = derive_window(&[], 7, WINDOW_RADIUS);
        assert!(window.tracks.is_empty());
        assert_eq!(window.window_index, 0);
        assert_eq!(window.total, 0);
        assert!(window.current().is_none());
    }

    #[test]
    fn window_is_centered_in_long_queue() {
        let tracks = create_test_tracks(1000);
        let window = derive_window(&tracks, 500, WINDOW_RADIUS);

        assert_eq!(window.tracks.len(), 2 * WINDOW_RADIUS + 1);
        assert_eq!(window.window_start, 450);
        assert_eq!(window.window_index, 50);
        assert_eq!(window.current().unwrap().id, "500");
        assert_eq!(window.total, 1000);
    }

    #[test]
    fn window_is_truncated_at_edges() {
        let tracks = create_test_tracks(80);

        let head = derive_window(&tracks, 3, WINDOW_RADIUS);
        assert_eq!(head.window_start, 0);
        assert_eq!(head.window_index, 3);
        assert_eq!(head.tracks.len(), 54);

        let tail = derive_window(&tracks, 79, WINDOW_RADIUS);
        assert_eq!(tail.window_start, 29);
        assert_eq!(tail.current().unwrap().id, "79");
        assert_eq!(tail.tracks.len(), 51);
    }

    #[test]
    fn out_of_range_index_is_clamped() {
        let tracks = create_test_tracks(3);
        let window = derive_window(&tracks, 99, WINDOW_RADIUS);
        assert_eq!(window.current().unwrap().id, "2");
        assert_eq!(window.global_index(), 2);
    }

    #[test]
    fn upsert_appends_new_and_merges_existing() {
        let mut queue = Queue::new();
        queue.replace(create_test_tracks(2));

        let index = queue.upsert(Track::new("new", "New", "http://a/new.mp3"));
        assert_eq!(index, 2);
        assert_eq!(queue.len(), 3);

        let index = queue.upsert(Track::new("0", "", "").with_cover_url("http://a/cover.jpg"));
        assert_eq!(index, 0);
        assert_eq!(queue.len(), 3);
        let merged = queue.get(0).unwrap();
        assert_eq!(merged.title, "Track 0");
        assert_eq!(merged.cover_url.as_deref(), Some("http://a/cover.jpg"));
    }

    #[test]
    fn update_source_is_visible_by_id() {
        let mut queue = Queue::new();
        queue.replace(vec![Track::new("x", "X", "")]);

        assert!(queue.update_source("x", "http://a/x.flac", Some(AudioQuality::Lossless)));
        assert!(!queue.update_source("missing", "http://a/y", None));

        let track = queue.get(queue.position("x").unwrap()).unwrap();
        assert_eq!(track.url, "http://a/x.flac");
        assert_eq!(track.quality, Some(AudioQuality::Lossless));
    }

    #[test]
    fn clamp_index() {
        let mut queue = Queue::new();
        assert_eq!(queue.clamp_index(0), None);

        queue.replace(create_test_tracks(2));
        assert_eq!(queue.clamp_index(5), Some(1));
        assert_eq!(queue.clamp_index(0), Some(0));
    }
}
