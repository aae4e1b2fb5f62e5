//! Core types for playback management

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::resolve::UrlResolver;

/// A playable unit, as produced by a backend collaborator
///
/// `url` may start empty when the backend can only produce an address on
/// demand; `resolver` is then consulted at switch time. The engine writes the
/// resolved `url` / `quality` back onto its queued copy and never touches any
/// other field.
#[derive(Clone, Serialize, Deserialize)]
pub struct Track {
    /// Identifier, unique within a queue
    pub id: String,

    /// Track title
    pub title: String,

    /// Display artist
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,

    /// Individual artist names, when the backend provides them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artists: Option<Vec<String>>,

    /// Cover art address
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_url: Option<String>,

    /// Resolved playable address (empty until known)
    #[serde(default)]
    pub url: String,

    /// Backend protocol that produced the track
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,

    /// Quality the current `url` was resolved at
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<AudioQuality>,

    /// Source platform tag for aggregated tracks (e.g. "netease")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,

    /// Deferred resolver used when `url` is empty
    #[serde(skip)]
    pub resolver: Option<Arc<dyn UrlResolver>>,
}

impl Track {
    /// Create a track with a known URL (which may be empty)
    pub fn new(id: impl Into<String>, title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: None,
            artists: None,
            cover_url: None,
            url: url.into(),
            protocol: None,
            quality: None,
            platform: None,
            resolver: None,
        }
    }

    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_artists(mut self, artists: Vec<String>) -> Self {
        self.artists = Some(artists);
        self
    }

    pub fn with_cover_url(mut self, cover_url: impl Into<String>) -> Self {
        self.cover_url = Some(cover_url.into());
        self
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = Some(protocol);
        self
    }

    pub fn with_quality(mut self, quality: AudioQuality) -> Self {
        self.quality = Some(quality);
        self
    }

    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn UrlResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Whether a playable address is already known
    pub fn has_url(&self) -> bool {
        !self.url.is_empty()
    }

    /// Artist names for display and history, falling back to `artist`
    pub fn artist_names(&self) -> Vec<String> {
        match (&self.artists, &self.artist) {
            (Some(names), _) if !names.is_empty() => names.clone(),
            (_, Some(artist)) => vec![artist.clone()],
            _ => Vec::new(),
        }
    }

    /// Merge metadata supplied by a newer copy of the same track
    ///
    /// Fields present on `incoming` replace ours; fields it leaves out are kept.
    pub fn merge_from(&mut self, incoming: Track) {
        if !incoming.title.is_empty() {
            self.title = incoming.title;
        }
        if incoming.artist.is_some() {
            self.artist = incoming.artist;
        }
        if incoming.artists.is_some() {
            self.artists = incoming.artists;
        }
        if incoming.cover_url.is_some() {
            self.cover_url = incoming.cover_url;
        }
        if !incoming.url.is_empty() {
            self.url = incoming.url;
        }
        if incoming.protocol.is_some() {
            self.protocol = incoming.protocol;
        }
        if incoming.quality.is_some() {
            self.quality = incoming.quality;
        }
        if incoming.platform.is_some() {
            self.platform = incoming.platform;
        }
        if incoming.resolver.is_some() {
            self.resolver = incoming.resolver;
        }
    }
}

impl fmt::Debug for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Track")
            .field("id", &self.id)
            .field("title", &self.title)
            .field("artist", &self.artist)
            .field("artists", &self.artists)
            .field("cover_url", &self.cover_url)
            .field("url", &self.url)
            .field("protocol", &self.protocol)
            .field("quality", &self.quality)
            .field("platform", &self.platform)
            .field("resolver", &self.resolver.as_ref().map(|_| "<resolver>"))
            .finish()
    }
}

// Resolvers are compared by identity; two tracks are equal only if they
// would resolve through the same object.
impl PartialEq for Track {
    fn eq(&self, other: &Self) -> bool {
        let same_resolver = match (&self.resolver, &other.resolver) {
            (None, None) => true,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            _ => false,
        };
        same_resolver
            && self.id == other.id
            && self.title == other.title
            && self.artist == other.artist
            && self.artists == other.artists
            && self.cover_url == other.cover_url
            && self.url == other.url
            && self.protocol == other.protocol
            && self.quality == other.quality
            && self.platform == other.platform
    }
}

/// Backend protocol a track came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    /// Subsonic-compatible media server
    Navidrome,
    /// Emby / Jellyfin media server
    Emby,
    /// Third-party aggregation service
    Custom,
}

/// Streaming quality tier
///
/// Ordered from lowest to highest.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum AudioQuality {
    /// 128 kbps
    Low,
    /// 192 kbps
    Medium,
    /// 320 kbps
    #[default]
    High,
    /// Original file, no bitrate cap
    Lossless,
}

impl AudioQuality {
    /// Maximum bitrate in bits per second (`None` = uncapped)
    pub fn max_bitrate(self) -> Option<u32> {
        match self {
            AudioQuality::Low => Some(128_000),
            AudioQuality::Medium => Some(192_000),
            AudioQuality::High => Some(320_000),
            AudioQuality::Lossless => None,
        }
    }

    /// Next tier down, or `None` at the bottom
    pub fn lower(self) -> Option<Self> {
        match self {
            AudioQuality::Low => None,
            AudioQuality::Medium => Some(AudioQuality::Low),
            AudioQuality::High => Some(AudioQuality::Medium),
            AudioQuality::Lossless => Some(AudioQuality::High),
        }
    }
}

/// Playback mode
///
/// Persisted by tag (`loop`, `one`, `shuffle`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackMode {
    /// Play the queue in order, wrapping at the end
    #[default]
    #[serde(rename = "loop")]
    Loop,

    /// Restart the current track when it ends
    #[serde(rename = "one")]
    RepeatOne,

    /// Pick a random track each time
    #[serde(rename = "shuffle")]
    Shuffle,
}

impl PlaybackMode {
    /// Next mode in the user-facing cycle
    pub fn cycle(self) -> Self {
        match self {
            PlaybackMode::Loop => PlaybackMode::RepeatOne,
            PlaybackMode::RepeatOne => PlaybackMode::Shuffle,
            PlaybackMode::Shuffle => PlaybackMode::Loop,
        }
    }

    /// Persisted tag
    pub fn as_str(self) -> &'static str {
        match self {
            PlaybackMode::Loop => "loop",
            PlaybackMode::RepeatOne => "one",
            PlaybackMode::Shuffle => "shuffle",
        }
    }
}

impl FromStr for PlaybackMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "loop" => Ok(PlaybackMode::Loop),
            "one" => Ok(PlaybackMode::RepeatOne),
            "shuffle" => Ok(PlaybackMode::Shuffle),
            other => Err(format!("unknown playback mode: {other}")),
        }
    }
}

impl fmt::Display for PlaybackMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Externally visible player health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerStatus {
    /// Nothing loaded yet
    #[default]
    Idle,
    /// A switch is in flight (resolving or buffering)
    Loading,
    /// The sink reported the source playable
    Ready,
    /// The last attempt failed
    Error,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_cycles_in_fixed_order() {
        let mode = PlaybackMode::Loop;
        assert_eq!(mode.cycle(), PlaybackMode::RepeatOne);
        assert_eq!(mode.cycle().cycle(), PlaybackMode::Shuffle);
        assert_eq!(mode.cycle().cycle().cycle(), PlaybackMode::Loop);
    }

    #[test]
    fn mode_tags_parse() {
        for mode in [PlaybackMode::Loop, PlaybackMode::RepeatOne, PlaybackMode::Shuffle] {
            assert_eq!(mode.as_str().parse::<PlaybackMode>(), Ok(mode));
        }
        assert!("repeat".parse::<PlaybackMode>().is_err());
    }

    #[test]
    fn mode_serializes_to_persisted_tag() {
        let json = serde_json::to_string(&PlaybackMode::RepeatOne).unwrap();
        assert_eq!(json, "\"one\"");
    }

    #[test]
    fn quality_steps_down_to_low() {
        assert_eq!(AudioQuality::Lossless.lower(), Some(AudioQuality::High));
        assert_eq!(AudioQuality::High.lower(), Some(AudioQuality::Medium));
        assert_eq!(AudioQuality::Medium.lower(), Some(AudioQuality::Low));
        assert_eq!(AudioQuality::Low.lower(), None);
        assert_eq!(AudioQuality::Lossless.max_bitrate(), None);
        assert_eq!(AudioQuality::High.max_bitrate(), Some(320_000));
    }

    #[test]
    fn merge_keeps_fields_the_newer_copy_omits() {
        let mut existing = Track::new("1", "Song", "http://a/1.mp3").with_artist("Artist");
        let incoming = Track::new("1", "", "").with_cover_url("http://a/cover.jpg");

        existing.merge_from(incoming);

        assert_eq!(existing.title, "Song");
        assert_eq!(existing.url, "http://a/1.mp3");
        assert_eq!(existing.artist.as_deref(), Some("Artist"));
        assert_eq!(existing.cover_url.as_deref(), Some("http://a/cover.jpg"));
    }

    #[test]
    fn artist_names_prefer_artist_list() {
        let track = Track::new("1", "Song", "")
            .with_artist("A & B")
            .with_artists(vec!["A".to_string(), "B".to_string()]);
        assert_eq!(track.artist_names(), vec!["A", "B"]);

        let track = Track::new("2", "Song", "").with_artist("Solo");
        assert_eq!(track.artist_names(), vec!["Solo"]);
    }

    #[test]
    fn track_deserializes_without_resolver() {
        let track: Track =
            serde_json::from_str(r#"{"id":"x","title":"T","protocol":"emby"}"#).unwrap();
        assert_eq!(track.protocol, Some(Protocol::Emby));
        assert!(!track.has_url());
        assert!(track.resolver.is_none());
    }
}
