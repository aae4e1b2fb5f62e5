//! Deferred URL resolution
//!
//! Backend clients hand the engine either a track with a known `url` or one
//! carrying a [`UrlResolver`]. Resolution is the engine's only await point
//! besides its timers.

use async_trait::async_trait;

use crate::error::ResolveError;
use crate::types::{AudioQuality, Track};

/// Produces a playable address for a track on demand
#[async_trait]
pub trait UrlResolver: Send + Sync {
    /// Resolve the track at the requested quality
    ///
    /// An empty string is treated the same as an error.
    async fn resolve(&self, quality: AudioQuality) -> std::result::Result<String, ResolveError>;
}

/// A freshly resolved source for a track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    /// Playable address
    pub url: String,

    /// Quality the address was resolved at
    pub quality: AudioQuality,
}

/// Caller-supplied stall recovery at a lower bitrate
///
/// Returning `Ok(None)` means no lower tier is available and the engine
/// falls back to reloading the current source.
#[async_trait]
pub trait QualityDowngrade: Send + Sync {
    async fn downgrade(
        &self,
        track: Track,
    ) -> std::result::Result<Option<ResolvedSource>, ResolveError>;
}

/// Downgrade one quality tier through the track's own resolver
#[derive(Debug, Clone, Copy, Default)]
pub struct StepDownQuality;

#[async_trait]
impl QualityDowngrade for StepDownQuality {
    async fn downgrade(
        &self,
        track: Track,
    ) -> std::result::Result<Option<ResolvedSource>, ResolveError> {
        let Some(resolver) = track.resolver.as_ref() else {
            return Ok(None);
        };
        let Some(lower) = track.quality.unwrap_or_default().lower() else {
            return Ok(None);
        };

        let url = resolver.resolve(lower).await?;
        if url.is_empty() {
            return Err(ResolveError::Empty);
        }

        Ok(Some(ResolvedSource {
            url,
            quality: lower,
        }))
    }
}

/// Resolve `track` at `quality`, rejecting empty answers
pub(crate) async fn resolve_track(
    track: Track,
    quality: AudioQuality,
) -> std::result::Result<ResolvedSource, ResolveError> {
    let resolver = track.resolver.ok_or(ResolveError::Unresolvable)?;
    let url = resolver.resolve(quality).await?;
    if url.is_empty() {
        return Err(ResolveError::Empty);
    }
    Ok(ResolvedSource { url, quality })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct BitrateResolver;

    #[async_trait]
    impl UrlResolver for BitrateResolver {
        async fn resolve(&self, quality: AudioQuality) -> std::result::Result<String, ResolveError> {
            Ok(format!(
                "http://media/stream?maxBitRate={}",
                quality.max_bitrate().unwrap_or(0)
            ))
        }
    }

    struct EmptyResolver;

    #[async_trait]
    impl UrlResolver for EmptyResolver {
        async fn resolve(&self, _quality: AudioQuality) -> std::result::Result<String, ResolveError> {
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn step_down_resolves_one_tier_lower() {
        let track = Track::new("1", "Song", "http://media/stream?maxBitRate=320000")
            .with_quality(AudioQuality::High)
            .with_resolver(Arc::new(BitrateResolver));

        let source = StepDownQuality.downgrade(track).await.unwrap().unwrap();

        assert_eq!(source.quality, AudioQuality::Medium);
        assert_eq!(source.url, "http://media/stream?maxBitRate=192000");
    }

    #[tokio::test]
    async fn step_down_stops_at_lowest_tier() {
        let track = Track::new("1", "Song", "u")
            .with_quality(AudioQuality::Low)
            .with_resolver(Arc::new(BitrateResolver));

        assert_eq!(StepDownQuality.downgrade(track).await.unwrap(), None);
    }

    #[tokio::test]
    async fn step_down_without_resolver_is_unavailable() {
        let track = Track::new("1", "Song", "u").with_quality(AudioQuality::High);
        assert_eq!(StepDownQuality.downgrade(track).await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_resolution_is_an_error() {
        let track = Track::new("1", "Song", "").with_resolver(Arc::new(EmptyResolver));
        assert_eq!(
            resolve_track(track, AudioQuality::High).await,
            Err(ResolveError::Empty)
        );

        let bare = Track::new("2", "Song", "");
        assert_eq!(
            resolve_track(bare, AudioQuality::High).await,
            Err(ResolveError::Unresolvable)
        );
    }
}
