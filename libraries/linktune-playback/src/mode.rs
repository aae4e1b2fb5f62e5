//! Playback mode decisions
//!
//! Pure functions over `(queue length, current index, mode)`. Randomness is
//! injected so callers (and tests) control the generator.

use rand::Rng;

use crate::types::PlaybackMode;

/// Attempts made to avoid re-selecting the current track in shuffle
const SHUFFLE_ATTEMPTS: usize = 8;

/// What to do when the current track finishes on its own
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndAction {
    /// Seek back to zero and keep playing the same index
    Restart,

    /// Switch to another index
    Play(usize),

    /// Nothing left to play
    Stop,
}

/// Uniformly pick an index other than `exclude`
///
/// Retries a bounded number of times, then falls back to the sequential
/// successor, so it always terminates. With `len <= 1` returns `exclude`.
pub fn pick_random_index<R: Rng + ?Sized>(len: usize, exclude: usize, rng: &mut R) -> usize {
    if len <= 1 {
        return exclude;
    }

    for _ in 0..SHUFFLE_ATTEMPTS {
        let candidate = rng.gen_range(0..len);
        if candidate != exclude {
            return candidate;
        }
    }

    (exclude + 1) % len
}

/// Index for an explicit "next" command
///
/// Repeat-one only governs unattended track ends, so it navigates like loop.
/// Returns `None` for an empty queue.
pub fn next_index<R: Rng + ?Sized>(
    len: usize,
    current: usize,
    mode: PlaybackMode,
    rng: &mut R,
) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(match mode {
        PlaybackMode::Shuffle => pick_random_index(len, current, rng),
        PlaybackMode::Loop | PlaybackMode::RepeatOne => (current + 1) % len,
    })
}

/// Index for an explicit "previous" command
pub fn prev_index<R: Rng + ?Sized>(
    len: usize,
    current: usize,
    mode: PlaybackMode,
    rng: &mut R,
) -> Option<usize> {
    if len == 0 {
        return None;
    }
    Some(match mode {
        PlaybackMode::Shuffle => pick_random_index(len, current, rng),
        PlaybackMode::Loop | PlaybackMode::RepeatOne => {
            if current == 0 || current >= len {
                len - 1
            } else {
                current - 1
            }
        }
    })
}

/// Decision for a natural end of track
pub fn end_of_track<R: Rng + ?Sized>(
    len: usize,
    current: usize,
    mode: PlaybackMode,
    rng: &mut R,
) -> EndAction {
    if len == 0 {
        return EndAction::Stop;
    }
    match mode {
        PlaybackMode::RepeatOne => EndAction::Restart,
        PlaybackMode::Shuffle => EndAction::Play(pick_random_index(len, current, rng)),
        PlaybackMode::Loop => {
            if current + 1 < len {
                EndAction::Play(current + 1)
            } else {
                EndAction::Play(0)
            }
        }
    }
}

/// Target of an automatic advance after a failure
///
/// Repeat-one does not retry the failing track; it moves on like loop.
/// Returns `None` when there is nowhere else to go (`len <= 1`).
pub fn failure_advance_index<R: Rng + ?Sized>(
    len: usize,
    current: usize,
    mode: PlaybackMode,
    rng: &mut R,
) -> Option<usize> {
    if len <= 1 {
        return None;
    }
    Some(match mode {
        PlaybackMode::Shuffle => pick_random_index(len, current, rng),
        PlaybackMode::Loop | PlaybackMode::RepeatOne => (current + 1) % len,
    })
}

/// Sequential successor used for preloading
///
/// `None` under shuffle, where the next track is not known yet.
pub fn predicted_next(len: usize, current: usize, mode: PlaybackMode) -> Option<usize> {
    if len <= 1 || mode == PlaybackMode::Shuffle {
        return None;
    }
    Some((current + 1) % len)
}
