#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Core contracts shared across the evacuation alert engine.
//!
//! This crate defines the message surface that connects the host adapter, the
//! authoritative world, and the reactive presenters. Adapters submit
//! [`Command`] values describing desired mutations, the world executes those
//! commands via its `apply` entry point, and then reports [`Event`] values.
//! Alert level changes are additionally pushed synchronously to every
//! registered [`LevelListener`].

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Commands that express all permissible world mutations.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    /// Advances the alert clock by the provided host frame delta.
    Tick {
        /// Scaled frame delta reported by the host, in seconds.
        dt_seconds: f32,
    },
    /// Resumes the alert clock.
    StartClock,
    /// Pauses the alert clock without discarding elapsed time.
    StopClock,
    /// Re-initialises the alert clock at the provided elapsed time.
    ///
    /// No level change is broadcast, so presenters keep showing the level from
    /// before the reset until the host enables them again through the world.
    ResetClock {
        /// Elapsed time to restart from. Values past the total are clamped.
        start_elapsed: Duration,
    },
    /// Acknowledges an expired clock and decides the game outcome.
    ResolveTimeUp {
        /// Whether the player stood inside a safe zone when time ran out.
        player_in_safe_zone: bool,
    },
    /// Forces a final outcome while the game is still being played.
    ForceOutcome {
        /// Outcome to apply.
        outcome: Outcome,
    },
}

/// Events reported by the world after processing commands.
#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The alert level moved forward. Intermediate levels are never reported.
    AlertLevelChanged {
        /// Levels before and after the transition.
        change: LevelChange,
    },
    /// The clock reached its total duration and stopped.
    TimeExpired,
    /// A tick carried an unusable delta and was ignored.
    TickRejected {
        /// Why the delta was rejected.
        reason: DeltaError,
    },
    /// The clock switched from stopped to running.
    ClockStarted,
    /// The clock switched from running to stopped.
    ClockStopped,
    /// The clock was re-initialised without broadcasting a level change.
    ClockReset {
        /// Level recomputed from the reset elapsed time.
        level: AlertLevel,
    },
    /// The game reached a final outcome.
    OutcomeDecided {
        /// Outcome that became active.
        outcome: Outcome,
    },
}

/// Discrete alert level derived from elapsed time. Always at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub struct AlertLevel(u32);

impl AlertLevel {
    /// Level every clock starts in.
    pub const FIRST: Self = Self(1);

    /// Creates a new alert level. Zero is normalised to [`AlertLevel::FIRST`].
    #[must_use]
    pub const fn new(value: u32) -> Self {
        if value == 0 {
            Self::FIRST
        } else {
            Self(value)
        }
    }

    /// Retrieves the numeric representation of the level.
    #[must_use]
    pub const fn get(&self) -> u32 {
        self.0
    }
}

impl Default for AlertLevel {
    fn default() -> Self {
        Self::FIRST
    }
}

impl From<u32> for AlertLevel {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

impl From<AlertLevel> for u32 {
    fn from(level: AlertLevel) -> Self {
        level.0
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Lv.{}", self.0)
    }
}

/// Pair of levels describing a single forward transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LevelChange {
    /// Level that was active before the transition.
    pub previous: AlertLevel,
    /// Level that is active after the transition.
    pub next: AlertLevel,
}

impl LevelChange {
    /// Creates a new level change description.
    #[must_use]
    pub const fn new(previous: AlertLevel, next: AlertLevel) -> Self {
        Self { previous, next }
    }
}

/// Final state of a play session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    /// The session is still in progress.
    Playing,
    /// The player reached safety in time.
    Clear,
    /// The player failed to evacuate.
    GameOver,
}

/// Receives alert level transitions pushed by the subscription hub.
pub trait LevelListener {
    /// Handles a single transition. Invoked synchronously during a tick.
    fn on_level_changed(&mut self, change: LevelChange);
}

/// RGBA color used by presenters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Red channel intensity in the range 0.0..=1.0.
    pub red: f32,
    /// Green channel intensity in the range 0.0..=1.0.
    pub green: f32,
    /// Blue channel intensity in the range 0.0..=1.0.
    pub blue: f32,
    /// Alpha channel intensity in the range 0.0..=1.0.
    pub alpha: f32,
}

impl Color {
    /// Opaque white.
    pub const WHITE: Self = Self::new(1.0, 1.0, 1.0, 1.0);

    /// Creates a new color from floating point channels.
    #[must_use]
    pub const fn new(red: f32, green: f32, blue: f32, alpha: f32) -> Self {
        Self {
            red,
            green,
            blue,
            alpha,
        }
    }

    /// Returns the same color with its alpha channel replaced.
    #[must_use]
    pub const fn with_alpha(self, alpha: f32) -> Self {
        Self { alpha, ..self }
    }
}

/// Identifier of an audio clip supplied by the host's asset layer.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(String);

impl ClipId {
    /// Creates a clip identifier from its asset name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Asset name of the clip.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of the scene currently loaded by the host.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SceneId(String);

impl SceneId {
    /// Creates a scene identifier from the scene name.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Name of the scene.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SceneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Frame timing supplied to animated presenters.
///
/// `scaled` follows the game's time scale and stops while paused, `unscaled`
/// follows real time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameTime {
    scaled: Duration,
    unscaled: Duration,
}

impl FrameTime {
    /// Creates frame timing from already validated durations.
    #[must_use]
    pub const fn new(scaled: Duration, unscaled: Duration) -> Self {
        Self { scaled, unscaled }
    }

    /// Creates frame timing where scaled and real time advance equally.
    #[must_use]
    pub const fn uniform(dt: Duration) -> Self {
        Self::new(dt, dt)
    }

    /// Validates raw host deltas expressed in seconds.
    pub fn try_from_secs(scaled: f32, unscaled: f32) -> Result<Self, DeltaError> {
        Ok(Self::new(delta_from_secs(scaled)?, delta_from_secs(unscaled)?))
    }

    /// Delta following the game's time scale.
    #[must_use]
    pub const fn scaled(&self) -> Duration {
        self.scaled
    }

    /// Delta following real time.
    #[must_use]
    pub const fn unscaled(&self) -> Duration {
        self.unscaled
    }

    /// Picks the unscaled delta when requested, otherwise the scaled one.
    #[must_use]
    pub const fn select(&self, unscaled: bool) -> Duration {
        if unscaled {
            self.unscaled
        } else {
            self.scaled
        }
    }
}

/// Converts a host delta in seconds into a [`Duration`], rejecting time that
/// runs backwards or is not a number.
///
/// Finite deltas too large for a [`Duration`] saturate at [`Duration::MAX`];
/// consumers clamp them to their own bounds.
pub fn delta_from_secs(seconds: f32) -> Result<Duration, DeltaError> {
    if !seconds.is_finite() {
        return Err(DeltaError::NotFinite);
    }
    if seconds < 0.0 {
        return Err(DeltaError::Negative { seconds });
    }
    Ok(Duration::try_from_secs_f32(seconds).unwrap_or(Duration::MAX))
}

/// Reasons a frame delta may be rejected.
#[derive(Clone, Copy, Debug, PartialEq, Error)]
pub enum DeltaError {
    /// Time never runs backwards.
    #[error("frame delta must not be negative (got {seconds}s)")]
    Negative {
        /// Offending delta in seconds.
        seconds: f32,
    },
    /// NaN or infinite delta.
    #[error("frame delta must be a finite number")]
    NotFinite,
}

/// Errors raised while validating component configuration.
#[derive(Clone, Debug, PartialEq, Error)]
pub enum ConfigError {
    /// No level thresholds were supplied.
    #[error("level thresholds must not be empty")]
    EmptyThresholds,
    /// A threshold was NaN or infinite.
    #[error("level threshold {index} is not finite ({value})")]
    NonFiniteThreshold {
        /// Position of the threshold in the supplied list.
        index: usize,
        /// Offending value in seconds.
        value: f32,
    },
    /// Thresholds were still out of order after sorting and forcing the first
    /// to zero, which happens when more than one threshold is negative.
    #[error("level threshold {index} precedes the zero start after normalisation")]
    UnsortedThresholds {
        /// Position of the first offending threshold after sorting.
        index: usize,
    },
    /// A scalar setting was outside its permitted range.
    #[error("invalid value for `{field}`: {message}")]
    InvalidValue {
        /// Name of the offending setting.
        field: &'static str,
        /// Human readable constraint that was violated.
        message: String,
    },
}

impl ConfigError {
    /// Convenience constructor for [`ConfigError::InvalidValue`].
    #[must_use]
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_level_normalises_to_first() {
        assert_eq!(AlertLevel::new(0), AlertLevel::FIRST);
        assert_eq!(AlertLevel::new(3).get(), 3);
    }

    #[test]
    fn alert_level_displays_as_label() {
        assert_eq!(AlertLevel::new(4).to_string(), "Lv.4");
    }

    #[test]
    fn negative_delta_is_rejected() {
        assert_eq!(
            delta_from_secs(-0.5),
            Err(DeltaError::Negative { seconds: -0.5 })
        );
        assert_eq!(delta_from_secs(f32::NAN), Err(DeltaError::NotFinite));
        assert_eq!(delta_from_secs(0.0), Ok(Duration::ZERO));
    }

    #[test]
    fn oversized_delta_saturates() {
        assert_eq!(delta_from_secs(1e20), Ok(Duration::MAX));
        assert_eq!(delta_from_secs(f32::MAX), Ok(Duration::MAX));
        assert_eq!(delta_from_secs(f32::INFINITY), Err(DeltaError::NotFinite));
    }

    #[test]
    fn frame_time_selects_requested_clock() {
        let frame = FrameTime::new(Duration::ZERO, Duration::from_millis(16));
        assert_eq!(frame.select(true), Duration::from_millis(16));
        assert_eq!(frame.select(false), Duration::ZERO);
    }

    #[test]
    fn config_types_deserialize_from_toml() {
        #[derive(Deserialize)]
        struct Sample {
            tint: Color,
            clip: ClipId,
            level: AlertLevel,
        }

        let sample: Sample = toml::from_str(
            "clip = \"bgm_tense\"\nlevel = 0\ntint = { red = 1.0, green = 0.0, blue = 0.0, alpha = 0.35 }\n",
        )
        .expect("parse sample");

        assert_eq!(sample.clip.as_str(), "bgm_tense");
        assert_eq!(sample.level, AlertLevel::FIRST);
        assert_eq!(sample.tint, Color::new(1.0, 0.0, 0.0, 0.35));
    }
}
