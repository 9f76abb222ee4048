//! Authoritative alert level clock.

use std::time::Duration;

use evacuation_core::{delta_from_secs, AlertLevel, ConfigError, DeltaError, Event, LevelChange};
use serde::Deserialize;
use tracing::{debug, info, warn};

const DEFAULT_TOTAL_SECONDS: f32 = 300.0;
const DEFAULT_THRESHOLDS_SECONDS: [f32; 5] = [0.0, 60.0, 120.0, 210.0, 270.0];

/// Author-supplied clock settings, validated by [`LevelClock::new`].
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    /// Length of a full session in seconds. Must be positive.
    pub total_duration_seconds: f32,
    /// Elapsed time, in seconds, at which each level begins. Sorted on
    /// construction and the first entry is forced to zero.
    pub level_thresholds_seconds: Vec<f32>,
    /// Whether the owning world starts the clock as soon as it is built.
    pub auto_start: bool,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            total_duration_seconds: DEFAULT_TOTAL_SECONDS,
            level_thresholds_seconds: DEFAULT_THRESHOLDS_SECONDS.to_vec(),
            auto_start: true,
        }
    }
}

/// Time-driven state machine mapping elapsed time onto alert levels.
///
/// The clock never moves backwards while running: levels only increase, and
/// reaching the total duration stops it until [`LevelClock::reset`] is called.
#[derive(Clone, Debug)]
pub struct LevelClock {
    elapsed: Duration,
    total: Duration,
    thresholds: Vec<Duration>,
    level: AlertLevel,
    running: bool,
}

impl LevelClock {
    /// Builds a stopped clock at zero elapsed time.
    pub fn new(config: &ClockConfig) -> Result<Self, ConfigError> {
        let total = positive_duration(config.total_duration_seconds)?;
        let thresholds = normalize_thresholds(&config.level_thresholds_seconds)?;
        let mut clock = Self {
            elapsed: Duration::ZERO,
            total,
            thresholds,
            level: AlertLevel::FIRST,
            running: false,
        };
        clock.level = clock.level_at(clock.elapsed);
        Ok(clock)
    }

    /// Advances the clock by a host delta expressed in seconds.
    ///
    /// Negative or non-finite deltas are rejected and leave the clock untouched.
    pub fn advance(&mut self, dt_seconds: f32, out_events: &mut Vec<Event>) -> Result<(), DeltaError> {
        let dt = delta_from_secs(dt_seconds).map_err(|error| {
            warn!(dt_seconds, %error, "clock_delta_rejected");
            error
        })?;
        self.advance_by(dt, out_events);
        Ok(())
    }

    /// Advances the clock by an already validated delta.
    ///
    /// Emits at most one [`Event::AlertLevelChanged`], carrying the level before
    /// the call and the final level, even when several thresholds were crossed.
    /// [`Event::TimeExpired`] follows when the total duration is reached.
    pub fn advance_by(&mut self, dt: Duration, out_events: &mut Vec<Event>) {
        if !self.running || self.is_expired() {
            return;
        }

        self.elapsed = self.elapsed.saturating_add(dt).min(self.total);

        let next = self.level_at(self.elapsed);
        if next != self.level {
            let change = LevelChange::new(self.level, next);
            self.level = next;
            debug!(
                previous = change.previous.get(),
                next = change.next.get(),
                elapsed_ms = self.elapsed.as_millis() as u64,
                "alert_level_changed"
            );
            out_events.push(Event::AlertLevelChanged { change });
        }

        if self.is_expired() {
            self.running = false;
            info!(level = self.level.get(), "time_expired");
            out_events.push(Event::TimeExpired);
        }
    }

    /// Starts the clock. Returns `true` when the running state changed.
    ///
    /// An expired clock stays stopped until it is reset.
    pub fn start(&mut self) -> bool {
        if self.running || self.is_expired() {
            return false;
        }
        self.running = true;
        true
    }

    /// Stops the clock, keeping elapsed time. Returns `true` when the running
    /// state changed.
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.running, false)
    }

    /// Re-initialises the clock at `start_elapsed`, clamped to the total
    /// duration, and leaves it stopped. No level change is reported.
    pub fn reset(&mut self, start_elapsed: Duration) -> AlertLevel {
        self.elapsed = start_elapsed.min(self.total);
        self.running = false;
        self.level = self.level_at(self.elapsed);
        debug!(
            elapsed_ms = self.elapsed.as_millis() as u64,
            level = self.level.get(),
            "clock_reset"
        );
        self.level
    }

    /// Level currently in effect.
    #[must_use]
    pub fn current_level(&self) -> AlertLevel {
        self.level
    }

    /// Time accumulated since the last reset.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Configured length of a session.
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.total
    }

    /// Time left before expiry.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.total.saturating_sub(self.elapsed)
    }

    /// Whole seconds left before expiry, rounded down.
    #[must_use]
    pub fn remaining_seconds(&self) -> u64 {
        self.remaining().as_secs()
    }

    /// Whether the clock advances on ticks.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Whether elapsed time has reached the total duration.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.elapsed >= self.total
    }

    /// Number of levels the clock can reach.
    #[must_use]
    pub fn level_count(&self) -> usize {
        self.thresholds.len()
    }

    /// Normalised level start times in ascending order.
    #[must_use]
    pub fn thresholds(&self) -> &[Duration] {
        &self.thresholds
    }

    fn level_at(&self, elapsed: Duration) -> AlertLevel {
        let reached = self
            .thresholds
            .iter()
            .take_while(|threshold| **threshold <= elapsed)
            .count();
        AlertLevel::new(u32::try_from(reached).unwrap_or(u32::MAX))
    }
}

fn positive_duration(seconds: f32) -> Result<Duration, ConfigError> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(ConfigError::invalid(
            "total_duration_seconds",
            format!("must be a positive number of seconds (got {seconds})"),
        ));
    }
    Duration::try_from_secs_f32(seconds).map_err(|error| {
        ConfigError::invalid("total_duration_seconds", error.to_string())
    })
}

fn normalize_thresholds(raw: &[f32]) -> Result<Vec<Duration>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::EmptyThresholds);
    }

    if let Some((index, value)) = raw
        .iter()
        .copied()
        .enumerate()
        .find(|(_, value)| !value.is_finite())
    {
        return Err(ConfigError::NonFiniteThreshold { index, value });
    }

    let mut sorted = raw.to_vec();
    sorted.sort_by(f32::total_cmp);
    sorted[0] = 0.0;

    if let Some(index) = (1..sorted.len()).find(|&index| sorted[index] < sorted[index - 1]) {
        return Err(ConfigError::UnsortedThresholds { index });
    }

    sorted
        .into_iter()
        .map(|seconds| {
            Duration::try_from_secs_f32(seconds).map_err(|error| {
                ConfigError::invalid("level_thresholds_seconds", error.to_string())
            })
        })
        .collect()
}
