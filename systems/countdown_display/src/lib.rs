#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Read model formatting the remaining time and the alert level label.

use evacuation_core::{AlertLevel, LevelChange, LevelListener};
use evacuation_world::{AlertSubscriber, LevelClock};
use tracing::{trace, warn};

/// Countdown and level label shown to the player.
///
/// The cached values only suppress redundant formatting; the clock remains the
/// source of truth.
#[derive(Clone, Debug, Default)]
pub struct CountdownDisplay {
    last_shown_seconds: Option<u64>,
    last_shown_level: Option<AlertLevel>,
    time_text: String,
    level_text: String,
    renders: u64,
}

impl CountdownDisplay {
    /// Creates a display with empty texts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Refreshes the texts from `clock`. Returns `true` if any text changed.
    pub fn step(&mut self, clock: &LevelClock) -> bool {
        let mut rendered = false;

        let seconds = clock.remaining_seconds();
        if self.last_shown_seconds != Some(seconds) {
            self.last_shown_seconds = Some(seconds);
            self.time_text = format_time(seconds);
            rendered = true;
        }

        let level = clock.current_level();
        if self.last_shown_level != Some(level) {
            self.last_shown_level = Some(level);
            self.level_text = level.to_string();
            rendered = true;
        }

        if rendered {
            self.renders += 1;
            trace!(time = %self.time_text, level = %self.level_text, "countdown_rendered");
        }
        rendered
    }

    /// Remaining time as `MM:SS`.
    #[must_use]
    pub fn time_text(&self) -> &str {
        &self.time_text
    }

    /// Alert level label such as `Lv.3`.
    #[must_use]
    pub fn level_text(&self) -> &str {
        &self.level_text
    }

    /// Number of steps that changed a text.
    #[must_use]
    pub fn render_count(&self) -> u64 {
        self.renders
    }

    fn invalidate(&mut self) {
        self.last_shown_seconds = None;
        self.last_shown_level = None;
    }
}

impl LevelListener for CountdownDisplay {
    fn on_level_changed(&mut self, change: LevelChange) {
        self.last_shown_level = None;
        self.level_text = change.next.to_string();
    }
}

impl AlertSubscriber for CountdownDisplay {
    fn synchronize(&mut self, clock: Option<&LevelClock>) {
        self.invalidate();
        match clock {
            Some(clock) => {
                let _ = self.step(clock);
            }
            None => {
                warn!("countdown_missing_clock");
                self.level_text = AlertLevel::FIRST.to_string();
            }
        }
    }

    fn quiesce(&mut self) {
        self.invalidate();
    }
}

/// Formats whole seconds as zero-padded minutes and seconds.
#[must_use]
pub fn format_time(seconds: u64) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
