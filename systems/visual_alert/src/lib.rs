#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Presenter that maps alert levels onto text color, a vignette overlay and a
//! flashing danger overlay.

use std::{f32::consts::TAU, time::Duration};

use evacuation_core::{AlertLevel, Color, ConfigError, FrameTime, LevelChange, LevelListener};
use evacuation_world::{AlertSubscriber, LevelClock};
use serde::Deserialize;
use tracing::{debug, warn};

const VIGNETTE_LEVEL: AlertLevel = AlertLevel::new(3);
const DANGER_LEVEL: AlertLevel = AlertLevel::new(4);

/// Configuration parameters required to construct the presenter.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Text colors for levels one through four. Higher levels reuse the last.
    pub text_colors: [Color; 4],
    /// Vignette tint shown at level three.
    pub level3_vignette: Color,
    /// Vignette tint shown from level four upwards.
    pub level4_vignette: Color,
    /// Base color of the flash overlay. Its alpha is driven by the animation.
    pub flash_color: Color,
    /// Level from which the flash overlay oscillates.
    pub flash_level: AlertLevel,
    /// Number of full oscillations per second.
    pub flash_frequency_hz: f32,
    /// Opacity at the bottom of an oscillation.
    pub flash_min_alpha: f32,
    /// Opacity at the top of an oscillation.
    pub flash_max_alpha: f32,
    /// Drive the flash from real time so it keeps pulsing while paused.
    pub use_unscaled_time: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            text_colors: [
                Color::WHITE,
                Color::new(1.0, 0.85, 0.2, 1.0),
                Color::new(1.0, 0.55, 0.1, 1.0),
                Color::new(1.0, 0.2, 0.2, 1.0),
            ],
            level3_vignette: Color::new(0.0, 0.0, 0.0, 0.25),
            level4_vignette: Color::new(1.0, 0.0, 0.0, 0.35),
            flash_color: Color::new(1.0, 0.0, 0.0, 0.45),
            flash_level: DANGER_LEVEL,
            flash_frequency_hz: 2.0,
            flash_min_alpha: 0.0,
            flash_max_alpha: 0.6,
            use_unscaled_time: true,
        }
    }
}

impl Config {
    /// Checks the flash parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.flash_frequency_hz.is_finite() || self.flash_frequency_hz <= 0.0 {
            return Err(ConfigError::invalid(
                "flash_frequency_hz",
                format!("must be positive (got {})", self.flash_frequency_hz),
            ));
        }
        let in_unit_range = |alpha: f32| (0.0..=1.0).contains(&alpha);
        if !in_unit_range(self.flash_min_alpha)
            || !in_unit_range(self.flash_max_alpha)
            || self.flash_min_alpha > self.flash_max_alpha
        {
            return Err(ConfigError::invalid(
                "flash_min_alpha",
                format!(
                    "expected 0 <= min <= max <= 1 (got {}..{})",
                    self.flash_min_alpha, self.flash_max_alpha
                ),
            ));
        }
        Ok(())
    }
}

/// Presentation state of a full-screen overlay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Overlay {
    /// Whether the host should draw the overlay.
    pub visible: bool,
    /// Tint applied when drawn.
    pub color: Color,
}

impl Overlay {
    /// Hidden, fully transparent overlay.
    pub const HIDDEN: Self = Self {
        visible: false,
        color: Color::new(0.0, 0.0, 0.0, 0.0),
    };

    fn shown(color: Color) -> Self {
        Self {
            visible: true,
            color,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Flash {
    elapsed: Duration,
}

/// Visual alert presenter. Subscribe it through the hub and call
/// [`VisualAlertPresenter::step`] once per frame.
#[derive(Debug)]
pub struct VisualAlertPresenter {
    config: Config,
    level: AlertLevel,
    text_color: Color,
    vignette: Overlay,
    flash_overlay: Overlay,
    flash: Option<Flash>,
}

impl VisualAlertPresenter {
    /// Creates a presenter showing the first level.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let mut presenter = Self {
            text_color: config.text_colors[0],
            config,
            level: AlertLevel::FIRST,
            vignette: Overlay::HIDDEN,
            flash_overlay: Overlay::HIDDEN,
            flash: None,
        };
        presenter.apply_level(AlertLevel::FIRST);
        Ok(presenter)
    }

    /// Advances the flash oscillation, if one is running.
    ///
    /// The curve starts at its trough, so the first step after the flash
    /// starts rises from the minimum opacity.
    pub fn step(&mut self, frame: FrameTime) {
        let Some(flash) = self.flash.as_mut() else {
            return;
        };
        flash.elapsed = flash
            .elapsed
            .saturating_add(frame.select(self.config.use_unscaled_time));
        let alpha = flash_alpha(&self.config, flash.elapsed);
        self.flash_overlay.color = self.config.flash_color.with_alpha(alpha);
    }

    /// Level the presenter currently shows.
    #[must_use]
    pub fn level(&self) -> AlertLevel {
        self.level
    }

    /// Color for the alert level label.
    #[must_use]
    pub fn text_color(&self) -> Color {
        self.text_color
    }

    /// State of the vignette overlay.
    #[must_use]
    pub fn vignette(&self) -> Overlay {
        self.vignette
    }

    /// State of the flash overlay.
    #[must_use]
    pub fn flash_overlay(&self) -> Overlay {
        self.flash_overlay
    }

    /// Whether the flash oscillation is running.
    #[must_use]
    pub fn is_flashing(&self) -> bool {
        self.flash.is_some()
    }

    fn apply_level(&mut self, level: AlertLevel) {
        self.level = level;
        self.text_color = text_color_for(&self.config, level);
        self.vignette = if level >= DANGER_LEVEL {
            Overlay::shown(self.config.level4_vignette)
        } else if level >= VIGNETTE_LEVEL {
            Overlay::shown(self.config.level3_vignette)
        } else {
            Overlay::HIDDEN
        };

        if level >= self.config.flash_level {
            self.start_flash();
        } else {
            self.stop_flash();
        }
    }

    // Restarts from phase zero when already running.
    fn start_flash(&mut self) {
        self.flash = Some(Flash {
            elapsed: Duration::ZERO,
        });
        self.flash_overlay = Overlay::shown(self.config.flash_color.with_alpha(0.0));
        debug!(level = self.level.get(), "flash_started");
    }

    fn stop_flash(&mut self) {
        if self.flash.take().is_some() {
            debug!(level = self.level.get(), "flash_stopped");
        }
        self.flash_overlay = Overlay {
            visible: false,
            color: self.flash_overlay.color.with_alpha(0.0),
        };
    }
}

impl LevelListener for VisualAlertPresenter {
    fn on_level_changed(&mut self, change: LevelChange) {
        self.apply_level(change.next);
    }
}

impl AlertSubscriber for VisualAlertPresenter {
    fn synchronize(&mut self, clock: Option<&LevelClock>) {
        let level = match clock {
            Some(clock) => clock.current_level(),
            None => {
                warn!("visual_alert_missing_clock");
                AlertLevel::FIRST
            }
        };
        self.apply_level(level);
    }

    fn quiesce(&mut self) {
        self.stop_flash();
        self.vignette = Overlay::HIDDEN;
    }
}

fn text_color_for(config: &Config, level: AlertLevel) -> Color {
    let index = usize::try_from(level.get().saturating_sub(1)).unwrap_or(usize::MAX);
    config
        .text_colors
        .get(index)
        .or_else(|| config.text_colors.last())
        .copied()
        .unwrap_or(Color::WHITE)
}

/// `lerp(min, max, (1 - cos(2π·f·t)) / 2)`, which is `min` at `t = 0`.
fn flash_alpha(config: &Config, elapsed: Duration) -> f32 {
    let phase = TAU * config.flash_frequency_hz * elapsed.as_secs_f32();
    let blend = (1.0 - phase.cos()) * 0.5;
    config.flash_min_alpha + (config.flash_max_alpha - config.flash_min_alpha) * blend
}
