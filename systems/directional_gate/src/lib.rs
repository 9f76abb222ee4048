#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! One-way barriers that close while the player walks left at high alert.

use evacuation_core::{AlertLevel, ConfigError, LevelChange, LevelListener};
use evacuation_world::{AlertSubscriber, LevelClock};
use glam::Vec2;
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Configuration parameters required to construct the gate.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Level from which direction-sensitive blocking engages.
    pub activation_level: AlertLevel,
    /// Horizontal displacement below which the player counts as stationary.
    pub epsilon: f32,
    /// Number of barriers driven by the gate.
    pub barrier_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            activation_level: AlertLevel::new(4),
            epsilon: 0.0001,
            barrier_count: 4,
        }
    }
}

/// Barrier controller. Subscribe it through the hub and feed it one player
/// position sample per step.
#[derive(Clone, Debug)]
pub struct DirectionalGate {
    activation_level: AlertLevel,
    epsilon: f32,
    barriers: Vec<bool>,
    active: bool,
    previous: Option<Vec2>,
    player_missing: bool,
}

impl DirectionalGate {
    /// Creates an inactive gate with every barrier open.
    pub fn new(config: &Config) -> Result<Self, ConfigError> {
        if !config.epsilon.is_finite() || config.epsilon < 0.0 {
            return Err(ConfigError::invalid(
                "epsilon",
                format!("must be a non-negative number (got {})", config.epsilon),
            ));
        }
        if config.barrier_count == 0 {
            return Err(ConfigError::invalid("barrier_count", "at least one barrier is required"));
        }
        Ok(Self {
            activation_level: config.activation_level,
            epsilon: config.epsilon,
            barriers: vec![true; config.barrier_count],
            active: false,
            previous: None,
            player_missing: false,
        })
    }

    /// Samples the player position once per step.
    ///
    /// Without a player the barriers open and the movement history is
    /// discarded, so the next sample cannot register as movement.
    pub fn step(&mut self, player: Option<Vec2>) {
        let Some(current) = player else {
            if !self.player_missing {
                warn!("gate_missing_player");
                self.player_missing = true;
            }
            self.previous = None;
            self.set_passable(true);
            return;
        };
        self.player_missing = false;

        let moving_left = self.active
            && self
                .previous
                .is_some_and(|previous| current.x < previous.x - self.epsilon);
        self.set_passable(!moving_left);
        self.previous = Some(current);
    }

    /// Passability of every barrier, in configuration order.
    #[must_use]
    pub fn barriers(&self) -> &[bool] {
        &self.barriers
    }

    /// Whether every barrier can be crossed.
    #[must_use]
    pub fn all_passable(&self) -> bool {
        self.barriers.iter().all(|passable| *passable)
    }

    /// Whether the current level engages direction-sensitive blocking.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, level: AlertLevel) {
        let active = level >= self.activation_level;
        if active != self.active {
            info!(level = level.get(), active, "gate_activation_changed");
        }
        self.active = active;
        if !active {
            self.set_passable(true);
        }
    }

    fn set_passable(&mut self, passable: bool) {
        if self.barriers.first() != Some(&passable) {
            debug!(passable, "gate_barriers_toggled");
        }
        self.barriers.fill(passable);
    }
}

impl LevelListener for DirectionalGate {
    fn on_level_changed(&mut self, change: LevelChange) {
        self.set_active(change.next);
    }
}

impl AlertSubscriber for DirectionalGate {
    fn synchronize(&mut self, clock: Option<&LevelClock>) {
        let level = match clock {
            Some(clock) => clock.current_level(),
            None => {
                warn!("gate_missing_clock");
                AlertLevel::FIRST
            }
        };
        self.set_active(level);
    }

    fn quiesce(&mut self) {
        self.previous = None;
        self.set_passable(true);
    }
}
