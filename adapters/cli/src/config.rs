//! TOML session configuration.

use std::{fs, path::Path};

use anyhow::{bail, Context, Result};
use evacuation_core::SceneId;
use evacuation_system_audio_level as audio_level;
use evacuation_system_directional_gate as directional_gate;
use evacuation_system_visual_alert as visual_alert;
use evacuation_world::ClockConfig;
use serde::Deserialize;

/// Every setting the headless session needs. Missing sections keep defaults.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct SessionConfig {
    /// Alert clock settings.
    pub(crate) clock: ClockConfig,
    /// Visual presenter settings.
    pub(crate) visual: visual_alert::Config,
    /// Music presenter settings.
    pub(crate) audio: audio_level::Config,
    /// Barrier settings.
    pub(crate) gate: directional_gate::Config,
    /// Scripted player and scene flow.
    pub(crate) session: ScriptConfig,
}

/// Scripted player walk and scene names used by the headless host.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub(crate) struct ScriptConfig {
    /// Scene loaded when the session starts.
    pub(crate) gameplay_scene: SceneId,
    /// Scene loaded after a clear.
    pub(crate) clear_scene: SceneId,
    /// Scene loaded after a game over.
    pub(crate) game_over_scene: SceneId,
    /// Horizontal start position of the player.
    pub(crate) start_x: f32,
    /// Walking speed in world units per second.
    pub(crate) walk_speed: f32,
    /// Elapsed seconds after which the player turns back left.
    pub(crate) turn_around_seconds: f32,
    /// Left edge of the safe zone.
    pub(crate) safe_zone_min_x: f32,
    /// Right edge of the safe zone.
    pub(crate) safe_zone_max_x: f32,
}

impl Default for ScriptConfig {
    fn default() -> Self {
        Self {
            gameplay_scene: SceneId::new("GameMap"),
            clear_scene: SceneId::new("GameClear"),
            game_over_scene: SceneId::new("GameOver"),
            start_x: 0.0,
            walk_speed: 0.1,
            turn_around_seconds: 150.0,
            safe_zone_min_x: -1.0,
            safe_zone_max_x: 1.0,
        }
    }
}

impl ScriptConfig {
    /// Whether `x` lies inside the safe zone, edges included.
    #[must_use]
    pub(crate) fn in_safe_zone(&self, x: f32) -> bool {
        (self.safe_zone_min_x..=self.safe_zone_max_x).contains(&x)
    }

    fn validate(&self) -> Result<()> {
        let values = [
            self.start_x,
            self.walk_speed,
            self.turn_around_seconds,
            self.safe_zone_min_x,
            self.safe_zone_max_x,
        ];
        if values.iter().any(|value| !value.is_finite()) {
            bail!("session settings must be finite numbers");
        }
        if self.safe_zone_min_x > self.safe_zone_max_x {
            bail!(
                "safe zone is empty ({}..{})",
                self.safe_zone_min_x,
                self.safe_zone_max_x
            );
        }
        if self.walk_speed < 0.0 || self.turn_around_seconds < 0.0 {
            bail!("walk speed and turn-around time must not be negative");
        }
        Ok(())
    }
}

impl SessionConfig {
    /// Loads the configuration from `path`, or the defaults when absent.
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let contents = fs::read_to_string(path).with_context(|| {
                    format!("failed to read session config at {}", path.display())
                })?;
                Self::parse(&contents)
                    .with_context(|| format!("invalid session config at {}", path.display()))?
            }
            None => Self::default(),
        };
        Ok(config)
    }

    fn parse(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).context("failed to parse session config toml contents")?;
        config.session.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evacuation_core::AlertLevel;

    #[test]
    fn empty_file_yields_defaults() {
        let config = SessionConfig::parse("").expect("empty config parses");
        assert_eq!(config, SessionConfig::default());
    }

    #[test]
    fn sections_override_selected_fields() {
        let config = SessionConfig::parse(
            r#"
            [clock]
            total_duration_seconds = 120.0
            level_thresholds_seconds = [0.0, 30.0, 60.0]

            [gate]
            activation_level = 2

            [session]
            safe_zone_min_x = 10.0
            safe_zone_max_x = 12.0
            "#,
        )
        .expect("config parses");

        assert_eq!(config.clock.total_duration_seconds, 120.0);
        assert!(config.clock.auto_start);
        assert_eq!(config.gate.activation_level, AlertLevel::new(2));
        assert_eq!(config.gate.barrier_count, 4);
        assert!(config.session.in_safe_zone(11.0));
        assert!(!config.session.in_safe_zone(0.0));
    }

    #[test]
    fn inverted_safe_zone_is_rejected() {
        let error = SessionConfig::parse("[session]\nsafe_zone_min_x = 5.0\nsafe_zone_max_x = 1.0\n")
            .expect_err("empty safe zone");
        assert!(error.to_string().contains("safe zone"));
    }

    #[test]
    fn mistyped_values_fail_to_parse() {
        assert!(SessionConfig::parse("[clock]\ntotal_duration_seconds = \"long\"\n").is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let error = SessionConfig::load(Some(Path::new("/nonexistent/evacuation.toml")))
            .expect_err("file does not exist");
        assert!(format!("{error:#}").contains("/nonexistent/evacuation.toml"));
    }
}
