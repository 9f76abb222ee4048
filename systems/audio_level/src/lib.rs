#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Background music presenter.
//!
//! Picks a clip from the loaded scene and, inside the main gameplay scene, from
//! the alert level. Switching clips fades the current one out, swaps and
//! restarts at full volume. The host mirrors [`AudioChannel`] onto its mixer.

use std::{collections::BTreeMap, time::Duration};

use evacuation_core::{
    AlertLevel, ClipId, ConfigError, FrameTime, LevelChange, LevelListener, SceneId,
};
use evacuation_world::{AlertSubscriber, LevelClock};
use serde::Deserialize;
use tracing::{debug, info, warn};

/// Configuration parameters required to construct the presenter.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Scene whose music follows the alert level.
    pub main_scene: SceneId,
    /// Main scene clip below [`Config::tense_level`].
    pub normal_clip: ClipId,
    /// Main scene clip from [`Config::tense_level`] upwards.
    pub tense_clip: ClipId,
    /// First level that plays the tense clip.
    pub tense_level: AlertLevel,
    /// Fixed clips for every other known scene.
    pub scene_clips: BTreeMap<SceneId, ClipId>,
    /// Volume restored after every swap, in the range 0.0..=1.0.
    pub base_volume: f32,
    /// Length of the fade-out preceding a swap. Zero swaps immediately.
    pub fade_out_seconds: f32,
    /// Drive fades from real time so they complete while the game is paused.
    pub use_unscaled_time: bool,
}

impl Default for Config {
    fn default() -> Self {
        let scene_clips = [
            ("TitleScene", "bgm_title"),
            ("GameClear", "bgm_game_clear"),
            ("GameOver", "bgm_game_over"),
        ]
        .into_iter()
        .map(|(scene, clip)| (SceneId::new(scene), ClipId::new(clip)))
        .collect();

        Self {
            main_scene: SceneId::new("GameMap"),
            normal_clip: ClipId::new("bgm_map_normal"),
            tense_clip: ClipId::new("bgm_map_level4"),
            tense_level: AlertLevel::new(4),
            scene_clips,
            base_volume: 1.0,
            fade_out_seconds: 1.0,
            use_unscaled_time: true,
        }
    }
}

impl Config {
    fn fade_duration(&self) -> Result<Duration, ConfigError> {
        if !(0.0..=1.0).contains(&self.base_volume) {
            return Err(ConfigError::invalid(
                "base_volume",
                format!("must lie within 0..=1 (got {})", self.base_volume),
            ));
        }
        if !self.fade_out_seconds.is_finite() || self.fade_out_seconds < 0.0 {
            return Err(ConfigError::invalid(
                "fade_out_seconds",
                format!("must not be negative (got {})", self.fade_out_seconds),
            ));
        }
        Duration::try_from_secs_f32(self.fade_out_seconds)
            .map_err(|error| ConfigError::invalid("fade_out_seconds", error.to_string()))
    }
}

/// Playback state the host applies to its audio source.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AudioChannel {
    /// Clip loaded into the source. `None` means silence.
    pub clip: Option<ClipId>,
    /// Current output volume.
    pub volume: f32,
    /// Whether the source is playing.
    pub playing: bool,
}

#[derive(Clone, Debug)]
struct Fade {
    target: Option<ClipId>,
    start_volume: f32,
    elapsed: Duration,
    duration: Duration,
}

impl Fade {
    fn finished(&self) -> bool {
        self.elapsed >= self.duration
    }
}

/// Selects and cross-fades background music.
#[derive(Debug)]
pub struct AudioLevelPresenter {
    config: Config,
    fade_duration: Duration,
    channel: AudioChannel,
    fade: Option<Fade>,
    scene: Option<SceneId>,
    fades_started: u64,
}

impl AudioLevelPresenter {
    /// Creates a silent presenter that has not seen a scene yet.
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        let fade_duration = config.fade_duration()?;
        let channel = AudioChannel {
            clip: None,
            volume: config.base_volume,
            playing: false,
        };
        Ok(Self {
            config,
            fade_duration,
            channel,
            fade: None,
            scene: None,
            fades_started: 0,
        })
    }

    /// Reacts to the host loading `scene`.
    ///
    /// The main scene reads the level from `clock`, other known scenes play
    /// their fixed clip and unknown scenes leave the track untouched.
    pub fn set_scene(&mut self, scene: &SceneId, clock: Option<&LevelClock>) {
        self.scene = Some(scene.clone());
        if *scene == self.config.main_scene {
            let level = level_or_first(clock);
            self.select_clip(Some(self.clip_for_level(level)));
        } else if let Some(clip) = self.config.scene_clips.get(scene) {
            self.select_clip(Some(clip.clone()));
        } else {
            debug!(scene = %scene, "scene_without_music");
        }
    }

    /// Requests `desired` as the active track.
    ///
    /// The loaded clip is never restarted: while it plays the request is a
    /// no-op, even if a fade away from it is in flight. Any other clip cancels
    /// the running fade and fades out again from the current volume.
    pub fn select_clip(&mut self, desired: Option<ClipId>) {
        if self.channel.clip == desired {
            if !self.channel.playing && desired.is_some() {
                self.channel.volume = self.config.base_volume;
                self.channel.playing = true;
                debug!(clip = ?desired, "clip_resumed");
            }
            return;
        }

        if self.fade_duration > Duration::ZERO && self.channel.playing {
            let replaced = self.fade.replace(Fade {
                target: desired,
                start_volume: self.channel.volume,
                elapsed: Duration::ZERO,
                duration: self.fade_duration,
            });
            self.fades_started += 1;
            info!(
                from = ?self.channel.clip,
                start_volume = self.channel.volume,
                superseded = replaced.is_some(),
                "fade_started"
            );
        } else {
            self.fade = None;
            self.swap(desired);
        }
    }

    /// Advances the in-flight fade. The swap happens on the step after the
    /// volume has reached zero.
    pub fn step(&mut self, frame: FrameTime) {
        let Some(fade) = self.fade.as_mut() else {
            return;
        };
        if fade.finished() {
            let target = fade.target.take();
            self.fade = None;
            self.swap(target);
            return;
        }

        fade.elapsed = fade
            .elapsed
            .saturating_add(frame.select(self.config.use_unscaled_time));
        let progress = (fade.elapsed.as_secs_f32() / fade.duration.as_secs_f32()).clamp(0.0, 1.0);
        self.channel.volume = fade.start_volume * (1.0 - progress);
    }

    /// Playback state to mirror.
    #[must_use]
    pub fn channel(&self) -> &AudioChannel {
        &self.channel
    }

    /// Whether a fade-out is in flight.
    #[must_use]
    pub fn is_fading(&self) -> bool {
        self.fade.is_some()
    }

    /// Number of fades started since construction.
    #[must_use]
    pub fn fades_started(&self) -> u64 {
        self.fades_started
    }

    /// Scene most recently reported by the host.
    #[must_use]
    pub fn scene(&self) -> Option<&SceneId> {
        self.scene.as_ref()
    }

    fn in_main_scene(&self) -> bool {
        self.scene.as_ref() == Some(&self.config.main_scene)
    }

    fn clip_for_level(&self, level: AlertLevel) -> ClipId {
        if level >= self.config.tense_level {
            self.config.tense_clip.clone()
        } else {
            self.config.normal_clip.clone()
        }
    }

    fn swap(&mut self, clip: Option<ClipId>) {
        self.channel.volume = self.config.base_volume;
        self.channel.playing = clip.is_some();
        info!(clip = ?clip, "clip_swapped");
        self.channel.clip = clip;
    }
}

impl LevelListener for AudioLevelPresenter {
    fn on_level_changed(&mut self, change: LevelChange) {
        if self.in_main_scene() {
            self.select_clip(Some(self.clip_for_level(change.next)));
        }
    }
}

impl AlertSubscriber for AudioLevelPresenter {
    fn synchronize(&mut self, clock: Option<&LevelClock>) {
        if self.in_main_scene() {
            let level = level_or_first(clock);
            self.select_clip(Some(self.clip_for_level(level)));
        }
    }

    fn quiesce(&mut self) {
        if self.fade.take().is_some() {
            debug!("fade_dropped_on_teardown");
        }
        self.channel.playing = false;
        self.channel.volume = self.config.base_volume;
    }
}

fn level_or_first(clock: Option<&LevelClock>) -> AlertLevel {
    match clock {
        Some(clock) => clock.current_level(),
        None => {
            warn!("audio_level_missing_clock");
            AlertLevel::FIRST
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn presenter() -> AudioLevelPresenter {
        AudioLevelPresenter::new(Config::default()).expect("default config is valid")
    }

    fn playing(clip: &str) -> AudioLevelPresenter {
        let mut presenter = presenter();
        presenter.select_clip(Some(ClipId::new(clip)));
        presenter
    }

    fn frame(millis: u64) -> FrameTime {
        FrameTime::uniform(Duration::from_millis(millis))
    }

    #[test]
    fn first_clip_starts_without_fade() {
        let presenter = playing("a");
        assert_eq!(
            presenter.channel(),
            &AudioChannel {
                clip: Some(ClipId::new("a")),
                volume: 1.0,
                playing: true,
            }
        );
        assert_eq!(presenter.fades_started(), 0);
    }

    #[test]
    fn same_clip_twice_never_fades() {
        let mut presenter = playing("a");
        presenter.select_clip(Some(ClipId::new("a")));
        presenter.select_clip(Some(ClipId::new("a")));
        assert_eq!(presenter.fades_started(), 0);
        assert!(!presenter.is_fading());
    }

    #[test]
    fn stopped_clip_resumes_at_full_volume() {
        let mut presenter = playing("a");
        presenter.quiesce();
        assert!(!presenter.channel().playing);

        presenter.select_clip(Some(ClipId::new("a")));

        assert!(presenter.channel().playing);
        assert_eq!(presenter.channel().volume, 1.0);
        assert_eq!(presenter.fades_started(), 0);
    }

    #[test]
    fn different_clip_fades_to_silence_before_swapping() {
        let mut presenter = playing("a");
        presenter.select_clip(Some(ClipId::new("b")));
        assert_eq!(presenter.fades_started(), 1);

        presenter.step(frame(500));
        assert!((presenter.channel().volume - 0.5).abs() < 1e-4);
        assert_eq!(presenter.channel().clip, Some(ClipId::new("a")));

        presenter.step(frame(500));
        assert_eq!(presenter.channel().volume, 0.0);
        assert_eq!(presenter.channel().clip, Some(ClipId::new("a")));

        presenter.step(frame(16));
        assert!(!presenter.is_fading());
        assert_eq!(
            presenter.channel(),
            &AudioChannel {
                clip: Some(ClipId::new("b")),
                volume: 1.0,
                playing: true,
            }
        );
    }

    #[test]
    fn retrigger_fades_from_current_volume() {
        let mut presenter = playing("a");
        presenter.select_clip(Some(ClipId::new("b")));
        presenter.step(frame(500));

        presenter.select_clip(Some(ClipId::new("c")));
        assert_eq!(presenter.fades_started(), 2);

        presenter.step(frame(500));
        assert!((presenter.channel().volume - 0.25).abs() < 1e-4);
    }

    #[test]
    fn requesting_fade_target_again_restarts_from_current_volume() {
        let mut presenter = playing("a");
        presenter.select_clip(Some(ClipId::new("b")));
        presenter.step(frame(250));
        presenter.select_clip(Some(ClipId::new("b")));

        assert_eq!(presenter.fades_started(), 2);
        assert!((presenter.channel().volume - 0.75).abs() < 1e-4);

        presenter.step(frame(500));
        assert!((presenter.channel().volume - 0.375).abs() < 1e-4);
    }

    #[test]
    fn requesting_playing_clip_mid_fade_keeps_volume_and_fade() {
        let mut presenter = playing("a");
        presenter.select_clip(Some(ClipId::new("b")));
        presenter.step(frame(500));
        let before = presenter.channel().volume;

        presenter.select_clip(Some(ClipId::new("a")));

        assert_eq!(presenter.channel().volume, before);
        assert!(presenter.is_fading());
        assert_eq!(presenter.fades_started(), 1);

        presenter.step(frame(500));
        presenter.step(frame(16));
        assert_eq!(presenter.channel().clip, Some(ClipId::new("b")));
    }

    #[test]
    fn zero_duration_swaps_immediately() {
        let mut presenter = AudioLevelPresenter::new(Config {
            fade_out_seconds: 0.0,
            ..Config::default()
        })
        .expect("valid config");
        presenter.select_clip(Some(ClipId::new("a")));
        presenter.select_clip(Some(ClipId::new("b")));

        assert_eq!(presenter.fades_started(), 0);
        assert_eq!(presenter.channel().clip, Some(ClipId::new("b")));
    }

    #[test]
    fn none_clip_fades_into_silence() {
        let mut presenter = playing("a");
        presenter.select_clip(None);
        presenter.step(frame(1000));
        presenter.step(frame(16));

        assert_eq!(presenter.channel().clip, None);
        assert!(!presenter.channel().playing);
    }

    #[test]
    fn scenes_map_to_fixed_clips() {
        let mut presenter = presenter();
        presenter.set_scene(&SceneId::new("TitleScene"), None);
        assert_eq!(presenter.channel().clip, Some(ClipId::new("bgm_title")));

        presenter.set_scene(&SceneId::new("Credits"), None);
        assert!(!presenter.is_fading());
        assert_eq!(presenter.channel().clip, Some(ClipId::new("bgm_title")));

        presenter.on_level_changed(LevelChange::new(AlertLevel::new(3), AlertLevel::new(4)));
        assert!(!presenter.is_fading(), "levels are ignored outside the main scene");
    }

    #[test]
    fn main_scene_without_clock_plays_normal_clip() {
        let mut presenter = presenter();
        presenter.set_scene(&SceneId::new("GameMap"), None);
        assert_eq!(presenter.channel().clip, Some(ClipId::new("bgm_map_normal")));
    }

    #[test]
    fn rejects_negative_fade() {
        let config = Config {
            fade_out_seconds: -1.0,
            ..Config::default()
        };
        assert!(AudioLevelPresenter::new(config).is_err());
    }

    #[test]
    fn config_reads_scene_table_from_toml() {
        let config: Config = toml::from_str(
            "fade_out_seconds = 0.5\n[scene_clips]\nTitleScene = \"menu_theme\"\n",
        )
        .expect("parse config");

        assert_eq!(config.fade_out_seconds, 0.5);
        assert_eq!(
            config.scene_clips.get(&SceneId::new("TitleScene")),
            Some(&ClipId::new("menu_theme"))
        );
        assert_eq!(config.main_scene, SceneId::new("GameMap"));
    }
}
