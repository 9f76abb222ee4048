//! Headless host that drives the alert world and its presenters frame by frame.

use std::{cell::RefCell, rc::Rc, time::Duration};

use anyhow::{Context, Result};
use evacuation_core::{Command, Event, FrameTime, Outcome, SceneId};
use evacuation_system_audio_level::AudioLevelPresenter;
use evacuation_system_countdown_display::CountdownDisplay;
use evacuation_system_directional_gate::DirectionalGate;
use evacuation_system_visual_alert::VisualAlertPresenter;
use evacuation_world::{apply, query, SubscriptionId, World};
use glam::Vec2;
use tracing::{debug, info};

use crate::config::{ScriptConfig, SessionConfig};

/// Extra real time granted after the outcome so the closing music can settle.
const WIND_DOWN: Duration = Duration::from_secs(3);

/// Line printed whenever the countdown display re-renders on a report tick.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Report {
    /// Remaining time as shown on screen.
    pub(crate) time: String,
    /// Level label as shown on screen.
    pub(crate) level: String,
    /// Player position at the time of the report.
    pub(crate) player_x: f32,
    /// Whether every barrier was passable.
    pub(crate) gate_open: bool,
}

/// Summary of a finished session.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Summary {
    /// Decided outcome, `Playing` if the frame budget ran out first.
    pub(crate) outcome: Outcome,
    /// Frames simulated, wind-down included.
    pub(crate) frames: u64,
    /// Frames during which at least one barrier was closed.
    pub(crate) blocked_frames: u64,
    /// Fades the music presenter started.
    pub(crate) fades: u64,
    /// Clip playing when the session ended.
    pub(crate) final_clip: Option<String>,
    /// Final player position.
    pub(crate) player_x: f32,
}

struct Subscriptions {
    visual: SubscriptionId,
    audio: SubscriptionId,
    gate: SubscriptionId,
    countdown: SubscriptionId,
}

/// Owns the world and every presenter for one play session.
pub(crate) struct Session {
    world: World,
    visual: Rc<RefCell<VisualAlertPresenter>>,
    audio: Rc<RefCell<AudioLevelPresenter>>,
    gate: Rc<RefCell<DirectionalGate>>,
    countdown: Rc<RefCell<CountdownDisplay>>,
    subscriptions: Subscriptions,
    script: ScriptConfig,
    player: Vec2,
    played: Duration,
}

impl Session {
    /// Builds the world, validates every presenter and wires them to the hub.
    pub(crate) fn new(config: &SessionConfig) -> Result<Self> {
        let world = World::new(&config.clock).context("invalid clock configuration")?;
        let visual = Rc::new(RefCell::new(
            VisualAlertPresenter::new(config.visual.clone())
                .context("invalid visual configuration")?,
        ));
        let audio = Rc::new(RefCell::new(
            AudioLevelPresenter::new(config.audio.clone())
                .context("invalid audio configuration")?,
        ));
        let gate = Rc::new(RefCell::new(
            DirectionalGate::new(&config.gate).context("invalid gate configuration")?,
        ));
        let countdown = Rc::new(RefCell::new(CountdownDisplay::new()));

        let script = config.session.clone();
        audio
            .borrow_mut()
            .set_scene(&script.gameplay_scene, Some(query::clock(&world)));

        let clock = Some(query::clock(&world));
        let subscriptions = Subscriptions {
            visual: world.hub().enable(&visual, clock),
            audio: world.hub().enable(&audio, clock),
            gate: world.hub().enable(&gate, clock),
            countdown: world.hub().enable(&countdown, clock),
        };
        info!(
            listeners = world.hub().len(),
            scene = %script.gameplay_scene,
            "session_started"
        );

        Ok(Self {
            player: Vec2::new(script.start_x, 0.0),
            world,
            visual,
            audio,
            gate,
            countdown,
            subscriptions,
            script,
            played: Duration::ZERO,
        })
    }

    /// Runs until an outcome is decided and the music has settled, or until
    /// `max_frames` have been simulated. `report_every` controls how often a
    /// countdown line is handed to `on_report`, in whole seconds.
    pub(crate) fn run(
        mut self,
        fps: u32,
        max_frames: u64,
        report_every: u64,
        mut on_report: impl FnMut(&Report),
    ) -> Summary {
        let dt = Duration::from_secs(1) / fps.max(1);
        let mut events = Vec::new();
        let mut frames = 0;
        let mut blocked_frames = 0;
        let mut wind_down: Option<Duration> = None;

        while frames < max_frames {
            frames += 1;
            events.clear();
            apply(
                &mut self.world,
                Command::Tick {
                    dt_seconds: dt.as_secs_f32(),
                },
                &mut events,
            );
            self.handle_events(&events);

            self.walk(dt);
            let frame = FrameTime::uniform(dt);
            self.gate.borrow_mut().step(Some(self.player));
            self.visual.borrow_mut().step(frame);
            self.audio.borrow_mut().step(frame);

            let gate_open = self.gate.borrow().all_passable();
            if !gate_open {
                blocked_frames += 1;
            }

            let rendered = self
                .countdown
                .borrow_mut()
                .step(query::clock(&self.world));
            let remaining = query::remaining_seconds(&self.world);
            if rendered && report_every > 0 && remaining % report_every == 0 {
                let countdown = self.countdown.borrow();
                on_report(&Report {
                    time: countdown.time_text().to_owned(),
                    level: countdown.level_text().to_owned(),
                    player_x: self.player.x,
                    gate_open,
                });
            }

            if query::outcome(&self.world) != Outcome::Playing {
                let left = wind_down.get_or_insert(WIND_DOWN);
                *left = left.saturating_sub(dt);
                if left.is_zero() || !self.audio.borrow().is_fading() {
                    break;
                }
            }
        }

        self.finish(frames, blocked_frames)
    }

    fn handle_events(&mut self, events: &[Event]) {
        let mut decided = Vec::new();
        for event in events {
            match event {
                Event::AlertLevelChanged { change } => {
                    info!(
                        previous = change.previous.get(),
                        next = change.next.get(),
                        remaining = query::remaining_seconds(&self.world),
                        "alert_level_changed"
                    );
                }
                Event::TimeExpired => {
                    let player_in_safe_zone = self.script.in_safe_zone(self.player.x);
                    info!(player_x = self.player.x, player_in_safe_zone, "time_up");
                    apply(
                        &mut self.world,
                        Command::ResolveTimeUp {
                            player_in_safe_zone,
                        },
                        &mut decided,
                    );
                }
                Event::TickRejected { reason } => debug!(%reason, "tick_rejected"),
                _ => {}
            }
        }

        for event in decided {
            if let Event::OutcomeDecided { outcome } = event {
                let scene = self.scene_for(outcome).clone();
                self.audio
                    .borrow_mut()
                    .set_scene(&scene, Some(query::clock(&self.world)));
            }
        }
    }

    fn scene_for(&self, outcome: Outcome) -> &SceneId {
        match outcome {
            Outcome::Clear => &self.script.clear_scene,
            Outcome::GameOver => &self.script.game_over_scene,
            Outcome::Playing => &self.script.gameplay_scene,
        }
    }

    // Right until the turn-around time, then back left.
    fn walk(&mut self, dt: Duration) {
        if !query::is_running(&self.world) {
            return;
        }
        self.played += dt;
        let direction = if self.played.as_secs_f32() <= self.script.turn_around_seconds {
            1.0
        } else {
            -1.0
        };
        self.player.x += direction * self.script.walk_speed * dt.as_secs_f32();
    }

    fn finish(self, frames: u64, blocked_frames: u64) -> Summary {
        let hub = self.world.hub();
        hub.disable(self.subscriptions.visual, &self.visual);
        hub.disable(self.subscriptions.audio, &self.audio);
        hub.disable(self.subscriptions.gate, &self.gate);
        hub.disable(self.subscriptions.countdown, &self.countdown);
        debug!(listeners = hub.len(), "session_torn_down");

        let (fades, final_clip) = {
            let audio = self.audio.borrow();
            let clip = audio.channel().clip.as_ref().map(|clip| clip.as_str().to_owned());
            (audio.fades_started(), clip)
        };
        Summary {
            outcome: query::outcome(&self.world),
            frames,
            blocked_frames,
            fades,
            final_clip,
            player_x: self.player.x,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evacuation_world::ClockConfig;

    fn short_session(script: ScriptConfig) -> SessionConfig {
        SessionConfig {
            clock: ClockConfig {
                total_duration_seconds: 20.0,
                level_thresholds_seconds: vec![0.0, 4.0, 8.0, 12.0, 16.0],
                auto_start: true,
            },
            session: script,
            ..SessionConfig::default()
        }
    }

    fn run(config: &SessionConfig) -> (Summary, Vec<Report>) {
        let session = Session::new(config).expect("valid session");
        let mut reports = Vec::new();
        let summary = session.run(10, 1_000, 5, |report| reports.push(report.clone()));
        (summary, reports)
    }

    #[test]
    fn returning_to_safe_zone_clears() {
        let config = short_session(ScriptConfig {
            walk_speed: 1.0,
            turn_around_seconds: 10.0,
            ..ScriptConfig::default()
        });

        let (summary, reports) = run(&config);

        assert_eq!(summary.outcome, Outcome::Clear);
        assert_eq!(summary.final_clip.as_deref(), Some("bgm_game_clear"));
        assert!(summary.player_x.abs() < 0.5);
        assert!(summary.blocked_frames > 0, "walking left at level 4 closes the gate");
        assert_eq!(
            reports.first().map(|report| report.time.as_str()),
            Some("00:15")
        );
        assert_eq!(reports.last().map(|report| report.level.as_str()), Some("Lv.5"));
    }

    #[test]
    fn staying_outside_safe_zone_is_game_over() {
        let config = short_session(ScriptConfig {
            walk_speed: 1.0,
            turn_around_seconds: 100.0,
            ..ScriptConfig::default()
        });

        let (summary, _) = run(&config);

        assert_eq!(summary.outcome, Outcome::GameOver);
        assert_eq!(summary.final_clip.as_deref(), Some("bgm_game_over"));
        assert_eq!(summary.blocked_frames, 0);
        // Normal to tense, tense to game over.
        assert_eq!(summary.fades, 2);
    }

    #[test]
    fn frame_budget_bounds_the_run() {
        let config = short_session(ScriptConfig::default());
        let session = Session::new(&config).expect("valid session");

        let summary = session.run(10, 25, 0, |_| {});

        assert_eq!(summary.frames, 25);
        assert_eq!(summary.outcome, Outcome::Playing);
    }
}
