#![deny(
    unsafe_code,
    missing_docs,
    dead_code,
    unused_results,
    non_snake_case,
    unreachable_pub
)]

//! Authoritative alert state for the evacuation game.
//!
//! The [`World`] owns the [`LevelClock`], the [`SubscriptionHub`] that fans
//! level changes out to presenters, and the session's [`GameOutcome`]. Hosts
//! drive it exclusively through [`apply`] and read it through [`query`].

mod clock;
mod hub;
mod outcome;

use std::{cell::RefCell, rc::Rc};

use evacuation_core::{Command, ConfigError, Event};
use tracing::{debug, warn};

pub use clock::{ClockConfig, LevelClock};
pub use hub::{AlertSubscriber, SubscriptionHub, SubscriptionId};
pub use outcome::GameOutcome;

/// Represents the authoritative alert world state.
#[derive(Debug)]
pub struct World {
    clock: LevelClock,
    hub: SubscriptionHub,
    outcome: GameOutcome,
    scratch: Vec<Event>,
}

impl World {
    /// Creates a world from validated clock settings, starting the clock when
    /// `auto_start` is set.
    pub fn new(config: &ClockConfig) -> Result<Self, ConfigError> {
        let mut clock = LevelClock::new(config)?;
        if config.auto_start {
            let _ = clock.start();
        }
        Ok(Self {
            clock,
            hub: SubscriptionHub::new(),
            outcome: GameOutcome::new(),
            scratch: Vec::new(),
        })
    }

    /// Registry presenters subscribe to for level changes.
    #[must_use]
    pub fn hub(&self) -> &SubscriptionHub {
        &self.hub
    }

    /// Enables `subscriber` against this world's clock.
    ///
    /// Calling it again for an already registered subscriber keeps the
    /// registration and only resynchronises it, which is how hosts bring
    /// presenters up to date after [`Command::ResetClock`].
    pub fn enable<S>(&self, subscriber: &Rc<RefCell<S>>) -> SubscriptionId
    where
        S: AlertSubscriber + 'static,
    {
        self.hub.enable(subscriber, Some(&self.clock))
    }
}

/// Applies the provided command to the world.
///
/// Level changes produced by a tick are published through the hub before this
/// function returns, so every listener has reacted by the time the caller sees
/// the corresponding [`Event::AlertLevelChanged`].
pub fn apply(world: &mut World, command: Command, out_events: &mut Vec<Event>) {
    match command {
        Command::Tick { dt_seconds } => {
            let mut generated = std::mem::take(&mut world.scratch);
            generated.clear();

            if let Err(reason) = world.clock.advance(dt_seconds, &mut generated) {
                out_events.push(Event::TickRejected { reason });
                world.scratch = generated;
                return;
            }

            for event in &generated {
                if let Event::AlertLevelChanged { change } = event {
                    let delivered = world.hub.publish(*change);
                    debug!(next = change.next.get(), delivered, "alert_level_published");
                }
            }

            out_events.append(&mut generated);
            world.scratch = generated;
        }
        Command::StartClock => {
            if world.clock.start() {
                out_events.push(Event::ClockStarted);
            }
        }
        Command::StopClock => {
            if world.clock.stop() {
                out_events.push(Event::ClockStopped);
            }
        }
        Command::ResetClock { start_elapsed } => {
            let level = world.clock.reset(start_elapsed);
            world.outcome.reset();
            out_events.push(Event::ClockReset { level });
        }
        Command::ResolveTimeUp {
            player_in_safe_zone,
        } => {
            if !world.clock.is_expired() {
                warn!("time_up_acknowledged_before_expiry");
                return;
            }
            if let Some(outcome) = world.outcome.resolve_time_up(player_in_safe_zone) {
                out_events.push(Event::OutcomeDecided { outcome });
            }
        }
        Command::ForceOutcome { outcome } => {
            if let Some(outcome) = world.outcome.force(outcome) {
                out_events.push(Event::OutcomeDecided { outcome });
            }
        }
    }
}

/// Query functions that provide read-only access to the world state.
pub mod query {
    use std::time::Duration;

    use evacuation_core::{AlertLevel, Outcome};

    use super::{LevelClock, World};

    /// Provides read-only access to the alert clock.
    #[must_use]
    pub fn clock(world: &World) -> &LevelClock {
        &world.clock
    }

    /// Level currently in effect.
    #[must_use]
    pub fn current_level(world: &World) -> AlertLevel {
        world.clock.current_level()
    }

    /// Whole seconds left before the clock expires, rounded down.
    #[must_use]
    pub fn remaining_seconds(world: &World) -> u64 {
        world.clock.remaining_seconds()
    }

    /// Time accumulated on the clock since the last reset.
    #[must_use]
    pub fn elapsed(world: &World) -> Duration {
        world.clock.elapsed()
    }

    /// Whether the clock advances on ticks.
    #[must_use]
    pub fn is_running(world: &World) -> bool {
        world.clock.is_running()
    }

    /// Current state of the session outcome.
    #[must_use]
    pub fn outcome(world: &World) -> Outcome {
        world.outcome.state()
    }
}
