//! Final outcome bookkeeping for a play session.

use evacuation_core::Outcome;
use tracing::info;

/// Tracks whether the session is still running or has been decided.
///
/// An outcome is decided at most once per session; later requests are ignored
/// until [`GameOutcome::reset`].
#[derive(Clone, Debug)]
pub struct GameOutcome {
    state: Outcome,
}

impl GameOutcome {
    /// Creates a session that is still being played.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Outcome::Playing,
        }
    }

    /// Current state of the session.
    #[must_use]
    pub fn state(&self) -> Outcome {
        self.state
    }

    /// Decides the outcome once time has run out.
    pub fn resolve_time_up(&mut self, player_in_safe_zone: bool) -> Option<Outcome> {
        let outcome = if player_in_safe_zone {
            Outcome::Clear
        } else {
            Outcome::GameOver
        };
        self.decide(outcome)
    }

    /// Forces an outcome regardless of the clock.
    pub fn force(&mut self, outcome: Outcome) -> Option<Outcome> {
        self.decide(outcome)
    }

    /// Returns the session to the playing state.
    pub fn reset(&mut self) {
        self.state = Outcome::Playing;
    }

    fn decide(&mut self, outcome: Outcome) -> Option<Outcome> {
        if self.state != Outcome::Playing || outcome == Outcome::Playing {
            return None;
        }
        self.state = outcome;
        info!(outcome = ?outcome, "outcome_decided");
        Some(outcome)
    }
}

impl Default for GameOutcome {
    fn default() -> Self {
        Self::new()
    }
}
