//! Trip reasons and rebirth routing.
//!
//! Routing keys off [`TripKind`], never off the rendered reason text.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConfigError;
use crate::policy::builtin_policies;

/// Persona recommended after a karma-floor trip.
pub const DEFAULT_KARMA_FLOOR_TARGET: &str = "guardian_64k";
/// Persona recommended after a session-cap trip.
pub const DEFAULT_SESSION_CAP_TARGET: &str = "lite_2k";

/// Which shutdown predicate fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripKind {
    IdleTimeout,
    SessionCap,
    KarmaFloor,
}

impl TripKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripKind::IdleTimeout => "idle_timeout",
            TripKind::SessionCap => "session_cap",
            TripKind::KarmaFloor => "karma_floor",
        }
    }
}

impl fmt::Display for TripKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a session was forced down, with the measured value and the threshold it crossed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TripReason {
    IdleTimeout {
        persona: String,
        idle_secs: u64,
        limit_secs: u64,
    },
    SessionCap {
        persona: String,
        elapsed_secs: u64,
        limit_secs: u64,
    },
    KarmaFloor {
        persona: String,
        karma: i64,
        floor: i64,
    },
}

impl TripReason {
    pub fn kind(&self) -> TripKind {
        match self {
            TripReason::IdleTimeout { .. } => TripKind::IdleTimeout,
            TripReason::SessionCap { .. } => TripKind::SessionCap,
            TripReason::KarmaFloor { .. } => TripKind::KarmaFloor,
        }
    }

    pub fn persona(&self) -> &str {
        match self {
            TripReason::IdleTimeout { persona, .. }
            | TripReason::SessionCap { persona, .. }
            | TripReason::KarmaFloor { persona, .. } => persona,
        }
    }
}

impl fmt::Display for TripReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TripReason::IdleTimeout {
                persona,
                idle_secs,
                limit_secs,
            } => write!(
                f,
                "persona '{persona}' idle timeout: idle {idle_secs}s (limit {limit_secs}s)"
            ),
            TripReason::SessionCap {
                persona,
                elapsed_secs,
                limit_secs,
            } => write!(
                f,
                "persona '{persona}' session cap: elapsed {elapsed_secs}s (limit {limit_secs}s)"
            ),
            TripReason::KarmaFloor {
                persona,
                karma,
                floor,
            } => write!(f, "persona '{persona}' karma floor: karma {karma} (floor {floor})"),
        }
    }
}

/// Relaunch recommendation left for the external relauncher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rebirth {
    pub target_persona: String,
    pub reason: TripReason,
}

/// Fixed trip-kind → persona mapping. Idle trips always retry the same persona; karma-floor and
/// session-cap trips always move to a different one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RebirthTable {
    /// Broader-trust persona after a karma-floor trip. Empty = next rung on the ladder.
    #[serde(default = "default_karma_floor_target")]
    pub karma_floor_target: String,
    /// Different resource tier after a session-cap trip. Empty = next rung on the ladder.
    #[serde(default = "default_session_cap_target")]
    pub session_cap_target: String,
    /// Personas from narrowest to broadest tier. Used when a mapped target is empty or would send
    /// a persona back to itself.
    #[serde(default = "default_tier_ladder")]
    pub ladder: Vec<String>,
}

fn default_karma_floor_target() -> String {
    DEFAULT_KARMA_FLOOR_TARGET.to_string()
}

fn default_session_cap_target() -> String {
    DEFAULT_SESSION_CAP_TARGET.to_string()
}

/// Built-in catalogue, already ordered by memory tier.
fn default_tier_ladder() -> Vec<String> {
    builtin_policies()
        .into_iter()
        .map(|policy| policy.persona_id)
        .collect()
}

impl Default for RebirthTable {
    fn default() -> Self {
        Self {
            karma_floor_target: default_karma_floor_target(),
            session_cap_target: default_session_cap_target(),
            ladder: default_tier_ladder(),
        }
    }
}

impl RebirthTable {
    /// Rejects a ladder that cannot move a persona anywhere else.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut rungs = self.rungs();
        rungs.sort_unstable();
        rungs.dedup();
        if rungs.len() < 2 {
            return Err(ConfigError::Invalid {
                field: "rebirth.ladder",
                detail: format!("needs at least two distinct personas, got {:?}", self.ladder),
            });
        }
        Ok(())
    }

    pub fn target_for(&self, kind: TripKind, current_persona: &str) -> String {
        let mapped = match kind {
            TripKind::IdleTimeout => return current_persona.to_string(),
            TripKind::SessionCap => self.session_cap_target.trim(),
            TripKind::KarmaFloor => self.karma_floor_target.trim(),
        };
        if !mapped.is_empty() && mapped != current_persona {
            return mapped.to_string();
        }
        self.next_rung(current_persona)
            .unwrap_or_else(|| current_persona.to_string())
    }

    /// Builds the recommendation for a first-time trip.
    pub fn rebirth_for(&self, reason: &TripReason) -> Rebirth {
        Rebirth {
            target_persona: self.target_for(reason.kind(), reason.persona()),
            reason: reason.clone(),
        }
    }

    /// Rung after `current`, wrapping from the top back to the bottom. Personas off the ladder
    /// start from the first rung. `None` only when no rung differs from `current`.
    fn next_rung(&self, current: &str) -> Option<String> {
        let rungs = self.rungs();
        let start = rungs
            .iter()
            .position(|rung| *rung == current)
            .map_or(0, |i| i + 1);
        rungs
            .iter()
            .cycle()
            .skip(start)
            .take(rungs.len())
            .find(|rung| **rung != current)
            .map(|rung| rung.to_string())
    }

    fn rungs(&self) -> Vec<&str> {
        self.ladder
            .iter()
            .map(|rung| rung.trim())
            .filter(|rung| !rung.is_empty())
            .collect()
    }
}
