//! Persona policies and the resolver that maps a persona id to its lifecycle thresholds.
//!
//! A zero threshold disables the matching shutdown predicate. Unknown or empty persona ids
//! resolve to the default policy; resolution never fails.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Persona id carried by the fallback policy.
pub const DEFAULT_PERSONA_ID: &str = "default";

pub const DEFAULT_MAX_SESSION_SECS: u64 = 1800;
pub const DEFAULT_IDLE_LIMIT_SECS: u64 = 180;
pub const DEFAULT_MIN_KARMA: i64 = -25;

/// Lifecycle thresholds for one persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    pub persona_id: String,
    /// Total session cap in seconds. 0 = disabled.
    #[serde(default)]
    pub max_session_seconds: u64,
    /// Idle limit in seconds since the last recorded activity. 0 = disabled.
    #[serde(default)]
    pub idle_limit_seconds: u64,
    /// Karma floor; the session trips when karma is at or below it. 0 = disabled.
    #[serde(default)]
    pub min_karma: i64,
}

impl Policy {
    pub fn new(
        persona_id: impl Into<String>,
        max_session_seconds: u64,
        idle_limit_seconds: u64,
        min_karma: i64,
    ) -> Self {
        Self {
            persona_id: persona_id.into(),
            max_session_seconds,
            idle_limit_seconds,
            min_karma,
        }
    }

    /// `None` when the idle predicate is disabled.
    pub fn idle_limit(&self) -> Option<Duration> {
        (self.idle_limit_seconds > 0).then(|| Duration::from_secs(self.idle_limit_seconds))
    }

    /// `None` when the session cap is disabled.
    pub fn max_session(&self) -> Option<Duration> {
        (self.max_session_seconds > 0).then(|| Duration::from_secs(self.max_session_seconds))
    }

    /// `None` when the karma floor is disabled.
    pub fn karma_floor(&self) -> Option<i64> {
        (self.min_karma != 0).then_some(self.min_karma)
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new(
            DEFAULT_PERSONA_ID,
            DEFAULT_MAX_SESSION_SECS,
            DEFAULT_IDLE_LIMIT_SECS,
            DEFAULT_MIN_KARMA,
        )
    }
}

/// Built-in persona catalogue, ordered from smallest to largest resource tier.
pub fn builtin_policies() -> Vec<Policy> {
    vec![
        Policy::new("lite_2k", 300, 60, -10),
        Policy::new("calc_4k", 600, 90, 0),
        Policy::new("shell_16k", 3600, 300, -50),
        Policy::new("guardian_64k", 7200, 600, -100),
    ]
}

/// Immutable persona → policy table with a single fallback.
#[derive(Debug, Clone)]
pub struct PolicyResolver {
    policies: HashMap<String, Policy>,
    default: Policy,
}

impl PolicyResolver {
    /// Builds a resolver from `policies`; a later entry with the same persona id replaces an
    /// earlier one. Entries with an empty persona id are ignored (they could never match).
    pub fn new(policies: impl IntoIterator<Item = Policy>, default: Policy) -> Self {
        let policies = policies
            .into_iter()
            .filter(|p| !p.persona_id.is_empty())
            .map(|p| (p.persona_id.clone(), p))
            .collect();
        Self { policies, default }
    }

    /// Built-in catalogue with the standard default policy.
    pub fn builtin() -> Self {
        Self::new(builtin_policies(), Policy::default())
    }

    /// Exact-match lookup; falls back to the default policy.
    pub fn resolve(&self, persona_id: &str) -> &Policy {
        if persona_id.is_empty() {
            return &self.default;
        }
        self.policies.get(persona_id).unwrap_or(&self.default)
    }

    pub fn contains(&self, persona_id: &str) -> bool {
        self.policies.contains_key(persona_id)
    }

    pub fn default_policy(&self) -> &Policy {
        &self.default
    }

    /// Known persona ids, sorted.
    pub fn personas(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for PolicyResolver {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_resolves_catalogue_entry() {
        let r = PolicyResolver::builtin();
        let p = r.resolve("calc_4k");
        assert_eq!(p.max_session_seconds, 600);
        assert_eq!(p.idle_limit_seconds, 90);
        assert_eq!(p.min_karma, 0);
    }

    #[test]
    fn unknown_and_empty_fall_back_to_default() {
        let r = PolicyResolver::builtin();
        for id in ["", "CALC_4K", "nope"] {
            let p = r.resolve(id);
            assert_eq!(p.persona_id, DEFAULT_PERSONA_ID);
            assert_eq!(p.max_session_seconds, 1800);
            assert_eq!(p.idle_limit_seconds, 180);
            assert_eq!(p.min_karma, -25);
        }
    }

    #[test]
    fn zero_thresholds_disable_predicates() {
        let p = Policy::new("x", 0, 0, 0);
        assert!(p.idle_limit().is_none());
        assert!(p.max_session().is_none());
        assert!(p.karma_floor().is_none());

        let p = Policy::new("y", 10, 5, -3);
        assert_eq!(p.idle_limit(), Some(Duration::from_secs(5)));
        assert_eq!(p.max_session(), Some(Duration::from_secs(10)));
        assert_eq!(p.karma_floor(), Some(-3));
    }

    #[test]
    fn later_duplicate_wins_and_empty_ids_are_dropped() {
        let r = PolicyResolver::new(
            vec![
                Policy::new("a", 1, 1, 1),
                Policy::new("a", 2, 2, 2),
                Policy::new("", 9, 9, 9),
            ],
            Policy::default(),
        );
        assert_eq!(r.resolve("a").max_session_seconds, 2);
        assert_eq!(r.personas(), vec!["a"]);
    }
}
