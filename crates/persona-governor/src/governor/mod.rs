//! Lifecycle Governor: per-session timing, shutdown evaluation, and rebirth scheduling.
//!
//! State machine: `Inert --genesis--> Active --session_end--> Terminated --genesis--> Active`.
//!
//! The governor is driven by a single host loop thread:
//! 1. **genesis**: resolve the persona policy and start the monotonic session clock.
//! 2. **record_activity**: called on every executed command; touches timing and counters only.
//! 3. **evaluate**: called on every governance tick; checks idle timeout, session cap and
//!    karma floor in that order. The first trip is sticky until the next genesis.
//! 4. **session_end**: log the summary, emit the demise event, drop the active policy.

mod rebirth;

pub use rebirth::{
    Rebirth, RebirthTable, TripKind, TripReason, DEFAULT_KARMA_FLOOR_TARGET,
    DEFAULT_SESSION_CAP_TARGET,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clock::{Clock, MonotonicClock};
use crate::error::{GovernorError, GovernorResult};
use crate::events::{
    EventSink, LifecycleEvent, TracingEventSink, DEMISE_KARMA_DELTA, GENESIS_KARMA_DELTA,
    TRIP_KARMA_DELTA,
};
use crate::policy::{Policy, PolicyResolver, DEFAULT_PERSONA_ID};

// ---------------------------------------------------------------------------
// Collaborator inputs
// ---------------------------------------------------------------------------

/// Hardware/profile descriptor handed over at genesis. Logged only; never used for decisions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostInfo {
    /// Memory tier label (e.g. "4k", "64k").
    #[serde(default)]
    pub memory_tier: String,
    #[serde(default)]
    pub total_memory_kb: u64,
}

impl HostInfo {
    pub fn new(memory_tier: impl Into<String>, total_memory_kb: u64) -> Self {
        Self {
            memory_tier: memory_tier.into(),
            total_memory_kb,
        }
    }
}

/// Read-only source of the active persona's current karma, polled by the karma-floor check.
/// `None` means the value is unknown and the floor is not evaluated on this tick.
pub trait KarmaProvider {
    fn current_karma(&self, persona: &str) -> Option<i64>;
}

impl KarmaProvider for i64 {
    fn current_karma(&self, _persona: &str) -> Option<i64> {
        Some(*self)
    }
}

impl KarmaProvider for Option<i64> {
    fn current_karma(&self, _persona: &str) -> Option<i64> {
        *self
    }
}

impl KarmaProvider for HashMap<String, i64> {
    fn current_karma(&self, persona: &str) -> Option<i64> {
        self.get(persona).copied()
    }
}

// ---------------------------------------------------------------------------
// State & outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GovernorState {
    #[default]
    Inert,
    Active,
    Terminated,
}

impl GovernorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            GovernorState::Inert => "inert",
            GovernorState::Active => "active",
            GovernorState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for GovernorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one governance tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Shutdown(TripReason),
}

impl Verdict {
    pub fn is_tripped(&self) -> bool {
        matches!(self, Verdict::Shutdown(_))
    }

    pub fn reason(&self) -> Option<&TripReason> {
        match self {
            Verdict::Continue => None,
            Verdict::Shutdown(reason) => Some(reason),
        }
    }
}

/// Returned by [`LifecycleGovernor::session_end`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub persona: String,
    pub command_count: u64,
    pub final_karma: Option<i64>,
    pub elapsed_secs: u64,
    pub forced_reason: Option<TripReason>,
}

/// Point-in-time view for host dashboards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernorSnapshot {
    pub state: GovernorState,
    pub persona: Option<String>,
    pub policy: Option<Policy>,
    pub command_count: u64,
    pub session_elapsed_secs: Option<u64>,
    pub idle_secs: Option<u64>,
    pub forced_reason: Option<TripReason>,
    pub rebirth: Option<Rebirth>,
}

struct Session {
    persona: String,
    policy: Policy,
    started_at: Instant,
    last_activity: Instant,
    command_count: u64,
}

// ---------------------------------------------------------------------------
// LifecycleGovernor
// ---------------------------------------------------------------------------

/// Owns one session at a time. Not synchronized; share across threads only behind a lock.
pub struct LifecycleGovernor<C: Clock = MonotonicClock> {
    resolver: Arc<PolicyResolver>,
    rebirth_table: RebirthTable,
    clock: C,
    sink: Box<dyn EventSink>,
    state: GovernorState,
    session: Option<Session>,
    forced: Option<TripReason>,
    rebirth: Option<Rebirth>,
}

impl LifecycleGovernor<MonotonicClock> {
    /// Governor on the monotonic system clock, logging events through `tracing`.
    pub fn new(resolver: Arc<PolicyResolver>) -> Self {
        Self::with_clock(resolver, MonotonicClock)
    }
}

impl<C: Clock> LifecycleGovernor<C> {
    pub fn with_clock(resolver: Arc<PolicyResolver>, clock: C) -> Self {
        Self {
            resolver,
            rebirth_table: RebirthTable::default(),
            clock,
            sink: Box::new(TracingEventSink),
            state: GovernorState::Inert,
            session: None,
            forced: None,
            rebirth: None,
        }
    }

    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn with_rebirth_table(mut self, table: RebirthTable) -> Self {
        self.rebirth_table = table;
        self
    }

    /// Starts a session for `persona_id`. Unknown or empty ids run under the default policy.
    pub fn genesis(&mut self, persona_id: &str, host: &HostInfo) -> GovernorResult<&Policy> {
        if let Some(session) = self.session.as_ref() {
            return Err(GovernorError::AlreadyActive {
                persona: session.persona.clone(),
            });
        }

        let policy = self.resolver.resolve(persona_id).clone();
        if !self.resolver.contains(persona_id) {
            info!(
                target: "persona::governor",
                requested = persona_id,
                "Unknown persona; using default policy"
            );
        }
        let persona = if persona_id.is_empty() {
            DEFAULT_PERSONA_ID.to_string()
        } else {
            persona_id.to_string()
        };

        let now = self.clock.now();
        info!(
            target: "persona::governor",
            persona = %persona,
            memory_tier = %host.memory_tier,
            total_memory_kb = host.total_memory_kb,
            max_session_secs = policy.max_session_seconds,
            idle_limit_secs = policy.idle_limit_seconds,
            min_karma = policy.min_karma,
            "Genesis"
        );
        self.sink.emit(LifecycleEvent::system(
            format!(
                "genesis: persona '{}' on memory tier '{}'",
                persona, host.memory_tier
            ),
            GENESIS_KARMA_DELTA,
        ));

        self.forced = None;
        self.rebirth = None;
        self.state = GovernorState::Active;
        let session = self.session.insert(Session {
            persona,
            policy,
            started_at: now,
            last_activity: now,
            command_count: 0,
        });
        Ok(&session.policy)
    }

    /// Marks one unit of work. Only timing and counters change.
    pub fn record_activity(&mut self, description: &str, outcome: &str) -> GovernorResult<()> {
        let now = self.clock.now();
        let session = self.session_mut()?;
        session.last_activity = now.max(session.started_at);
        session.command_count += 1;
        debug!(
            target: "persona::governor",
            persona = %session.persona,
            command_count = session.command_count,
            description,
            outcome,
            "Activity recorded"
        );
        Ok(())
    }

    /// Runs the shutdown predicates. Once tripped, returns the same reason until the next genesis.
    pub fn evaluate<K: KarmaProvider + ?Sized>(&mut self, karma: &K) -> GovernorResult<Verdict> {
        self.session_ref()?;
        if let Some(reason) = self.forced.as_ref() {
            return Ok(Verdict::Shutdown(reason.clone()));
        }

        let Some(reason) = self.check_predicates(karma)? else {
            return Ok(Verdict::Continue);
        };

        warn!(
            target: "persona::governor",
            persona = %reason.persona(),
            kind = %reason.kind(),
            "Forced shutdown: {}",
            reason
        );
        self.sink.emit(LifecycleEvent::system(
            format!("forced shutdown: {reason}"),
            TRIP_KARMA_DELTA,
        ));
        self.forced = Some(reason.clone());
        self.schedule_rebirth();
        Ok(Verdict::Shutdown(reason))
    }

    fn check_predicates<K: KarmaProvider + ?Sized>(
        &self,
        karma: &K,
    ) -> GovernorResult<Option<TripReason>> {
        let now = self.clock.now();
        let session = self.session_ref()?;
        let policy = &session.policy;

        if let Some(limit) = policy.idle_limit() {
            let idle = now.saturating_duration_since(session.last_activity);
            if idle >= limit {
                return Ok(Some(TripReason::IdleTimeout {
                    persona: session.persona.clone(),
                    idle_secs: idle.as_secs(),
                    limit_secs: policy.idle_limit_seconds,
                }));
            }
        }

        if let Some(limit) = policy.max_session() {
            let elapsed = now.saturating_duration_since(session.started_at);
            if elapsed >= limit {
                return Ok(Some(TripReason::SessionCap {
                    persona: session.persona.clone(),
                    elapsed_secs: elapsed.as_secs(),
                    limit_secs: policy.max_session_seconds,
                }));
            }
        }

        if let Some(floor) = policy.karma_floor() {
            match karma.current_karma(&session.persona) {
                Some(current) if current <= floor => {
                    return Ok(Some(TripReason::KarmaFloor {
                        persona: session.persona.clone(),
                        karma: current,
                        floor,
                    }));
                }
                Some(_) => {}
                None => debug!(
                    target: "persona::governor",
                    persona = %session.persona,
                    "Karma unknown; floor not evaluated this tick"
                ),
            }
        }

        Ok(None)
    }

    /// Records the rebirth target for the current trip. No-op when one is already pending.
    fn schedule_rebirth(&mut self) {
        if self.rebirth.is_some() {
            return;
        }
        let Some(reason) = self.forced.as_ref() else {
            return;
        };
        let rebirth = self.rebirth_table.rebirth_for(reason);
        if reason.kind() != TripKind::IdleTimeout && rebirth.target_persona == reason.persona() {
            warn!(
                target: "persona::governor",
                persona = %reason.persona(),
                kind = %reason.kind(),
                "Rebirth ladder has no other persona; relaunching the same one"
            );
        }
        info!(
            target: "persona::governor",
            from = %reason.persona(),
            to = %rebirth.target_persona,
            kind = %reason.kind(),
            "Rebirth scheduled"
        );
        self.rebirth = Some(rebirth);
    }

    /// Pending relaunch recommendation. Stays visible until [`Self::clear_rebirth`].
    pub fn rebirth_pending(&self) -> Option<&Rebirth> {
        self.rebirth.as_ref()
    }

    /// Clears and returns the pending recommendation. Call after acting on it.
    pub fn clear_rebirth(&mut self) -> Option<Rebirth> {
        self.rebirth.take()
    }

    /// Finalizes the session and returns the governor to an inert state.
    pub fn session_end<K: KarmaProvider + ?Sized>(
        &mut self,
        karma: &K,
    ) -> GovernorResult<SessionSummary> {
        let Some(session) = self.session.take() else {
            return Err(self.not_active());
        };
        let now = self.clock.now();
        let final_karma = karma.current_karma(&session.persona);
        let summary = SessionSummary {
            elapsed_secs: now.saturating_duration_since(session.started_at).as_secs(),
            persona: session.persona,
            command_count: session.command_count,
            final_karma,
            forced_reason: self.forced.clone(),
        };
        self.state = GovernorState::Terminated;

        info!(
            target: "persona::governor",
            persona = %summary.persona,
            command_count = summary.command_count,
            final_karma = ?summary.final_karma,
            elapsed_secs = summary.elapsed_secs,
            forced = summary.forced_reason.is_some(),
            "Session ended"
        );
        self.sink.emit(LifecycleEvent::system(
            format!(
                "demise: persona '{}' after {} commands",
                summary.persona, summary.command_count
            ),
            DEMISE_KARMA_DELTA,
        ));
        Ok(summary)
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn state(&self) -> GovernorState {
        self.state
    }

    pub fn persona(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.persona.as_str())
    }

    pub fn active_policy(&self) -> Option<&Policy> {
        self.session.as_ref().map(|s| &s.policy)
    }

    pub fn command_count(&self) -> u64 {
        self.session.as_ref().map_or(0, |s| s.command_count)
    }

    pub fn is_forced(&self) -> bool {
        self.forced.is_some()
    }

    /// Reason of the current trip; kept after session end until the next genesis.
    pub fn forced_reason(&self) -> Option<&TripReason> {
        self.forced.as_ref()
    }

    pub fn session_elapsed(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.session
            .as_ref()
            .map(|s| now.saturating_duration_since(s.started_at))
    }

    pub fn idle_elapsed(&self) -> Option<Duration> {
        let now = self.clock.now();
        self.session
            .as_ref()
            .map(|s| now.saturating_duration_since(s.last_activity))
    }

    pub fn snapshot(&self) -> GovernorSnapshot {
        GovernorSnapshot {
            state: self.state,
            persona: self.persona().map(str::to_string),
            policy: self.active_policy().cloned(),
            command_count: self.command_count(),
            session_elapsed_secs: self.session_elapsed().map(|d| d.as_secs()),
            idle_secs: self.idle_elapsed().map(|d| d.as_secs()),
            forced_reason: self.forced.clone(),
            rebirth: self.rebirth.clone(),
        }
    }

    fn not_active(&self) -> GovernorError {
        GovernorError::NotActive { state: self.state }
    }

    fn session_ref(&self) -> GovernorResult<&Session> {
        self.session.as_ref().ok_or_else(|| self.not_active())
    }

    fn session_mut(&mut self) -> GovernorResult<&mut Session> {
        let state = self.state;
        self.session
            .as_mut()
            .ok_or(GovernorError::NotActive { state })
    }
}
