//! persona-governor: persona-scoped session lifecycle governor and durable karma ledger.
//!
//! The host runtime loop owns one [`LifecycleGovernor`] and one [`KarmaLedger`]:
//! `genesis` on session start, `record_activity` per command, `evaluate` per governance tick,
//! `session_end` on teardown, then act on `rebirth_pending` and `clear_rebirth`.
//! Karma changes are written to the ledger by the host; the governor only reads the current
//! karma through a [`KarmaProvider`] for its floor check.

mod clock;
mod config;
mod error;
mod events;
mod governor;
mod ledger;
mod policy;

// Policy Resolver
pub use policy::{
    builtin_policies, Policy, PolicyResolver, DEFAULT_IDLE_LIMIT_SECS, DEFAULT_MAX_SESSION_SECS,
    DEFAULT_MIN_KARMA, DEFAULT_PERSONA_ID,
};

// Lifecycle Governor + Rebirth Scheduler
pub use governor::{
    GovernorSnapshot, GovernorState, HostInfo, KarmaProvider, LifecycleGovernor, Rebirth,
    RebirthTable, SessionSummary, TripKind, TripReason, Verdict, DEFAULT_KARMA_FLOOR_TARGET,
    DEFAULT_SESSION_CAP_TARGET,
};

// Karma Ledger
pub use ledger::{
    FileLedgerLog, KarmaLedger, LedgerEntry, LedgerLog, RecordOutcome, ReplayStats,
    DEFAULT_CACHE_CAPACITY, DEFAULT_LEDGER_PATH,
};

// Time, events, configuration, errors
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{GovernorConfig, CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH};
pub use error::{ConfigError, GovernorError, GovernorResult, LedgerError, LedgerResult};
pub use events::{
    EventSink, LifecycleEvent, MemoryEventSink, NullEventSink, TracingEventSink,
    DEMISE_KARMA_DELTA, GENESIS_KARMA_DELTA, SYSTEM_CATEGORY, TRIP_KARMA_DELTA,
};
