//! Integration test: Lifecycle Governor — verifies shutdown evaluation order, stickiness,
//! rebirth routing, and the state machine against a deterministic clock.
//!
//! ## Scenarios
//! 1. calc_4k idle scenario: activity at t=0, evaluate at t=95s → idle trip naming calc_4k.
//! 2. Idle trips before the session cap when no activity is recorded.
//! 3. Idle disabled: session cap trips exactly at S regardless of activity.
//! 4. Karma floor trips when neither duration predicate has.
//! 5. Once tripped, evaluate returns the identical reason.
//! 6. Rebirth routing: karma floor → different persona; idle → same persona.
//! 7. Rebirth stays pending until cleared, and survives session end.
//! 8. Full cycle: trip → session end → genesis into the rebirth target.
//! 9. Misuse returns explicit invalid-state errors.

use persona_governor::{
    GovernorError, GovernorState, HostInfo, LifecycleGovernor, ManualClock, MemoryEventSink,
    Policy, PolicyResolver, TripKind, TripReason, Verdict, DEMISE_KARMA_DELTA,
    GENESIS_KARMA_DELTA, TRIP_KARMA_DELTA,
};
use std::collections::HashMap;
use std::sync::Arc;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter("persona=debug")
        .try_init();
}

fn host() -> HostInfo {
    HostInfo::new("4k", 4096)
}

fn governor_with(
    policies: Vec<Policy>,
) -> (LifecycleGovernor<ManualClock>, ManualClock, MemoryEventSink) {
    init_tracing();
    let clock = ManualClock::new();
    let sink = MemoryEventSink::new();
    let resolver = Arc::new(PolicyResolver::new(policies, Policy::default()));
    let gov = LifecycleGovernor::with_clock(resolver, clock.clone()).with_sink(sink.clone());
    (gov, clock, sink)
}

fn builtin_governor() -> (LifecycleGovernor<ManualClock>, ManualClock, MemoryEventSink) {
    init_tracing();
    let clock = ManualClock::new();
    let sink = MemoryEventSink::new();
    let gov = LifecycleGovernor::with_clock(Arc::new(PolicyResolver::builtin()), clock.clone())
        .with_sink(sink.clone());
    (gov, clock, sink)
}

// ===========================================================================
// Test 1: calc_4k idle scenario
// ===========================================================================

#[test]
fn calc_4k_idles_out_after_95_seconds() {
    let (mut gov, clock, _) = governor_with(vec![Policy::new("calc_4k", 600, 90, 0)]);
    gov.genesis("calc_4k", &host()).unwrap();
    gov.record_activity("2+2", "4").unwrap();

    clock.advance_secs(89);
    assert_eq!(gov.evaluate(&0i64).unwrap(), Verdict::Continue);

    clock.advance_secs(6);
    let verdict = gov.evaluate(&0i64).unwrap();
    assert!(verdict.is_tripped());
    let reason = verdict.reason().unwrap();
    assert_eq!(reason.kind(), TripKind::IdleTimeout);
    let text = reason.to_string();
    assert!(text.contains("idle"), "{text}");
    assert!(text.contains("calc_4k"), "{text}");
    assert!(text.contains("95"), "{text}");
}

// ===========================================================================
// Test 2: idle wins over the session cap
// ===========================================================================

#[test]
fn idle_trips_before_session_cap() {
    let (mut gov, clock, _) = governor_with(vec![Policy::new("p", 100, 30, 0)]);
    gov.genesis("p", &host()).unwrap();

    // Tick every 10s with no activity; the first trip must be idle, not the cap.
    let mut first = None;
    for _ in 0..20 {
        clock.advance_secs(10);
        if let Verdict::Shutdown(reason) = gov.evaluate(&0i64).unwrap() {
            first = Some((reason, clock.elapsed().as_secs()));
            break;
        }
    }
    let (reason, at) = first.expect("governor never tripped");
    assert_eq!(reason.kind(), TripKind::IdleTimeout);
    assert_eq!(at, 30);
}

#[test]
fn both_expired_reports_idle() {
    let (mut gov, clock, _) = governor_with(vec![Policy::new("p", 10, 5, -1)]);
    gov.genesis("p", &host()).unwrap();
    clock.advance_secs(1000);
    let verdict = gov.evaluate(&-50i64).unwrap();
    assert_eq!(verdict.reason().map(TripReason::kind), Some(TripKind::IdleTimeout));
}

// ===========================================================================
// Test 3: session cap with idle disabled
// ===========================================================================

#[test]
fn session_cap_trips_exactly_at_limit_despite_activity() {
    let (mut gov, clock, _) = governor_with(vec![Policy::new("p", 60, 0, 0)]);
    gov.genesis("p", &host()).unwrap();

    for _ in 0..59 {
        clock.advance_secs(1);
        gov.record_activity("busy", "ok").unwrap();
        assert_eq!(gov.evaluate(&0i64).unwrap(), Verdict::Continue);
    }
    clock.advance_secs(1);
    let verdict = gov.evaluate(&0i64).unwrap();
    match verdict {
        Verdict::Shutdown(TripReason::SessionCap {
            persona,
            elapsed_secs,
            limit_secs,
        }) => {
            assert_eq!(persona, "p");
            assert_eq!(elapsed_secs, 60);
            assert_eq!(limit_secs, 60);
        }
        other => panic!("expected session cap, got {other:?}"),
    }
}

// ===========================================================================
// Test 4: karma floor
// ===========================================================================

#[test]
fn karma_floor_trips_when_durations_are_fine() {
    let (mut gov, clock, _) = governor_with(vec![Policy::new("p", 600, 90, -25)]);
    gov.genesis("p", &host()).unwrap();
    clock.advance_secs(10);
    gov.record_activity("cmd", "ok").unwrap();

    assert_eq!(gov.evaluate(&-24i64).unwrap(), Verdict::Continue);

    let mut karma = HashMap::new();
    karma.insert("p".to_string(), -25i64);
    let verdict = gov.evaluate(&karma).unwrap();
    let reason = verdict.reason().unwrap();
    assert_eq!(reason.kind(), TripKind::KarmaFloor);
    assert!(reason.to_string().contains("karma"));
    assert!(reason.to_string().contains("-25"));
}

#[test]
fn zero_floor_is_disabled() {
    let (mut gov, _, _) = governor_with(vec![Policy::new("p", 0, 0, 0)]);
    gov.genesis("p", &host()).unwrap();
    assert_eq!(gov.evaluate(&i64::MIN).unwrap(), Verdict::Continue);
}

// ===========================================================================
// Test 5: sticky trip
// ===========================================================================

#[test]
fn repeated_evaluate_returns_identical_reason() {
    let (mut gov, clock, sink) = governor_with(vec![Policy::new("p", 600, 90, -5)]);
    gov.genesis("p", &host()).unwrap();
    let first = gov.evaluate(&-5i64).unwrap();
    assert!(first.is_tripped());

    // Conditions change; the verdict must not.
    clock.advance_secs(10_000);
    for karma in [100i64, -5, -1000] {
        assert_eq!(gov.evaluate(&karma).unwrap(), first);
    }
    assert!(gov.is_forced());
    let trips = sink
        .events()
        .iter()
        .filter(|e| e.reputation_delta == TRIP_KARMA_DELTA)
        .count();
    assert_eq!(trips, 1);
}

// ===========================================================================
// Test 6: rebirth routing
// ===========================================================================

#[test]
fn karma_floor_rebirths_into_another_persona() {
    let (mut gov, _, _) = builtin_governor();
    gov.genesis("shell_16k", &host()).unwrap();
    gov.evaluate(&-60i64).unwrap();
    let rebirth = gov.rebirth_pending().unwrap();
    assert_eq!(rebirth.reason.kind(), TripKind::KarmaFloor);
    assert_ne!(rebirth.target_persona, "shell_16k");
}

#[test]
fn idle_rebirths_into_same_persona() {
    let (mut gov, clock, _) = builtin_governor();
    gov.genesis("calc_4k", &host()).unwrap();
    clock.advance_secs(90);
    gov.evaluate(&10i64).unwrap();
    let rebirth = gov.rebirth_pending().unwrap();
    assert_eq!(rebirth.reason.kind(), TripKind::IdleTimeout);
    assert_eq!(rebirth.target_persona, "calc_4k");
}

#[test]
fn session_cap_rebirths_into_other_tier() {
    let (mut gov, clock, _) = builtin_governor();
    gov.genesis("shell_16k", &host()).unwrap();
    for _ in 0..12 {
        clock.advance_secs(299);
        gov.record_activity("job", "ok").unwrap();
    }
    clock.advance_secs(12);
    let verdict = gov.evaluate(&0i64).unwrap();
    assert_eq!(verdict.reason().map(TripReason::kind), Some(TripKind::SessionCap));
    assert_eq!(gov.rebirth_pending().unwrap().target_persona, "lite_2k");
}

#[test]
fn guardian_karma_floor_never_relaunches_guardian() {
    let (mut gov, _, _) = builtin_governor();
    gov.genesis("guardian_64k", &host()).unwrap();
    let verdict = gov.evaluate(&-150i64).unwrap();
    assert_eq!(verdict.reason().map(TripReason::kind), Some(TripKind::KarmaFloor));
    let rebirth = gov.rebirth_pending().unwrap();
    assert_ne!(rebirth.target_persona, "guardian_64k");
    assert_eq!(rebirth.target_persona, "lite_2k");
}

#[test]
fn lite_session_cap_moves_to_another_tier() {
    let (mut gov, clock, _) = builtin_governor();
    gov.genesis("lite_2k", &host()).unwrap();
    for _ in 0..6 {
        clock.advance_secs(50);
        gov.record_activity("job", "ok").unwrap();
    }
    let verdict = gov.evaluate(&0i64).unwrap();
    assert_eq!(verdict.reason().map(TripReason::kind), Some(TripKind::SessionCap));
    let rebirth = gov.rebirth_pending().unwrap();
    assert_ne!(rebirth.target_persona, "lite_2k");
    assert_eq!(rebirth.target_persona, "calc_4k");
}

// ===========================================================================
// Test 7: rebirth visibility contract
// ===========================================================================

#[test]
fn rebirth_pending_until_cleared() {
    let (mut gov, clock, _) = builtin_governor();
    gov.genesis("calc_4k", &host()).unwrap();
    clock.advance_secs(100);
    gov.evaluate(&0i64).unwrap();

    // A later predicate does not replace the first recommendation.
    gov.evaluate(&-1000i64).unwrap();
    assert_eq!(gov.rebirth_pending().unwrap().reason.kind(), TripKind::IdleTimeout);

    gov.session_end(&0i64).unwrap();
    assert!(gov.rebirth_pending().is_some());

    let taken = gov.clear_rebirth().unwrap();
    assert_eq!(taken.target_persona, "calc_4k");
    assert!(gov.rebirth_pending().is_none());
    assert!(gov.clear_rebirth().is_none());
}

// ===========================================================================
// Test 8: full cycle into the rebirth target
// ===========================================================================

#[test]
fn trip_end_and_rebirth_cycle() {
    let (mut gov, clock, sink) = builtin_governor();
    gov.genesis("calc_4k", &host()).unwrap();
    gov.record_activity("sqrt 2", "1.414").unwrap();
    clock.advance_secs(30);

    let mut karma = HashMap::new();
    karma.insert("calc_4k".to_string(), -200i64);
    // calc_4k has the floor disabled; drive it down anyway and let the idle limit fire.
    assert_eq!(gov.evaluate(&karma).unwrap(), Verdict::Continue);
    clock.advance_secs(60);
    assert!(gov.evaluate(&karma).unwrap().is_tripped());

    let summary = gov.session_end(&karma).unwrap();
    assert_eq!(summary.command_count, 1);
    assert_eq!(summary.final_karma, Some(-200));
    assert_eq!(summary.forced_reason.as_ref().map(TripReason::kind), Some(TripKind::IdleTimeout));
    assert_eq!(gov.state(), GovernorState::Terminated);
    assert!(gov.is_forced());

    let target = gov.clear_rebirth().unwrap().target_persona;
    let policy = gov.genesis(&target, &host()).unwrap().clone();
    assert_eq!(policy.persona_id, "calc_4k");
    assert_eq!(gov.state(), GovernorState::Active);
    assert!(!gov.is_forced());
    assert_eq!(gov.command_count(), 0);
    assert_eq!(gov.evaluate(&karma).unwrap(), Verdict::Continue);

    let deltas: Vec<i64> = sink.events().iter().map(|e| e.reputation_delta).collect();
    assert_eq!(
        deltas,
        vec![GENESIS_KARMA_DELTA, TRIP_KARMA_DELTA, DEMISE_KARMA_DELTA, GENESIS_KARMA_DELTA]
    );
    assert!(sink.events().iter().all(|e| e.category == "system"));
}

// ===========================================================================
// Test 9: misuse
// ===========================================================================

#[test]
fn misuse_is_reported_not_ignored() {
    let (mut gov, _, sink) = builtin_governor();
    assert!(matches!(
        gov.record_activity("x", "y"),
        Err(GovernorError::NotActive { state: GovernorState::Inert })
    ));

    gov.genesis("calc_4k", &host()).unwrap();
    assert!(matches!(
        gov.genesis("shell_16k", &host()),
        Err(GovernorError::AlreadyActive { ref persona }) if persona == "calc_4k"
    ));
    assert_eq!(gov.persona(), Some("calc_4k"));

    gov.session_end(&0i64).unwrap();
    assert!(matches!(
        gov.session_end(&0i64),
        Err(GovernorError::NotActive { state: GovernorState::Terminated })
    ));
    assert!(gov.record_activity("x", "y").is_err());
    // Only genesis + demise were emitted.
    assert_eq!(sink.len(), 2);
}

#[test]
fn unknown_persona_runs_under_default_policy() {
    let (mut gov, clock, _) = builtin_governor();
    let policy = gov.genesis("mystery", &host()).unwrap().clone();
    assert_eq!(policy, Policy::default());
    clock.advance_secs(179);
    assert_eq!(gov.evaluate(&-24i64).unwrap(), Verdict::Continue);
    clock.advance_secs(1);
    let verdict = gov.evaluate(&0i64).unwrap();
    assert_eq!(verdict.reason().map(TripReason::persona), Some("mystery"));
}
