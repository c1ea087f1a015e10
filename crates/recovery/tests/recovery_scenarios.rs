//! End-to-end recovery scenarios driven the way the display loop drives the
//! orchestrator: one tick per second on a manual clock.

use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use scoreboard_recovery::errors::CIRCUIT_OPEN_CODE;
use scoreboard_recovery::{
    CircuitBreakerConfig, CircuitState, Connectivity, Failure, FetchKey, ManualClock,
    RecoveryConfig, RecoveryEvent, RecoveryOrchestrator, RecoveryStatus, RequiredFields,
    RetryConfig,
};
use serde_json::{json, Value};

const TICK: Duration = Duration::from_secs(1);

#[derive(Default)]
struct ScriptedConnectivity {
    online: AtomicBool,
    reconnects: AtomicU32,
}

impl ScriptedConnectivity {
    fn offline() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    fn reconnects(&self) -> u32 {
        self.reconnects.load(Ordering::SeqCst)
    }
}

impl Connectivity for ScriptedConnectivity {
    fn is_connected(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
    }
}

fn config() -> RecoveryConfig {
    RecoveryConfig {
        retry: RetryConfig::default().with_jitter(false),
        ..Default::default()
    }
}

fn setup<T: Clone>(
    connectivity: Arc<dyn Connectivity>,
) -> (RecoveryOrchestrator<T>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let orch = RecoveryOrchestrator::new(config(), clock.clone(), connectivity);
    (orch, clock)
}

fn online() -> Arc<dyn Connectivity> {
    let connectivity = ScriptedConnectivity::offline();
    connectivity.set_online(true);
    connectivity
}

fn ignore(_: RecoveryEvent) {}

#[test]
fn test_fails_twice_then_succeeds() {
    let (mut orch, clock) = setup::<String>(online());
    let key = FetchKey::team("Lakers", "NBA");
    let calls = Cell::new(0);
    let fetch = || {
        calls.set(calls.get() + 1);
        if calls.get() < 3 {
            Err(Failure::api("Gateway timeout", Some(504)))
        } else {
            Ok(format!("result {}", calls.get()))
        }
    };

    let mut status = orch.attempt_fetch(&key, fetch, ignore);
    while !status.is_success() {
        assert_eq!(status.tag(), "StillRecovering");
        clock.advance(TICK);
        status = orch.attempt_fetch(&key, fetch, ignore);
    }

    assert_eq!(
        status,
        RecoveryStatus::Success {
            data: "result 3".to_string()
        }
    );
    assert_eq!(calls.get(), 3);
    assert_eq!(clock.elapsed(), Duration::from_secs(3));
    assert_eq!(orch.circuit_breaker().state(&key), CircuitState::Closed);
    assert_eq!(orch.circuit_breaker().consecutive_failures(&key), 0);
}

#[test]
fn test_persistent_failure_without_cache_ends_terminally() {
    let (mut orch, clock) = setup::<String>(online());
    let key = FetchKey::team("Bruins", "NHL");
    let calls = Cell::new(0);
    let fetch = || {
        calls.set(calls.get() + 1);
        Err(Failure::network("No route to host"))
    };
    let mut events = Vec::new();

    let mut status = orch.attempt_fetch(&key, fetch, |e| events.push(e));
    let mut highest_attempt = 0;
    while status.tag() != "TerminallyFailed" {
        match status {
            RecoveryStatus::StillRecovering { attempt, .. } => {
                assert!(attempt >= highest_attempt);
                highest_attempt = attempt;
            }
            ref other => panic!("unexpected status {:?}", other),
        }
        if calls.get() == 15 {
            assert_eq!(orch.circuit_breaker().state(&key), CircuitState::Open);
        }
        assert!(clock.elapsed() < Duration::from_secs(600), "never gave up");
        clock.advance(TICK);
        status = orch.attempt_fetch(&key, fetch, |e| events.push(e));
    }

    // Five exhausted sequences of three attempts open the breaker; the
    // remaining cycles are rejected without fetching.
    assert_eq!(calls.get(), 15);
    assert_eq!(highest_attempt, 11);
    assert_eq!(clock.elapsed(), Duration::from_secs(345));
    assert_eq!(orch.stats().circuit_rejections, 7);

    let RecoveryStatus::TerminallyFailed { code, message } = status else {
        unreachable!()
    };
    assert_eq!(code, CIRCUIT_OPEN_CODE);
    assert!(message.contains("NHL:Bruins"));
    assert_eq!(
        events,
        vec![RecoveryEvent::TerminalFailure {
            key: key.clone(),
            code: CIRCUIT_OPEN_CODE.to_string(),
        }]
    );
}

#[test]
fn test_terminal_failure_restarts_from_scratch() {
    let (mut orch, clock) = setup::<String>(online());
    let key = FetchKey::team("Cubs", "MLB");
    let fetch = || Err(Failure::api("Service unavailable", Some(503)));

    let mut status = orch.attempt_fetch(&key, fetch, ignore);
    while status.tag() != "TerminallyFailed" {
        clock.advance(TICK);
        status = orch.attempt_fetch(&key, fetch, ignore);
    }

    // Held for the recovery interval.
    clock.advance(Duration::from_secs(29));
    assert_eq!(orch.attempt_fetch(&key, fetch, ignore), status);

    // Counters restart; the breaker keeps its own cooldown and still rejects.
    clock.advance(TICK);
    let status = orch.attempt_fetch(&key, || panic!("breaker is open"), ignore);
    assert_eq!(
        status,
        RecoveryStatus::StillRecovering {
            attempt: 1,
            next_delay: Duration::from_secs(30),
        }
    );
    assert_eq!(orch.circuit_breaker().state(&key), CircuitState::Open);
}

#[test]
fn test_persistent_failure_serves_fallback_until_stale() {
    let (mut orch, clock) = setup::<String>(online());
    let key = FetchKey::team("Bears", "NFL");

    let status = orch.attempt_fetch(&key, || Ok("CHI 24 - 17 GB".to_string()), ignore);
    assert!(status.is_success());

    let calls = Cell::new(0);
    let fetch = || {
        calls.set(calls.get() + 1);
        Err(Failure::api("Service unavailable", Some(503)))
    };

    let mut saw_fallback = false;
    let mut status = status;
    while status.tag() != "TerminallyFailed" {
        clock.advance(TICK);
        status = orch.attempt_fetch(&key, fetch, ignore);
        match &status {
            RecoveryStatus::Success { .. } => {
                assert!(clock.elapsed() < Duration::from_secs(25));
            }
            RecoveryStatus::UsingFallback { data, age } => {
                saw_fallback = true;
                assert_eq!(data, "CHI 24 - 17 GB");
                assert!(*age <= Duration::from_secs(3600));
            }
            // Retries inside a sequence report progress.
            RecoveryStatus::StillRecovering { .. } | RecoveryStatus::TerminallyFailed { .. } => {}
            other => panic!("unexpected status {:?}", other),
        }
        assert!(clock.elapsed() < Duration::from_secs(7200), "never gave up");
    }

    assert!(saw_fallback);
    assert!(clock.elapsed() > Duration::from_secs(3600));
    assert!(orch.stats().fallbacks_served >= 12);
    assert_eq!(orch.circuit_breaker().state(&key), CircuitState::Open);
    assert_eq!(orch.cache().len(), 1);
}

#[test]
fn test_fallback_after_breaker_opens() {
    let mut config = config();
    config.retry = config.retry.with_max_attempts(1);
    let clock = Arc::new(ManualClock::new());
    let mut orch: RecoveryOrchestrator<u32> =
        RecoveryOrchestrator::new(config, clock.clone(), online());
    let key = FetchKey::team("Knicks", "NBA");

    orch.attempt_fetch(&key, || Ok(88), ignore);
    clock.advance(Duration::from_secs(25));

    for cycle in 1..=5 {
        let status = orch.attempt_fetch(&key, || Err(Failure::network("down")), ignore);
        assert_eq!(status.data(), Some(&88), "cycle {}", cycle);
        clock.advance(Duration::from_secs(30));
    }
    assert_eq!(orch.circuit_breaker().state(&key), CircuitState::Open);

    let status = orch.attempt_fetch(&key, || panic!("breaker is open"), ignore);
    assert_eq!(status.fallback_age_secs(), Some(175));
}

#[test]
fn test_repeated_ticks_are_idempotent() {
    let (mut orch, _clock) = setup::<u32>(online());
    let key = FetchKey::team("Rangers", "NHL");

    let first = orch.attempt_fetch(&key, || Err(Failure::network("down")), ignore);
    for _ in 0..50 {
        let again = orch.attempt_fetch(&key, || panic!("nothing is due"), ignore);
        assert_eq!(again, first);
    }
    assert_eq!(orch.stats().fetch_attempts, 1);
    assert_eq!(orch.status(&key), Some(&first));
}

#[test]
fn test_keys_are_isolated() {
    let mut config = config();
    config.circuit.failure_threshold = 1;
    config.retry = config.retry.with_max_attempts(1);
    let clock = Arc::new(ManualClock::new());
    let mut orch: RecoveryOrchestrator<u32> =
        RecoveryOrchestrator::new(config, clock.clone(), online());
    let failing = FetchKey::team("Mets", "MLB");
    let healthy = FetchKey::team("Yankees", "MLB");

    let status = orch.attempt_fetch(&failing, || Err(Failure::network("down")), ignore);
    assert_eq!(status.tag(), "StillRecovering");
    assert_eq!(orch.circuit_breaker().state(&failing), CircuitState::Open);

    let status = orch.attempt_fetch(&healthy, || Ok(5), ignore);
    assert_eq!(status, RecoveryStatus::Success { data: 5 });
    assert_eq!(orch.circuit_breaker().state(&healthy), CircuitState::Closed);
    assert!(orch
        .cache()
        .get_cached_data(&failing, Duration::from_secs(3600))
        .is_none());
}

#[test]
fn test_malformed_payload_keeps_previous_fallback() {
    let clock = Arc::new(ManualClock::new());
    let mut config = config();
    config.retry = config.retry.with_max_attempts(1);
    let mut orch: RecoveryOrchestrator<Value> =
        RecoveryOrchestrator::new(config, clock.clone(), online())
            .with_validator(RequiredFields::nhl_boxscore("Bruins"));
    let key = FetchKey::team("Bruins", "NHL");

    let good = json!({
        "gameState": "LIVE",
        "period": 2,
        "homeTeam": { "teamName": "Bruins", "score": 3 },
        "awayTeam": { "teamName": "Leafs", "score": 1 }
    });
    let good_clone = good.clone();
    assert!(orch.attempt_fetch(&key, move || Ok(good_clone), ignore).is_success());

    clock.advance(Duration::from_secs(25));
    let status = orch.attempt_fetch(&key, || Ok(json!({ "gameState": "LIVE" })), ignore);
    assert_eq!(
        status,
        RecoveryStatus::UsingFallback {
            data: good,
            age: Duration::from_secs(25),
        }
    );
}

#[test]
fn test_offline_probe_cadence_and_display_switch() {
    let connectivity = ScriptedConnectivity::offline();
    let (mut orch, clock) = setup::<u32>(connectivity.clone());
    let key = FetchKey::team("Celtics", "NBA");
    let mut events = Vec::new();

    let status = orch.attempt_fetch(&key, || panic!("offline"), |e| events.push(e));
    assert_eq!(
        status,
        RecoveryStatus::NetworkDown {
            offline: Duration::ZERO
        }
    );
    assert!(orch.is_offline());

    for _ in 0..19 {
        clock.advance(TICK);
        orch.attempt_fetch(&key, || panic!("offline"), |e| events.push(e));
    }
    assert_eq!(connectivity.reconnects(), 0);

    clock.advance(TICK);
    let status = orch.attempt_fetch(&key, || panic!("offline"), |e| events.push(e));
    assert_eq!(connectivity.reconnects(), 1);
    assert_eq!(
        status,
        RecoveryStatus::NetworkDown {
            offline: Duration::from_secs(20)
        }
    );
    assert_eq!(
        events,
        vec![RecoveryEvent::ReconnectProbe {
            offline: Duration::from_secs(20)
        }]
    );

    while clock.elapsed() < Duration::from_secs(400) {
        clock.advance(TICK);
        orch.attempt_fetch(&key, || panic!("offline"), |e| events.push(e));
    }

    let switches: Vec<_> = events
        .iter()
        .filter(|e| matches!(e, RecoveryEvent::SwitchToOfflineDisplay { .. }))
        .collect();
    assert_eq!(
        switches,
        vec![&RecoveryEvent::SwitchToOfflineDisplay {
            offline: Duration::from_secs(240)
        }]
    );
    assert_eq!(connectivity.reconnects(), 20);
    assert_eq!(orch.stats().offline_episodes, 1);

    // Restoration is noticed on the next probe and the fetch runs on the
    // same tick.
    connectivity.set_online(true);
    events.clear();
    while orch.is_offline() {
        clock.advance(TICK);
        let status = orch.attempt_fetch(&key, || Ok(9), |e| events.push(e));
        if !orch.is_offline() {
            assert_eq!(status, RecoveryStatus::Success { data: 9 });
        }
    }
    assert_eq!(clock.elapsed(), Duration::from_secs(420));
    assert_eq!(
        events,
        vec![
            RecoveryEvent::ReconnectProbe {
                offline: Duration::from_secs(420)
            },
            RecoveryEvent::ConnectivityRestored {
                offline: Duration::from_secs(420)
            },
        ]
    );
}

#[test]
fn test_independent_orchestrators_share_nothing() {
    let (mut a, _clock_a) = setup::<u32>(online());
    let (mut b, _clock_b) = setup::<u32>(online());
    let key = FetchKey::team("Bulls", "NBA");

    a.attempt_fetch(&key, || Ok(1), ignore);
    assert_eq!(a.cache().len(), 1);
    assert!(b.cache().is_empty());

    let status = b.attempt_fetch(&key, || Err(Failure::network("down")), ignore);
    assert_eq!(status.tag(), "StillRecovering");
    assert_eq!(a.status(&key), Some(&RecoveryStatus::Success { data: 1 }));
}

#[test]
fn test_display_switch_fires_once_per_episode() {
    let connectivity = ScriptedConnectivity::offline();
    let (mut orch, clock) = setup::<u32>(connectivity.clone());
    let key = FetchKey::team("Packers", "NFL");
    let mut events = Vec::new();

    orch.attempt_fetch(&key, || Ok(1), |e| events.push(e));
    while clock.elapsed() < Duration::from_secs(250) {
        clock.advance(TICK);
        orch.attempt_fetch(&key, || Ok(1), |e| events.push(e));
    }

    connectivity.set_online(true);
    while orch.is_offline() {
        clock.advance(TICK);
        orch.attempt_fetch(&key, || Ok(1), |e| events.push(e));
    }
    assert_eq!(orch.status(&key), Some(&RecoveryStatus::Success { data: 1 }));

    // Second episode starts when the next refresh finds the network gone.
    connectivity.set_online(false);
    let restored_at = clock.elapsed();
    while clock.elapsed() < restored_at + Duration::from_secs(600) {
        clock.advance(TICK);
        orch.attempt_fetch(&key, || Ok(1), |e| events.push(e));
    }

    let switches = events
        .iter()
        .filter(|e| matches!(e, RecoveryEvent::SwitchToOfflineDisplay { .. }))
        .count();
    assert_eq!(switches, 2);
    assert_eq!(orch.stats().offline_episodes, 2);
}

#[test]
fn test_connectivity_restored_mid_half_open_probe_fetches_again() {
    let connectivity = ScriptedConnectivity::offline();
    connectivity.set_online(true);
    let clock = Arc::new(ManualClock::new());
    let config = RecoveryConfig {
        circuit: CircuitBreakerConfig {
            failure_threshold: 1,
            ..Default::default()
        },
        ..config()
    };
    let mut orch = RecoveryOrchestrator::new(config, clock.clone(), connectivity.clone());
    let key = FetchKey::team("Yankees", "MLB");
    let failing = || Err(Failure::network("Connection reset"));

    // One exhausted sequence opens the breaker.
    while orch.circuit_breaker().state(&key) != CircuitState::Open {
        orch.attempt_fetch(&key, failing, ignore);
        clock.advance(TICK);
    }

    // The half-open probe fails and its retry sequence is still pending when
    // the network drops.
    clock.advance(Duration::from_secs(300));
    let status = orch.attempt_fetch(&key, failing, ignore);
    assert_eq!(status.tag(), "StillRecovering");
    assert_eq!(orch.circuit_breaker().state(&key), CircuitState::HalfOpen);

    connectivity.set_online(false);
    clock.advance(TICK);
    let status = orch.attempt_fetch(&key, || panic!("offline"), ignore);
    assert_eq!(status.tag(), "NetworkDown");

    connectivity.set_online(true);
    let called = Cell::new(false);
    let mut events = Vec::new();
    while orch.is_offline() {
        clock.advance(TICK);
        let status = orch.attempt_fetch(
            &key,
            || {
                called.set(true);
                Ok(4)
            },
            |e| events.push(e),
        );
        if !orch.is_offline() {
            assert_eq!(status, RecoveryStatus::Success { data: 4 });
        }
    }

    assert!(called.get());
    assert!(events
        .iter()
        .any(|e| matches!(e, RecoveryEvent::ConnectivityRestored { .. })));
    assert_eq!(orch.circuit_breaker().state(&key), CircuitState::Closed);
}
