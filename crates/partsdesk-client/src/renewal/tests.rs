use super::*;
use chrono::Duration;
use partsdesk_core::Session;
use partsdesk_core::expiry::format_expiry;
use partsdesk_session::MemorySessionStore;
use std::sync::Mutex;
use std::sync::atomic::AtomicU32;

enum Reply {
    Renew(RenewedCredentials),
    Reject,
    Fail,
}

struct FakeEndpoint {
    calls: AtomicU32,
    reply: Mutex<Reply>,
    delay: std::time::Duration,
    seen_tokens: Mutex<Vec<String>>,
}

impl FakeEndpoint {
    fn new(reply: Reply) -> Self {
        Self {
            calls: AtomicU32::new(0),
            reply: Mutex::new(reply),
            delay: std::time::Duration::ZERO,
            seen_tokens: Mutex::new(Vec::new()),
        }
    }

    fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenewalEndpoint for FakeEndpoint {
    async fn renew(&self, token: &str) -> Result<RenewedCredentials> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen_tokens.lock().unwrap().push(token.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &*self.reply.lock().unwrap() {
            Reply::Renew(creds) => Ok(creds.clone()),
            Reply::Reject => Err(ClientError::SessionEnded),
            Reply::Fail => Err(ClientError::Status {
                status_code: 500,
                message: "boom".to_string(),
            }),
        }
    }
}

fn now() -> DateTime<Utc> {
    "2025-03-01T12:00:00Z".parse().unwrap()
}

fn store_expiring_in(clock_now: DateTime<Utc>, lifetime: Duration) -> Arc<MemorySessionStore> {
    let session = Session::new("tok-1").with_expiry(format_expiry(clock_now + lifetime));
    Arc::new(MemorySessionStore::with_session(session))
}

fn coordinator(
    store: Arc<MemorySessionStore>,
    endpoint: Arc<FakeEndpoint>,
    clock: Arc<ManualClock>,
) -> TokenRenewalCoordinator {
    TokenRenewalCoordinator::new(store, endpoint, RenewalConfig::default()).with_clock(clock)
}

fn renewed_for(hours: i64) -> Reply {
    Reply::Renew(RenewedCredentials {
        token: None,
        expires_at: Some(format_expiry(now() + Duration::hours(hours))),
    })
}

#[test]
fn test_needs_extension_threshold() {
    let clock = Arc::new(ManualClock::new(now()));
    let endpoint = Arc::new(FakeEndpoint::new(renewed_for(1)));

    let soon = coordinator(
        store_expiring_in(now(), Duration::minutes(4)),
        Arc::clone(&endpoint),
        Arc::clone(&clock),
    );
    assert!(soon.needs_extension());

    let healthy = coordinator(
        store_expiring_in(now(), Duration::minutes(30)),
        Arc::clone(&endpoint),
        Arc::clone(&clock),
    );
    assert!(!healthy.needs_extension());

    let expired = coordinator(
        store_expiring_in(now(), Duration::minutes(-5)),
        endpoint,
        clock,
    );
    assert!(expired.needs_extension());
}

#[test]
fn test_needs_extension_without_token_or_expiry() {
    let clock = Arc::new(ManualClock::new(now()));
    let endpoint = Arc::new(FakeEndpoint::new(renewed_for(1)));

    let empty = coordinator(
        Arc::new(MemorySessionStore::new()),
        Arc::clone(&endpoint),
        Arc::clone(&clock),
    );
    assert!(!empty.needs_extension());
    assert_eq!(empty.should_attempt(), Err(SkipReason::NoToken));

    let no_expiry = coordinator(
        Arc::new(MemorySessionStore::with_session(Session::new("tok"))),
        Arc::clone(&endpoint),
        Arc::clone(&clock),
    );
    assert!(!no_expiry.needs_extension());

    let garbage = coordinator(
        Arc::new(MemorySessionStore::with_session(
            Session::new("tok").with_expiry("next tuesday"),
        )),
        endpoint,
        clock,
    );
    assert!(!garbage.needs_extension());
}

#[tokio::test]
async fn test_scenario_due_token_renews_once() {
    let clock = Arc::new(ManualClock::new(now() - Duration::minutes(11)));
    let store = store_expiring_in(now(), Duration::minutes(1));
    let endpoint = Arc::new(FakeEndpoint::new(renewed_for(1)));
    let coordinator = coordinator(Arc::clone(&store), Arc::clone(&endpoint), Arc::clone(&clock));

    // An attempt eleven minutes ago is outside the cooldown
    coordinator.state.set_last_attempt(Some(Attempt {
        started: clock.instant(),
        wall: clock.now(),
    }));
    clock.advance(Duration::minutes(11));
    assert_eq!(clock.now(), now());

    assert_eq!(coordinator.extend_if_needed().await, RenewalOutcome::Renewed);
    assert_eq!(endpoint.calls(), 1);
    assert!(!coordinator.needs_extension());
    assert_eq!(store.token().as_deref(), Some("tok-1"));
    assert_eq!(
        store.expiry(),
        Some(format_expiry(now() + Duration::hours(1)))
    );
    assert_eq!(coordinator.state().last_attempt_at(), Some(now()));
    assert!(!coordinator.state().is_in_flight());
}

#[tokio::test]
async fn test_healthy_token_never_calls_endpoint() {
    let clock = Arc::new(ManualClock::new(now()));
    let store = store_expiring_in(now(), Duration::hours(2));
    let endpoint = Arc::new(FakeEndpoint::new(renewed_for(3)));
    let coordinator = coordinator(store, Arc::clone(&endpoint), clock);

    for _ in 0..5 {
        assert_eq!(
            coordinator.extend_if_needed().await,
            RenewalOutcome::Skipped(SkipReason::NotDue)
        );
    }
    assert_eq!(endpoint.calls(), 0);
    assert_eq!(coordinator.state().last_attempt_at(), None);
}

#[tokio::test]
async fn test_rotated_token_is_stored() {
    let clock = Arc::new(ManualClock::new(now()));
    let store = store_expiring_in(now(), Duration::minutes(2));
    let endpoint = Arc::new(FakeEndpoint::new(Reply::Renew(RenewedCredentials {
        token: Some("tok-2".to_string()),
        expires_at: Some(format_expiry(now() + Duration::hours(1))),
    })));
    let coordinator = coordinator(Arc::clone(&store), Arc::clone(&endpoint), clock);

    assert_eq!(coordinator.extend_if_needed().await, RenewalOutcome::Renewed);
    assert_eq!(store.token().as_deref(), Some("tok-2"));
    assert_eq!(endpoint.seen_tokens.lock().unwrap().as_slice(), ["tok-1"]);
}

#[tokio::test]
async fn test_rejection_clears_session() {
    let clock = Arc::new(ManualClock::new(now()));
    let store = store_expiring_in(now(), Duration::minutes(2));
    let endpoint = Arc::new(FakeEndpoint::new(Reply::Reject));
    let coordinator = coordinator(Arc::clone(&store), Arc::clone(&endpoint), clock);

    assert_eq!(
        coordinator.extend_if_needed().await,
        RenewalOutcome::SessionCleared
    );
    assert!(store.session().is_none());
    assert_eq!(coordinator.state().last_attempt_at(), None);
}

#[tokio::test]
async fn test_failure_is_absorbed_and_throttled() {
    let clock = Arc::new(ManualClock::new(now()));
    let store = store_expiring_in(now(), Duration::minutes(2));
    let endpoint = Arc::new(FakeEndpoint::new(Reply::Fail));
    let coordinator = coordinator(Arc::clone(&store), Arc::clone(&endpoint), Arc::clone(&clock));

    assert_eq!(coordinator.extend_if_needed().await, RenewalOutcome::Failed);
    assert_eq!(store.token().as_deref(), Some("tok-1"));

    clock.advance(Duration::minutes(9));
    assert_eq!(
        coordinator.extend_if_needed().await,
        RenewalOutcome::Skipped(SkipReason::CoolingDown)
    );
    assert_eq!(endpoint.calls(), 1);

    clock.advance(Duration::minutes(1));
    assert_eq!(coordinator.extend_if_needed().await, RenewalOutcome::Failed);
    assert_eq!(endpoint.calls(), 2);
}

#[tokio::test]
async fn test_cooldown_ignores_wall_clock_set_back() {
    let clock = Arc::new(ManualClock::new(now()));
    let store = store_expiring_in(now(), Duration::minutes(2));
    let endpoint = Arc::new(FakeEndpoint::new(Reply::Fail));
    let coordinator = coordinator(Arc::clone(&store), Arc::clone(&endpoint), Arc::clone(&clock));

    assert_eq!(coordinator.extend_if_needed().await, RenewalOutcome::Failed);

    // Device time moves back a day; the token is still due relative to it
    let earlier = now() - Duration::days(1);
    clock.set(earlier);
    store
        .update_expiry(&format_expiry(earlier + Duration::minutes(2)))
        .unwrap();
    assert_eq!(
        coordinator.extend_if_needed().await,
        RenewalOutcome::Skipped(SkipReason::CoolingDown)
    );

    clock.advance(Duration::minutes(11));
    assert_eq!(coordinator.extend_if_needed().await, RenewalOutcome::Failed);
    assert_eq!(endpoint.calls(), 2);
}

#[tokio::test]
async fn test_cooldown_ignores_wall_clock_jump_forward() {
    let clock = Arc::new(ManualClock::new(now()));
    let store = store_expiring_in(now(), Duration::minutes(2));
    let endpoint = Arc::new(FakeEndpoint::new(Reply::Fail));
    let coordinator = coordinator(Arc::clone(&store), Arc::clone(&endpoint), Arc::clone(&clock));

    assert_eq!(coordinator.extend_if_needed().await, RenewalOutcome::Failed);

    let later = now() + Duration::days(1);
    clock.set(later);
    store
        .update_expiry(&format_expiry(later + Duration::minutes(2)))
        .unwrap();
    assert_eq!(
        coordinator.extend_if_needed().await,
        RenewalOutcome::Skipped(SkipReason::CoolingDown)
    );
    assert_eq!(endpoint.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_system_clock_cooldown_follows_tokio_time() {
    let store = store_expiring_in(Utc::now(), Duration::minutes(2));
    let endpoint = Arc::new(FakeEndpoint::new(Reply::Fail));
    let coordinator =
        TokenRenewalCoordinator::new(store.clone(), endpoint.clone(), RenewalConfig::default());

    assert_eq!(coordinator.extend_if_needed().await, RenewalOutcome::Failed);

    tokio::time::advance(std::time::Duration::from_secs(9 * 60)).await;
    assert_eq!(
        coordinator.extend_if_needed().await,
        RenewalOutcome::Skipped(SkipReason::CoolingDown)
    );

    tokio::time::advance(std::time::Duration::from_secs(60)).await;
    assert_eq!(coordinator.extend_if_needed().await, RenewalOutcome::Failed);
    assert_eq!(endpoint.calls(), 2);
}

#[tokio::test]
async fn test_reset_clears_cooldown() {
    let clock = Arc::new(ManualClock::new(now()));
    let store = store_expiring_in(now(), Duration::minutes(2));
    let endpoint = Arc::new(FakeEndpoint::new(Reply::Fail));
    let coordinator = coordinator(store, Arc::clone(&endpoint), clock);

    coordinator.extend_if_needed().await;
    assert_eq!(
        coordinator.should_attempt(),
        Err(SkipReason::CoolingDown)
    );

    coordinator.reset();
    assert_eq!(coordinator.should_attempt(), Ok(()));
}

#[tokio::test]
async fn test_disabled_coordinator_skips() {
    let clock = Arc::new(ManualClock::new(now()));
    let store = store_expiring_in(now(), Duration::minutes(1));
    let endpoint = Arc::new(FakeEndpoint::new(renewed_for(1)));
    let config = RenewalConfig {
        enabled: false,
        ..RenewalConfig::default()
    };
    let coordinator =
        TokenRenewalCoordinator::new(store, endpoint.clone(), config).with_clock(clock);

    assert_eq!(
        coordinator.extend_if_needed().await,
        RenewalOutcome::Skipped(SkipReason::Disabled)
    );
    assert_eq!(endpoint.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_call_endpoint_once() {
    let clock = Arc::new(ManualClock::new(now()));
    let store = store_expiring_in(now(), Duration::minutes(1));
    let endpoint = Arc::new(
        FakeEndpoint::new(Reply::Fail).with_delay(std::time::Duration::from_millis(50)),
    );
    let coordinator = Arc::new(coordinator(store, Arc::clone(&endpoint), clock));
    let start = Arc::new(tokio::sync::Barrier::new(16));

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let coordinator = Arc::clone(&coordinator);
            let start = Arc::clone(&start);
            tokio::spawn(async move {
                start.wait().await;
                coordinator.extend_if_needed().await
            })
        })
        .collect();

    let mut attempted = 0;
    for handle in handles {
        if handle.await.unwrap().attempted() {
            attempted += 1;
        }
    }

    assert_eq!(attempted, 1);
    assert_eq!(endpoint.calls(), 1);
    assert!(!coordinator.state().is_in_flight());
}

#[tokio::test]
async fn test_session_change_during_renewal_discards_result() {
    let clock = Arc::new(ManualClock::new(now()));
    let store = store_expiring_in(now(), Duration::minutes(1));
    let endpoint = Arc::new(
        FakeEndpoint::new(renewed_for(1)).with_delay(std::time::Duration::from_millis(50)),
    );
    let coordinator = Arc::new(coordinator(
        Arc::clone(&store),
        Arc::clone(&endpoint),
        clock,
    ));

    let running = {
        let coordinator = Arc::clone(&coordinator);
        tokio::spawn(async move { coordinator.extend_if_needed().await })
    };

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    store
        .save(Session::new("tok-fresh").with_expiry(format_expiry(now() + Duration::hours(8))))
        .unwrap();

    assert_eq!(running.await.unwrap(), RenewalOutcome::Discarded);
    assert_eq!(store.token().as_deref(), Some("tok-fresh"));
    assert_eq!(
        store.expiry(),
        Some(format_expiry(now() + Duration::hours(8)))
    );
}

#[tokio::test]
async fn test_trigger_spawns_only_when_due() {
    let clock = Arc::new(ManualClock::new(now()));
    let endpoint = Arc::new(FakeEndpoint::new(renewed_for(1)));

    let healthy = Arc::new(coordinator(
        store_expiring_in(now(), Duration::hours(1)),
        Arc::clone(&endpoint),
        Arc::clone(&clock),
    ));
    assert!(healthy.trigger().is_none());

    let due = Arc::new(coordinator(
        store_expiring_in(now(), Duration::minutes(1)),
        Arc::clone(&endpoint),
        clock,
    ));
    let handle = due.trigger().expect("renewal should be spawned");
    assert_eq!(handle.await.unwrap(), RenewalOutcome::Renewed);
    assert_eq!(endpoint.calls(), 1);
}

#[tokio::test]
async fn test_metrics_record_outcomes() {
    let metrics = Metrics::new().unwrap();
    let clock = Arc::new(ManualClock::new(now()));
    let store = store_expiring_in(now(), Duration::minutes(1));
    let endpoint = Arc::new(FakeEndpoint::new(Reply::Reject));
    let coordinator =
        coordinator(store, endpoint, clock).with_metrics(metrics.clone());

    coordinator.extend_if_needed().await;
    coordinator.extend_if_needed().await;

    assert_eq!(
        metrics
            .renewal_attempts_total
            .with_label_values(&["session_cleared"])
            .get(),
        1.0
    );
    assert_eq!(
        metrics
            .renewal_attempts_total
            .with_label_values(&["no_token"])
            .get(),
        1.0
    );
    assert_eq!(
        metrics
            .session_clears_total
            .with_label_values(&["renewal_rejected"])
            .get(),
        1.0
    );
}

#[test]
fn test_parse_renewal_body_variants() {
    let body = parse_renewal_body(r#"{"token":"t2","expiresAt":"2025-03-01T13:00:00Z"}"#);
    assert_eq!(body.token.as_deref(), Some("t2"));
    assert_eq!(body.expires_at.as_deref(), Some("2025-03-01T13:00:00Z"));

    let body = parse_renewal_body(r#"{"accessToken":"t3","expires_at":"x"}"#);
    assert_eq!(body.token.as_deref(), Some("t3"));
    assert_eq!(body.expires_at.as_deref(), Some("x"));

    let body = parse_renewal_body(r#"{"data":{"expiresAt":"2025-03-01T13:00:00Z"}}"#);
    assert_eq!(body.token, None);
    assert_eq!(body.expires_at.as_deref(), Some("2025-03-01T13:00:00Z"));

    let body = parse_renewal_body("");
    assert_eq!(body.token, None);
    assert_eq!(body.expires_at, None);

    let body = parse_renewal_body("ok");
    assert_eq!(body.expires_at, None);
}

#[test]
fn test_join_url() {
    assert_eq!(
        join_url("http://localhost:3000/api/", "/auth/renew"),
        "http://localhost:3000/api/auth/renew"
    );
    assert_eq!(join_url("http://h", "x"), "http://h/x");
}
