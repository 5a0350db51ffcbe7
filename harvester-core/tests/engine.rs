use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use httpmock::{Method, MockServer};

use harvester_core::{run_engine, Category, TlsProfile, Unit, WorkQueue};

mod utils;
use utils::{fast_config, test_context, test_context_with_factory, unit, SingleProfileFactory};

const PAGE_BODY: &str = r#"{"data": [{"contract_id": "24-001"}], "page": 1}"#;

#[tokio::test]
async fn happy_path_persists_every_unit() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::GET);
        then.status(200).body(PAGE_BODY);
    });

    let ctx = test_context(dir.path(), fast_config(4, 4, false), vec![]).await;
    let units: Vec<Unit> = (1..=10)
        .map(|i| unit(&i.to_string(), server.url(format!("/api/{i}"))))
        .collect();

    let stats = run_engine(ctx.clone(), WorkQueue::new(units, HashSet::new()))
        .await
        .unwrap();

    assert_eq!(stats.total, 10);
    assert_eq!(stats.success, 10);
    assert_eq!(stats.fail, 0);
    assert_eq!(ctx.sink.count().await.unwrap(), 10);
    assert_eq!(ctx.ledgers.count(Category::Successful), 10);
    assert_eq!(ctx.ledgers.count(Category::Failed), 0);
    assert_eq!(ctx.ledgers.count(Category::Exception), 0);
    assert_eq!(ctx.ledgers.count(Category::Blocked), 0);
    mock.assert_hits(10);

    for i in 1..=10 {
        let payload = ctx.sink.get(&i.to_string()).await.unwrap();
        assert_eq!(payload.as_deref(), Some(PAGE_BODY));
    }
}

// A rate-limiting hop in front of a healthy origin: the unit must come
// out successful once the engine routes around the 429s.
#[tokio::test]
async fn transient_rate_limit_recovers() {
    let dir = tempfile::tempdir().unwrap();
    let origin = MockServer::start();
    let origin_mock = origin.mock(|when, then| {
        when.method(Method::GET);
        then.status(200).body(PAGE_BODY);
    });
    // A forward proxy that rate-limits everything it sees.
    let limiter = MockServer::start();
    limiter.mock(|_when, then| {
        then.status(429).body("too many requests");
    });

    let ctx = test_context(
        dir.path(),
        fast_config(1, 3, true),
        vec![limiter.base_url()],
    )
    .await;
    // Pretend a proxyless rate limit was just observed, so the proxy is
    // used from attempt 1.
    ctx.registry
        .set_proxyless_rate_limited(Instant::now() + Duration::from_secs(120));

    let units = vec![unit("u", origin.url("/api/u"))];
    let stats = run_engine(ctx.clone(), WorkQueue::new(units, HashSet::new()))
        .await
        .unwrap();

    assert_eq!(stats.success, 1);
    assert!(ctx.ledgers.is_successful("u"));
    assert!(stats.retries >= 1);
    origin_mock.assert_hits(1);

    let snapshot = ctx.registry.snapshot();
    let rate_limited: u64 = snapshot
        .fingerprints
        .values()
        .map(|health| health.rate_limited)
        .sum();
    assert!(rate_limited >= 1);
}

// Unsupported-fingerprint outcomes must not consume the retry budget:
// with a budget of one attempt, any number of unsupported picks may
// precede the single real (successful) request.
#[tokio::test]
async fn unsupported_fingerprints_do_not_spend_the_budget() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::GET).path("/api/u");
        then.status(200).body(PAGE_BODY);
    });

    let supported = TlsProfile::Safari17_0;
    let factory = Arc::new(SingleProfileFactory::new(
        supported,
        Duration::from_secs(5),
    ));
    let ctx =
        test_context_with_factory(dir.path(), fast_config(1, 1, false), factory, vec![]).await;

    let units = vec![unit("u", server.url("/api/u"))];
    let stats = run_engine(ctx.clone(), WorkQueue::new(units, HashSet::new()))
        .await
        .unwrap();

    assert_eq!(stats.success, 1);
    assert!(ctx.ledgers.is_successful("u"));
    // Exactly one request ever reached the wire.
    mock.assert_hits(1);

    // Whatever got picked before the supported profile is on the
    // persistent blacklist, and the supported one is not.
    let blacklist: Vec<String> = serde_json::from_slice(
        &std::fs::read(dir.path().join("never_success_tls.json")).unwrap_or_else(|_| b"[]".to_vec()),
    )
    .unwrap();
    assert!(!blacklist.contains(&supported.as_str().to_string()));
    for label in &blacklist {
        assert!(ctx.registry.is_blacklisted(label));
    }
}

#[tokio::test]
async fn permanent_block_lands_in_blocked_and_dropped() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::GET);
        then.status(200)
            .body("<html><title>Just a moment...</title></html>");
    });

    let ctx = test_context(dir.path(), fast_config(1, 3, false), vec![]).await;
    let units = vec![unit("u", server.url("/api/u"))];
    let stats = run_engine(ctx.clone(), WorkQueue::new(units, HashSet::new()))
        .await
        .unwrap();

    assert_eq!(stats.blocked, 1);
    assert_eq!(stats.success, 0);
    assert_eq!(ctx.ledgers.count(Category::Blocked), 1);
    assert_eq!(ctx.ledgers.count(Category::Dropped), 1);
    assert_eq!(ctx.sink.count().await.unwrap(), 0);
    mock.assert_hits(3);
}

// The only proxy dies with a connection failure; it must be blacklisted
// immediately and the unit finished proxyless.
#[tokio::test]
async fn proxy_collapse_falls_back_to_proxyless() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::GET);
        then.status(200).body(PAGE_BODY);
    });

    // Nothing listens on port 1.
    let dead_proxy = "http://127.0.0.1:1".to_string();
    let ctx = test_context(dir.path(), fast_config(1, 3, true), vec![dead_proxy]).await;
    ctx.registry
        .set_proxyless_rate_limited(Instant::now() + Duration::from_secs(120));

    let units = vec![unit("u", server.url("/api/u"))];
    let stats = run_engine(ctx.clone(), WorkQueue::new(units, HashSet::new()))
        .await
        .unwrap();

    assert_eq!(stats.success, 1);
    assert!(ctx.ledgers.is_successful("u"));
    // The collapsed proxy is out of the pool for good.
    assert_eq!(ctx.registry.pick_proxy(), None);
    // The connection failure was bucketed under curl-7.
    assert_eq!(ctx.ledgers.count(Category::Curl7), 1);
}

#[tokio::test]
async fn resume_skips_completed_units() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::GET);
        then.status(200).body(PAGE_BODY);
    });

    let make_units = |server: &MockServer| -> Vec<Unit> {
        (1..=5)
            .map(|i| unit(&i.to_string(), server.url(format!("/api/{i}"))))
            .collect()
    };

    // Run 1 completes everything.
    {
        let ctx = test_context(dir.path(), fast_config(2, 4, false), vec![]).await;
        let queue = WorkQueue::new(make_units(&server), ctx.ledgers.successful_ids());
        run_engine(ctx, queue).await.unwrap();
    }
    mock.assert_hits(5);

    // Run 2 over the same range must not issue a single request.
    let ctx = test_context(dir.path(), fast_config(2, 4, false), vec![]).await;
    let queue = WorkQueue::new(make_units(&server), ctx.ledgers.successful_ids());
    assert_eq!(queue.len(), 0);
    let stats = run_engine(ctx.clone(), queue).await.unwrap();

    mock.assert_hits(5);
    assert_eq!(stats.success, 0);
    assert_eq!(ctx.sink.count().await.unwrap(), 5);
}

// Every unit ends in exactly one terminal ledger, whatever mix of
// outcomes the origin hands back.
#[tokio::test]
async fn units_terminate_in_exactly_one_ledger() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::GET).path("/ok");
        then.status(200).body(PAGE_BODY);
    });
    server.mock(|when, then| {
        when.method(Method::GET).path("/gone");
        then.status(410).body("gone for good");
    });
    server.mock(|when, then| {
        when.method(Method::GET).path("/wall");
        then.status(200).body("just a moment");
    });

    let ctx = test_context(dir.path(), fast_config(3, 2, false), vec![]).await;
    let units = vec![
        unit("ok", server.url("/ok")),
        unit("gone", server.url("/gone")),
        unit("wall", server.url("/wall")),
    ];
    let stats = run_engine(ctx.clone(), WorkQueue::new(units, HashSet::new()))
        .await
        .unwrap();

    assert_eq!(stats.total, 3);
    for id in ["ok", "gone", "wall"] {
        let appearances = Category::TERMINAL
            .iter()
            .filter(|category| ctx.ledgers.ids(**category).contains(&id.to_string()))
            .count();
        assert_eq!(appearances, 1, "unit {id} should have exactly one terminal");
    }
    assert!(ctx.ledgers.is_successful("ok"));
    assert!(ctx.ledgers.ids(Category::Failed).contains(&"gone".to_string()));
    assert!(ctx.ledgers.ids(Category::Blocked).contains(&"wall".to_string()));

    // The permanent failure left its body snippet behind for debugging.
    let raw = std::fs::read_to_string(dir.path().join("raw/gone_raw.txt")).unwrap();
    assert_eq!(raw, "gone for good");

    // And the progress snapshot reflects the final counters.
    let snapshot: serde_json::Value = serde_json::from_slice(
        &std::fs::read(dir.path().join("progress_stats.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(snapshot["stats"]["total"], 3);
    assert_eq!(snapshot["stats"]["success"], 1);
}
