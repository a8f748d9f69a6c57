//! End-to-end lifecycle tests against a real listener.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::http::Method;
use lifecycle_server::lifecycle::hook_error;
use lifecycle_server::{LifecycleError, RunState, Server};
use tokio_util::sync::CancellationToken;

mod common;

#[tokio::test]
async fn test_start_failure_never_opens_listener() {
    let server = Server::new(common::test_config());
    let calls = Arc::new(Mutex::new(Vec::new()));

    for (i, fail) in [false, true, false].into_iter().enumerate() {
        let calls = calls.clone();
        server.on_start(move |_ctx| {
            let calls = calls.clone();
            async move {
                calls.lock().unwrap().push(i);
                if fail {
                    Err(hook_error("database unreachable"))
                } else {
                    Ok(())
                }
            }
        });
    }

    let err = server.run(CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, LifecycleError::StartHook { index: 1, .. }));
    assert_eq!(*calls.lock().unwrap(), vec![0, 1]);
    assert_eq!(server.local_addr(), None);
    assert_eq!(server.run_state(), RunState::Stopped);
}

#[tokio::test]
async fn test_bind_failure_is_fatal() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let mut config = common::test_config();
    config.listener.bind_address = taken.local_addr().unwrap().to_string();

    let server = Server::new(config);
    let started = Arc::new(AtomicUsize::new(0));
    let s = started.clone();
    server.on_start(move |_ctx| {
        s.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });

    let err = server.run(CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, LifecycleError::Listener(_)), "got {err:?}");
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert_eq!(server.run_state(), RunState::Stopped);
}

#[tokio::test]
async fn test_serves_routes_and_probes() {
    let server = Arc::new(Server::new(common::test_config()));
    server.route(Method::GET, "/hello", || async { "hello" });
    server.liveness_check("event-loop", |_ctx| async { Ok(()) });
    server.readiness_check("database", |_ctx| async { Ok(()) });

    let token = CancellationToken::new();
    let task = common::spawn_server(server.clone(), token.clone());
    let addr = common::wait_for_serving(&server).await;
    let client = common::client();

    let res = client.get(format!("http://{addr}/hello")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "hello");

    let res = client.get(format!("http://{addr}/healthz")).send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["cache-control"], "no-store");
    assert_eq!(res.text().await.unwrap(), "ok");

    let res = client.get(format!("http://{addr}/readyz")).send().await.unwrap();
    assert_eq!(res.status(), 204);

    token.cancel();
    task.await.unwrap().unwrap();
    assert_eq!(server.run_state(), RunState::Stopped);
}

#[tokio::test]
async fn test_failing_readiness_check_reports_problem() {
    let mut config = common::test_config();
    config.health.prefix = "/internal".into();
    let server = Arc::new(Server::new(config));
    server.readiness_check("cache", |_ctx| async { Ok(()) });
    server.readiness_check("database", |_ctx| async {
        Err(hook_error("connection refused"))
    });

    let token = CancellationToken::new();
    let task = common::spawn_server(server.clone(), token.clone());
    let addr = common::wait_for_serving(&server).await;

    let res = common::client()
        .get(format!("http://{addr}/internal/readyz"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 503);
    assert_eq!(res.headers()["content-type"], "application/problem+json");

    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], 503);
    assert_eq!(body["checks"]["database"], "connection refused");
    assert!(body["checks"].get("cache").is_none());

    token.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_ready_hook_panic_keeps_serving() {
    let server = Arc::new(Server::new(common::test_config()));
    let (tx, rx) = tokio::sync::oneshot::channel();
    let tx = Arc::new(Mutex::new(Some(tx)));

    server.on_ready(|| async { panic!("cache warmup exploded") });
    server.on_ready(move || {
        let tx = tx.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        }
    });
    server.route(Method::GET, "/ping", || async { "pong" });

    let token = CancellationToken::new();
    let task = common::spawn_server(server.clone(), token.clone());
    let addr = common::wait_for_serving(&server).await;

    tokio::time::timeout(Duration::from_secs(2), rx)
        .await
        .expect("second ready hook never ran")
        .unwrap();

    let res = common::client()
        .get(format!("http://{addr}/ping"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(server.run_state(), RunState::Serving);

    token.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_shutdown_gets_fresh_budget_and_reverse_order() {
    let server = Arc::new(Server::new(common::test_config()));
    let events = Arc::new(Mutex::new(Vec::new()));

    for name in ["db", "cache", "queue"] {
        let events = events.clone();
        server.on_shutdown(move |ctx| {
            let events = events.clone();
            async move {
                let remaining = ctx.remaining().expect("shutdown context has a deadline");
                assert!(ctx.err().is_none(), "shutdown context already done");
                assert!(remaining > Duration::from_millis(1500), "{remaining:?}");
                events.lock().unwrap().push(format!("shutdown {name}"));
            }
        });
    }
    let e = events.clone();
    server.on_stop(move || e.lock().unwrap().push("stop".to_string()));

    let token = CancellationToken::new();
    let task = common::spawn_server(server.clone(), token.clone());
    common::wait_for_serving(&server).await;

    token.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(
        *events.lock().unwrap(),
        vec!["shutdown queue", "shutdown cache", "shutdown db", "stop"]
    );
    assert_eq!(server.run_state(), RunState::Stopped);
}

#[tokio::test]
async fn test_in_flight_request_drains() {
    let server = Arc::new(Server::new(common::test_config()));
    server.route(Method::GET, "/slow", || async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        "done"
    });

    let token = CancellationToken::new();
    let task = common::spawn_server(server.clone(), token.clone());
    let addr = common::wait_for_serving(&server).await;

    let request = tokio::spawn(async move {
        common::client()
            .get(format!("http://{addr}/slow"))
            .send()
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;
    token.cancel();

    let res = request.await.unwrap().unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.text().await.unwrap(), "done");
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_drain_deadline_bounds_shutdown() {
    let mut config = common::test_config();
    config.lifecycle.shutdown_timeout_secs = 1;
    config.timeouts.request_secs = 60;
    let server = Arc::new(Server::new(config));
    server.route(Method::GET, "/stuck", || async {
        tokio::time::sleep(Duration::from_secs(30)).await;
        "late"
    });
    let stopped = Arc::new(AtomicUsize::new(0));
    let s = stopped.clone();
    server.on_stop(move || {
        s.fetch_add(1, Ordering::SeqCst);
    });

    let token = CancellationToken::new();
    let task = common::spawn_server(server.clone(), token.clone());
    let addr = common::wait_for_serving(&server).await;

    let _request = tokio::spawn(async move {
        common::client()
            .get(format!("http://{addr}/stuck"))
            .send()
            .await
    });
    tokio::time::sleep(Duration::from_millis(100)).await;

    let began = Instant::now();
    token.cancel();
    task.await.unwrap().unwrap();

    assert!(began.elapsed() < Duration::from_secs(3), "{:?}", began.elapsed());
    assert_eq!(stopped.load(Ordering::SeqCst), 1);
    assert_eq!(server.run_state(), RunState::Stopped);
}

#[tokio::test]
async fn test_server_runs_once() {
    let server = Arc::new(Server::new(common::test_config()));
    let token = CancellationToken::new();
    let task = common::spawn_server(server.clone(), token.clone());
    common::wait_for_serving(&server).await;

    let err = server.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::AlreadyStarted));

    token.cancel();
    task.await.unwrap().unwrap();

    let err = server.run(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, LifecycleError::AlreadyStarted));
}

#[tokio::test]
async fn test_state_only_moves_forward() {
    let server = Arc::new(Server::new(common::test_config()));
    let mut state = server.state();
    assert_eq!(*state.borrow_and_update(), RunState::Configuring);

    let token = CancellationToken::new();
    let task = common::spawn_server(server.clone(), token.clone());

    let mut seen = vec![RunState::Configuring];
    let watcher = tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            seen.push(current);
            if current == RunState::Stopped {
                break;
            }
        }
        seen
    });

    common::wait_for_serving(&server).await;
    token.cancel();
    task.await.unwrap().unwrap();

    let seen = watcher.await.unwrap();
    assert!(seen.windows(2).all(|w| w[0] < w[1]), "{seen:?}");
    assert_eq!(seen.last(), Some(&RunState::Stopped));
}

#[tokio::test]
async fn test_admin_reload_endpoint() {
    let mut config = common::test_config();
    config.admin.reload_endpoint = true;
    config.admin.api_key = "secret".into();
    let server = Arc::new(Server::new(config));

    let reloads = Arc::new(AtomicUsize::new(0));
    let r = reloads.clone();
    server.on_reload(move |_ctx| {
        r.fetch_add(1, Ordering::SeqCst);
        async { Ok(()) }
    });

    let token = CancellationToken::new();
    let task = common::spawn_server(server.clone(), token.clone());
    let addr = common::wait_for_serving(&server).await;
    let client = common::client();

    let res = client.post(format!("http://{addr}/reload")).send().await.unwrap();
    assert_eq!(res.status(), 401);
    assert_eq!(reloads.load(Ordering::SeqCst), 0);

    let res = client
        .post(format!("http://{addr}/reload"))
        .header("authorization", "Bearer secret")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 200);
    let body: serde_json::Value = res.json().await.unwrap();
    assert_eq!(body["status"], "reloaded");
    assert_eq!(reloads.load(Ordering::SeqCst), 1);

    token.cancel();
    task.await.unwrap().unwrap();
}

#[tokio::test]
async fn test_route_hooks_include_builtin_endpoints() {
    let server = Arc::new(Server::new(common::test_config()));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = seen.clone();
    server.on_route(move |route| s.lock().unwrap().push(route.to_string()));
    server.route(Method::POST, "/orders", || async { "created" });

    let token = CancellationToken::new();
    let task = common::spawn_server(server.clone(), token.clone());
    common::wait_for_serving(&server).await;
    assert!(server.frozen());

    token.cancel();
    task.await.unwrap().unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec!["POST /orders", "GET /healthz", "GET /readyz"]
    );
}

#[tokio::test]
async fn test_ready_hook_outlives_shutdown() {
    let server = Arc::new(Server::new(common::test_config()));
    let completed = Arc::new(AtomicUsize::new(0));
    let c = completed.clone();
    server.on_ready(move || {
        let c = c.clone();
        async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            c.fetch_add(1, Ordering::SeqCst);
        }
    });

    let token = CancellationToken::new();
    let task = common::spawn_server(server.clone(), token.clone());
    common::wait_for_serving(&server).await;

    token.cancel();
    task.await.unwrap().unwrap();
    assert_eq!(server.run_state(), RunState::Stopped);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(completed.load(Ordering::SeqCst), 1, "ready hook was cut short by shutdown");
}
