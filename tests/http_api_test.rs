//! The HTTP surface: wire contract, caching headers, long polling, and
//! basic auth, exercised against a real listener.

mod common;

use common::TestProvider;
use std::sync::Arc;
use std::time::{Duration, Instant};
use warden::server::auth::AuthConfig;
use warden::{Client, ClientConfig, Error, Manager};

async fn spawn_server(mgr: Manager, auth: Option<AuthConfig>) -> String {
    let app = warden::server::router(mgr);
    let app = match auth {
        Some(cfg) => app.layer(axum::middleware::from_fn_with_state(
            Arc::new(cfg),
            warden::server::auth::require_auth,
        )),
        None => app,
    };
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn client_for(addr: &str) -> Client {
    Client::connect(ClientConfig {
        addr: addr.to_string(),
        ..Default::default()
    })
    .unwrap()
}

#[tokio::test]
async fn manager_and_service_round_trip() {
    let mgr = Manager::new("apitest");
    let svc = mgr
        .add_service(TestProvider::new("web").depends(&["db"]).into_service())
        .await;
    mgr.add_service(TestProvider::new("db").into_service())
        .await;

    let addr = spawn_server(mgr.clone(), None).await;
    let client = client_for(&addr);

    let info = client.manager_info().await.unwrap();
    assert_eq!(info.name, "apitest");
    assert!(!info.serial.is_empty());

    let (names, etag) = client.services().await.unwrap();
    assert_eq!(names, vec!["web", "db"]);
    assert!(etag.starts_with('"') && etag.ends_with('"'));

    let (web, _) = client.service("web").await.unwrap();
    assert_eq!(web.name, "web");
    assert_eq!(web.depends, vec!["db"]);
    assert!(!web.enabled);

    client.enable("db").await.unwrap();
    client.enable("web").await.unwrap();
    let (web, _) = client.service("web").await.unwrap();
    assert!(web.enabled && web.running);
    assert!(svc.running().await);

    client.disable("web").await.unwrap();
    let (web, _) = client.service("web").await.unwrap();
    assert!(!web.running);
}

#[tokio::test]
async fn unknown_service_is_a_json_404() {
    let mgr = Manager::new("apitest");
    let addr = spawn_server(mgr, None).await;
    let client = client_for(&addr);

    match client.service("ghost").await {
        Err(Error::Server { code: 404, message }) => {
            assert!(message.contains("not found"), "message was {message:?}");
        }
        other => panic!("expected 404, got {other:?}"),
    }
    match client.enable("ghost").await {
        Err(Error::Server { code: 404, .. }) => {}
        other => panic!("expected 404, got {other:?}"),
    }
}

#[tokio::test]
async fn refused_operations_are_400() {
    let mgr = Manager::new("apitest");
    mgr.add_service(TestProvider::new("a").conflicts(&["b"]).into_service())
        .await;
    mgr.add_service(TestProvider::new("b").into_service())
        .await;

    let addr = spawn_server(mgr, None).await;
    let client = client_for(&addr);

    client.enable("a").await.unwrap();
    match client.enable("b").await {
        Err(Error::Server { code: 400, message }) => {
            assert!(message.contains("Conflict"), "message was {message:?}");
        }
        other => panic!("expected 400, got {other:?}"),
    }
}

#[tokio::test]
async fn conditional_get_returns_304() {
    let mgr = Manager::new("apitest");
    mgr.add_service(TestProvider::new("svc").into_service())
        .await;
    let addr = spawn_server(mgr, None).await;

    let http = reqwest::Client::new();
    let first = http
        .get(format!("{}/services/svc", addr))
        .send()
        .await
        .unwrap();
    assert!(first.status().is_success());
    let etag = first
        .headers()
        .get(reqwest::header::ETAG)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(first.headers().contains_key(reqwest::header::LAST_MODIFIED));

    let second = http
        .get(format!("{}/services/svc", addr))
        .header(reqwest::header::IF_NONE_MATCH, &etag)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), reqwest::StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn long_poll_returns_when_the_list_changes() {
    let mgr = Manager::new("apitest");
    mgr.add_service(TestProvider::new("first").into_service())
        .await;
    let addr = spawn_server(mgr.clone(), None).await;
    let client = client_for(&addr);

    let (_, etag) = client.services().await.unwrap();

    // A change lands while the poll is parked; it returns promptly with
    // the new list rather than waiting out the timeout.
    let poller = {
        let client = client_for(&addr);
        let etag = etag.clone();
        tokio::spawn(async move {
            let started = Instant::now();
            let result = client.poll_services(&etag, 5).await.unwrap();
            (result, started.elapsed())
        })
    };
    tokio::time::sleep(Duration::from_millis(300)).await;
    mgr.add_service(TestProvider::new("second").into_service())
        .await;

    let (result, elapsed) = poller.await.unwrap();
    let (names, new_etag) = result.expect("list changed, poll must return data");
    assert_eq!(names, vec!["first", "second"]);
    assert_ne!(new_etag, etag);
    assert!(elapsed < Duration::from_secs(4), "returned in {elapsed:?}");
}

#[tokio::test]
async fn long_poll_expires_with_304_when_unchanged() {
    let mgr = Manager::new("apitest");
    mgr.add_service(TestProvider::new("only").into_service())
        .await;
    let addr = spawn_server(mgr, None).await;
    let client = client_for(&addr);

    let (_, etag) = client.services().await.unwrap();
    let started = Instant::now();
    let result = client.poll_services(&etag, 1).await.unwrap();
    assert!(result.is_none(), "unchanged list long-polls to 304");
    assert!(started.elapsed() >= Duration::from_millis(900));
}

#[tokio::test]
async fn service_long_poll_sees_state_changes() {
    let mgr = Manager::new("apitest");
    mgr.add_service(TestProvider::new("svc").into_service())
        .await;
    let addr = spawn_server(mgr, None).await;
    let client = client_for(&addr);

    let (_, etag) = client.service("svc").await.unwrap();
    let poller = {
        let client = client_for(&addr);
        let etag = etag.clone();
        tokio::spawn(async move { client.poll_service("svc", &etag, 5).await.unwrap() })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.enable("svc").await.unwrap();

    let result = poller.await.unwrap();
    let (info, _) = result.expect("state changed");
    assert!(info.enabled);
}

#[tokio::test]
async fn logs_are_served_globally_and_per_service() {
    let mgr = Manager::new("apitest");
    mgr.add_service(TestProvider::new("svc").into_service())
        .await;
    let addr = spawn_server(mgr, None).await;
    let client = client_for(&addr);

    client.enable("svc").await.unwrap();

    let global = client.global_log().await.unwrap();
    assert!(global.iter().any(|r| r.text.contains("Added service svc")));
    assert!(global.iter().any(|r| r.text.contains("[svc]")));

    let own = client.service_log("svc").await.unwrap();
    assert!(own.iter().any(|r| r.text.contains("Enabling service svc")));
    // Per-service records are untagged; the prefix belongs to the
    // consolidated view.
    assert!(own.iter().all(|r| !r.text.starts_with("[svc]")));

    let mut ids: Vec<i64> = own.iter().map(|r| r.id).collect();
    let sorted = {
        let mut s = ids.clone();
        s.sort_unstable();
        s
    };
    assert_eq!(ids, sorted, "records arrive in id order");
    ids.dedup();
    assert_eq!(ids.len(), own.len(), "ids are unique");
}

#[tokio::test]
async fn basic_auth_guards_every_route() {
    let mgr = Manager::new("authtest");
    mgr.add_service(TestProvider::new("svc").into_service())
        .await;
    let mut auth = AuthConfig::new("authtest");
    auth.add_password("alice", "secret").unwrap();
    let addr = spawn_server(mgr, Some(auth)).await;

    // No credentials: 401 with a challenge naming the realm.
    let http = reqwest::Client::new();
    let resp = http.get(format!("{}/services", addr)).send().await.unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    let challenge = resp
        .headers()
        .get(reqwest::header::WWW_AUTHENTICATE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(challenge.contains("Basic realm=\"authtest\""));

    // Wrong password: still 401.
    let bad = Client::connect(ClientConfig {
        addr: addr.clone(),
        user: Some("alice".into()),
        pass: Some("wrong".into()),
        ..Default::default()
    })
    .unwrap();
    match bad.services().await {
        Err(Error::Server { code: 401, .. }) => {}
        other => panic!("expected 401, got {other:?}"),
    }

    // Valid credentials work across GET and POST.
    let good = Client::connect(ClientConfig {
        addr,
        user: Some("alice".into()),
        pass: Some("secret".into()),
        ..Default::default()
    })
    .unwrap();
    let (names, _) = good.services().await.unwrap();
    assert_eq!(names, vec!["svc"]);
    good.enable("svc").await.unwrap();
}
