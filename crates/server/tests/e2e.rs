use std::net::SocketAddr;
use std::sync::Arc;

use configs::AppConfig;
use reqwest::StatusCode as HttpStatusCode;
use serde_json::{json, Value};
use service::auth::provider::mock::MockIdentityProvider;
use tokio::net::TcpListener;
use uuid::Uuid;

use server::startup;

struct TestApp {
    base_url: String,
    provider: Arc<MockIdentityProvider>,
}

async fn start_server() -> anyhow::Result<TestApp> {
    // isolated SPA build per test run
    let frontend = std::env::temp_dir().join(format!("start-auth-e2e-{}", Uuid::new_v4()));
    tokio::fs::create_dir_all(&frontend).await?;
    tokio::fs::write(frontend.join("index.html"), "<!doctype html><div id=\"app\"></div>").await?;

    let mut cfg = AppConfig::default();
    cfg.server.frontend_dir = frontend.to_string_lossy().into_owned();

    let provider = Arc::new(MockIdentityProvider::new().with_account("e2e@example.com", "S3curePass!"));
    let state = startup::state_with_provider(provider.clone(), &cfg);
    let app = startup::build_app(state, &cfg);

    let listener = TcpListener::bind((std::net::Ipv4Addr::LOCALHOST, 0)).await?;
    let addr: SocketAddr = listener.local_addr()?;
    let base_url = format!("http://{}:{}", addr.ip(), addr.port());

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await { eprintln!("server error: {}", e); }
    });

    Ok(TestApp { base_url, provider })
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .cookie_store(true)
        .build()
        .expect("reqwest client")
}

#[tokio::test]
async fn e2e_public_health() -> anyhow::Result<()> {
    let app = start_server().await?;
    let res = client().get(format!("{}/health", app.base_url)).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn e2e_session_lifecycle_with_cookie_jar() -> anyhow::Result<()> {
    let app = start_server().await?;
    let http = client();
    let url = |p: &str| format!("{}/api/v1/auth{}", app.base_url, p);

    let me: Value = http.get(url("/user")).send().await?.json().await?;
    assert_eq!(me, json!({"user": null, "authenticated": false}));

    let res = http
        .post(url("/login"))
        .json(&json!({"email": "e2e@example.com", "password": "S3curePass!"}))
        .send()
        .await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let body: Value = res.json().await?;
    assert_eq!(body["authenticated"], true);
    assert!(body.get("access_token").is_none());

    let me: Value = http.get(url("/user")).send().await?.json().await?;
    assert_eq!(me["user"]["email"], "e2e@example.com");

    // access token expires; the session refresh token recovers it
    app.provider.expire_access_tokens();
    let me: Value = http.get(url("/user")).send().await?.json().await?;
    assert_eq!(me["authenticated"], true);
    assert!(me.get("access_token").is_none());
    assert_eq!(app.provider.calls("refresh"), 1);

    let res = http.post(url("/logout")).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    let me: Value = http.get(url("/user")).send().await?.json().await?;
    assert_eq!(me["authenticated"], false);
    Ok(())
}

#[tokio::test]
async fn e2e_sessions_do_not_leak_between_clients() -> anyhow::Result<()> {
    let app = start_server().await?;
    let alice = client();
    let bob = client();
    let url = |p: &str| format!("{}/api/v1/auth{}", app.base_url, p);

    alice
        .post(url("/login"))
        .json(&json!({"email": "e2e@example.com", "password": "S3curePass!"}))
        .send()
        .await?;
    let me: Value = bob.get(url("/user")).send().await?.json().await?;
    assert_eq!(me["authenticated"], false);
    let me: Value = alice.get(url("/user")).send().await?.json().await?;
    assert_eq!(me["authenticated"], true);
    Ok(())
}

#[tokio::test]
async fn e2e_spa_fallback_serves_index() -> anyhow::Result<()> {
    let app = start_server().await?;
    let res = client().get(format!("{}/onboarding/step-2", app.base_url)).send().await?;
    assert_eq!(res.status(), HttpStatusCode::OK);
    assert!(res.text().await?.contains("id=\"app\""));
    Ok(())
}
