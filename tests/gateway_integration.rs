//! Integration tests for the callback endpoint.
//!
//! Each test spins up the Axum app on a random port and drives it over real
//! HTTP with reqwest, signing requests the way the platform does.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::net::TcpListener;
use tokio::time::timeout;

use wxgate::auth;
use wxgate::config::AuthMode;
use wxgate::dispatch::{DispatchConfig, Dispatcher};
use wxgate::envelope::{self, Message};
use wxgate::error::WorkerError;
use wxgate::phrases::DEFAULT_PHRASES;
use wxgate::server::{AppState, router};
use wxgate::workers::{WorkerDescriptor, WorkerHandle, WorkerLauncher, WorkerPool};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

const TOKEN: &str = "integration-token";
const GREETING: &str = "thanks for following";

/// Launcher that pretends every worker starts and stays up.
#[derive(Default)]
struct CountingLauncher {
    launches: AtomicUsize,
}

struct AlwaysUp;

impl WorkerHandle for AlwaysUp {
    fn is_alive(&mut self) -> bool {
        true
    }
}

#[async_trait]
impl WorkerLauncher for CountingLauncher {
    async fn launch(
        &self,
        _worker: &WorkerDescriptor,
    ) -> Result<Box<dyn WorkerHandle>, WorkerError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(AlwaysUp))
    }
}

struct TestServer {
    base: String,
    launcher: Arc<CountingLauncher>,
    client: reqwest::Client,
}

/// Start the app on a random port with the given `(port, password)` workers.
async fn start_server(mode: AuthMode, workers: &[(u16, &str)]) -> TestServer {
    let launcher = Arc::new(CountingLauncher::default());
    let pool = WorkerPool::new(Arc::clone(&launcher) as Arc<dyn WorkerLauncher>);
    for (port, password) in workers {
        pool.register(*port, *password).await;
    }

    let dispatcher = Dispatcher::new(
        DispatchConfig {
            greeting: GREETING.to_string(),
            credentials_key: "getPwd".to_string(),
        },
        Arc::new(pool),
    );
    let app = router(AppState {
        token: SecretString::from(TOKEN),
        auth_mode: mode,
        dispatcher: Arc::new(dispatcher),
    });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        launcher,
        client: reqwest::Client::new(),
    }
}

impl TestServer {
    fn signed_url(&self, extra: &str) -> String {
        let timestamp = "1700000000";
        let nonce = "314159";
        let signature = auth::signature(TOKEN, timestamp, nonce);
        format!(
            "{}/weixin?signature={signature}&timestamp={timestamp}&nonce={nonce}{extra}",
            self.base
        )
    }

    async fn post_envelope(&self, body: String) -> reqwest::Response {
        self.client
            .post(self.signed_url(""))
            .header("content-type", "text/xml")
            .body(body)
            .send()
            .await
            .unwrap()
    }
}

fn event_body(event: &str, key: Option<&str>) -> String {
    let key = key
        .map(|k| format!("<EventKey><![CDATA[{k}]]></EventKey>"))
        .unwrap_or_default();
    format!(
        "<xml><ToUserName><![CDATA[gh_account]]></ToUserName>\
         <FromUserName><![CDATA[o_follower]]></FromUserName>\
         <CreateTime>1700000000</CreateTime><MsgType><![CDATA[event]]></MsgType>\
         <Event><![CDATA[{event}]]></Event>{key}</xml>"
    )
}

fn reply_content(xml: &str) -> String {
    let reply = envelope::decode(xml).expect("reply should be a valid envelope");
    assert_eq!(reply.to_user, "o_follower");
    assert_eq!(reply.from_user, "gh_account");
    match reply.message {
        Message::Text { content } => content,
        other => panic!("expected text reply, got {other:?}"),
    }
}

// ── Challenge ───────────────────────────────────────────────────────────

#[tokio::test]
async fn challenge_echoes_echostr_verbatim() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(AuthMode::Strict, &[]).await;

        let resp = server
            .client
            .get(server.signed_url("&echostr=abc123"))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(resp.text().await.unwrap(), "abc123");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn forged_challenge_is_rejected_in_strict_mode() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(AuthMode::Strict, &[]).await;
        let url = format!(
            "{}/weixin?signature=deadbeef&timestamp=1&nonce=2&echostr=abc123",
            server.base
        );

        let resp = server.client.get(url).send().await.unwrap();

        assert_eq!(resp.status(), 401);
    })
    .await
    .expect("test timed out");
}

// ── Callbacks ───────────────────────────────────────────────────────────

#[tokio::test]
async fn subscribe_receives_greeting() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(AuthMode::Strict, &[]).await;

        let resp = server.post_envelope(event_body("subscribe", None)).await;

        assert_eq!(resp.status(), 200);
        assert_eq!(reply_content(&resp.text().await.unwrap()), GREETING);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unsubscribe_receives_empty_body() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(AuthMode::Strict, &[]).await;

        let resp = server.post_envelope(event_body("unsubscribe", None)).await;

        assert_eq!(resp.status(), 200);
        assert!(resp.text().await.unwrap().is_empty());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn credentials_click_starts_worker_once() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(AuthMode::Strict, &[(8388, "old"), (8389, "newest")]).await;

        let first = server.post_envelope(event_body("CLICK", Some("getPwd"))).await;
        assert_eq!(first.status(), 200);
        let content = reply_content(&first.text().await.unwrap());
        assert_eq!(content, "Id: 1\nPort: 8389\nPassword: newest");

        let second = server.post_envelope(event_body("CLICK", Some("getPwd"))).await;
        assert_eq!(second.status(), 200);
        assert_eq!(reply_content(&second.text().await.unwrap()), content);

        assert_eq!(server.launcher.launches.load(Ordering::SeqCst), 1);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn credentials_click_with_empty_pool_is_server_error() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(AuthMode::Strict, &[]).await;

        let resp = server.post_envelope(event_body("CLICK", Some("getPwd"))).await;

        assert_eq!(resp.status(), 500);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unknown_message_gets_default_phrase() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(AuthMode::Strict, &[]).await;
        let body = "<xml><ToUserName>gh_account</ToUserName>\
                    <FromUserName>o_follower</FromUserName>\
                    <CreateTime>1700000000</CreateTime><MsgType>image</MsgType>\
                    <PicUrl>http://example.com/a.png</PicUrl></xml>";

        for _ in 0..5 {
            let resp = server.post_envelope(body.to_string()).await;
            assert_eq!(resp.status(), 200);
            let content = reply_content(&resp.text().await.unwrap());
            assert!(DEFAULT_PHRASES.contains(&content.as_str()), "{content}");
        }
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn missing_from_user_is_rejected() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(AuthMode::Strict, &[]).await;
        let body = "<xml><ToUserName>gh_account</ToUserName>\
                    <MsgType>text</MsgType><Content>hi</Content></xml>";

        let resp = server.post_envelope(body.to_string()).await;

        assert_eq!(resp.status(), 400);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn unsigned_callback_is_processed_in_relaxed_mode() {
    timeout(TEST_TIMEOUT, async {
        let server = start_server(AuthMode::Relaxed, &[]).await;
        let url = format!("{}/weixin?signature=wrong&timestamp=1&nonce=2", server.base);

        let resp = server
            .client
            .post(url)
            .body(event_body("subscribe", None))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        assert_eq!(reply_content(&resp.text().await.unwrap()), GREETING);
    })
    .await
    .expect("test timed out");
}
