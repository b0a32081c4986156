//! Small HTTP server used by integration tests.
//!
//! It mimics the tweet/user API the demo plans target, plus a few endpoints with fixed
//! status codes and delays.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_HELLO: &str = "/hello";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_STATUS: &str = "/status/{code}";
pub const PATH_DELAY: &str = "/delay/{ms}";
pub const PATH_TWEETS: &str = "/v1/tweets";
pub const PATH_USERS: &str = "/v1/users";

/// Latency of [`PATH_SLOW`].
pub const SLOW_DELAY: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    tweets_created: Arc<AtomicU64>,
    users_created: Arc<AtomicU64>,
    duplicate_users: Arc<AtomicU64>,
    unauthorized: Arc<AtomicU64>,
}

impl TestServerStats {
    fn hit(&self) {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn tweets_created(&self) -> u64 {
        self.tweets_created.load(Ordering::Relaxed)
    }

    pub fn users_created(&self) -> u64 {
        self.users_created.load(Ordering::Relaxed)
    }

    pub fn duplicate_users(&self) -> u64 {
        self.duplicate_users.load(Ordering::Relaxed)
    }

    pub fn unauthorized(&self) -> u64 {
        self.unauthorized.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone)]
pub struct TestServerUrls {
    pub base_url: String,
    pub hello: String,
    pub slow: String,
    pub tweets: String,
    pub users: String,
}

impl TestServerUrls {
    pub fn new(base_url: String) -> Self {
        Self {
            hello: format!("{base_url}{PATH_HELLO}"),
            slow: format!("{base_url}{PATH_SLOW}"),
            tweets: format!("{base_url}{PATH_TWEETS}"),
            users: format!("{base_url}{PATH_USERS}"),
            base_url,
        }
    }

    pub fn status(&self, code: u16) -> String {
        format!("{}/status/{code}", self.base_url)
    }

    pub fn delay(&self, ms: u64) -> String {
        format!("{}/delay/{ms}", self.base_url)
    }
}

#[derive(Debug, Clone, Default)]
struct AppState {
    stats: TestServerStats,
    usernames: Arc<Mutex<HashSet<String>>>,
}

#[derive(Debug, Serialize)]
struct IdResponse {
    id: String,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error_message: String,
    error_code: String,
}

fn error(status: StatusCode, code: &str, msg: &str) -> (StatusCode, Json<serde_json::Value>) {
    let body = ErrorResponse {
        error_message: msg.to_string(),
        error_code: code.to_string(),
    };
    (
        status,
        Json(serde_json::to_value(body).unwrap_or(serde_json::Value::Null)),
    )
}

async fn handle_hello(State(state): State<AppState>) -> &'static str {
    state.stats.hit();
    "Hello World!"
}

async fn handle_slow(State(state): State<AppState>) -> &'static str {
    state.stats.hit();
    sleep(SLOW_DELAY).await;
    "slow"
}

async fn handle_status(State(state): State<AppState>, Path(code): Path<u16>) -> StatusCode {
    state.stats.hit();
    StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST)
}

async fn handle_delay(State(state): State<AppState>, Path(ms): Path<u64>) -> &'static str {
    state.stats.hit();
    sleep(Duration::from_millis(ms)).await;
    "delayed"
}

#[derive(Debug, Deserialize)]
struct CreateTweet {
    content: String,
}

async fn handle_create_tweet(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<CreateTweet>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    state.stats.hit();

    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| !v.trim().is_empty());
    if !authorized {
        state.stats.unauthorized.fetch_add(1, Ordering::Relaxed);
        return error(StatusCode::UNAUTHORIZED, "unauthorized", "missing token");
    }

    let Ok(Json(tweet)) = body else {
        return error(StatusCode::BAD_REQUEST, "bad_request", "invalid json");
    };
    if tweet.content.is_empty() {
        return error(StatusCode::BAD_REQUEST, "bad_request", "empty content");
    }

    let id = state.stats.tweets_created.fetch_add(1, Ordering::Relaxed) + 1;
    let body = IdResponse { id: id.to_string() };
    (
        StatusCode::OK,
        Json(serde_json::to_value(body).unwrap_or(serde_json::Value::Null)),
    )
}

#[derive(Debug, Deserialize)]
struct ListTweets {
    page: Option<u64>,
    limit: Option<u64>,
}

#[derive(Debug, Serialize)]
struct Tweet {
    id: String,
    content: String,
}

async fn handle_list_tweets(
    State(state): State<AppState>,
    Query(q): Query<ListTweets>,
) -> Json<Vec<Tweet>> {
    state.stats.hit();

    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(10).min(100);
    let first = (page - 1).saturating_mul(limit);
    let tweets = (first..first.saturating_add(limit))
        .map(|n| Tweet {
            id: n.to_string(),
            content: format!("tweet #{n}"),
        })
        .collect();
    Json(tweets)
}

#[derive(Debug, Deserialize)]
struct CreateUser {
    username: String,
    email: String,
    password: String,
}

async fn handle_create_user(
    State(state): State<AppState>,
    body: Result<Json<CreateUser>, JsonRejection>,
) -> (StatusCode, Json<serde_json::Value>) {
    state.stats.hit();

    let Ok(Json(user)) = body else {
        return error(StatusCode::BAD_REQUEST, "bad_request", "invalid json");
    };
    if user.username.is_empty() || !user.email.contains('@') || user.password.len() < 8 {
        return error(StatusCode::BAD_REQUEST, "bad_request", "invalid user");
    }

    if !state.usernames.lock().insert(user.username) {
        state.stats.duplicate_users.fetch_add(1, Ordering::Relaxed);
        return error(StatusCode::CONFLICT, "conflict", "username taken");
    }

    let id = state.stats.users_created.fetch_add(1, Ordering::Relaxed) + 1;
    let body = IdResponse { id: id.to_string() };
    (
        StatusCode::OK,
        Json(serde_json::to_value(body).unwrap_or(serde_json::Value::Null)),
    )
}

pub fn router(stats: TestServerStats) -> Router {
    let state = AppState {
        stats,
        usernames: Arc::default(),
    };

    Router::new()
        .route(PATH_HELLO, get(handle_hello))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_STATUS, get(handle_status))
        .route(PATH_DELAY, get(handle_delay))
        .route(
            PATH_TWEETS,
            get(handle_list_tweets).post(handle_create_tweet),
        )
        .route(PATH_USERS, axum::routing::post(handle_create_user))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    urls: TestServerUrls,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            urls: TestServerUrls::new(format!("http://{addr}")),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.urls.base_url
    }

    pub fn urls(&self) -> &TestServerUrls {
        &self.urls
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
