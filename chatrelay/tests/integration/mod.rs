// Shared helpers for the integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Once};
use std::time::Duration;

use chatrelay::api::{create_router, AppState};
use chatrelay::citations::MemorySlotStorage;
use chatrelay::config::{
    CitationCacheConfig, Config, DatabaseConfig, RelayConfig, ServerConfig, UpstreamConfig,
};
use chatrelay::db::{Database, LibSqlBackend};
use chatrelay::upstream::HttpChatUpstream;
use serde_json::Value;
use tempfile::TempDir;
use wiremock::MockServer;

pub const API_KEY: &str = "test-api-key";

static INIT: Once = Once::new();

/// Initialize tracing subscriber once for tests
pub fn init_test_logger() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

pub async fn temp_backend() -> (Arc<LibSqlBackend>, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let url = format!("file:{}", dir.path().join("chatrelay_test.db").display());
    let db = Database::new(&DatabaseConfig::local(url))
        .await
        .expect("Failed to create database");
    (Arc::new(LibSqlBackend::new(db)), dir)
}

/// A running server wired to a wiremock upstream.
pub struct TestApp {
    pub addr: SocketAddr,
    pub upstream: MockServer,
    pub client: reqwest::Client,
    pub slots: Arc<MemorySlotStorage>,
    _dir: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        init_test_logger();
        let upstream = MockServer::start().await;
        let dir = TempDir::new().expect("Failed to create temp dir");

        let config = Config {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                api_keys: vec![API_KEY.to_string()],
            },
            database: DatabaseConfig::local(format!(
                "file:{}",
                dir.path().join("chatrelay_app.db").display()
            )),
            upstream: UpstreamConfig {
                base_url: format!("{}/v1", upstream.uri()),
                api_key: Some("app-default".to_string()),
                knowledge_bases: [("hr".to_string(), "app-hr".to_string())]
                    .into_iter()
                    .collect(),
                timeout_secs: 10,
                connect_timeout_secs: 2,
            },
            relay: RelayConfig::default(),
            citation_cache: CitationCacheConfig::default(),
        };

        let db = Database::new(&config.database)
            .await
            .expect("Failed to create database");
        let backend = Arc::new(LibSqlBackend::new(db));
        let chat_upstream = Arc::new(
            HttpChatUpstream::new(config.upstream.clone()).expect("Failed to create upstream"),
        );
        let slots = Arc::new(MemorySlotStorage::new(64));
        let state = AppState::new(config, backend, chat_upstream, slots.clone());
        let app = create_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Server failed");
        });

        Self {
            addr,
            upstream,
            client: reqwest::Client::new(),
            slots,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}/api/v1{}", self.addr, path)
    }

    pub fn request(&self, method: reqwest::Method, path: &str, user: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.url(path))
            .bearer_auth(API_KEY)
            .header("x-user-id", user)
    }

    /// Sends one chat turn and reads the whole SSE body.
    pub async fn chat(&self, user: &str, body: Value) -> ChatReply {
        let response = self
            .request(reqwest::Method::POST, "/chat", user)
            .json(&body)
            .send()
            .await
            .expect("chat request failed");

        let status = response.status();
        let conversation_id = response
            .headers()
            .get("x-conversation-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = response.text().await.expect("failed to read chat body");

        ChatReply {
            status,
            conversation_id,
            frames: sse_data(&text),
            raw: text,
        }
    }

    pub async fn citations(&self, user: &str, conversation_id: &str) -> Value {
        self.request(
            reqwest::Method::GET,
            &format!("/conversations/{conversation_id}/citations"),
            user,
        )
        .send()
        .await
        .expect("citations request failed")
        .json()
        .await
        .expect("citations body is not JSON")
    }

    /// Citations are cached after the stream closes, so poll briefly.
    pub async fn wait_for_citations(&self, user: &str, conversation_id: &str) -> Value {
        for _ in 0..50 {
            let body = self.citations(user, conversation_id).await;
            if body["data"]["citations"]
                .as_object()
                .is_some_and(|map| !map.is_empty())
            {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("citations for {conversation_id} never appeared");
    }
}

pub struct ChatReply {
    pub status: reqwest::StatusCode,
    pub conversation_id: Option<String>,
    /// `data:` payloads in order.
    pub frames: Vec<String>,
    pub raw: String,
}

impl ChatReply {
    /// JSON frames, skipping the `[DONE]` marker.
    pub fn json_frames(&self) -> Vec<Value> {
        self.frames
            .iter()
            .filter(|f| f.as_str() != "[DONE]")
            .map(|f| serde_json::from_str(f).expect("frame is not JSON"))
            .collect()
    }

    /// Answer text of `message` and `agent_message` frames, in order.
    pub fn answers(&self) -> Vec<String> {
        self.json_frames()
            .into_iter()
            .filter(|f| f["event"] == "message" || f["event"] == "agent_message")
            .filter_map(|f| f["answer"].as_str().map(str::to_string))
            .collect()
    }
}

/// `data:` payloads of an SSE body.
pub fn sse_data(body: &str) -> Vec<String> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .map(|data| data.strip_prefix(' ').unwrap_or(data).to_string())
        .collect()
}

/// Builds an upstream SSE body from JSON payloads.
pub fn upstream_sse(events: &[Value]) -> String {
    events
        .iter()
        .map(|event| format!("data: {event}\n\n"))
        .collect()
}
