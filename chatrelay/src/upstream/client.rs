use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    Client,
};
use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::config::UpstreamConfig;
use crate::error::{RelayError, Result};

const ERROR_BODY_LIMIT: usize = 512;

/// Raw upstream SSE body.
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// One chat turn to send upstream.
#[derive(Debug, Clone, Default)]
pub struct UpstreamRequest {
    pub query: String,
    /// End-user identity forwarded to the upstream for its own bookkeeping.
    pub user: String,
    pub knowledge_base_id: Option<String>,
    pub model_id: Option<String>,
    /// Upstream session to continue, if the conversation already has one.
    pub conversation_id: Option<String>,
}

#[async_trait]
pub trait ChatUpstream: Send + Sync {
    /// Starts a streaming turn and returns its body once the upstream has
    /// accepted the request.
    async fn open_stream(&self, request: UpstreamRequest) -> Result<ByteStream>;

    /// Whether an app key is configured for the given knowledge base.
    fn is_configured(&self, knowledge_base_id: Option<&str>) -> bool;
}

#[derive(Debug, Serialize)]
struct ChatMessageBody<'a> {
    inputs: ChatInputs<'a>,
    query: &'a str,
    response_mode: &'static str,
    user: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    conversation_id: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct ChatInputs<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model_name: Option<&'a str>,
}

#[derive(Clone)]
pub struct HttpChatUpstream {
    client: Client,
    endpoint: Url,
    config: UpstreamConfig,
}

impl HttpChatUpstream {
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| RelayError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        let endpoint = Url::parse(&format!(
            "{}/chat-messages",
            config.base_url.trim_end_matches('/')
        ))?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    fn headers(&self, knowledge_base_id: Option<&str>) -> Result<HeaderMap> {
        let api_key = self.config.api_key_for(knowledge_base_id).ok_or_else(|| {
            RelayError::Configuration(match knowledge_base_id {
                Some(id) => format!("No upstream app key configured for knowledge base '{id}'"),
                None => "No default upstream app key configured".to_string(),
            })
        })?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| RelayError::Configuration(format!("Invalid upstream app key: {e}")))?,
        );
        Ok(headers)
    }
}

#[async_trait]
impl ChatUpstream for HttpChatUpstream {
    async fn open_stream(&self, request: UpstreamRequest) -> Result<ByteStream> {
        let headers = self.headers(request.knowledge_base_id.as_deref())?;
        let body = ChatMessageBody {
            inputs: ChatInputs {
                model_name: request.model_id.as_deref().filter(|m| !m.is_empty()),
            },
            query: &request.query,
            response_mode: "streaming",
            user: &request.user,
            conversation_id: request.conversation_id.as_deref().filter(|c| !c.is_empty()),
        };

        tracing::debug!(
            url = %self.endpoint,
            knowledge_base = request.knowledge_base_id.as_deref().unwrap_or("default"),
            continuing = body.conversation_id.is_some(),
            "Opening upstream chat stream"
        );

        let response = self
            .client
            .post(self.endpoint.clone())
            .headers(headers)
            .json(&body)
            .send()
            .await
            .map_err(|e| RelayError::Upstream(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RelayError::Upstream(format!(
                "API error {status}: {}",
                truncate(&body, ERROR_BODY_LIMIT)
            )));
        }

        Ok(response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| RelayError::Upstream(format!("Stream read failed: {e}"))))
            .boxed())
    }

    fn is_configured(&self, knowledge_base_id: Option<&str>) -> bool {
        self.config.api_key_for(knowledge_base_id).is_some()
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}...", &text[..end]),
        None => text.to_string(),
    }
}
