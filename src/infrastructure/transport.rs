//! HTTP 传输 - 基础设施层
//!
//! 持有唯一的 HTTP 客户端，只暴露"发送聊天请求"的能力。
//! 状态码的归类交给上层网关处理，这里只把网络层失败映射为 `LlmError`。

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use tracing::debug;

use crate::error::LlmError;
use crate::models::ChatMessage;

/// 上游原始字节流
pub type ByteStream = BoxStream<'static, Result<Vec<u8>, LlmError>>;

/// 聊天补全请求体
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
}

/// 普通请求的原始响应
#[derive(Debug, Clone)]
pub struct RawReply {
    pub status: u16,
    pub body: String,
}

/// 流式请求的原始响应
pub struct StreamReply {
    pub status: u16,
    pub chunks: ByteStream,
}

impl StreamReply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// 读完剩余字节（用于非 2xx 响应的错误信息）
    pub async fn into_text(mut self) -> String {
        let mut body = Vec::new();
        while let Some(Ok(chunk)) = self.chunks.next().await {
            body.extend_from_slice(&chunk);
        }
        String::from_utf8_lossy(&body).into_owned()
    }
}

/// 聊天请求的传输接口
///
/// 测试中用脚本化的假实现替换真实网络。
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// 发送普通请求并读完整个响应体
    async fn post(&self, request: &ChatRequest, timeout: Duration) -> Result<RawReply, LlmError>;

    /// 发送流式请求，返回状态码和逐块到达的字节流
    async fn post_stream(
        &self,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<StreamReply, LlmError>;
}

/// 基于 reqwest 的 HTTP 传输
pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
}

impl HttpTransport {
    pub fn new(api_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| LlmError::InvalidRequest(format!("无法创建HTTP客户端: {}", e)))?;
        Ok(Self {
            client,
            api_url: api_url.into(),
            api_key: api_key.into(),
        })
    }

    async fn send(
        &self,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<reqwest::Response, LlmError> {
        debug!(
            "POST {} (模型: {}, 消息数: {}, 流式: {})",
            self.api_url,
            request.model,
            request.messages.len(),
            request.stream.unwrap_or(false)
        );
        self.client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .timeout(timeout)
            .json(request)
            .send()
            .await
            .map_err(map_reqwest_error)
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn post(&self, request: &ChatRequest, timeout: Duration) -> Result<RawReply, LlmError> {
        let response = self.send(request, timeout).await?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_reqwest_error)?;
        Ok(RawReply { status, body })
    }

    async fn post_stream(
        &self,
        request: &ChatRequest,
        timeout: Duration,
    ) -> Result<StreamReply, LlmError> {
        let response = self.send(request, timeout).await?;
        let status = response.status().as_u16();
        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()).map_err(map_reqwest_error))
            .boxed();
        Ok(StreamReply { status, chunks })
    }
}

/// 把网络层失败归类为上游错误
fn map_reqwest_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Timeout
    } else if e.is_connect() {
        LlmError::UpstreamUnavailable { status: None }
    } else {
        LlmError::Unclassified {
            status: e.status().map(|s| s.as_u16()),
            detail: e.to_string(),
        }
    }
}
