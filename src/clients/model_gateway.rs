//! 模型网关
//!
//! 封装所有与聊天补全接口相关的调用逻辑：普通调用（带重试与退避）、
//! 流式调用（不重试）、错误归类、历史长度保护和连接测试。
//! 网关本身不持有任何单次请求的可变状态，可以在并发的多次分析之间共享。

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::LlmError;
use crate::infrastructure::{ChatRequest, ChatTransport, HttpTransport, SseDecoder, SseEvent};
use crate::models::message::total_chars;
use crate::models::{ChatMessage, Usage};

/// 一次调用的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
}

/// 指数退避重试策略
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// 第 `attempt` 次失败后的等待时间：`min(base * 2^(attempt-1), max)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(5000),
        }
    }
}

/// 网关参数
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub model: String,
    pub temperature: f32,
    /// 输出 token 上限，调用方传入的值会被截到这里
    pub max_output_tokens: u32,
    /// 历史消息总字符数阈值
    pub max_history_chars: usize,
    pub request_timeout: Duration,
    pub stream_timeout: Duration,
    pub retry: RetryPolicy,
}

impl GatewaySettings {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            model: config.model()?,
            temperature: config.provider.temperature(),
            max_output_tokens: config.max_output_tokens,
            max_history_chars: config.max_history_chars,
            request_timeout: config.request_timeout(),
            stream_timeout: config.stream_timeout(),
            retry: RetryPolicy {
                max_attempts: config.max_attempts,
                base_delay: Duration::from_millis(config.retry_base_delay_ms),
                max_delay: Duration::from_millis(config.retry_max_delay_ms),
            },
        })
    }
}

/// 模型网关
pub struct ModelGateway {
    transport: Arc<dyn ChatTransport>,
    settings: GatewaySettings,
}

impl ModelGateway {
    pub fn new(transport: Arc<dyn ChatTransport>, settings: GatewaySettings) -> Self {
        Self {
            transport,
            settings,
        }
    }

    /// 根据配置创建使用真实 HTTP 传输的网关
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(config.api_url()?, config.api_key.clone())?;
        let settings = GatewaySettings::from_config(config)?;
        info!(
            "🤖 模型网关就绪: {:?} / {}",
            config.provider, settings.model
        );
        Ok(Self::new(Arc::new(transport), settings))
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    /// 普通调用
    ///
    /// 认证失败以外的错误最多尝试 `max_attempts` 次，两次尝试之间指数退避，
    /// 最后一次失败后不再等待，直接返回最后一个错误。
    pub async fn call(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        let request = self.build_request(messages, max_tokens, false)?;
        let policy = self.settings.retry;
        let max_attempts = policy.max_attempts.max(1);

        let mut attempt = 1;
        loop {
            debug!(
                "调用模型 (第 {}/{} 次)，消息数: {}，总字符: {}",
                attempt,
                max_attempts,
                request.messages.len(),
                total_chars(&request.messages)
            );
            match self.call_once(&request).await {
                Ok(completion) => {
                    debug!("模型调用成功，响应长度: {} 字符", completion.text.len());
                    return Ok(completion);
                }
                Err(e) if !e.is_retryable() || attempt >= max_attempts => {
                    error!("❌ 模型调用失败 (第 {} 次): {}", attempt, e);
                    return Err(e);
                }
                Err(e) => {
                    let delay = policy.delay_for(attempt);
                    warn!(
                        "⚠️ 模型调用失败 (第 {} 次): {}，{} 毫秒后重试",
                        attempt,
                        e,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// 流式调用
    ///
    /// 每收到一段增量就按到达顺序调用一次 `on_delta(增量, 已累积文本)`，
    /// 调用返回后不会再触发回调。已向调用方交付部分输出，所以失败不重试。
    pub async fn call_streaming<F>(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        mut on_delta: F,
    ) -> Result<Completion, LlmError>
    where
        F: FnMut(&str, &str) + Send,
    {
        let request = self.build_request(messages, max_tokens, true)?;
        debug!(
            "发起流式调用，消息数: {}，总字符: {}",
            request.messages.len(),
            total_chars(&request.messages)
        );

        let reply = self
            .transport
            .post_stream(&request, self.settings.stream_timeout)
            .await?;
        if !reply.is_success() {
            let status = reply.status;
            let body = reply.into_text().await;
            let e = LlmError::from_status(status, &body);
            error!("❌ 流式调用失败: {}", e);
            return Err(e);
        }

        let mut decoder = SseDecoder::new();
        let mut text = String::new();
        let mut usage = None;
        let mut chunks = reply.chunks;

        while let Some(chunk) = chunks.next().await {
            let chunk = chunk.map_err(|e| {
                error!("❌ 流式读取中断: {}", e);
                e
            })?;
            let events = decoder.feed(&chunk);
            if apply_events(events, &mut text, &mut usage, &mut on_delta) {
                break;
            }
        }
        if !decoder.is_done() {
            debug!("流在收到 [DONE] 之前结束，使用已累积内容");
            apply_events(decoder.finish(), &mut text, &mut usage, &mut on_delta);
        }

        debug!("流式调用完成，累积 {} 字符", text.chars().count());
        Ok(Completion { text, usage })
    }

    /// 测试连接：发送一条极短的请求，成功返回 true，从不报错
    pub async fn test_connection(&self) -> bool {
        match self.call(&[ChatMessage::user("Hello")], 5).await {
            Ok(_) => {
                info!("✓ 模型连接测试成功");
                true
            }
            Err(e) => {
                warn!("⚠️ 模型连接测试失败: {}", e);
                false
            }
        }
    }

    fn build_request(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        stream: bool,
    ) -> Result<ChatRequest, LlmError> {
        if messages.is_empty() {
            return Err(LlmError::InvalidRequest("消息列表为空".to_string()));
        }
        Ok(ChatRequest {
            model: self.settings.model.clone(),
            messages: bounded_messages(messages, self.settings.max_history_chars),
            max_tokens: max_tokens.min(self.settings.max_output_tokens),
            temperature: self.settings.temperature,
            stream: stream.then_some(true),
        })
    }

    async fn call_once(&self, request: &ChatRequest) -> Result<Completion, LlmError> {
        let reply = self
            .transport
            .post(request, self.settings.request_timeout)
            .await?;
        if !(200..300).contains(&reply.status) {
            return Err(LlmError::from_status(reply.status, &reply.body));
        }
        parse_completion(&reply.body)
    }
}

/// 历史长度保护
///
/// 总字符数超过阈值时只保留第一条（system）和最后两条消息。
pub fn bounded_messages(messages: &[ChatMessage], max_chars: usize) -> Vec<ChatMessage> {
    let total = total_chars(messages);
    if total <= max_chars || messages.len() <= 3 {
        return messages.to_vec();
    }
    warn!(
        "⚠️ 对话历史过长 ({} 字符，{} 条消息)，只保留首条和最后两条",
        total,
        messages.len()
    );
    let mut kept = Vec::with_capacity(3);
    kept.push(messages[0].clone());
    kept.extend_from_slice(&messages[messages.len() - 2..]);
    kept
}

fn malformed(detail: String) -> LlmError {
    warn!("⚠️ 无法解析模型响应: {}", detail);
    LlmError::MalformedResponse { detail }
}

fn parse_completion(body: &str) -> Result<Completion, LlmError> {
    let value: Value = serde_json::from_str(body).map_err(|e| malformed(e.to_string()))?;
    let text = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("缺少 choices[0].message.content".to_string()))?
        .to_string();
    let usage = value
        .get("usage")
        .filter(|u| u.is_object())
        .and_then(|u| serde_json::from_value(u.clone()).ok());
    Ok(Completion { text, usage })
}

/// 处理一批上游事件，返回是否已收到结束帧
fn apply_events<F>(
    events: Vec<SseEvent>,
    text: &mut String,
    usage: &mut Option<Usage>,
    on_delta: &mut F,
) -> bool
where
    F: FnMut(&str, &str),
{
    for event in events {
        match event {
            SseEvent::Delta(delta) => {
                text.push_str(&delta);
                on_delta(&delta, text);
            }
            SseEvent::Usage(u) => *usage = Some(u),
            SseEvent::Done => return true,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(2), Duration::from_millis(2000));
        assert_eq!(policy.delay_for(3), Duration::from_millis(4000));
        assert_eq!(policy.delay_for(4), Duration::from_millis(5000));
        assert_eq!(policy.delay_for(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_bounded_messages_keeps_first_and_last_two() {
        let messages = vec![
            ChatMessage::system("sys"),
            ChatMessage::user("a".repeat(50)),
            ChatMessage::assistant("b".repeat(50)),
            ChatMessage::user("c".repeat(50)),
            ChatMessage::assistant("d".repeat(50)),
        ];
        let kept = bounded_messages(&messages, 100);
        assert_eq!(kept.len(), 3);
        assert_eq!(kept[0].content, "sys");
        assert_eq!(kept[1].content, "c".repeat(50));
        assert_eq!(kept[2].content, "d".repeat(50));

        assert_eq!(bounded_messages(&messages, 10_000).len(), 5);
    }

    #[test]
    fn test_parse_completion() {
        let completion = parse_completion(
            r#"{"choices":[{"message":{"content":"ok"}}],"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#,
        )
        .unwrap();
        assert_eq!(completion.text, "ok");
        assert_eq!(completion.usage.map(|u| u.total_tokens), Some(3));

        assert!(matches!(
            parse_completion(r#"{"choices":[]}"#),
            Err(LlmError::MalformedResponse { .. })
        ));
        assert!(matches!(
            parse_completion("<html>bad gateway</html>"),
            Err(LlmError::MalformedResponse { .. })
        ));
    }
}
