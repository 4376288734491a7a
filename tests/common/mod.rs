#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use doc_quality_analyzer::clients::{GatewaySettings, ModelGateway, RetryPolicy};
use doc_quality_analyzer::error::LlmError;
use doc_quality_analyzer::infrastructure::{ChatRequest, ChatTransport, RawReply, StreamReply};
use doc_quality_analyzer::workflow::{ProgressEvent, ProgressSink};
use futures::StreamExt;
use serde_json::json;

/// 按顺序返回预先写好的响应
#[derive(Default)]
pub struct ScriptedTransport {
    buffered: Mutex<VecDeque<Result<RawReply, LlmError>>>,
    streams: Mutex<VecDeque<Result<(u16, Vec<Vec<u8>>), LlmError>>>,
    requests: Mutex<Vec<ChatRequest>>,
    delay: Duration,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 每次请求先等待 `delay` 再返回
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    async fn wait(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    pub fn push_reply(&self, status: u16, body: impl Into<String>) {
        self.buffered.lock().unwrap().push_back(Ok(RawReply {
            status,
            body: body.into(),
        }));
    }

    pub fn push_completion(&self, text: &str) {
        self.push_reply(200, completion_body(text, 10, 20));
    }

    pub fn push_error(&self, error: LlmError) {
        self.buffered.lock().unwrap().push_back(Err(error));
    }

    pub fn push_stream(&self, status: u16, chunks: Vec<String>) {
        self.push_stream_bytes(status, chunks.into_iter().map(String::into_bytes).collect());
    }

    pub fn push_stream_bytes(&self, status: u16, chunks: Vec<Vec<u8>>) {
        self.streams.lock().unwrap().push_back(Ok((status, chunks)));
    }

    pub fn push_stream_error(&self, error: LlmError) {
        self.streams.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl ChatTransport for ScriptedTransport {
    async fn post(&self, request: &ChatRequest, _timeout: Duration) -> Result<RawReply, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.wait().await;
        let next = self.buffered.lock().unwrap().pop_front();
        next.unwrap_or_else(|| {
            Err(LlmError::MalformedResponse {
                detail: "没有更多脚本响应".to_string(),
            })
        })
    }

    async fn post_stream(
        &self,
        request: &ChatRequest,
        _timeout: Duration,
    ) -> Result<StreamReply, LlmError> {
        self.requests.lock().unwrap().push(request.clone());
        self.wait().await;
        let next = self.streams.lock().unwrap().pop_front();
        let (status, chunks) = next.unwrap_or_else(|| {
            Err(LlmError::MalformedResponse {
                detail: "没有更多脚本响应".to_string(),
            })
        })?;
        Ok(StreamReply {
            status,
            chunks: futures::stream::iter(chunks.into_iter().map(Ok)).boxed(),
        })
    }
}

/// 普通调用的成功响应体
pub fn completion_body(text: &str, prompt_tokens: u64, completion_tokens: u64) -> String {
    json!({
        "choices": [{ "message": { "role": "assistant", "content": text } }],
        "usage": {
            "prompt_tokens": prompt_tokens,
            "completion_tokens": completion_tokens,
            "total_tokens": prompt_tokens + completion_tokens
        }
    })
    .to_string()
}

/// 流式响应：每段增量一帧，然后是 usage 帧和 [DONE]
pub fn sse_chunks(deltas: &[&str], total_tokens: u64) -> Vec<String> {
    let mut chunks: Vec<String> = deltas
        .iter()
        .map(|d| {
            format!(
                "data: {}\n\n",
                json!({ "choices": [{ "delta": { "content": d } }] })
            )
        })
        .collect();
    chunks.push(format!(
        "data: {}\n\n",
        json!({
            "choices": [],
            "usage": { "prompt_tokens": 0, "completion_tokens": total_tokens, "total_tokens": total_tokens }
        })
    ));
    chunks.push("data: [DONE]\n\n".to_string());
    chunks
}

pub fn gateway(transport: Arc<ScriptedTransport>) -> Arc<ModelGateway> {
    gateway_with_history_limit(transport, 100_000)
}

pub fn gateway_with_history_limit(
    transport: Arc<ScriptedTransport>,
    max_history_chars: usize,
) -> Arc<ModelGateway> {
    let settings = GatewaySettings {
        model: "test-model".to_string(),
        temperature: 0.2,
        max_output_tokens: 4000,
        max_history_chars,
        request_timeout: Duration::from_secs(5),
        stream_timeout: Duration::from_secs(5),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
    };
    Arc::new(ModelGateway::new(transport, settings))
}

/// 记录所有进度事件
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub const SAMPLE_DOCUMENT: &str = "订单系统需求说明\n\n\
用户可以在购物车中选择商品并提交订单，提交后系统需要在三十秒内锁定库存并生成待支付订单。\n\n\
支付成功后订单状态变为已支付，支付失败时需要释放库存并提示用户重新支付或取消订单。\n\n\
系统需要记录所有订单操作日志，敏感字段必须脱敏存储，日志至少保留一百八十天以便审计。";

/// 一个合法的三段结构分析结果
pub fn outline_json() -> String {
    json!({
        "document_summary": "订单系统的产品需求文档",
        "document_type": "产品需求文档",
        "sections": [
            {
                "id": "section_1",
                "title": "下单流程",
                "content": "用户可以在购物车中选择商品并提交订单",
                "category": "功能需求",
                "hierarchy_level": 1,
                "word_count": 18,
                "relevance": { "设计缺陷检查": 8, "逻辑一致性分析": 6, "风险评估": 3 },
                "tags": ["下单"]
            },
            {
                "id": "section_2",
                "title": "支付处理",
                "content": "支付成功后订单状态变为已支付",
                "category": "业务逻辑",
                "hierarchy_level": 1,
                "word_count": 14,
                "relevance": { "设计缺陷检查": 4, "逻辑一致性分析": 9, "风险评估": 7 },
                "tags": ["支付"],
                "dependencies": ["section_1"]
            },
            {
                "id": "section_3",
                "title": "日志审计",
                "content": "敏感字段必须脱敏存储",
                "category": "安全要求",
                "hierarchy_level": 1,
                "word_count": 10,
                "relevance": { "设计缺陷检查": 1, "逻辑一致性分析": 2, "风险评估": 9 },
                "tags": ["安全"]
            }
        ],
        "metadata": {
            "total_sections": 3,
            "total_length": 0,
            "document_structure": "模块化",
            "estimated_complexity": "中"
        }
    })
    .to_string()
}

pub fn stage_json(result: &str) -> String {
    json!({ "result": result }).to_string()
}

/// 把 SSE 输出切成帧（不含结尾的空行）
pub fn split_frames(output: &str) -> Vec<String> {
    output
        .split("\n\n")
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

/// 解析 `data: {...}` 帧，心跳和结束帧返回 None
pub fn frame_json(frame: &str) -> Option<serde_json::Value> {
    frame
        .strip_prefix("data: ")
        .filter(|p| *p != "[DONE]")
        .and_then(|p| serde_json::from_str(p).ok())
}
