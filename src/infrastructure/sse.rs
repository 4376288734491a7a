//! 上游 SSE 事件流解码
//!
//! 按字节缓冲、按 `\n` 切行，跨网络块被拆开的 UTF-8 字符在拼成整行后才解码。

use serde_json::Value;
use tracing::warn;

use crate::models::Usage;

/// 解码出的上游事件
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    /// 一段增量文本
    Delta(String),
    /// 某一帧携带的用量统计
    Usage(Usage),
    /// `data: [DONE]`
    Done,
}

#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 是否已经收到结束帧
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// 喂入一个网络块，返回其中所有完整行解码出的事件
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            self.decode_line(&line, &mut events);
        }
        events
    }

    /// 流结束时处理缓冲区里没有换行的最后一行
    pub fn finish(&mut self) -> Vec<SseEvent> {
        let mut events = Vec::new();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            self.decode_line(&line, &mut events);
        }
        events
    }

    fn decode_line(&mut self, raw: &[u8], events: &mut Vec<SseEvent>) {
        if self.done {
            return;
        }
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        let Some(payload) = line.strip_prefix("data:") else {
            return;
        };
        let payload = payload.trim_start();
        if payload == "[DONE]" {
            self.done = true;
            events.push(SseEvent::Done);
            return;
        }

        let frame: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                warn!("⚠️ 跳过无法解析的流式数据帧: {}", e);
                return;
            }
        };

        if let Some(content) = frame
            .pointer("/choices/0/delta/content")
            .and_then(Value::as_str)
        {
            if !content.is_empty() {
                events.push(SseEvent::Delta(content.to_string()));
            }
        }
        if let Some(usage) = frame.get("usage").filter(|u| u.is_object()) {
            if let Ok(usage) = serde_json::from_value::<Usage>(usage.clone()) {
                events.push(SseEvent::Usage(usage));
            }
        }
    }
}
