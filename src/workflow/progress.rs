//! 进度事件
//!
//! 编排器只通过 `ProgressSink::emit` 往外报告进度，不知道事件最终如何投递
//! （SSE 帧、心跳都由编排层负责）。没有人接收时事件直接丢弃，不影响分析结果。

use tokio::sync::mpsc;

use crate::models::DimensionKey;

/// 阶段 1 的阶段名
pub const STRUCTURE_STAGE: &str = "structure";

/// 阶段名：`structure` 或维度对应的 `design` / `logic` / `risk`
pub fn stage_name(dimension: Option<DimensionKey>) -> &'static str {
    dimension.map_or(STRUCTURE_STAGE, DimensionKey::stage_name)
}

/// 进度事件
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// 即将发起该阶段的上游调用
    StageStarting {
        stage: &'static str,
        message: String,
    },
    /// 流式调用收到的一段增量
    Chunk { stage: &'static str, delta: String },
    /// 阶段完成，携带该阶段的摘要
    StageComplete {
        stage: &'static str,
        summary: String,
    },
    /// 切换到降级流程
    Degraded { reason: String },
}

impl ProgressEvent {
    pub fn stage(&self) -> &'static str {
        match self {
            ProgressEvent::StageStarting { stage, .. }
            | ProgressEvent::Chunk { stage, .. }
            | ProgressEvent::StageComplete { stage, .. } => *stage,
            ProgressEvent::Degraded { .. } => "fallback",
        }
    }
}

/// 进度输出接口
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// 把事件送进通道，由消费端（流式会话）负责投递
#[derive(Debug, Clone)]
pub struct ChannelProgressSink {
    tx: mpsc::UnboundedSender<ProgressEvent>,
}

impl ChannelProgressSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelProgressSink {
    fn emit(&self, event: ProgressEvent) {
        // 接收端已关闭说明消费者不在了，事件可以丢弃
        let _ = self.tx.send(event);
    }
}
