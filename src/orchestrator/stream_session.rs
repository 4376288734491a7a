//! 流式会话 - 编排层
//!
//! ## 职责
//!
//! 把一次分析的进度事件翻译成面向消费者的 SSE 帧：
//!
//! 1. **帧格式**：`data: <json>\n\n`，最后以 `data: [DONE]\n\n` 结束
//! 2. **心跳**：分析进行期间每隔固定时间写一条 `: keep-alive\n\n` 注释
//! 3. **顺序**：chunk 帧严格按上游到达顺序写出，最终的 `complete` 帧一定在所有阶段帧之后
//! 4. **断开处理**：消费者断开后所有写入变成空操作（记录日志、停掉心跳），分析本身不受影响

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

use crate::models::AnalysisReport;
use crate::services::TextSource;
use crate::workflow::{ChannelProgressSink, ProgressEvent, StageOrchestrator};

/// 结束帧
pub const DONE_FRAME: &str = "data: [DONE]\n\n";
/// 心跳注释
pub const KEEP_ALIVE_FRAME: &str = ": keep-alive\n\n";

/// 面向消费者的一帧数据
#[derive(Debug, Clone, Serialize)]
pub struct StreamFrame {
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub results: Option<Box<AnalysisReport>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: String,
}

impl StreamFrame {
    fn new(stage: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            chunk: None,
            completed: None,
            message: None,
            results: None,
            error: None,
            timestamp: chrono::Local::now().to_rfc3339(),
        }
    }

    pub fn from_event(event: ProgressEvent) -> Self {
        match event {
            ProgressEvent::StageStarting { stage, message } => Self {
                message: Some(message),
                ..Self::new(stage)
            },
            ProgressEvent::Chunk { stage, delta } => Self {
                chunk: Some(delta),
                ..Self::new(stage)
            },
            ProgressEvent::StageComplete { stage, summary } => Self {
                completed: Some(true),
                message: Some(summary),
                ..Self::new(format!("{}_complete", stage))
            },
            ProgressEvent::Degraded { reason } => Self {
                message: Some(reason),
                ..Self::new("fallback")
            },
        }
    }

    pub fn complete(report: AnalysisReport) -> Self {
        Self {
            results: Some(Box::new(report)),
            ..Self::new("complete")
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Self::new("error")
        }
    }

    /// 编码成 SSE 数据帧
    pub fn to_sse(&self) -> String {
        match serde_json::to_string(self) {
            Ok(json) => format!("data: {}\n\n", json),
            Err(e) => {
                error!("❌ 序列化流式帧失败: {}", e);
                format!(
                    "data: {{\"stage\":\"error\",\"error\":\"序列化失败\",\"timestamp\":\"{}\"}}\n\n",
                    self.timestamp
                )
            }
        }
    }
}

/// 帧的投递目标
#[async_trait]
pub trait FrameSink: Send {
    async fn send_frame(&mut self, frame: &str) -> io::Result<()>;
}

/// 交给 HTTP 层的通道
#[async_trait]
impl FrameSink for mpsc::Sender<String> {
    async fn send_frame(&mut self, frame: &str) -> io::Result<()> {
        self.send(frame.to_string())
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "消费者已断开"))
    }
}

/// 任意异步写入端（命令行模式下是 stdout）
pub struct AsyncWriteSink<W> {
    inner: W,
}

impl<W> AsyncWriteSink<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[async_trait]
impl<W> FrameSink for AsyncWriteSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn send_frame(&mut self, frame: &str) -> io::Result<()> {
        self.inner.write_all(frame.as_bytes()).await?;
        self.inner.flush().await
    }
}

/// 记录连接状态的写入器：第一次写失败后后续写入全部变成空操作
struct FrameWriter<'a, S: FrameSink + ?Sized> {
    sink: &'a mut S,
    connected: bool,
    dropped: usize,
}

impl<'a, S: FrameSink + ?Sized> FrameWriter<'a, S> {
    fn new(sink: &'a mut S) -> Self {
        Self {
            sink,
            connected: true,
            dropped: 0,
        }
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    async fn write(&mut self, payload: &str) {
        if !self.connected {
            self.dropped += 1;
            return;
        }
        if let Err(e) = self.sink.send_frame(payload).await {
            warn!("⚠️ 消费者已断开，停止推送: {}", e);
            self.connected = false;
            self.dropped += 1;
        }
    }

    async fn write_frame(&mut self, frame: StreamFrame) {
        let payload = frame.to_sse();
        self.write(&payload).await;
    }
}

/// 一次流式会话的结果
#[derive(Debug)]
pub struct SessionOutcome {
    /// 分析得到的报告（文本提取失败时为 None）
    pub report: Option<AnalysisReport>,
    /// 消费者是否一直保持连接
    pub delivered: bool,
}

/// 流式会话
pub struct StreamSession<'a> {
    orchestrator: &'a StageOrchestrator,
    keep_alive: Duration,
}

impl<'a> StreamSession<'a> {
    pub fn new(orchestrator: &'a StageOrchestrator, keep_alive: Duration) -> Self {
        Self {
            orchestrator,
            keep_alive,
        }
    }

    /// 提取文本、运行分析，并把全过程写成 SSE 帧
    pub async fn run<S>(
        &self,
        source: &dyn TextSource,
        document: &[u8],
        sink: &mut S,
    ) -> SessionOutcome
    where
        S: FrameSink + ?Sized,
    {
        let mut writer = FrameWriter::new(sink);

        let text = match source.extract_text(document) {
            Ok(text) => text,
            Err(e) => {
                error!("❌ 文本提取失败: {}", e);
                writer.write_frame(StreamFrame::error(e.to_string())).await;
                writer.write(DONE_FRAME).await;
                return SessionOutcome {
                    report: None,
                    delivered: writer.is_connected(),
                };
            }
        };

        let (progress, mut events) = ChannelProgressSink::new();
        let analysis = self.orchestrator.analyze(&text, &progress);
        tokio::pin!(analysis);

        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.keep_alive, self.keep_alive);

        let result = loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => {
                    writer.write_frame(StreamFrame::from_event(event)).await;
                }
                result = &mut analysis => break result,
                _ = ticker.tick(), if writer.is_connected() => {
                    debug!("发送心跳");
                    writer.write(KEEP_ALIVE_FRAME).await;
                }
            }
        };
        drop(ticker);

        while let Ok(event) = events.try_recv() {
            writer.write_frame(StreamFrame::from_event(event)).await;
        }

        let report = match result {
            Ok(report) => {
                writer.write_frame(StreamFrame::complete(report.clone())).await;
                Some(report)
            }
            Err(e) => {
                error!("❌ 分析失败: {}", e);
                writer.write_frame(StreamFrame::error(e.to_string())).await;
                None
            }
        };
        writer.write(DONE_FRAME).await;

        if !writer.is_connected() {
            warn!("⚠️ 消费者中途断开，丢弃了 {} 帧", writer.dropped);
        }
        SessionOutcome {
            report,
            delivered: writer.is_connected(),
        }
    }
}

/// 只写一个错误帧和结束帧（用于会话开始之前的失败，例如读文件出错）
pub async fn send_error<S>(sink: &mut S, message: &str)
where
    S: FrameSink + ?Sized,
{
    let mut writer = FrameWriter::new(sink);
    writer.write_frame(StreamFrame::error(message)).await;
    writer.write(DONE_FRAME).await;
}
