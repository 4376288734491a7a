//! 分阶段分析流程 - 流程层
//!
//! 定义"一份文档"的完整分析流程：
//! 结构分析 → 设计缺陷 → 逻辑一致性 → 风险评估 → 完成。
//!
//! 每个阶段都把累积的对话历史加上本阶段挑选的段落发给模型，
//! 模型原文作为 assistant 消息追加回历史，后一阶段因此能看到前面所有结论。
//! 任何阶段出现不可恢复的错误，整个流程都切换到降级流程，而不是向上报错；
//! 只有"没有可分析文本"是致命的。

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::clients::{Completion, ModelGateway};
use crate::error::{AppError, AppResult, LlmError};
use crate::models::{AnalysisReport, ConversationHistory, DimensionKey, StageResult};
use crate::services::{response_extractor, section_selector};
use crate::workflow::degraded::DegradedPipeline;
use crate::workflow::outline::{outline_prompt, validate_outline, OUTLINE_MAX_TOKENS};
use crate::workflow::progress::{stage_name, ProgressEvent, ProgressSink};

pub const SYSTEM_PROMPT: &str =
    "你是专业的产品文档质量分析助手。请按阶段逐步分析文档，提供详细、准确的分析结果。";

/// 流程状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Outline,
    Dimension(DimensionKey),
    Complete,
    Failed,
    Degraded,
}

impl StageState {
    /// 正常路径上的下一个状态
    pub fn next(self) -> Self {
        match self {
            StageState::Outline => StageState::Dimension(DimensionKey::ALL[0]),
            StageState::Dimension(current) => DimensionKey::ALL
                .iter()
                .position(|d| *d == current)
                .and_then(|i| DimensionKey::ALL.get(i + 1))
                .map_or(StageState::Complete, |d| StageState::Dimension(*d)),
            StageState::Failed => StageState::Degraded,
            other => other,
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageState::Outline => write!(f, "文档结构分析"),
            StageState::Dimension(d) => write!(f, "{}", d.label()),
            StageState::Complete => write!(f, "完成"),
            StageState::Failed => write!(f, "失败"),
            StageState::Degraded => write!(f, "降级"),
        }
    }
}

/// 让流程切换到降级路径的原因
#[derive(Debug, Error)]
pub enum StageFailure {
    #[error("{state}阶段调用失败: {source}")]
    Upstream {
        state: StageState,
        #[source]
        source: LlmError,
    },
    #[error("文档结构分析结果无法解析")]
    OutlineUnparseable,
    #[error("文档结构分析没有识别出任何段落")]
    EmptyOutline,
}

/// 单次分析的选项
#[derive(Debug, Clone, Copy)]
pub struct AnalysisOptions {
    /// 使用流式调用并逐段发出 chunk 事件
    pub stream: bool,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self { stream: true }
    }
}

/// 分阶段分析编排器
///
/// 持有共享的网关，自身没有跨请求的可变状态；对话历史和文档结构
/// 都是每次 `analyze` 调用私有的局部变量。
pub struct StageOrchestrator {
    gateway: Arc<ModelGateway>,
    degraded: DegradedPipeline,
    options: AnalysisOptions,
}

impl StageOrchestrator {
    pub fn new(gateway: Arc<ModelGateway>, options: AnalysisOptions) -> Self {
        Self {
            degraded: DegradedPipeline::new(gateway.clone()),
            gateway,
            options,
        }
    }

    /// 分析一份文档
    ///
    /// 只有文本为空时返回错误；其他失败都会得到一份降级报告。
    pub async fn analyze(&self, text: &str, sink: &dyn ProgressSink) -> AppResult<AnalysisReport> {
        if text.trim().is_empty() {
            return Err(AppError::NoExtractableText);
        }

        match self.run_stages(text, sink).await {
            Ok(report) => {
                info!("✅ 分阶段分析完成");
                Ok(report)
            }
            Err(failure) => {
                let reason = failure.to_string();
                warn!(
                    "⚠️ 分阶段分析失败: {}，状态 {} → {}",
                    reason,
                    StageState::Failed,
                    StageState::Failed.next()
                );
                sink.emit(ProgressEvent::Degraded {
                    reason: reason.clone(),
                });
                let report = self.degraded.run(text, &DimensionKey::ALL, sink).await;
                Ok(report.degraded(reason))
            }
        }
    }

    async fn run_stages(
        &self,
        text: &str,
        sink: &dyn ProgressSink,
    ) -> Result<AnalysisReport, StageFailure> {
        let mut history = ConversationHistory::new(SYSTEM_PROMPT);
        let mut state = StageState::Outline;

        info!("🚀 开始阶段1：文档结构分析");
        history.push_user(outline_prompt(text));
        let stage = stage_name(None);
        sink.emit(ProgressEvent::StageStarting {
            stage,
            message: "阶段1：文档结构分析".to_string(),
        });
        let completion = self
            .invoke(&history, OUTLINE_MAX_TOKENS, stage, sink)
            .await
            .map_err(|source| StageFailure::Upstream { state, source })?;

        let value = response_extractor::try_extract(&completion.text)
            .ok_or(StageFailure::OutlineUnparseable)?;
        let outline = validate_outline(&value, text);
        if outline.sections.is_empty() {
            return Err(StageFailure::EmptyOutline);
        }
        info!("✓ 文档结构分析完成，发现 {} 个段落", outline.sections.len());
        sink.emit(ProgressEvent::StageComplete {
            stage,
            summary: outline.structure_digest(),
        });

        let outline_usage = completion.usage;
        history.push_assistant(completion.text);
        state = state.next();

        let mut stages = Vec::with_capacity(DimensionKey::ALL.len());
        while let StageState::Dimension(dimension) = state {
            info!(
                "🚀 开始阶段{}：{}",
                dimension.stage_number(),
                dimension.label()
            );
            let sections = section_selector::select(&outline, dimension);
            let content = section_selector::render(&sections, dimension.content_budget());
            history.push_user(dimension.stage_prompt(&content));

            let stage = stage_name(Some(dimension));
            sink.emit(ProgressEvent::StageStarting {
                stage,
                message: format!("阶段{}：{}", dimension.stage_number(), dimension.label()),
            });
            let completion = self
                .invoke(&history, dimension.max_tokens(), stage, sink)
                .await
                .map_err(|source| StageFailure::Upstream { state, source })?;

            let result = StageResult {
                dimension,
                extracted: response_extractor::try_extract(&completion.text),
                raw_text: completion.text.clone(),
                usage: completion.usage,
            };
            history.push_assistant(completion.text);
            sink.emit(ProgressEvent::StageComplete {
                stage,
                summary: result.summary_text().to_string(),
            });
            stages.push(result);
            state = state.next();
        }

        Ok(AnalysisReport::new(outline, stages, outline_usage))
    }

    async fn invoke(
        &self,
        history: &ConversationHistory,
        max_tokens: u32,
        stage: &'static str,
        sink: &dyn ProgressSink,
    ) -> Result<Completion, LlmError> {
        if self.options.stream {
            self.gateway
                .call_streaming(history.messages(), max_tokens, |delta, _accumulated| {
                    sink.emit(ProgressEvent::Chunk {
                        stage,
                        delta: delta.to_string(),
                    })
                })
                .await
        } else {
            self.gateway.call(history.messages(), max_tokens).await
        }
    }
}
