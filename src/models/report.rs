use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::dimension::DimensionKey;
use super::outline::Outline;

/// token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl Usage {
    pub fn accumulate(&mut self, other: &Usage) {
        self.prompt_tokens += other.prompt_tokens;
        self.completion_tokens += other.completion_tokens;
        self.total_tokens += other.total_tokens;
    }

    /// 对所有上报了用量的阶段求和，全都没有上报时返回 None
    pub fn sum<'a>(items: impl IntoIterator<Item = Option<&'a Usage>>) -> Option<Usage> {
        items.into_iter().flatten().fold(None, |acc, usage| {
            let mut total = acc.unwrap_or_default();
            total.accumulate(usage);
            Some(total)
        })
    }
}

/// 单个维度阶段的结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub dimension: DimensionKey,
    pub raw_text: String,
    /// 提取到的结构化结果；降级流程中始终为 None
    pub extracted: Option<Value>,
    pub usage: Option<Usage>,
}

impl StageResult {
    /// 面向用户的结果文本：优先使用提取到的 `result` 字段
    pub fn summary_text(&self) -> &str {
        self.extracted
            .as_ref()
            .and_then(|v| v.get("result"))
            .and_then(Value::as_str)
            .unwrap_or(&self.raw_text)
    }
}

/// 最终分析报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    pub outline: Outline,
    /// 人类可读的结构摘要
    pub document_structure: String,
    pub stages: Vec<StageResult>,
    /// 各阶段用量之和
    pub usage: Option<Usage>,
    pub degraded: bool,
    pub fallback_reason: Option<String>,
}

impl AnalysisReport {
    pub fn new(outline: Outline, stages: Vec<StageResult>, outline_usage: Option<Usage>) -> Self {
        let usage = Usage::sum(
            std::iter::once(outline_usage.as_ref()).chain(stages.iter().map(|s| s.usage.as_ref())),
        );
        Self {
            document_structure: outline.structure_digest(),
            outline,
            stages,
            usage,
            degraded: false,
            fallback_reason: None,
        }
    }

    pub fn degraded(mut self, reason: impl Into<String>) -> Self {
        self.degraded = true;
        self.fallback_reason = Some(reason.into());
        self
    }

    pub fn stage(&self, dimension: DimensionKey) -> Option<&StageResult> {
        self.stages.iter().find(|s| s.dimension == dimension)
    }
}
