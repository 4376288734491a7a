//! 降级流程
//!
//! 结构分析失败或任何阶段出现不可恢复的错误时使用：按空行/换行/句子把原文
//! 切成固定大小的块，每个维度只做一次单轮调用，原样接受模型的自然语言输出。
//! 单个维度失败只会变成一段"分析失败"文字，不影响其他维度。

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::clients::ModelGateway;
use crate::models::{
    AnalysisReport, ChatMessage, Complexity, DimensionKey, DocumentType, Outline, OutlineMetadata,
    Section, SectionCategory, StageResult, StructureKind,
};
use crate::services::section_selector;
use crate::workflow::progress::{ProgressEvent, ProgressSink};

/// 每个块的字符上限
pub const CHUNK_CHAR_LIMIT: usize = 1200;
/// 同一块内片段之间的分隔
const FRAGMENT_JOINER: &str = "\n\n";
/// 降级调用的输出 token 预算
pub const DEGRADED_MAX_TOKENS: u32 = 3000;
/// 降级块的统一相关性评分
const CHUNK_RELEVANCE: f64 = 4.0;
/// 所有片段都被过滤掉时，默认段落保留的字符数
const DEFAULT_SECTION_CHARS: usize = 2000;
/// 按段落/行切分时保留的最短片段
const MIN_FRAGMENT_CHARS: usize = 30;
/// 按句子切分时保留的最短片段
const MIN_SENTENCE_CHARS: usize = 50;

pub const DEGRADED_SYSTEM_PROMPT: &str =
    "你是产品文档审查助手，请只输出纯JSON格式，不要包含任何markdown代码块。";

/// 把原文切成不超过 `limit` 字符的块
///
/// 依次尝试空行、换行、句末标点；少于 2 个片段时换下一种切法。
/// 超长的单个片段会被硬切成 `limit` 大小。
pub fn chunk_text(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let keep = |min: usize| move |p: &&str| p.trim().chars().count() > min;

    let mut fragments: Vec<&str> = text.split("\n\n").filter(keep(MIN_FRAGMENT_CHARS)).collect();
    if fragments.len() < 2 {
        fragments = text.split('\n').filter(keep(MIN_FRAGMENT_CHARS)).collect();
    }
    if fragments.len() < 2 {
        fragments = text
            .split_inclusive(|c: char| matches!(c, '.' | '!' | '?' | '。' | '！' | '？'))
            .filter(keep(MIN_SENTENCE_CHARS))
            .collect();
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let joiner_len = FRAGMENT_JOINER.chars().count();
    for fragment in fragments.iter().flat_map(|f| split_oversized(f.trim(), limit)) {
        let current_len = current.chars().count();
        if current_len > 0 && current_len + joiner_len + fragment.chars().count() > limit {
            chunks.push(current.trim().to_string());
            current = fragment;
        } else {
            if !current.is_empty() {
                current.push_str(FRAGMENT_JOINER);
            }
            current.push_str(&fragment);
        }
    }
    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    if chunks.is_empty() && !text.trim().is_empty() {
        chunks.push(text.trim().chars().take(DEFAULT_SECTION_CHARS).collect());
    }
    chunks
}

fn split_oversized(fragment: &str, limit: usize) -> Vec<String> {
    let chars: Vec<char> = fragment.chars().collect();
    chars.chunks(limit).map(|c| c.iter().collect()).collect()
}

/// 用智能分块构造文档结构
pub fn chunk_outline(text: &str) -> Outline {
    info!("📄 使用降级分块方法");
    let sections: Vec<Section> = chunk_text(text, CHUNK_CHAR_LIMIT)
        .into_iter()
        .enumerate()
        .map(|(i, content)| Section {
            id: format!("fallback_{}", i + 1),
            title: format!("文档段落 {}", i + 1),
            category: SectionCategory::DocumentContent,
            hierarchy_level: 1,
            word_count: content.chars().filter(|c| !c.is_whitespace()).count(),
            tags: BTreeSet::from([SectionCategory::DocumentContent.name().to_string()]),
            relevance: Section::uniform_relevance(CHUNK_RELEVANCE),
            dependencies: Vec::new(),
            content,
        })
        .collect();

    let document_summary = if sections.is_empty() {
        "文档内容已解析，但无法识别明确的段落结构".to_string()
    } else {
        format!("通过智能分块将文档分为{}个段落进行分析", sections.len())
    };

    Outline {
        document_summary,
        document_type: DocumentType::Generic,
        metadata: OutlineMetadata {
            total_sections: sections.len(),
            total_length: text.chars().count(),
            structure_kind: StructureKind::Chunked,
            complexity: Complexity::Medium,
        },
        sections,
    }
}

/// 降级流程
pub struct DegradedPipeline {
    gateway: Arc<ModelGateway>,
}

impl DegradedPipeline {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    /// 对每个维度做一次单轮分析，永不失败
    pub async fn run(
        &self,
        text: &str,
        dimensions: &[DimensionKey],
        sink: &dyn ProgressSink,
    ) -> AnalysisReport {
        info!("🔄 使用降级分阶段分析方法");
        let outline = chunk_outline(text);

        let mut stages = Vec::with_capacity(dimensions.len());
        for &dimension in dimensions {
            stages.push(self.analyze_dimension(&outline, dimension, sink).await);
        }

        AnalysisReport::new(outline, stages, None)
    }

    async fn analyze_dimension(
        &self,
        outline: &Outline,
        dimension: DimensionKey,
        sink: &dyn ProgressSink,
    ) -> StageResult {
        let stage = dimension.stage_name();
        sink.emit(ProgressEvent::StageStarting {
            stage,
            message: format!("降级分析：{}", dimension.label()),
        });

        let sections = section_selector::select(outline, dimension);
        let content = section_selector::render(&sections, dimension.content_budget());
        let messages = [
            ChatMessage::system(DEGRADED_SYSTEM_PROMPT),
            ChatMessage::user(dimension.degraded_prompt(&content)),
        ];

        let result = match self.gateway.call(&messages, DEGRADED_MAX_TOKENS).await {
            Ok(completion) => StageResult {
                dimension,
                raw_text: completion.text,
                extracted: None,
                usage: completion.usage,
            },
            Err(e) => {
                warn!("⚠️ 降级分析 {} 失败: {}", dimension, e);
                StageResult {
                    dimension,
                    raw_text: format!("分析失败: {}", e),
                    extracted: None,
                    usage: None,
                }
            }
        };

        sink.emit(ProgressEvent::StageComplete {
            stage,
            summary: result.summary_text().to_string(),
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sentence(i: usize) -> String {
        format!("第{}句描述了系统在高并发场景下的订单处理流程以及失败后的补偿策略和告警方式，同时需要说明超时重试的次数与间隔。", i)
    }

    #[test]
    fn test_chunk_without_blank_lines() {
        // 三页文本，只有单个换行
        let text: String = (0..60).map(|i| sentence(i) + "\n").collect();
        let total = text.chars().count();
        assert!(total > CHUNK_CHAR_LIMIT);

        let chunks = chunk_text(&text, CHUNK_CHAR_LIMIT);
        assert!(chunks.len() >= 2);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= CHUNK_CHAR_LIMIT);
        }
        let kept: usize = chunks
            .iter()
            .map(|c| c.replace("\n\n", "").chars().count())
            .sum();
        assert_eq!(kept, total - 60);
    }

    #[test]
    fn test_chunk_sentence_split_on_single_line() {
        let text: String = (0..40).map(sentence).collect();
        let chunks = chunk_text(&text, CHUNK_CHAR_LIMIT);
        assert!(chunks.len() >= 2);
        assert!(chunks[0].ends_with('。'));
    }

    #[test]
    fn test_chunk_counts_joiner_against_limit() {
        // 两个片段正好填满上限，加上分隔就超了
        let text = format!("{}\n\n{}", "甲".repeat(60), "乙".repeat(40));
        let chunks = chunk_text(&text, 100);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.chars().count() <= 100));

        let fits = chunk_text(&text, 102);
        assert_eq!(fits.len(), 1);
        assert_eq!(fits[0].chars().count(), 102);
    }

    #[test]
    fn test_chunk_short_text_uses_default_section() {
        let chunks = chunk_text("很短的文档", CHUNK_CHAR_LIMIT);
        assert_eq!(chunks, vec!["很短的文档".to_string()]);
        assert!(chunk_text("   ", CHUNK_CHAR_LIMIT).is_empty());
    }

    #[test]
    fn test_chunk_hard_splits_oversized_fragment() {
        let text = "字".repeat(3000);
        let chunks = chunk_text(&text, CHUNK_CHAR_LIMIT);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].chars().count(), 600);
    }

    #[test]
    fn test_chunk_outline_sections() {
        let text: String = (0..60).map(|i| sentence(i) + "\n\n").collect();
        let outline = chunk_outline(&text);
        assert!(outline.sections.len() >= 2);
        assert_eq!(outline.metadata.total_sections, outline.sections.len());
        let first = &outline.sections[0];
        assert_eq!(first.id, "fallback_1");
        assert_eq!(first.title, "文档段落 1");
        assert_eq!(first.category, SectionCategory::DocumentContent);
        assert_eq!(first.relevance, Section::uniform_relevance(4.0));
        assert!(outline.document_summary.contains("智能分块"));
    }
}
