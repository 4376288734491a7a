//! 文档结构（阶段 1）的提示词与校验修复

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::outline::MAX_RELEVANCE;
use crate::models::{
    Complexity, DimensionKey, DocumentType, Outline, OutlineMetadata, Section, SectionCategory,
    StructureKind,
};
use crate::workflow::degraded;

/// 结构分析只看原文前这么多字符
pub const OUTLINE_TEXT_CHARS: usize = 10_000;
/// 结构分析阶段的输出 token 预算
pub const OUTLINE_MAX_TOKENS: u32 = 3000;

/// 缺失评分表时使用的中间分
const NEUTRAL_RELEVANCE: f64 = 5.0;

/// 阶段 1 的用户提示词
pub fn outline_prompt(text: &str) -> String {
    let excerpt: String = text.chars().take(OUTLINE_TEXT_CHARS).collect();
    format!(
        r#"阶段1：文档结构分析

请作为专业的产品文档分析师，深度分析以下文档内容，为后续精确的质量分析做准备。请重点关注文档的逻辑结构、内容完整性和潜在问题点。

分析要求：
1. 识别文档的核心章节和逻辑层次结构
2. 将内容划分为有意义的功能模块或主题段落
3. 为每个段落提供精确的分类标签
4. 评估段落对不同质量分析维度的相关性（0-10分）
5. 考虑文档的上下文关系和依赖性

文档内容：
{excerpt}

请返回精确的JSON结构：
{{
  "document_summary": "文档整体摘要（150字以内，包含文档类型、主要功能、关键特点）",
  "document_type": "产品需求文档|技术设计文档|用户手册|其他",
  "sections": [
    {{
      "id": "section_1",
      "title": "精确的段落标题",
      "content": "段落的完整原文内容",
      "category": "功能需求|设计规范|技术架构|用户体验|数据模型|业务逻辑|安全要求|性能指标|测试用例|部署说明|维护指南|其他",
      "hierarchy_level": 1,
      "word_count": 0,
      "relevance": {{
        "设计缺陷检查": "该段落包含UI/UX设计、交互逻辑、可用性问题的程度（0-10）",
        "逻辑一致性分析": "该段落涉及业务逻辑、数据流、规则一致性的程度（0-10）",
        "风险评估": "该段落涉及技术风险、业务风险、安全隐患的程度（0-10）"
      }},
      "tags": ["标签1", "标签2"],
      "dependencies": ["依赖的其他段落id"]
    }}
  ],
  "metadata": {{
    "total_sections": 0,
    "total_length": 0,
    "document_structure": "层次化|模块化|线性",
    "estimated_complexity": "低|中|高"
  }}
}}

请确保：
- 段落划分具有逻辑完整性，不要随意截断
- 分类标签准确反映段落内容特征
- 相关性评分基于实际内容分析，而非主观判断"#
    )
}

/// 校验并修复模型返回的结构
///
/// 不是对象时退回到智能分块；缺字段时补默认值；每个段落的评分表都会覆盖全部维度。
/// 对已经合法的结构再调用一次得到相同结果。
pub fn validate_outline(value: &Value, original_text: &str) -> Outline {
    let Some(obj) = value.as_object() else {
        warn!("⚠️ 结构分析结果不是JSON对象，改用智能分块");
        return degraded::chunk_outline(original_text);
    };

    let sections: Vec<Section> = match obj.get("sections").and_then(Value::as_array) {
        Some(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| match item.as_object() {
                Some(section) => parse_section(section, i),
                None => recovered_stub(i),
            })
            .collect(),
        None => Vec::new(),
    };

    let document_summary = match obj.get("document_summary").and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => s.to_string(),
        _ if !sections.is_empty() => {
            format!("成功识别文档结构，包含{}个主要段落", sections.len())
        }
        _ => "文档结构分析完成".to_string(),
    };

    let document_type = obj
        .get("document_type")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map_or(DocumentType::ProductDocument, DocumentType::find);

    let metadata = obj.get("metadata").and_then(Value::as_object);
    let structure_kind = metadata
        .and_then(|m| m.get("document_structure"))
        .and_then(Value::as_str)
        .and_then(StructureKind::find)
        .unwrap_or(StructureKind::Modular);
    let complexity = metadata
        .and_then(|m| m.get("estimated_complexity"))
        .and_then(Value::as_str)
        .and_then(Complexity::find)
        .unwrap_or(Complexity::Medium);

    debug!("结构校验完成: {} 个段落", sections.len());

    Outline {
        document_summary,
        document_type,
        metadata: OutlineMetadata {
            total_sections: sections.len(),
            total_length: original_text.chars().count(),
            structure_kind,
            complexity,
        },
        sections,
    }
}

fn parse_section(obj: &Map<String, Value>, index: usize) -> Section {
    let text_field = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
            .filter(|s| !s.trim().is_empty())
    };

    let content = text_field("content").unwrap_or_default();
    let word_count = obj
        .get("word_count")
        .and_then(as_number)
        .filter(|n| *n > 0.0)
        .map(|n| n as usize)
        .unwrap_or_else(|| content.chars().filter(|c| !c.is_whitespace()).count());

    Section {
        id: text_field("id").unwrap_or_else(|| format!("section_{}", index + 1)),
        title: text_field("title").unwrap_or_else(|| format!("段落 {}", index + 1)),
        category: obj
            .get("category")
            .and_then(Value::as_str)
            .map_or(SectionCategory::Other, SectionCategory::find),
        hierarchy_level: obj
            .get("hierarchy_level")
            .and_then(as_number)
            .map_or(1, |n| n.clamp(1.0, 5.0) as u8),
        word_count,
        tags: string_list(obj.get("tags")).into_iter().collect::<BTreeSet<_>>(),
        relevance: parse_relevance(obj.get("relevance")),
        dependencies: string_list(obj.get("dependencies")),
        content,
    }
}

/// 评分表：缺失整张表时所有维度取中间分；表里缺的维度取 0
fn parse_relevance(value: Option<&Value>) -> BTreeMap<DimensionKey, f64> {
    let Some(map) = value.and_then(Value::as_object) else {
        return Section::uniform_relevance(NEUTRAL_RELEVANCE);
    };

    let mut relevance = Section::uniform_relevance(0.0);
    for (key, score) in map {
        if let (Some(dimension), Some(score)) = (DimensionKey::find(key), as_number(score)) {
            relevance.insert(dimension, score.clamp(0.0, MAX_RELEVANCE));
        }
    }
    relevance
}

fn recovered_stub(index: usize) -> Section {
    let content = "内容不可用".to_string();
    Section {
        id: format!("recovered_{}", index + 1),
        title: format!("恢复的段落 {}", index + 1),
        word_count: content.chars().count(),
        content,
        category: SectionCategory::Other,
        hierarchy_level: 1,
        tags: BTreeSet::new(),
        relevance: Section::uniform_relevance(NEUTRAL_RELEVANCE),
        dependencies: Vec::new(),
    }
}

/// 数字或数字字符串（模型经常把分数写成字符串）
fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    n.is_finite().then_some(n)
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEXT: &str = "登录模块：用户通过手机号登录。\n\n支付模块：支持微信支付。";

    #[test]
    fn test_validate_well_formed_outline() {
        let value = json!({
            "document_summary": "电商需求",
            "document_type": "产品需求文档",
            "sections": [{
                "id": "s1",
                "title": "登录",
                "content": "用户通过手机号登录",
                "category": "功能需求",
                "hierarchy_level": 2,
                "word_count": 9,
                "relevance": {"设计缺陷检查": 8, "逻辑一致性分析": "6", "风险评估": 12},
                "tags": ["登录", "账号"],
                "dependencies": ["s2"]
            }],
            "metadata": {"document_structure": "层次化", "estimated_complexity": "高"}
        });

        let outline = validate_outline(&value, TEXT);
        assert_eq!(outline.document_type, DocumentType::ProductRequirements);
        assert_eq!(outline.metadata.total_sections, 1);
        assert_eq!(outline.metadata.total_length, TEXT.chars().count());
        assert_eq!(outline.metadata.structure_kind, StructureKind::Hierarchical);
        assert_eq!(outline.metadata.complexity, Complexity::High);

        let s = &outline.sections[0];
        assert_eq!(s.category, SectionCategory::FunctionalRequirement);
        assert_eq!(s.hierarchy_level, 2);
        assert_eq!(s.relevance_for(DimensionKey::DesignDefects), 8.0);
        assert_eq!(s.relevance_for(DimensionKey::LogicalConsistency), 6.0);
        assert_eq!(s.relevance_for(DimensionKey::RiskAssessment), 10.0);
        assert_eq!(s.dependencies, vec!["s2"]);
    }

    #[test]
    fn test_validate_fills_defaults() {
        let value = json!({
            "sections": [
                "not an object",
                {"content": "只有内容", "relevance": {"风险评估": 3}},
                {"title": "无评分"}
            ]
        });

        let outline = validate_outline(&value, TEXT);
        assert_eq!(outline.document_summary, "成功识别文档结构，包含3个主要段落");
        assert_eq!(outline.document_type, DocumentType::ProductDocument);
        assert_eq!(outline.metadata.structure_kind, StructureKind::Modular);
        assert_eq!(outline.metadata.complexity, Complexity::Medium);

        let stub = &outline.sections[0];
        assert_eq!(stub.id, "recovered_1");
        assert_eq!(stub.relevance, Section::uniform_relevance(5.0));

        let partial = &outline.sections[1];
        assert_eq!(partial.id, "section_2");
        assert_eq!(partial.title, "段落 2");
        assert_eq!(partial.word_count, 4);
        assert_eq!(partial.relevance_for(DimensionKey::DesignDefects), 0.0);
        assert_eq!(partial.relevance_for(DimensionKey::RiskAssessment), 3.0);

        assert_eq!(
            outline.sections[2].relevance,
            Section::uniform_relevance(5.0)
        );
        for section in &outline.sections {
            assert_eq!(section.relevance.len(), DimensionKey::ALL.len());
        }
    }

    #[test]
    fn test_validate_empty_object() {
        let outline = validate_outline(&json!({}), TEXT);
        assert!(outline.sections.is_empty());
        assert_eq!(outline.document_summary, "文档结构分析完成");
    }

    #[test]
    fn test_validate_non_object_uses_chunking() {
        let outline = validate_outline(&json!(["a", "b"]), TEXT);
        assert_eq!(outline.document_type, DocumentType::Generic);
        assert_eq!(outline.metadata.structure_kind, StructureKind::Chunked);
        assert!(!outline.sections.is_empty());
    }

    #[test]
    fn test_validate_is_idempotent() {
        let value = json!({
            "document_summary": "摘要",
            "document_type": "技术设计文档",
            "sections": [
                "broken",
                {"id": "a", "title": "A", "content": "内容", "category": "安全要求",
                 "relevance": {"risk-assessment": 7}, "tags": ["x"]}
            ]
        });
        let first = validate_outline(&value, TEXT);
        let second = validate_outline(&serde_json::to_value(&first).unwrap(), TEXT);
        assert_eq!(first, second);
        assert_eq!(second.sections.len(), 2);
    }

    #[test]
    fn test_outline_prompt_limits_text() {
        let long = "龘".repeat(OUTLINE_TEXT_CHARS + 500);
        let prompt = outline_prompt(&long);
        assert!(prompt.starts_with("阶段1：文档结构分析"));
        assert_eq!(prompt.matches('龘').count(), OUTLINE_TEXT_CHARS);
    }
}
