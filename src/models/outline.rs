use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::category::SectionCategory;
use super::dimension::DimensionKey;

/// 相关性评分上限
pub const MAX_RELEVANCE: f64 = 10.0;

/// 文档段落
///
/// 由结构分析阶段或降级分块产生，创建后不再修改。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub id: String,
    pub title: String,
    pub content: String,
    pub category: SectionCategory,
    /// 层级（1–5）
    pub hierarchy_level: u8,
    pub word_count: usize,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// 各维度相关性评分（0–10）
    pub relevance: BTreeMap<DimensionKey, f64>,
    /// 依赖的其他段落 id
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,
}

impl Section {
    /// 指定维度的评分，缺失视为 0
    pub fn relevance_for(&self, dimension: DimensionKey) -> f64 {
        self.relevance.get(&dimension).copied().unwrap_or(0.0)
    }

    /// 所有维度都使用同一个评分
    pub fn uniform_relevance(score: f64) -> BTreeMap<DimensionKey, f64> {
        DimensionKey::ALL.into_iter().map(|d| (d, score)).collect()
    }
}

/// 文档类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DocumentType {
    #[serde(rename = "产品需求文档")]
    ProductRequirements,
    #[serde(rename = "技术设计文档")]
    TechnicalDesign,
    #[serde(rename = "用户手册")]
    UserManual,
    #[serde(rename = "产品文档")]
    ProductDocument,
    /// 降级分块使用的通用类型
    #[serde(rename = "文档")]
    Generic,
    #[serde(rename = "其他")]
    Other,
}

impl DocumentType {
    pub fn name(self) -> &'static str {
        match self {
            DocumentType::ProductRequirements => "产品需求文档",
            DocumentType::TechnicalDesign => "技术设计文档",
            DocumentType::UserManual => "用户手册",
            DocumentType::ProductDocument => "产品文档",
            DocumentType::Generic => "文档",
            DocumentType::Other => "其他",
        }
    }

    pub fn find(s: &str) -> Self {
        let s = s.trim();
        if s.contains("需求") {
            DocumentType::ProductRequirements
        } else if s.contains("设计") {
            DocumentType::TechnicalDesign
        } else if s.contains("手册") {
            DocumentType::UserManual
        } else if s == "产品文档" {
            DocumentType::ProductDocument
        } else if s == "文档" {
            DocumentType::Generic
        } else {
            DocumentType::Other
        }
    }
}

/// 文档组织方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StructureKind {
    #[serde(rename = "层次化")]
    Hierarchical,
    #[serde(rename = "模块化")]
    Modular,
    #[serde(rename = "线性")]
    Linear,
    #[serde(rename = "智能分块")]
    Chunked,
}

impl StructureKind {
    pub fn find(s: &str) -> Option<Self> {
        match s.trim() {
            "层次化" => Some(StructureKind::Hierarchical),
            "模块化" => Some(StructureKind::Modular),
            "线性" => Some(StructureKind::Linear),
            "智能分块" => Some(StructureKind::Chunked),
            _ => None,
        }
    }
}

/// 复杂度评估
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Complexity {
    #[serde(rename = "低")]
    Low,
    #[serde(rename = "中")]
    Medium,
    #[serde(rename = "高")]
    High,
}

impl Complexity {
    pub fn find(s: &str) -> Option<Self> {
        match s.trim() {
            "低" => Some(Complexity::Low),
            "中" => Some(Complexity::Medium),
            "高" => Some(Complexity::High),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutlineMetadata {
    pub total_sections: usize,
    /// 原文字符数
    pub total_length: usize,
    #[serde(rename = "document_structure")]
    pub structure_kind: StructureKind,
    #[serde(rename = "estimated_complexity")]
    pub complexity: Complexity,
}

/// 文档结构
///
/// 每次分析只有一个，由阶段 1 或降级分块产生，后续阶段只读。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outline {
    pub document_summary: String,
    pub document_type: DocumentType,
    pub sections: Vec<Section>,
    pub metadata: OutlineMetadata,
}

impl Outline {
    pub fn section_by_id(&self, id: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == id)
    }

    /// 人类可读的结构摘要：摘要、段落数量和前 5 个段落
    pub fn structure_digest(&self) -> String {
        let mut digest = format!(
            "📄 文档摘要：{}\n\n📊 分析结果：共识别{}个段落\n\n主要段落：\n",
            self.document_summary,
            self.sections.len()
        );
        let listed: Vec<String> = self
            .sections
            .iter()
            .take(5)
            .map(|s| format!("• {} ({})", s.title, s.category))
            .collect();
        digest.push_str(&listed.join("\n"));
        if self.sections.len() > 5 {
            digest.push_str(&format!("\n...还有{}个段落", self.sections.len() - 5));
        }
        digest
    }
}
