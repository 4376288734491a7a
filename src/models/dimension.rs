//! 分析维度
//!
//! 每个维度对应阶段 2–4 中的一个阶段，决定该阶段的提示词、输出 token 预算、
//! 内容字符预算以及类别加权表。

use phf::phf_map;
use serde::{Deserialize, Serialize};

use super::category::SectionCategory;

/// 分析维度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DimensionKey {
    /// 设计缺陷检查
    #[serde(rename = "design-defects")]
    DesignDefects,
    /// 逻辑一致性分析
    #[serde(rename = "logical-consistency")]
    LogicalConsistency,
    /// 风险评估
    #[serde(rename = "risk-assessment")]
    RiskAssessment,
}

const DESIGN_AFFINITY: &[SectionCategory] = &[
    SectionCategory::FunctionalRequirement,
    SectionCategory::DesignSpec,
    SectionCategory::UserExperience,
];

const LOGIC_AFFINITY: &[SectionCategory] = &[
    SectionCategory::FunctionalRequirement,
    SectionCategory::DataModel,
    SectionCategory::BusinessLogic,
];

const RISK_AFFINITY: &[SectionCategory] = &[
    SectionCategory::SecurityRequirement,
    SectionCategory::PerformanceMetric,
    SectionCategory::TechnicalArchitecture,
];

/// 相关段落不足时按类别补充的加权表
static CATEGORY_AFFINITY: phf::Map<&'static str, &'static [SectionCategory]> = phf_map! {
    "design-defects" => DESIGN_AFFINITY,
    "logical-consistency" => LOGIC_AFFINITY,
    "risk-assessment" => RISK_AFFINITY,
};

impl DimensionKey {
    /// 按阶段顺序排列的全部维度
    pub const ALL: [DimensionKey; 3] = [
        DimensionKey::DesignDefects,
        DimensionKey::LogicalConsistency,
        DimensionKey::RiskAssessment,
    ];

    /// 稳定的英文标识
    pub fn slug(self) -> &'static str {
        match self {
            DimensionKey::DesignDefects => "design-defects",
            DimensionKey::LogicalConsistency => "logical-consistency",
            DimensionKey::RiskAssessment => "risk-assessment",
        }
    }

    /// 中文名称（同时也是提示词中相关性评分的键）
    pub fn label(self) -> &'static str {
        match self {
            DimensionKey::DesignDefects => "设计缺陷检查",
            DimensionKey::LogicalConsistency => "逻辑一致性分析",
            DimensionKey::RiskAssessment => "风险评估",
        }
    }

    /// 进度事件里使用的阶段名
    pub fn stage_name(self) -> &'static str {
        match self {
            DimensionKey::DesignDefects => "design",
            DimensionKey::LogicalConsistency => "logic",
            DimensionKey::RiskAssessment => "risk",
        }
    }

    /// 阶段编号（阶段 1 为文档结构分析）
    pub fn stage_number(self) -> usize {
        match self {
            DimensionKey::DesignDefects => 2,
            DimensionKey::LogicalConsistency => 3,
            DimensionKey::RiskAssessment => 4,
        }
    }

    /// 该阶段的输出 token 预算
    pub fn max_tokens(self) -> u32 {
        match self {
            DimensionKey::DesignDefects => 3000,
            DimensionKey::LogicalConsistency => 2500,
            DimensionKey::RiskAssessment => 2000,
        }
    }

    /// 送入该阶段的段落内容字符预算
    pub fn content_budget(self) -> usize {
        match self {
            DimensionKey::DesignDefects => 3000,
            DimensionKey::LogicalConsistency => 2500,
            DimensionKey::RiskAssessment => 2000,
        }
    }

    /// 类别加权表
    pub fn affinity_categories(self) -> &'static [SectionCategory] {
        CATEGORY_AFFINITY.get(self.slug()).copied().unwrap_or(&[])
    }

    /// 接受中文名称或英文标识
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|d| d.label() == s || d.slug() == s || d.stage_name() == s)
    }

    /// 智能查找维度（支持模糊匹配）
    pub fn find(s: &str) -> Option<Self> {
        if let Some(dimension) = Self::from_str(s) {
            return Some(dimension);
        }
        let s = s.trim().to_lowercase();
        if s.contains("设计") || s.contains("design") {
            return Some(DimensionKey::DesignDefects);
        }
        if s.contains("逻辑") || s.contains("一致") || s.contains("logic") {
            return Some(DimensionKey::LogicalConsistency);
        }
        if s.contains("风险") || s.contains("risk") {
            return Some(DimensionKey::RiskAssessment);
        }
        None
    }

    /// 多轮对话中该阶段的用户提示词
    pub fn stage_prompt(self, content: &str) -> String {
        let (intro, focus, result_hint) = match self {
            DimensionKey::DesignDefects => (
                "基于已分析的文档结构，请对设计缺陷进行深入分析：",
                "1. UI/UX设计问题\n2. 交互逻辑缺陷\n3. 用户体验问题\n4. 界面一致性问题",
                "详细的设计缺陷分析内容，包括发现的问题和改进建议",
            ),
            DimensionKey::LogicalConsistency => (
                "基于前面所有分析结果，请分析文档的逻辑一致性：",
                "1. 业务逻辑的连贯性\n2. 数据流的一致性\n3. 规则和约束的统一性\n4. 概念定义的一致性",
                "详细的逻辑一致性分析内容，包括发现的矛盾和不一致问题",
            ),
            DimensionKey::RiskAssessment => (
                "基于前面所有分析结果，请进行全面的风险评估：",
                "1. 技术实现风险\n2. 业务逻辑风险\n3. 安全和合规风险\n4. 性能和扩展性风险\n5. 维护和运营风险",
                "详细的风险评估内容，包括风险等级、具体风险描述和缓解措施建议",
            ),
        };

        format!(
            "阶段{}：{}\n\n{}\n\n分析内容：\n{}\n\n请重点关注：\n{}\n\n请返回JSON格式：\n{{\n  \"result\": \"{}\"\n}}",
            self.stage_number(),
            self.label(),
            intro,
            content,
            focus,
            result_hint
        )
    }

    /// 降级流程中的单轮提示词
    pub fn degraded_prompt(self, content: &str) -> String {
        let instruction = match self {
            DimensionKey::DesignDefects => {
                "请基于提供的文档片段分析设计缺陷，重点关注UI/UX和交互逻辑问题。"
            }
            DimensionKey::LogicalConsistency => {
                "请基于提供的文档片段分析逻辑一致性，检查是否存在矛盾或不一致的地方。"
            }
            DimensionKey::RiskAssessment => "请基于提供的文档片段评估潜在风险和技术债务。",
        };
        format!(
            "{}\n\n文档片段:\n{}\n\n请返回：{{\"result\": \"详细分析内容\"}}",
            instruction, content
        )
    }
}

impl std::fmt::Display for DimensionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_affinity_table_covers_every_dimension() {
        for dimension in DimensionKey::ALL {
            assert_eq!(dimension.affinity_categories().len(), 3);
        }
        assert!(DimensionKey::RiskAssessment
            .affinity_categories()
            .contains(&SectionCategory::SecurityRequirement));
    }

    #[test]
    fn test_find_accepts_labels_and_slugs() {
        assert_eq!(DimensionKey::find("设计缺陷检查"), Some(DimensionKey::DesignDefects));
        assert_eq!(DimensionKey::find("risk-assessment"), Some(DimensionKey::RiskAssessment));
        assert_eq!(DimensionKey::find("逻辑一致性"), Some(DimensionKey::LogicalConsistency));
        assert_eq!(DimensionKey::find("性能"), None);
    }

    #[test]
    fn test_stage_prompt_embeds_content() {
        let prompt = DimensionKey::LogicalConsistency.stage_prompt("[登录]\n用户可以登录");
        assert!(prompt.starts_with("阶段3：逻辑一致性分析"));
        assert!(prompt.contains("[登录]\n用户可以登录"));
        assert!(prompt.contains("\"result\""));
    }
}
