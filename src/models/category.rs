use serde::{Deserialize, Serialize};

/// 段落分类标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SectionCategory {
    /// 功能需求
    #[serde(rename = "功能需求")]
    FunctionalRequirement,
    /// 设计规范
    #[serde(rename = "设计规范")]
    DesignSpec,
    /// 技术架构
    #[serde(rename = "技术架构")]
    TechnicalArchitecture,
    /// 用户体验
    #[serde(rename = "用户体验")]
    UserExperience,
    /// 数据模型
    #[serde(rename = "数据模型")]
    DataModel,
    /// 业务逻辑
    #[serde(rename = "业务逻辑")]
    BusinessLogic,
    /// 安全要求
    #[serde(rename = "安全要求")]
    SecurityRequirement,
    /// 性能指标
    #[serde(rename = "性能指标")]
    PerformanceMetric,
    /// 测试用例
    #[serde(rename = "测试用例")]
    TestCase,
    /// 部署说明
    #[serde(rename = "部署说明")]
    Deployment,
    /// 维护指南
    #[serde(rename = "维护指南")]
    Maintenance,
    /// 降级分块产生的段落
    #[serde(rename = "文档内容")]
    DocumentContent,
    /// 其他
    #[serde(rename = "其他")]
    Other,
}

impl SectionCategory {
    pub const ALL: [SectionCategory; 13] = [
        SectionCategory::FunctionalRequirement,
        SectionCategory::DesignSpec,
        SectionCategory::TechnicalArchitecture,
        SectionCategory::UserExperience,
        SectionCategory::DataModel,
        SectionCategory::BusinessLogic,
        SectionCategory::SecurityRequirement,
        SectionCategory::PerformanceMetric,
        SectionCategory::TestCase,
        SectionCategory::Deployment,
        SectionCategory::Maintenance,
        SectionCategory::DocumentContent,
        SectionCategory::Other,
    ];

    /// 获取标准名称
    pub fn name(self) -> &'static str {
        match self {
            SectionCategory::FunctionalRequirement => "功能需求",
            SectionCategory::DesignSpec => "设计规范",
            SectionCategory::TechnicalArchitecture => "技术架构",
            SectionCategory::UserExperience => "用户体验",
            SectionCategory::DataModel => "数据模型",
            SectionCategory::BusinessLogic => "业务逻辑",
            SectionCategory::SecurityRequirement => "安全要求",
            SectionCategory::PerformanceMetric => "性能指标",
            SectionCategory::TestCase => "测试用例",
            SectionCategory::Deployment => "部署说明",
            SectionCategory::Maintenance => "维护指南",
            SectionCategory::DocumentContent => "文档内容",
            SectionCategory::Other => "其他",
        }
    }

    /// 精确匹配标准名称
    pub fn from_str(s: &str) -> Option<Self> {
        let s = s.trim();
        Self::ALL.into_iter().find(|c| c.name() == s)
    }

    /// 智能查找分类：先精确匹配，再按包含关系匹配，都不命中归为“其他”
    pub fn find(s: &str) -> Self {
        if let Some(category) = Self::from_str(s) {
            return category;
        }
        let s = s.trim();
        if s.is_empty() {
            return SectionCategory::Other;
        }
        Self::ALL
            .into_iter()
            .find(|c| s.contains(c.name()) || c.name().contains(s))
            .unwrap_or(SectionCategory::Other)
    }
}

impl std::fmt::Display for SectionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_category() {
        assert_eq!(SectionCategory::find("功能需求"), SectionCategory::FunctionalRequirement);
        assert_eq!(SectionCategory::find(" 安全要求与合规 "), SectionCategory::SecurityRequirement);
        assert_eq!(SectionCategory::find("用户体验设计"), SectionCategory::UserExperience);
        assert_eq!(SectionCategory::find("随便写的"), SectionCategory::Other);
        assert_eq!(SectionCategory::find(""), SectionCategory::Other);
    }

    #[test]
    fn test_serde_uses_chinese_names() {
        let json = serde_json::to_string(&SectionCategory::DataModel).unwrap();
        assert_eq!(json, "\"数据模型\"");
    }
}
