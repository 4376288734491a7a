use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 文档中没有可分析的文本（致命，直接返回给调用方）
    #[error("文档中没有找到可解析的文本内容")]
    NoExtractableText,
    /// LLM 服务错误
    #[error(transparent)]
    Llm(#[from] LlmError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误 ({path}): {source}")]
    File {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// LLM 上游调用错误
///
/// Display 即为面向用户的提示文案。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlmError {
    /// 认证失败（401/403），不重试
    #[error("{}", auth_message(*status))]
    AuthFailure { status: u16 },
    /// 请求频率限制（429）
    #[error("请求过于频繁，请稍后再试")]
    RateLimited,
    /// 上游不可用（5xx 或连接失败）
    #[error("AI服务暂时不可用，请稍后再试")]
    UpstreamUnavailable { status: Option<u16> },
    /// 请求超时
    #[error("请求超时，请检查网络连接")]
    Timeout,
    /// 上游返回了无法解析的响应
    #[error("AI服务返回了无法解析的响应")]
    MalformedResponse { detail: String },
    /// 未归类的上游错误
    #[error("{}", unclassified_message(*status, detail))]
    Unclassified { status: Option<u16>, detail: String },
    /// 调用方传入了非法请求（例如空消息列表），不重试
    #[error("非法的模型请求: {0}")]
    InvalidRequest(String),
}

impl LlmError {
    /// 是否值得重试
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            LlmError::AuthFailure { .. } | LlmError::InvalidRequest(_)
        )
    }

    /// 根据 HTTP 状态码归类上游错误
    pub fn from_status(status: u16, body: &str) -> Self {
        match status {
            401 | 403 => LlmError::AuthFailure { status },
            429 => LlmError::RateLimited,
            500..=599 => LlmError::UpstreamUnavailable {
                status: Some(status),
            },
            _ => LlmError::Unclassified {
                status: Some(status),
                detail: body.chars().take(200).collect(),
            },
        }
    }
}

fn auth_message(status: u16) -> &'static str {
    if status == 403 {
        "API密钥权限不足"
    } else {
        "API密钥无效或过期"
    }
}

fn unclassified_message(status: Option<u16>, detail: &str) -> String {
    match status {
        Some(code) => format!("AI服务错误 ({})", code),
        None => format!("AI服务请求失败: {}", detail),
    }
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 缺少访问凭证
    #[error("请提供API密钥")]
    MissingApiKey,
    /// 自定义提供商缺少必要字段
    #[error("自定义提供商需要配置 {field}")]
    MissingCustomField { field: &'static str },
    /// 不支持的提供商
    #[error("不支持的AI提供商: {0}")]
    UnknownProvider(String),
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File {
            path: path.into(),
            source,
        }
    }

    /// 是否为致命错误（没有可分析的内容）
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppError::NoExtractableText)
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
