use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// AI 提供商
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    DeepSeek,
    Custom,
}

impl Provider {
    /// 从字符串解析提供商
    pub fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Some(Provider::OpenAi),
            "deepseek" => Some(Provider::DeepSeek),
            "custom" => Some(Provider::Custom),
            _ => None,
        }
    }

    /// 内置的接口地址（自定义提供商没有）
    pub fn default_api_url(self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("https://api.openai.com/v1/chat/completions"),
            Provider::DeepSeek => Some("https://api.deepseek.com/v1/chat/completions"),
            Provider::Custom => None,
        }
    }

    /// 内置的模型名称（自定义提供商没有）
    pub fn default_model(self) -> Option<&'static str> {
        match self {
            Provider::OpenAi => Some("gpt-4o-mini"),
            Provider::DeepSeek => Some("deepseek-chat"),
            Provider::Custom => None,
        }
    }

    /// 采样温度：DeepSeek 使用较高的创造性设置，其余接近确定性
    pub fn temperature(self) -> f32 {
        match self {
            Provider::DeepSeek => 0.7,
            _ => 0.2,
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 模型后端配置 ---
    pub provider: Provider,
    pub api_key: String,
    pub custom_api_url: Option<String>,
    pub custom_model: Option<String>,
    /// 普通请求超时（秒）
    pub request_timeout_secs: u64,
    /// 流式请求超时（秒）
    pub stream_timeout_secs: u64,
    // --- 重试策略 ---
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// 单次输出 token 上限
    pub max_output_tokens: u32,
    /// 历史消息总字符数阈值，超过后截断
    pub max_history_chars: usize,
    // --- 流式输出 ---
    pub stream: bool,
    /// 心跳间隔（秒）
    pub keep_alive_secs: u64,
    // --- 批量处理 ---
    /// 待分析文档目录
    pub input_folder: String,
    /// 报告输出目录
    pub output_folder: String,
    /// 同时分析的文档数量
    pub max_concurrent_documents: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: Provider::OpenAi,
            api_key: String::new(),
            custom_api_url: None,
            custom_model: None,
            request_timeout_secs: 120,
            stream_timeout_secs: 180,
            max_attempts: 3,
            retry_base_delay_ms: 1000,
            retry_max_delay_ms: 5000,
            max_output_tokens: 2000,
            max_history_chars: 100_000,
            stream: true,
            keep_alive_secs: 15,
            input_folder: "documents".to_string(),
            output_folder: "reports".to_string(),
            max_concurrent_documents: 4,
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let default = Self::default();
        let provider = match std::env::var("AI_PROVIDER") {
            Ok(v) => Provider::from_str(&v).ok_or(ConfigError::UnknownProvider(v))?,
            Err(_) => default.provider,
        };

        Ok(Self {
            provider,
            api_key: std::env::var("AI_API_KEY").unwrap_or(default.api_key),
            custom_api_url: std::env::var("CUSTOM_API_URL").ok().or(default.custom_api_url),
            custom_model: std::env::var("CUSTOM_MODEL").ok().or(default.custom_model),
            request_timeout_secs: env_parse("REQUEST_TIMEOUT_SECS", default.request_timeout_secs)?,
            stream_timeout_secs: env_parse("STREAM_TIMEOUT_SECS", default.stream_timeout_secs)?,
            max_attempts: env_parse("MAX_ATTEMPTS", default.max_attempts)?,
            retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS", default.retry_base_delay_ms)?,
            retry_max_delay_ms: env_parse("RETRY_MAX_DELAY_MS", default.retry_max_delay_ms)?,
            max_output_tokens: env_parse("MAX_OUTPUT_TOKENS", default.max_output_tokens)?,
            max_history_chars: env_parse("MAX_HISTORY_CHARS", default.max_history_chars)?,
            stream: env_parse("STREAM", default.stream)?,
            keep_alive_secs: env_parse("KEEP_ALIVE_SECS", default.keep_alive_secs)?,
            input_folder: std::env::var("INPUT_FOLDER").unwrap_or(default.input_folder),
            output_folder: std::env::var("OUTPUT_FOLDER").unwrap_or(default.output_folder),
            max_concurrent_documents: env_parse(
                "MAX_CONCURRENT_DOCUMENTS",
                default.max_concurrent_documents,
            )?,
            verbose_logging: env_parse("VERBOSE_LOGGING", default.verbose_logging)?,
        })
    }

    /// 从 TOML 文件加载配置，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", path.display()))?;
        Ok(config)
    }

    /// 校验访问凭证与自定义提供商的必要字段
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey);
        }
        if self.provider == Provider::Custom {
            if self.custom_api_url.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingCustomField {
                    field: "custom_api_url",
                });
            }
            if self.custom_model.as_deref().map_or(true, str::is_empty) {
                return Err(ConfigError::MissingCustomField {
                    field: "custom_model",
                });
            }
        }
        Ok(())
    }

    /// 实际使用的接口地址
    pub fn api_url(&self) -> std::result::Result<String, ConfigError> {
        match self.provider.default_api_url() {
            Some(url) => Ok(url.to_string()),
            None => self
                .custom_api_url
                .clone()
                .filter(|u| !u.is_empty())
                .ok_or(ConfigError::MissingCustomField {
                    field: "custom_api_url",
                }),
        }
    }

    /// 实际使用的模型名称
    pub fn model(&self) -> std::result::Result<String, ConfigError> {
        match self.provider.default_model() {
            Some(model) => Ok(model.to_string()),
            None => self
                .custom_model
                .clone()
                .filter(|m| !m.is_empty())
                .ok_or(ConfigError::MissingCustomField {
                    field: "custom_model",
                }),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_timeout_secs)
    }

    pub fn keep_alive_interval(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }
}

fn env_parse<T: std::str::FromStr>(
    var_name: &str,
    default: T,
) -> std::result::Result<T, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }),
        Err(_) => Ok(default),
    }
}
