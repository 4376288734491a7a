//! # Doc Quality Analyzer
//!
//! 一个用大模型分阶段审查产品文档质量的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有 HTTP 连接，只暴露能力
//! - `ChatTransport` - 发送补全请求（普通 / 流式）的抽象
//! - `SseDecoder` - 把字节流解码成增量事件
//!
//! ### ② 模型网关（Clients）
//! - `ModelGateway` - 重试退避、流式累积、历史长度裁剪、错误分类
//!
//! ### ③ 业务能力层（Services）
//! - `response_extractor` - 从模型输出中提取并修复 JSON
//! - `section_selector` - 为每个维度挑选最相关的段落
//! - `TextSource` - 从上传的文档中提取纯文本
//!
//! ### ④ 流程层（Workflow）
//! - `StageOrchestrator` - 结构分析 → 三个审查维度，失败时切换到降级流程
//! - `DegradedPipeline` - 分块 + 单轮调用的降级流程
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/batch_processor` - 批量处理目录下的文档
//! - `orchestrator/stream_session` - 把一次分析写成 SSE 帧
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::ModelGateway;
pub use config::{Config, Provider};
pub use error::{AppError, AppResult, ConfigError, LlmError};
pub use models::{AnalysisReport, DimensionKey, Outline};
pub use orchestrator::{App, StreamSession};
pub use workflow::{AnalysisOptions, StageOrchestrator};
