//! 流程层（Workflow）
//!
//! 定义"一份文档"的完整分析流程：
//! - `staged_analysis` - 四阶段状态机（结构 → 设计 → 逻辑 → 风险）
//! - `outline` - 阶段 1 的提示词与结构校验修复
//! - `degraded` - 智能分块与单轮降级分析
//! - `progress` - 进度事件与输出接口

pub mod degraded;
pub mod outline;
pub mod progress;
pub mod staged_analysis;

pub use degraded::DegradedPipeline;
pub use outline::validate_outline;
pub use progress::{ChannelProgressSink, NoopSink, ProgressEvent, ProgressSink};
pub use staged_analysis::{AnalysisOptions, StageFailure, StageOrchestrator, StageState};
