//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批量处理和流式会话，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_processor` - 批量文档处理器
//! - 管理应用生命周期（初始化、运行）
//! - 扫描输入目录，控制并发数量（Semaphore）
//! - 每份文档写出一个 JSON 报告
//! - 输出全局统计信息
//!
//! ### `stream_session` - 流式会话
//! - 把进度事件翻译成 SSE 帧
//! - 分析期间定时发送心跳
//! - 消费者断开后停止写入
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor / stream_session (处理文档)
//!     ↓
//! workflow::StageOrchestrator (分阶段分析)
//!     ↓
//! services (能力层：段落挑选 / JSON 提取 / 文本提取)
//!     ↓
//! clients::ModelGateway (重试、流式、历史裁剪)
//!     ↓
//! infrastructure (HTTP 传输、SSE 解码)
//! ```

pub mod batch_processor;
pub mod stream_session;

// 重新导出主要类型
pub use batch_processor::{App, ProcessingStats};
pub use stream_session::{
    send_error, AsyncWriteSink, FrameSink, SessionOutcome, StreamFrame, StreamSession,
    DONE_FRAME, KEEP_ALIVE_FRAME,
};
