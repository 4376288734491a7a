//! 业务能力层（Services）
//!
//! 每个服务只描述"我能做什么"，互相之间不调用，也不关心流程顺序：
//! - `response_extractor` - 从模型输出中提取并修复 JSON
//! - `section_selector` - 按维度挑选相关段落并控制字符预算
//! - `text_source` - 把文档字节变成纯文本

pub mod response_extractor;
pub mod section_selector;
pub mod text_source;

pub use text_source::{PlainTextSource, TextSource};
