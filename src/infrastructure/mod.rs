//! 基础设施层
//!
//! 只持有底层资源（HTTP 连接），只暴露"发请求"和"解码事件流"的能力，
//! 不认识文档、段落或分析阶段。

pub mod sse;
pub mod transport;

pub use sse::{SseDecoder, SseEvent};
pub use transport::{ByteStream, ChatRequest, ChatTransport, HttpTransport, RawReply, StreamReply};
