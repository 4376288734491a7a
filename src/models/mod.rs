pub mod category;
pub mod dimension;
pub mod message;
pub mod outline;
pub mod report;

pub use category::SectionCategory;
pub use dimension::DimensionKey;
pub use message::{ChatMessage, ConversationHistory, Role};
pub use outline::{Complexity, DocumentType, Outline, OutlineMetadata, Section, StructureKind};
pub use report::{AnalysisReport, StageResult, Usage};
