//! Test helpers shared across MoneyDesk crates.

pub mod clock;
pub mod completion;
pub mod context;
pub mod kb;
pub mod store;

pub use clock::FixedClock;
pub use completion::{FailingCompletion, FixedCompletion, RecordingCompletion};
pub use context::StubFinanceContext;
pub use kb::{StubKnowledgeBase, sample_article, sample_articles};
pub use store::{MemoryConversationStore, MemoryUsageStore, RecordingUsageRecorder};
