pub mod history;
pub mod storage;
pub mod types;

pub use history::ConversationHistory;
pub use storage::{FileStorage, MemoryStorage, Storage, CONTEXT_KEY, HISTORY_KEY};
pub use types::{AudioClip, ContextMessage, Role, Turn};
