pub mod format;
pub mod metadata;
pub mod recorder;
pub mod storage;
pub mod store;

pub use format::{format_history, EMPTY_HISTORY};
pub use metadata::{ConversationSession, ConversationTurn, SessionExport, SessionStats};
pub use recorder::{TurnOutcome, TurnRecorder};
pub use storage::ExportWriter;
pub use store::SessionStore;
