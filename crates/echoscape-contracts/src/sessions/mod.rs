mod crisis_log;
mod store;
mod summary;

pub use crisis_log::{CrisisLog, CrisisRecord};
pub use store::{
    FileSessionStore, MemorySessionStore, Message, Role, Session, SessionPatch, SessionStore,
    Visual, VisualKind,
};
pub use summary::{
    build_summary, detect_themes, write_summary, SessionSummary, DEFAULT_THEME, SUMMARY_METAPHOR,
};
