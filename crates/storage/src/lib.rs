pub mod session;

pub use session::{
    ActionEntry, HistoryCaps, LogEntry, NewSession, ReasoningEntry, ScreenshotEntry, Session,
    SessionQuery, SessionStatus, SessionStore, SessionSummary, SessionUpdate, SortDirection,
    SortField,
};
