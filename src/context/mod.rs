//! 上下文层：会话级情绪 / 信任 / 安全状态与其轮次衰减

pub mod state;
pub mod tracker;

pub use state::{ContextState, Emotion, RelationshipStage, SafetyWindow, MAX_TRUST, MIN_TRUST};
pub use tracker::{extract_reply_signals, ContextSnapshot, ContextTracker, ReplySignals};
