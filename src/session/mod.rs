//! 会话层：数据模型与可替换的会话存储

pub mod model;
pub mod store;

pub use model::{Mode, OnboardingProgress, Session, SessionId};
pub use store::{MemorySessionStore, SessionRecord, SessionStore};
