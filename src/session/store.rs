//! 会话存储抽象层
//!
//! 替代全局会话表：统一的 get-or-create / load / save / delete 接口注入到编排器，
//! 内存实现用于单进程部署，持久化实现可在不改编排逻辑的前提下替换进来。

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::model::{Session, SessionId};
use crate::context::ContextState;
use crate::memory::ConversationMemory;

/// 一个会话的全部可持久化状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session: Session,
    pub context: ContextState,
    pub history: ConversationMemory,
}

impl SessionRecord {
    pub fn new(id: &str, history_turns: usize) -> Self {
        Self {
            session: Session::new(id),
            context: ContextState::default(),
            history: ConversationMemory::new(history_turns),
        }
    }
}

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 读取会话；不存在时创建并保存一个新会话
    async fn get_or_create(&self, session_id: &str) -> SessionRecord;

    async fn load(&self, session_id: &str) -> Option<SessionRecord>;

    /// 整体写回（一轮成功结束后调用）
    async fn save(&self, record: SessionRecord);

    /// 删除会话；返回是否存在
    async fn delete(&self, session_id: &str) -> bool;

    async fn active_count(&self) -> usize;
}

/// 内存会话存储
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionRecord>>,
    history_turns: usize,
}

impl MemorySessionStore {
    pub fn new(history_turns: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            history_turns,
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(20)
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn get_or_create(&self, session_id: &str) -> SessionRecord {
        if let Some(record) = self.sessions.read().await.get(session_id) {
            return record.clone();
        }
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::info!(session_id, "session created");
                SessionRecord::new(session_id, self.history_turns)
            })
            .clone()
    }

    async fn load(&self, session_id: &str) -> Option<SessionRecord> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn save(&self, record: SessionRecord) {
        self.sessions
            .write()
            .await
            .insert(record.session.id.clone(), record);
    }

    async fn delete(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
