//! 会话监管：每个会话一把轮次锁 + 一个取消令牌
//!
//! 同一会话的消息持锁串行处理（按到达顺序），不同会话互不阻塞。
//! 断开连接时取消该会话的令牌：进行中的外部调用被放弃，本轮不提交任何状态。
//! 监管者与轮次锁在断开后保留，只换上新令牌，所以重连后的消息仍排在未结束的轮次之后。

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, MutexGuard};
use tokio_util::sync::CancellationToken;

/// 单个会话的生命周期管理
#[derive(Debug, Default)]
pub struct SessionSupervisor {
    turn_lock: AsyncMutex<()>,
    /// 当前连接的令牌；断开时取消并替换
    cancel_token: Mutex<CancellationToken>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 等待轮到本条消息；持有返回的 guard 期间独占该会话
    pub async fn begin_turn(&self) -> MutexGuard<'_, ()> {
        self.turn_lock.lock().await
    }

    /// 本轮使用的子令牌；在等锁之前取，断开前排队的消息也会被取消
    pub fn turn_token(&self) -> CancellationToken {
        self.current().child_token()
    }

    /// 取消当前连接的所有轮次，之后发放的令牌来自新的父令牌
    pub fn cancel(&self) {
        let mut token = self.cancel_token.lock().unwrap_or_else(PoisonError::into_inner);
        token.cancel();
        *token = CancellationToken::new();
    }

    pub fn is_cancelled(&self) -> bool {
        self.current().is_cancelled()
    }

    fn current(&self) -> CancellationToken {
        self.cancel_token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// 会话 id -> 监管者
#[derive(Debug, Default)]
pub struct SupervisorRegistry {
    supervisors: Mutex<HashMap<String, Arc<SessionSupervisor>>>,
}

impl SupervisorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_create(&self, session_id: &str) -> Arc<SessionSupervisor> {
        let mut map = self.supervisors.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            map.entry(session_id.to_string())
                .or_insert_with(|| Arc::new(SessionSupervisor::new())),
        )
    }

    /// 取消该会话进行中的轮次；监管者保留，会话不存在时返回 false
    pub fn cancel(&self, session_id: &str) -> bool {
        let supervisor = self
            .supervisors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(session_id)
            .cloned();
        match supervisor {
            Some(supervisor) => {
                supervisor.cancel();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.supervisors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
