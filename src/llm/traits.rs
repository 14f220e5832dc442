//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / DeepSeek / Mock）实现 LlmClient：按生成参数（温度、长度上限）完成一次对话。
//! RetryingLlmClient 对瞬时错误做有限次重试；内容策略错误不可重试，直接上抛给用户。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::memory::Message;

/// 生成调用失败的分类
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// 网络抖动、限流、5xx 等，可重试
    #[error("transient generation failure: {0}")]
    Transient(String),

    /// 内容策略拒绝，不可重试
    #[error("content policy rejection: {0}")]
    ContentPolicy(String),

    #[error("generation timed out after {0:?}")]
    Timeout(Duration),

    /// 后端未配置或永久不可用
    #[error("generation service unavailable: {0}")]
    Unavailable(String),
}

impl LlmError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LlmError::Transient(_) | LlmError::Timeout(_))
    }
}

/// 生成参数（由 Generation Router 的 Profile 决定）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationParams {
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 400,
        }
    }
}

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成：messages 首条为编译后的指令包（system），其后为近期历史
    async fn complete(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<String, LlmError>;

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 重试策略
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 总尝试次数（含首次）
    pub max_attempts: u32,
    /// 线性退避基数
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(250),
        }
    }
}

/// 带重试的客户端包装：只重试 is_retryable 的错误
pub struct RetryingLlmClient {
    inner: Arc<dyn LlmClient>,
    config: RetryConfig,
}

impl RetryingLlmClient {
    pub fn new(inner: Arc<dyn LlmClient>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl LlmClient for RetryingLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.inner.complete(messages, params).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    tracing::warn!(attempt, error = %e, "generation failed, retrying");
                    tokio::time::sleep(self.config.backoff * attempt).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.inner.token_usage()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyClient {
        calls: AtomicU32,
        fail_times: u32,
        error: LlmError,
    }

    #[async_trait]
    impl LlmClient for FlakyClient {
        async fn complete(
            &self,
            _messages: &[Message],
            _params: &GenerationParams,
        ) -> Result<String, LlmError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_times {
                Err(self.error.clone())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn retry_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            backoff: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let inner = Arc::new(FlakyClient {
            calls: AtomicU32::new(0),
            fail_times: 1,
            error: LlmError::Transient("503".into()),
        });
        let client = RetryingLlmClient::new(inner.clone(), retry_config(3));
        let out = client.complete(&[], &GenerationParams::default()).await;
        assert_eq!(out, Ok("ok".to_string()));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_content_policy_is_not_retried() {
        let inner = Arc::new(FlakyClient {
            calls: AtomicU32::new(0),
            fail_times: 5,
            error: LlmError::ContentPolicy("flagged".into()),
        });
        let client = RetryingLlmClient::new(inner.clone(), retry_config(3));
        let out = client.complete(&[], &GenerationParams::default()).await;
        assert!(matches!(out, Err(LlmError::ContentPolicy(_))));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let inner = Arc::new(FlakyClient {
            calls: AtomicU32::new(0),
            fail_times: 10,
            error: LlmError::Transient("reset".into()),
        });
        let client = RetryingLlmClient::new(inner.clone(), retry_config(2));
        let out = client.complete(&[], &GenerationParams::default()).await;
        assert!(matches!(out, Err(LlmError::Transient(_))));
        assert_eq!(inner.calls.load(Ordering::SeqCst), 2);
    }
}
