//! 编排层错误
//!
//! OrchestratorError 是一轮对话的终止性错误：生成失败或本轮被取消。对外以稳定的错误码 + 可读原因呈现，
//! 此时会话状态保持未修改，同一轮可以安全重试。

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::llm::LlmError;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OrchestratorError {
    #[error("generation failed: {0}")]
    Generation(#[from] LlmError),

    #[error("turn cancelled")]
    Cancelled,
}

impl OrchestratorError {
    /// 稳定错误码（随 error 事件下发）
    pub fn code(&self) -> &'static str {
        match self {
            OrchestratorError::Generation(LlmError::Transient(_)) => "generation_transient",
            OrchestratorError::Generation(LlmError::Timeout(_)) => "generation_timeout",
            OrchestratorError::Generation(LlmError::ContentPolicy(_)) => "content_policy",
            OrchestratorError::Generation(LlmError::Unavailable(_)) => "generation_unavailable",
            OrchestratorError::Cancelled => "turn_cancelled",
        }
    }

    /// 面向用户的原因
    pub fn reason(&self) -> &'static str {
        match self {
            OrchestratorError::Generation(LlmError::Transient(_)) => {
                "I had a little hiccup thinking of a reply. Please send that again."
            }
            OrchestratorError::Generation(LlmError::Timeout(_)) => {
                "That took too long to answer. Please try again."
            }
            OrchestratorError::Generation(LlmError::ContentPolicy(_)) => {
                "I can't reply to that one. Let's talk about something else."
            }
            OrchestratorError::Generation(LlmError::Unavailable(_)) => {
                "I'm not able to talk right now. Please try again later."
            }
            OrchestratorError::Cancelled => "The conversation was closed before a reply was ready.",
        }
    }
}

/// 构建编排器失败
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("invalid guardrail pattern: {0}")]
    Pattern(#[from] regex::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_codes_are_stable() {
        let cases = [
            (LlmError::Transient("x".into()), "generation_transient"),
            (LlmError::Timeout(Duration::from_secs(1)), "generation_timeout"),
            (LlmError::ContentPolicy("x".into()), "content_policy"),
            (LlmError::Unavailable("x".into()), "generation_unavailable"),
        ];
        for (err, code) in cases {
            assert_eq!(OrchestratorError::from(err).code(), code);
        }
        assert_eq!(OrchestratorError::Cancelled.code(), "turn_cancelled");
        assert!(!OrchestratorError::Cancelled.reason().is_empty());
    }
}
