//! Mock LLM 客户端（用于离线运行与测试，无需 API）
//!
//! 从指令包中取出动作行（`Action: ...`），与最后一条用户消息拼成回复，便于本地跑通整条编排流程。

use async_trait::async_trait;

use crate::llm::{GenerationParams, LlmClient, LlmError};
use crate::memory::{Message, Role};

/// Mock 客户端：回显当前指令动作与用户最后一条消息
#[derive(Debug, Default)]
pub struct MockLlmClient;

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(
        &self,
        messages: &[Message],
        _params: &GenerationParams,
    ) -> Result<String, LlmError> {
        let action = messages
            .iter()
            .find(|m| m.role == Role::System)
            .and_then(|m| {
                m.content
                    .lines()
                    .find_map(|l| l.trim().strip_prefix("Action:").map(str::trim))
            })
            .unwrap_or("casual_chat");

        let last_user = messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("(no input)");

        Ok(format!("[mock:{action}] You said: {last_user}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_echoes_action_and_input() {
        let messages = vec![
            Message::system("## Priority directive\nAction: ask_name\nAsk for the name."),
            Message::user("hi"),
        ];
        let out = MockLlmClient
            .complete(&messages, &GenerationParams::default())
            .await
            .unwrap();
        assert_eq!(out, "[mock:ask_name] You said: hi");
    }
}
