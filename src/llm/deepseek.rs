//! DeepSeek 预设：OpenAI 兼容端点，只换 base_url、Key 与默认模型

use crate::config::LlmSection;
use crate::llm::OpenAiClient;

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";
pub const DEEPSEEK_CHAT: &str = "deepseek-chat";

/// 配置里的模型不是 deepseek-* 时用 deepseek-chat；base_url 未配置时用官方端点
pub fn create_deepseek_client(section: &LlmSection) -> OpenAiClient {
    let api_key = std::env::var("DEEPSEEK_API_KEY")
        .ok()
        .filter(|k| !k.is_empty())
        .or_else(|| std::env::var("OPENAI_API_KEY").ok());

    let base_url = section.base_url.as_deref().unwrap_or(DEEPSEEK_BASE_URL);

    OpenAiClient::new(Some(base_url), deepseek_model(&section.model), api_key.as_deref())
}

fn deepseek_model(configured: &str) -> &str {
    if configured.starts_with("deepseek") {
        configured
    } else {
        DEEPSEEK_CHAT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_selection() {
        assert_eq!(deepseek_model("gpt-4o-mini"), DEEPSEEK_CHAT);
        assert_eq!(deepseek_model("deepseek-reasoner"), "deepseek-reasoner");
    }
}
