//! 嵌入 API：供内容目录的语义相关性检索使用，调用 OpenAI 兼容的 /embeddings 端点

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::openai::endpoint_config;
use crate::llm::LlmError;

/// 嵌入提供方：将文本编码为向量
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    /// 与生成后端共用 base_url；Key 缺省读 OPENAI_API_KEY
    pub fn new(base_url: Option<&str>, model: &str, api_key: Option<&str>) -> Self {
        Self {
            client: Client::with_config(endpoint_config(base_url, api_key)),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| LlmError::Unavailable(e.to_string()))?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| LlmError::Transient(e.to_string()))?;
        Ok(response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .unwrap_or_default())
    }
}

/// 从应用配置创建嵌入提供方；未启用或没有 API Key 时返回 None（检索走确定性回退）
pub fn create_embedder_from_config(
    enabled: bool,
    base_url: Option<&str>,
    model: &str,
) -> Option<Arc<dyn EmbeddingProvider>> {
    if !enabled {
        tracing::debug!("embedding disabled by config");
        return None;
    }
    let key = std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty());
    let Some(key) = key else {
        tracing::debug!("embedding skipped: no OPENAI_API_KEY");
        return None;
    };
    Some(Arc::new(OpenAiEmbedder::new(base_url, model, Some(&key))))
}
