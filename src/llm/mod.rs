//! LLM 层：生成客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、嵌入、生成档位路由

pub mod deepseek;
pub mod embedding;
pub mod mock;
pub mod openai;
pub mod router;
pub mod traits;

pub use deepseek::{create_deepseek_client, DEEPSEEK_CHAT};
pub use embedding::{create_embedder_from_config, EmbeddingProvider, OpenAiEmbedder};
pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use router::{GenerationRouter, Profile, ProfileKind, RouteReason};
pub use traits::{GenerationParams, LlmClient, LlmError, RetryConfig, RetryingLlmClient};
