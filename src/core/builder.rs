//! 编排器构建器：从配置装配各组件，测试可逐项注入替身

use std::sync::Arc;
use std::time::Duration;

use rand::rngs::StdRng;

use crate::catalog::{
    CatalogError, ContentCatalog, InMemoryRelevanceIndex, RelevanceIndex, ScenarioSelector,
};
use crate::config::AppConfig;
use crate::context::ContextTracker;
use crate::dialogue::DialogueStateMachine;
use crate::guardrail::{Guardrail, Lexicon};
use crate::llm::{
    create_deepseek_client, create_embedder_from_config, EmbeddingProvider, GenerationRouter,
    LlmClient, MockLlmClient, OpenAiClient, RetryConfig, RetryingLlmClient,
};
use crate::prompt::{InstructionCompiler, Persona};
use crate::session::{MemorySessionStore, SessionStore};

use super::error::BuildError;
use super::orchestrator::Orchestrator;
use super::session_supervisor::SupervisorRegistry;

/// 根据配置与环境变量选择生成后端；没有可用 Key 时退回 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let provider = cfg.llm.provider.to_lowercase();
    let has_openai = std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty());
    let has_deepseek = std::env::var("DEEPSEEK_API_KEY").is_ok_and(|k| !k.is_empty());

    if provider == "mock" {
        tracing::info!("Using Mock LLM (configured)");
        return Arc::new(MockLlmClient);
    }
    if provider == "deepseek" && (has_deepseek || has_openai) {
        tracing::info!("Using DeepSeek LLM ({})", cfg.llm.model);
        return Arc::new(create_deepseek_client(&cfg.llm));
    }
    if has_openai {
        tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
        return Arc::new(OpenAiClient::new(
            cfg.llm.base_url.as_deref(),
            &cfg.llm.model,
            None,
        ));
    }
    tracing::warn!("No API key set or provider unknown, using Mock LLM");
    Arc::new(MockLlmClient)
}

pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    store: Option<Arc<dyn SessionStore>>,
    catalog: Option<Arc<ContentCatalog>>,
    relevance: Option<(Arc<dyn EmbeddingProvider>, Arc<dyn RelevanceIndex>)>,
    rng: Option<StdRng>,
    persona: Option<Persona>,
    lexicon: Option<Lexicon>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            store: None,
            catalog: None,
            relevance: None,
            rng: None,
            persona: None,
            lexicon: None,
        }
    }

    /// 替换生成后端（不再套重试包装）
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_catalog(mut self, catalog: Arc<ContentCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    pub fn with_relevance(
        mut self,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn RelevanceIndex>,
    ) -> Self {
        self.relevance = Some((embedder, index));
        self
    }

    /// 场景选择回退用的随机源
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Some(rng);
        self
    }

    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = Some(persona);
        self
    }

    pub fn with_lexicon(mut self, lexicon: Lexicon) -> Self {
        self.lexicon = Some(lexicon);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// app.catalog_path 优先，否则内置目录
    pub fn build_catalog(&self) -> Result<Arc<ContentCatalog>, CatalogError> {
        let catalog = match &self.config.app.catalog_path {
            Some(path) => ContentCatalog::load(path)?,
            None => ContentCatalog::builtin()?,
        };
        Ok(Arc::new(catalog))
    }

    pub fn build_llm(&self) -> Arc<dyn LlmClient> {
        let inner = create_llm_from_config(&self.config);
        let retry = RetryConfig {
            max_attempts: self.config.llm.retry.max_attempts,
            backoff: Duration::from_millis(self.config.llm.retry.backoff_ms),
        };
        Arc::new(RetryingLlmClient::new(inner, retry))
    }

    /// 启用嵌入且有 Key 时为目录建内存索引；失败只告警，选择器走确定性回退
    async fn build_relevance(
        &self,
        catalog: &ContentCatalog,
    ) -> Option<(Arc<dyn EmbeddingProvider>, Arc<dyn RelevanceIndex>)> {
        let embedder = create_embedder_from_config(
            self.config.embedding.enabled,
            self.config.llm.base_url.as_deref(),
            &self.config.embedding.model,
        )?;
        match InMemoryRelevanceIndex::build(catalog, Arc::clone(&embedder)).await {
            Ok(index) => Some((embedder, Arc::new(index) as Arc<dyn RelevanceIndex>)),
            Err(e) => {
                tracing::warn!(error = %e, "relevance index unavailable, using keyword fallback only");
                None
            }
        }
    }

    pub async fn build(mut self) -> Result<Orchestrator, BuildError> {
        let catalog = match self.catalog.take() {
            Some(catalog) => catalog,
            None => self.build_catalog()?,
        };
        let relevance = match self.relevance.take() {
            Some(relevance) => Some(relevance),
            None => self.build_relevance(&catalog).await,
        };
        let llm = match self.llm.take() {
            Some(llm) => llm,
            None => self.build_llm(),
        };
        let store = self.store.take().unwrap_or_else(|| {
            Arc::new(MemorySessionStore::new(self.config.app.history_turns)) as Arc<dyn SessionStore>
        });
        let persona = self
            .persona
            .take()
            .unwrap_or_else(|| Persona::load(self.config.app.persona_path.as_deref()));
        let guardrail = Arc::new(match self.lexicon.take() {
            Some(lexicon) => Guardrail::from_lexicon(&lexicon)?,
            None => Guardrail::new()?,
        });

        let mut selector = ScenarioSelector::new(Arc::clone(&catalog), self.config.selector.clone());
        if let Some(rng) = self.rng.take() {
            selector = selector.with_rng(rng);
        }
        if let Some((embedder, index)) = relevance {
            selector = selector.with_relevance(embedder, index);
        }

        let machine = DialogueStateMachine::new(
            self.config.dialogue.clone(),
            self.config.adult.clone(),
            Arc::new(selector),
        )?;

        tracing::info!(
            items = catalog.len(),
            adult_topics = catalog.adult_topics().len(),
            "orchestrator ready"
        );

        Ok(Orchestrator {
            store,
            catalog,
            guardrail: Arc::clone(&guardrail),
            tracker: ContextTracker::new(self.config.context.clone()),
            machine,
            router: GenerationRouter::new(self.config.router.clone(), guardrail)?,
            compiler: InstructionCompiler::new(persona),
            llm,
            supervisors: SupervisorRegistry::new(),
            generation_timeout: Duration::from_secs(self.config.llm.timeouts.request.max(1)),
            history_messages: self.config.app.generation_history_messages,
        })
    }
}
