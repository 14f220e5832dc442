//! Scenario Selector：把对话信号映射到一个未完成的内容
//!
//! 主路径是带超时的语义检索（嵌入最近对话 + 话题，排除已完成 id，低于相似度下限视为无结果）。
//! 主路径因任何原因没有结果时进入三级确定性回退：
//! 1. 关键词：当前消息与最近几条用户消息（新的优先）命中的分类，在该分类剩余内容中均匀随机；
//! 2. 意图：检测到的意图映射的分类；
//! 3. 全部剩余内容中均匀随机。
//!
//! 随机源可注入（`with_rng`），测试可断言确定性。只有目录全部完成时才返回 None。

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use super::content::{ContentCatalog, ContentItem};
use super::relevance::{LookupError, RelevanceIndex};
use crate::config::SelectorSection;
use crate::guardrail::Intent;
use crate::llm::EmbeddingProvider;
use crate::memory::ConversationMemory;

/// 检索时多取几条，跳过目录里已不存在的 id
const RELEVANCE_TOP_K: usize = 3;

/// 命中的选择层级（用于日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionTier {
    Relevance,
    Keyword,
    Intent,
    Random,
}

impl SelectionTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SelectionTier::Relevance => "relevance",
            SelectionTier::Keyword => "keyword",
            SelectionTier::Intent => "intent",
            SelectionTier::Random => "random",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Selection {
    pub item: Arc<ContentItem>,
    pub tier: SelectionTier,
    /// 仅语义检索命中时有值
    pub score: Option<f32>,
}

/// 一次选择的输入
#[derive(Debug, Clone, Copy)]
pub struct SelectionRequest<'a> {
    pub completed: &'a BTreeSet<String>,
    pub history: &'a ConversationMemory,
    /// 当前消息（尚未写入历史）
    pub message: &'a str,
    pub intent: Intent,
    pub topic: Option<&'a str>,
}

pub struct ScenarioSelector {
    catalog: Arc<ContentCatalog>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<dyn RelevanceIndex>>,
    config: SelectorSection,
    rng: Mutex<StdRng>,
}

impl ScenarioSelector {
    /// 不带语义检索；配置了 seed 时随机回退可复现
    pub fn new(catalog: Arc<ContentCatalog>, config: SelectorSection) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            catalog,
            embedder: None,
            index: None,
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn with_relevance(
        mut self,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn RelevanceIndex>,
    ) -> Self {
        self.embedder = Some(embedder);
        self.index = Some(index);
        self
    }

    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = Mutex::new(rng);
        self
    }

    pub fn catalog(&self) -> &Arc<ContentCatalog> {
        &self.catalog
    }

    pub async fn select(&self, request: &SelectionRequest<'_>) -> Option<Selection> {
        if self.catalog.available(request.completed).next().is_none() {
            tracing::info!("content catalog exhausted for session");
            return None;
        }

        match self.relevance_lookup(request).await {
            Ok(Some(selection)) => return Some(selection),
            Ok(None) => tracing::debug!("no relevance match above floor"),
            Err(e) => tracing::debug!(error = %e, "relevance lookup unavailable, using fallback"),
        }

        let selection = {
            let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
            self.fallback_select(request, &mut *rng)
        };
        if let Some(s) = &selection {
            tracing::info!(
                content_id = %s.item.id,
                tier = s.tier.as_str(),
                "content selected by fallback"
            );
        }
        selection
    }

    async fn relevance_lookup(
        &self,
        request: &SelectionRequest<'_>,
    ) -> Result<Option<Selection>, LookupError> {
        let (Some(embedder), Some(index)) = (&self.embedder, &self.index) else {
            return Err(LookupError::Unavailable("relevance lookup not configured".into()));
        };
        let query = self.query_text(request);
        let lookup = async {
            let embedding = embedder.embed(&query).await?;
            index.query(&embedding, request.completed, RELEVANCE_TOP_K).await
        };
        let timeout = Duration::from_millis(self.config.relevance_timeout_ms);
        let matches = tokio::time::timeout(timeout, lookup)
            .await
            .map_err(|_| LookupError::Timeout)??;

        for m in matches {
            if m.score < self.config.similarity_floor {
                break;
            }
            if request.completed.contains(&m.content_id) {
                continue;
            }
            if let Some(item) = self.catalog.get(&m.content_id) {
                tracing::info!(content_id = %item.id, score = m.score, "content selected by relevance");
                return Ok(Some(Selection {
                    item,
                    tier: SelectionTier::Relevance,
                    score: Some(m.score),
                }));
            }
        }
        Ok(None)
    }

    /// 检索文本：话题 + 当前消息 + 最近用户消息
    fn query_text(&self, request: &SelectionRequest<'_>) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(topic) = request.topic {
            parts.push(topic);
        }
        parts.push(request.message);
        parts.extend(
            request
                .history
                .recent_user_texts(self.config.keyword_window_turns),
        );
        parts.join("\n")
    }

    /// 三级确定性回退
    pub fn fallback_select<R: Rng + ?Sized>(
        &self,
        request: &SelectionRequest<'_>,
        rng: &mut R,
    ) -> Option<Selection> {
        let available: Vec<&Arc<ContentItem>> =
            self.catalog.available(request.completed).collect();
        if available.is_empty() {
            return None;
        }

        let recent = request
            .history
            .recent_user_texts(self.config.keyword_window_turns);
        let keyword_category = std::iter::once(request.message)
            .chain(recent)
            .find_map(|text| self.catalog.match_category(text));
        if let Some(category) = keyword_category {
            if let Some(item) = pick_in_category(&available, category, rng) {
                return Some(Selection {
                    item,
                    tier: SelectionTier::Keyword,
                    score: None,
                });
            }
            tracing::debug!(category, "keyword category exhausted");
        }

        if let Some(category) = self.config.intent_categories.get(request.intent.as_str()) {
            if let Some(item) = pick_in_category(&available, category, rng) {
                return Some(Selection {
                    item,
                    tier: SelectionTier::Intent,
                    score: None,
                });
            }
            tracing::debug!(category = %category, "intent category exhausted");
        }

        available.choose(rng).map(|item| Selection {
            item: Arc::clone(*item),
            tier: SelectionTier::Random,
            score: None,
        })
    }
}

fn pick_in_category<R: Rng + ?Sized>(
    available: &[&Arc<ContentItem>],
    category: &str,
    rng: &mut R,
) -> Option<Arc<ContentItem>> {
    let filtered: Vec<&Arc<ContentItem>> = available
        .iter()
        .copied()
        .filter(|i| i.category == category)
        .collect();
    filtered.choose(rng).map(|item| Arc::clone(*item))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::content::CategoryKeywords;
    use crate::catalog::relevance::InMemoryRelevanceIndex;
    use crate::llm::LlmError;
    use crate::memory::Message;
    use async_trait::async_trait;

    fn item(id: &str, category: &str) -> ContentItem {
        ContentItem {
            id: id.to_string(),
            category: category.to_string(),
            title: id.to_string(),
            context: "c".into(),
            dilemma: "d".into(),
            questions: vec!["q1".into(), "q2".into(), "q3".into()],
            objective: "o".into(),
            age_min: 4,
            age_max: 12,
        }
    }

    fn catalog() -> Arc<ContentCatalog> {
        Arc::new(
            ContentCatalog::new(
                vec![
                    item("stranger_a", "stranger_safety"),
                    item("stranger_b", "stranger_safety"),
                    item("feel_a", "feelings"),
                    item("home_a", "home_safety"),
                ],
                vec![],
                vec![
                    CategoryKeywords {
                        category: "stranger_safety".into(),
                        keywords: vec!["stranger".into(), "lost".into()],
                    },
                    CategoryKeywords {
                        category: "home_safety".into(),
                        keywords: vec!["kitchen".into()],
                    },
                ],
            )
            .unwrap(),
        )
    }

    fn selector() -> ScenarioSelector {
        ScenarioSelector::new(catalog(), SelectorSection::default())
            .with_rng(StdRng::seed_from_u64(7))
    }

    fn request<'a>(
        completed: &'a BTreeSet<String>,
        history: &'a ConversationMemory,
        message: &'a str,
        intent: Intent,
    ) -> SelectionRequest<'a> {
        SelectionRequest {
            completed,
            history,
            message,
            intent,
            topic: None,
        }
    }

    #[tokio::test]
    async fn test_keyword_tier_uses_message_category() {
        let s = selector();
        let completed = BTreeSet::new();
        let history = ConversationMemory::new(5);
        let picked = s
            .select(&request(&completed, &history, "a stranger talked to me", Intent::Conversation))
            .await
            .unwrap();
        assert_eq!(picked.tier, SelectionTier::Keyword);
        assert_eq!(picked.item.category, "stranger_safety");
    }

    #[tokio::test]
    async fn test_keyword_tier_scans_recent_history() {
        let s = selector();
        let completed = BTreeSet::new();
        let mut history = ConversationMemory::new(5);
        history.push(Message::user("we were in the kitchen"));
        history.push(Message::assistant("oh?"));
        let picked = s
            .select(&request(&completed, &history, "tell me more", Intent::Conversation))
            .await
            .unwrap();
        assert_eq!(picked.tier, SelectionTier::Keyword);
        assert_eq!(picked.item.id, "home_a");
    }

    #[tokio::test]
    async fn test_intent_tier_when_no_keyword() {
        let s = selector();
        let completed = BTreeSet::new();
        let history = ConversationMemory::new(5);
        let picked = s
            .select(&request(&completed, &history, "hmm, today", Intent::Emotional))
            .await
            .unwrap();
        assert_eq!(picked.tier, SelectionTier::Intent);
        assert_eq!(picked.item.id, "feel_a");
    }

    #[tokio::test]
    async fn test_exhausted_category_cascades() {
        let s = selector();
        let completed: BTreeSet<String> = ["home_a".to_string(), "feel_a".to_string()]
            .into_iter()
            .collect();
        let history = ConversationMemory::new(5);
        let picked = s
            .select(&request(&completed, &history, "the kitchen", Intent::Emotional))
            .await
            .unwrap();
        assert_eq!(picked.tier, SelectionTier::Random);
        assert_eq!(picked.item.category, "stranger_safety");
    }

    #[tokio::test]
    async fn test_never_returns_completed_and_none_when_exhausted() {
        let s = selector();
        let mut completed = BTreeSet::new();
        let history = ConversationMemory::new(5);
        for _ in 0..4 {
            let picked = s
                .select(&request(&completed, &history, "hello", Intent::Meta))
                .await
                .unwrap();
            assert!(!completed.contains(&picked.item.id));
            completed.insert(picked.item.id.clone());
        }
        assert!(s
            .select(&request(&completed, &history, "hello", Intent::Meta))
            .await
            .is_none());
    }

    #[test]
    fn test_random_tier_is_deterministic_with_seed() {
        let s = selector();
        let completed = BTreeSet::new();
        let history = ConversationMemory::new(5);
        let req = request(&completed, &history, "hello", Intent::Meta);
        let a: Vec<String> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..5)
                .map(|_| s.fallback_select(&req, &mut rng).unwrap().item.id.clone())
                .collect()
        };
        let b: Vec<String> = {
            let mut rng = StdRng::seed_from_u64(42);
            (0..5)
                .map(|_| s.fallback_select(&req, &mut rng).unwrap().item.id.clone())
                .collect()
        };
        assert_eq!(a, b);
    }

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl EmbeddingProvider for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(self.0.clone())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl EmbeddingProvider for FailingEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Err(LlmError::Unavailable("down".into()))
        }
    }

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![1.0, 0.0])
        }
    }

    fn index() -> Arc<dyn RelevanceIndex> {
        Arc::new(InMemoryRelevanceIndex::new(vec![
            ("home_a".into(), vec![1.0, 0.0]),
            ("feel_a".into(), vec![0.0, 1.0]),
        ]))
    }

    #[tokio::test]
    async fn test_relevance_path_above_floor() {
        let s = selector().with_relevance(Arc::new(FixedEmbedder(vec![1.0, 0.05])), index());
        let completed = BTreeSet::new();
        let history = ConversationMemory::new(5);
        let picked = s
            .select(&request(&completed, &history, "a stranger", Intent::Conversation))
            .await
            .unwrap();
        assert_eq!(picked.tier, SelectionTier::Relevance);
        assert_eq!(picked.item.id, "home_a");
    }

    #[tokio::test]
    async fn test_relevance_below_floor_or_completed_falls_back() {
        let s = selector().with_relevance(Arc::new(FixedEmbedder(vec![1.0, 1.0])), index());
        let completed = BTreeSet::new();
        let history = ConversationMemory::new(5);
        let picked = s
            .select(&request(&completed, &history, "a stranger", Intent::Conversation))
            .await
            .unwrap();
        assert_eq!(picked.tier, SelectionTier::Keyword);

        let s = selector().with_relevance(Arc::new(FixedEmbedder(vec![1.0, 0.0])), index());
        let completed: BTreeSet<String> = ["home_a".to_string()].into_iter().collect();
        let picked = s
            .select(&request(&completed, &history, "a stranger", Intent::Conversation))
            .await
            .unwrap();
        assert_ne!(picked.item.id, "home_a");
        assert_eq!(picked.tier, SelectionTier::Keyword);
    }

    #[tokio::test]
    async fn test_unavailable_or_slow_backend_falls_back() {
        let completed = BTreeSet::new();
        let history = ConversationMemory::new(5);

        let s = selector().with_relevance(Arc::new(FailingEmbedder), index());
        let picked = s
            .select(&request(&completed, &history, "a stranger", Intent::Conversation))
            .await
            .unwrap();
        assert_eq!(picked.tier, SelectionTier::Keyword);

        let config = SelectorSection {
            relevance_timeout_ms: 20,
            ..SelectorSection::default()
        };
        let s = ScenarioSelector::new(catalog(), config)
            .with_rng(StdRng::seed_from_u64(1))
            .with_relevance(Arc::new(SlowEmbedder), index());
        let picked = s
            .select(&request(&completed, &history, "a stranger", Intent::Conversation))
            .await
            .unwrap();
        assert_eq!(picked.tier, SelectionTier::Keyword);
    }
}
