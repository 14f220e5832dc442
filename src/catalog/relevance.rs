//! 语义相关性检索：嵌入向量 + 余弦相似度
//!
//! RelevanceIndex 是外部向量检索后端的接口；InMemoryRelevanceIndex 在启动时为目录中每个内容
//! 计算一次嵌入，查询时线性扫描。后端不可用时返回错误，由选择器降级到确定性回退。

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::content::ContentCatalog;
use crate::llm::{EmbeddingProvider, LlmError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LookupError {
    #[error("relevance index unavailable: {0}")]
    Unavailable(String),

    #[error("relevance lookup timed out")]
    Timeout,

    #[error("embedding failed: {0}")]
    Embedding(#[from] LlmError),
}

/// 一条检索结果
#[derive(Debug, Clone, PartialEq)]
pub struct RelevanceMatch {
    pub content_id: String,
    pub score: f32,
}

/// 相关性检索后端
#[async_trait]
pub trait RelevanceIndex: Send + Sync {
    /// 按相似度降序返回至多 top_k 条，跳过 exclude_ids
    async fn query(
        &self,
        embedding: &[f32],
        exclude_ids: &BTreeSet<String>,
        top_k: usize,
    ) -> Result<Vec<RelevanceMatch>, LookupError>;
}

/// 内存向量索引
pub struct InMemoryRelevanceIndex {
    entries: Vec<(String, Vec<f32>)>,
}

impl InMemoryRelevanceIndex {
    pub fn new(entries: Vec<(String, Vec<f32>)>) -> Self {
        Self { entries }
    }

    /// 为目录中的每个内容计算嵌入；任一失败即整体失败（调用方可不启用语义检索）
    pub async fn build(
        catalog: &ContentCatalog,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self, LookupError> {
        let mut entries = Vec::with_capacity(catalog.len());
        for item in catalog.items() {
            let embedding = embedder.embed(&item.embedding_text()).await?;
            if embedding.is_empty() {
                return Err(LookupError::Unavailable(format!(
                    "empty embedding for '{}'",
                    item.id
                )));
            }
            entries.push((item.id.clone(), embedding));
        }
        tracing::info!(entries = entries.len(), "relevance index built");
        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl RelevanceIndex for InMemoryRelevanceIndex {
    async fn query(
        &self,
        embedding: &[f32],
        exclude_ids: &BTreeSet<String>,
        top_k: usize,
    ) -> Result<Vec<RelevanceMatch>, LookupError> {
        let mut matches: Vec<RelevanceMatch> = self
            .entries
            .iter()
            .filter(|(id, _)| !exclude_ids.contains(id))
            .map(|(id, v)| RelevanceMatch {
                content_id: id.clone(),
                score: cosine_similarity(embedding, v),
            })
            .collect();
        matches.sort_by(|a, b| b.score.total_cmp(&a.score));
        matches.truncate(top_k);
        Ok(matches)
    }
}

/// 余弦相似度；维度不同或零向量时为 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_query_ranks_and_excludes() {
        let index = InMemoryRelevanceIndex::new(vec![
            ("a".into(), vec![1.0, 0.0]),
            ("b".into(), vec![0.7, 0.7]),
            ("c".into(), vec![0.0, 1.0]),
        ]);
        let exclude: BTreeSet<String> = ["a".to_string()].into_iter().collect();
        let out = index.query(&[1.0, 0.1], &exclude, 2).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].content_id, "b");
        assert_eq!(out[1].content_id, "c");
        assert!(out[0].score > out[1].score);
    }
}
