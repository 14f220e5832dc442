//! 内容目录：进程启动时加载、运行期只读
//!
//! ContentItem 不可变，以 `Arc` 共享；会话只按 id 引用，不复制内容本身。

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::guardrail::{Rule, RuleSet};

/// 内置目录（编译进二进制）
const BUILTIN_CATALOG: &str = include_str!("../../config/catalog.toml");

/// 引导式教学脚本要求的追问数量
pub const FOLLOWUP_QUESTIONS: usize = 3;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid catalog: {0}")]
    Invalid(String),

    #[error("invalid catalog keyword: {0}")]
    Keyword(#[from] regex::Error),
}

/// 一节课（情境 + 两难 + 追问 + 目标）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: String,
    pub category: String,
    pub title: String,
    pub context: String,
    pub dilemma: String,
    pub questions: Vec<String>,
    pub objective: String,
    /// 声明的适龄范围（不强制）
    pub age_min: u8,
    pub age_max: u8,
}

impl ContentItem {
    /// 用于语义嵌入的文本
    pub fn embedding_text(&self) -> String {
        format!(
            "{} ({}). {} {} {}",
            self.title, self.category, self.context, self.dilemma, self.objective
        )
    }

    /// 第 n 个追问（从 1 开始）
    pub fn question(&self, n: usize) -> Option<&str> {
        n.checked_sub(1)
            .and_then(|i| self.questions.get(i))
            .map(String::as_str)
    }
}

/// 成人科普话题
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdultTopic {
    pub id: String,
    pub title: String,
    pub keywords: Vec<String>,
    pub key_points: Vec<String>,
}

/// 分类关键词（按声明顺序匹配）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryKeywords {
    pub category: String,
    pub keywords: Vec<String>,
}

/// 交给指令编译器渲染的内容块
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievedContent {
    Lesson(Arc<ContentItem>),
    Topic(AdultTopic),
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    items: Vec<ContentItem>,
    #[serde(default)]
    adult_topics: Vec<AdultTopic>,
    #[serde(default)]
    category_keywords: Vec<CategoryKeywords>,
}

/// 只读内容目录，可在会话间并发共享
#[derive(Debug, Clone)]
pub struct ContentCatalog {
    items: Vec<Arc<ContentItem>>,
    by_id: HashMap<String, usize>,
    adult_topics: Vec<AdultTopic>,
    category_keywords: Vec<CategoryKeywords>,
    /// label = category_keywords 下标，按声明顺序求值
    category_rules: RuleSet<usize>,
    /// label = adult_topics 下标
    topic_rules: RuleSet<usize>,
}

impl ContentCatalog {
    pub fn builtin() -> Result<Self, CatalogError> {
        Self::from_toml_str(BUILTIN_CATALOG)
    }

    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let raw = std::fs::read_to_string(path)?;
        let catalog = Self::from_toml_str(&raw)?;
        tracing::info!(
            path = %path.display(),
            items = catalog.len(),
            "content catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, CatalogError> {
        let file: CatalogFile = toml::from_str(raw)?;
        Self::new(file.items, file.adult_topics, file.category_keywords)
    }

    pub fn new(
        items: Vec<ContentItem>,
        adult_topics: Vec<AdultTopic>,
        category_keywords: Vec<CategoryKeywords>,
    ) -> Result<Self, CatalogError> {
        if items.is_empty() {
            return Err(CatalogError::Invalid("catalog has no items".to_string()));
        }
        let mut by_id = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            if item.questions.len() != FOLLOWUP_QUESTIONS {
                return Err(CatalogError::Invalid(format!(
                    "item '{}' has {} follow-up questions, expected {}",
                    item.id,
                    item.questions.len(),
                    FOLLOWUP_QUESTIONS
                )));
            }
            if by_id.insert(item.id.clone(), i).is_some() {
                return Err(CatalogError::Invalid(format!("duplicate item id '{}'", item.id)));
            }
        }
        let mut topic_ids = HashSet::new();
        for topic in &adult_topics {
            if !topic_ids.insert(topic.id.as_str()) {
                return Err(CatalogError::Invalid(format!(
                    "duplicate adult topic id '{}'",
                    topic.id
                )));
            }
        }
        let category_rules = category_keywords
            .iter()
            .enumerate()
            .map(|(i, c)| Rule::new(i, &c.keywords))
            .collect::<Result<Vec<_>, _>>()?;
        let topic_rules = adult_topics
            .iter()
            .enumerate()
            .map(|(i, t)| Rule::new(i, &t.keywords))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            items: items.into_iter().map(Arc::new).collect(),
            by_id,
            adult_topics,
            category_keywords,
            category_rules: RuleSet::new(category_rules),
            topic_rules: RuleSet::new(topic_rules),
        })
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Arc<ContentItem>> {
        self.by_id.get(id).map(|&i| self.items[i].clone())
    }

    pub fn items(&self) -> &[Arc<ContentItem>] {
        &self.items
    }

    /// 未完成的内容（保持目录顺序）
    pub fn available<'a>(
        &'a self,
        completed: &'a BTreeSet<String>,
    ) -> impl Iterator<Item = &'a Arc<ContentItem>> + 'a {
        self.items.iter().filter(move |i| !completed.contains(&i.id))
    }

    pub fn adult_topics(&self) -> &[AdultTopic] {
        &self.adult_topics
    }

    pub fn adult_topic(&self, id: &str) -> Option<&AdultTopic> {
        self.adult_topics.iter().find(|t| t.id == id)
    }

    pub fn category_keywords(&self) -> &[CategoryKeywords] {
        &self.category_keywords
    }

    /// 文本命中的第一个分类
    pub fn match_category(&self, text: &str) -> Option<&str> {
        self.category_rules
            .first_match(text)
            .map(|r| self.category_keywords[r.label].category.as_str())
    }

    /// 文本命中的第一个成人话题
    pub fn match_adult_topic(&self, text: &str) -> Option<&AdultTopic> {
        self.topic_rules
            .first_match(text)
            .map(|r| &self.adult_topics[r.label])
    }
}
