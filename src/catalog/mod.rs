//! 内容目录与场景选择

pub mod content;
pub mod relevance;
pub mod selector;

pub use content::{
    AdultTopic, CatalogError, CategoryKeywords, ContentCatalog, ContentItem, RetrievedContent,
};
pub use relevance::{InMemoryRelevanceIndex, LookupError, RelevanceIndex, RelevanceMatch};
pub use selector::{ScenarioSelector, Selection, SelectionRequest, SelectionTier};
