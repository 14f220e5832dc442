//! 护栏层：入站消息的意图 / 情绪 / 安全分类

pub mod interceptor;
pub mod rules;

pub use interceptor::{GuardrailResult, Guardrail, Intent};
pub use rules::{keyword_regex, DangerEntry, EmotionEntry, Lexicon, Rule, RuleSet};
