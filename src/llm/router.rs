//! Generation Router：按固定优先级为一次生成选择参数档位
//!
//! 危机词 > 成人轨道 > 技术 / 长文本问题 > 复杂推理 > 默认 expressive。
//! 只依赖显式传入的参数，不读取会话的可变状态。

use std::sync::Arc;

use serde::Serialize;

use super::GenerationParams;
use crate::config::{ProfileSection, RouterSection};
use crate::guardrail::{Guardrail, Rule};
use crate::session::Mode;

/// 生成档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    /// 温暖、偏长的叙事输出
    Expressive,
    /// 简短、克制的精确输出
    HighPrecision,
}

impl ProfileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProfileKind::Expressive => "expressive",
            ProfileKind::HighPrecision => "high_precision",
        }
    }
}

/// 命中的路由规则（用于日志）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteReason {
    Crisis,
    AdultTrack,
    Technical,
    LongForm,
    ComplexReasoning,
    Default,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Profile {
    pub kind: ProfileKind,
    pub reason: RouteReason,
    pub params: GenerationParams,
}

/// 技术类问题关键词
const TECHNICAL_KEYWORDS: &[&str] = &[
    "how does",
    "how do i set",
    "settings",
    "parental controls",
    "privacy settings",
    "password",
    "account",
    "configure",
    "install",
    "block",
    "report",
    "router",
    "vpn",
    "app",
];

/// 复杂推理关键词
const REASONING_KEYWORDS: &[&str] = &[
    "why",
    "explain",
    "compare",
    "difference between",
    "what if",
    "pros and cons",
    "should i",
    "analyze",
    "analyse",
    "reason",
];

pub struct GenerationRouter {
    config: RouterSection,
    guardrail: Arc<Guardrail>,
    technical: Rule<RouteReason>,
    reasoning: Rule<RouteReason>,
}

fn keyword_rule(reason: RouteReason, keywords: &[&str]) -> Result<Rule<RouteReason>, regex::Error> {
    let keywords: Vec<String> = keywords.iter().map(|k| k.to_string()).collect();
    Rule::new(reason, &keywords)
}

impl GenerationRouter {
    pub fn new(config: RouterSection, guardrail: Arc<Guardrail>) -> Result<Self, regex::Error> {
        Ok(Self {
            config,
            guardrail,
            technical: keyword_rule(RouteReason::Technical, TECHNICAL_KEYWORDS)?,
            reasoning: keyword_rule(RouteReason::ComplexReasoning, REASONING_KEYWORDS)?,
        })
    }

    pub fn route(&self, message: &str, mode: Mode, turn: u32, age: Option<u8>) -> Profile {
        let reason = self.classify(message, mode);
        let kind = match reason {
            RouteReason::Default => ProfileKind::Expressive,
            _ => ProfileKind::HighPrecision,
        };
        tracing::debug!(
            profile = kind.as_str(),
            reason = ?reason,
            mode = %mode,
            turn,
            age = ?age,
            "generation profile routed"
        );
        Profile {
            kind,
            reason,
            params: self.params(kind),
        }
    }

    pub fn params(&self, kind: ProfileKind) -> GenerationParams {
        let section: &ProfileSection = match kind {
            ProfileKind::Expressive => &self.config.expressive,
            ProfileKind::HighPrecision => &self.config.high_precision,
        };
        GenerationParams {
            temperature: section.temperature,
            max_tokens: section.max_tokens,
        }
    }

    fn classify(&self, message: &str, mode: Mode) -> RouteReason {
        if self.guardrail.is_danger(message) {
            return RouteReason::Crisis;
        }
        if mode == Mode::AdultTrack {
            return RouteReason::AdultTrack;
        }
        if self.technical.matches(message) {
            return self.technical.label;
        }
        if message.split_whitespace().count() > self.config.long_form_words {
            return RouteReason::LongForm;
        }
        if self.reasoning.matches(message) {
            return self.reasoning.label;
        }
        RouteReason::Default
    }
}
