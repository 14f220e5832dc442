//! 成人科普轨道：按话题驱动，不走教学脚本
//!
//! 每轮识别一个成人话题：没讲过的展开讲解，讲过的在已有基础上延伸（不逐字重复），识别不到则自由对话。
//! 达到最少轮数与最少话题数后，每隔 cta_interval 轮追加一次行动号召，力度逐次升级。

use crate::catalog::{AdultTopic, ContentCatalog};
use crate::config::AdultSection;
use crate::session::Session;

use super::instruction::{CtaLevel, InstructionAction};

/// 一轮成人科普的计划
#[derive(Debug, Clone, PartialEq)]
pub struct AdultPlan {
    pub action: InstructionAction,
    pub topic: Option<AdultTopic>,
    pub cta: Option<CtaLevel>,
}

/// 计算本轮计划并推进会话里的成人轨道计数（adult_turns / topics_discussed / cta_issued）
pub fn plan_adult_turn(
    session: &mut Session,
    catalog: &ContentCatalog,
    message: &str,
    config: &AdultSection,
) -> AdultPlan {
    session.adult_turns += 1;

    let topic = catalog.match_adult_topic(message).cloned();
    let action = match &topic {
        Some(t) if session.has_discussed(&t.id) => InstructionAction::AdultTopicRevisit,
        Some(t) => {
            session.topics_discussed.push(t.id.clone());
            InstructionAction::AdultTopicExplain
        }
        None => InstructionAction::AdultConversation,
    };

    let cta = cta_due(session, config).then(|| {
        let level = CtaLevel::for_issue_count(session.cta_issued);
        session.cta_issued += 1;
        level
    });

    AdultPlan { action, topic, cta }
}

fn cta_due(session: &Session, config: &AdultSection) -> bool {
    if session.adult_turns < config.min_turns || session.topics_discussed.len() < config.min_topics {
        return false;
    }
    let interval = config.cta_interval.max(1);
    (session.adult_turns - config.min_turns) % interval == 0
}

pub fn cta_directive(level: CtaLevel) -> &'static str {
    match level {
        CtaLevel::Gentle => {
            "Close with a gentle, optional suggestion that they could share one idea from today with their child."
        }
        CtaLevel::Suggestive => {
            "Close by suggesting a concrete next step: plan a short safety conversation with their child this week."
        }
        CtaLevel::Direct => {
            "Close with a clear call to action: have the safety conversation today, and reach out to a local child protection service if anything worries them."
        }
    }
}
