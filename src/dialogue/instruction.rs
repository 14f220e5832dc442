//! 指令：状态机每条消息产出一次，描述下一句回复必须完成什么，由指令编译器消费后丢弃

use serde::Serialize;

use crate::guardrail::Intent;

/// 动作标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InstructionAction {
    AskName,
    AskAge,
    Welcome,
    PresentContent,
    AskFollowup,
    ReactAndAsk,
    Synthesize,
    DemonstrateApplication,
    CompleteContent,
    ReEngage,
    RedirectInappropriate,
    AnswerMetaQuestion,
    DeliverCrisisResponse,
    AdultTopicExplain,
    AdultTopicRevisit,
    AdultConversation,
    CasualChat,
}

impl InstructionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstructionAction::AskName => "ask_name",
            InstructionAction::AskAge => "ask_age",
            InstructionAction::Welcome => "welcome",
            InstructionAction::PresentContent => "present_content",
            InstructionAction::AskFollowup => "ask_followup",
            InstructionAction::ReactAndAsk => "react_and_ask",
            InstructionAction::Synthesize => "synthesize",
            InstructionAction::DemonstrateApplication => "demonstrate_application",
            InstructionAction::CompleteContent => "complete_content",
            InstructionAction::ReEngage => "re_engage",
            InstructionAction::RedirectInappropriate => "redirect_inappropriate",
            InstructionAction::AnswerMetaQuestion => "answer_meta_question",
            InstructionAction::DeliverCrisisResponse => "deliver_crisis_response",
            InstructionAction::AdultTopicExplain => "adult_topic_explain",
            InstructionAction::AdultTopicRevisit => "adult_topic_revisit",
            InstructionAction::AdultConversation => "adult_conversation",
            InstructionAction::CasualChat => "casual_chat",
        }
    }

    /// 是否属于教学脚本的某一步
    pub fn is_script_step(&self) -> bool {
        matches!(
            self,
            InstructionAction::PresentContent
                | InstructionAction::AskFollowup
                | InstructionAction::ReactAndAsk
                | InstructionAction::Synthesize
                | InstructionAction::DemonstrateApplication
                | InstructionAction::CompleteContent
        )
    }
}

impl std::fmt::Display for InstructionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 成人科普的行动号召力度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CtaLevel {
    Gentle,
    Suggestive,
    Direct,
}

impl CtaLevel {
    /// 第 n 次（从 0 开始）号召的力度
    pub fn for_issue_count(n: u32) -> Self {
        match n {
            0 => CtaLevel::Gentle,
            1 => CtaLevel::Suggestive,
            _ => CtaLevel::Direct,
        }
    }
}

/// 结构化上下文（日志 / 遥测）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstructionContext {
    pub content_id: Option<String>,
    /// 本轮执行的脚本步数（0 表示不在脚本中）
    pub step_index: u8,
    pub detected_topic: Option<String>,
    pub intent: Intent,
    pub cta: Option<CtaLevel>,
}

impl InstructionContext {
    pub fn new(intent: Intent) -> Self {
        Self {
            content_id: None,
            step_index: 0,
            detected_topic: None,
            intent,
            cta: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instruction {
    pub action: InstructionAction,
    pub directive: String,
    pub context: InstructionContext,
}

impl Instruction {
    pub fn new(action: InstructionAction, directive: impl Into<String>, context: InstructionContext) -> Self {
        Self {
            action,
            directive: directive.into(),
            context,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cta_escalates_and_saturates() {
        assert_eq!(CtaLevel::for_issue_count(0), CtaLevel::Gentle);
        assert_eq!(CtaLevel::for_issue_count(1), CtaLevel::Suggestive);
        assert_eq!(CtaLevel::for_issue_count(2), CtaLevel::Direct);
        assert_eq!(CtaLevel::for_issue_count(9), CtaLevel::Direct);
    }

    #[test]
    fn test_action_serializes_snake_case() {
        let json = serde_json::to_string(&InstructionAction::DeliverCrisisResponse).unwrap();
        assert_eq!(json, "\"deliver_crisis_response\"");
        assert_eq!(InstructionAction::ReEngage.as_str(), "re_engage");
        assert!(InstructionAction::CompleteContent.is_script_step());
        assert!(!InstructionAction::ReEngage.is_script_step());
    }
}
