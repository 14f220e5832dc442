//! 会话数据模型
//!
//! Session 由编排器独占：首条消息时创建，进程生命周期内不删除（淘汰策略由外部决定）。
//! 已完成内容集合只增不减；年龄一旦声明不再修改。

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 会话 ID（由传输层提供）
pub type SessionId = String;

/// 对话模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    #[default]
    Onboarding,
    GuidedTeaching,
    OpenTopic,
    AdultTrack,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Onboarding => "onboarding",
            Mode::GuidedTeaching => "guided_teaching",
            Mode::OpenTopic => "open_topic",
            Mode::AdultTrack => "adult_track",
        }
    }
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 引导阶段进度
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingProgress {
    pub name_requested: bool,
    pub age_requested: bool,
}

/// 单个会话
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub mode: Mode,
    /// 当前教学脚本步数，0 表示没有进行中的内容
    pub step_index: u8,
    pub active_content_id: Option<String>,
    completed_content_ids: BTreeSet<String>,
    /// 已处理的消息数
    pub turn: u32,
    age: Option<u8>,
    pub name: Option<String>,
    /// 成人科普里已讲过的话题（按首次出现顺序）
    pub topics_discussed: Vec<String>,
    pub onboarding: OnboardingProgress,
    /// 没有进行中内容的累计轮数（引导完成或上一个内容结束后开始计）
    pub idle_turns: u32,
    /// 当前内容里连续敷衍回复次数
    pub disengaged_strikes: u8,
    /// 进入成人科普后的轮数
    pub adult_turns: u32,
    /// 已追加的行动号召次数
    pub cta_issued: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<SessionId>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            mode: Mode::Onboarding,
            step_index: 0,
            active_content_id: None,
            completed_content_ids: BTreeSet::new(),
            turn: 0,
            age: None,
            name: None,
            topics_discussed: Vec::new(),
            onboarding: OnboardingProgress::default(),
            idle_turns: 0,
            disengaged_strikes: 0,
            adult_turns: 0,
            cta_issued: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn age(&self) -> Option<u8> {
        self.age
    }

    /// 声明年龄；已声明过时忽略并返回 false
    pub fn declare_age(&mut self, age: u8) -> bool {
        if self.age.is_some() {
            return false;
        }
        self.age = Some(age);
        true
    }

    pub fn completed_content_ids(&self) -> &BTreeSet<String> {
        &self.completed_content_ids
    }

    pub fn is_completed(&self, content_id: &str) -> bool {
        self.completed_content_ids.contains(content_id)
    }

    /// 标记完成（集合只增不减）；返回是否为新 id
    pub fn mark_completed(&mut self, content_id: impl Into<String>) -> bool {
        self.completed_content_ids.insert(content_id.into())
    }

    /// 有进行中的内容且步数非零
    pub fn in_lesson(&self) -> bool {
        self.active_content_id.is_some() && self.step_index > 0
    }

    pub fn has_discussed(&self, topic_id: &str) -> bool {
        self.topics_discussed.iter().any(|t| t == topic_id)
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_age_is_set_once() {
        let mut s = Session::new("s1");
        assert!(s.declare_age(9));
        assert!(!s.declare_age(30));
        assert_eq!(s.age(), Some(9));
    }

    #[test]
    fn test_completed_ids_only_grow() {
        let mut s = Session::new("s1");
        assert!(s.mark_completed("a"));
        assert!(!s.mark_completed("a"));
        assert!(s.mark_completed("b"));
        assert_eq!(s.completed_content_ids().len(), 2);
        assert!(s.is_completed("a"));
    }

    #[test]
    fn test_in_lesson_requires_content_and_step() {
        let mut s = Session::new("s1");
        assert!(!s.in_lesson());
        s.active_content_id = Some("a".into());
        assert!(!s.in_lesson());
        s.step_index = 2;
        assert!(s.in_lesson());
    }
}
