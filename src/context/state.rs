//! 每个会话的情绪 / 信任 / 安全状态
//!
//! 两条衰减轨道共用一个结构体但各有独立计数器：
//! - 安全窗口（SafetyWindow）：`Option<NonZeroU8>`，构造上保证「标志为真 ⇒ 倒计时 > 0」；
//! - 情绪衰减（EmotionDecay）：低强度情绪在固定窗口后回落到 Neutral。

use std::num::NonZeroU8;

use serde::{Deserialize, Serialize};

/// 情绪标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Emotion {
    #[default]
    Neutral,
    Curious,
    Worried,
    Scared,
    Sad,
    Excited,
    Hopeful,
    Calm,
}

impl Emotion {
    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Neutral => "neutral",
            Emotion::Curious => "curious",
            Emotion::Worried => "worried",
            Emotion::Scared => "scared",
            Emotion::Sad => "sad",
            Emotion::Excited => "excited",
            Emotion::Hopeful => "hopeful",
            Emotion::Calm => "calm",
        }
    }

    /// 解析标签；未知标签返回 None
    pub fn from_label(s: &str) -> Option<Self> {
        let e = match s.trim().to_lowercase().as_str() {
            "neutral" => Emotion::Neutral,
            "curious" => Emotion::Curious,
            "worried" => Emotion::Worried,
            "scared" => Emotion::Scared,
            "sad" => Emotion::Sad,
            "excited" => Emotion::Excited,
            "hopeful" => Emotion::Hopeful,
            "calm" => Emotion::Calm,
            _ => return None,
        };
        Some(e)
    }

    /// 用于信任演进的「正向互动」判断
    pub fn is_positive_or_neutral(&self) -> bool {
        matches!(
            self,
            Emotion::Neutral | Emotion::Curious | Emotion::Excited | Emotion::Hopeful | Emotion::Calm
        )
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 关系阶段：与信任等级一一对应
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationshipStage {
    Cautious,
    Warming,
    Friendly,
    Close,
    Deep,
}

impl RelationshipStage {
    pub fn from_trust(level: u8) -> Self {
        match level {
            0 | 1 => RelationshipStage::Cautious,
            2 => RelationshipStage::Warming,
            3 => RelationshipStage::Friendly,
            4 => RelationshipStage::Close,
            _ => RelationshipStage::Deep,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RelationshipStage::Cautious => "cautious",
            RelationshipStage::Warming => "warming",
            RelationshipStage::Friendly => "friendly",
            RelationshipStage::Close => "close",
            RelationshipStage::Deep => "deep",
        }
    }
}

pub const MIN_TRUST: u8 = 1;
pub const MAX_TRUST: u8 = 5;

/// 安全窗口：Some(n) 表示危机响应窗口还剩 n 轮
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyWindow {
    remaining: Option<NonZeroU8>,
}

impl SafetyWindow {
    /// 打开（或重置）窗口；turns 为 0 时按 1 处理
    pub(super) fn open(&mut self, turns: u8) {
        self.remaining = NonZeroU8::new(turns.max(1));
    }

    /// 倒计时一轮；返回 true 表示窗口恰好在本轮关闭
    pub(super) fn tick(&mut self) -> bool {
        match self.remaining {
            Some(n) => {
                self.remaining = NonZeroU8::new(n.get() - 1);
                self.remaining.is_none()
            }
            None => false,
        }
    }

    pub fn is_active(&self) -> bool {
        self.remaining.is_some()
    }

    pub fn turns_left(&self) -> u8 {
        self.remaining.map(NonZeroU8::get).unwrap_or(0)
    }
}

/// 低强度情绪的衰减倒计时（与安全窗口相互独立）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionDecay {
    remaining: u8,
}

impl EmotionDecay {
    pub(super) fn start(&mut self, turns: u8) {
        self.remaining = turns;
    }

    pub(super) fn clear(&mut self) {
        self.remaining = 0;
    }

    /// 返回 true 表示倒计时在本轮归零
    pub(super) fn tick(&mut self) -> bool {
        if self.remaining == 0 {
            return false;
        }
        self.remaining -= 1;
        self.remaining == 0
    }

    pub fn turns_left(&self) -> u8 {
        self.remaining
    }
}

/// 会话上下文状态（由 ContextTracker 维护）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    pub(super) last_topic: Option<String>,
    pub(super) safety: SafetyWindow,
    pub(super) emotion_decay: EmotionDecay,
    pub(super) last_emotion: Emotion,
    pub(super) last_intensity: f32,
    pub(super) trust_level: u8,
    /// 上次信任变化时的会话轮次
    pub(super) trust_changed_at_turn: u32,
    pub(super) last_anchor_used: Option<String>,
}

impl Default for ContextState {
    fn default() -> Self {
        Self {
            last_topic: None,
            safety: SafetyWindow::default(),
            emotion_decay: EmotionDecay::default(),
            last_emotion: Emotion::Neutral,
            last_intensity: 0.0,
            trust_level: MIN_TRUST,
            trust_changed_at_turn: 0,
            last_anchor_used: None,
        }
    }
}

impl ContextState {
    pub fn last_topic(&self) -> Option<&str> {
        self.last_topic.as_deref()
    }

    pub fn safety_flag(&self) -> bool {
        self.safety.is_active()
    }

    pub fn safety_expiry_turns(&self) -> u8 {
        self.safety.turns_left()
    }

    pub fn emotion_decay_turns(&self) -> u8 {
        self.emotion_decay.turns_left()
    }

    pub fn last_emotion(&self) -> Emotion {
        self.last_emotion
    }

    pub fn last_intensity(&self) -> f32 {
        self.last_intensity
    }

    pub fn trust_level(&self) -> u8 {
        self.trust_level
    }

    pub fn last_anchor_used(&self) -> Option<&str> {
        self.last_anchor_used.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_safety_window_counts_down_and_closes() {
        let mut w = SafetyWindow::default();
        assert!(!w.is_active());
        w.open(2);
        assert_eq!(w.turns_left(), 2);
        assert!(!w.tick());
        assert!(w.is_active());
        assert!(w.tick());
        assert!(!w.is_active());
        assert!(!w.tick());
    }

    #[test]
    fn test_safety_window_zero_turns_still_opens() {
        let mut w = SafetyWindow::default();
        w.open(0);
        assert!(w.is_active());
        assert_eq!(w.turns_left(), 1);
    }

    #[test]
    fn test_stage_is_pure_function_of_trust() {
        let expected = [
            (1, RelationshipStage::Cautious),
            (2, RelationshipStage::Warming),
            (3, RelationshipStage::Friendly),
            (4, RelationshipStage::Close),
            (5, RelationshipStage::Deep),
        ];
        for (level, stage) in expected {
            assert_eq!(RelationshipStage::from_trust(level), stage);
            assert_eq!(RelationshipStage::from_trust(level), stage);
        }
    }

    #[test]
    fn test_state_roundtrips_through_json() {
        let mut state = ContextState::default();
        state.safety.open(2);
        state.last_topic = Some("online_safety".into());
        let json = serde_json::to_string(&state).unwrap();
        let back: ContextState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
        assert!(back.safety_flag());
    }
}
