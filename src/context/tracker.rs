//! Context Tracker：按轮更新情绪 / 安全 / 信任状态
//!
//! `update` 每轮调用一次，依次推进两条互相独立的衰减轨道：
//! 1. 安全轨道：触发时打开窗口（默认 2 轮）；未触发时倒计时，归零的同一轮清除标志并把情绪强制置为 Calm；
//! 2. 情绪轨道：安全窗口外记录检测到的情绪；低强度情绪启动自己的倒计时，到期回落 Neutral。
//!
//! 信任升级永远是显式调用（`increment_trust`），不会在 `update` 里隐式发生。

use serde::Serialize;

use super::state::{ContextState, Emotion, RelationshipStage, MAX_TRUST, MIN_TRUST};
use crate::config::ContextSection;

/// 回复中抽取的信号（情绪、锚点）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReplySignals {
    pub emotion: Option<Emotion>,
    pub anchor: Option<String>,
    /// 去掉尾标记后的可见文本
    pub text: String,
}

/// 渲染进指令包的上下文快照
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContextSnapshot {
    pub emotion: Emotion,
    pub intensity: f32,
    pub safety_active: bool,
    pub safety_turns_left: u8,
    pub trust_level: u8,
    pub stage: RelationshipStage,
    pub last_topic: Option<String>,
    pub anchor: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ContextTracker {
    config: ContextSection,
}

impl ContextTracker {
    pub fn new(config: ContextSection) -> Self {
        Self { config }
    }

    /// 每轮更新；topic / anchor 为 Some 时覆盖记录
    pub fn update(
        &self,
        state: &mut ContextState,
        emotion: Emotion,
        intensity: f32,
        safety_triggered: bool,
        topic: Option<&str>,
        anchor: Option<&str>,
    ) {
        let safety_closed = self.update_safety_track(state, emotion, intensity, safety_triggered);
        if !safety_triggered && !safety_closed && !state.safety.is_active() {
            self.update_emotion_track(state, emotion, intensity);
        }
        if let Some(topic) = topic {
            state.last_topic = Some(topic.to_string());
        }
        if let Some(anchor) = anchor {
            state.last_anchor_used = Some(anchor.to_string());
        }
    }

    /// 安全轨道；返回 true 表示窗口在本轮关闭
    fn update_safety_track(
        &self,
        state: &mut ContextState,
        emotion: Emotion,
        intensity: f32,
        safety_triggered: bool,
    ) -> bool {
        if safety_triggered {
            state.safety.open(self.config.safety_window_turns);
            state.last_emotion = emotion;
            state.last_intensity = intensity.clamp(0.0, 1.0);
            state.emotion_decay.clear();
            return false;
        }
        if state.safety.tick() {
            state.last_emotion = Emotion::Calm;
            state.last_intensity = 0.0;
            state.emotion_decay.clear();
            tracing::debug!("safety window closed, emotion reset to calm");
            return true;
        }
        false
    }

    /// 情绪轨道：只在安全窗口之外推进
    fn update_emotion_track(&self, state: &mut ContextState, emotion: Emotion, intensity: f32) {
        let intensity = intensity.clamp(0.0, 1.0);
        if emotion != Emotion::Neutral {
            state.last_emotion = emotion;
            state.last_intensity = intensity;
            if intensity < self.config.low_intensity_threshold {
                state.emotion_decay.start(self.config.emotion_decay_turns);
            } else {
                state.emotion_decay.clear();
            }
            return;
        }
        if state.emotion_decay.tick() {
            state.last_emotion = Emotion::Neutral;
            state.last_intensity = 0.0;
        }
    }

    /// 回复后的补充更新：记录锚点与话题；回复给出的情绪只在当前情绪为 Neutral 且不在安全窗口时采纳。
    /// 不推进任何倒计时。
    pub fn apply_reply_signals(
        &self,
        state: &mut ContextState,
        signals: &ReplySignals,
        topic: Option<&str>,
    ) {
        if let Some(anchor) = &signals.anchor {
            state.last_anchor_used = Some(anchor.clone());
        }
        if let Some(topic) = topic {
            state.last_topic = Some(topic.to_string());
        }
        if let Some(emotion) = signals.emotion {
            if !state.safety.is_active()
                && state.last_emotion == Emotion::Neutral
                && emotion != Emotion::Neutral
            {
                state.last_emotion = emotion;
                state.last_intensity = self.config.low_intensity_threshold / 2.0;
                state.emotion_decay.start(self.config.emotion_decay_turns);
            }
        }
    }

    pub fn is_in_safety_mode(&self, state: &ContextState) -> bool {
        state.safety.is_active()
    }

    pub fn relationship_stage(&self, state: &ContextState) -> RelationshipStage {
        RelationshipStage::from_trust(state.trust_level)
    }

    /// 关系演进：距上次变化至少 trust_min_turns 轮且本轮判定为正向互动时 +1；返回是否升级
    pub fn increment_trust(&self, state: &mut ContextState, current_turn: u32, positive: bool) -> bool {
        if !positive || state.trust_level >= MAX_TRUST {
            return false;
        }
        if current_turn.saturating_sub(state.trust_changed_at_turn) < self.config.trust_min_turns {
            return false;
        }
        state.trust_level += 1;
        state.trust_changed_at_turn = current_turn;
        tracing::info!(trust = state.trust_level, "trust level increased");
        true
    }

    /// 管理员覆盖：唯一允许降低信任的入口
    pub fn admin_set_trust(&self, state: &mut ContextState, level: u8, current_turn: u32) {
        state.trust_level = level.clamp(MIN_TRUST, MAX_TRUST);
        state.trust_changed_at_turn = current_turn;
        tracing::warn!(trust = state.trust_level, "trust level overridden by admin");
    }

    pub fn snapshot(&self, state: &ContextState) -> ContextSnapshot {
        ContextSnapshot {
            emotion: state.last_emotion,
            intensity: state.last_intensity,
            safety_active: state.safety.is_active(),
            safety_turns_left: state.safety.turns_left(),
            trust_level: state.trust_level,
            stage: self.relationship_stage(state),
            last_topic: state.last_topic.clone(),
            anchor: state.last_anchor_used.clone(),
        }
    }
}

/// 剥离回复末尾的 `[[emotion:<label>;anchor:<id>]]` 标记
pub fn extract_reply_signals(reply: &str) -> ReplySignals {
    let trimmed = reply.trim_end();
    let Some(start) = trimmed.rfind("[[") else {
        return ReplySignals {
            text: trimmed.to_string(),
            ..Default::default()
        };
    };
    let Some(body) = trimmed[start + 2..].strip_suffix("]]") else {
        return ReplySignals {
            text: trimmed.to_string(),
            ..Default::default()
        };
    };

    let mut signals = ReplySignals {
        text: trimmed[..start].trim_end().to_string(),
        ..Default::default()
    };
    for part in body.split(';') {
        let Some((key, value)) = part.split_once(':') else {
            continue;
        };
        let value = value.trim();
        match key.trim().to_lowercase().as_str() {
            "emotion" => signals.emotion = Emotion::from_label(value),
            "anchor" if !value.is_empty() => signals.anchor = Some(value.to_string()),
            _ => {}
        }
    }
    signals
}
