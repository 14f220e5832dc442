//! 人设：固定身份块 + 按模式切换的语气
//!
//! 身份文本可由 `app.persona_path` 或 config/prompts/persona.md 覆盖，找不到时使用内置文本。

use std::path::Path;

use crate::session::{Mode, Session};

const BUILTIN_IDENTITY: &str = "You are Harbor, a warm and patient safety buddy. You help children learn \
how to stay safe through short stories with tricky choices, and you help parents and caregivers understand \
how to protect children. You never shame, scare or lecture. You never ask for personal details such as \
addresses, school names or photos. You are honest that you are a computer helper if asked.";

/// 回复尾标记说明（由上下文追踪器解析后剥离）
const SIGNAL_TRAILER: &str = "After your reply, on its own line, you may add a hidden tag \
[[emotion:<neutral|curious|worried|scared|sad|excited|hopeful|calm>;anchor:<short-id>]] describing \
the user's apparent emotion and any grounding cue you used.";

#[derive(Debug, Clone)]
pub struct Persona {
    identity: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Persona {
    pub fn builtin() -> Self {
        Self {
            identity: BUILTIN_IDENTITY.to_string(),
        }
    }

    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
        }
    }

    /// 依次尝试显式路径、config/prompts/persona.md、../config/prompts/persona.md
    pub fn load(path: Option<&Path>) -> Self {
        let explicit = path.and_then(|p| match std::fs::read_to_string(p) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(path = %p.display(), error = %e, "persona file unreadable, using default");
                None
            }
        });
        explicit
            .or_else(|| {
                ["config/prompts/persona.md", "../config/prompts/persona.md"]
                    .into_iter()
                    .find_map(|p| std::fs::read_to_string(p).ok())
            })
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .map(Self::new)
            .unwrap_or_else(Self::builtin)
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// 身份 + 模式语气 + 用户信息 + 尾标记说明
    pub fn render(&self, session: &Session) -> String {
        let register = match session.mode {
            Mode::Onboarding => {
                "You are meeting the user for the first time. Keep replies to two short sentences."
            }
            Mode::GuidedTeaching => {
                "You are talking with a young child. Use simple words, short sentences and a playful tone. \
                 Ask one question at a time."
            }
            Mode::OpenTopic => {
                "You are talking with a teenager. Be relaxed and respectful, never childish, and let them lead."
            }
            Mode::AdultTrack => {
                "You are talking with an adult caregiver. Be clear, practical and evidence-informed, \
                 without alarmism."
            }
        };

        let mut out = format!("{}\n\n{}", self.identity, register);
        match (&session.name, session.age()) {
            (Some(name), Some(age)) => out.push_str(&format!("\nThe user's name is {name}, age {age}.")),
            (Some(name), None) => out.push_str(&format!("\nThe user's name is {name}.")),
            _ => {}
        }
        out.push_str("\n\n");
        out.push_str(SIGNAL_TRAILER);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_varies_by_mode_and_includes_user() {
        let persona = Persona::builtin();
        let mut s = Session::new("s");
        let onboarding = persona.render(&s);
        assert!(onboarding.starts_with(BUILTIN_IDENTITY));
        assert!(onboarding.contains("first time"));

        s.name = Some("Sam".into());
        s.declare_age(9);
        s.mode = Mode::GuidedTeaching;
        let kid = persona.render(&s);
        assert!(kid.contains("young child"));
        assert!(kid.contains("Sam, age 9"));
        assert!(kid.contains("[[emotion:"));
    }

    #[test]
    fn test_load_from_file_and_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("persona.md");
        std::fs::write(&path, "  You are Captain Kind.  \n").unwrap();
        assert_eq!(Persona::load(Some(&path)).identity(), "You are Captain Kind.");

        let missing = dir.path().join("nope.md");
        assert_eq!(Persona::load(Some(&missing)).identity(), BUILTIN_IDENTITY);
    }
}
