//! Instruction Compiler：把编排决策渲染成一次生成调用的指令包
//!
//! 固定顺序：
//! 1. 优先指令块（有指令时；明确声明压过下方一切）
//! 2. 人设块（永远存在）
//! 3. 上下文快照（情绪、强度、安全窗口、信任 / 关系阶段、最近话题、锚点）
//! 4. 零个或多个内容块（无内容时整段省略）
//!
//! 渲染是确定性的：同样的输入得到逐字相同的文本。

use std::fmt::Write as _;

use crate::catalog::RetrievedContent;
use crate::context::ContextSnapshot;
use crate::dialogue::{Instruction, InstructionAction};
use crate::memory::Message;
use crate::session::Session;

use super::persona::Persona;

/// 编译结果
#[derive(Debug, Clone, PartialEq)]
pub struct InstructionBundle {
    pub text: String,
    pub action: Option<InstructionAction>,
}

impl InstructionBundle {
    /// 指令包作为首条 system 消息，其后接近期历史与当前用户消息
    pub fn to_messages(&self, history: &[Message], user_message: &str) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(Message::system(self.text.clone()));
        messages.extend(history.iter().cloned());
        messages.push(Message::user(user_message));
        messages
    }
}

#[derive(Debug, Clone, Default)]
pub struct InstructionCompiler {
    persona: Persona,
}

impl InstructionCompiler {
    pub fn new(persona: Persona) -> Self {
        Self { persona }
    }

    pub fn compile(
        &self,
        session: &Session,
        snapshot: &ContextSnapshot,
        content: &[RetrievedContent],
        instruction: Option<&Instruction>,
    ) -> InstructionBundle {
        let mut sections: Vec<String> = Vec::with_capacity(4);

        if let Some(instruction) = instruction {
            sections.push(render_directive(instruction));
        }
        sections.push(format!("## Persona\n{}", self.persona.render(session)));
        sections.push(render_snapshot(snapshot));
        if !content.is_empty() {
            let blocks: Vec<String> = content.iter().map(render_content).collect();
            sections.push(format!("## Content\n\n{}", blocks.join("\n\n")));
        }
        if instruction.is_some() {
            sections.push(
                "Reminder: the PRIORITY DIRECTIVE at the top takes precedence over every other section."
                    .to_string(),
            );
        }

        InstructionBundle {
            text: sections.join("\n\n"),
            action: instruction.map(|i| i.action),
        }
    }
}

fn render_directive(instruction: &Instruction) -> String {
    let mut out = String::from("## PRIORITY DIRECTIVE (overrides all other instructions)\n");
    let _ = writeln!(out, "Action: {}", instruction.action);
    out.push_str(&instruction.directive);
    out
}

fn render_snapshot(snapshot: &ContextSnapshot) -> String {
    let mut out = String::from("## Conversation context\n");
    let _ = writeln!(
        out,
        "- emotion: {} (intensity {:.2})",
        snapshot.emotion, snapshot.intensity
    );
    if snapshot.safety_active {
        let _ = writeln!(
            out,
            "- safety: ACTIVE ({} turn(s) left), stay gentle and check they are okay",
            snapshot.safety_turns_left
        );
    } else {
        out.push_str("- safety: clear\n");
    }
    let _ = writeln!(
        out,
        "- trust: {}/5 ({})",
        snapshot.trust_level,
        snapshot.stage.as_str()
    );
    let _ = writeln!(
        out,
        "- last topic: {}",
        snapshot.last_topic.as_deref().unwrap_or("none")
    );
    let _ = write!(
        out,
        "- anchor: {}",
        snapshot.anchor.as_deref().unwrap_or("none")
    );
    out
}

fn render_content(content: &RetrievedContent) -> String {
    match content {
        RetrievedContent::Lesson(item) => {
            let mut out = format!("### {}\n", item.title);
            let _ = writeln!(out, "Context: {}", item.context);
            let _ = writeln!(out, "Dilemma: {}", item.dilemma);
            out.push_str("Questions:\n");
            for (i, q) in item.questions.iter().enumerate() {
                let _ = writeln!(out, "{}. {}", i + 1, q);
            }
            let _ = write!(out, "Objective: {}", item.objective);
            out
        }
        RetrievedContent::Topic(topic) => {
            let mut out = format!("### {}\nKey points:", topic.title);
            for point in &topic.key_points {
                let _ = write!(out, "\n- {point}");
            }
            out
        }
    }
}
