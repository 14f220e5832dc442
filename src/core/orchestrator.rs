//! 编排器：一条消息的完整流水线
//!
//! 护栏 → 上下文更新 → 状态机 → （按需）场景选择 → 生成档位路由 → 指令编译 → 外部生成 → 回复后的上下文补充更新。
//!
//! 每轮在会话记录的副本上工作，只有生成成功后才整体写回存储；生成失败或被取消时下发 error 事件，
//! 会话与上下文保持原样，重发同一条消息是安全的。

use std::sync::Arc;
use std::time::Duration;

use crate::catalog::ContentCatalog;
use crate::context::{extract_reply_signals, ContextTracker};
use crate::dialogue::{DialogueStateMachine, StepInput};
use crate::guardrail::Guardrail;
use crate::llm::{GenerationRouter, LlmClient, LlmError};
use crate::memory::Message;
use crate::prompt::InstructionCompiler;
use crate::session::{SessionRecord, SessionStore};

use super::error::OrchestratorError;
use super::events::OutgoingEvent;
use super::session_supervisor::SupervisorRegistry;

pub struct Orchestrator {
    pub(super) store: Arc<dyn SessionStore>,
    pub(super) catalog: Arc<ContentCatalog>,
    pub(super) guardrail: Arc<Guardrail>,
    pub(super) tracker: ContextTracker,
    pub(super) machine: DialogueStateMachine,
    pub(super) router: GenerationRouter,
    pub(super) compiler: InstructionCompiler,
    pub(super) llm: Arc<dyn LlmClient>,
    pub(super) supervisors: SupervisorRegistry,
    pub(super) generation_timeout: Duration,
    /// 生成调用携带的最近消息条数
    pub(super) history_messages: usize,
}

impl Orchestrator {
    /// 处理一条入站消息，返回按顺序下发的事件
    pub async fn handle_message(&self, session_id: &str, message: &str) -> Vec<OutgoingEvent> {
        match self.run_turn(session_id, message).await {
            Ok(events) => events,
            Err(e) => {
                tracing::warn!(session_id, code = e.code(), error = %e, "turn failed, state not committed");
                vec![OutgoingEvent::error(&e)]
            }
        }
    }

    async fn run_turn(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<Vec<OutgoingEvent>, OrchestratorError> {
        let supervisor = self.supervisors.get_or_create(session_id);
        let token = supervisor.turn_token();
        let _turn = supervisor.begin_turn().await;
        if token.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let mut record = self.store.get_or_create(session_id).await;
        let SessionRecord {
            session,
            context,
            history,
        } = &mut record;
        session.turn += 1;

        let guard = self.guardrail.check(
            message,
            self.tracker.is_in_safety_mode(context),
            session.in_lesson(),
        );
        let topic = self.catalog.match_category(message);
        self.tracker.update(
            context,
            guard.emotion,
            guard.intensity,
            guard.safety_triggered,
            topic,
            None,
        );

        let input = StepInput {
            message,
            guard: &guard,
            safety_active: self.tracker.is_in_safety_mode(context),
            history,
            topic,
        };
        let outcome = self.machine.step(session, &input).await;
        if let Some((from, to)) = outcome.transition {
            tracing::info!(session_id, from = %from, to = %to, "mode transition");
        }

        let profile = self.router.route(message, session.mode, session.turn, session.age());
        let snapshot = self.tracker.snapshot(context);
        let bundle = self.compiler.compile(
            session,
            &snapshot,
            &outcome.content,
            Some(&outcome.instruction),
        );
        let messages = bundle.to_messages(history.recent(self.history_messages), message);

        let generation = tokio::time::timeout(
            self.generation_timeout,
            self.llm.complete(&messages, &profile.params),
        );
        let reply = tokio::select! {
            _ = token.cancelled() => return Err(OrchestratorError::Cancelled),
            result = generation => match result {
                Ok(Ok(text)) => text,
                Ok(Err(e)) => return Err(e.into()),
                Err(_) => return Err(LlmError::Timeout(self.generation_timeout).into()),
            },
        };
        if token.is_cancelled() {
            return Err(OrchestratorError::Cancelled);
        }

        let signals = extract_reply_signals(&reply);
        self.tracker
            .apply_reply_signals(context, &signals, outcome.topic.as_deref());
        let positive = !guard.safety_triggered
            && !guard.inappropriate
            && !guard.disengaged
            && guard.emotion.is_positive_or_neutral();
        self.tracker.increment_trust(context, session.turn, positive);

        history.push(Message::user(message));
        history.push(Message::assistant(signals.text.clone()));
        session.touch();

        let mut events = Vec::with_capacity(4);
        if outcome.is_crisis() {
            events.push(OutgoingEvent::SafetyAlert {
                escalate: guard.requires_escalation,
            });
        }
        events.push(OutgoingEvent::StateUpdate {
            mode: session.mode,
            step: session.step_index,
            content_id: session.active_content_id.clone(),
            trust_level: context.trust_level(),
            stage: self.tracker.relationship_stage(context),
            safety_active: self.tracker.is_in_safety_mode(context),
        });
        if let Some(delivered) = &outcome.delivered {
            events.push(OutgoingEvent::ContentDelivered {
                content_id: delivered.content_id.clone(),
                step: delivered.step,
            });
        }
        events.push(OutgoingEvent::Reply {
            text: signals.text,
            profile: profile.kind,
        });

        tracing::info!(
            session_id,
            turn = session.turn,
            mode = %session.mode,
            step = session.step_index,
            action = %outcome.instruction.action,
            total_tokens = self.llm.token_usage().2,
            "turn committed"
        );
        self.store.save(record).await;
        Ok(events)
    }

    /// 连接断开：取消该会话进行中的轮次（不删除会话）
    pub fn disconnect(&self, session_id: &str) -> bool {
        let cancelled = self.supervisors.cancel(session_id);
        if cancelled {
            tracing::info!(session_id, "session disconnected");
        }
        cancelled
    }

    /// 管理员覆盖信任等级；会话不存在时返回 false
    pub async fn admin_set_trust(&self, session_id: &str, level: u8) -> bool {
        let supervisor = self.supervisors.get_or_create(session_id);
        let _turn = supervisor.begin_turn().await;
        let Some(mut record) = self.store.load(session_id).await else {
            return false;
        };
        let turn = record.session.turn;
        self.tracker.admin_set_trust(&mut record.context, level, turn);
        self.store.save(record).await;
        true
    }

    /// 当前已提交的会话记录
    pub async fn session(&self, session_id: &str) -> Option<SessionRecord> {
        self.store.load(session_id).await
    }

    pub fn catalog(&self) -> &Arc<ContentCatalog> {
        &self.catalog
    }
}
