//! SafeHarbor - 人设约束的对话编排核心
//!
//! 模块划分：
//! - **catalog**: 内容目录、语义相关性检索、场景选择（含三级确定性回退）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **context**: 情绪 / 信任 / 安全窗口状态与轮次衰减
//! - **core**: 编排器、事件、错误、会话监管、构建器
//! - **dialogue**: 对话状态机（引导 / 引导式教学 / 开放话题 / 成人科普）与指令
//! - **guardrail**: 无状态护栏分类器（数据驱动的有序规则表）
//! - **llm**: 生成客户端抽象与实现（OpenAI 兼容 / DeepSeek / Mock）、嵌入、档位路由
//! - **memory**: 短期对话历史
//! - **prompt**: 人设与指令编译
//! - **session**: 会话模型与可替换的会话存储

pub mod catalog;
pub mod config;
pub mod context;
pub mod core;
pub mod dialogue;
pub mod guardrail;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod prompt;
pub mod session;

pub use crate::core::{Orchestrator, OrchestratorBuilder, OutgoingEvent};
