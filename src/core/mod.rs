//! 核心编排层：错误、事件、会话监管、编排器与构建器

pub mod builder;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod session_supervisor;

pub use builder::{create_llm_from_config, OrchestratorBuilder};
pub use error::{BuildError, OrchestratorError};
pub use events::OutgoingEvent;
pub use orchestrator::Orchestrator;
pub use session_supervisor::{SessionSupervisor, SupervisorRegistry};
