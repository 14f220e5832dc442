//! 指令编译：人设 + 上下文快照 + 内容块 + 优先指令

pub mod compiler;
pub mod persona;

pub use compiler::{InstructionBundle, InstructionCompiler};
pub use persona::Persona;
