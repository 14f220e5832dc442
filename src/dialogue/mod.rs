//! 对话状态机：模式切换、教学脚本推进、指令产出

pub mod adult;
pub mod instruction;
pub mod machine;
pub mod onboarding;

pub use adult::{plan_adult_turn, AdultPlan};
pub use instruction::{CtaLevel, Instruction, InstructionAction, InstructionContext};
pub use machine::{DeliveredStep, DialogueStateMachine, StepInput, StepOutcome, FINAL_STEP};
pub use onboarding::{route_by_age, OnboardingParser};
