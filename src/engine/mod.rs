//! 运行引擎：工具分类、状态机、委派编排与入口

pub mod classifier;
pub mod delegation;
pub mod emitter;
pub mod machine;
pub mod runner;
mod states;

pub use classifier::{classify, resolve_calls, ClassifiedCall, ToolBuckets};
pub use delegation::DelegationOutcome;
pub use emitter::Emitter;
pub use machine::{default_should_continue, RunState, ShouldContinue};
pub use runner::Engine;
