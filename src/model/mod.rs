//! 数据模型：用量、消息、工具调用、Expert、运行配置、Checkpoint、Step、Job、事件

pub mod checkpoint;
pub mod event;
pub mod expert;
pub mod job;
pub mod message;
pub mod setting;
pub mod step;
pub mod tool;
pub mod usage;

pub use checkpoint::{Checkpoint, CheckpointStatus, DelegatedBy, DelegationTarget};
pub use event::{EngineEvent, RunEvent, RunEventKind, RunFailure, RuntimeEvent, RuntimeEventKind};
pub use expert::{
    tool_allowed, DeclaredTool, Expert, ExpertRef, InteractiveToolConfig, SkillConfig,
};
pub use job::{Job, JobStatus};
pub use message::{MediaSource, Message, MessagePart, Role};
pub use setting::{
    InteractiveToolCallResult, ProviderConfig, ProviderName, ReasoningBudget, ReasoningLevel,
    RunInput, RunSetting,
};
pub use step::Step;
pub use tool::{ToolCall, ToolDefinition, ToolResult};
pub use usage::{context_window, context_window_usage, Usage};
