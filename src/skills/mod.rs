//! 技能层
//!
//! 四类 Skill Manager：
//! - **base**: 进程内基础工具（`@perstack/base`）
//! - **mcp**: MCP 服务（stdio 子进程 / streamable HTTP / 进程内）
//! - **delegate**: 可委派的其他 Expert
//! - **interactive**: 由人 / UI 回答的工具
//!
//! SkillRegistry 负责按组启动、工具名索引与统一关闭；ToolExecutor 负责单次调用的超时与审计。

pub mod base;
pub mod delegate;
pub mod error;
pub mod executor;
pub mod interactive;
pub mod manager;
pub mod mcp;
pub mod registry;

pub use base::{BaseSkillManager, ATTEMPT_COMPLETION, BASE_SKILL_NAME};
pub use delegate::{delegate_tool_name, DelegateSkillManager};
pub use error::SkillError;
pub use executor::ToolExecutor;
pub use interactive::InteractiveSkillManager;
pub use manager::{SkillKind, SkillManager};
pub use registry::{skill_groups, SkillEventSink, SkillGroup, SkillRegistry};
