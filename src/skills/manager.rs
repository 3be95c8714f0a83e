//! Skill Manager 抽象
//!
//! 每个技能（基础工具、MCP 服务、委派 Expert 集合、交互式工具集合）由一个 SkillManager 承载。
//! 引擎只通过 kind() 区分能力，从不向下转型。

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{MessagePart, ToolDefinition};
use crate::skills::SkillError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkillKind {
    Base,
    Mcp,
    Delegate,
    Interactive,
}

impl SkillKind {
    /// 基础工具与 MCP 工具都在 Calling 阶段直接执行
    pub fn is_plain(&self) -> bool {
        matches!(self, Self::Base | Self::Mcp)
    }
}

#[async_trait]
pub trait SkillManager: Send + Sync {
    fn name(&self) -> &str;

    fn kind(&self) -> SkillKind;

    /// 延迟启动：注册时不初始化，首次调用工具时才启动
    fn lazy_init(&self) -> bool {
        false
    }

    /// 幂等
    async fn init(&self) -> Result<(), SkillError>;

    async fn tool_definitions(&self) -> Result<Vec<ToolDefinition>, SkillError>;

    async fn call_tool(&self, tool_name: &str, args: Value) -> Result<Vec<MessagePart>, SkillError>;

    /// 尽力释放资源，不返回错误
    async fn close(&self);
}
