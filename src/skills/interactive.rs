//! 交互式技能：工具由人 / UI 回答，定义来自配置
//!
//! 状态机遇到此类调用会停在 stoppedByInteractiveTool，调用方带着结果恢复运行。

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;

use crate::model::{InteractiveToolConfig, MessagePart, ToolDefinition};
use crate::skills::{SkillError, SkillKind, SkillManager};

pub struct InteractiveSkillManager {
    name: String,
    tools: Vec<ToolDefinition>,
}

impl InteractiveSkillManager {
    pub fn new(name: impl Into<String>, tools: &HashMap<String, InteractiveToolConfig>) -> Self {
        let name = name.into();
        let mut tools: Vec<ToolDefinition> = tools
            .iter()
            .map(|(tool_name, config)| ToolDefinition {
                skill_name: name.clone(),
                name: tool_name.clone(),
                description: config.description.clone(),
                input_schema: config.input_json_schema.clone(),
                interactive: true,
            })
            .collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        Self { name, tools }
    }
}

#[async_trait]
impl SkillManager for InteractiveSkillManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SkillKind {
        SkillKind::Interactive
    }

    async fn init(&self) -> Result<(), SkillError> {
        Ok(())
    }

    async fn tool_definitions(&self) -> Result<Vec<ToolDefinition>, SkillError> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, _tool_name: &str, _args: Value) -> Result<Vec<MessagePart>, SkillError> {
        Ok(Vec::new())
    }

    async fn close(&self) {}
}
