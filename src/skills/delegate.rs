//! 委派技能：把一个可委派的 Expert 暴露为一个工具
//!
//! 工具名为去掉 scope 前缀的 Expert key（`@acme/researcher` → `researcher`），输入为 `{query}`。
//! 状态机遇到此类调用会停在 stoppedByDelegate，由委派编排器运行子 Expert，call_tool 不参与执行。

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::model::{Expert, MessagePart, ToolDefinition};
use crate::skills::{SkillError, SkillKind, SkillManager};

/// `@scope/name` → `name`
pub fn delegate_tool_name(expert_key: &str) -> &str {
    match expert_key.rsplit_once('/') {
        Some((_, name)) => name,
        None => expert_key,
    }
}

pub struct DelegateSkillManager {
    expert_key: String,
    definition: ToolDefinition,
}

impl DelegateSkillManager {
    pub fn new(expert: &Expert) -> Self {
        let description = if expert.description.is_empty() {
            format!("Delegate a task to the {} expert.", expert.name)
        } else {
            expert.description.clone()
        };
        Self {
            expert_key: expert.key.clone(),
            definition: ToolDefinition {
                skill_name: expert.key.clone(),
                name: delegate_tool_name(&expert.key).to_string(),
                description,
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "query": { "type": "string", "description": "The task for the expert" }
                    },
                    "required": ["query"]
                }),
                interactive: false,
            },
        }
    }
}

#[async_trait]
impl SkillManager for DelegateSkillManager {
    fn name(&self) -> &str {
        &self.expert_key
    }

    fn kind(&self) -> SkillKind {
        SkillKind::Delegate
    }

    async fn init(&self) -> Result<(), SkillError> {
        Ok(())
    }

    async fn tool_definitions(&self) -> Result<Vec<ToolDefinition>, SkillError> {
        Ok(vec![self.definition.clone()])
    }

    async fn call_tool(&self, _tool_name: &str, _args: Value) -> Result<Vec<MessagePart>, SkillError> {
        Ok(Vec::new())
    }

    async fn close(&self) {}
}
