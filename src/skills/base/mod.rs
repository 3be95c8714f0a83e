//! 基础技能 `@perstack/base`
//!
//! 进程内工具，无 IPC：attemptCompletion / think / todo / clearTodo、沙箱文件工具与 exec。
//! 参数 schema 由 schemars 从参数结构体派生。

mod exec;
mod filesystem;
mod todo;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::model::{tool_allowed, MessagePart, ToolDefinition};
use crate::skills::{SkillError, SkillKind, SkillManager};

pub use exec::ExecTool;
pub use filesystem::{
    GetFileInfoTool, ListDirectoryTool, ReadTextFileTool, SafeFs, WriteTextFileTool,
};
pub use todo::{AttemptCompletionTool, ClearTodoTool, ThinkTool, TodoList, TodoTool};

pub const BASE_SKILL_NAME: &str = "@perstack/base";
pub const ATTEMPT_COMPLETION: &str = "attemptCompletion";

/// 基础工具：名称、描述、参数 schema、异步执行
#[async_trait]
pub trait BaseTool: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn input_schema(&self) -> Value;

    async fn execute(&self, args: Value) -> Result<Vec<MessagePart>, SkillError>;
}

/// 从参数结构体派生 JSON Schema（去掉 $schema / title，模型不需要）
pub fn input_schema<T: JsonSchema>() -> Value {
    let schema = schemars::schema_for!(T);
    let mut value = serde_json::to_value(schema).unwrap_or_else(|_| serde_json::json!({"type": "object"}));
    if let Value::Object(map) = &mut value {
        map.remove("$schema");
        map.remove("title");
    }
    value
}

pub fn parse_args<T: DeserializeOwned>(tool: &str, args: Value) -> Result<T, SkillError> {
    serde_json::from_value(args)
        .map_err(|e| SkillError::Execution(format!("invalid arguments for {tool}: {e}")))
}

pub struct BaseSkillManager {
    tools: Vec<Arc<dyn BaseTool>>,
}

impl BaseSkillManager {
    /// workspace 为文件工具的沙箱根；env 为 exec 子进程可见的环境变量
    pub fn new(workspace: impl Into<PathBuf>, env: HashMap<String, String>, exec_timeout: Duration) -> Self {
        let workspace = workspace.into();
        let fs = SafeFs::new(&workspace);
        let todos = TodoList::default();
        let tools: Vec<Arc<dyn BaseTool>> = vec![
            Arc::new(AttemptCompletionTool::new(todos.clone())),
            Arc::new(ThinkTool),
            Arc::new(TodoTool::new(todos.clone())),
            Arc::new(ClearTodoTool::new(todos)),
            Arc::new(ReadTextFileTool::new(fs.clone())),
            Arc::new(WriteTextFileTool::new(fs.clone())),
            Arc::new(ListDirectoryTool::new(fs.clone())),
            Arc::new(GetFileInfoTool::new(fs)),
            Arc::new(ExecTool::new(workspace, env, exec_timeout)),
        ];
        Self { tools }
    }

    /// pick / omit 过滤；attemptCompletion 始终保留
    pub fn with_filter(mut self, pick: &[String], omit: &[String]) -> Self {
        self.tools
            .retain(|t| t.name() == ATTEMPT_COMPLETION || tool_allowed(t.name(), pick, omit));
        self
    }

    fn tool(&self, name: &str) -> Option<&Arc<dyn BaseTool>> {
        self.tools.iter().find(|t| t.name() == name)
    }
}

#[async_trait]
impl SkillManager for BaseSkillManager {
    fn name(&self) -> &str {
        BASE_SKILL_NAME
    }

    fn kind(&self) -> SkillKind {
        SkillKind::Base
    }

    async fn init(&self) -> Result<(), SkillError> {
        Ok(())
    }

    async fn tool_definitions(&self) -> Result<Vec<ToolDefinition>, SkillError> {
        Ok(self
            .tools
            .iter()
            .map(|t| ToolDefinition {
                skill_name: BASE_SKILL_NAME.to_string(),
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
                interactive: false,
            })
            .collect())
    }

    async fn call_tool(&self, tool_name: &str, args: Value) -> Result<Vec<MessagePart>, SkillError> {
        let tool = self.tool(tool_name).ok_or_else(|| SkillError::ToolNotFound {
            skill: BASE_SKILL_NAME.to_string(),
            tool: tool_name.to_string(),
        })?;
        tool.execute(args).await
    }

    async fn close(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn manager(dir: &std::path::Path) -> BaseSkillManager {
        BaseSkillManager::new(dir, HashMap::new(), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn test_tool_definitions_have_object_schemas() {
        let dir = tempfile::tempdir().unwrap();
        let defs = manager(dir.path()).tool_definitions().await.unwrap();
        let names: Vec<&str> = defs.iter().map(|d| d.name.as_str()).collect();
        assert!(names.contains(&"attemptCompletion"));
        assert!(names.contains(&"readTextFile"));
        let read = defs.iter().find(|d| d.name == "readTextFile").unwrap();
        assert_eq!(read.input_schema["type"], "object");
        assert!(read.input_schema["properties"]["path"].is_object());
        assert!(read.input_schema.get("$schema").is_none());
    }

    #[tokio::test]
    async fn test_filter_keeps_attempt_completion() {
        let dir = tempfile::tempdir().unwrap();
        let m = manager(dir.path()).with_filter(&["think".to_string()], &[]);
        let defs = m.tool_definitions().await.unwrap();
        let mut names: Vec<String> = defs.into_iter().map(|d| d.name).collect();
        names.sort();
        assert_eq!(names, vec!["attemptCompletion", "think"]);
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let dir = tempfile::tempdir().unwrap();
        let err = manager(dir.path())
            .call_tool("nope", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::ToolNotFound { .. }));
    }
}
