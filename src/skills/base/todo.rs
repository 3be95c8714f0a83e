//! 任务清单与收尾工具
//!
//! attemptCompletion 在仍有未完成 todo 时返回 `{"remainingTodos": [...]}`，引擎据此拒绝收尾。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::model::MessagePart;
use crate::skills::base::{input_schema, parse_args, BaseTool};
use crate::skills::SkillError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TodoItem {
    pub id: usize,
    pub title: String,
    pub completed: bool,
}

/// 同一运行内多个工具共享的 todo 列表
#[derive(Debug, Clone, Default)]
pub struct TodoList {
    items: Arc<Mutex<Vec<TodoItem>>>,
}

impl TodoList {
    pub async fn snapshot(&self) -> Vec<TodoItem> {
        self.items.lock().await.clone()
    }

    pub async fn remaining(&self) -> Vec<TodoItem> {
        self.items
            .lock()
            .await
            .iter()
            .filter(|t| !t.completed)
            .cloned()
            .collect()
    }
}

/// 无参数工具的 schema
#[allow(dead_code)]
#[derive(Debug, Deserialize, JsonSchema)]
struct NoArgs {}

pub struct AttemptCompletionTool {
    todos: TodoList,
}

impl AttemptCompletionTool {
    pub fn new(todos: TodoList) -> Self {
        Self { todos }
    }
}

#[async_trait]
impl BaseTool for AttemptCompletionTool {
    fn name(&self) -> &'static str {
        "attemptCompletion"
    }

    fn description(&self) -> &'static str {
        "Signal that the task is complete. Fails while todos remain; finish or clear them first."
    }

    fn input_schema(&self) -> Value {
        input_schema::<NoArgs>()
    }

    async fn execute(&self, _args: Value) -> Result<Vec<MessagePart>, SkillError> {
        let remaining = self.todos.remaining().await;
        if remaining.is_empty() {
            return Ok(Vec::new());
        }
        Ok(vec![MessagePart::text(
            json!({ "remainingTodos": remaining }).to_string(),
        )])
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct ThinkArgs {
    /// 思考内容
    thought: String,
}

pub struct ThinkTool;

#[async_trait]
impl BaseTool for ThinkTool {
    fn name(&self) -> &'static str {
        "think"
    }

    fn description(&self) -> &'static str {
        "Record a thought. Use it to reason step by step before acting; it has no side effects."
    }

    fn input_schema(&self) -> Value {
        input_schema::<ThinkArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Vec<MessagePart>, SkillError> {
        let args: ThinkArgs = parse_args(self.name(), args)?;
        tracing::debug!(thought = %args.thought, "think");
        Ok(vec![MessagePart::text(json!({ "thought": args.thought }).to_string())])
    }
}

#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct TodoArgs {
    /// 新增的任务标题
    #[serde(default)]
    new_todos: Vec<String>,
    /// 标记完成的任务 id
    #[serde(default)]
    completed_todos: Vec<usize>,
}

pub struct TodoTool {
    todos: TodoList,
}

impl TodoTool {
    pub fn new(todos: TodoList) -> Self {
        Self { todos }
    }
}

#[async_trait]
impl BaseTool for TodoTool {
    fn name(&self) -> &'static str {
        "todo"
    }

    fn description(&self) -> &'static str {
        "Add todos and mark todos completed by id. Returns the full todo list."
    }

    fn input_schema(&self) -> Value {
        input_schema::<TodoArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Vec<MessagePart>, SkillError> {
        let args: TodoArgs = parse_args(self.name(), args)?;
        let mut items = self.todos.items.lock().await;
        for title in args.new_todos {
            let id = items.len();
            items.push(TodoItem {
                id,
                title,
                completed: false,
            });
        }
        for id in args.completed_todos {
            if let Some(item) = items.get_mut(id) {
                item.completed = true;
            }
        }
        let list = items.clone();
        Ok(vec![MessagePart::text(json!({ "todos": list }).to_string())])
    }
}

pub struct ClearTodoTool {
    todos: TodoList,
}

impl ClearTodoTool {
    pub fn new(todos: TodoList) -> Self {
        Self { todos }
    }
}

#[async_trait]
impl BaseTool for ClearTodoTool {
    fn name(&self) -> &'static str {
        "clearTodo"
    }

    fn description(&self) -> &'static str {
        "Remove every todo."
    }

    fn input_schema(&self) -> Value {
        input_schema::<NoArgs>()
    }

    async fn execute(&self, _args: Value) -> Result<Vec<MessagePart>, SkillError> {
        self.todos.items.lock().await.clear();
        Ok(vec![MessagePart::text(json!({ "todos": [] }).to_string())])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_attempt_completion_reports_remaining_todos() {
        let todos = TodoList::default();
        let todo = TodoTool::new(todos.clone());
        let complete = AttemptCompletionTool::new(todos.clone());

        todo.execute(json!({"newTodos": ["write", "review"]}))
            .await
            .unwrap();
        let parts = complete.execute(json!({})).await.unwrap();
        let text = parts[0].as_text().unwrap();
        let value: Value = serde_json::from_str(text).unwrap();
        assert_eq!(value["remainingTodos"].as_array().unwrap().len(), 2);

        todo.execute(json!({"completedTodos": [0, 1]})).await.unwrap();
        assert!(complete.execute(json!({})).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_clear_todo_empties_list() {
        let todos = TodoList::default();
        TodoTool::new(todos.clone())
            .execute(json!({"newTodos": ["a"]}))
            .await
            .unwrap();
        ClearTodoTool::new(todos.clone())
            .execute(json!({}))
            .await
            .unwrap();
        assert!(todos.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_think_requires_thought() {
        let err = ThinkTool.execute(json!({})).await.unwrap_err();
        assert!(matches!(err, SkillError::Execution(_)));
    }
}
