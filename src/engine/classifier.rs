//! 工具调用分类
//!
//! 按承载它的 Skill Manager 的 kind() 把一批调用分成三个互斥的桶：
//! plain（基础工具与 MCP）、delegate、interactive。未知工具名为致命错误。

use std::sync::Arc;

use crate::core::EngineError;
use crate::llm::GeneratedToolCall;
use crate::model::ToolCall;
use crate::skills::{SkillKind, SkillManager, SkillRegistry};

#[derive(Clone)]
pub struct ClassifiedCall {
    pub call: ToolCall,
    pub manager: Arc<dyn SkillManager>,
}

#[derive(Clone, Default)]
pub struct ToolBuckets {
    pub plain: Vec<ClassifiedCall>,
    pub delegate: Vec<ClassifiedCall>,
    pub interactive: Vec<ClassifiedCall>,
}

fn lookup(call: &ToolCall, registry: &SkillRegistry) -> Option<Arc<dyn SkillManager>> {
    registry
        .manager(&call.skill_name)
        .filter(|_| {
            registry
                .tool_definitions()
                .iter()
                .any(|t| t.skill_name == call.skill_name && t.name == call.tool_name)
        })
        .or_else(|| registry.resolve_tool(&call.tool_name))
}

pub fn classify<'a>(
    calls: impl IntoIterator<Item = &'a ToolCall>,
    registry: &SkillRegistry,
) -> Result<ToolBuckets, EngineError> {
    let mut buckets = ToolBuckets::default();
    for call in calls {
        let manager =
            lookup(call, registry).ok_or_else(|| EngineError::UnknownTool(call.tool_name.clone()))?;
        let kind = manager.kind();
        let entry = ClassifiedCall {
            call: call.clone(),
            manager,
        };
        if kind.is_plain() {
            buckets.plain.push(entry);
        } else if kind == SkillKind::Delegate {
            buckets.delegate.push(entry);
        } else {
            buckets.interactive.push(entry);
        }
    }
    Ok(buckets)
}

/// 模型给出的调用只有工具名，补上承载它的技能名
pub fn resolve_calls(
    generated: &[GeneratedToolCall],
    registry: &SkillRegistry,
) -> Result<Vec<ToolCall>, EngineError> {
    generated
        .iter()
        .map(|g| {
            let manager = registry
                .resolve_tool(&g.tool_name)
                .ok_or_else(|| EngineError::UnknownTool(g.tool_name.clone()))?;
            Ok(ToolCall::new(&g.id, manager.name(), &g.tool_name, g.args.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Expert, InteractiveToolConfig};
    use crate::skills::{BaseSkillManager, DelegateSkillManager, InteractiveSkillManager};
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    async fn registry() -> SkillRegistry {
        let base: Arc<dyn SkillManager> = Arc::new(BaseSkillManager::new(
            std::env::temp_dir(),
            HashMap::new(),
            Duration::from_secs(1),
        ));
        let delegate: Arc<dyn SkillManager> =
            Arc::new(DelegateSkillManager::new(&Expert::new("@acme/researcher", "research")));
        let mut tools = HashMap::new();
        tools.insert("askUser".to_string(), InteractiveToolConfig {
            description: "Ask".into(),
            input_json_schema: json!({"type": "object"}),
        });
        let interactive: Arc<dyn SkillManager> = Arc::new(InteractiveSkillManager::new("human", &tools));
        SkillRegistry::start(vec![vec![base], vec![], vec![delegate, interactive]], None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_classify_partitions_by_kind() {
        let registry = registry().await;
        let generated = vec![
            GeneratedToolCall { id: "1".into(), tool_name: "think".into(), args: json!({}) },
            GeneratedToolCall { id: "2".into(), tool_name: "researcher".into(), args: json!({"query": "q"}) },
            GeneratedToolCall { id: "3".into(), tool_name: "askUser".into(), args: json!({}) },
            GeneratedToolCall { id: "4".into(), tool_name: "todo".into(), args: json!({}) },
        ];
        let calls = resolve_calls(&generated, &registry).unwrap();
        assert_eq!(calls[1].skill_name, "@acme/researcher");

        let buckets = classify(&calls, &registry).unwrap();
        let ids = |b: &[ClassifiedCall]| b.iter().map(|c| c.call.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&buckets.plain), vec!["1", "4"]);
        assert_eq!(ids(&buckets.delegate), vec!["2"]);
        assert_eq!(ids(&buckets.interactive), vec!["3"]);
    }

    #[tokio::test]
    async fn test_unknown_tool_is_fatal() {
        let registry = registry().await;
        let generated = vec![GeneratedToolCall {
            id: "1".into(),
            tool_name: "launchRockets".into(),
            args: json!({}),
        }];
        let err = resolve_calls(&generated, &registry).unwrap_err();
        assert!(matches!(err, EngineError::UnknownTool(ref t) if t == "launchRockets"));

        let stray = ToolCall::new("9", "ghost", "launchRockets", json!({}));
        assert!(classify([&stray], &registry).is_err());
    }
}
