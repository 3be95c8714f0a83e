//! 技能注册表
//!
//! Arena：按注册顺序存放 Arc<dyn SkillManager>，另有 技能名 → 下标、工具名 → 下标 两个索引。
//! 按组启动：base → MCP → delegate + interactive；组内非延迟实例并发 init，全部结束后再判定；
//! 任一失败则关闭本组与之前各组已启动的实例，并返回按注册顺序的第一个错误。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;

use crate::core::EngineError;
use crate::model::{Expert, RunSetting, RuntimeEventKind, SkillConfig, ToolDefinition};
use crate::skills::base::{BaseSkillManager, BASE_SKILL_NAME};
use crate::skills::mcp::{Connector, McpServerHandler, McpSkillManager};
use crate::skills::{DelegateSkillManager, InteractiveSkillManager, SkillError, SkillManager};

/// 技能生命周期事件的接收方
pub type SkillEventSink = Arc<dyn Fn(RuntimeEventKind) + Send + Sync>;

pub type SkillGroup = Vec<Arc<dyn SkillManager>>;

/// 为一次运行构建技能分组（尚未启动）
pub fn skill_groups(
    setting: &RunSetting,
    expert: &Expert,
    servers: &HashMap<String, Arc<dyn McpServerHandler>>,
    exec_timeout: Duration,
) -> Result<Vec<SkillGroup>, EngineError> {
    let workspace = match &setting.workspace {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let mut base = BaseSkillManager::new(workspace, setting.env.clone(), exec_timeout);
    if let Some(config) = expert.skills.get(BASE_SKILL_NAME) {
        let (pick, omit) = config.tool_filter();
        base = base.with_filter(pick, omit);
    }

    let mut skills: Vec<(&String, &SkillConfig)> = expert
        .skills
        .iter()
        .filter(|(name, _)| name.as_str() != BASE_SKILL_NAME)
        .collect();
    skills.sort_by(|a, b| a.0.cmp(b.0));

    let mut mcp: SkillGroup = Vec::new();
    let mut tail: SkillGroup = Vec::new();
    for (name, config) in &skills {
        if matches!(config, SkillConfig::InteractiveSkill { .. }) {
            continue;
        }
        let manager = match servers.get(name.as_str()) {
            Some(handler) => {
                let (pick, omit) = config.tool_filter();
                McpSkillManager::new(name.as_str(), Connector::InProcess(handler.clone()))
                    .with_filter(pick.to_vec(), omit.to_vec())
            }
            None => McpSkillManager::from_config(config, &setting.env)?,
        };
        mcp.push(Arc::new(manager));
    }

    for key in &expert.delegates {
        let delegate = setting
            .experts
            .get(key)
            .ok_or_else(|| EngineError::DelegateExpertNotFound(key.clone()))?;
        tail.push(Arc::new(DelegateSkillManager::new(delegate)));
    }
    for (name, config) in &skills {
        if let SkillConfig::InteractiveSkill { tools, .. } = config {
            tail.push(Arc::new(InteractiveSkillManager::new(name.as_str(), tools)));
        }
    }

    let base: Arc<dyn SkillManager> = Arc::new(base);
    Ok(vec![vec![base], mcp, tail])
}

pub struct SkillRegistry {
    managers: Vec<Arc<dyn SkillManager>>,
    by_name: HashMap<String, usize>,
    tool_index: HashMap<String, usize>,
    definitions: Vec<ToolDefinition>,
    sink: Option<SkillEventSink>,
    closed: AtomicBool,
}

fn init_error(manager: &dyn SkillManager, err: SkillError) -> EngineError {
    match err {
        SkillError::Init { skill, message } => EngineError::SkillInit { skill, message },
        SkillError::Config(_) => EngineError::Skill(err),
        other => EngineError::SkillInit {
            skill: manager.name().to_string(),
            message: other.to_string(),
        },
    }
}

async fn close_managers(managers: &[Arc<dyn SkillManager>], sink: Option<&SkillEventSink>) {
    join_all(managers.iter().map(|m| m.close())).await;
    if let Some(sink) = sink {
        for m in managers {
            sink(RuntimeEventKind::SkillDisconnected {
                skill_name: m.name().to_string(),
            });
        }
    }
}

impl SkillRegistry {
    /// 按组启动；失败时已启动的实例全部关闭，且每个只关闭一次
    pub async fn start(groups: Vec<SkillGroup>, sink: Option<SkillEventSink>) -> Result<Self, EngineError> {
        let mut registered: Vec<Arc<dyn SkillManager>> = Vec::new();
        let mut started: Vec<Arc<dyn SkillManager>> = Vec::new();

        for group in groups {
            let eager: Vec<Arc<dyn SkillManager>> =
                group.iter().filter(|m| !m.lazy_init()).cloned().collect();
            if let Some(sink) = &sink {
                for m in &eager {
                    sink(RuntimeEventKind::SkillStarting {
                        skill_name: m.name().to_string(),
                    });
                }
            }
            let results = join_all(eager.iter().map(|m| m.init())).await;

            let mut first_failure = None;
            for (manager, result) in eager.iter().zip(results) {
                match result {
                    Ok(()) => started.push(manager.clone()),
                    Err(e) => {
                        tracing::warn!(skill = %manager.name(), error = %e, "skill failed to start");
                        if first_failure.is_none() {
                            first_failure = Some(init_error(manager.as_ref(), e));
                        }
                    }
                }
            }
            if let Some(err) = first_failure {
                close_managers(&started, sink.as_ref()).await;
                return Err(err);
            }
            registered.extend(group);
        }

        let mut registry = Self {
            managers: Vec::new(),
            by_name: HashMap::new(),
            tool_index: HashMap::new(),
            definitions: Vec::new(),
            sink,
            closed: AtomicBool::new(false),
        };
        for manager in registered {
            let defs = match manager.tool_definitions().await {
                Ok(defs) => defs,
                Err(e) => {
                    close_managers(&started, registry.sink.as_ref()).await;
                    return Err(init_error(manager.as_ref(), e));
                }
            };
            registry.register(manager, defs);
        }
        Ok(registry)
    }

    fn register(&mut self, manager: Arc<dyn SkillManager>, defs: Vec<ToolDefinition>) {
        let idx = self.managers.len();
        self.by_name.insert(manager.name().to_string(), idx);
        let mut count = 0;
        for def in defs {
            if self.tool_index.contains_key(&def.name) {
                tracing::warn!(tool = %def.name, skill = %manager.name(), "duplicate tool name ignored");
                continue;
            }
            self.tool_index.insert(def.name.clone(), idx);
            self.definitions.push(def);
            count += 1;
        }
        tracing::info!(skill = %manager.name(), tools = count, "skill registered");
        if let Some(sink) = &self.sink {
            sink(RuntimeEventKind::SkillConnected {
                skill_name: manager.name().to_string(),
                tool_count: count,
            });
        }
        self.managers.push(manager);
    }

    /// 工具名 → 承载它的实例
    pub fn resolve_tool(&self, tool_name: &str) -> Option<Arc<dyn SkillManager>> {
        self.tool_index
            .get(tool_name)
            .map(|&idx| self.managers[idx].clone())
    }

    pub fn manager(&self, skill_name: &str) -> Option<Arc<dyn SkillManager>> {
        self.by_name
            .get(skill_name)
            .map(|&idx| self.managers[idx].clone())
    }

    pub fn tool_definitions(&self) -> &[ToolDefinition] {
        &self.definitions
    }

    /// 幂等：每个实例只关闭一次
    pub async fn close_all(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        close_managers(&self.managers, self.sink.as_ref()).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MessagePart, ProviderConfig, ProviderName};
    use crate::skills::SkillKind;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;

    struct FakeManager {
        name: String,
        fail: bool,
        closes: AtomicUsize,
    }

    impl FakeManager {
        fn new(name: &str, fail: bool) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                fail,
                closes: AtomicUsize::new(0),
            })
        }
    }

    fn dyn_manager(m: &Arc<FakeManager>) -> Arc<dyn SkillManager> {
        m.clone()
    }

    #[async_trait]
    impl SkillManager for FakeManager {
        fn name(&self) -> &str {
            &self.name
        }
        fn kind(&self) -> SkillKind {
            SkillKind::Mcp
        }
        async fn init(&self) -> Result<(), SkillError> {
            if self.fail {
                Err(SkillError::Transport(format!("{} refused", self.name)))
            } else {
                Ok(())
            }
        }
        async fn tool_definitions(&self) -> Result<Vec<ToolDefinition>, SkillError> {
            Ok(vec![ToolDefinition {
                skill_name: self.name.clone(),
                name: format!("{}_tool", self.name),
                description: String::new(),
                input_schema: json!({}),
                interactive: false,
            }])
        }
        async fn call_tool(&self, _: &str, _: Value) -> Result<Vec<MessagePart>, SkillError> {
            Ok(vec![])
        }
        async fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_group_failure_closes_started_managers() {
        let a = FakeManager::new("A", false);
        let b = FakeManager::new("B", true);
        let c = FakeManager::new("C", false);
        let groups = vec![vec![dyn_manager(&a), dyn_manager(&b), dyn_manager(&c)]];

        let err = SkillRegistry::start(groups, None).await.err().unwrap();

        match err {
            EngineError::SkillInit { skill, message } => {
                assert_eq!(skill, "B");
                assert!(message.contains("B refused"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(a.closes.load(Ordering::SeqCst), 1);
        assert_eq!(c.closes.load(Ordering::SeqCst), 1);
        assert_eq!(b.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_later_group_failure_closes_earlier_groups() {
        let base = FakeManager::new("base", false);
        let bad = FakeManager::new("bad", true);
        let never = FakeManager::new("never", false);
        let groups = vec![
            vec![dyn_manager(&base)],
            vec![dyn_manager(&bad)],
            vec![dyn_manager(&never)],
        ];

        assert!(SkillRegistry::start(groups, None).await.is_err());
        assert_eq!(base.closes.load(Ordering::SeqCst), 1);
        assert_eq!(never.closes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_index_and_idempotent_close() {
        let a = FakeManager::new("A", false);
        let registry = SkillRegistry::start(vec![vec![dyn_manager(&a)]], None).await.unwrap();
        assert_eq!(registry.resolve_tool("A_tool").unwrap().name(), "A");
        assert!(registry.resolve_tool("missing").is_none());
        registry.close_all().await;
        registry.close_all().await;
        assert_eq!(a.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_skill_groups_missing_delegate() {
        let expert = Expert::new("lead", "lead").with_delegate("ghost");
        let mut experts = HashMap::new();
        experts.insert(expert.key.clone(), expert.clone());
        let setting = RunSetting::new("lead", "gpt-4o", ProviderConfig::new(ProviderName::Openai), experts);
        let err = skill_groups(&setting, &expert, &HashMap::new(), Duration::from_secs(1))
            .err()
            .unwrap();
        assert!(matches!(err, EngineError::DelegateExpertNotFound(ref k) if k == "ghost"));
    }
}
