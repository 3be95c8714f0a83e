//! 集成测试共用的构造与事件收集

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use hive::engine::Engine;
use hive::llm::ScriptedProvider;
use hive::model::{
    EngineEvent, Expert, InteractiveToolConfig, ProviderConfig, ProviderName, RunEvent,
    RunSetting, RuntimeEvent, SkillConfig,
};
use serde_json::json;
use tokio::sync::mpsc::UnboundedReceiver;

pub fn setting(expert_key: &str, experts: Vec<Expert>, text: &str) -> RunSetting {
    let experts: HashMap<String, Expert> =
        experts.into_iter().map(|e| (e.key.clone(), e)).collect();
    RunSetting::new(
        expert_key,
        "gpt-4o-mini",
        ProviderConfig::new(ProviderName::Openai),
        experts,
    )
    .with_text(text)
    .with_workspace(std::env::temp_dir())
}

/// 带一个 askUser 交互式工具的技能 "human"
pub fn with_ask_user(expert: Expert) -> Expert {
    let mut tools = HashMap::new();
    tools.insert(
        "askUser".to_string(),
        InteractiveToolConfig {
            description: "Ask the user a question".to_string(),
            input_json_schema: json!({"type": "object", "properties": {"question": {"type": "string"}}}),
        },
    );
    expert.with_skill(
        "human",
        SkillConfig::InteractiveSkill {
            name: String::new(),
            description: String::new(),
            tools,
        },
    )
}

pub fn engine(provider: &Arc<ScriptedProvider>) -> (Engine, UnboundedReceiver<EngineEvent>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let engine = Engine::new(provider.clone()).with_listener(tx);
    (engine, rx)
}

/// 取出通道中已有的全部事件
pub fn drain(rx: &mut UnboundedReceiver<EngineEvent>) -> (Vec<RunEvent>, Vec<RuntimeEvent>) {
    let mut runs = Vec::new();
    let mut runtime = Vec::new();
    while let Ok(event) = rx.try_recv() {
        match event {
            EngineEvent::Run(event) => runs.push(*event),
            EngineEvent::Runtime(event) => runtime.push(event),
        }
    }
    (runs, runtime)
}

pub fn names<'a>(events: &'a [RunEvent], run_id: &str) -> Vec<&'a str> {
    events
        .iter()
        .filter(|e| e.run_id == run_id)
        .map(|e| e.name())
        .collect()
}
