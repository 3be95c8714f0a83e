//! 运行配置 RunSetting
//!
//! 每次运行不可变；委派子运行时复制一份并覆盖 runId / expertKey / 输入。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::EngineError;
use crate::model::Expert;

/// 上游模型提供方
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderName {
    Openai,
    Anthropic,
    Google,
    Deepseek,
    Ollama,
}

impl ProviderName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Openai => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Deepseek => "deepseek",
            Self::Ollama => "ollama",
        }
    }
}

impl std::str::FromStr for ProviderName {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::Openai),
            "anthropic" => Ok(Self::Anthropic),
            "google" => Ok(Self::Google),
            "deepseek" => Ok(Self::Deepseek),
            "ollama" => Ok(Self::Ollama),
            other => Err(EngineError::Config(format!("unknown provider: {other}"))),
        }
    }
}

/// 提供方连接配置；options 原样合并进请求体
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub provider_name: ProviderName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Value>,
}

impl ProviderConfig {
    pub fn new(provider_name: ProviderName) -> Self {
        Self {
            provider_name,
            api_key: None,
            base_url: None,
            options: None,
        }
    }
}

/// 推理强度（语义等级）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReasoningLevel {
    Minimal,
    Low,
    Medium,
    High,
}

/// 推理预算：token 数或语义等级
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReasoningBudget {
    Tokens(u64),
    Level(ReasoningLevel),
}

/// 交互式工具 / 委派的外部结果，用于恢复运行
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveToolCallResult {
    pub tool_call_id: String,
    pub tool_name: String,
    pub skill_name: String,
    pub text: String,
}

/// 运行输入：新的用户文本，或恢复时的外部工具结果
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interactive_tool_call_result: Option<InteractiveToolCallResult>,
}

/// 单次运行配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSetting {
    pub job_id: String,
    pub run_id: String,
    pub expert_key: String,
    pub model: String,
    pub provider_config: ProviderConfig,
    pub input: RunInput,
    pub experts: HashMap<String, Expert>,
    pub temperature: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<u64>,
    pub max_retries: u32,
    pub timeout_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_budget: Option<ReasoningBudget>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// 基础文件工具的沙箱根目录，未设置时用当前目录
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace: Option<PathBuf>,
    pub started_at: i64,
    pub updated_at: i64,
}

impl RunSetting {
    pub fn new(
        expert_key: impl Into<String>,
        model: impl Into<String>,
        provider_config: ProviderConfig,
        experts: HashMap<String, Expert>,
    ) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Self {
            job_id: uuid::Uuid::new_v4().to_string(),
            run_id: uuid::Uuid::new_v4().to_string(),
            expert_key: expert_key.into(),
            model: model.into(),
            provider_config,
            input: RunInput::default(),
            experts,
            temperature: 0.3,
            max_steps: None,
            max_retries: 5,
            timeout_ms: 300_000,
            reasoning_budget: None,
            env: HashMap::new(),
            workspace: None,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.input.text = Some(text.into());
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = Some(max_steps);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_reasoning_budget(mut self, budget: ReasoningBudget) -> Self {
        self.reasoning_budget = Some(budget);
        self
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// 当前运行的 Expert；不存在属于配置错误
    pub fn expert(&self) -> Result<&Expert, EngineError> {
        self.experts
            .get(&self.expert_key)
            .ok_or_else(|| EngineError::Config(format!("expert not found: {}", self.expert_key)))
    }

    /// 委派子运行：新 runId、子 Expert、query 作为输入文本
    pub fn for_delegation(&self, expert_key: &str, query: &str) -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            expert_key: expert_key.to_string(),
            input: RunInput {
                text: Some(query.to_string()),
                interactive_tool_call_result: None,
            },
            updated_at: chrono::Utc::now().timestamp_millis(),
            ..self.clone()
        }
    }

    /// 以外部工具结果恢复同一运行（runId 不变）
    pub fn resumed_with(&self, result: InteractiveToolCallResult) -> Self {
        Self {
            input: RunInput {
                text: None,
                interactive_tool_call_result: Some(result),
            },
            updated_at: chrono::Utc::now().timestamp_millis(),
            ..self.clone()
        }
    }
}
