//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__PROVIDER=openai`）。
//! Expert 定义单独放在 experts 文件中（每个表一个 Expert），由 toml 解析。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::core::EngineError;
use crate::model::{Expert, ProviderConfig, ProviderName, ReasoningBudget, RunSetting};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub run: RunSection,
}

/// [app] 段：工作目录与 Expert 定义文件
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    /// 基础文件工具的沙箱根目录，未设置时用当前目录
    pub workspace_root: Option<PathBuf>,
    #[serde(default = "default_experts_file")]
    pub experts_file: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            workspace_root: None,
            experts_file: default_experts_file(),
        }
    }
}

fn default_experts_file() -> PathBuf {
    PathBuf::from("config/experts.toml")
}

/// [llm] 段：提供方、模型与推理预算
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    pub base_url: Option<String>,
    /// token 数（如 4096）或等级（minimal / low / medium / high）
    pub reasoning_budget: Option<ReasoningBudget>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            reasoning_budget: None,
        }
    }
}

fn default_provider() -> String {
    "deepseek".to_string()
}

fn default_model() -> String {
    "deepseek-chat".to_string()
}

/// [run] 段：步数、重试、超时与温度
#[derive(Debug, Clone, Deserialize)]
pub struct RunSection {
    pub max_steps: Option<u64>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 单次模型调用超时（毫秒）
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            max_steps: None,
            max_retries: default_max_retries(),
            timeout_ms: default_timeout_ms(),
            temperature: default_temperature(),
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

fn default_max_retries() -> u32 {
    5
}

fn default_timeout_ms() -> u64 {
    300_000
}

fn default_temperature() -> f32 {
    0.3
}

fn default_tool_timeout_secs() -> u64 {
    60
}

impl AppConfig {
    pub fn provider_config(&self) -> Result<ProviderConfig, EngineError> {
        let provider: ProviderName = self.llm.provider.parse()?;
        let mut config = ProviderConfig::new(provider);
        config.base_url = self.llm.base_url.clone();
        Ok(config)
    }

    /// 以本配置构造一次顶层运行
    pub fn run_setting(
        &self,
        expert_key: &str,
        query: &str,
        experts: HashMap<String, Expert>,
    ) -> Result<RunSetting, EngineError> {
        let mut setting = RunSetting::new(
            expert_key,
            &self.llm.model,
            self.provider_config()?,
            experts,
        )
        .with_text(query)
        .with_max_retries(self.run.max_retries)
        .with_timeout_ms(self.run.timeout_ms);
        setting.temperature = self.run.temperature;
        setting.max_steps = self.run.max_steps;
        setting.reasoning_budget = self.llm.reasoning_budget;
        setting.workspace = self.app.workspace_root.clone();
        setting.expert()?;
        Ok(setting)
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

/// 解析 experts 文件内容：顶层每个表是一个 Expert，表名即 key
pub fn parse_experts(raw: &str) -> Result<HashMap<String, Expert>, EngineError> {
    let table: HashMap<String, Expert> = toml::from_str(raw)
        .map_err(|e| EngineError::Config(format!("invalid experts file: {e}")))?;
    Ok(table
        .into_iter()
        .map(|(key, expert)| {
            let expert = expert.normalized(&key);
            (expert.key.clone(), expert)
        })
        .collect())
}

pub fn load_experts(path: &Path) -> Result<HashMap<String, Expert>, EngineError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| EngineError::Config(format!("cannot read {}: {e}", path.display())))?;
    parse_experts(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ReasoningLevel, SkillConfig};

    #[test]
    fn test_defaults_without_sources() {
        let config = AppConfig::default();
        assert_eq!(config.llm.provider, "deepseek");
        assert_eq!(config.run.max_retries, 5);
        assert_eq!(config.run.timeout_ms, 300_000);
        assert_eq!(config.app.experts_file, PathBuf::from("config/experts.toml"));
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hive.toml");
        std::fs::write(
            &path,
            r#"
[llm]
provider = "openai"
model = "gpt-4o"
reasoning_budget = "high"

[run]
max_steps = 12
temperature = 0.0
"#,
        )
        .unwrap();
        let config = load_config(Some(path)).unwrap();
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-4o");
        assert_eq!(
            config.llm.reasoning_budget,
            Some(ReasoningBudget::Level(ReasoningLevel::High))
        );
        assert_eq!(config.run.max_steps, Some(12));
        assert_eq!(config.run.max_retries, 5);
    }

    #[test]
    fn test_parse_experts_normalizes_keys() {
        let experts = parse_experts(
            r#"
[assistant]
instruction = "Answer briefly."
delegates = ["@acme/researcher"]

[assistant.skills.human]
type = "interactiveSkill"

[assistant.skills.human.tools.askUser]
description = "Ask the user"

[researcher]
key = "@acme/researcher"
instruction = "Research."
"#,
        )
        .unwrap();
        assert_eq!(experts["assistant"].name, "assistant");
        assert!(experts.contains_key("@acme/researcher"));
        assert!(matches!(
            experts["assistant"].skills["human"],
            SkillConfig::InteractiveSkill { ref name, .. } if name == "human"
        ));
    }

    #[test]
    fn test_run_setting_requires_known_expert() {
        let config = AppConfig::default();
        let err = config
            .run_setting("nobody", "hi", HashMap::new())
            .unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));

        let mut experts = HashMap::new();
        experts.insert("assistant".to_string(), Expert::new("assistant", "help"));
        let setting = config.run_setting("assistant", "2+2?", experts).unwrap();
        assert_eq!(setting.input.text.as_deref(), Some("2+2?"));
        assert_eq!(setting.provider_config.provider_name, ProviderName::Deepseek);
    }
}
