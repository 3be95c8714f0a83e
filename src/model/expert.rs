//! Expert 定义与技能配置
//!
//! Expert 是一个可配置的 LLM Agent：指令、技能集合、可委派的其他 Expert。
//! 技能配置决定由哪种 Skill Manager 承载（MCP stdio / MCP HTTP / 交互式）。

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

fn default_version() -> String {
    "1.0.0".to_string()
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// Expert 的轻量引用（事件、委派链路中使用）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpertRef {
    pub key: String,
    pub name: String,
    pub version: String,
}

/// Expert 定义
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Expert {
    /// 配置文件中的表名，加载时回填
    #[serde(default)]
    pub key: String,
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub description: String,
    pub instruction: String,
    #[serde(default)]
    pub skills: HashMap<String, SkillConfig>,
    /// 可委派的 Expert key 列表
    #[serde(default)]
    pub delegates: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Expert {
    pub fn new(key: impl Into<String>, instruction: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: key.clone(),
            key,
            version: default_version(),
            description: String::new(),
            instruction: instruction.into(),
            skills: HashMap::new(),
            delegates: Vec::new(),
            tags: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_skill(mut self, name: impl Into<String>, skill: SkillConfig) -> Self {
        let name = name.into();
        let skill = skill.named(&name);
        self.skills.insert(name, skill);
        self
    }

    pub fn with_delegate(mut self, expert_key: impl Into<String>) -> Self {
        self.delegates.push(expert_key.into());
        self
    }

    pub fn expert_ref(&self) -> ExpertRef {
        ExpertRef {
            key: self.key.clone(),
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }

    /// 以表名回填 key / name / 技能名（配置文件加载后调用）
    pub fn normalized(mut self, key: &str) -> Self {
        if self.key.is_empty() {
            self.key = key.to_string();
        }
        if self.name.is_empty() {
            self.name = self.key.clone();
        }
        self.skills = self
            .skills
            .into_iter()
            .map(|(name, skill)| {
                let skill = skill.named(&name);
                (name, skill)
            })
            .collect();
        self
    }
}

/// 延迟启动的 MCP 技能预先声明的工具（无需启动进程即可告知模型）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeclaredTool {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

/// 交互式工具（由人 / UI 回答）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InteractiveToolConfig {
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub input_json_schema: Value,
}

/// 技能配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SkillConfig {
    McpStdioSkill {
        #[serde(default)]
        name: String,
        #[serde(default)]
        description: String,
        command: String,
        #[serde(default)]
        args: Vec<String>,
        /// 需要从 RunSetting.env 传给子进程的变量名
        #[serde(default)]
        required_env: Vec<String>,
        #[serde(default)]
        pick: Vec<String>,
        #[serde(default)]
        omit: Vec<String>,
        #[serde(default)]
        lazy_init: bool,
        #[serde(default)]
        declared_tools: Vec<DeclaredTool>,
    },
    McpHttpSkill {
        #[serde(default)]
        name: String,
        #[serde(default)]
        description: String,
        endpoint: String,
        #[serde(default)]
        headers: HashMap<String, String>,
        #[serde(default)]
        pick: Vec<String>,
        #[serde(default)]
        omit: Vec<String>,
    },
    InteractiveSkill {
        #[serde(default)]
        name: String,
        #[serde(default)]
        description: String,
        #[serde(default)]
        tools: HashMap<String, InteractiveToolConfig>,
    },
}

impl SkillConfig {
    pub fn name(&self) -> &str {
        match self {
            Self::McpStdioSkill { name, .. }
            | Self::McpHttpSkill { name, .. }
            | Self::InteractiveSkill { name, .. } => name,
        }
    }

    fn named(mut self, skill_name: &str) -> Self {
        match &mut self {
            Self::McpStdioSkill { name, .. }
            | Self::McpHttpSkill { name, .. }
            | Self::InteractiveSkill { name, .. } => {
                if name.is_empty() {
                    *name = skill_name.to_string();
                }
            }
        }
        self
    }

    /// (pick, omit) 工具过滤；交互式技能不过滤
    pub fn tool_filter(&self) -> (&[String], &[String]) {
        match self {
            Self::McpStdioSkill { pick, omit, .. } | Self::McpHttpSkill { pick, omit, .. } => {
                (pick, omit)
            }
            Self::InteractiveSkill { .. } => (&[], &[]),
        }
    }
}

/// pick 非空时只保留 pick 中的工具；随后去掉 omit 中的工具
pub fn tool_allowed(tool: &str, pick: &[String], omit: &[String]) -> bool {
    (pick.is_empty() || pick.iter().any(|p| p == tool)) && !omit.iter().any(|o| o == tool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_config_from_toml() {
        let raw = r#"
            instruction = "You research things."
            delegates = ["writer"]

            [skills."@acme/search"]
            type = "mcpStdioSkill"
            command = "npx"
            args = ["-y", "@acme/search"]
            requiredEnv = ["SEARCH_API_KEY"]
            omit = ["debug"]
            lazyInit = true
        "#;
        let expert: Expert = toml::from_str(raw).unwrap();
        let expert = expert.normalized("researcher");
        assert_eq!(expert.key, "researcher");
        assert_eq!(expert.name, "researcher");
        let skill = &expert.skills["@acme/search"];
        assert_eq!(skill.name(), "@acme/search");
        match skill {
            SkillConfig::McpStdioSkill {
                lazy_init,
                required_env,
                ..
            } => {
                assert!(*lazy_init);
                assert_eq!(required_env, &vec!["SEARCH_API_KEY".to_string()]);
            }
            other => panic!("unexpected skill config: {other:?}"),
        }
    }

    #[test]
    fn test_tool_allowed_pick_and_omit() {
        let pick = vec!["a".to_string(), "b".to_string()];
        let omit = vec!["b".to_string()];
        assert!(tool_allowed("a", &pick, &omit));
        assert!(!tool_allowed("b", &pick, &omit));
        assert!(!tool_allowed("c", &pick, &omit));
        assert!(tool_allowed("c", &[], &[]));
    }
}
