//! 技能层错误
//!
//! 工具执行与协议错误会变成错误 ToolResult 交给模型；配置与启动错误是致命的。

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SkillError {
    #[error("Skill '{skill}' failed to start: {message}")]
    Init { skill: String, message: String },

    #[error("Tool '{tool}' not found in skill '{skill}'")]
    ToolNotFound { skill: String, tool: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Tool execution failed: {0}")]
    Execution(String),

    #[error("Tool timeout: {0}")]
    Timeout(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Skill closed: {0}")]
    Closed(String),
}

impl SkillError {
    /// 配置错误不交给模型重试
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
