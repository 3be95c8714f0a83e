//! MCP Skill Manager
//!
//! 每个配置的 MCP 技能一个实例。初始化（启动进程 / 建立会话 + 握手 + tools/list）通过
//! OnceCell 只发生一次，并发调用方共享同一次进行中的初始化。
//! 延迟启动的实例在首次调用工具前只返回预声明的工具，不启动进程。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::OnceCell;

use crate::model::{tool_allowed, MessagePart, SkillConfig, ToolDefinition};
use crate::skills::mcp::client::McpClient;
use crate::skills::mcp::transport::{
    HttpTransport, InProcessTransport, McpServerHandler, StdioTransport, Transport,
};
use crate::skills::{SkillError, SkillKind, SkillManager};

/// 如何连接到 MCP 服务
#[derive(Clone)]
pub enum Connector {
    Stdio {
        command: String,
        args: Vec<String>,
        env: HashMap<String, String>,
    },
    Http {
        endpoint: String,
        headers: HashMap<String, String>,
    },
    InProcess(Arc<dyn McpServerHandler>),
}

impl Connector {
    fn open(&self, skill: &str) -> Result<Arc<dyn Transport>, SkillError> {
        Ok(match self {
            Self::Stdio { command, args, env } => {
                Arc::new(StdioTransport::spawn(skill, command, args, env)?)
            }
            Self::Http { endpoint, headers } => {
                Arc::new(HttpTransport::new(endpoint.clone(), headers.clone()))
            }
            Self::InProcess(handler) => Arc::new(InProcessTransport::new(handler.clone())),
        })
    }
}

struct Connected {
    client: McpClient,
    tools: Vec<ToolDefinition>,
}

pub struct McpSkillManager {
    name: String,
    connector: Connector,
    pick: Vec<String>,
    omit: Vec<String>,
    lazy: bool,
    declared: Vec<ToolDefinition>,
    init_timeout: Duration,
    state: OnceCell<Result<Connected, SkillError>>,
    closed: AtomicBool,
}

impl McpSkillManager {
    pub fn new(name: impl Into<String>, connector: Connector) -> Self {
        Self {
            name: name.into(),
            connector,
            pick: Vec::new(),
            omit: Vec::new(),
            lazy: false,
            declared: Vec::new(),
            init_timeout: Duration::from_secs(30),
            state: OnceCell::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// 从技能配置构建；requiredEnv 必须都能在运行 env 中找到
    pub fn from_config(config: &SkillConfig, env: &HashMap<String, String>) -> Result<Self, SkillError> {
        match config {
            SkillConfig::McpStdioSkill {
                name,
                command,
                args,
                required_env,
                pick,
                omit,
                lazy_init,
                declared_tools,
                ..
            } => {
                let mut child_env = HashMap::new();
                for key in required_env {
                    let value = env.get(key).ok_or_else(|| {
                        SkillError::Config(format!("skill {name} requires env {key}"))
                    })?;
                    child_env.insert(key.clone(), value.clone());
                }
                let declared = declared_tools
                    .iter()
                    .map(|t| ToolDefinition {
                        skill_name: name.clone(),
                        name: t.name.clone(),
                        description: t.description.clone(),
                        input_schema: t.input_schema.clone(),
                        interactive: false,
                    })
                    .collect();
                Ok(Self::new(
                    name.clone(),
                    Connector::Stdio {
                        command: command.clone(),
                        args: args.clone(),
                        env: child_env,
                    },
                )
                .with_filter(pick.clone(), omit.clone())
                .with_lazy_init(*lazy_init, declared))
            }
            SkillConfig::McpHttpSkill {
                name,
                endpoint,
                headers,
                pick,
                omit,
                ..
            } => Ok(Self::new(
                name.clone(),
                Connector::Http {
                    endpoint: endpoint.clone(),
                    headers: headers.clone(),
                },
            )
            .with_filter(pick.clone(), omit.clone())),
            SkillConfig::InteractiveSkill { name, .. } => Err(SkillError::Config(format!(
                "skill {name} is interactive, not MCP"
            ))),
        }
    }

    pub fn with_filter(mut self, pick: Vec<String>, omit: Vec<String>) -> Self {
        self.pick = pick;
        self.omit = omit;
        self
    }

    pub fn with_lazy_init(mut self, lazy: bool, declared: Vec<ToolDefinition>) -> Self {
        self.lazy = lazy;
        self.declared = declared;
        self
    }

    fn allowed(&self, tool: &str) -> bool {
        tool_allowed(tool, &self.pick, &self.omit)
    }

    async fn connect(&self) -> Result<Connected, SkillError> {
        tracing::info!(skill = %self.name, lazy = self.lazy, "starting MCP skill");
        let transport = self.connector.open(&self.name)?;
        let handshake = async {
            let client = McpClient::connect(&self.name, transport.clone()).await?;
            let tools = client
                .list_tools()
                .await?
                .into_iter()
                .filter(|t| self.allowed(&t.name))
                .map(|t| ToolDefinition {
                    skill_name: self.name.clone(),
                    description: t.description.unwrap_or_default(),
                    name: t.name,
                    input_schema: t.input_schema,
                    interactive: false,
                })
                .collect();
            Ok::<_, SkillError>(Connected { client, tools })
        };
        let result = match tokio::time::timeout(self.init_timeout, handshake).await {
            Ok(result) => result,
            Err(_) => Err(SkillError::Timeout(format!(
                "{} did not initialize within {}ms",
                self.name,
                self.init_timeout.as_millis()
            ))),
        };
        if result.is_err() {
            transport.close().await;
        }
        result.map_err(|e| match e {
            SkillError::Init { .. } => e,
            other => SkillError::Init {
                skill: self.name.clone(),
                message: other.to_string(),
            },
        })
    }

    async fn connected(&self) -> Result<&Connected, SkillError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SkillError::Closed(self.name.clone()));
        }
        match self.state.get_or_init(|| self.connect()).await {
            Ok(connected) => Ok(connected),
            Err(e) => Err(e.clone()),
        }
    }
}

#[async_trait]
impl SkillManager for McpSkillManager {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SkillKind {
        SkillKind::Mcp
    }

    fn lazy_init(&self) -> bool {
        self.lazy
    }

    async fn init(&self) -> Result<(), SkillError> {
        self.connected().await.map(|_| ())
    }

    async fn tool_definitions(&self) -> Result<Vec<ToolDefinition>, SkillError> {
        if self.lazy && !self.state.initialized() {
            return Ok(self
                .declared
                .iter()
                .filter(|t| self.allowed(&t.name))
                .cloned()
                .collect());
        }
        Ok(self.connected().await?.tools.clone())
    }

    async fn call_tool(&self, tool_name: &str, args: Value) -> Result<Vec<MessagePart>, SkillError> {
        let connected = self.connected().await?;
        if !connected.tools.iter().any(|t| t.name == tool_name) {
            return Err(SkillError::ToolNotFound {
                skill: self.name.clone(),
                tool: tool_name.to_string(),
            });
        }
        connected.client.call_tool(tool_name, args).await
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(Ok(connected)) = self.state.get() {
            connected.client.close().await;
        }
        tracing::info!(skill = %self.name, "MCP skill closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::DeclaredTool;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct CountingServer {
        initializes: AtomicUsize,
    }

    #[async_trait]
    impl McpServerHandler for CountingServer {
        async fn handle(&self, method: &str, params: Value) -> Result<Value, SkillError> {
            match method {
                "initialize" => {
                    self.initializes.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    Ok(json!({}))
                }
                "tools/list" => Ok(json!({"tools": [
                    {"name": "search", "description": "Search"},
                    {"name": "debug"}
                ]})),
                "tools/call" => Ok(json!({"content": [
                    {"type": "text", "text": format!("hit:{}", params["arguments"]["q"])}
                ]})),
                _ => Ok(Value::Null),
            }
        }
    }

    #[tokio::test]
    async fn test_lazy_manager_initializes_once_under_concurrency() {
        let server = Arc::new(CountingServer::default());
        let declared = vec![ToolDefinition {
            skill_name: "search".into(),
            name: "search".into(),
            description: "Search".into(),
            input_schema: json!({"type": "object"}),
            interactive: false,
        }];
        let manager = Arc::new(
            McpSkillManager::new("search", Connector::InProcess(server.clone()))
                .with_lazy_init(true, declared),
        );

        let defs = manager.tool_definitions().await.unwrap();
        assert_eq!(defs.len(), 1);
        assert_eq!(server.initializes.load(Ordering::SeqCst), 0);

        let calls = (0..5).map(|i| {
            let m = manager.clone();
            async move { m.call_tool("search", json!({"q": i})).await }
        });
        let results = futures_util::future::join_all(calls).await;
        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(server.initializes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_omit_filters_listed_tools() {
        let manager = McpSkillManager::new(
            "search",
            Connector::InProcess(Arc::new(CountingServer::default())),
        )
        .with_filter(vec![], vec!["debug".into()]);
        manager.init().await.unwrap();
        let names: Vec<String> = manager
            .tool_definitions()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["search"]);
        let err = manager.call_tool("debug", json!({})).await.unwrap_err();
        assert!(matches!(err, SkillError::ToolNotFound { .. }));
    }

    #[test]
    fn test_missing_required_env_is_config_error() {
        let config = SkillConfig::McpStdioSkill {
            name: "@acme/search".into(),
            description: String::new(),
            command: "npx".into(),
            args: vec![],
            required_env: vec!["SEARCH_API_KEY".into()],
            pick: vec![],
            omit: vec![],
            lazy_init: true,
            declared_tools: vec![DeclaredTool {
                name: "search".into(),
                description: String::new(),
                input_schema: json!({}),
            }],
        };
        let err = McpSkillManager::from_config(&config, &HashMap::new())
            .err()
            .unwrap();
        assert!(err.is_config());

        let mut env = HashMap::new();
        env.insert("SEARCH_API_KEY".to_string(), "k".to_string());
        let manager = McpSkillManager::from_config(&config, &env).unwrap();
        assert!(manager.lazy_init());
    }

    #[tokio::test]
    async fn test_closed_manager_rejects_calls() {
        let manager = McpSkillManager::new(
            "search",
            Connector::InProcess(Arc::new(CountingServer::default())),
        );
        manager.init().await.unwrap();
        manager.close().await;
        manager.close().await;
        assert!(matches!(
            manager.call_tool("search", json!({})).await,
            Err(SkillError::Closed(_))
        ));
    }
}
