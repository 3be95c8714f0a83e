//! MCP 技能：JSON-RPC 2.0 客户端、传输层与 Skill Manager

pub mod client;
pub mod manager;
pub mod transport;

pub use client::{McpClient, McpTool};
pub use manager::{Connector, McpSkillManager};
pub use transport::{
    HttpTransport, InProcessTransport, McpServerHandler, StdioTransport, Transport,
};
