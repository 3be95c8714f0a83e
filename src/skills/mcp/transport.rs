//! MCP 传输层
//!
//! Transport 负责一次 JSON-RPC 2.0 请求 / 通知的收发：
//! - StdioTransport：子进程 stdin/stdout 按行分隔的 JSON，读任务按 id 把响应路由给等待方
//! - HttpTransport：streamable HTTP，POST 后接受 JSON 或 SSE 响应体
//! - InProcessTransport：直接调用进程内 McpServerHandler（测试与内嵌服务）

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::skills::SkillError;

#[async_trait]
pub trait Transport: Send + Sync {
    /// 发送请求并等待 result（error 转为 SkillError::Protocol）
    async fn request(&self, method: &str, params: Value) -> Result<Value, SkillError>;

    async fn notify(&self, method: &str, params: Value) -> Result<(), SkillError>;

    async fn close(&self);
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<u64>,
    method: &'a str,
    params: Value,
}

impl<'a> RpcRequest<'a> {
    fn call(id: u64, method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: Some(id),
            method,
            params,
        }
    }

    fn notification(method: &'a str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id: None,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

impl RpcResponse {
    fn id(&self) -> Option<u64> {
        self.id.as_ref().and_then(Value::as_u64)
    }

    fn is_response(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }

    fn into_result(self) -> Result<Value, SkillError> {
        match (self.result, self.error) {
            (_, Some(err)) => Err(SkillError::Protocol(format!(
                "{} (code {})",
                err.message, err.code
            ))),
            (Some(result), None) => Ok(result),
            (None, None) => Ok(Value::Null),
        }
    }
}

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value, SkillError>>>>>;

/// 子进程传输
pub struct StdioTransport {
    name: String,
    stdin: Mutex<Option<ChildStdin>>,
    child: Mutex<Option<Child>>,
    pending: Pending,
    next_id: AtomicU64,
    reader: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    /// 启动子进程；env 之外只透传 PATH 与 HOME
    pub fn spawn(
        name: &str,
        command: &str,
        args: &[String],
        env: &HashMap<String, String>,
    ) -> Result<Self, SkillError> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .env_clear()
            .envs(env)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true);
        for key in ["PATH", "HOME"] {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
        let mut child = cmd.spawn().map_err(|e| SkillError::Init {
            skill: name.to_string(),
            message: format!("spawn {command} failed: {e}"),
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| SkillError::Init {
            skill: name.to_string(),
            message: "child stdout unavailable".to_string(),
        })?;
        if let Some(stderr) = child.stderr.take() {
            let skill = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(skill = %skill, "{}", line);
                }
            });
        }

        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let reader = tokio::spawn(read_loop(name.to_string(), stdout, pending.clone()));

        Ok(Self {
            name: name.to_string(),
            stdin: Mutex::new(stdin),
            child: Mutex::new(Some(child)),
            pending,
            next_id: AtomicU64::new(1),
            reader: Mutex::new(Some(reader)),
        })
    }

    async fn write_line(&self, payload: &RpcRequest<'_>) -> Result<(), SkillError> {
        let mut line = serde_json::to_string(payload)
            .map_err(|e| SkillError::Protocol(e.to_string()))?;
        line.push('\n');
        let mut guard = self.stdin.lock().await;
        let stdin = guard
            .as_mut()
            .ok_or_else(|| SkillError::Closed(self.name.clone()))?;
        stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| SkillError::Transport(e.to_string()))?;
        stdin
            .flush()
            .await
            .map_err(|e| SkillError::Transport(e.to_string()))
    }
}

async fn read_loop(name: String, stdout: tokio::process::ChildStdout, pending: Pending) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                let response: RpcResponse = match serde_json::from_str(&line) {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!(skill = %name, error = %e, "unparseable MCP message");
                        continue;
                    }
                };
                if !response.is_response() {
                    // 服务端发来的通知 / 请求，本客户端不处理
                    tracing::debug!(skill = %name, "ignored MCP server message");
                    continue;
                }
                let Some(id) = response.id() else {
                    continue;
                };
                if let Some(tx) = pending.lock().await.remove(&id) {
                    let _ = tx.send(response.into_result());
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(skill = %name, error = %e, "MCP stdout read failed");
                break;
            }
        }
    }
    for (_, tx) in pending.lock().await.drain() {
        let _ = tx.send(Err(SkillError::Closed(name.clone())));
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, SkillError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);
        if let Err(e) = self.write_line(&RpcRequest::call(id, method, params)).await {
            self.pending.lock().await.remove(&id);
            return Err(e);
        }
        rx.await
            .map_err(|_| SkillError::Closed(self.name.clone()))?
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), SkillError> {
        self.write_line(&RpcRequest::notification(method, params)).await
    }

    async fn close(&self) {
        self.stdin.lock().await.take();
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                tracing::debug!(skill = %self.name, error = %e, "kill MCP child failed");
            }
        }
        if let Some(reader) = self.reader.lock().await.take() {
            reader.abort();
        }
    }
}

/// streamable HTTP 传输
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    headers: HashMap<String, String>,
    session_id: Mutex<Option<String>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

const SESSION_HEADER: &str = "mcp-session-id";

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, headers: HashMap<String, String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            headers,
            session_id: Mutex::new(None),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    async fn post(&self, payload: &RpcRequest<'_>) -> Result<reqwest::Response, SkillError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SkillError::Closed(self.endpoint.clone()));
        }
        let mut req = self
            .client
            .post(&self.endpoint)
            .header("Accept", "application/json, text/event-stream")
            .json(payload);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        if let Some(session) = self.session_id.lock().await.as_deref() {
            req = req.header(SESSION_HEADER, session);
        }
        let response = req
            .send()
            .await
            .map_err(|e| SkillError::Transport(e.to_string()))?;
        if let Some(session) = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.session_id.lock().await = Some(session.to_string());
        }
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SkillError::Transport(format!("HTTP {status}: {body}")));
        }
        Ok(response)
    }
}

/// 从 SSE 响应体中找出 id 匹配的 JSON-RPC 响应
fn find_sse_response(body: &str, id: u64) -> Option<RpcResponse> {
    body.lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<RpcResponse>(data.trim()).ok())
        .find(|r| r.is_response() && r.id() == Some(id))
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, SkillError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let response = self.post(&RpcRequest::call(id, method, params)).await?;
        let is_sse = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.contains("text/event-stream"))
            .unwrap_or(false);
        let body = response
            .text()
            .await
            .map_err(|e| SkillError::Transport(e.to_string()))?;
        let rpc = if is_sse {
            find_sse_response(&body, id)
                .ok_or_else(|| SkillError::Protocol(format!("no response for request {id} in event stream")))?
        } else {
            serde_json::from_str::<RpcResponse>(&body)
                .map_err(|e| SkillError::Protocol(format!("invalid JSON-RPC response: {e}")))?
        };
        rpc.into_result()
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), SkillError> {
        self.post(&RpcRequest::notification(method, params)).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let session = self.session_id.lock().await.take();
        if let Some(session) = session {
            let result = self
                .client
                .delete(&self.endpoint)
                .header(SESSION_HEADER, session)
                .send()
                .await;
            if let Err(e) = result {
                tracing::debug!(endpoint = %self.endpoint, error = %e, "MCP session delete failed");
            }
        }
    }
}

/// 进程内 MCP 服务
#[async_trait]
pub trait McpServerHandler: Send + Sync {
    async fn handle(&self, method: &str, params: Value) -> Result<Value, SkillError>;
}

pub struct InProcessTransport {
    handler: Arc<dyn McpServerHandler>,
    closed: AtomicBool,
}

impl InProcessTransport {
    pub fn new(handler: Arc<dyn McpServerHandler>) -> Self {
        Self {
            handler,
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Transport for InProcessTransport {
    async fn request(&self, method: &str, params: Value) -> Result<Value, SkillError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SkillError::Closed("in-process".to_string()));
        }
        self.handler.handle(method, params).await
    }

    async fn notify(&self, method: &str, params: Value) -> Result<(), SkillError> {
        self.handler.handle(method, params).await.map(|_| ())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// initialize 请求参数
pub fn initialize_params() -> Value {
    json!({
        "protocolVersion": "2025-06-18",
        "capabilities": {},
        "clientInfo": { "name": "hive", "version": env!("CARGO_PKG_VERSION") },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_sse_response_matches_id() {
        let body = "event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"method\":\"notifications/progress\",\"params\":{}}\n\n\
                    event: message\n\
                    data: {\"jsonrpc\":\"2.0\",\"id\":7,\"result\":{\"tools\":[]}}\n\n";
        let rpc = find_sse_response(body, 7).unwrap();
        assert_eq!(rpc.into_result().unwrap(), json!({"tools": []}));
        assert!(find_sse_response(body, 8).is_none());
    }

    #[test]
    fn test_rpc_error_becomes_protocol_error() {
        let rpc: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"Method not found"}}"#,
        )
        .unwrap();
        let err = rpc.into_result().unwrap_err();
        assert!(matches!(err, SkillError::Protocol(ref m) if m.contains("-32601")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdio_routes_response_by_id() {
        // 读一行请求后回一条 id=1 的响应
        let script = r#"read line; echo '{"jsonrpc":"2.0","id":1,"result":{"ok":true}}'"#;
        let transport = StdioTransport::spawn(
            "echo-server",
            "sh",
            &["-c".to_string(), script.to_string()],
            &HashMap::new(),
        )
        .unwrap();
        let result = transport.request("ping", json!({})).await.unwrap();
        assert_eq!(result, json!({"ok": true}));
        transport.close().await;
    }
}
