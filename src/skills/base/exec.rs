//! exec：直接执行 program + args（不经 shell）
//!
//! 子进程环境只包含 PATH 与本次运行的 env，工作目录限定在 workspace 内，带超时与审计日志。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tokio::process::Command;

use crate::model::MessagePart;
use crate::skills::base::{input_schema, parse_args, BaseTool, SafeFs};
use crate::skills::SkillError;

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
struct ExecArgs {
    /// 可执行文件名或路径
    command: String,
    #[serde(default)]
    args: Vec<String>,
    /// 相对 workspace 的工作目录
    #[serde(default)]
    cwd: Option<String>,
    /// 覆盖默认超时（毫秒）
    #[serde(default)]
    timeout_ms: Option<u64>,
}

pub struct ExecTool {
    fs: SafeFs,
    env: HashMap<String, String>,
    timeout: Duration,
}

impl ExecTool {
    pub fn new(workspace: PathBuf, env: HashMap<String, String>, timeout: Duration) -> Self {
        Self {
            fs: SafeFs::new(workspace),
            env,
            timeout,
        }
    }
}

#[async_trait]
impl BaseTool for ExecTool {
    fn name(&self) -> &'static str {
        "exec"
    }

    fn description(&self) -> &'static str {
        "Run a program with arguments inside the workspace (no shell). Returns stdout and stderr."
    }

    fn input_schema(&self) -> Value {
        input_schema::<ExecArgs>()
    }

    async fn execute(&self, args: Value) -> Result<Vec<MessagePart>, SkillError> {
        let args: ExecArgs = parse_args(self.name(), args)?;
        if args.command.trim().is_empty() {
            return Err(SkillError::Execution("Empty command".to_string()));
        }
        let cwd = match args.cwd.as_deref() {
            Some(dir) => self.fs.resolve(dir)?,
            None => self.fs.root().to_path_buf(),
        };
        let timeout = args
            .timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.timeout);

        tracing::info!(command = %args.command, args = ?args.args, "exec tool invoke");

        let mut cmd = Command::new(&args.command);
        cmd.args(&args.args)
            .current_dir(&cwd)
            .env_clear()
            .envs(&self.env)
            .kill_on_drop(true);
        if let Ok(path) = std::env::var("PATH") {
            cmd.env("PATH", path);
        }

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| SkillError::Timeout(format!("exec timed out after {}ms", timeout.as_millis())))?
            .map_err(|e| SkillError::Execution(format!("spawn failed: {e}")))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(SkillError::Execution(format!(
                "exit {:?}: stderr {}",
                output.status.code(),
                stderr.trim()
            )));
        }
        let text = if stderr.trim().is_empty() {
            stdout.trim().to_string()
        } else {
            format!("{}\nstderr: {}", stdout.trim(), stderr.trim())
        };
        Ok(vec![MessagePart::text(text)])
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_exec_sees_only_run_env() {
        let dir = tempfile::tempdir().unwrap();
        let mut env = HashMap::new();
        env.insert("HIVE_TEST_VALUE".to_string(), "42".to_string());
        let tool = ExecTool::new(dir.path().to_path_buf(), env, Duration::from_secs(5));

        let parts = tool
            .execute(json!({"command": "sh", "args": ["-c", "echo $HIVE_TEST_VALUE-$HOME"]}))
            .await
            .unwrap();
        assert_eq!(parts[0].as_text(), Some("42-"));
    }

    #[tokio::test]
    async fn test_exec_nonzero_exit_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecTool::new(dir.path().to_path_buf(), HashMap::new(), Duration::from_secs(5));
        let err = tool
            .execute(json!({"command": "sh", "args": ["-c", "exit 3"]}))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::Execution(_)));
    }

    #[tokio::test]
    async fn test_exec_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExecTool::new(dir.path().to_path_buf(), HashMap::new(), Duration::from_secs(5));
        let err = tool
            .execute(json!({"command": "sleep", "args": ["2"], "timeoutMs": 50}))
            .await
            .unwrap_err();
        assert!(matches!(err, SkillError::Timeout(_)));
    }
}
