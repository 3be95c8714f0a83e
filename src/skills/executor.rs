//! 工具执行器
//!
//! 对每次工具调用施加超时，输出结构化审计日志（JSON）；
//! 执行错误经 RecoveryEngine 判定：可回报模型的变成错误 ToolResult，配置错误向上返回。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::core::{EngineError, RecoveryAction, RecoveryEngine};
use crate::model::{ToolCall, ToolResult};
use crate::skills::{SkillError, SkillManager};

pub struct ToolExecutor {
    timeout: Duration,
    recovery: RecoveryEngine,
}

impl ToolExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            recovery: RecoveryEngine::new(),
        }
    }

    pub async fn execute(
        &self,
        manager: &dyn SkillManager,
        call: &ToolCall,
    ) -> Result<ToolResult, EngineError> {
        let start = Instant::now();
        let result = match timeout(self.timeout, manager.call_tool(&call.tool_name, call.args.clone())).await {
            Ok(result) => result,
            Err(_) => Err(SkillError::Timeout(format!(
                "{} did not finish within {}ms",
                call.tool_name,
                self.timeout.as_millis()
            ))),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(SkillError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "skill": call.skill_name,
            "tool": call.tool_name,
            "tool_call_id": call.id,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview(&call.args),
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(parts) => Ok(ToolResult::new(call, parts)),
            Err(e) => {
                let err = EngineError::Skill(e);
                match self.recovery.handle(&err, 0, 0) {
                    RecoveryAction::ReportToModel(message) => Ok(ToolResult::error(call, message)),
                    _ => Err(err),
                }
            }
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
