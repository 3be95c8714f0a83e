//! Init：新建、恢复或续写一次运行

use crate::core::EngineError;
use crate::engine::machine::{RunContext, RunState};
use crate::model::{
    CheckpointStatus, InteractiveToolCallResult, Message, MessagePart, RunEventKind, ToolCall,
    ToolResult,
};

/// Expert 指令 + 元信息块
fn instruction_message(ctx: &RunContext<'_>) -> Result<Message, EngineError> {
    let expert = ctx.setting.expert()?;
    let text = format!(
        "{}\n\n---\nMeta:\n- Expert: {}\n- Current time: {}",
        expert.instruction.trim_end(),
        expert.key,
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
    );
    Ok(Message::instruction(text))
}

fn input_text(ctx: &RunContext<'_>) -> Result<String, EngineError> {
    ctx.setting
        .input
        .text
        .clone()
        .ok_or_else(|| EngineError::Config("run input requires text".to_string()))
}

/// 外部结果 → ToolResult；必须回应一个挂起中的调用
fn external_result(
    result: &InteractiveToolCallResult,
    pending: &[ToolCall],
) -> Result<ToolResult, EngineError> {
    let call = pending
        .iter()
        .find(|c| c.id == result.tool_call_id)
        .ok_or_else(|| {
            EngineError::Config(format!(
                "tool call {} is not a pending tool call",
                result.tool_call_id
            ))
        })?;
    Ok(ToolResult::new(call, vec![MessagePart::text(&result.text)]))
}

pub async fn init(ctx: &mut RunContext<'_>) -> Result<RunState, EngineError> {
    let status = ctx.checkpoint.status;
    let mut input_messages = Vec::new();

    let next = if status == CheckpointStatus::Init && ctx.checkpoint.messages.is_empty() {
        input_messages.push(instruction_message(ctx)?);
        input_messages.push(Message::user(input_text(ctx)?));
        RunState::Generating
    } else if status.awaits_external_result() {
        let result = ctx
            .setting
            .input
            .interactive_tool_call_result
            .clone()
            .ok_or_else(|| {
                EngineError::Config(format!(
                    "resuming a run stopped with {status} requires interactiveToolCallResult"
                ))
            })?;
        let pending = ctx.checkpoint.pending_tool_calls.clone().unwrap_or_default();
        let answer = external_result(&result, &pending)?;
        ctx.checkpoint.pending_tool_calls = None;
        let mut partial = ctx.checkpoint.partial_tool_results.take().unwrap_or_default();
        partial.retain(|r| r.id != result.tool_call_id);
        partial.push(answer);
        let remaining: Vec<ToolCall> = pending
            .into_iter()
            .filter(|c| !partial.iter().any(|r| r.id == c.id))
            .collect();
        tracing::info!(
            run_id = %ctx.checkpoint.run_id,
            tool_call_id = %result.tool_call_id,
            remaining = remaining.len(),
            "resuming with external tool result"
        );

        let next = if remaining.is_empty() {
            RunState::Resolving
        } else {
            RunState::Calling
        };
        ctx.step.pending_tool_calls = Some(remaining);
        ctx.step.partial_tool_results = Some(partial);
        ctx.checkpoint.delegate_to = None;
        next
    } else {
        input_messages.push(Message::user(input_text(ctx)?));
        RunState::Generating
    };

    ctx.checkpoint.messages.extend(input_messages.iter().cloned());
    ctx.checkpoint.status = CheckpointStatus::Proceeding;
    ctx.step.input_messages = Some(input_messages.clone());
    ctx.sync_progress();
    ctx.emit(|checkpoint, step| RunEventKind::StartRun {
        checkpoint,
        step,
        input_messages,
    })
    .await?;
    Ok(next)
}
