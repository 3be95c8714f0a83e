//! Resolving：把本步工具结果折叠为一条 Tool 消息，决定继续还是停止

use crate::core::EngineError;
use crate::engine::machine::{RunContext, RunState};
use crate::model::{CheckpointStatus, Message, RunEventKind, Step};

pub async fn resolving(ctx: &mut RunContext<'_>) -> Result<RunState, EngineError> {
    let partial = ctx.step.partial_tool_results.take().unwrap_or_default();
    let results = ctx.ordered_results(partial);
    let message = Message::tool(&results);
    ctx.checkpoint.messages.push(message.clone());
    ctx.step.new_messages.push(message);
    ctx.step.tool_results = Some(results);
    ctx.step.pending_tool_calls = None;
    ctx.checkpoint.pending_tool_calls = None;
    ctx.checkpoint.partial_tool_results = None;
    ctx.checkpoint.delegate_to = None;
    ctx.checkpoint.retry_count = None;
    ctx.step.finish();

    if (ctx.should_continue)(&ctx.checkpoint, &ctx.setting) {
        ctx.checkpoint.step_number += 1;
        ctx.emit(|checkpoint, step| RunEventKind::ContinueToNextStep { checkpoint, step })
            .await?;
        ctx.step = Step::new(ctx.checkpoint.step_number);
        return Ok(RunState::Generating);
    }

    tracing::info!(
        run_id = %ctx.checkpoint.run_id,
        step = ctx.checkpoint.step_number,
        max_steps = ?ctx.setting.max_steps,
        "step limit reached"
    );
    ctx.checkpoint.status = CheckpointStatus::StoppedByExceededMaxSteps;
    ctx.emit(|checkpoint, step| RunEventKind::StopRunByExceededMaxSteps { checkpoint, step })
        .await?;
    Ok(RunState::Done)
}
