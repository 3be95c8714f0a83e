//! Calling / CallingDelegate / CallingInteractiveTool

use futures_util::future::join_all;

use crate::core::EngineError;
use crate::engine::classifier::classify;
use crate::engine::machine::{RunContext, RunState};
use crate::model::{
    CheckpointStatus, DelegationTarget, RunEventKind, ToolCall, ToolResult,
};
use crate::skills::{ATTEMPT_COMPLETION, BASE_SKILL_NAME};

const SKIPPED_BY_COMPLETION: &str =
    "Skipped: attemptCompletion was called in the same step.";

fn is_completion(call: &ToolCall) -> bool {
    call.skill_name == BASE_SKILL_NAME && call.tool_name == ATTEMPT_COMPLETION
}

/// attemptCompletion 的结果为空表示没有剩余 todo
fn completion_accepted(result: &ToolResult) -> bool {
    !result.is_error && result.result.is_empty()
}

pub async fn calling(ctx: &mut RunContext<'_>) -> Result<RunState, EngineError> {
    let pending = ctx.pending_calls();
    let mut partial = ctx.partial_results();
    let todo: Vec<ToolCall> = pending
        .iter()
        .filter(|c| !partial.iter().any(|r| r.id == c.id))
        .cloned()
        .collect();

    if let Some(completion) = todo.iter().find(|c| is_completion(c)).cloned() {
        let manager = ctx
            .registry
            .manager(BASE_SKILL_NAME)
            .ok_or_else(|| EngineError::UnknownTool(ATTEMPT_COMPLETION.to_string()))?;
        let result = ctx.tools.execute(manager.as_ref(), &completion).await?;
        let accepted = completion_accepted(&result);
        partial.push(result.clone());
        for call in todo.iter().filter(|c| c.id != completion.id) {
            partial.push(ToolResult::error(call, SKIPPED_BY_COMPLETION));
        }
        ctx.step.pending_tool_calls = Some(Vec::new());
        ctx.step.partial_tool_results = Some(partial.clone());
        ctx.sync_progress();

        if accepted {
            tracing::info!(run_id = %ctx.checkpoint.run_id, "attemptCompletion accepted");
            ctx.emit(|checkpoint, step| RunEventKind::AttemptCompletion {
                checkpoint,
                step,
                tool_result: result,
            })
            .await?;
            return Ok(RunState::GeneratingRunResult);
        }
        tracing::info!(run_id = %ctx.checkpoint.run_id, "attemptCompletion rejected, todos remain");
        ctx.emit(|checkpoint, step| RunEventKind::ResolveToolResults {
            checkpoint,
            step,
            tool_results: partial,
        })
        .await?;
        return Ok(RunState::Resolving);
    }

    let buckets = classify(&todo, ctx.registry)?;
    let tools = &ctx.tools;
    let outcomes = join_all(
        buckets
            .plain
            .iter()
            .map(|c| tools.execute(c.manager.as_ref(), &c.call)),
    )
    .await;
    for outcome in outcomes {
        partial.push(outcome?);
    }

    let remaining: Vec<ToolCall> = buckets
        .delegate
        .iter()
        .chain(buckets.interactive.iter())
        .map(|c| c.call.clone())
        .collect();
    ctx.step.pending_tool_calls = Some(remaining);
    ctx.step.partial_tool_results = Some(partial.clone());
    ctx.sync_progress();

    if !buckets.delegate.is_empty() {
        let tool_calls: Vec<ToolCall> = buckets.delegate.iter().map(|c| c.call.clone()).collect();
        ctx.emit(|checkpoint, step| RunEventKind::CallDelegate {
            checkpoint,
            step,
            tool_calls,
        })
        .await?;
        return Ok(RunState::CallingDelegate);
    }
    if let Some(first) = buckets.interactive.first() {
        let tool_call = first.call.clone();
        ctx.emit(|checkpoint, step| RunEventKind::CallInteractiveTool {
            checkpoint,
            step,
            tool_call,
        })
        .await?;
        return Ok(RunState::CallingInteractiveTool);
    }
    ctx.emit(|checkpoint, step| RunEventKind::ResolveToolResults {
        checkpoint,
        step,
        tool_results: partial,
    })
    .await?;
    Ok(RunState::Resolving)
}

/// 停下等待委派的子 Expert；delegateTo 按调用顺序记录目标
pub async fn calling_delegate(ctx: &mut RunContext<'_>) -> Result<RunState, EngineError> {
    let pending = ctx.pending_calls();
    let buckets = classify(&pending, ctx.registry)?;
    let mut targets = Vec::with_capacity(buckets.delegate.len());
    for entry in &buckets.delegate {
        let call = &entry.call;
        let expert = ctx
            .setting
            .experts
            .get(&call.skill_name)
            .ok_or_else(|| EngineError::DelegateExpertNotFound(call.skill_name.clone()))?;
        let query = call.args["query"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| call.args.to_string());
        targets.push(DelegationTarget {
            expert: expert.expert_ref(),
            tool_call_id: call.id.clone(),
            tool_name: call.tool_name.clone(),
            query,
        });
    }
    if targets.is_empty() {
        return Err(EngineError::Delegation(
            "no delegate calls pending".to_string(),
        ));
    }

    ctx.checkpoint.status = CheckpointStatus::StoppedByDelegate;
    ctx.checkpoint.delegate_to = Some(targets);
    ctx.sync_progress();
    ctx.step.finish();
    ctx.emit(|checkpoint, step| RunEventKind::StopRunByDelegate { checkpoint, step })
        .await?;
    Ok(RunState::Done)
}

pub async fn calling_interactive_tool(ctx: &mut RunContext<'_>) -> Result<RunState, EngineError> {
    ctx.checkpoint.status = CheckpointStatus::StoppedByInteractiveTool;
    ctx.sync_progress();
    ctx.step.finish();
    ctx.emit(|checkpoint, step| RunEventKind::StopRunByInteractiveTool { checkpoint, step })
        .await?;
    Ok(RunState::Done)
}
