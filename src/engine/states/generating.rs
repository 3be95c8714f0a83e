//! Generating / GeneratingRunResult：调用模型并决定下一步

use crate::core::{EngineError, RecoveryAction};
use crate::engine::classifier::{classify, resolve_calls};
use crate::engine::machine::{RunContext, RunState};
use crate::llm::{FinishReason, GenerateResponse, LlmError};
use crate::model::{
    CheckpointStatus, Message, MessagePart, RunEventKind, ToolCall, ToolResult, Usage,
};

const EMPTY_RESPONSE_PROMPT: &str =
    "Your previous response was empty. Reply with a final answer or call a tool.";

fn expert_message(response: &GenerateResponse, calls: &[ToolCall]) -> Message {
    let mut parts = Vec::new();
    if let Some(reasoning) = response.reasoning.as_deref().filter(|r| !r.trim().is_empty()) {
        parts.push(MessagePart::thinking(reasoning));
    }
    if !response.text.trim().is_empty() {
        parts.push(MessagePart::text(&response.text));
    }
    for call in calls {
        parts.push(MessagePart::tool_call(&call.id, &call.tool_name, call.args.clone()));
    }
    Message::expert(parts)
}

/// 模型调用失败：预算内重试，否则以不可重试错误终止
async fn on_llm_failure(ctx: &mut RunContext<'_>, err: LlmError) -> Result<RunState, EngineError> {
    let action = ctx.recovery.handle(
        &EngineError::Llm(err.clone()),
        ctx.retry_count(),
        ctx.setting.max_retries,
    );
    match action {
        RecoveryAction::Retry(reason) => {
            let notice = Message::user(format!(
                "The previous generation failed ({reason}). Please try again."
            ));
            ctx.retry(reason, vec![notice], Usage::default()).await
        }
        _ => Err(EngineError::Llm(err.non_retryable())),
    }
}

/// 重试预算耗尽时的错误
fn exhausted(name: &str, message: String) -> EngineError {
    EngineError::Llm(LlmError::new(name, message, None).non_retryable())
}

pub async fn generating(ctx: &mut RunContext<'_>) -> Result<RunState, EngineError> {
    let request = ctx.llm.request(
        ctx.checkpoint.messages.clone(),
        ctx.registry.tool_definitions().to_vec(),
    );
    let response = match ctx.generate(&request).await {
        Ok(response) => response,
        Err(err) => return on_llm_failure(ctx, err).await,
    };
    ctx.record_usage(response.usage);
    let usage = response.usage;

    if !response.tool_calls.is_empty() {
        if response.finish_reason == FinishReason::Length {
            // 参数可能被截断：每个调用给出错误结果，让模型重新生成
            if !ctx.can_retry() {
                return Err(exhausted(
                    "LengthExceededError",
                    "output limit reached while generating tool calls".to_string(),
                ));
            }
            let calls: Vec<ToolCall> = response
                .tool_calls
                .iter()
                .map(|g| {
                    let skill = ctx
                        .registry
                        .resolve_tool(&g.tool_name)
                        .map(|m| m.name().to_string())
                        .unwrap_or_default();
                    ToolCall::new(&g.id, skill, &g.tool_name, g.args.clone())
                })
                .collect();
            let results: Vec<ToolResult> = calls
                .iter()
                .map(|c| {
                    ToolResult::error(
                        c,
                        "The output limit was reached before this tool call was complete. Retry with shorter arguments.",
                    )
                })
                .collect();
            let messages = vec![expert_message(&response, &calls), Message::tool(&results)];
            return ctx
                .retry("output length exceeded".to_string(), messages, usage)
                .await;
        }

        let calls = resolve_calls(&response.tool_calls, ctx.registry)?;
        let buckets = classify(&calls, ctx.registry)?;
        let message = expert_message(&response, &calls);
        ctx.checkpoint.messages.push(message.clone());
        ctx.step.new_messages.push(message.clone());
        ctx.step.tool_calls = Some(calls.clone());
        ctx.step.pending_tool_calls = Some(calls.clone());
        ctx.step.partial_tool_results = Some(Vec::new());
        ctx.sync_progress();

        // 没有可直接执行的调用：委派优先，其次交互式
        if buckets.plain.is_empty() && !buckets.delegate.is_empty() {
            let tool_calls: Vec<ToolCall> =
                buckets.delegate.iter().map(|c| c.call.clone()).collect();
            ctx.emit(|checkpoint, step| RunEventKind::CallDelegate {
                checkpoint,
                step,
                tool_calls,
            })
            .await?;
            return Ok(RunState::CallingDelegate);
        }
        if let Some(first) = buckets.interactive.first().filter(|_| buckets.plain.is_empty()) {
            let tool_call = first.call.clone();
            ctx.emit(|checkpoint, step| RunEventKind::CallInteractiveTool {
                checkpoint,
                step,
                tool_call,
            })
            .await?;
            return Ok(RunState::CallingInteractiveTool);
        }
        ctx.emit(|checkpoint, step| RunEventKind::CallTools {
            checkpoint,
            step,
            new_message: message,
            tool_calls: calls,
            usage,
        })
        .await?;
        return Ok(RunState::Calling);
    }

    if response.text.trim().is_empty() {
        if !ctx.can_retry() {
            return Err(exhausted(
                "EmptyResponseError",
                "model returned neither text nor tool calls".to_string(),
            ));
        }
        return ctx
            .retry(
                "empty response".to_string(),
                vec![Message::user(EMPTY_RESPONSE_PROMPT)],
                usage,
            )
            .await;
    }

    complete(ctx, &response).await
}

/// attemptCompletion 成功后：不带工具再生成一次最终回复
pub async fn generating_run_result(ctx: &mut RunContext<'_>) -> Result<RunState, EngineError> {
    if let Some(partial) = ctx.step.partial_tool_results.take() {
        let results = ctx.ordered_results(partial);
        let message = Message::tool(&results);
        ctx.checkpoint.messages.push(message.clone());
        ctx.step.new_messages.push(message);
        ctx.step.tool_results = Some(results);
        ctx.step.pending_tool_calls = None;
        ctx.sync_progress();
    }

    let request = ctx.llm.request(ctx.checkpoint.messages.clone(), Vec::new());
    let response = match ctx.generate(&request).await {
        Ok(response) => response,
        Err(err) => return on_llm_failure(ctx, err).await,
    };
    ctx.record_usage(response.usage);

    if response.text.trim().is_empty() {
        if !ctx.can_retry() {
            return Err(exhausted(
                "EmptyResponseError",
                "model returned no final answer after attemptCompletion".to_string(),
            ));
        }
        return ctx
            .retry(
                "empty run result".to_string(),
                vec![Message::user(EMPTY_RESPONSE_PROMPT)],
                response.usage,
            )
            .await;
    }

    complete(ctx, &response).await
}

async fn complete(ctx: &mut RunContext<'_>, response: &GenerateResponse) -> Result<RunState, EngineError> {
    let message = expert_message(response, &[]);
    ctx.checkpoint.messages.push(message.clone());
    ctx.step.new_messages.push(message);
    ctx.checkpoint.status = CheckpointStatus::Completed;
    ctx.checkpoint.retry_count = None;
    ctx.step.finish();
    let text = response.text.clone();
    let usage = response.usage;
    ctx.emit(|checkpoint, step| RunEventKind::CompleteRun {
        checkpoint,
        step,
        text,
        usage,
    })
    .await?;
    Ok(RunState::Done)
}
