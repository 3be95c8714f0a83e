//! 委派编排
//!
//! 父运行停在 stoppedByDelegate 后：为每个 delegateTo 目标构造子 RunSetting / Checkpoint，
//! 并发跑完整个引擎，再把子结果聚合回父 Checkpoint。父子只通过 id 互相引用。

use futures_util::future::join_all;

use crate::core::EngineError;
use crate::engine::runner::Engine;
use crate::model::{
    Checkpoint, CheckpointStatus, InteractiveToolCallResult, MessagePart, RunSetting, ToolCall,
    ToolResult, Usage,
};

/// 聚合结果：恢复用的父 Checkpoint + 第一个目标的结果（作为外部工具结果）
#[derive(Debug, Clone)]
pub struct DelegationOutcome {
    pub checkpoint: Checkpoint,
    pub result: InteractiveToolCallResult,
}

pub async fn delegate(
    engine: &Engine,
    setting: &RunSetting,
    parent: &Checkpoint,
) -> Result<DelegationOutcome, EngineError> {
    let targets = parent.delegate_to.clone().unwrap_or_default();
    if targets.is_empty() {
        return Err(EngineError::Delegation(format!(
            "checkpoint {} stopped for delegation without targets",
            parent.id
        )));
    }
    tracing::info!(
        run_id = %parent.run_id,
        delegates = targets.len(),
        "running delegated experts"
    );

    let runs = targets.iter().map(|target| async move {
        let child_setting = setting.for_delegation(&target.expert.key, &target.query);
        let child_expert = child_setting
            .experts
            .get(&target.expert.key)
            .cloned()
            .ok_or_else(|| EngineError::DelegateExpertNotFound(target.expert.key.clone()))?;
        let child = Checkpoint::for_delegation(parent, target, &child_setting, &child_expert);
        engine.run(child_setting, Some(child)).await
    });
    let finished = join_all(runs).await;

    let mut children = Vec::with_capacity(targets.len());
    for (target, finished) in targets.iter().zip(finished) {
        let child = finished?;
        if child.status != CheckpointStatus::Completed {
            return Err(EngineError::Delegation(format!(
                "delegate {} stopped with status {} instead of completing",
                target.expert.key, child.status
            )));
        }
        let text = child.final_text().ok_or_else(|| {
            EngineError::Delegation(format!(
                "delegate {} completed without a text reply",
                target.expert.key
            ))
        })?;
        children.push((target, child, text));
    }

    let mut checkpoint = parent.clone();
    checkpoint.usage += children.iter().map(|(_, child, _)| child.usage).sum::<Usage>();
    checkpoint.step_number = children
        .iter()
        .map(|(_, child, _)| child.step_number)
        .fold(parent.step_number, u64::max);

    let mut partial = checkpoint.partial_tool_results.take().unwrap_or_default();
    let mut pending = checkpoint.pending_tool_calls.take().unwrap_or_default();
    for (target, _, text) in children.iter().skip(1) {
        let call = ToolCall::new(
            &target.tool_call_id,
            &target.expert.key,
            &target.tool_name,
            serde_json::Value::Null,
        );
        partial.push(ToolResult::new(&call, vec![MessagePart::text(text)]));
        pending.retain(|c| c.id != target.tool_call_id);
    }
    checkpoint.partial_tool_results = Some(partial);
    checkpoint.pending_tool_calls = Some(pending);

    let (first, _, text) = &children[0];
    Ok(DelegationOutcome {
        checkpoint,
        result: InteractiveToolCallResult {
            tool_call_id: first.tool_call_id.clone(),
            tool_name: first.tool_name.clone(),
            skill_name: first.expert.key.clone(),
            text: text.clone(),
        },
    })
}
