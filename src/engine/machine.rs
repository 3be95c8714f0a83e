//! 运行状态机
//!
//! Init → Generating → Calling → Resolving → Generating …，另有 GeneratingRunResult、
//! CallingDelegate、CallingInteractiveTool 三个内部状态。每次转换恰好发出一个 RunEvent；
//! 转换之间检查取消令牌。startRun 之后的致命错误先以 stopRunByError 上报，再返回 Err。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::{EngineError, RecoveryEngine};
use crate::engine::emitter::Emitter;
use crate::engine::states;
use crate::llm::{GenerateRequest, GenerateResponse, LlmError, LlmExecutor};
use crate::model::{
    context_window_usage, Checkpoint, CheckpointStatus, Message, RunEventKind, RunFailure,
    RunSetting, Step, ToolCall, ToolResult, Usage,
};
use crate::skills::{SkillRegistry, ToolExecutor};

/// 是否进入下一步（默认：未设置 maxSteps 时总是继续）
pub type ShouldContinue = Arc<dyn Fn(&Checkpoint, &RunSetting) -> bool + Send + Sync>;

pub fn default_should_continue() -> ShouldContinue {
    Arc::new(|checkpoint, setting| {
        setting
            .max_steps
            .map_or(true, |max| checkpoint.step_number < max)
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Init,
    Generating,
    Calling,
    Resolving,
    GeneratingRunResult,
    CallingDelegate,
    CallingInteractiveTool,
    Done,
}

/// 一次 execute 的工作区
pub struct RunContext<'a> {
    pub setting: RunSetting,
    pub checkpoint: Checkpoint,
    pub step: Step,
    pub registry: &'a SkillRegistry,
    pub emitter: &'a Emitter,
    pub llm: LlmExecutor,
    pub tools: ToolExecutor,
    pub recovery: RecoveryEngine,
    pub streaming: bool,
    pub should_continue: ShouldContinue,
    started: bool,
}

impl<'a> RunContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        setting: RunSetting,
        checkpoint: Checkpoint,
        registry: &'a SkillRegistry,
        emitter: &'a Emitter,
        llm: LlmExecutor,
        tools: ToolExecutor,
        streaming: bool,
        should_continue: ShouldContinue,
    ) -> Self {
        let step = Step::new(checkpoint.step_number);
        Self {
            setting,
            checkpoint,
            step,
            registry,
            emitter,
            llm,
            tools,
            recovery: RecoveryEngine::new(),
            streaming,
            should_continue,
            started: false,
        }
    }

    /// 以当前 Checkpoint / Step 快照构造事件并发出
    pub async fn emit(
        &mut self,
        build: impl FnOnce(Checkpoint, Step) -> RunEventKind,
    ) -> Result<(), EngineError> {
        let kind = build(self.checkpoint.clone(), self.step.clone());
        if matches!(kind, RunEventKind::StartRun { .. }) {
            self.started = true;
        }
        self.emitter.emit(kind).await?;
        Ok(())
    }

    pub fn retry_count(&self) -> u32 {
        self.checkpoint.retry_count.unwrap_or(0)
    }

    /// 重试预算是否还有剩余（所有重试路径共用）
    pub fn can_retry(&self) -> bool {
        self.retry_count() < self.setting.max_retries
    }

    /// 消耗一次重试预算并回到 Generating
    pub async fn retry(
        &mut self,
        reason: String,
        new_messages: Vec<Message>,
        usage: Usage,
    ) -> Result<RunState, EngineError> {
        let count = self.retry_count() + 1;
        self.checkpoint.retry_count = Some(count);
        self.checkpoint.messages.extend(new_messages.iter().cloned());
        self.step.new_messages.extend(new_messages.iter().cloned());
        tracing::warn!(
            run_id = %self.checkpoint.run_id,
            retry = count,
            max_retries = self.setting.max_retries,
            reason = %reason,
            "retrying generation"
        );
        self.emit(|checkpoint, step| RunEventKind::Retry {
            checkpoint,
            step,
            reason,
            new_messages,
            usage,
        })
        .await?;
        Ok(RunState::Generating)
    }

    /// 调用模型；流式模式下增量经 emitter 转发
    pub async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        if self.streaming {
            let emitter = self.emitter;
            self.llm.stream(request, &|kind| emitter.runtime(kind)).await
        } else {
            self.llm.generate(request).await
        }
    }

    /// 把一次生成的用量计入当前步与 Checkpoint
    ///
    /// 每次请求都带上完整历史，窗口占用取最近一次生成的用量而非累计值。
    pub fn record_usage(&mut self, usage: Usage) {
        self.step.usage += usage;
        self.checkpoint.usage += usage;
        if let Some(window) = self.checkpoint.context_window {
            self.checkpoint.context_window_usage = Some(context_window_usage(&usage, window));
        }
    }

    pub fn pending_calls(&self) -> Vec<ToolCall> {
        self.step.pending_tool_calls.clone().unwrap_or_default()
    }

    pub fn partial_results(&self) -> Vec<ToolResult> {
        self.step.partial_tool_results.clone().unwrap_or_default()
    }

    /// 步内进度写回 Checkpoint，使停止状态可恢复
    pub fn sync_progress(&mut self) {
        self.checkpoint.pending_tool_calls = self.step.pending_tool_calls.clone();
        self.checkpoint.partial_tool_results = self.step.partial_tool_results.clone();
    }

    /// 按最近一条 Expert 消息中的调用顺序排列结果；不在其中的排在最后
    pub fn ordered_results(&self, mut results: Vec<ToolResult>) -> Vec<ToolResult> {
        let order = self.checkpoint.last_tool_call_order();
        results.sort_by_key(|r| order.iter().position(|id| id == &r.id).unwrap_or(usize::MAX));
        results
    }

    async fn stop_by_error(&mut self, err: &EngineError) {
        let error = match err {
            EngineError::Llm(e) => RunFailure {
                is_retryable: false,
                ..RunFailure::from(e)
            },
            other => RunFailure::new(other.name(), other.to_string()),
        };
        self.checkpoint.status = CheckpointStatus::StoppedByError;
        self.sync_progress();
        self.step.finish();
        let result = self
            .emit(|checkpoint, step| RunEventKind::StopRunByError {
                checkpoint,
                step,
                error,
            })
            .await;
        if let Err(e) = result {
            tracing::error!(run_id = %self.checkpoint.run_id, error = %e, "failed to record stopRunByError");
        }
    }
}

/// 驱动状态机直到完成、停止或出错
pub async fn drive(
    ctx: &mut RunContext<'_>,
    cancel: &CancellationToken,
) -> Result<Checkpoint, EngineError> {
    let mut state = RunState::Init;
    loop {
        if state != RunState::Done && cancel.is_cancelled() {
            tracing::info!(run_id = %ctx.checkpoint.run_id, ?state, "run cancelled");
            return Err(EngineError::Cancelled);
        }
        tracing::debug!(run_id = %ctx.checkpoint.run_id, step = ctx.checkpoint.step_number, ?state, "entering state");
        let next = match state {
            RunState::Init => states::init(ctx).await,
            RunState::Generating => states::generating(ctx).await,
            RunState::Calling => states::calling(ctx).await,
            RunState::Resolving => states::resolving(ctx).await,
            RunState::GeneratingRunResult => states::generating_run_result(ctx).await,
            RunState::CallingDelegate => states::calling_delegate(ctx).await,
            RunState::CallingInteractiveTool => states::calling_interactive_tool(ctx).await,
            RunState::Done => return Ok(ctx.checkpoint.clone()),
        };
        match next {
            Ok(next) => state = next,
            Err(err) => {
                tracing::error!(run_id = %ctx.checkpoint.run_id, ?state, error = %err, "run failed");
                if ctx.started && !matches!(err, EngineError::Cancelled) {
                    ctx.stop_by_error(&err).await;
                }
                return Err(err);
            }
        }
    }
}
