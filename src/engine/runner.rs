//! 引擎入口
//!
//! execute：启动技能、驱动一次状态机直到完成或停止，所有退出路径上都会关闭技能。
//! run：在 execute 之上处理委派：父运行因委派停止后运行子 Expert 并恢复父运行，
//! 直到不再因委派而停止。顶层运行在开始与结束时更新 Job。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use crate::core::EngineError;
use crate::engine::delegation;
use crate::engine::emitter::Emitter;
use crate::engine::machine::{default_should_continue, drive, RunContext, ShouldContinue};
use crate::llm::{LlmExecutor, ProviderAdapter};
use crate::model::{Checkpoint, CheckpointStatus, EngineEvent, Job, JobStatus, RunSetting};
use crate::skills::mcp::McpServerHandler;
use crate::skills::{skill_groups, SkillEventSink, SkillRegistry, ToolExecutor};
use crate::storage::Storage;

#[derive(Clone)]
pub struct Engine {
    adapter: Arc<dyn ProviderAdapter>,
    storage: Option<Arc<dyn Storage>>,
    listener: Option<UnboundedSender<EngineEvent>>,
    streaming: bool,
    should_continue: ShouldContinue,
    cancel: CancellationToken,
    tool_timeout: Duration,
    servers: HashMap<String, Arc<dyn McpServerHandler>>,
}

impl Engine {
    pub fn new(adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self {
            adapter,
            storage: None,
            listener: None,
            streaming: false,
            should_continue: default_should_continue(),
            cancel: CancellationToken::new(),
            tool_timeout: Duration::from_secs(60),
            servers: HashMap::new(),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_listener(mut self, listener: UnboundedSender<EngineEvent>) -> Self {
        self.listener = Some(listener);
        self
    }

    /// 流式调用模型，推理 / 结果增量以 RuntimeEvent 发给监听方
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_should_continue(mut self, should_continue: ShouldContinue) -> Self {
        self.should_continue = should_continue;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// 单次工具调用（含 exec 子进程）的超时
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    /// 以进程内 MCP 服务承载同名技能（取代其 stdio / HTTP 配置）
    pub fn register_in_process_server(
        mut self,
        skill_name: impl Into<String>,
        handler: Arc<dyn McpServerHandler>,
    ) -> Self {
        self.servers.insert(skill_name.into(), handler);
        self
    }

    pub fn storage(&self) -> Option<&Arc<dyn Storage>> {
        self.storage.as_ref()
    }

    /// 推进一次运行直到完成或停止（不处理委派）
    pub async fn execute(
        &self,
        setting: &RunSetting,
        checkpoint: Option<Checkpoint>,
    ) -> Result<Checkpoint, EngineError> {
        let expert = setting.expert()?.clone();
        if let Some(storage) = &self.storage {
            storage.store_run_setting(setting).await?;
        }
        let emitter = Emitter::new(
            &setting.job_id,
            &setting.run_id,
            self.storage.clone(),
            self.listener.clone(),
        );
        let sink: SkillEventSink = {
            let emitter = emitter.clone();
            Arc::new(move |kind| emitter.runtime(kind))
        };

        let groups = skill_groups(setting, &expert, &self.servers, self.tool_timeout)?;
        let registry = SkillRegistry::start(groups, Some(sink)).await?;
        tracing::info!(
            job_id = %setting.job_id,
            run_id = %setting.run_id,
            expert = %expert.key,
            tools = registry.tool_definitions().len(),
            "run starting"
        );

        let checkpoint = checkpoint.unwrap_or_else(|| Checkpoint::init(setting, &expert));
        let mut ctx = RunContext::new(
            setting.clone(),
            checkpoint,
            &registry,
            &emitter,
            LlmExecutor::new(self.adapter.clone(), setting),
            ToolExecutor::new(self.tool_timeout),
            self.streaming,
            self.should_continue.clone(),
        );
        let result = drive(&mut ctx, &self.cancel).await;
        registry.close_all().await;

        if let Ok(checkpoint) = &result {
            tracing::info!(
                run_id = %checkpoint.run_id,
                status = %checkpoint.status,
                step = checkpoint.step_number,
                "run stopped"
            );
        }
        result
    }

    /// 完整运行，包括委派子 Expert 与父运行的恢复
    pub fn run(
        &self,
        setting: RunSetting,
        checkpoint: Option<Checkpoint>,
    ) -> BoxFuture<'_, Result<Checkpoint, EngineError>> {
        Box::pin(async move {
            let top_level = checkpoint
                .as_ref()
                .map_or(true, |c| c.delegated_by.is_none());
            let mut job = if top_level {
                self.start_job(&setting).await?
            } else {
                None
            };

            let result = self.run_until_settled(setting, checkpoint).await;

            if let Some(job) = job.as_mut() {
                self.finish_job(job, &result).await?;
            }
            result
        })
    }

    async fn run_until_settled(
        &self,
        mut setting: RunSetting,
        mut checkpoint: Option<Checkpoint>,
    ) -> Result<Checkpoint, EngineError> {
        loop {
            let stopped = self.execute(&setting, checkpoint.take()).await?;
            if stopped.status != CheckpointStatus::StoppedByDelegate {
                return Ok(stopped);
            }
            let outcome = delegation::delegate(self, &setting, &stopped).await?;
            setting = setting.resumed_with(outcome.result);
            checkpoint = Some(outcome.checkpoint);
        }
    }

    async fn start_job(&self, setting: &RunSetting) -> Result<Option<Job>, EngineError> {
        let Some(storage) = &self.storage else {
            return Ok(None);
        };
        let mut job = match storage.retrieve_job(&setting.job_id).await? {
            Some(job) => job,
            None => Job::new(&setting.job_id, &setting.expert_key),
        };
        job.status = JobStatus::Running;
        job.max_steps = setting.max_steps;
        job.finished_at = None;
        storage.store_job(&job).await?;
        Ok(Some(job))
    }

    async fn finish_job(
        &self,
        job: &mut Job,
        result: &Result<Checkpoint, EngineError>,
    ) -> Result<(), EngineError> {
        let Some(storage) = &self.storage else {
            return Ok(());
        };
        match result {
            Ok(checkpoint) => {
                job.status = checkpoint.status.into();
                job.total_steps = checkpoint.step_number;
                job.usage = checkpoint.usage;
            }
            Err(_) => job.status = JobStatus::StoppedByError,
        }
        job.finished_at = Some(chrono::Utc::now().timestamp_millis());
        storage.store_job(job).await?;
        Ok(())
    }
}
