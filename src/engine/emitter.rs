//! 事件发射
//!
//! 每次状态转换：先持久化 Checkpoint 与 RunEvent（配置了存储时），再按顺序发给监听方。
//! 监听方通道是即发即弃的，接收端关闭不影响运行。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::core::EngineError;
use crate::model::{EngineEvent, RunEvent, RunEventKind, RuntimeEvent, RuntimeEventKind};
use crate::storage::Storage;

#[derive(Clone)]
pub struct Emitter {
    job_id: String,
    run_id: String,
    storage: Option<Arc<dyn Storage>>,
    listener: Option<UnboundedSender<EngineEvent>>,
}

impl Emitter {
    pub fn new(
        job_id: impl Into<String>,
        run_id: impl Into<String>,
        storage: Option<Arc<dyn Storage>>,
        listener: Option<UnboundedSender<EngineEvent>>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            run_id: run_id.into(),
            storage,
            listener,
        }
    }

    pub async fn emit(&self, kind: RunEventKind) -> Result<RunEvent, EngineError> {
        let event = RunEvent::new(kind);
        if let Some(storage) = &self.storage {
            storage.store_checkpoint(event.kind.checkpoint()).await?;
            storage.store_event(&event).await?;
        }
        tracing::info!(
            run_id = %event.run_id,
            expert = %event.expert_key,
            step = event.step_number,
            event = event.name(),
            "run transition"
        );
        if let Some(tx) = &self.listener {
            let _ = tx.send(EngineEvent::Run(Box::new(event.clone())));
        }
        Ok(event)
    }

    pub fn runtime(&self, kind: RuntimeEventKind) {
        tracing::trace!(run_id = %self.run_id, event = ?kind, "runtime event");
        if let Some(tx) = &self.listener {
            let _ = tx.send(EngineEvent::Runtime(RuntimeEvent {
                job_id: self.job_id.clone(),
                run_id: self.run_id.clone(),
                timestamp: chrono::Utc::now().timestamp_millis(),
                kind,
            }));
        }
    }
}
