//! 存储契约
//!
//! 引擎只依赖 Storage trait：每次状态转换后写入 Checkpoint 与 RunEvent，运行开始 / 结束时写入 Job。
//! 后端自行决定序列化形式；InMemoryStorage 保存 JSON 字符串，读取即一次真实的反序列化。

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::model::{Checkpoint, Job, RunEvent, RunSetting};

pub use memory::InMemoryStorage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

#[async_trait]
pub trait Storage: Send + Sync {
    async fn store_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StorageError>;

    async fn retrieve_checkpoint(
        &self,
        job_id: &str,
        checkpoint_id: &str,
    ) -> Result<Checkpoint, StorageError>;

    /// 按写入顺序返回
    async fn get_checkpoints_by_job_id(&self, job_id: &str) -> Result<Vec<Checkpoint>, StorageError>;

    async fn store_event(&self, event: &RunEvent) -> Result<(), StorageError>;

    /// max_step 为 Some 时只返回 stepNumber 不超过它的事件
    async fn get_event_contents(
        &self,
        job_id: &str,
        run_id: &str,
        max_step: Option<u64>,
    ) -> Result<Vec<RunEvent>, StorageError>;

    async fn store_job(&self, job: &Job) -> Result<(), StorageError>;

    async fn retrieve_job(&self, job_id: &str) -> Result<Option<Job>, StorageError>;

    async fn get_all_jobs(&self) -> Result<Vec<Job>, StorageError>;

    async fn store_run_setting(&self, setting: &RunSetting) -> Result<(), StorageError>;

    async fn get_all_runs(&self) -> Result<Vec<RunSetting>, StorageError>;
}
