//! 内存存储：测试与单进程运行使用

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{Checkpoint, Job, RunEvent, RunSetting};
use crate::storage::{Storage, StorageError};

#[derive(Default)]
struct Tables {
    /// job_id → [(checkpoint_id, json)]
    checkpoints: HashMap<String, Vec<(String, String)>>,
    /// (job_id, run_id) → [json]
    events: HashMap<(String, String), Vec<String>>,
    /// 按首次写入顺序
    jobs: Vec<(String, String)>,
    runs: Vec<(String, String)>,
}

#[derive(Default)]
pub struct InMemoryStorage {
    tables: RwLock<Tables>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

fn upsert(rows: &mut Vec<(String, String)>, key: &str, json: String) {
    match rows.iter_mut().find(|(k, _)| k == key) {
        Some(row) => row.1 = json,
        None => rows.push((key.to_string(), json)),
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn store_checkpoint(&self, checkpoint: &Checkpoint) -> Result<(), StorageError> {
        let json = serde_json::to_string(checkpoint)?;
        let mut tables = self.tables.write().await;
        let rows = tables
            .checkpoints
            .entry(checkpoint.job_id.clone())
            .or_default();
        upsert(rows, &checkpoint.id, json);
        Ok(())
    }

    async fn retrieve_checkpoint(
        &self,
        job_id: &str,
        checkpoint_id: &str,
    ) -> Result<Checkpoint, StorageError> {
        let tables = self.tables.read().await;
        let json = tables
            .checkpoints
            .get(job_id)
            .and_then(|rows| rows.iter().find(|(id, _)| id == checkpoint_id))
            .map(|(_, json)| json)
            .ok_or_else(|| StorageError::NotFound(format!("checkpoint {checkpoint_id} in job {job_id}")))?;
        Ok(serde_json::from_str(json)?)
    }

    async fn get_checkpoints_by_job_id(&self, job_id: &str) -> Result<Vec<Checkpoint>, StorageError> {
        let tables = self.tables.read().await;
        let Some(rows) = tables.checkpoints.get(job_id) else {
            return Ok(Vec::new());
        };
        rows.iter()
            .map(|(_, json)| serde_json::from_str(json).map_err(StorageError::from))
            .collect()
    }

    async fn store_event(&self, event: &RunEvent) -> Result<(), StorageError> {
        let json = serde_json::to_string(event)?;
        let mut tables = self.tables.write().await;
        tables
            .events
            .entry((event.job_id.clone(), event.run_id.clone()))
            .or_default()
            .push(json);
        Ok(())
    }

    async fn get_event_contents(
        &self,
        job_id: &str,
        run_id: &str,
        max_step: Option<u64>,
    ) -> Result<Vec<RunEvent>, StorageError> {
        let tables = self.tables.read().await;
        let Some(rows) = tables.events.get(&(job_id.to_string(), run_id.to_string())) else {
            return Ok(Vec::new());
        };
        let mut events = Vec::with_capacity(rows.len());
        for json in rows {
            let event: RunEvent = serde_json::from_str(json)?;
            if max_step.map_or(true, |max| event.step_number <= max) {
                events.push(event);
            }
        }
        Ok(events)
    }

    async fn store_job(&self, job: &Job) -> Result<(), StorageError> {
        let json = serde_json::to_string(job)?;
        let mut tables = self.tables.write().await;
        upsert(&mut tables.jobs, &job.id, json);
        Ok(())
    }

    async fn retrieve_job(&self, job_id: &str) -> Result<Option<Job>, StorageError> {
        let tables = self.tables.read().await;
        match tables.jobs.iter().find(|(id, _)| id == job_id) {
            Some((_, json)) => Ok(Some(serde_json::from_str(json)?)),
            None => Ok(None),
        }
    }

    async fn get_all_jobs(&self) -> Result<Vec<Job>, StorageError> {
        let tables = self.tables.read().await;
        tables
            .jobs
            .iter()
            .map(|(_, json)| serde_json::from_str(json).map_err(StorageError::from))
            .collect()
    }

    async fn store_run_setting(&self, setting: &RunSetting) -> Result<(), StorageError> {
        let json = serde_json::to_string(setting)?;
        let mut tables = self.tables.write().await;
        upsert(&mut tables.runs, &setting.run_id, json);
        Ok(())
    }

    async fn get_all_runs(&self) -> Result<Vec<RunSetting>, StorageError> {
        let tables = self.tables.read().await;
        tables
            .runs
            .iter()
            .map(|(_, json)| serde_json::from_str(json).map_err(StorageError::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        Expert, Message, MessagePart, ProviderConfig, ProviderName, RunEventKind, Step, Usage,
    };
    use std::collections::HashMap;

    fn setting() -> (RunSetting, Expert) {
        let expert = Expert::new("assistant", "help");
        let mut experts = HashMap::new();
        experts.insert(expert.key.clone(), expert.clone());
        let setting = RunSetting::new(
            "assistant",
            "gpt-4o",
            ProviderConfig::new(ProviderName::Openai),
            experts,
        );
        (setting, expert)
    }

    #[tokio::test]
    async fn test_checkpoint_round_trip_preserves_everything() {
        let storage = InMemoryStorage::new();
        let (setting, expert) = setting();
        let mut cp = Checkpoint::init(&setting, &expert);
        cp.messages.push(Message::instruction("help"));
        cp.messages.push(Message::user("2+2?"));
        cp.messages.push(Message::expert(vec![MessagePart::text("4")]));
        cp.usage = Usage::new(10, 2).with_reasoning(1);

        storage.store_checkpoint(&cp).await.unwrap();
        let restored = storage.retrieve_checkpoint(&cp.job_id, &cp.id).await.unwrap();
        assert_eq!(restored, cp);

        let missing = storage.retrieve_checkpoint(&cp.job_id, "nope").await;
        assert!(matches!(missing, Err(StorageError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_event_contents_filtered_by_step() {
        let storage = InMemoryStorage::new();
        let (setting, expert) = setting();
        for step in 1..=3 {
            let mut cp = Checkpoint::init(&setting, &expert);
            cp.step_number = step;
            let event = RunEvent::new(RunEventKind::ContinueToNextStep {
                checkpoint: cp,
                step: Step::new(step),
            });
            storage.store_event(&event).await.unwrap();
        }
        let all = storage
            .get_event_contents(&setting.job_id, &setting.run_id, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        let early = storage
            .get_event_contents(&setting.job_id, &setting.run_id, Some(2))
            .await
            .unwrap();
        assert_eq!(early.iter().map(|e| e.step_number).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_job_upsert_keeps_single_row() {
        let storage = InMemoryStorage::new();
        let mut job = Job::new("job-1", "assistant");
        storage.store_job(&job).await.unwrap();
        job.total_steps = 4;
        storage.store_job(&job).await.unwrap();
        let jobs = storage.get_all_jobs().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(storage.retrieve_job("job-1").await.unwrap().unwrap().total_steps, 4);
        assert!(storage.retrieve_job("job-2").await.unwrap().is_none());
    }
}
