// crates/mh_workflow/src/storage.rs

//! 任务状态存储
//!
//! 状态记录以组合索引为键。文件存储把每条记录写成组合目录下的 `status.json`，
//! 续跑时据此跳过已完成的组合。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use mh_io::{ConfigIndex, SweepLayout};
use parking_lot::RwLock;
use thiserror::Error;

use crate::job::ExperimentJob;

/// 状态记录文件名
pub const STATUS_FILE: &str = "status.json";

/// 存储错误
#[derive(Debug, Error)]
pub enum StorageError {
    /// IO错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// 存储后端trait
pub trait Storage: Send + Sync {
    /// 保存任务
    fn save_job(&self, job: &ExperimentJob) -> Result<(), StorageError>;

    /// 加载任务
    fn load_job(&self, index: ConfigIndex) -> Result<Option<ExperimentJob>, StorageError>;
}

/// 文件存储：记录写在各组合目录中
#[derive(Debug)]
pub struct FileStorage {
    layout: SweepLayout,
    cache: RwLock<HashMap<ConfigIndex, ExperimentJob>>,
}

impl FileStorage {
    /// 在扫描布局上创建文件存储
    pub fn new(layout: SweepLayout) -> Self {
        Self {
            layout,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// 记录文件路径
    pub fn status_path(&self, index: ConfigIndex) -> PathBuf {
        self.layout.run_dir(index).join(STATUS_FILE)
    }

    fn load_from_file(path: &Path) -> Result<ExperimentJob, StorageError> {
        let json = std::fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| StorageError::Serialization(e.to_string()))
    }
}

impl Storage for FileStorage {
    fn save_job(&self, job: &ExperimentJob) -> Result<(), StorageError> {
        let path = self.status_path(job.index);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(job)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        std::fs::write(&path, json)?;

        self.cache.write().insert(job.index, job.clone());
        Ok(())
    }

    fn load_job(&self, index: ConfigIndex) -> Result<Option<ExperimentJob>, StorageError> {
        if let Some(job) = self.cache.read().get(&index).cloned() {
            return Ok(Some(job));
        }

        let path = self.status_path(index);
        if !path.exists() {
            return Ok(None);
        }

        let job = Self::load_from_file(&path)?;
        self.cache.write().insert(index, job.clone());
        Ok(Some(job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobStatus, TuningParameters};

    fn create_test_job(index: ConfigIndex, layout: &SweepLayout) -> ExperimentJob {
        let params = TuningParameters {
            localization: 1e-10,
            additive_inflation: 0.2,
            multiplicative_inflation: 1.01,
        };
        ExperimentJob::new(index, params, layout.run_dir(index))
    }

    #[test]
    fn test_file_storage_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = SweepLayout::new(temp_dir.path(), "exp");
        let index = ConfigIndex::new(0, 0, 2);

        {
            let storage = FileStorage::new(layout.clone());
            let mut job = create_test_job(index, &layout);
            job.mark_started();
            job.mark_completed();
            storage.save_job(&job).unwrap();
            assert!(storage.status_path(index).ends_with("exp113/status.json"));
        }

        let reopened = FileStorage::new(layout);
        let loaded = reopened.load_job(index).unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert!(reopened.load_job(ConfigIndex::new(0, 0, 0)).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let temp_dir = tempfile::tempdir().unwrap();
        let layout = SweepLayout::new(temp_dir.path(), "exp");
        let index = ConfigIndex::new(0, 0, 0);
        let storage = FileStorage::new(layout);
        let path = storage.status_path(index);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, "{ not json").unwrap();

        assert!(matches!(storage.load_job(index), Err(StorageError::Serialization(_))));
    }
}
