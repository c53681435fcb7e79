// crates/mh_workflow/src/job.rs

//! 实验任务定义
//!
//! 每个调参组合 `(i,j,k)` 对应一个任务。任务以组合索引为键，
//! 状态记录以 JSON 形式写在组合目录中，供续跑判断。

use std::fmt;
use std::path::PathBuf;

use mh_io::ConfigIndex;
use serde::{Deserialize, Serialize};

/// 滤波器调参三元组
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TuningParameters {
    /// 局地化半径
    pub localization: f64,
    /// 加性膨胀幅度
    pub additive_inflation: f64,
    /// 乘性膨胀因子
    pub multiplicative_inflation: f64,
}

impl fmt::Display for TuningParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "loc={} add_inf={} inf={}",
            self.localization, self.additive_inflation, self.multiplicative_inflation
        )
    }
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// 等待中
    Pending,
    /// 运行中
    Running,
    /// 已完成
    Completed,
    /// 失败
    Failed,
    /// 续跑时跳过
    Skipped,
}

impl JobStatus {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }

    /// 续跑时是否需要重跑
    pub fn needs_run(&self) -> bool {
        !matches!(self, Self::Completed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "Pending",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
        };
        write!(f, "{}", s)
    }
}

/// 单个组合的实验任务
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentJob {
    /// 组合索引
    pub index: ConfigIndex,
    /// 调参
    pub params: TuningParameters,
    /// 输出目录
    pub output_dir: PathBuf,
    /// 状态
    pub status: JobStatus,
    /// 创建时间
    pub created_at: chrono::DateTime<chrono::Utc>,
    /// 开始时间
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    /// 结束时间
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
    /// 错误信息
    pub error: Option<String>,
}

impl ExperimentJob {
    /// 创建新任务
    pub fn new(index: ConfigIndex, params: TuningParameters, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            index,
            params,
            output_dir: output_dir.into(),
            status: JobStatus::Pending,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    /// 标记开始
    pub fn mark_started(&mut self) {
        self.status = JobStatus::Running;
        self.started_at = Some(chrono::Utc::now());
        self.completed_at = None;
        self.error = None;
    }

    /// 标记完成
    pub fn mark_completed(&mut self) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(chrono::Utc::now());
    }

    /// 标记失败
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(chrono::Utc::now());
        self.error = Some(error.into());
    }

    /// 标记跳过
    pub fn mark_skipped(&mut self) {
        self.status = JobStatus::Skipped;
    }

    /// 运行时长
    pub fn elapsed(&self) -> Option<chrono::Duration> {
        self.started_at.map(|start| {
            let end = self.completed_at.unwrap_or_else(chrono::Utc::now);
            end - start
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TuningParameters {
        TuningParameters {
            localization: 1e-10,
            additive_inflation: 0.2,
            multiplicative_inflation: 1.05,
        }
    }

    #[test]
    fn test_job_status() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Running.is_terminal());

        assert!(!JobStatus::Completed.needs_run());
        assert!(JobStatus::Failed.needs_run());
        assert!(JobStatus::Running.needs_run());
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = ExperimentJob::new(ConfigIndex::new(0, 0, 1), params(), "out/test_enkf112");
        assert_eq!(job.status, JobStatus::Pending);
        assert!(job.elapsed().is_none());

        job.mark_started();
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.started_at.is_some());

        job.mark_failed("filter diverged");
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.error.as_deref(), Some("filter diverged"));

        // 重跑清除旧错误
        job.mark_started();
        assert!(job.error.is_none());
        job.mark_completed();
        assert_eq!(job.status, JobStatus::Completed);
        assert!(job.elapsed().is_some());
    }

    #[test]
    fn test_job_json_round_trip() {
        let job = ExperimentJob::new(ConfigIndex::new(2, 0, 1), params(), "x");
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"pending\""));
        let back: ExperimentJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.index, job.index);
        assert_eq!(back.params, job.params);
    }
}
