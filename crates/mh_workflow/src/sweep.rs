// crates/mh_workflow/src/sweep.rs

//! 调参扫描
//!
//! 1. 真值（串行）：生成初始条件，加载或生成真值并缓存。所有组合开始前必须完成，
//!    失败即整个扫描失败。
//! 2. 组合（并行）：显式任务列表 `(i,j,k)` 交给 rayon 线程池，
//!    每个任务只读共享输入、只写自己的目录。单个组合失败不影响其他组合。
//!
//! 结果按组合写盘，本模块只汇总每个组合的结局。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use mh_config::{ConfigError, ExperimentConfig};
use mh_foundation::MhError;
use mh_io::{ArrayFile, ConfigIndex, IoError, SweepLayout, TruthCache};
use mh_verify::Grid;
use ndarray::{Array1, Array3};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::events::{EventDispatcher, LoggingListener, WorkflowEvent};
use crate::job::{ExperimentJob, JobStatus, TuningParameters};
use crate::params::ParameterGrid;
use crate::runner::{
    CollaboratorError, ExperimentRunner, InitialCondition, RunContext, RunnerError, TruthGenerator,
};
use crate::storage::{FileStorage, Storage};

fn default_events() -> EventDispatcher {
    let events = EventDispatcher::new();
    events.add_listener(Arc::new(LoggingListener::new("sweep")));
    events
}

/// 扫描错误（扫描级致命）
#[derive(Debug, Error)]
pub enum SweepError {
    /// 配置错误
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// 初始条件生成失败
    #[error("Initial condition failed: {0}")]
    InitialCondition(String),

    /// 输出目录、地形或真值缓存失败（含真值生成失败）
    #[error("Output error: {0}")]
    Io(#[from] IoError),

    /// 共享输入与网格不一致
    #[error("Invalid shared input: {0}")]
    Input(#[from] MhError),

    /// 线程池创建失败
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

/// 扫描选项
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOptions {
    /// 工作线程数 (0=自动)
    pub num_threads: usize,
    /// 跳过已完成的组合
    pub resume: bool,
}

/// 单个组合的结局
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "message", rename_all = "lowercase")]
pub enum Outcome {
    /// 完成
    Completed,
    /// 失败
    Failed(String),
    /// 续跑时跳过
    Skipped,
}

/// 单个组合的记录
#[derive(Debug, Clone, Serialize)]
pub struct RunRecord {
    /// 组合索引
    pub index: ConfigIndex,
    /// 调参
    pub params: TuningParameters,
    /// 结局
    pub outcome: Outcome,
    /// 运行时长 (秒)
    pub duration_secs: f64,
}

/// 扫描汇总
#[derive(Debug, Clone, Default, Serialize)]
pub struct SweepReport {
    /// 各组合记录，按 `(i,j,k)` 排序
    pub records: Vec<RunRecord>,
    /// 总时长 (秒)
    pub duration_secs: f64,
}

impl SweepReport {
    /// 按索引查找
    pub fn get(&self, index: ConfigIndex) -> Option<&RunRecord> {
        self.records.iter().find(|r| r.index == index)
    }

    /// 完成数
    pub fn completed(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Completed))
    }

    /// 跳过数
    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, Outcome::Skipped))
    }

    /// 失败的组合
    pub fn failures(&self) -> Vec<ConfigIndex> {
        self.records
            .iter()
            .filter(|r| matches!(r.outcome, Outcome::Failed(_)))
            .map(|r| r.index)
            .collect()
    }

    /// 是否全部成功（完成或跳过）
    pub fn is_success(&self) -> bool {
        self.failures().is_empty()
    }

    fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.records.iter().filter(|r| pred(&r.outcome)).count()
    }
}

/// 所有组合共享的不可变输入
#[derive(Debug, Clone)]
pub struct SharedInputs {
    /// 真值 `[state_dim, 1, Nmeas+1]`
    pub truth: Array3<f64>,
    /// 地形 `[Nk]`
    pub topography: Array1<f64>,
}

/// 调参扫描
pub struct ExperimentSweep<S: Storage = FileStorage> {
    layout: SweepLayout,
    params: ParameterGrid,
    grid: Grid,
    neq: usize,
    assimilation_times: Vec<f64>,
    identity: u64,
    options: SweepOptions,
    storage: S,
    events: Arc<EventDispatcher>,
}

impl ExperimentSweep<FileStorage> {
    /// 由实验配置创建（状态记录写在各组合目录）
    pub fn from_config(config: &ExperimentConfig) -> Result<Self, SweepError> {
        config.validate()?;
        let params = ParameterGrid::from(&config.sweep);
        let layout = SweepLayout::new(&config.output.directory, config.output.dirname.clone())
            .with_list_lengths(&params.list_lengths());
        let grid = Grid::new(config.grid.nk, config.grid.length)?;
        let storage = FileStorage::new(layout.clone());

        Ok(ExperimentSweep::new(
            layout,
            params,
            grid,
            config.model.neq,
            config.assimilation_times(),
            storage,
        )
        .with_identity(config.identity_hash())
        .with_options(SweepOptions {
            num_threads: config.runtime.num_threads,
            resume: config.runtime.resume,
        }))
    }
}

impl<S: Storage> ExperimentSweep<S> {
    /// 创建扫描（默认挂一个日志监听器）
    pub fn new(
        layout: SweepLayout,
        params: ParameterGrid,
        grid: Grid,
        neq: usize,
        assimilation_times: Vec<f64>,
        storage: S,
    ) -> Self {
        Self {
            layout,
            params,
            grid,
            neq,
            assimilation_times,
            identity: 0,
            options: SweepOptions::default(),
            storage,
            events: Arc::new(default_events()),
        }
    }

    /// 设置选项
    pub fn with_options(mut self, options: SweepOptions) -> Self {
        self.options = options;
        self
    }

    /// 设置真值身份
    pub fn with_identity(mut self, identity: u64) -> Self {
        self.identity = identity;
        self
    }

    /// 替换事件分发器（包括默认的日志监听器）
    pub fn with_events(mut self, events: Arc<EventDispatcher>) -> Self {
        self.events = events;
        self
    }

    /// 事件分发器
    pub fn events(&self) -> &Arc<EventDispatcher> {
        &self.events
    }

    /// 目录布局
    pub fn layout(&self) -> &SweepLayout {
        &self.layout
    }

    /// 调参网格
    pub fn params(&self) -> &ParameterGrid {
        &self.params
    }

    /// 状态存储
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// 任务计划：索引、参数、输出目录
    pub fn plan(&self) -> Vec<(ConfigIndex, TuningParameters, PathBuf)> {
        self.params
            .tasks()
            .into_iter()
            .map(|(index, p)| (index, p, self.layout.run_dir(index)))
            .collect()
    }

    /// 准备共享输入：初始条件、地形与真值
    pub fn prepare(
        &self,
        initial_condition: &dyn InitialCondition,
        generator: &dyn TruthGenerator,
    ) -> Result<SharedInputs, SweepError> {
        self.layout.create()?;

        let initial = initial_condition
            .initial_state(&self.grid)
            .map_err(|e| SweepError::InitialCondition(e.to_string()))?;
        MhError::check_axis("topography", "cell", self.grid.nk(), initial.topography.len())?;

        // 形状不符的生成结果不写入缓存
        let mut generated = false;
        let truth = TruthCache::new(self.layout.truth_path())
            .with_identity(self.identity)
            .get_or_create(|| -> Result<_, CollaboratorError> {
                generated = true;
                let truth = generator.generate(&initial, &self.grid, &self.assimilation_times)?;
                self.check_truth(&truth)?;
                Ok(truth)
            })?;
        self.check_truth(&truth)?;
        let topography = self.shared_topography(initial.topography, generated)?;

        self.events.emit(WorkflowEvent::TruthReady {
            shape: truth.shape().to_vec(),
        });
        Ok(SharedInputs { truth, topography })
    }

    /// 与真值配套的地形
    ///
    /// 真值来自缓存时沿用缓存旁的 `B_tr`，只有新生成真值（或 `B_tr` 不可用）时才写入。
    fn shared_topography(&self, fresh: Array1<f64>, generated: bool) -> Result<Array1<f64>, SweepError> {
        let path = self.layout.topography_path();
        let identity = (self.identity != 0).then_some(self.identity);

        if !generated {
            match ArrayFile::load(&path) {
                Ok(file) if file.identity == identity && file.shape == [self.grid.nk()] => {
                    tracing::debug!("Reusing topography from {}", path.display());
                    return Ok(file.into_array1("B_tr")?);
                }
                Ok(_) => tracing::warn!(
                    "Topography at {} does not belong to the cached truth, rewriting",
                    path.display()
                ),
                Err(e) => tracing::warn!("Cached topography unusable ({}), rewriting", e),
            }
        }

        ArrayFile::from_array(&fresh)
            .with_identity(self.identity)
            .save(&path)?;
        Ok(fresh)
    }

    fn check_truth(&self, truth: &Array3<f64>) -> Result<(), MhError> {
        let (state_dim, _, levels) = truth.dim();
        MhError::check_axis("U_tr_array", "state", self.neq * self.grid.nk(), state_dim)?;
        MhError::check_axis("U_tr_array", "time", self.assimilation_times.len(), levels)
    }

    /// 执行完整扫描：先真值，后组合
    pub fn run(
        &self,
        initial_condition: &dyn InitialCondition,
        generator: &dyn TruthGenerator,
        runner: &dyn ExperimentRunner,
    ) -> Result<SweepReport, SweepError> {
        let inputs = self.prepare(initial_condition, generator)?;
        self.run_with(&inputs, initial_condition, runner)
    }

    /// 在已准备好的共享输入上执行全部组合
    pub fn run_with(
        &self,
        inputs: &SharedInputs,
        initial_condition: &dyn InitialCondition,
        runner: &dyn ExperimentRunner,
    ) -> Result<SweepReport, SweepError> {
        let start = Instant::now();
        let tasks = self.params.tasks();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.options.num_threads)
            .build()
            .map_err(|e| SweepError::ThreadPool(e.to_string()))?;

        self.events.emit(WorkflowEvent::SweepStarted {
            configurations: tasks.len(),
            threads: pool.current_num_threads(),
        });

        let mut records: Vec<RunRecord> = pool.install(|| {
            tasks
                .par_iter()
                .map(|&(index, params)| self.run_task(index, params, inputs, initial_condition, runner))
                .collect()
        });
        records.sort_by_key(|r| r.index);

        let report = SweepReport {
            records,
            duration_secs: start.elapsed().as_secs_f64(),
        };
        self.events.emit(WorkflowEvent::SweepFinished {
            completed: report.completed(),
            failed: report.failures().len(),
            skipped: report.skipped(),
            duration_secs: report.duration_secs,
        });
        Ok(report)
    }

    /// 执行单个组合，所有错误都落到该组合的记录上
    fn run_task(
        &self,
        index: ConfigIndex,
        params: TuningParameters,
        inputs: &SharedInputs,
        initial_condition: &dyn InitialCondition,
        runner: &dyn ExperimentRunner,
    ) -> RunRecord {
        let output = self.layout.run_output(index);
        let record = |outcome, duration_secs| RunRecord {
            index,
            params,
            outcome,
            duration_secs,
        };

        if self.options.resume {
            match self.storage.load_job(index) {
                Ok(Some(job)) if !job.status.needs_run() => {
                    self.events.emit(WorkflowEvent::JobSkipped { index });
                    return record(Outcome::Skipped, 0.0);
                }
                Ok(_) => {}
                Err(e) => tracing::warn!("Status record for {} unreadable ({}), rerunning", index, e),
            }
        }

        let mut job = ExperimentJob::new(index, params, output.dir());
        job.mark_started();
        self.events.emit(WorkflowEvent::JobStarted { index });

        let ctx = RunContext {
            index,
            params,
            neq: self.neq,
            grid: &self.grid,
            assimilation_times: &self.assimilation_times,
            truth: &inputs.truth,
            topography: &inputs.topography,
            initial_condition,
            output: &output,
        };

        let result = self
            .storage
            .save_job(&job)
            .map_err(RunnerError::from)
            .and_then(|_| ctx.execute(runner));

        let (outcome, duration) = match result {
            Ok(duration) => {
                job.mark_completed();
                (Outcome::Completed, duration)
            }
            Err(e) => {
                let message = e.to_string();
                job.mark_failed(message.clone());
                (Outcome::Failed(message), 0.0)
            }
        };

        if let Err(e) = self.storage.save_job(&job) {
            tracing::warn!("Failed to record status for {}: {}", index, e);
        }

        match &outcome {
            Outcome::Failed(error) => self.events.emit(WorkflowEvent::JobFailed {
                index,
                error: error.clone(),
            }),
            _ => self.events.emit(WorkflowEvent::JobCompleted {
                index,
                duration_secs: duration,
            }),
        }
        debug_assert!(job.status == JobStatus::Completed || job.status == JobStatus::Failed);

        record(outcome, duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let params = TuningParameters {
            localization: 1e-10,
            additive_inflation: 0.2,
            multiplicative_inflation: 1.01,
        };
        let rec = |k, outcome| RunRecord {
            index: ConfigIndex::new(0, 0, k),
            params,
            outcome,
            duration_secs: 0.0,
        };
        let report = SweepReport {
            records: vec![
                rec(0, Outcome::Completed),
                rec(1, Outcome::Failed("diverged".into())),
                rec(2, Outcome::Skipped),
            ],
            duration_secs: 1.0,
        };
        assert_eq!(report.completed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.failures(), vec![ConfigIndex::new(0, 0, 1)]);
        assert!(!report.is_success());
        assert!(report.get(ConfigIndex::new(0, 0, 2)).is_some());

        let json = serde_json::to_string(&report.records[1].outcome).unwrap();
        assert_eq!(json, r#"{"outcome":"failed","message":"diverged"}"#);
    }
}
