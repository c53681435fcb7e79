// crates/mh_workflow/src/lib.rs

//! MariHydro 工作流模块
//!
//! EnKF 调参扫描的编排：准备共享的真值与地形，再对每个调参组合并行调用外部运行器。
//!
//! # 模块结构
//!
//! - [`params`]: 调参网格（三个参数列表的笛卡尔积）
//! - [`job`]: 单个组合的任务与状态
//! - [`runner`]: 外部协作者接口与单组合执行
//! - [`sweep`]: 扫描编排与结果汇总
//! - [`storage`]: 任务状态持久化（续跑用）
//! - [`events`]: 事件系统
//!
//! # 示例
//!
//! ```rust,ignore
//! use mh_config::ExperimentConfig;
//! use mh_workflow::ExperimentSweep;
//!
//! let config = ExperimentConfig::from_file("experiment.json")?;
//! let sweep = ExperimentSweep::from_config(&config)?;
//! let report = sweep.run(&initial_condition, &truth_model, &enkf)?;
//! println!("{} completed, failed: {:?}", report.completed(), report.failures());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod events;
pub mod job;
pub mod params;
pub mod runner;
pub mod storage;
pub mod sweep;

// 重导出核心类型
pub use events::{EventDispatcher, EventListener, FnListener, LoggingListener, WorkflowEvent};
pub use job::{ExperimentJob, JobStatus, TuningParameters};
pub use params::ParameterGrid;
pub use runner::{
    CollaboratorError, ExperimentRunner, InitialCondition, InitialState, RunContext, RunnerError,
    TruthGenerator,
};
pub use storage::{FileStorage, Storage, StorageError, STATUS_FILE};
pub use sweep::{
    ExperimentSweep, Outcome, RunRecord, SharedInputs, SweepError, SweepOptions, SweepReport,
};
