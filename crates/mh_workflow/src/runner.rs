// crates/mh_workflow/src/runner.rs

//! 任务运行器模块
//!
//! 外部协作者接口（初始条件、真值积分、单组合 EnKF 运行）以及单个任务的执行。
//!
//! 单个任务只读取共享的不可变输入（网格、地形、真值），只写自己的输出目录。
//! 协作者返回错误或 panic 都只记到该组合名下。

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use mh_io::{ArtifactKind, ConfigIndex, IoError, RunOutput};
use mh_verify::Grid;
use ndarray::{Array1, Array2, Array3};
use thiserror::Error;

use crate::job::TuningParameters;
use crate::storage::StorageError;

/// 协作者错误
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

/// 运行器错误
#[derive(Debug, Error)]
pub enum RunnerError {
    /// 协作者返回错误（如滤波发散）
    #[error("Run failed: {0}")]
    Collaborator(String),

    /// 协作者 panic
    #[error("Run panicked: {0}")]
    Panicked(String),

    /// 运行结束但输出不完整
    #[error("Run finished without writing {0:?}")]
    MissingArtifacts(Vec<&'static str>),

    /// 输出错误
    #[error("Output error: {0}")]
    Io(#[from] IoError),

    /// 状态记录错误
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

// ============================================================
// 协作者接口
// ============================================================

/// 初始状态：状态骨架 `[Neq, Nk]` 与地形 `[Nk]`
#[derive(Debug, Clone)]
pub struct InitialState {
    /// 状态骨架
    pub state: Array2<f64>,
    /// 地形
    pub topography: Array1<f64>,
}

/// 初始条件生成器
pub trait InitialCondition: Send + Sync {
    /// 在网格上生成初始状态
    fn initial_state(&self, grid: &Grid) -> Result<InitialState, CollaboratorError>;
}

/// 真值积分器
pub trait TruthGenerator: Send + Sync {
    /// 从初始状态积分出真值轨迹 `[state_dim, 1, Nmeas+1]`
    fn generate(
        &self,
        skeleton: &InitialState,
        grid: &Grid,
        assimilation_times: &[f64],
    ) -> Result<Array3<f64>, CollaboratorError>;
}

/// 单组合 EnKF 运行
///
/// 实现需写出 `X_array`、`Xan_array`、`Y_obs_array` 到 `ctx.output`；
/// 地形、真值与方程数信息由运行器预先写好。
pub trait ExperimentRunner: Send + Sync {
    /// 运行一个组合
    fn run_one(&self, ctx: &RunContext<'_>) -> Result<(), CollaboratorError>;
}

/// 单个组合的运行上下文
pub struct RunContext<'a> {
    /// 组合索引
    pub index: ConfigIndex,
    /// 调参
    pub params: TuningParameters,
    /// 方程数
    pub neq: usize,
    /// 网格
    pub grid: &'a Grid,
    /// 同化时刻
    pub assimilation_times: &'a [f64],
    /// 真值轨迹
    pub truth: &'a Array3<f64>,
    /// 地形
    pub topography: &'a Array1<f64>,
    /// 初始条件（用于生成集合初值）
    pub initial_condition: &'a dyn InitialCondition,
    /// 本组合的输出句柄
    pub output: &'a RunOutput,
}

/// 由协作者写出的数组，每次执行前清除
const RUNNER_OUTPUTS: [ArtifactKind; 3] = [
    ArtifactKind::Forecast,
    ArtifactKind::Analysis,
    ArtifactKind::Observations,
];

impl<'a> RunContext<'a> {
    /// 执行一个组合：清除旧输出、写共享数组、调用协作者、检查输出完整性
    ///
    /// 返回运行时长（秒）。
    pub fn execute(&self, runner: &dyn ExperimentRunner) -> Result<f64, RunnerError> {
        let start = Instant::now();

        self.output.create()?;
        for kind in RUNNER_OUTPUTS {
            self.output.remove(kind)?;
        }
        self.output.write(ArtifactKind::Topography, self.topography)?;
        self.output.write(ArtifactKind::Truth, self.truth)?;
        self.output
            .write_equation_info(self.neq, self.assimilation_times.len())?;

        tracing::debug!("Running config {} ({})", self.index, self.params);
        match catch_unwind(AssertUnwindSafe(|| runner.run_one(self))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(RunnerError::Collaborator(e.to_string())),
            Err(payload) => return Err(RunnerError::Panicked(panic_message(payload.as_ref()))),
        }

        let missing: Vec<&'static str> = ArtifactKind::ALL
            .iter()
            .filter(|k| !self.output.exists(**k))
            .map(|k| k.stem())
            .collect();
        if !missing.is_empty() {
            return Err(RunnerError::MissingArtifacts(missing));
        }

        Ok(start.elapsed().as_secs_f64())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mh_io::SweepLayout;

    struct Flat;

    impl InitialCondition for Flat {
        fn initial_state(&self, grid: &Grid) -> Result<InitialState, CollaboratorError> {
            Ok(InitialState {
                state: Array2::ones((3, grid.nk())),
                topography: Array1::zeros(grid.nk()),
            })
        }
    }

    struct WritesAll;

    impl ExperimentRunner for WritesAll {
        fn run_one(&self, ctx: &RunContext<'_>) -> Result<(), CollaboratorError> {
            let (state_dim, _, t) = ctx.truth.dim();
            let x = Array3::zeros((state_dim, 4, t));
            ctx.output.write(ArtifactKind::Forecast, &x)?;
            ctx.output.write(ArtifactKind::Analysis, &x)?;
            ctx.output.write(ArtifactKind::Observations, &Array3::zeros((6, 4, t)))?;
            Ok(())
        }
    }

    struct WritesNothing;

    impl ExperimentRunner for WritesNothing {
        fn run_one(&self, _ctx: &RunContext<'_>) -> Result<(), CollaboratorError> {
            Ok(())
        }
    }

    struct Panics;

    impl ExperimentRunner for Panics {
        fn run_one(&self, _ctx: &RunContext<'_>) -> Result<(), CollaboratorError> {
            panic!("numerical blow-up")
        }
    }

    fn with_context<R>(f: impl FnOnce(&RunContext<'_>) -> R) -> R {
        let dir = tempfile::tempdir().unwrap();
        let grid = Grid::new(4, 1.0).unwrap();
        let truth = Array3::zeros((12, 1, 3));
        let topography = Array1::zeros(4);
        let index = ConfigIndex::new(0, 0, 0);
        let output = SweepLayout::new(dir.path(), "exp").run_output(index);
        let ctx = RunContext {
            index,
            params: TuningParameters {
                localization: 1e-10,
                additive_inflation: 0.2,
                multiplicative_inflation: 1.01,
            },
            neq: 3,
            grid: &grid,
            assimilation_times: &[0.0, 0.144, 0.288],
            truth: &truth,
            topography: &topography,
            initial_condition: &Flat,
            output: &output,
        };
        f(&ctx)
    }

    #[test]
    fn test_execute_complete_run() {
        with_context(|ctx| {
            ctx.execute(&WritesAll).unwrap();
            assert!(ctx.output.is_complete());
            assert_eq!(ctx.output.read2(ArtifactKind::EquationInfo).unwrap().dim(), (4, 3));
        });
    }

    #[test]
    fn test_missing_outputs_are_a_failure() {
        with_context(|ctx| {
            let err = ctx.execute(&WritesNothing).unwrap_err();
            match err {
                RunnerError::MissingArtifacts(missing) => {
                    assert_eq!(missing, vec!["X_array", "Xan_array", "Y_obs_array"]);
                }
                other => panic!("unexpected error: {other}"),
            }
        });
    }

    #[test]
    fn test_rerun_does_not_accept_previous_outputs() {
        with_context(|ctx| {
            ctx.execute(&WritesAll).unwrap();
            let err = ctx.execute(&WritesNothing).unwrap_err();
            assert!(matches!(err, RunnerError::MissingArtifacts(ref m) if m.len() == 3));
            assert!(!ctx.output.exists(ArtifactKind::Forecast));
            assert!(ctx.output.exists(ArtifactKind::Truth));
        });
    }

    #[test]
    fn test_panic_is_contained() {
        with_context(|ctx| {
            let err = ctx.execute(&Panics).unwrap_err();
            assert!(matches!(err, RunnerError::Panicked(ref m) if m.contains("blow-up")));
        });
    }
}
