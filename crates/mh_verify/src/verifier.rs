// crates/mh_verify/src/verifier.rs

//! 单组合校验器
//!
//! 由持久化的输出数组构造，一次构造布局与网格，之后按时间层按需重算统计量。
//! 统计量与评分从不写回磁盘。

use mh_foundation::MhError;
use mh_io::{ConfigIndex, RunArtifacts, RunOutput};
use ndarray::{s, Array1};
use rayon::prelude::*;

use crate::ensemble::{EnsembleTrajectory, TruthTrajectory};
use crate::error::{Location, ResultExt, VerifyError, VerifyResult};
use crate::layout::{Field, Grid, StateLayout};
use crate::report::{observation_reports, DiagnosticReport, HeightProfiles, PhaseReport};
use crate::skill::{PhaseSkill, SkillScorer};
use crate::statistics::{member_mean, EnsembleStatistics};

/// 默认区域长度
pub const DEFAULT_DOMAIN_LENGTH: f64 = 1.0;

/// 某时间层的评分结果
#[derive(Debug, Clone)]
pub struct TimeLevelSkill {
    /// 时间层
    pub time: usize,
    /// 统计量
    pub statistics: EnsembleStatistics,
    /// 预报评分
    pub forecast: PhaseSkill,
    /// 分析评分
    pub analysis: PhaseSkill,
}

/// 单组合校验器
#[derive(Debug, Clone)]
pub struct Verifier {
    config: Option<ConfigIndex>,
    grid: Grid,
    layout: StateLayout,
    scorer: SkillScorer,
    topography: Array1<f64>,
    truth: TruthTrajectory,
    forecast: EnsembleTrajectory,
    analysis: EnsembleTrajectory,
    observations: EnsembleTrajectory,
}

impl Verifier {
    /// 加载组合目录并构造校验器
    pub fn open(output: &RunOutput, length: f64) -> VerifyResult<Self> {
        let artifacts = RunArtifacts::load(output)?;
        Self::from_artifacts(artifacts, length)
    }

    /// 由已加载的数组构造
    pub fn from_artifacts(run: RunArtifacts, length: f64) -> VerifyResult<Self> {
        let shape = run.shape();
        let config = run.output.index();
        let at = Location {
            config,
            ..Location::default()
        };

        let layout = StateLayout::new(shape.nk, shape.neq)
            .and_then(|l| l.with_observations(shape.obs_dim))
            .at(at)?;
        let grid = Grid::new(shape.nk, length).at(at)?;

        tracing::debug!(
            "Verifier for {}: Nk={} Neq={} n_ens={} obs_density={:?}",
            run.output.dir().display(),
            layout.nk(),
            layout.neq(),
            shape.n_ens,
            layout.obs_density()
        );

        Ok(Self {
            config,
            grid,
            layout,
            scorer: SkillScorer::new(layout),
            topography: run.topography,
            truth: TruthTrajectory::new(run.truth).at(at)?,
            forecast: EnsembleTrajectory::new("X_array", run.forecast).at(at)?,
            analysis: EnsembleTrajectory::new("Xan_array", run.analysis).at(at)?,
            observations: EnsembleTrajectory::new("Y_obs_array", run.observations).at(at)?,
        })
    }

    /// 组合索引
    pub fn config(&self) -> Option<ConfigIndex> {
        self.config
    }

    /// 网格
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// 布局
    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// 时间层数
    pub fn time_levels(&self) -> usize {
        self.truth.time_levels()
    }

    /// 集合成员数
    pub fn members(&self) -> usize {
        self.forecast.members()
    }

    /// 时间层 `t` 的统计与评分
    pub fn skill_at(&self, t: usize) -> VerifyResult<TimeLevelSkill> {
        let loc = Location::new(self.config, t);
        let truth = self.truth.at(t).at(loc)?;
        let forecast = self.forecast.at(t).at(loc)?;
        let analysis = self.analysis.at(t).at(loc)?;

        let (statistics, forecast, analysis) = self.scorer.score_both(forecast, analysis, truth, loc)?;
        Ok(TimeLevelSkill {
            time: t,
            statistics,
            forecast,
            analysis,
        })
    }

    /// 时间层 `t` 的诊断报告
    pub fn report_at(&self, t: usize) -> VerifyResult<DiagnosticReport> {
        let loc = Location::new(self.config, t);
        let skill = self.skill_at(t)?;

        let h = self.layout.state_range(Field::H).at(loc)?;
        let truth = self.truth.at(t).at(loc)?;
        let height = HeightProfiles::new(
            self.topography.view(),
            truth.slice(s![h.clone()]),
            skill.statistics.forecast.mean.slice(s![h.clone()]),
            skill.statistics.analysis.mean.slice(s![h]),
        )
        .at(loc)?;

        let obs_mean = member_mean(self.observations.at(t).at(loc)?).at(loc)?;
        let ranges = Field::PRIMARY
            .iter()
            .filter_map(|&f| self.layout.obs_range(f).map(|r| (f, r)));
        let observations = observation_reports(
            &obs_mean,
            &self.layout.obs_cells(),
            self.grid.centers(),
            self.topography.view(),
            ranges,
        )
        .at(loc)?;

        Ok(DiagnosticReport {
            config: self.config,
            time: t,
            time_levels: self.time_levels(),
            nk: self.layout.nk(),
            neq: self.layout.neq(),
            obs_density: self.layout.obs_density().unwrap_or(0),
            x: self.grid.centers().to_vec(),
            forecast: PhaseReport::new(&skill.forecast, &skill.statistics.forecast),
            analysis: PhaseReport::new(&skill.analysis, &skill.statistics.analysis),
            observations,
            height,
        })
    }

    /// 全部时间层的报告（按时间层并行）
    ///
    /// 每个时间层独立成功或失败。
    pub fn reports(&self) -> Vec<VerifyResult<DiagnosticReport>> {
        (0..self.time_levels())
            .into_par_iter()
            .map(|t| self.report_at(t))
            .collect()
    }

    /// 全部时间层的报告，遇到第一个错误即返回
    pub fn try_reports(&self) -> VerifyResult<Vec<DiagnosticReport>> {
        self.reports().into_iter().collect()
    }

    /// 某时间层的越界检查（给命令行使用）
    pub fn check_time(&self, t: usize) -> VerifyResult<()> {
        MhError::check_time(t, self.time_levels())
            .map_err(|e| VerifyError::at(e, Location::new(self.config, t)))
    }
}
