// crates/mh_verify/src/skill.rs

//! 技巧评分
//!
//! 对每个观测场 (`h`、`hu`、`hr`) 和每个时间层，给出：
//!
//! | 量 | 定义 | 形状 |
//! |----|------|------|
//! | 平均误差 | 场内 `mean(x̄ - x_t)`，带符号 | 标量 |
//! | 绝对误差 | `|x̄ - x_t|` | 每格点 |
//! | 离散度 | `sqrt(diag(P))` | 每格点 |
//! | RMSE | `sqrt(diag(P_tr))` | 每格点 |
//! | CRPS | 见 [`crate::crps`] | 每格点 |
//!
//! 离散度与 RMSE 来自两个独立的协方差矩阵，二者不被强制一致；
//! 校准良好的滤波器二者接近，这正是要诊断的关系。
//!
//! 预报与分析用同一真值切片、同一方式评分。评分器不保存跨调用状态。

use std::fmt;

use mh_foundation::{KahanSum, MhError, MhResult};
use ndarray::{s, Array1, ArrayView1, ArrayView2};
use serde::Serialize;

use crate::crps::crps_cells;
use crate::error::{Location, ResultExt, VerifyResult};
use crate::layout::{Field, StateLayout};
use crate::statistics::{EnsembleMoments, EnsembleStatistics};

/// 评分阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// 同化前
    Forecast,
    /// 同化后
    Analysis,
}

impl Phase {
    /// 阶段名
    pub fn name(self) -> &'static str {
        match self {
            Phase::Forecast => "forecast",
            Phase::Analysis => "analysis",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 单个场的评分
#[derive(Debug, Clone)]
pub struct FieldSkill {
    /// 场
    pub field: Field,
    /// 场内平均的带符号误差
    pub mean_error: f64,
    /// 每格点绝对误差
    pub abs_error: Array1<f64>,
    /// 每格点离散度
    pub spread: Array1<f64>,
    /// 每格点相对真值的 RMSE
    pub rmse: Array1<f64>,
    /// 每格点 CRPS
    pub crps: Array1<f64>,
}

impl FieldSkill {
    /// 每格点 `|误差| - 离散度`
    pub fn error_minus_spread(&self) -> Array1<f64> {
        &self.abs_error - &self.spread
    }

    /// 场内平均离散度
    pub fn mean_spread(&self) -> f64 {
        domain_mean(self.spread.view())
    }

    /// 场内平均 RMSE
    pub fn mean_rmse(&self) -> f64 {
        domain_mean(self.rmse.view())
    }

    /// 场内平均绝对误差
    pub fn mean_abs_error(&self) -> f64 {
        domain_mean(self.abs_error.view())
    }

    /// 场内平均 CRPS
    pub fn mean_crps(&self) -> f64 {
        domain_mean(self.crps.view())
    }
}

/// 一个阶段全部场的评分
#[derive(Debug, Clone)]
pub struct PhaseSkill {
    /// 阶段
    pub phase: Phase,
    /// 各场评分，按场次序
    pub fields: Vec<FieldSkill>,
}

impl PhaseSkill {
    /// 按场查找
    pub fn field(&self, field: Field) -> Option<&FieldSkill> {
        self.fields.iter().find(|s| s.field == field)
    }
}

/// 技巧评分器
#[derive(Debug, Clone, Copy)]
pub struct SkillScorer {
    layout: StateLayout,
}

impl SkillScorer {
    /// 创建评分器
    pub fn new(layout: StateLayout) -> Self {
        Self { layout }
    }

    /// 布局
    pub fn layout(&self) -> &StateLayout {
        &self.layout
    }

    /// 对单个场评分
    pub fn score_field(
        &self,
        field: Field,
        ensemble: ArrayView2<'_, f64>,
        truth: ArrayView1<'_, f64>,
        moments: &EnsembleMoments,
    ) -> MhResult<FieldSkill> {
        let range = self.layout.state_range(field)?;
        MhError::check_axis("ensemble", "state", self.layout.state_dim(), ensemble.nrows())?;
        MhError::check_axis("truth", "state", self.layout.state_dim(), truth.len())?;

        let mean = moments.mean.slice(s![range.clone()]);
        let truth_f = truth.slice(s![range.clone()]);
        let error = &mean - &truth_f;

        let variance = moments.covariance.diag();
        let truth_variance = moments.truth_covariance.diag();

        Ok(FieldSkill {
            field,
            mean_error: domain_mean(error.view()),
            abs_error: error.mapv(f64::abs),
            spread: non_negative_sqrt(variance.slice(s![range.clone()])),
            rmse: non_negative_sqrt(truth_variance.slice(s![range.clone()])),
            crps: crps_cells(ensemble.slice(s![range, ..]), truth_f)?,
        })
    }

    /// 对一个阶段的全部观测场评分
    pub fn score(
        &self,
        phase: Phase,
        ensemble: ArrayView2<'_, f64>,
        truth: ArrayView1<'_, f64>,
        moments: &EnsembleMoments,
        location: Location,
    ) -> VerifyResult<PhaseSkill> {
        let fields = Field::PRIMARY
            .iter()
            .map(|&field| {
                self.score_field(field, ensemble, truth, moments)
                    .at(location.with_field(field))
            })
            .collect::<VerifyResult<Vec<_>>>()?;
        Ok(PhaseSkill { phase, fields })
    }

    /// 预报与分析一起评分
    pub fn score_both(
        &self,
        forecast: ArrayView2<'_, f64>,
        analysis: ArrayView2<'_, f64>,
        truth: ArrayView1<'_, f64>,
        location: Location,
    ) -> VerifyResult<(EnsembleStatistics, PhaseSkill, PhaseSkill)> {
        let stats = EnsembleStatistics::compute(forecast, analysis, truth).at(location)?;
        let fc = self.score(Phase::Forecast, forecast, truth, &stats.forecast, location)?;
        let an = self.score(Phase::Analysis, analysis, truth, &stats.analysis, location)?;
        Ok((stats, fc, an))
    }
}

/// 补偿求和的算术平均；空数组为 NaN
pub(crate) fn domain_mean(values: ArrayView1<'_, f64>) -> f64 {
    KahanSum::mean_iter(values.iter().copied()).unwrap_or(f64::NAN)
}

/// 方差开方；舍入造成的微小负值截为 0
fn non_negative_sqrt(variance: ArrayView1<'_, f64>) -> Array1<f64> {
    variance.mapv(|v| v.max(0.0).sqrt())
}
