// crates/mh_verify/src/report.rs

//! 诊断报告
//!
//! 把某个 `(组合, 时间层)` 的统计与评分打包成可序列化记录，交给外部绘图程序。
//! 本模块只做选择与打包，不做额外计算。

use mh_foundation::{MhError, MhResult};
use mh_io::ConfigIndex;
use ndarray::{Array1, ArrayView1};
use serde::Serialize;

use crate::layout::Field;
use crate::skill::{FieldSkill, Phase, PhaseSkill};
use crate::statistics::EnsembleMoments;

/// 单个场的评分记录
#[derive(Debug, Clone, Serialize)]
pub struct FieldReport {
    /// 场
    pub field: Field,
    /// 场内平均带符号误差
    pub mean_error: f64,
    /// 场内平均绝对误差
    pub mean_abs_error: f64,
    /// 场内平均离散度
    pub mean_spread: f64,
    /// 场内平均 RMSE
    pub mean_rmse: f64,
    /// 场内平均 CRPS
    pub mean_crps: f64,
    /// 每格点绝对误差
    pub abs_error: Vec<f64>,
    /// 每格点离散度
    pub spread: Vec<f64>,
    /// 每格点 RMSE
    pub rmse: Vec<f64>,
    /// 每格点 CRPS
    pub crps: Vec<f64>,
    /// 每格点 `|误差| - 离散度`
    pub error_minus_spread: Vec<f64>,
}

impl From<&FieldSkill> for FieldReport {
    fn from(skill: &FieldSkill) -> Self {
        Self {
            field: skill.field,
            mean_error: skill.mean_error,
            mean_abs_error: skill.mean_abs_error(),
            mean_spread: skill.mean_spread(),
            mean_rmse: skill.mean_rmse(),
            mean_crps: skill.mean_crps(),
            abs_error: skill.abs_error.to_vec(),
            spread: skill.spread.to_vec(),
            rmse: skill.rmse.to_vec(),
            crps: skill.crps.to_vec(),
            error_minus_spread: skill.error_minus_spread().to_vec(),
        }
    }
}

/// 一个阶段的记录，附带协方差对角线
#[derive(Debug, Clone, Serialize)]
pub struct PhaseReport {
    /// 阶段
    pub phase: Phase,
    /// 集合成员数
    pub members: usize,
    /// 各场评分
    pub fields: Vec<FieldReport>,
    /// `diag(P)`，整个状态向量
    pub variance: Vec<f64>,
    /// `diag(P_tr)`，整个状态向量
    pub truth_variance: Vec<f64>,
}

impl PhaseReport {
    /// 由评分与矩打包
    pub fn new(skill: &PhaseSkill, moments: &EnsembleMoments) -> Self {
        Self {
            phase: skill.phase,
            members: moments.members,
            fields: skill.fields.iter().map(FieldReport::from).collect(),
            variance: moments.variance().to_vec(),
            truth_variance: moments.truth_variance().to_vec(),
        }
    }

    /// 按场查找
    pub fn field(&self, field: Field) -> Option<&FieldReport> {
        self.fields.iter().find(|f| f.field == field)
    }
}

/// 观测集合在被观测格点上的平均
#[derive(Debug, Clone, Serialize)]
pub struct ObservationReport {
    /// 场
    pub field: Field,
    /// 被观测格点
    pub cells: Vec<usize>,
    /// 格点坐标
    pub x: Vec<f64>,
    /// 观测集合平均（`h` 已加回地形）
    pub mean: Vec<f64>,
}

/// 水面高度剖面 `h + B`
#[derive(Debug, Clone, Serialize)]
pub struct HeightProfiles {
    /// 地形
    pub topography: Vec<f64>,
    /// 真值
    pub truth: Vec<f64>,
    /// 预报平均
    pub forecast_mean: Vec<f64>,
    /// 分析平均
    pub analysis_mean: Vec<f64>,
}

impl HeightProfiles {
    /// 给三个水深剖面加上地形
    pub fn new(
        topography: ArrayView1<'_, f64>,
        truth_h: ArrayView1<'_, f64>,
        forecast_h: ArrayView1<'_, f64>,
        analysis_h: ArrayView1<'_, f64>,
    ) -> MhResult<Self> {
        let nk = topography.len();
        MhError::check_axis("truth h", "cell", nk, truth_h.len())?;
        MhError::check_axis("forecast h", "cell", nk, forecast_h.len())?;
        MhError::check_axis("analysis h", "cell", nk, analysis_h.len())?;
        let lift = |h: ArrayView1<'_, f64>| -> Vec<f64> { (&h + &topography).to_vec() };
        Ok(Self {
            topography: topography.to_vec(),
            truth: lift(truth_h),
            forecast_mean: lift(forecast_h),
            analysis_mean: lift(analysis_h),
        })
    }
}

/// 一个 `(组合, 时间层)` 的诊断报告
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticReport {
    /// 组合索引
    pub config: Option<ConfigIndex>,
    /// 时间层
    pub time: usize,
    /// 时间层总数
    pub time_levels: usize,
    /// 网格单元数
    pub nk: usize,
    /// 方程数
    pub neq: usize,
    /// 观测密度
    pub obs_density: usize,
    /// 单元中心坐标
    pub x: Vec<f64>,
    /// 预报
    pub forecast: PhaseReport,
    /// 分析
    pub analysis: PhaseReport,
    /// 观测
    pub observations: Vec<ObservationReport>,
    /// 水面高度
    pub height: HeightProfiles,
}

impl DiagnosticReport {
    /// 序列化为 JSON
    pub fn to_json(&self) -> MhResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| MhError::serialization(e.to_string()))
    }

    /// 某阶段的记录
    pub fn phase(&self, phase: Phase) -> &PhaseReport {
        match phase {
            Phase::Forecast => &self.forecast,
            Phase::Analysis => &self.analysis,
        }
    }
}

/// 观测平均按场切分，`h` 加回被观测格点上的地形
pub(crate) fn observation_reports(
    obs_mean: &Array1<f64>,
    cells: &[usize],
    centers: &[f64],
    topography: ArrayView1<'_, f64>,
    ranges: impl Iterator<Item = (Field, std::ops::Range<usize>)>,
) -> MhResult<Vec<ObservationReport>> {
    let mut out = Vec::new();
    for (field, range) in ranges {
        MhError::check_axis("Y_obs_array", "observation", cells.len(), range.len())?;
        let mut mean = obs_mean.slice(ndarray::s![range]).to_vec();
        if field == Field::H {
            for (v, &c) in mean.iter_mut().zip(cells) {
                *v += topography[c];
            }
        }
        out.push(ObservationReport {
            field,
            cells: cells.to_vec(),
            x: cells.iter().map(|&c| centers[c]).collect(),
            mean,
        });
    }
    Ok(out)
}
