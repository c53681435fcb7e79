// crates/mh_verify/src/statistics.rs

//! 集合统计量
//!
//! 单个时间层的集合切片 `X: [state_dim, n_ens]` 上的一阶与二阶矩：
//!
//! - `mean(X)`: 成员平均，广播到每一列
//! - `deviations(X) = X - mean(X)`
//! - `deviations_from_truth(X, x_t) = X - x_t`
//! - `covariance(D) = D·Dᵀ / (n_ens - 1)`
//!
//! 协方差入口检查成员数，`n_ens < 2` 返回 [`MhError::DegenerateEnsemble`]。

use mh_foundation::{MhError, MhResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};

// ============================================================
// 基本运算
// ============================================================

/// 成员平均 `[state_dim]`
pub fn member_mean(x: ArrayView2<'_, f64>) -> MhResult<Array1<f64>> {
    x.mean_axis(Axis(1))
        .ok_or_else(|| MhError::degenerate_ensemble(0, "ensemble mean"))
}

/// 成员平均，广播到每个成员列 `[state_dim, n_ens]`
pub fn mean(x: ArrayView2<'_, f64>) -> MhResult<Array2<f64>> {
    let m = member_mean(x)?;
    let broadcast = m.insert_axis(Axis(1));
    Ok(broadcast
        .broadcast(x.raw_dim())
        .ok_or_else(|| MhError::internal("mean broadcast failed"))?
        .to_owned())
}

/// 相对集合平均的偏差
pub fn deviations(x: ArrayView2<'_, f64>) -> MhResult<Array2<f64>> {
    let m = member_mean(x)?;
    Ok(&x - &m.insert_axis(Axis(1)))
}

/// 相对真值的偏差（真值广播到每个成员）
pub fn deviations_from_truth(x: ArrayView2<'_, f64>, truth: ArrayView1<'_, f64>) -> MhResult<Array2<f64>> {
    MhError::check_axis("truth", "state", x.nrows(), truth.len())?;
    Ok(&x - &truth.insert_axis(Axis(1)))
}

/// 样本协方差 `D·Dᵀ / (n_ens - 1)`
///
/// 结果严格对称：下三角由上三角镜像得到。
pub fn covariance(dev: ArrayView2<'_, f64>) -> MhResult<Array2<f64>> {
    let n = dev.ncols();
    MhError::check_members(n, || "covariance".to_string())?;

    let mut cov = dev.dot(&dev.t());
    cov /= (n - 1) as f64;
    let dim = cov.nrows();
    for i in 0..dim {
        for j in (i + 1)..dim {
            cov[[j, i]] = cov[[i, j]];
        }
    }
    Ok(cov)
}

/// 协方差对角线，不构造整个矩阵
pub fn variance(dev: ArrayView2<'_, f64>) -> MhResult<Array1<f64>> {
    let n = dev.ncols();
    MhError::check_members(n, || "variance".to_string())?;
    Ok(dev.map_axis(Axis(1), |row| row.dot(&row) / (n - 1) as f64))
}

// ============================================================
// 矩
// ============================================================

/// 一个集合在一个时间层的矩
#[derive(Debug, Clone)]
pub struct EnsembleMoments {
    /// 成员数
    pub members: usize,
    /// 集合平均 `[state_dim]`
    pub mean: Array1<f64>,
    /// 相对集合平均的协方差
    pub covariance: Array2<f64>,
    /// 相对真值的协方差
    pub truth_covariance: Array2<f64>,
}

impl EnsembleMoments {
    /// 计算集合矩
    pub fn compute(x: ArrayView2<'_, f64>, truth: ArrayView1<'_, f64>) -> MhResult<Self> {
        MhError::check_members(x.ncols(), || "ensemble moments".to_string())?;
        let mean = member_mean(x)?;
        let dev = &x - &mean.view().insert_axis(Axis(1));
        let dev_tr = deviations_from_truth(x, truth)?;
        Ok(Self {
            members: x.ncols(),
            covariance: covariance(dev.view())?,
            truth_covariance: covariance(dev_tr.view())?,
            mean,
        })
    }

    /// 方差（spread²）
    pub fn variance(&self) -> Array1<f64> {
        self.covariance.diag().to_owned()
    }

    /// 相对真值的方差（误差²）
    pub fn truth_variance(&self) -> Array1<f64> {
        self.truth_covariance.diag().to_owned()
    }
}

/// 同一时间层的预报与分析矩
#[derive(Debug, Clone)]
pub struct EnsembleStatistics {
    /// 预报
    pub forecast: EnsembleMoments,
    /// 分析
    pub analysis: EnsembleMoments,
}

impl EnsembleStatistics {
    /// 计算预报与分析两组矩（共四个协方差矩阵）
    pub fn compute(
        forecast: ArrayView2<'_, f64>,
        analysis: ArrayView2<'_, f64>,
        truth: ArrayView1<'_, f64>,
    ) -> MhResult<Self> {
        Ok(Self {
            forecast: EnsembleMoments::compute(forecast, truth)?,
            analysis: EnsembleMoments::compute(analysis, truth)?,
        })
    }
}
