// crates/mh_verify/src/crps.rs

//! 连续分级概率评分 (CRPS)
//!
//! 集合经验分布函数 `F` 与确定性真值 `y` 之间的距离：
//!
//! ```text
//! CRPS(F, y) = ∫ (F(z) - H(z - y))² dz
//! ```
//!
//! 排序后的成员把实轴分成若干区间，`F` 在每个区间上为常数 `i/n`，积分逐段精确求出。
//! 每一段都是非负量之积，因此结果恒非负；成员全部相同时退化为绝对误差。

use mh_foundation::{KahanSum, MhError, MhResult};
use ndarray::{Array1, ArrayView1, ArrayView2};

/// 单个格点的 CRPS
pub fn crps(members: &[f64], truth: f64) -> MhResult<f64> {
    if members.is_empty() {
        return Err(MhError::degenerate_ensemble(0, "crps"));
    }
    if !truth.is_finite() || members.iter().any(|v| !v.is_finite()) {
        return Err(MhError::invalid_input("CRPS 输入包含非有限值"));
    }

    let mut x = members.to_vec();
    x.sort_by(|a, b| a.total_cmp(b));
    let n = x.len() as f64;

    let mut score = KahanSum::new();

    // 最小成员左侧：F = 0, H = 1
    if truth < x[0] {
        score.add(x[0] - truth);
    }

    for (i, pair) in x.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        let p = (i + 1) as f64 / n;
        let q = 1.0 - p;
        if truth <= a {
            score.add(q * q * (b - a));
        } else if truth >= b {
            score.add(p * p * (b - a));
        } else {
            score.add(p * p * (truth - a) + q * q * (b - truth));
        }
    }

    // 最大成员右侧：F = 1, H = 0
    let last = x[x.len() - 1];
    if truth > last {
        score.add(truth - last);
    }

    Ok(score.value())
}

/// 一组格点的 CRPS：`ensemble` 为 `[cells, n_ens]`，`truth` 为 `[cells]`
///
/// 每个格点独立计算；第一个失败的格点给出其下标。
pub fn crps_cells(ensemble: ArrayView2<'_, f64>, truth: ArrayView1<'_, f64>) -> MhResult<Array1<f64>> {
    MhError::check_axis("truth", "cell", ensemble.nrows(), truth.len())?;
    let mut out = Array1::zeros(truth.len());
    let mut buf = Vec::with_capacity(ensemble.ncols());
    for (cell, (row, &y)) in ensemble.rows().into_iter().zip(truth.iter()).enumerate() {
        buf.clear();
        buf.extend(row.iter().copied());
        out[cell] = crps(&buf, y).map_err(|e| MhError::invalid_input(format!("cell {cell}: {e}")))?;
    }
    Ok(out)
}
