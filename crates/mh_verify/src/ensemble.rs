// crates/mh_verify/src/ensemble.rs

//! 集合轨迹与真值轨迹
//!
//! 三维数组 `[state_dim, member, time]` 的薄包装，按时间层取切片时做边界检查。

use mh_foundation::{MhError, MhResult};
use ndarray::{Array3, ArrayView1, ArrayView2, Axis};

/// 集合轨迹 `[state_dim, n_ens, T]`
#[derive(Debug, Clone)]
pub struct EnsembleTrajectory {
    name: &'static str,
    data: Array3<f64>,
}

impl EnsembleTrajectory {
    /// 包装数组
    pub fn new(name: &'static str, data: Array3<f64>) -> MhResult<Self> {
        if data.len_of(Axis(1)) == 0 {
            return Err(MhError::shape_mismatch(name, "member", 1, 0));
        }
        Ok(Self { name, data })
    }

    /// 数组名
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 状态维度
    pub fn state_dim(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// 成员数
    pub fn members(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    /// 时间层数
    pub fn time_levels(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// 时间层 `t` 的集合切片 `[state_dim, n_ens]`
    pub fn at(&self, t: usize) -> MhResult<ArrayView2<'_, f64>> {
        MhError::check_time(t, self.time_levels())?;
        Ok(self.data.index_axis(Axis(2), t))
    }

    /// 原始数组
    pub fn as_array(&self) -> &Array3<f64> {
        &self.data
    }
}

/// 真值轨迹 `[state_dim, 1, T]`
#[derive(Debug, Clone)]
pub struct TruthTrajectory {
    data: Array3<f64>,
}

impl TruthTrajectory {
    /// 包装数组，成员轴必须为 1
    pub fn new(data: Array3<f64>) -> MhResult<Self> {
        MhError::check_axis("X_tr_array", "member", 1, data.len_of(Axis(1)))?;
        Ok(Self { data })
    }

    /// 状态维度
    pub fn state_dim(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    /// 时间层数
    pub fn time_levels(&self) -> usize {
        self.data.len_of(Axis(2))
    }

    /// 时间层 `t` 的真值 `[state_dim]`
    pub fn at(&self, t: usize) -> MhResult<ArrayView1<'_, f64>> {
        MhError::check_time(t, self.time_levels())?;
        Ok(self.data.slice(ndarray::s![.., 0, t]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_slices() {
        let data = Array3::from_shape_fn((6, 3, 4), |(i, m, t)| (100 * t + 10 * m + i) as f64);
        let ens = EnsembleTrajectory::new("X_array", data).unwrap();
        let slice = ens.at(2).unwrap();
        assert_eq!(slice.dim(), (6, 3));
        assert_eq!(slice[[5, 1]], 215.0);
        assert!(matches!(ens.at(4), Err(MhError::TimeOutOfRange { time: 4, levels: 4 })));
    }

    #[test]
    fn test_truth_requires_single_member() {
        assert!(TruthTrajectory::new(Array3::zeros((6, 2, 4))).is_err());
        let truth = TruthTrajectory::new(Array3::from_elem((6, 1, 4), 1.5)).unwrap();
        assert_eq!(truth.at(3).unwrap().len(), 6);
    }
}
