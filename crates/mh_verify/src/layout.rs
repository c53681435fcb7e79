// crates/mh_verify/src/layout.rs

//! 网格与状态向量布局
//!
//! 每个集合成员的状态向量由 `Neq` 个长度为 `Nk` 的场首尾相接：
//! `h`、`hu`、`hr`，以及预留的 `hv`。场 `f` 占据下标 `[f*Nk, (f+1)*Nk)`。
//!
//! 观测只覆盖前三个场，每个场取相同数量的等间距网格单元，
//! 观测向量同样按场分块排列。

use std::fmt;
use std::ops::Range;

use mh_foundation::{MhError, MhResult};
use serde::Serialize;

// ============================================================
// 网格
// ============================================================

/// 一维均匀网格
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    nk: usize,
    length: f64,
    dx: f64,
    centers: Vec<f64>,
}

impl Grid {
    /// 创建网格：`Nk` 个单元，区域长度 `L`
    pub fn new(nk: usize, length: f64) -> MhResult<Self> {
        if nk == 0 {
            return Err(MhError::invalid_input("网格单元数必须大于 0"));
        }
        if !(length.is_finite() && length > 0.0) {
            return Err(MhError::invalid_input(format!("区域长度必须为正: {length}")));
        }
        let dx = length / nk as f64;
        let centers = (0..nk).map(|i| 0.5 * dx + i as f64 * dx).collect();
        Ok(Self {
            nk,
            length,
            dx,
            centers,
        })
    }

    /// 单元数
    #[inline]
    pub fn nk(&self) -> usize {
        self.nk
    }

    /// 区域长度
    #[inline]
    pub fn length(&self) -> f64 {
        self.length
    }

    /// 单元宽度 `Kk = L / Nk`
    #[inline]
    pub fn dx(&self) -> f64 {
        self.dx
    }

    /// 单元中心坐标
    #[inline]
    pub fn centers(&self) -> &[f64] {
        &self.centers
    }
}

// ============================================================
// 物理场
// ============================================================

/// 状态向量中的物理场
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// 水深
    H,
    /// 动量
    Hu,
    /// 雨水示踪量
    Hr,
    /// 横向动量（预留）
    Hv,
}

impl Field {
    /// 参与观测与评分的场
    pub const PRIMARY: [Field; 3] = [Field::H, Field::Hu, Field::Hr];

    /// 在状态向量中的次序
    pub fn index(self) -> usize {
        match self {
            Field::H => 0,
            Field::Hu => 1,
            Field::Hr => 2,
            Field::Hv => 3,
        }
    }

    /// 场名
    pub fn name(self) -> &'static str {
        match self {
            Field::H => "h",
            Field::Hu => "hu",
            Field::Hr => "hr",
            Field::Hv => "hv",
        }
    }

    /// 按次序取场
    pub fn from_index(index: usize) -> Option<Field> {
        match index {
            0 => Some(Field::H),
            1 => Some(Field::Hu),
            2 => Some(Field::Hr),
            3 => Some(Field::Hv),
            _ => None,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================
// 状态布局
// ============================================================

/// 观测的场数
const OBSERVED_FIELDS: usize = 3;

/// 观测空间布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ObsLayout {
    per_field: usize,
    density: usize,
}

/// 状态向量与观测向量的寻址方案
///
/// 构造一次，之后所有统计量共享。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateLayout {
    nk: usize,
    neq: usize,
    obs: Option<ObsLayout>,
}

impl StateLayout {
    /// 由 `Nk` 与 `Neq` 构造（不含观测）
    pub fn new(nk: usize, neq: usize) -> MhResult<Self> {
        if nk == 0 {
            return Err(MhError::invalid_input("网格单元数必须大于 0"));
        }
        if !(OBSERVED_FIELDS..=4).contains(&neq) {
            return Err(MhError::invalid_input(format!(
                "方程数必须为 3 或 4, 实际 {neq}"
            )));
        }
        Ok(Self { nk, neq, obs: None })
    }

    /// 由状态维度反推 `Nk`
    pub fn from_state_dim(state_dim: usize, neq: usize) -> MhResult<Self> {
        if neq == 0 || state_dim % neq != 0 {
            return Err(MhError::invalid_input(format!(
                "状态维度 {state_dim} 不能被方程数 {neq} 整除"
            )));
        }
        Self::new(state_dim / neq, neq)
    }

    /// 附加观测布局
    ///
    /// `obs_dim` 必须能在三个观测场之间均分，且每场观测数必须整除 `Nk`。
    pub fn with_observations(mut self, obs_dim: usize) -> MhResult<Self> {
        if obs_dim == 0 || obs_dim % OBSERVED_FIELDS != 0 {
            return Err(MhError::invalid_input(format!(
                "观测维度 {obs_dim} 不能在 {OBSERVED_FIELDS} 个观测场之间均分"
            )));
        }
        let per_field = obs_dim / OBSERVED_FIELDS;
        if self.nk % per_field != 0 {
            // 期望值取不超过实际值的最大合法观测维度
            let fitting = (1..=per_field.min(self.nk))
                .rev()
                .find(|d| self.nk % d == 0)
                .unwrap_or(1);
            return Err(MhError::shape_mismatch(
                "Y_obs_array",
                "observation",
                OBSERVED_FIELDS * fitting,
                obs_dim,
            ));
        }
        self.obs = Some(ObsLayout {
            per_field,
            density: self.nk / per_field,
        });
        Ok(self)
    }

    /// 单元数
    #[inline]
    pub fn nk(&self) -> usize {
        self.nk
    }

    /// 方程数
    #[inline]
    pub fn neq(&self) -> usize {
        self.neq
    }

    /// 状态维度 `Neq * Nk`
    #[inline]
    pub fn state_dim(&self) -> usize {
        self.neq * self.nk
    }

    /// 状态向量中存在的场
    pub fn fields(&self) -> impl Iterator<Item = Field> {
        (0..self.neq).filter_map(Field::from_index)
    }

    /// 场在状态向量中的下标范围
    pub fn state_range(&self, field: Field) -> MhResult<Range<usize>> {
        let f = field.index();
        if f >= self.neq {
            return Err(MhError::index_out_of_bounds("field", f, self.neq));
        }
        Ok(f * self.nk..(f + 1) * self.nk)
    }

    /// 是否带观测布局
    pub fn has_observations(&self) -> bool {
        self.obs.is_some()
    }

    /// 观测维度
    pub fn obs_dim(&self) -> Option<usize> {
        self.obs.map(|o| o.per_field * OBSERVED_FIELDS)
    }

    /// 每个场的观测数
    pub fn obs_per_field(&self) -> Option<usize> {
        self.obs.map(|o| o.per_field)
    }

    /// 观测密度：相邻观测之间的单元数
    pub fn obs_density(&self) -> Option<usize> {
        self.obs.map(|o| o.density)
    }

    /// 场在观测向量中的下标范围；`hv` 或无观测布局时为 `None`
    pub fn obs_range(&self, field: Field) -> Option<Range<usize>> {
        let obs = self.obs?;
        let f = field.index();
        (f < OBSERVED_FIELDS).then(|| f * obs.per_field..(f + 1) * obs.per_field)
    }

    /// 被观测的网格单元：`density*m - 1`, `m = 1..=per_field`
    pub fn obs_cells(&self) -> Vec<usize> {
        match self.obs {
            Some(obs) => (1..=obs.per_field).map(|m| obs.density * m - 1).collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_centers() {
        let grid = Grid::new(4, 1.0).unwrap();
        assert!((grid.dx() - 0.25).abs() < 1e-15);
        let expected = [0.125, 0.375, 0.625, 0.875];
        for (a, b) in grid.centers().iter().zip(expected) {
            assert!((a - b).abs() < 1e-15);
        }
        assert!(Grid::new(0, 1.0).is_err());
        assert!(Grid::new(4, -1.0).is_err());
    }

    #[test]
    fn test_field_ranges() {
        let layout = StateLayout::new(50, 3).unwrap();
        assert_eq!(layout.state_range(Field::H).unwrap(), 0..50);
        assert_eq!(layout.state_range(Field::Hu).unwrap(), 50..100);
        assert_eq!(layout.state_range(Field::Hr).unwrap(), 100..150);
        assert!(layout.state_range(Field::Hv).is_err());
        assert_eq!(layout.fields().count(), 3);
    }

    #[test]
    fn test_reserved_field_with_four_equations() {
        let layout = StateLayout::from_state_dim(800, 4).unwrap();
        assert_eq!(layout.nk(), 200);
        assert_eq!(layout.state_range(Field::Hv).unwrap(), 600..800);
    }

    #[test]
    fn test_observation_layout() {
        let layout = StateLayout::new(200, 3).unwrap().with_observations(120).unwrap();
        assert_eq!(layout.obs_per_field(), Some(40));
        assert_eq!(layout.obs_density(), Some(5));
        assert_eq!(layout.obs_range(Field::Hu), Some(40..80));
        assert_eq!(layout.obs_range(Field::Hv), None);

        let cells = layout.obs_cells();
        assert_eq!(cells.len(), 40);
        assert_eq!(cells[0], 4);
        assert_eq!(cells[39], 199);
    }

    #[test]
    fn test_inconsistent_observation_dim() {
        let layout = StateLayout::new(200, 3).unwrap();
        assert!(layout.with_observations(121).is_err());
        assert!(layout.with_observations(0).is_err());
        // 每场 7 个观测无法整除 200
        assert!(layout.with_observations(21).is_err());
    }

    #[test]
    fn test_non_dividing_observations_name_the_axis() {
        let err = StateLayout::new(200, 3).unwrap().with_observations(21).unwrap_err();
        match err {
            MhError::ShapeMismatch { array, axis, expected, actual } => {
                assert_eq!(array, "Y_obs_array");
                assert_eq!(axis, "observation");
                assert_eq!((expected, actual), (15, 21));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_equation_count() {
        assert!(StateLayout::new(10, 2).is_err());
        assert!(StateLayout::from_state_dim(31, 3).is_err());
    }
}
