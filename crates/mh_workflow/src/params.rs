// crates/mh_workflow/src/params.rs

//! 调参网格
//!
//! 三个有序参数列表的笛卡尔积。每个组合的 `(i,j,k)` 由其在各列表中的位置决定，
//! 与枚举顺序、执行顺序无关。

use mh_config::SweepConfig;
use mh_io::ConfigIndex;

use crate::job::TuningParameters;

/// 调参网格
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterGrid {
    localization: Vec<f64>,
    additive_inflation: Vec<f64>,
    multiplicative_inflation: Vec<f64>,
}

impl ParameterGrid {
    /// 由三个参数列表创建
    pub fn new(localization: Vec<f64>, additive_inflation: Vec<f64>, multiplicative_inflation: Vec<f64>) -> Self {
        Self {
            localization,
            additive_inflation,
            multiplicative_inflation,
        }
    }

    /// 组合总数
    pub fn len(&self) -> usize {
        self.localization.len() * self.additive_inflation.len() * self.multiplicative_inflation.len()
    }

    /// 三个参数列表各自的长度
    pub fn list_lengths(&self) -> [usize; 3] {
        [
            self.localization.len(),
            self.additive_inflation.len(),
            self.multiplicative_inflation.len(),
        ]
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 取某个组合的参数
    pub fn get(&self, index: ConfigIndex) -> Option<TuningParameters> {
        Some(TuningParameters {
            localization: *self.localization.get(index.i)?,
            additive_inflation: *self.additive_inflation.get(index.j)?,
            multiplicative_inflation: *self.multiplicative_inflation.get(index.k)?,
        })
    }

    /// 全部组合索引，按 `(i,j,k)` 字典序
    pub fn indices(&self) -> impl Iterator<Item = ConfigIndex> + '_ {
        let (nj, nk) = (self.additive_inflation.len(), self.multiplicative_inflation.len());
        (0..self.localization.len()).flat_map(move |i| {
            (0..nj).flat_map(move |j| (0..nk).map(move |k| ConfigIndex::new(i, j, k)))
        })
    }

    /// 显式任务列表
    pub fn tasks(&self) -> Vec<(ConfigIndex, TuningParameters)> {
        self.indices()
            .filter_map(|index| self.get(index).map(|p| (index, p)))
            .collect()
    }
}

impl From<&SweepConfig> for ParameterGrid {
    fn from(config: &SweepConfig) -> Self {
        Self::new(
            config.localization.clone(),
            config.additive_inflation.clone(),
            config.multiplicative_inflation.clone(),
        )
    }
}
