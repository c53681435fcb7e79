// crates/mh_verify/src/lib.rs

//! MariHydro 集合校验层
//!
//! 把持久化的集合轨迹变成统计量与技巧评分：集合平均、偏差、协方差、
//! 离散度与 RMSE 对比、CRPS，并打包成按时间层的诊断报告。
//!
//! # 模块概览
//!
//! - [`layout`]: 网格、物理场与状态/观测向量布局
//! - [`ensemble`]: 集合与真值轨迹
//! - [`statistics`]: 平均、偏差、协方差
//! - [`crps`]: 连续分级概率评分
//! - [`skill`]: 每场技巧评分
//! - [`report`]: 可序列化诊断报告
//! - [`verifier`]: 单组合校验入口
//!
//! # 示例
//!
//! ```
//! use mh_verify::statistics::{covariance, deviations};
//! use ndarray::arr2;
//!
//! let x = arr2(&[[1.0, 3.0], [2.0, 2.0]]);
//! let p = covariance(deviations(x.view()).unwrap().view()).unwrap();
//! assert_eq!(p[[0, 0]], 2.0);
//! assert_eq!(p[[1, 1]], 0.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod crps;
pub mod ensemble;
pub mod error;
pub mod layout;
pub mod report;
pub mod skill;
pub mod statistics;
pub mod verifier;

// 重导出常用类型
pub use ensemble::{EnsembleTrajectory, TruthTrajectory};
pub use error::{Location, VerifyError, VerifyResult};
pub use layout::{Field, Grid, StateLayout};
pub use report::{DiagnosticReport, FieldReport, PhaseReport};
pub use skill::{FieldSkill, Phase, PhaseSkill, SkillScorer};
pub use statistics::{EnsembleMoments, EnsembleStatistics};
pub use verifier::{TimeLevelSkill, Verifier, DEFAULT_DOMAIN_LENGTH};
