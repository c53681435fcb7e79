// crates/mh_io/src/lib.rs

//! MariHydro IO 模块
//!
//! 同化实验的持久化层：带校验和的数组文件、按组合划分的输出目录、
//! 以及扫描共享的真值缓存。
//!
//! # 模块
//!
//! - [`array_file`]: `.mhtr` 数组文件编解码
//! - [`npy`]: NumPy `.npy` 数组读取
//! - [`run_output`]: 扫描目录布局与单组合输出句柄
//! - [`truth_cache`]: 真值轨迹缓存
//! - [`artifacts`]: 单组合输出的加载与形状校验
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use mh_io::{ConfigIndex, RunArtifacts, SweepLayout, TruthCache};
//!
//! let layout = SweepLayout::new(".", "test_enkf");
//! let truth = TruthCache::new(layout.truth_path()).get_or_create(|| integrate_truth())?;
//! let run = RunArtifacts::load(&layout.run_output(ConfigIndex::new(0, 0, 2)))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod array_file;
pub mod artifacts;
pub mod error;
pub mod npy;
pub mod run_output;
pub mod truth_cache;

// 重导出常用类型
pub use array_file::{ArrayFile, ArrayHeader, ARRAY_FILE_EXTENSION};
pub use artifacts::{RunArtifacts, RunShape};
pub use error::{IoError, IoResult};
pub use npy::{read_npy, NPY_EXTENSION};
pub use run_output::{ArtifactKind, ConfigIndex, RunOutput, SweepLayout};
pub use truth_cache::TruthCache;
