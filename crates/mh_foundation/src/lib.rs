// crates/mh_foundation/src/lib.rs

//! MariHydro Foundation Layer
//!
//! 基础层，提供整个工作区共享的错误类型和数值工具。
//!
//! # 模块概览
//!
//! - [`error`]: 统一错误类型
//! - [`kahan`]: 补偿求和
//!
//! # 示例
//!
//! ```
//! use mh_foundation::{KahanSum, MhError, MhResult};
//!
//! fn mean(values: &[f64]) -> MhResult<f64> {
//!     KahanSum::mean_iter(values.iter().copied())
//!         .ok_or_else(|| MhError::invalid_input("empty slice"))
//! }
//! assert_eq!(mean(&[1.0, 3.0]).unwrap(), 2.0);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod kahan;

// 重导出常用类型
pub use error::{MhError, MhResult};
pub use kahan::KahanSum;

/// Prelude 模块，包含常用类型
pub mod prelude {
    pub use crate::error::{MhError, MhResult};
    pub use crate::kahan::KahanSum;
}
