// crates/mh_config/src/lib.rs

//! MariHydro Config Layer
//!
//! 配置层，描述一次 EnKF 调参扫描实验。
//!
//! # 模块概览
//!
//! - [`experiment_config`]: ExperimentConfig 实验配置（全 f64）
//! - [`error`]: 配置错误类型
//!
//! # 层级架构
//!
//! ```text
//! mh_cli       ─> ExperimentConfig
//! mh_workflow  ─> SweepConfig, OutputConfig, RuntimeConfig
//! mh_io        ─> identity_hash (真值缓存身份)
//! mh_config    ─> 本层
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod experiment_config;

// 重导出核心类型
pub use error::ConfigError;
pub use experiment_config::{
    AssimilationConfig, ExperimentConfig, GridConfig, ModelConfig, OutputConfig, RuntimeConfig,
    SweepConfig, OBSERVED_FIELDS,
};
