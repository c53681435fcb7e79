// crates/mh_config/src/experiment_config.rs

//! ExperimentConfig - 同化实验配置（全 f64）
//!
//! 描述一次 EnKF 参数扫描所需的全部设置：网格、模型常数、
//! 观测与同化周期、调参网格、输出位置和运行时资源。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

/// 被观测的物理场数量 (h, hu, hr)
pub const OBSERVED_FIELDS: usize = 3;

/// 同化实验配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// 网格配置
    #[serde(default)]
    pub grid: GridConfig,

    /// 模型参数
    #[serde(default)]
    pub model: ModelConfig,

    /// 同化与观测配置
    #[serde(default)]
    pub assimilation: AssimilationConfig,

    /// 调参扫描配置
    #[serde(default)]
    pub sweep: SweepConfig,

    /// 输出配置
    #[serde(default)]
    pub output: OutputConfig,

    /// 运行时配置
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 网格配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridConfig {
    /// 单元数 Nk
    #[serde(default = "default_nk")]
    pub nk: usize,

    /// 计算域长度 L
    #[serde(default = "default_length")]
    pub length: f64,
}

fn default_nk() -> usize { 200 }
fn default_length() -> f64 { 1.0 }

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            nk: default_nk(),
            length: default_length(),
        }
    }
}

/// 模型参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// 方程数 Neq (h, hu, hr, 可选 hv)
    #[serde(default = "default_neq")]
    pub neq: usize,

    /// 静水深 H0
    #[serde(default = "default_h0")]
    pub h0: f64,

    /// 对流阈值 Hc
    #[serde(default = "default_hc")]
    pub hc: f64,

    /// 降雨阈值 Hr
    #[serde(default = "default_hr")]
    pub hr: f64,

    /// 初始扰动/地形振幅 A
    #[serde(default = "default_amplitude")]
    pub amplitude: f64,

    /// 初始速度尺度 V
    #[serde(default = "default_velocity")]
    pub velocity: f64,
}

fn default_neq() -> usize { 3 }
fn default_h0() -> f64 { 1.0 }
fn default_hc() -> f64 { 1.02 }
fn default_hr() -> f64 { 1.05 }
fn default_amplitude() -> f64 { 0.1 }
fn default_velocity() -> f64 { 1.0 }

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            neq: default_neq(),
            h0: default_h0(),
            hc: default_hc(),
            hr: default_hr(),
            amplitude: default_amplitude(),
            velocity: default_velocity(),
        }
    }
}

/// 同化与观测配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssimilationConfig {
    /// 同化周期数 Nmeas (时间层为 Nmeas+1，第 0 层为初值)
    #[serde(default = "default_n_meas")]
    pub n_meas: usize,

    /// 同化间隔
    #[serde(default = "default_dtmeasure")]
    pub dtmeasure: f64,

    /// 显式同化时刻（为空时按 dtmeasure 均匀生成）
    #[serde(default)]
    pub assim_times: Vec<f64>,

    /// 观测稀疏度：每隔 obs_density 个单元观测一次
    #[serde(default = "default_obs_density")]
    pub obs_density: usize,

    /// 各观测场的观测误差标准差 (h, hu, hr)
    #[serde(default = "default_ob_noise")]
    pub ob_noise: Vec<f64>,

    /// 集合成员数
    #[serde(default = "default_n_ens")]
    pub n_ens: usize,
}

fn default_n_meas() -> usize { 48 }
fn default_dtmeasure() -> f64 { 0.144 }
fn default_obs_density() -> usize { 5 }
fn default_ob_noise() -> Vec<f64> { vec![0.1, 0.05, 0.005] }
fn default_n_ens() -> usize { 20 }

impl Default for AssimilationConfig {
    fn default() -> Self {
        Self {
            n_meas: default_n_meas(),
            dtmeasure: default_dtmeasure(),
            assim_times: Vec::new(),
            obs_density: default_obs_density(),
            ob_noise: default_ob_noise(),
            n_ens: default_n_ens(),
        }
    }
}

/// 调参扫描配置（三组有序参数的笛卡尔积）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepConfig {
    /// 局地化半径
    #[serde(default = "default_localization")]
    pub localization: Vec<f64>,

    /// 加性膨胀幅度
    #[serde(default = "default_additive_inflation")]
    pub additive_inflation: Vec<f64>,

    /// 乘性膨胀因子
    #[serde(default = "default_multiplicative_inflation")]
    pub multiplicative_inflation: Vec<f64>,
}

fn default_localization() -> Vec<f64> { vec![1e-10] }
fn default_additive_inflation() -> Vec<f64> { vec![0.2] }
fn default_multiplicative_inflation() -> Vec<f64> { vec![1.01, 1.05, 1.1] }

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            localization: default_localization(),
            additive_inflation: default_additive_inflation(),
            multiplicative_inflation: default_multiplicative_inflation(),
        }
    }
}

impl SweepConfig {
    /// 组合总数
    pub fn n_combinations(&self) -> usize {
        self.localization.len() * self.additive_inflation.len() * self.multiplicative_inflation.len()
    }
}

/// 输出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// 输出根目录
    #[serde(default = "default_output_dir")]
    pub directory: PathBuf,

    /// 扫描目录名，同时作为各组合子目录的前缀
    #[serde(default = "default_dirname")]
    pub dirname: String,
}

fn default_output_dir() -> PathBuf { PathBuf::from(".") }
fn default_dirname() -> String { "test_enkf".to_string() }

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: default_output_dir(),
            dirname: default_dirname(),
        }
    }
}

impl OutputConfig {
    /// 扫描根目录
    pub fn sweep_root(&self) -> PathBuf {
        self.directory.join(&self.dirname)
    }
}

/// 运行时配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RuntimeConfig {
    /// 工作线程数 (0=自动)
    #[serde(default)]
    pub num_threads: usize,

    /// 跳过已完成的组合
    #[serde(default)]
    pub resume: bool,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            model: ModelConfig::default(),
            assimilation: AssimilationConfig::default(),
            sweep: SweepConfig::default(),
            output: OutputConfig::default(),
            runtime: RuntimeConfig::default(),
        }
    }
}

impl ExperimentConfig {
    /// 从文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(ConfigError::Io)?;

        let config: ExperimentConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// 保存配置到文件
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(ConfigError::Io)?;
        Ok(())
    }

    /// 状态向量维数 Neq*Nk
    pub fn state_dim(&self) -> usize {
        self.model.neq * self.grid.nk
    }

    /// 观测向量维数（前三个场，每 obs_density 个单元一个）
    pub fn obs_dim(&self) -> usize {
        OBSERVED_FIELDS * (self.grid.nk / self.assimilation.obs_density.max(1))
    }

    /// 时间层数 Nmeas+1
    pub fn time_levels(&self) -> usize {
        self.assimilation.n_meas + 1
    }

    /// 同化时刻，长度为 Nmeas+1
    pub fn assimilation_times(&self) -> Vec<f64> {
        if !self.assimilation.assim_times.is_empty() {
            return self.assimilation.assim_times.clone();
        }
        (0..self.time_levels())
            .map(|k| k as f64 * self.assimilation.dtmeasure)
            .collect()
    }

    /// 真值缓存身份
    ///
    /// 对网格、模型和同化时刻做 FNV-1a 哈希，扫描参数不参与。
    /// 返回值永不为 0（0 在文件中表示"无身份"）。
    pub fn identity_hash(&self) -> u64 {
        let GridConfig { nk, length } = self.grid;
        let ModelConfig { neq, h0, hc, hr, amplitude, velocity } = self.model;
        let times = self.assimilation_times();

        let mut bytes = Vec::with_capacity(8 * (9 + times.len()));
        for n in [nk, neq, self.assimilation.n_meas, times.len()] {
            bytes.extend_from_slice(&(n as u64).to_le_bytes());
        }
        for x in [length, h0, hc, hr, amplitude, velocity].into_iter().chain(times) {
            bytes.extend_from_slice(&x.to_bits().to_le_bytes());
        }
        fnv1a(&bytes).max(1)
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.grid.nk == 0 {
            return Err(invalid("grid.nk", self.grid.nk, "单元数必须为正"));
        }
        if !(self.grid.length > 0.0) {
            return Err(invalid("grid.length", self.grid.length, "计算域长度必须为正"));
        }

        if self.model.neq < OBSERVED_FIELDS || self.model.neq > OBSERVED_FIELDS + 1 {
            return Err(invalid("model.neq", self.model.neq, "Neq 必须为 3 或 4 (h, hu, hr[, hv])"));
        }

        let asm = &self.assimilation;
        if asm.n_ens < 2 {
            return Err(invalid("assimilation.n_ens", asm.n_ens, "协方差估计至少需要 2 个成员"));
        }
        if asm.obs_density == 0 || self.grid.nk % asm.obs_density != 0 {
            return Err(invalid(
                "assimilation.obs_density",
                asm.obs_density,
                "观测稀疏度必须为正且整除 Nk",
            ));
        }
        if asm.ob_noise.len() < OBSERVED_FIELDS || asm.ob_noise.iter().any(|&s| !(s > 0.0)) {
            return Err(invalid(
                "assimilation.ob_noise",
                format!("{:?}", asm.ob_noise),
                "需要 3 个正的观测误差",
            ));
        }
        if asm.assim_times.is_empty() {
            if !(asm.dtmeasure > 0.0) {
                return Err(invalid("assimilation.dtmeasure", asm.dtmeasure, "同化间隔必须为正"));
            }
        } else {
            if asm.assim_times.len() != self.time_levels() {
                return Err(invalid(
                    "assimilation.assim_times",
                    asm.assim_times.len(),
                    "长度必须为 n_meas+1",
                ));
            }
            if asm.assim_times.windows(2).any(|w| w[1] <= w[0]) {
                return Err(invalid(
                    "assimilation.assim_times",
                    format!("{:?}", asm.assim_times),
                    "同化时刻必须严格递增",
                ));
            }
        }

        let sweep = &self.sweep;
        check_list("sweep.localization", &sweep.localization, |v| v >= 0.0)?;
        check_list("sweep.additive_inflation", &sweep.additive_inflation, |v| v >= 0.0)?;
        check_list("sweep.multiplicative_inflation", &sweep.multiplicative_inflation, |v| v > 0.0)?;

        if self.output.dirname.is_empty() {
            return Err(ConfigError::Missing("output.dirname".to_string()));
        }

        Ok(())
    }
}

fn invalid(key: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn check_list(key: &str, values: &[f64], ok: impl Fn(f64) -> bool) -> Result<(), ConfigError> {
    if values.is_empty() {
        return Err(invalid(key, "[]", "参数列表不能为空"));
    }
    if let Some(bad) = values.iter().copied().find(|&v| !v.is_finite() || !ok(v)) {
        return Err(invalid(key, bad, "参数超出允许范围"));
    }
    Ok(())
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    bytes
        .iter()
        .fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExperimentConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.state_dim(), 600);
        assert_eq!(config.obs_dim(), 120);
        assert_eq!(config.sweep.n_combinations(), 3);
        assert_eq!(config.assimilation_times().len(), 49);
    }

    #[test]
    fn test_invalid_ensemble_size() {
        let mut config = ExperimentConfig::default();
        config.assimilation.n_ens = 1;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("n_ens"));
    }

    #[test]
    fn test_obs_density_must_divide_nk() {
        let mut config = ExperimentConfig::default();
        config.assimilation.obs_density = 7;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_sweep_list() {
        let mut config = ExperimentConfig::default();
        config.sweep.multiplicative_inflation.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_explicit_assim_times() {
        let mut config = ExperimentConfig::default();
        config.assimilation.n_meas = 2;
        config.assimilation.assim_times = vec![0.0, 0.5, 0.4];
        assert!(config.validate().is_err());
        config.assimilation.assim_times = vec![0.0, 0.5, 1.0];
        assert!(config.validate().is_ok());
        assert_eq!(config.assimilation_times(), vec![0.0, 0.5, 1.0]);
    }

    #[test]
    fn test_identity_ignores_sweep_parameters() {
        let a = ExperimentConfig::default();
        let mut b = a.clone();
        b.sweep.localization = vec![1.0, 2.5];
        b.runtime.num_threads = 8;
        assert_eq!(a.identity_hash(), b.identity_hash());

        b.grid.nk = 100;
        assert_ne!(a.identity_hash(), b.identity_hash());
        assert_ne!(b.identity_hash(), 0);
    }

    #[test]
    fn test_identity_covers_model_and_times() {
        let a = ExperimentConfig::default();

        let mut b = a.clone();
        b.model.hr = 1.06;
        assert_ne!(a.identity_hash(), b.identity_hash());

        let mut c = a.clone();
        c.assimilation.dtmeasure *= 2.0;
        assert_ne!(a.identity_hash(), c.identity_hash());

        // 非有限值也有确定的身份
        let mut d = a.clone();
        d.model.velocity = f64::NAN;
        assert_eq!(d.identity_hash(), d.clone().identity_hash());
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = ExperimentConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ExperimentConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.grid.nk, config.grid.nk);
        assert_eq!(parsed.identity_hash(), config.identity_hash());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let parsed: ExperimentConfig =
            serde_json::from_str(r#"{ "grid": { "nk": 50 }, "sweep": { "localization": [1.0] } }"#)
                .unwrap();
        assert_eq!(parsed.grid.nk, 50);
        assert_eq!(parsed.grid.length, 1.0);
        assert_eq!(parsed.sweep.multiplicative_inflation, vec![1.01, 1.05, 1.1]);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("experiment.json");
        let config = ExperimentConfig::default();
        config.save_to_file(&path).unwrap();
        let loaded = ExperimentConfig::from_file(&path).unwrap();
        assert_eq!(loaded.output.dirname, "test_enkf");
    }
}
