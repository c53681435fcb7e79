// crates/mh_io/src/truth_cache.rs

//! 真值轨迹缓存
//!
//! 昂贵且带随机性的真值积分只做一次，之后所有调参组合都读取同一份数据。
//! 任何加载失败（缺失、损坏、不可读）都视为缓存未命中：调用生成器并写回同一位置。
//!
//! 文件头带有配置身份哈希。身份不一致时返回 [`IoError::IdentityMismatch`]，
//! 既不静默复用也不覆盖已有的真值。

use std::fmt;
use std::path::{Path, PathBuf};

use mh_foundation::MhError;
use ndarray::Array3;

use crate::array_file::ArrayFile;
use crate::error::{IoError, IoResult};

const TRUTH_NAME: &str = "U_tr_array";

/// 真值轨迹缓存 `[state_dim, 1, Nmeas+1]`
#[derive(Debug, Clone)]
pub struct TruthCache {
    path: PathBuf,
    identity: Option<u64>,
}

impl TruthCache {
    /// 创建缓存（不触碰文件系统）
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            identity: None,
        }
    }

    /// 设置配置身份
    pub fn with_identity(mut self, identity: u64) -> Self {
        self.identity = (identity != 0).then_some(identity);
        self
    }

    /// 缓存路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取缓存
    pub fn load(&self) -> IoResult<Array3<f64>> {
        let file = ArrayFile::load(&self.path)?;

        if let (Some(expected), Some(found)) = (self.identity, file.identity) {
            if expected != found {
                return Err(IoError::IdentityMismatch {
                    path: self.path.clone(),
                    expected,
                    found,
                });
            }
        }

        let truth = file.into_array3(TRUTH_NAME)?;
        check_single_member(&truth)?;
        Ok(truth)
    }

    /// 写入缓存
    pub fn store(&self, truth: &Array3<f64>) -> IoResult<()> {
        check_single_member(truth)?;
        let mut file = ArrayFile::from_array(truth);
        if let Some(identity) = self.identity {
            file = file.with_identity(identity);
        }
        file.save(&self.path)
    }

    /// 读取缓存，未命中时生成并写回
    ///
    /// 生成器失败是整个扫描的致命错误，以 [`IoError::Generator`] 返回。
    pub fn get_or_create<F, E>(&self, generator: F) -> IoResult<Array3<f64>>
    where
        F: FnOnce() -> Result<Array3<f64>, E>,
        E: fmt::Display,
    {
        match self.load() {
            Ok(truth) => {
                tracing::info!(
                    "Loaded truth trajectory {:?} from {}",
                    truth.shape(),
                    self.path.display()
                );
                return Ok(truth);
            }
            Err(err @ IoError::IdentityMismatch { .. }) => return Err(err),
            Err(err) if err.is_not_found() => {
                tracing::info!("No cached truth at {}, generating", self.path.display());
            }
            Err(err) => {
                tracing::warn!("Truth cache unusable ({}), regenerating", err);
            }
        }

        let truth = generator().map_err(|e| IoError::Generator(e.to_string()))?;
        self.store(&truth)?;
        tracing::info!(
            "Generated truth trajectory {:?} -> {}",
            truth.shape(),
            self.path.display()
        );
        Ok(truth)
    }
}

fn check_single_member(truth: &Array3<f64>) -> IoResult<()> {
    MhError::check_axis(TRUTH_NAME, "member", 1, truth.shape()[1])?;
    Ok(())
}
