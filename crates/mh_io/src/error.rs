// crates/mh_io/src/error.rs
//! IO 错误类型定义
//!
//! 提供 IO 模块的统一错误枚举。所有错误最终可转换为 MhError，
//! 以便统计层和工作流层跨层传递。

use std::path::PathBuf;

use mh_foundation::MhError;
use thiserror::Error;

/// IO 模块结果类型别名
pub type IoResult<T> = Result<T, IoError>;

/// IO 错误枚举
#[derive(Error, Debug)]
pub enum IoError {
    /// 底层文件错误
    #[error("文件错误 {path}: {source}")]
    File {
        /// 出错的文件
        path: PathBuf,
        /// 底层 IO 错误
        #[source]
        source: std::io::Error,
    },

    /// 文件格式错误（魔数、秩、截断）
    #[error("数组文件格式错误 {path}: {reason}")]
    Format {
        /// 出错的文件
        path: PathBuf,
        /// 原因
        reason: String,
    },

    /// 版本不兼容
    #[error("数组文件版本不兼容 {path}: 文件版本 {file}, 当前版本 {current}")]
    Version {
        /// 出错的文件
        path: PathBuf,
        /// 文件中的版本
        file: u32,
        /// 当前支持的版本
        current: u32,
    },

    /// 校验和错误
    #[error("校验和错误 {path}: 期望 {expected:08x}, 实际 {found:08x}")]
    Checksum {
        /// 出错的文件
        path: PathBuf,
        /// 文件中记录的 CRC
        expected: u32,
        /// 重新计算的 CRC
        found: u32,
    },

    /// 缓存的真值来自不同的网格/参数身份
    #[error("真值身份不匹配 {path}: 期望 {expected:016x}, 文件 {found:016x}")]
    IdentityMismatch {
        /// 缓存文件
        path: PathBuf,
        /// 当前配置的身份
        expected: u64,
        /// 文件中的身份
        found: u64,
    },

    /// 真值生成失败（扫描级致命错误）
    #[error("真值生成失败: {0}")]
    Generator(String),

    /// 基础层错误转换（形状不匹配等）
    #[error("基础层错误: {0}")]
    Foundation(#[from] MhError),
}

impl IoError {
    /// 包装底层 IO 错误并附上路径
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::File {
            path: path.into(),
            source,
        }
    }

    /// 格式错误
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// 文件是否不存在
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::File { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
    }
}

impl From<IoError> for MhError {
    fn from(err: IoError) -> Self {
        match err {
            IoError::File { path, source } => {
                MhError::io_with_source(format!("{}", path.display()), source)
            }
            IoError::Format { path, reason } => {
                MhError::serialization(format!("数组文件格式错误 [{}]: {reason}", path.display()))
            }
            IoError::Version { path, file, current } => MhError::serialization(format!(
                "数组文件版本不兼容 [{}]: {file} > {current}",
                path.display()
            )),
            IoError::Checksum { path, expected, found } => MhError::serialization(format!(
                "校验和错误 [{}]: {expected:08x} != {found:08x}",
                path.display()
            )),
            IoError::IdentityMismatch { path, expected, found } => MhError::invalid_config(
                "truth_cache",
                format!("{found:016x}"),
                format!("{} 由不同配置生成 (期望 {expected:016x})", path.display()),
            ),
            IoError::Generator(msg) => MhError::internal(format!("真值生成失败: {msg}")),
            IoError::Foundation(mh_err) => mh_err,
        }
    }
}
