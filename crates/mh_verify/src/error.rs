// crates/mh_verify/src/error.rs

//! 校验层错误
//!
//! 统计与评分错误在检测点抛出，并附上定位信息：组合索引、时间层、场名。

use mh_foundation::MhError;
use mh_io::{ConfigIndex, IoError};
use thiserror::Error;

use crate::layout::Field;

/// 校验层结果类型
pub type VerifyResult<T> = Result<T, VerifyError>;

/// 出错位置
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Location {
    /// 组合索引
    pub config: Option<ConfigIndex>,
    /// 时间层
    pub time: Option<usize>,
    /// 场
    pub field: Option<Field>,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.config {
            Some(index) => write!(f, "config={index}")?,
            None => f.write_str("config=-")?,
        }
        if let Some(t) = self.time {
            write!(f, " T={t}")?;
        }
        if let Some(field) = self.field {
            write!(f, " field={field}")?;
        }
        Ok(())
    }
}

/// 校验错误
#[derive(Error, Debug)]
pub enum VerifyError {
    /// 带定位信息的统计错误
    #[error("校验失败 [{location}]: {source}")]
    At {
        /// 出错位置
        location: Location,
        /// 底层错误
        #[source]
        source: MhError,
    },

    /// 加载输出数组失败
    #[error("加载输出失败: {0}")]
    Load(#[from] IoError),

    /// 基础层错误
    #[error(transparent)]
    Foundation(#[from] MhError),
}

impl VerifyError {
    /// 附加位置
    pub fn at(source: impl Into<MhError>, location: Location) -> Self {
        Self::At {
            location,
            source: source.into(),
        }
    }

    /// 出错位置（若有）
    pub fn location(&self) -> Option<&Location> {
        match self {
            Self::At { location, .. } => Some(location),
            _ => None,
        }
    }

    /// 是否为集合退化错误
    pub fn is_degenerate(&self) -> bool {
        matches!(
            self,
            Self::At { source: MhError::DegenerateEnsemble { .. }, .. }
                | Self::Foundation(MhError::DegenerateEnsemble { .. })
        )
    }
}

impl Location {
    /// 组合与时间层
    pub fn new(config: Option<ConfigIndex>, time: usize) -> Self {
        Self {
            config,
            time: Some(time),
            field: None,
        }
    }

    /// 附加场
    pub fn with_field(mut self, field: Field) -> Self {
        self.field = Some(field);
        self
    }
}

/// 给结果附加位置
pub trait ResultExt<T> {
    /// 出错时附加位置
    fn at(self, location: Location) -> VerifyResult<T>;
}

impl<T, E: Into<MhError>> ResultExt<T> for Result<T, E> {
    fn at(self, location: Location) -> VerifyResult<T> {
        self.map_err(|e| VerifyError::at(e, location))
    }
}
