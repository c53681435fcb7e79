// crates/mh_foundation/src/error.rs

//! 错误处理模块，定义统一错误类型
//!
//! 提供 `MhError` 枚举和 `MhResult` 类型别名，用于整个工作区的错误处理。
//!
//! # 设计原则
//!
//! 1. **层次化**: 基础层只定义核心错误，统计和工作流相关错误在上层扩展
//! 2. **易用性**: 提供便捷的构造方法
//! 3. **可定位**: 形状错误必须指出数组名和轴
//!
//! # 示例
//!
//! ```
//! use mh_foundation::error::{MhError, MhResult};
//!
//! fn check_levels(time: usize) -> MhResult<()> {
//!     MhError::check_time(time, 49)
//! }
//! assert!(check_levels(49).is_err());
//! ```

use thiserror::Error;

/// 统一结果类型
pub type MhResult<T> = Result<T, MhError>;

/// MariHydro 错误类型
#[derive(Error, Debug)]
pub enum MhError {
    // ========================================================================
    // IO 相关错误
    // ========================================================================
    /// IO 错误
    #[error("IO错误: {message}")]
    Io {
        /// 描述性错误信息
        message: String,
        #[source]
        /// 可选的底层 IO 错误
        source: Option<std::io::Error>,
    },

    // ========================================================================
    // 数据相关错误
    // ========================================================================
    /// 无效输入
    #[error("无效的输入数据: {message}")]
    InvalidInput {
        /// 说明无效原因
        message: String,
    },

    /// 数组大小不匹配
    #[error("数组大小不匹配: {name} 期望{expected}, 实际{actual}")]
    SizeMismatch {
        /// 数据名称
        name: &'static str,
        /// 期望大小
        expected: usize,
        /// 实际大小
        actual: usize,
    },

    /// 数组形状与布局不一致
    #[error("数组形状不匹配: {array} 的 {axis} 轴期望 {expected}, 实际 {actual}")]
    ShapeMismatch {
        /// 数组名称
        array: String,
        /// 轴名称
        axis: &'static str,
        /// 期望长度
        expected: usize,
        /// 实际长度
        actual: usize,
    },

    /// 集合成员数不足以估计协方差
    #[error("集合退化: {context} 只有 {members} 个成员, 协方差至少需要 2 个")]
    DegenerateEnsemble {
        /// 成员数
        members: usize,
        /// 出错位置描述
        context: String,
    },

    /// 同化时间层越界
    #[error("时间层越界: T={time}, 可用时间层 0..{levels}")]
    TimeOutOfRange {
        /// 请求的时间层
        time: usize,
        /// 时间层总数
        levels: usize,
    },

    /// 索引越界
    #[error("索引越界: {index_type} 索引 {index} 超出范围 0..{len}")]
    IndexOutOfBounds {
        /// 索引类别描述
        index_type: &'static str,
        /// 访问的索引
        index: usize,
        /// 上界（长度）
        len: usize,
    },

    // ========================================================================
    // 配置相关错误
    // ========================================================================
    /// 配置值无效
    #[error("配置值无效: {key}={value}, 原因: {reason}")]
    InvalidConfig {
        /// 配置键名
        key: String,
        /// 配置值
        value: String,
        /// 无效原因说明
        reason: String,
    },

    /// 序列化错误
    #[error("序列化错误: {message}")]
    Serialization {
        /// 序列化失败原因
        message: String,
    },

    /// 内部错误
    #[error("内部错误: {message}")]
    Internal {
        /// 内部错误描述
        message: String,
    },
}

// ========================================================================
// 便捷构造方法
// ========================================================================

impl MhError {
    /// 从IO错误创建（带源）
    pub fn io_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source: Some(source),
        }
    }

    /// 无效输入
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// 数组大小不匹配
    pub fn size_mismatch(name: &'static str, expected: usize, actual: usize) -> Self {
        Self::SizeMismatch {
            name,
            expected,
            actual,
        }
    }

    /// 数组某一轴的长度不匹配
    pub fn shape_mismatch(
        array: impl Into<String>,
        axis: &'static str,
        expected: usize,
        actual: usize,
    ) -> Self {
        Self::ShapeMismatch {
            array: array.into(),
            axis,
            expected,
            actual,
        }
    }

    /// 集合退化
    pub fn degenerate_ensemble(members: usize, context: impl Into<String>) -> Self {
        Self::DegenerateEnsemble {
            members,
            context: context.into(),
        }
    }

    /// 时间层越界
    pub fn time_out_of_range(time: usize, levels: usize) -> Self {
        Self::TimeOutOfRange { time, levels }
    }

    /// 索引越界
    pub fn index_out_of_bounds(index_type: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfBounds {
            index_type,
            index,
            len,
        }
    }

    /// 配置值无效
    pub fn invalid_config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// 序列化错误
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// 内部错误
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

// ========================================================================
// 验证辅助方法
// ========================================================================

impl MhError {
    /// 检查数组大小是否匹配
    #[inline]
    pub fn check_size(name: &'static str, expected: usize, actual: usize) -> MhResult<()> {
        if expected != actual {
            Err(Self::size_mismatch(name, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查数组某一轴的长度
    #[inline]
    pub fn check_axis(
        array: &str,
        axis: &'static str,
        expected: usize,
        actual: usize,
    ) -> MhResult<()> {
        if expected != actual {
            Err(Self::shape_mismatch(array, axis, expected, actual))
        } else {
            Ok(())
        }
    }

    /// 检查集合成员数 (协方差需要 N-1 > 0)
    #[inline]
    pub fn check_members(members: usize, context: impl FnOnce() -> String) -> MhResult<()> {
        if members < 2 {
            Err(Self::degenerate_ensemble(members, context()))
        } else {
            Ok(())
        }
    }

    /// 检查时间层
    #[inline]
    pub fn check_time(time: usize, levels: usize) -> MhResult<()> {
        if time >= levels {
            Err(Self::time_out_of_range(time, levels))
        } else {
            Ok(())
        }
    }
}

impl From<std::io::Error> for MhError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

// ========================================================================
// 测试
// ========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MhError::invalid_config("n_ens", "1", "至少需要 2 个成员");
        assert!(err.to_string().contains("n_ens=1"));
    }

    #[test]
    fn test_shape_mismatch_names_array_and_axis() {
        let err = MhError::shape_mismatch("Xan_array", "member", 20, 19);
        let msg = err.to_string();
        assert!(msg.contains("Xan_array"));
        assert!(msg.contains("member"));
        assert!(msg.contains("20"));
        assert!(msg.contains("19"));
    }

    #[test]
    fn test_check_members() {
        assert!(MhError::check_members(2, || "fc".into()).is_ok());
        let err = MhError::check_members(1, || "an, T=3".into()).unwrap_err();
        assert!(matches!(err, MhError::DegenerateEnsemble { members: 1, .. }));
        assert!(err.to_string().contains("T=3"));
    }

    #[test]
    fn test_check_time() {
        assert!(MhError::check_time(4, 5).is_ok());
        assert!(matches!(
            MhError::check_time(5, 5),
            Err(MhError::TimeOutOfRange { time: 5, levels: 5 })
        ));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let mh_err: MhError = io_err.into();
        assert!(matches!(mh_err, MhError::Io { .. }));
    }
}
