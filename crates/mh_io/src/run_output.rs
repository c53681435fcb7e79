// crates/mh_io/src/run_output.rs

//! 扫描输出布局
//!
//! 每个调参组合 `(i,j,k)` 拥有一个独立的输出目录句柄，
//! 目录名由索引确定：重跑同一组合会覆盖/续跑同一位置。
//!
//! ```text
//! <directory>/<dirname>/
//!     U_tr_array.mhtr          真值缓存（全扫描共享）
//!     B_tr.mhtr                真值地形
//!     <dirname>111/            组合 (0,0,0)
//!         B.mhtr  X_array.mhtr  X_tr_array.mhtr  Xan_array.mhtr  Y_obs_array.mhtr  OI.mhtr
//! ```
//!
//! 读取时 `.mhtr` 缺失则回退到同名 `.npy`（外部运行器用 `np.save` 写出的数组）。

use std::fmt;
use std::path::{Path, PathBuf};

use ndarray::{Array, Array1, Array2, Array3, Dimension};
use serde::{Deserialize, Serialize};

use crate::array_file::{ArrayFile, ARRAY_FILE_EXTENSION};
use crate::error::{IoError, IoResult};
use crate::npy::{read_npy, NPY_EXTENSION};

/// 调参组合索引 `(i,j,k)`：局地化、加性膨胀、乘性膨胀
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConfigIndex {
    /// 局地化半径索引
    pub i: usize,
    /// 加性膨胀索引
    pub j: usize,
    /// 乘性膨胀索引
    pub k: usize,
}

impl ConfigIndex {
    /// 创建索引
    pub fn new(i: usize, j: usize, k: usize) -> Self {
        Self { i, j, k }
    }

    /// 目录后缀（1 起始）
    ///
    /// `separated` 由整个扫描决定：任一参数列表超过 9 项时所有组合都用下划线分隔，
    /// 避免 `1,11,1` 与 `11,1,1` 冲突。索引本身超过 9 时总是分隔。
    pub fn suffix(&self, separated: bool) -> String {
        if !separated && self.i < 9 && self.j < 9 && self.k < 9 {
            format!("{}{}{}", self.i + 1, self.j + 1, self.k + 1)
        } else {
            format!("{}_{}_{}", self.i + 1, self.j + 1, self.k + 1)
        }
    }
}

impl fmt::Display for ConfigIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{},{})", self.i, self.j, self.k)
    }
}

/// 单个组合输出的数组种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    /// 地形 `[Nk]`
    Topography,
    /// 真值 `[state_dim, 1, T]`
    Truth,
    /// 预报集合 `[state_dim, n_ens, T]`
    Forecast,
    /// 分析集合 `[state_dim, n_ens, T]`
    Analysis,
    /// 观测集合 `[obs_dim, n_obs_ens, T]`
    Observations,
    /// 方程数信息 `[Neq+1, ..]`
    EquationInfo,
}

impl ArtifactKind {
    /// 全部种类
    pub const ALL: [ArtifactKind; 6] = [
        Self::Topography,
        Self::Truth,
        Self::Forecast,
        Self::Analysis,
        Self::Observations,
        Self::EquationInfo,
    ];

    /// 文件主名
    pub fn stem(&self) -> &'static str {
        match self {
            Self::Topography => "B",
            Self::Truth => "X_tr_array",
            Self::Forecast => "X_array",
            Self::Analysis => "Xan_array",
            Self::Observations => "Y_obs_array",
            Self::EquationInfo => "OI",
        }
    }

    /// 期望的秩
    pub fn rank(&self) -> usize {
        match self {
            Self::Topography => 1,
            Self::EquationInfo => 2,
            _ => 3,
        }
    }

    /// 文件名
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.stem(), ARRAY_FILE_EXTENSION)
    }

    /// `.npy` 文件名
    pub fn npy_file_name(&self) -> String {
        format!("{}.{}", self.stem(), NPY_EXTENSION)
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.stem())
    }
}

/// 扫描根目录布局
#[derive(Debug, Clone)]
pub struct SweepLayout {
    root: PathBuf,
    dirname: String,
    separated: bool,
}

impl SweepLayout {
    /// 在 `directory/dirname` 下创建布局（不触碰文件系统）
    pub fn new(directory: impl AsRef<Path>, dirname: impl Into<String>) -> Self {
        let dirname = dirname.into();
        Self {
            root: directory.as_ref().join(&dirname),
            dirname,
            separated: false,
        }
    }

    /// 按各参数列表长度决定目录后缀格式
    pub fn with_list_lengths(mut self, lengths: &[usize]) -> Self {
        self.separated = lengths.iter().any(|&n| n > 9);
        self
    }

    /// 后缀是否用下划线分隔
    pub fn is_separated(&self) -> bool {
        self.separated
    }

    /// 扫描根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 真值缓存路径
    pub fn truth_path(&self) -> PathBuf {
        self.root.join(format!("U_tr_array.{ARRAY_FILE_EXTENSION}"))
    }

    /// 真值地形路径
    pub fn topography_path(&self) -> PathBuf {
        self.root.join(format!("B_tr.{ARRAY_FILE_EXTENSION}"))
    }

    /// 组合输出目录
    pub fn run_dir(&self, index: ConfigIndex) -> PathBuf {
        self.root.join(format!("{}{}", self.dirname, index.suffix(self.separated)))
    }

    /// 组合输出句柄
    pub fn run_output(&self, index: ConfigIndex) -> RunOutput {
        RunOutput {
            index: Some(index),
            dir: self.run_dir(index),
        }
    }

    /// 创建根目录
    pub fn create(&self) -> IoResult<()> {
        std::fs::create_dir_all(&self.root).map_err(|e| IoError::file(&self.root, e))
    }
}

/// 单个组合的输出句柄
///
/// 只写自己的目录；不同组合的句柄之间没有共享状态。
#[derive(Debug, Clone)]
pub struct RunOutput {
    index: Option<ConfigIndex>,
    dir: PathBuf,
}

impl RunOutput {
    /// 指向任意目录的句柄（无组合索引，例如单独校验一个目录）
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            index: None,
            dir: dir.into(),
        }
    }

    /// 组合索引
    pub fn index(&self) -> Option<ConfigIndex> {
        self.index
    }

    /// 输出目录
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 某类数组的路径
    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.dir.join(kind.file_name())
    }

    /// 某类数组的 `.npy` 路径
    pub fn npy_path(&self, kind: ArtifactKind) -> PathBuf {
        self.dir.join(kind.npy_file_name())
    }

    /// 某类数组是否存在（任一格式）
    pub fn exists(&self, kind: ArtifactKind) -> bool {
        self.path(kind).is_file() || self.npy_path(kind).is_file()
    }

    /// 删除某类数组（两种格式都删，不存在不算错误）
    pub fn remove(&self, kind: ArtifactKind) -> IoResult<()> {
        for path in [self.path(kind), self.npy_path(kind)] {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!("Removed stale {}", path.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(IoError::file(&path, e)),
            }
        }
        Ok(())
    }

    /// 创建输出目录
    pub fn create(&self) -> IoResult<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| IoError::file(&self.dir, e))
    }

    /// 写入一类数组（写一次；重跑时覆盖）
    pub fn write<D: Dimension>(&self, kind: ArtifactKind, array: &Array<f64, D>) -> IoResult<()> {
        if array.ndim() != kind.rank() {
            return Err(mh_foundation::MhError::shape_mismatch(kind.stem(), "rank", kind.rank(), array.ndim()).into());
        }
        let path = self.path(kind);
        ArrayFile::from_array(array).save(&path)?;
        tracing::debug!("Wrote {} {:?} -> {}", kind, array.shape(), path.display());
        Ok(())
    }

    /// 写入方程数信息数组：`Neq+1` 行，每个时间层一列
    pub fn write_equation_info(&self, neq: usize, time_levels: usize) -> IoResult<()> {
        self.write(ArtifactKind::EquationInfo, &Array2::<f64>::zeros((neq + 1, time_levels)))
    }

    fn load(&self, kind: ArtifactKind) -> IoResult<ArrayFile> {
        let path = self.path(kind);
        if !path.is_file() {
            let npy = self.npy_path(kind);
            if npy.is_file() {
                return read_npy(&npy);
            }
        }
        ArrayFile::load(&path)
    }

    /// 读取一维数组
    pub fn read1(&self, kind: ArtifactKind) -> IoResult<Array1<f64>> {
        self.load(kind)?.into_array1(kind.stem())
    }

    /// 读取二维数组
    pub fn read2(&self, kind: ArtifactKind) -> IoResult<Array2<f64>> {
        self.load(kind)?.into_array2(kind.stem())
    }

    /// 读取三维数组
    pub fn read3(&self, kind: ArtifactKind) -> IoResult<Array3<f64>> {
        self.load(kind)?.into_array3(kind.stem())
    }

    /// 是否所有数组都已写出
    pub fn is_complete(&self) -> bool {
        ArtifactKind::ALL.iter().all(|k| self.exists(*k))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_dir_naming() {
        let layout = SweepLayout::new("/tmp/exp", "test_enkf");
        assert_eq!(
            layout.run_dir(ConfigIndex::new(0, 0, 2)),
            PathBuf::from("/tmp/exp/test_enkf/test_enkf113")
        );
        assert_eq!(
            layout.truth_path(),
            PathBuf::from("/tmp/exp/test_enkf/U_tr_array.mhtr")
        );
    }

    #[test]
    fn test_suffix_disambiguates_large_grids() {
        let a = ConfigIndex::new(0, 10, 0).suffix(false);
        let b = ConfigIndex::new(10, 0, 0).suffix(false);
        assert_ne!(a, b);
        assert_eq!(a, "1_11_1");
    }

    #[test]
    fn test_suffix_format_fixed_per_sweep() {
        let short = SweepLayout::new("/tmp/exp", "e").with_list_lengths(&[2, 1, 9]);
        assert!(!short.is_separated());
        assert!(short.run_dir(ConfigIndex::new(1, 0, 8)).ends_with("e219"));

        // 一个列表有 12 项时，低位索引也用分隔格式
        let long = SweepLayout::new("/tmp/exp", "e").with_list_lengths(&[1, 12, 3]);
        assert!(long.is_separated());
        assert!(long.run_dir(ConfigIndex::new(0, 0, 2)).ends_with("e1_1_3"));
        assert!(long.run_dir(ConfigIndex::new(0, 10, 0)).ends_with("e1_11_1"));
    }

    #[test]
    fn test_remove_clears_both_formats() {
        let dir = tempfile::tempdir().unwrap();
        let out = RunOutput::at(dir.path());
        out.write(ArtifactKind::Forecast, &Array3::<f64>::zeros((3, 2, 2))).unwrap();
        std::fs::write(out.npy_path(ArtifactKind::Forecast), b"stale").unwrap();
        assert!(out.exists(ArtifactKind::Forecast));

        out.remove(ArtifactKind::Forecast).unwrap();
        assert!(!out.exists(ArtifactKind::Forecast));
        out.remove(ArtifactKind::Forecast).unwrap();
    }

    #[test]
    fn test_reads_fall_back_to_npy() {
        use crate::npy::tests::{f8_payload, npy_bytes};

        let dir = tempfile::tempdir().unwrap();
        let out = RunOutput::at(dir.path());
        let bytes = npy_bytes("<f8", false, &[3], &f8_payload(&[0.0, 0.1, 0.2]));
        std::fs::write(out.npy_path(ArtifactKind::Topography), bytes).unwrap();

        assert_eq!(out.read1(ArtifactKind::Topography).unwrap().to_vec(), vec![0.0, 0.1, 0.2]);

        // 两种都存在时以 .mhtr 为准
        out.write(ArtifactKind::Topography, &Array1::from(vec![9.0])).unwrap();
        assert_eq!(out.read1(ArtifactKind::Topography).unwrap().len(), 1);
    }

    #[test]
    fn test_write_rejects_wrong_rank() {
        let dir = tempfile::tempdir().unwrap();
        let out = RunOutput::at(dir.path());
        let err = out
            .write(ArtifactKind::Topography, &Array2::<f64>::zeros((2, 2)))
            .unwrap_err();
        assert!(err.to_string().contains("B"));
    }

    #[test]
    fn test_write_read_and_completeness() {
        let dir = tempfile::tempdir().unwrap();
        let out = SweepLayout::new(dir.path(), "exp").run_output(ConfigIndex::new(0, 0, 0));
        out.create().unwrap();
        assert!(!out.is_complete());

        let b = Array1::linspace(0.0, 1.0, 4);
        out.write(ArtifactKind::Topography, &b).unwrap();
        assert_eq!(out.read1(ArtifactKind::Topography).unwrap(), b);

        let x = Array3::<f64>::zeros((12, 2, 3));
        for kind in [ArtifactKind::Truth, ArtifactKind::Forecast, ArtifactKind::Analysis, ArtifactKind::Observations] {
            out.write(kind, &x).unwrap();
        }
        out.write_equation_info(3, 3).unwrap();
        assert!(out.is_complete());
        assert_eq!(out.read2(ArtifactKind::EquationInfo).unwrap().nrows(), 4);
    }
}
