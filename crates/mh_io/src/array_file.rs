// crates/mh_io/src/array_file.rs

//! 轨迹数组文件 (`.mhtr`)
//!
//! 地形、真值、预报/分析集合、观测集合等 n 维 f64 数组的无损二进制存储。
//!
//! # 文件格式 (v1)
//!
//! ```text
//! [魔数: 4 bytes] "MHTR"
//! [版本: u32]
//! [身份哈希: u64]            (0 = 无身份)
//! [秩: u32]
//! [形状: rank * u64]
//! [数据: prod(shape) * f64]  (行主序, 小端)
//! [CRC32: u32]               (覆盖以上全部字节)
//! ```
//!
//! # 使用示例
//!
//! ```rust,ignore
//! use mh_io::array_file::ArrayFile;
//!
//! ArrayFile::from_array(&truth).with_identity(hash).save(&path)?;
//! let truth = ArrayFile::load(&path)?.into_array3("X_tr_array")?;
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use mh_foundation::MhError;
use ndarray::{Array, Array1, Array2, Array3, Dimension};

use crate::error::{IoError, IoResult};

// ============================================================
// 常量
// ============================================================

/// 数组文件格式版本
const ARRAY_FILE_VERSION: u32 = 1;

/// 数组文件魔数
const ARRAY_FILE_MAGIC: &[u8; 4] = b"MHTR";

/// 数组文件扩展名
pub const ARRAY_FILE_EXTENSION: &str = "mhtr";

/// 支持的最大秩
const MAX_RANK: usize = 8;

// ============================================================
// 数组文件
// ============================================================

/// 数组文件头
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayHeader {
    /// 版本号
    pub version: u32,
    /// 身份哈希
    pub identity: Option<u64>,
    /// 形状
    pub shape: Vec<usize>,
}

/// 内存中的数组文件
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayFile {
    /// 版本号
    pub version: u32,
    /// 身份哈希（真值缓存用于检测配置不匹配）
    pub identity: Option<u64>,
    /// 形状
    pub shape: Vec<usize>,
    /// 行主序数据
    pub data: Vec<f64>,
}

impl ArrayFile {
    /// 从形状和数据创建
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> IoResult<Self> {
        let expected: usize = shape.iter().product();
        MhError::check_size("array data", expected, data.len())?;
        Ok(Self {
            version: ARRAY_FILE_VERSION,
            identity: None,
            shape,
            data,
        })
    }

    /// 从 ndarray 数组创建（按逻辑行主序拷贝）
    pub fn from_array<D: Dimension>(array: &Array<f64, D>) -> Self {
        Self {
            version: ARRAY_FILE_VERSION,
            identity: None,
            shape: array.shape().to_vec(),
            data: array.iter().copied().collect(),
        }
    }

    /// 设置身份哈希
    pub fn with_identity(mut self, identity: u64) -> Self {
        self.identity = (identity != 0).then_some(identity);
        self
    }

    /// 保存到文件（临时文件写入后原子重命名）
    pub fn save(&self, path: &Path) -> IoResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IoError::file(parent, e))?;
        }

        let temp_path = path.with_extension("mhtr.tmp");
        {
            let file = File::create(&temp_path).map_err(|e| IoError::file(&temp_path, e))?;
            let mut writer = BufWriter::new(file);

            let mut bytes = Vec::with_capacity(24 + 8 * (self.shape.len() + self.data.len()));
            bytes.extend_from_slice(ARRAY_FILE_MAGIC);
            bytes.extend_from_slice(&self.version.to_le_bytes());
            bytes.extend_from_slice(&self.identity.unwrap_or(0).to_le_bytes());
            bytes.extend_from_slice(&(self.shape.len() as u32).to_le_bytes());
            for &n in &self.shape {
                bytes.extend_from_slice(&(n as u64).to_le_bytes());
            }
            for &v in &self.data {
                bytes.extend_from_slice(&v.to_le_bytes());
            }

            let crc = compute_crc32(&bytes);
            writer
                .write_all(&bytes)
                .and_then(|_| writer.write_all(&crc.to_le_bytes()))
                .and_then(|_| writer.flush())
                .map_err(|e| IoError::file(&temp_path, e))?;
        }

        std::fs::rename(&temp_path, path).map_err(|e| IoError::file(path, e))?;
        tracing::trace!("Saved array {:?} to {}", self.shape, path.display());
        Ok(())
    }

    /// 从文件加载并校验
    pub fn load(path: &Path) -> IoResult<Self> {
        let file = File::open(path).map_err(|e| IoError::file(path, e))?;
        let mut all = Vec::new();
        BufReader::new(file)
            .read_to_end(&mut all)
            .map_err(|e| IoError::file(path, e))?;

        // 魔数 + 版本 + 身份 + 秩 + CRC
        if all.len() < 24 {
            return Err(IoError::format(path, "文件太小"));
        }

        let crc_offset = all.len() - 4;
        let (body, crc_bytes) = all.split_at(crc_offset);
        let stored = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);
        let computed = compute_crc32(body);
        if stored != computed {
            return Err(IoError::Checksum {
                path: path.to_path_buf(),
                expected: stored,
                found: computed,
            });
        }

        let mut cursor = Cursor::new(body, path);
        let header = cursor.header()?;

        let n: usize = header
            .shape
            .iter()
            .try_fold(1usize, |acc, &d| acc.checked_mul(d))
            .ok_or_else(|| IoError::format(path, "形状乘积溢出"))?;
        if n.checked_mul(8) != Some(cursor.remaining()) {
            return Err(IoError::format(
                path,
                format!("数据长度 {} 字节与形状 {:?} 不符", cursor.remaining(), header.shape),
            ));
        }

        let mut data = Vec::with_capacity(n);
        for _ in 0..n {
            data.push(cursor.f64()?);
        }

        Ok(Self {
            version: header.version,
            identity: header.identity,
            shape: header.shape,
            data,
        })
    }

    /// 仅读取头部信息（不加载数据，不做 CRC 校验）
    pub fn read_header(path: &Path) -> IoResult<ArrayHeader> {
        let file = File::open(path).map_err(|e| IoError::file(path, e))?;
        let mut reader = BufReader::new(file);

        // 头部最长 20 + 8*MAX_RANK 字节
        let mut buf = Vec::with_capacity(20 + 8 * MAX_RANK);
        reader
            .by_ref()
            .take((20 + 8 * MAX_RANK) as u64)
            .read_to_end(&mut buf)
            .map_err(|e| IoError::file(path, e))?;

        Cursor::new(&buf, path).header()
    }

    /// 秩
    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// 转为一维数组
    pub fn into_array1(self, name: &str) -> IoResult<Array1<f64>> {
        self.check_rank(name, 1)?;
        Ok(Array1::from_vec(self.data))
    }

    /// 转为二维数组
    pub fn into_array2(self, name: &str) -> IoResult<Array2<f64>> {
        self.check_rank(name, 2)?;
        let shape = (self.shape[0], self.shape[1]);
        Array2::from_shape_vec(shape, self.data).map_err(|e| MhError::invalid_input(format!("{name}: {e}")).into())
    }

    /// 转为三维数组
    pub fn into_array3(self, name: &str) -> IoResult<Array3<f64>> {
        self.check_rank(name, 3)?;
        let shape = (self.shape[0], self.shape[1], self.shape[2]);
        Array3::from_shape_vec(shape, self.data).map_err(|e| MhError::invalid_input(format!("{name}: {e}")).into())
    }

    fn check_rank(&self, name: &str, rank: usize) -> IoResult<()> {
        MhError::check_axis(name, "rank", rank, self.rank())?;
        Ok(())
    }
}

// ============================================================
// 解析辅助
// ============================================================

/// 带边界检查的小端读取器
struct Cursor<'a> {
    data: &'a [u8],
    offset: usize,
    path: &'a Path,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], path: &'a Path) -> Self {
        Self { data, offset: 0, path }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    fn take<const N: usize>(&mut self) -> IoResult<[u8; N]> {
        let end = self.offset + N;
        let bytes: [u8; N] = self
            .data
            .get(self.offset..end)
            .and_then(|s| s.try_into().ok())
            .ok_or_else(|| IoError::format(self.path, format!("文件在偏移 {} 处截断", self.offset)))?;
        self.offset = end;
        Ok(bytes)
    }

    fn u32(&mut self) -> IoResult<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    fn u64(&mut self) -> IoResult<u64> {
        self.take::<8>().map(u64::from_le_bytes)
    }

    fn f64(&mut self) -> IoResult<f64> {
        self.take::<8>().map(f64::from_le_bytes)
    }

    fn header(&mut self) -> IoResult<ArrayHeader> {
        if &self.take::<4>()? != ARRAY_FILE_MAGIC {
            return Err(IoError::format(self.path, "无效的数组文件魔数"));
        }

        let version = self.u32()?;
        if version > ARRAY_FILE_VERSION {
            return Err(IoError::Version {
                path: self.path.to_path_buf(),
                file: version,
                current: ARRAY_FILE_VERSION,
            });
        }

        let identity = self.u64()?;
        let rank = self.u32()? as usize;
        if rank > MAX_RANK {
            return Err(IoError::format(self.path, format!("秩 {rank} 超过上限 {MAX_RANK}")));
        }

        let mut shape = Vec::with_capacity(rank);
        for _ in 0..rank {
            shape.push(self.u64()? as usize);
        }

        Ok(ArrayHeader {
            version,
            identity: (identity != 0).then_some(identity),
            shape,
        })
    }
}

/// 计算 CRC32 校验和（IEEE 多项式）
fn compute_crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &byte in data {
        let index = ((crc ^ byte as u32) & 0xFF) as usize;
        crc = CRC32_TABLE[index] ^ (crc >> 8);
    }
    !crc
}

/// 生成 CRC32 查找表（编译期计算）
const fn generate_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = 0xEDB8_8320 ^ (crc >> 1);
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// CRC32 查找表
const CRC32_TABLE: [u32; 256] = generate_crc32_table();

// ============================================================
// 测试
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array3;

    fn sample() -> Array3<f64> {
        Array3::from_shape_fn((6, 2, 3), |(i, m, t)| i as f64 * 0.1 - m as f64 + t as f64 * 1e-3)
    }

    #[test]
    fn test_save_load_lossless() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("X_array.mhtr");

        let mut array = sample();
        array[[0, 0, 0]] = std::f64::consts::PI;
        array[[5, 1, 2]] = -1.0e-300;
        ArrayFile::from_array(&array).with_identity(42).save(&path).unwrap();

        let loaded = ArrayFile::load(&path).unwrap();
        assert_eq!(loaded.identity, Some(42));
        assert_eq!(loaded.shape, vec![6, 2, 3]);
        let back = loaded.into_array3("X_array").unwrap();
        assert_eq!(back, array);
    }

    #[test]
    fn test_transposed_view_is_written_in_logical_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.mhtr");

        let a = Array2::from_shape_vec((2, 3), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let t = a.t().to_owned();
        ArrayFile::from_array(&t).save(&path).unwrap();
        let back = ArrayFile::load(&path).unwrap().into_array2("t").unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn test_read_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("h.mhtr");
        ArrayFile::from_array(&sample()).save(&path).unwrap();

        let header = ArrayFile::read_header(&path).unwrap();
        assert_eq!(header.shape, vec![6, 2, 3]);
        assert_eq!(header.identity, None);
        assert_eq!(header.version, ARRAY_FILE_VERSION);
    }

    #[test]
    fn test_corruption_detected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("c.mhtr");
        ArrayFile::from_array(&sample()).save(&path).unwrap();

        let mut bytes = std::fs::read(&path).unwrap();
        let mid = bytes.len() / 2;
        bytes[mid] ^= 0xFF;
        std::fs::write(&path, &bytes).unwrap();

        assert!(matches!(ArrayFile::load(&path), Err(IoError::Checksum { .. })));
    }

    #[test]
    fn test_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.mhtr");
        std::fs::write(&path, b"MHTR").unwrap();
        assert!(matches!(ArrayFile::load(&path), Err(IoError::Format { .. })));
    }

    #[test]
    fn test_rank_mismatch_names_array() {
        let file = ArrayFile::new(vec![4], vec![0.0; 4]).unwrap();
        let err = file.into_array3("X_tr_array").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("X_tr_array"));
        assert!(msg.contains("rank"));
    }

    #[test]
    fn test_new_checks_length() {
        assert!(ArrayFile::new(vec![2, 3], vec![0.0; 5]).is_err());
    }

    #[test]
    fn test_crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
    }
}
