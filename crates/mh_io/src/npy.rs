// crates/mh_io/src/npy.rs

//! NumPy `.npy` 数组读取
//!
//! 外部 EnKF 运行器以 `np.save` 写出数组。这里解析 v1/v2/v3 文件头，
//! 支持小端 `<f8` 与 `<f4`（读入后转为 f64），C 序与 Fortran 序。
//!
//! ```text
//! [\x93NUMPY][major u8][minor u8][header_len u16 (v1) | u32 (v2+)]
//! [header: Python dict 文本, 空格填充, '\n' 结尾]
//! [data]
//! ```

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use ndarray::{ArrayD, IxDyn, ShapeBuilder};

use crate::array_file::ArrayFile;
use crate::error::{IoError, IoResult};

/// `.npy` 扩展名
pub const NPY_EXTENSION: &str = "npy";

const NPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// 元素类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F8,
    F4,
}

impl Dtype {
    fn size(self) -> usize {
        match self {
            Self::F8 => 8,
            Self::F4 => 4,
        }
    }
}

/// 解析后的文件头
#[derive(Debug, Clone, PartialEq, Eq)]
struct NpyHeader {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

/// 读取 `.npy` 文件为 [`ArrayFile`]（无身份，数据转为行主序）
pub fn read_npy(path: &Path) -> IoResult<ArrayFile> {
    let file = File::open(path).map_err(|e| IoError::file(path, e))?;
    let mut bytes = Vec::new();
    BufReader::new(file)
        .read_to_end(&mut bytes)
        .map_err(|e| IoError::file(path, e))?;
    parse_npy(&bytes).map_err(|reason| IoError::format(path, reason))
}

fn parse_npy(bytes: &[u8]) -> Result<ArrayFile, String> {
    if bytes.len() < 10 || &bytes[..6] != NPY_MAGIC {
        return Err("不是 .npy 文件 (魔数错误)".to_string());
    }

    let major = bytes[6];
    let (header_len, offset): (usize, usize) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err("文件头被截断".to_string());
            }
            (u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize, 12)
        }
        v => return Err(format!("不支持的 .npy 版本 {v}")),
    };

    let header_end = offset
        .checked_add(header_len)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| "文件头被截断".to_string())?;
    let text = std::str::from_utf8(&bytes[offset..header_end]).map_err(|e| format!("文件头不是 UTF-8: {e}"))?;
    let header = parse_header(text)?;

    let count = header
        .shape
        .iter()
        .try_fold(1usize, |acc, &d| acc.checked_mul(d))
        .ok_or_else(|| "形状乘积溢出".to_string())?;
    let payload = &bytes[header_end..];
    if Some(payload.len()) != count.checked_mul(header.dtype.size()) {
        return Err(format!(
            "数据长度 {} 字节与形状 {:?} 不符",
            payload.len(),
            header.shape
        ));
    }

    let values: Vec<f64> = match header.dtype {
        Dtype::F8 => payload
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]]))
            .collect(),
        Dtype::F4 => payload
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]) as f64)
            .collect(),
    };

    let data = if header.fortran_order && header.shape.len() > 1 {
        let array = ArrayD::from_shape_vec(IxDyn(&header.shape).f(), values).map_err(|e| e.to_string())?;
        array.iter().copied().collect()
    } else {
        values
    };

    ArrayFile::new(header.shape, data).map_err(|e| e.to_string())
}

fn parse_header(text: &str) -> Result<NpyHeader, String> {
    let descr = dict_value(text, "descr")?;
    let dtype = match descr.trim_matches(|c| c == '\'' || c == '"') {
        "<f8" | "float64" => Dtype::F8,
        "<f4" | "float32" => Dtype::F4,
        other => return Err(format!("不支持的 dtype {other} (仅支持 <f8/<f4)")),
    };

    let fortran_order = match dict_value(text, "fortran_order")?.trim() {
        "True" => true,
        "False" => false,
        other => return Err(format!("无效的 fortran_order: {other}")),
    };

    let shape_text = dict_value(text, "shape")?;
    let inner = shape_text
        .strip_prefix('(')
        .and_then(|s| s.split(')').next())
        .ok_or_else(|| format!("无效的 shape: {shape_text}"))?;
    let shape = inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<usize>().map_err(|e| format!("无效的维度 {s}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(NpyHeader {
        dtype,
        fortran_order,
        shape,
    })
}

/// 取出字典中某键之后的值文本（到下一个顶层逗号或右括号为止）
fn dict_value<'a>(text: &'a str, key: &str) -> Result<&'a str, String> {
    let start = text
        .find(&format!("'{key}'"))
        .or_else(|| text.find(&format!("\"{key}\"")))
        .ok_or_else(|| format!("文件头缺少 '{key}'"))?;
    let rest = &text[start + key.len() + 2..];
    let rest = rest
        .trim_start()
        .strip_prefix(':')
        .ok_or_else(|| format!("'{key}' 之后缺少 ':'"))?
        .trim_start();

    let mut depth = 0usize;
    for (i, c) in rest.char_indices() {
        match c {
            '(' => depth += 1,
            ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&rest[..=i]);
                }
            }
            ',' | '}' if depth == 0 => return Ok(rest[..i].trim_end()),
            _ => {}
        }
    }
    Err(format!("'{key}' 的值未结束"))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 按 `np.save` 的布局手写 v1.0 文件
    pub(crate) fn npy_bytes(descr: &str, fortran: bool, shape: &[usize], payload: &[u8]) -> Vec<u8> {
        let dims: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
        let shape_text = match dims.len() {
            1 => format!("({},)", dims[0]),
            _ => format!("({})", dims.join(", ")),
        };
        let order = if fortran { "True" } else { "False" };
        let mut dict = format!("{{'descr': '{descr}', 'fortran_order': {order}, 'shape': {shape_text}, }}");
        let unpadded = 10 + dict.len() + 1;
        dict.push_str(&" ".repeat((64 - unpadded % 64) % 64));
        dict.push('\n');

        let mut bytes = NPY_MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0]);
        bytes.extend_from_slice(&(dict.len() as u16).to_le_bytes());
        bytes.extend_from_slice(dict.as_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    pub(crate) fn f8_payload(values: &[f64]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    #[test]
    fn test_parse_c_order_f8() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let bytes = npy_bytes("<f8", false, &[2, 3], &f8_payload(&values));
        assert_eq!(bytes[..10 + u16::from_le_bytes([bytes[8], bytes[9]]) as usize].len() % 64, 0);

        let file = parse_npy(&bytes).unwrap();
        let a = file.into_array2("X").unwrap();
        assert_eq!(a.dim(), (2, 3));
        assert_eq!(a[[1, 0]], 4.0);
    }

    #[test]
    fn test_parse_fortran_order() {
        // 列主序存放的 [[1,2,3],[4,5,6]]
        let bytes = npy_bytes("<f8", true, &[2, 3], &f8_payload(&[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]));
        let a = parse_npy(&bytes).unwrap().into_array2("X").unwrap();
        assert_eq!(a.row(0).to_vec(), vec![1.0, 2.0, 3.0]);
        assert_eq!(a.row(1).to_vec(), vec![4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_parse_f4_and_one_dim() {
        let payload: Vec<u8> = [0.5f32, 0.25].iter().flat_map(|v| v.to_le_bytes()).collect();
        let bytes = npy_bytes("<f4", false, &[2], &payload);
        let b = parse_npy(&bytes).unwrap().into_array1("B").unwrap();
        assert_eq!(b.to_vec(), vec![0.5, 0.25]);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse_npy(b"NOT_NUMPY_DATA").unwrap_err().contains("魔数"));

        let ints = npy_bytes("<i8", false, &[1], &[0u8; 8]);
        assert!(parse_npy(&ints).unwrap_err().contains("dtype"));

        let short = npy_bytes("<f8", false, &[3], &f8_payload(&[1.0, 2.0]));
        assert!(parse_npy(&short).unwrap_err().contains("数据长度"));
    }

    #[test]
    fn test_header_values() {
        let h = parse_header("{'descr': '<f8', 'fortran_order': False, 'shape': (600, 20, 49), }").unwrap();
        assert_eq!(h.shape, vec![600, 20, 49]);
        assert_eq!(h.dtype, Dtype::F8);
        assert!(!h.fortran_order);

        let scalar = parse_header("{'descr': '<f8', 'fortran_order': False, 'shape': (), }").unwrap();
        assert!(scalar.shape.is_empty());
    }
}
