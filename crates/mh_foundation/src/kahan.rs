// crates/mh_foundation/src/kahan.rs

//! Kahan 求和
//!
//! 技巧评分的区域平均和 CRPS 累加走这里，避免长状态向量上的累加误差。
//! 集合均值由 ndarray 的 `mean_axis` 直接计算。

/// Kahan 补偿求和器
#[derive(Debug, Clone, Copy, Default)]
pub struct KahanSum {
    sum: f64,
    compensation: f64,
}

impl KahanSum {
    /// 创建新的求和器
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加一个值
    #[inline]
    pub fn add(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    /// 获取当前求和值
    #[inline]
    pub fn value(&self) -> f64 {
        self.sum
    }

    /// 从迭代器求和
    pub fn sum_iter<I: IntoIterator<Item = f64>>(iter: I) -> f64 {
        let mut kahan = Self::new();
        for v in iter {
            kahan.add(v);
        }
        kahan.value()
    }

    /// 算术平均，空序列返回 `None`
    pub fn mean_iter<I: IntoIterator<Item = f64>>(iter: I) -> Option<f64> {
        let mut kahan = Self::new();
        let mut n = 0usize;
        for v in iter {
            kahan.add(v);
            n += 1;
        }
        (n > 0).then(|| kahan.value() / n as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kahan_sum() {
        let data = vec![0.1f64; 1000];
        let sum = KahanSum::sum_iter(data.iter().cloned());
        assert!((sum - 100.0).abs() < 1e-10);
    }

    #[test]
    fn test_mean_iter() {
        assert_eq!(KahanSum::mean_iter(std::iter::empty()), None);
        let mean = KahanSum::mean_iter([1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((mean - 2.5).abs() < 1e-15);
    }
}
