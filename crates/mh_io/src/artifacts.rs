// crates/mh_io/src/artifacts.rs

//! 单个组合的输出数组集合
//!
//! 读取一个组合目录下的全部数组，并在交给统计层之前校验它们之间的形状一致性。
//! 任何不一致都以 [`MhError::ShapeMismatch`] 报告，指出数组名与轴。

use mh_foundation::MhError;
use ndarray::{Array1, Array2, Array3};

use crate::error::IoResult;
use crate::run_output::{ArtifactKind, RunOutput};

/// 由数组形状推断出的运行维度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunShape {
    /// 方程数
    pub neq: usize,
    /// 网格单元数
    pub nk: usize,
    /// 状态维度 `Neq * Nk`
    pub state_dim: usize,
    /// 集合成员数
    pub n_ens: usize,
    /// 观测维度
    pub obs_dim: usize,
    /// 观测集合成员数
    pub n_obs_ens: usize,
    /// 时间层数 `Nmeas + 1`
    pub time_levels: usize,
}

/// 一个组合的全部输出
#[derive(Debug, Clone)]
pub struct RunArtifacts {
    /// 来源目录句柄
    pub output: RunOutput,
    /// 地形 `[Nk]`
    pub topography: Array1<f64>,
    /// 真值 `[state_dim, 1, T]`
    pub truth: Array3<f64>,
    /// 预报集合 `[state_dim, n_ens, T]`
    pub forecast: Array3<f64>,
    /// 分析集合 `[state_dim, n_ens, T]`
    pub analysis: Array3<f64>,
    /// 观测集合 `[obs_dim, n_obs_ens, T]`
    pub observations: Array3<f64>,
    /// 方程数信息 `[Neq+1, ..]`
    pub equation_info: Array2<f64>,
    shape: RunShape,
}

impl RunArtifacts {
    /// 从组合目录加载并校验
    pub fn load(output: &RunOutput) -> IoResult<Self> {
        let topography = output.read1(ArtifactKind::Topography)?;
        let truth = output.read3(ArtifactKind::Truth)?;
        let forecast = output.read3(ArtifactKind::Forecast)?;
        let analysis = output.read3(ArtifactKind::Analysis)?;
        let observations = output.read3(ArtifactKind::Observations)?;
        let equation_info = output.read2(ArtifactKind::EquationInfo)?;

        Self::from_parts(
            output.clone(),
            topography,
            truth,
            forecast,
            analysis,
            observations,
            equation_info,
        )
    }

    /// 由内存中的数组组装并校验
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        output: RunOutput,
        topography: Array1<f64>,
        truth: Array3<f64>,
        forecast: Array3<f64>,
        analysis: Array3<f64>,
        observations: Array3<f64>,
        equation_info: Array2<f64>,
    ) -> IoResult<Self> {
        let shape = infer_shape(&topography, &truth, &forecast, &analysis, &observations, &equation_info)?;
        tracing::debug!(
            "Loaded run {}: Neq={} Nk={} n_ens={} obs_dim={} T={}",
            output.dir().display(),
            shape.neq,
            shape.nk,
            shape.n_ens,
            shape.obs_dim,
            shape.time_levels
        );
        Ok(Self {
            output,
            topography,
            truth,
            forecast,
            analysis,
            observations,
            equation_info,
            shape,
        })
    }

    /// 运行维度
    pub fn shape(&self) -> RunShape {
        self.shape
    }
}

fn infer_shape(
    topography: &Array1<f64>,
    truth: &Array3<f64>,
    forecast: &Array3<f64>,
    analysis: &Array3<f64>,
    observations: &Array3<f64>,
    equation_info: &Array2<f64>,
) -> Result<RunShape, MhError> {
    let oi_rows = equation_info.nrows();
    if oi_rows < 2 {
        return Err(MhError::shape_mismatch("OI", "rows", 2, oi_rows));
    }
    let neq = oi_rows - 1;

    let [state_dim, truth_members, time_levels] = dims(truth);
    MhError::check_axis("X_tr_array", "member", 1, truth_members)?;
    if state_dim == 0 || state_dim % neq != 0 {
        return Err(MhError::shape_mismatch(
            "X_tr_array",
            "state",
            neq * (state_dim / neq).max(1),
            state_dim,
        ));
    }
    let nk = state_dim / neq;
    MhError::check_axis("B", "cell", nk, topography.len())?;

    let [f_state, n_ens, f_time] = dims(forecast);
    MhError::check_axis("X_array", "state", state_dim, f_state)?;
    MhError::check_axis("X_array", "time", time_levels, f_time)?;

    let [a_state, a_members, a_time] = dims(analysis);
    MhError::check_axis("Xan_array", "state", state_dim, a_state)?;
    MhError::check_axis("Xan_array", "member", n_ens, a_members)?;
    MhError::check_axis("Xan_array", "time", time_levels, a_time)?;

    let [obs_dim, n_obs_ens, o_time] = dims(observations);
    MhError::check_axis("Y_obs_array", "time", time_levels, o_time)?;
    if obs_dim == 0 || obs_dim % 3 != 0 {
        return Err(MhError::shape_mismatch(
            "Y_obs_array",
            "observation",
            3 * (obs_dim / 3).max(1),
            obs_dim,
        ));
    }

    Ok(RunShape {
        neq,
        nk,
        state_dim,
        n_ens,
        obs_dim,
        n_obs_ens,
        time_levels,
    })
}

fn dims(array: &Array3<f64>) -> [usize; 3] {
    let (a, b, c) = array.dim();
    [a, b, c]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::run_output::{ConfigIndex, SweepLayout};

    fn parts(nk: usize, neq: usize, n_ens: usize, t: usize) -> (Array1<f64>, Array3<f64>, Array3<f64>, Array3<f64>, Array3<f64>, Array2<f64>) {
        (
            Array1::zeros(nk),
            Array3::zeros((neq * nk, 1, t)),
            Array3::zeros((neq * nk, n_ens, t)),
            Array3::zeros((neq * nk, n_ens, t)),
            Array3::zeros((6, n_ens, t)),
            Array2::zeros((neq + 1, t)),
        )
    }

    #[test]
    fn test_infers_dimensions() {
        let (b, tr, f, a, y, oi) = parts(10, 4, 5, 3);
        let run = RunArtifacts::from_parts(RunOutput::at("."), b, tr, f, a, y, oi).unwrap();
        let shape = run.shape();
        assert_eq!(shape.neq, 4);
        assert_eq!(shape.nk, 10);
        assert_eq!(shape.state_dim, 40);
        assert_eq!(shape.n_ens, 5);
        assert_eq!(shape.obs_dim, 6);
        assert_eq!(shape.time_levels, 3);
    }

    #[test]
    fn test_time_axis_mismatch_names_array() {
        let (b, tr, f, _, y, oi) = parts(10, 3, 5, 3);
        let a = Array3::zeros((30, 5, 2));
        let err = RunArtifacts::from_parts(RunOutput::at("."), b, tr, f, a, y, oi).unwrap_err();
        match MhError::from(err) {
            MhError::ShapeMismatch { array, axis, expected, actual } => {
                assert_eq!(array, "Xan_array");
                assert_eq!(axis, "time");
                assert_eq!((expected, actual), (3, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_topography_length_checked() {
        let (_, tr, f, a, y, oi) = parts(10, 3, 5, 3);
        let b = Array1::zeros(9);
        assert!(RunArtifacts::from_parts(RunOutput::at("."), b, tr, f, a, y, oi).is_err());
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let out = SweepLayout::new(dir.path(), "exp").run_output(ConfigIndex::new(0, 1, 0));
        out.create().unwrap();

        let (b, tr, f, a, y, _) = parts(8, 3, 4, 2);
        out.write(ArtifactKind::Topography, &b).unwrap();
        out.write(ArtifactKind::Truth, &tr).unwrap();
        out.write(ArtifactKind::Forecast, &f).unwrap();
        out.write(ArtifactKind::Analysis, &a).unwrap();
        out.write(ArtifactKind::Observations, &y).unwrap();
        out.write_equation_info(3, 2).unwrap();

        let run = RunArtifacts::load(&out).unwrap();
        assert_eq!(run.shape().nk, 8);
        assert_eq!(run.output.index(), Some(ConfigIndex::new(0, 1, 0)));
    }

    #[test]
    fn test_load_npy_directory() {
        use crate::npy::tests::{f8_payload, npy_bytes};

        let dir = tempfile::tempdir().unwrap();
        let out = RunOutput::at(dir.path());
        let write = |kind: ArtifactKind, shape: &[usize]| {
            let n: usize = shape.iter().product();
            let values: Vec<f64> = (0..n).map(|v| v as f64 * 0.5).collect();
            std::fs::write(out.npy_path(kind), npy_bytes("<f8", false, shape, &f8_payload(&values))).unwrap();
        };
        write(ArtifactKind::Topography, &[4]);
        write(ArtifactKind::Truth, &[12, 1, 2]);
        write(ArtifactKind::Forecast, &[12, 2, 2]);
        write(ArtifactKind::Analysis, &[12, 2, 2]);
        write(ArtifactKind::Observations, &[6, 2, 2]);
        write(ArtifactKind::EquationInfo, &[4, 2]);
        assert!(out.is_complete());

        let run = RunArtifacts::load(&out).unwrap();
        assert_eq!(run.shape().neq, 3);
        assert_eq!(run.shape().n_ens, 2);
        assert_eq!(run.forecast[[0, 1, 0]], 1.0);
    }
}
