// apps/mh_cli/src/commands/verify.rs

//! 诊断报告命令
//!
//! 为一个组合的某个时间层（或全部时间层）计算离散度-误差与 CRPS，
//! 以 JSON 写出供外部绘图使用。

use anyhow::{bail, Context, Result};
use clap::Args;
use mh_io::RunOutput;
use mh_verify::{DiagnosticReport, Phase, Verifier, DEFAULT_DOMAIN_LENGTH};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 诊断报告参数
#[derive(Args)]
pub struct VerifyArgs {
    /// 组合输出目录
    #[arg(short, long)]
    pub run: PathBuf,

    /// 时间层索引
    #[arg(short, long, conflicts_with = "all")]
    pub time: Option<usize>,

    /// 报告全部时间层
    #[arg(long)]
    pub all: bool,

    /// 计算域长度
    #[arg(long, default_value_t = DEFAULT_DOMAIN_LENGTH)]
    pub length: f64,

    /// 输出 JSON 文件（缺省打印摘要）
    #[arg(short, long)]
    pub out: Option<PathBuf>,
}

/// 执行诊断命令
pub fn execute(args: VerifyArgs) -> Result<()> {
    let output = RunOutput::at(&args.run);
    let verifier = Verifier::open(&output, args.length)
        .with_context(|| format!("无法加载组合输出: {}", args.run.display()))?;

    let reports = match (args.time, args.all) {
        (Some(t), _) => {
            verifier.check_time(t)?;
            vec![verifier.report_at(t)?]
        }
        (None, true) => collect_reports(&verifier)?,
        (None, false) => bail!("需要指定 --time <T> 或 --all"),
    };

    for report in &reports {
        print_summary(report);
    }

    if let Some(path) = &args.out {
        write_json(path, &reports, args.time.is_some())?;
        info!("Wrote {} report(s) to {}", reports.len(), path.display());
    }

    Ok(())
}

fn collect_reports(verifier: &Verifier) -> Result<Vec<DiagnosticReport>> {
    let mut reports = Vec::with_capacity(verifier.time_levels());
    let mut failed = 0;
    for result in verifier.reports() {
        match result {
            Ok(report) => reports.push(report),
            Err(e) => {
                warn!("{}", e);
                failed += 1;
            }
        }
    }
    if reports.is_empty() && failed > 0 {
        bail!("所有 {} 个时间层均无法计算", failed);
    }
    Ok(reports)
}

fn write_json(path: &Path, reports: &[DiagnosticReport], single: bool) -> Result<()> {
    let json = match reports {
        [report] if single => report.to_json()?,
        _ => serde_json::to_string_pretty(reports)?,
    };
    std::fs::write(path, json).with_context(|| format!("无法写入: {}", path.display()))?;
    Ok(())
}

fn print_summary(report: &DiagnosticReport) {
    println!("=== 时间层 {} / {} ===", report.time, report.time_levels);
    println!(
        "{:<6} {:>14} {:>14} {:>14} {:>14}",
        "场", "预报离散度", "预报CRPS", "分析离散度", "分析CRPS"
    );
    let forecast = report.phase(Phase::Forecast);
    let analysis = report.phase(Phase::Analysis);
    for (fc, an) in forecast.fields.iter().zip(&analysis.fields) {
        println!(
            "{:<6} {:>14.6e} {:>14.6e} {:>14.6e} {:>14.6e}",
            fc.field.to_string(),
            fc.mean_spread,
            fc.mean_crps,
            an.mean_spread,
            an.mean_crps
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mh_io::{ArtifactKind, ConfigIndex, SweepLayout};
    use ndarray::{Array1, Array3};

    fn write_run(output: &RunOutput) {
        let (nk, t) = (5, 2);
        output.create().unwrap();
        output.write(ArtifactKind::Topography, &Array1::zeros(nk)).unwrap();
        output
            .write(ArtifactKind::Truth, &Array3::from_elem((3 * nk, 1, t), 1.0))
            .unwrap();
        let ens = Array3::from_shape_fn((3 * nk, 4, t), |(_, m, _)| 1.0 + 0.01 * m as f64);
        output.write(ArtifactKind::Forecast, &ens).unwrap();
        output.write(ArtifactKind::Analysis, &ens).unwrap();
        output
            .write(ArtifactKind::Observations, &Array3::zeros((3, 4, t)))
            .unwrap();
        output.write_equation_info(3, t).unwrap();
    }

    #[test]
    fn test_verify_writes_all_levels() {
        let dir = tempfile::tempdir().unwrap();
        let output = SweepLayout::new(dir.path(), "test_enkf").run_output(ConfigIndex::new(0, 0, 0));
        write_run(&output);
        let out = dir.path().join("reports.json");

        execute(VerifyArgs {
            run: output.dir().to_path_buf(),
            time: None,
            all: true,
            length: DEFAULT_DOMAIN_LENGTH,
            out: Some(out.clone()),
        })
        .unwrap();

        let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(json.as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_time_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let output = RunOutput::at(dir.path().join("run"));
        write_run(&output);

        let err = execute(VerifyArgs {
            run: output.dir().to_path_buf(),
            time: Some(7),
            all: false,
            length: DEFAULT_DOMAIN_LENGTH,
            out: None,
        })
        .unwrap_err();
        assert!(err.to_string().contains('7'));
    }

    #[test]
    fn test_requires_time_or_all() {
        let dir = tempfile::tempdir().unwrap();
        let output = RunOutput::at(dir.path().join("run"));
        write_run(&output);

        let args = VerifyArgs {
            run: output.dir().to_path_buf(),
            time: None,
            all: false,
            length: DEFAULT_DOMAIN_LENGTH,
            out: None,
        };
        assert!(execute(args).is_err());
    }
}
