// apps/mh_cli/src/commands/info.rs

//! 信息显示命令
//!
//! 加载一个组合的全部输出数组，显示形状和由形状推得的实验维度。

use anyhow::{Context, Result};
use clap::Args;
use mh_io::{ArtifactKind, RunArtifacts, RunOutput};
use mh_verify::StateLayout;
use std::path::PathBuf;
use tracing::info;

/// 信息显示参数
#[derive(Args)]
pub struct InfoArgs {
    /// 组合输出目录
    #[arg(short, long)]
    pub run: PathBuf,
}

/// 执行信息命令
pub fn execute(args: InfoArgs) -> Result<()> {
    let output = RunOutput::at(&args.run);
    let run = RunArtifacts::load(&output)
        .with_context(|| format!("无法加载组合输出: {}", args.run.display()))?;
    let shape = run.shape();
    info!("Loaded run {}", args.run.display());

    println!("=== 组合输出 ===");
    if let Some(index) = output.index() {
        println!("组合: {}", index);
    }
    for kind in ArtifactKind::ALL {
        let dims: &[usize] = match kind {
            ArtifactKind::Topography => run.topography.shape(),
            ArtifactKind::Truth => run.truth.shape(),
            ArtifactKind::Forecast => run.forecast.shape(),
            ArtifactKind::Analysis => run.analysis.shape(),
            ArtifactKind::Observations => run.observations.shape(),
            ArtifactKind::EquationInfo => run.equation_info.shape(),
        };
        println!("  {:<12} {:?}", kind.stem(), dims);
    }

    let layout = StateLayout::new(shape.nk, shape.neq)?.with_observations(shape.obs_dim)?;
    println!();
    println!("Neq:        {}", shape.neq);
    println!("Nk:         {}", shape.nk);
    println!("集合成员:   {}", shape.n_ens);
    println!("观测维度:   {}", shape.obs_dim);
    println!("观测成员:   {}", shape.n_obs_ens);
    match layout.obs_density() {
        Some(density) => println!("观测稀疏度: {}", density),
        None => println!("观测稀疏度: -"),
    }
    println!("时间层:     {}", shape.time_levels);

    Ok(())
}
