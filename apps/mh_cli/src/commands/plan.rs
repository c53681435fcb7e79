// apps/mh_cli/src/commands/plan.rs

//! 扫描计划命令
//!
//! 不运行任何组合，只列出每个 `(i,j,k)` 的参数与输出目录，以及真值缓存状态。

use anyhow::{Context, Result};
use clap::Args;
use mh_config::ExperimentConfig;
use mh_io::ArrayFile;
use mh_workflow::{ExperimentSweep, Storage};
use std::path::PathBuf;
use tracing::info;

/// 扫描计划参数
#[derive(Args)]
pub struct PlanArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,
}

/// 执行计划命令
pub fn execute(args: PlanArgs) -> Result<()> {
    let config = ExperimentConfig::from_file(&args.config)
        .with_context(|| format!("无法加载配置文件: {}", args.config.display()))?;
    let sweep = ExperimentSweep::from_config(&config)?;
    let plan = sweep.plan();

    info!("Sweep of {} configurations under {}", plan.len(), sweep.layout().root().display());

    println!("=== 扫描计划 ===");
    println!("网格: Nk={} L={}", config.grid.nk, config.grid.length);
    println!("状态维度: {} (Neq={})", config.state_dim(), config.model.neq);
    println!("观测维度: {} (每 {} 个单元)", config.obs_dim(), config.assimilation.obs_density);
    println!("时间层: {}", config.time_levels());
    println!("集合成员: {}", config.assimilation.n_ens);
    println!();

    print_truth_status(&sweep, config.identity_hash());
    println!();

    println!("{:<10} {:>12} {:>10} {:>10}  {:<10} 目录", "组合", "局地化", "加性膨胀", "乘性膨胀", "状态");
    for (index, params, dir) in &plan {
        let status = match sweep.storage().load_job(*index) {
            Ok(Some(job)) => job.status.to_string(),
            Ok(None) => "-".to_string(),
            Err(_) => "?".to_string(),
        };
        println!(
            "{:<10} {:>12e} {:>10} {:>10}  {:<10} {}",
            index.to_string(),
            params.localization,
            params.additive_inflation,
            params.multiplicative_inflation,
            status,
            dir.display()
        );
    }

    Ok(())
}

fn print_truth_status<S: Storage>(sweep: &ExperimentSweep<S>, identity: u64) {
    let path = sweep.layout().truth_path();
    match ArrayFile::read_header(&path) {
        Ok(header) => {
            let matches = header.identity.map_or(true, |found| found == identity);
            println!(
                "真值缓存: {} {:?} ({})",
                path.display(),
                header.shape,
                if matches { "可复用" } else { "身份不符" }
            );
        }
        Err(e) if e.is_not_found() => println!("真值缓存: 不存在，将在扫描开始时生成"),
        Err(e) => println!("真值缓存: 不可用 ({})，将重新生成", e),
    }
}
