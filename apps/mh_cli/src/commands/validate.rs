// apps/mh_cli/src/commands/validate.rs

//! 配置验证命令
//!
//! 解析实验配置并逐项检查；硬性错误之外，对容易出问题的设置给出警告。

use anyhow::{bail, Context, Result};
use clap::Args;
use mh_config::ExperimentConfig;
use mh_io::SweepLayout;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

/// 集合成员少于此数时警告
const SMALL_ENSEMBLE: usize = 10;

/// 验证参数
#[derive(Args)]
pub struct ValidateArgs {
    /// 配置文件路径
    #[arg(short, long)]
    pub config: PathBuf,

    /// 严格模式（警告也视为错误）
    #[arg(long)]
    pub strict: bool,
}

/// 验证结果
#[derive(Default)]
struct ValidationResult {
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn add_error(&mut self, msg: impl Into<String>) {
        self.errors.push(msg.into());
    }

    fn add_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }

    fn is_ok(&self, strict: bool) -> bool {
        self.errors.is_empty() && (!strict || self.warnings.is_empty())
    }
}

/// 执行验证命令
pub fn execute(args: ValidateArgs) -> Result<()> {
    info!("Validating {}", args.config.display());
    let result = validate_file(&args.config)?;
    print_validation_result(&result, args.strict)
}

fn validate_file(path: &Path) -> Result<ValidationResult> {
    let mut result = ValidationResult::default();
    println!("检查配置文件: {}", path.display());

    if !path.exists() {
        result.add_error(format!("配置文件不存在: {}", path.display()));
        return Ok(result);
    }

    let content = std::fs::read_to_string(path).context("无法读取配置文件")?;
    let config: ExperimentConfig = match serde_json::from_str(&content) {
        Ok(c) => c,
        Err(e) => {
            result.add_error(format!("JSON 解析错误: {}", e));
            return Ok(result);
        }
    };

    if let Err(e) = config.validate() {
        result.add_error(e.to_string());
        return Ok(result);
    }
    check_warnings(&config, &mut result);
    Ok(result)
}

fn check_warnings(config: &ExperimentConfig, result: &mut ValidationResult) {
    let asm = &config.assimilation;
    if asm.n_ens < SMALL_ENSEMBLE {
        result.add_warning(format!("集合成员数 {} 较少，协方差估计噪声大", asm.n_ens));
    }
    if asm.obs_density * 2 > config.grid.nk {
        result.add_warning(format!(
            "观测稀疏度 {} 下每个场只有 {} 个观测",
            asm.obs_density,
            config.grid.nk / asm.obs_density
        ));
    }

    let sweep = &config.sweep;
    let widest = sweep
        .localization
        .len()
        .max(sweep.additive_inflation.len())
        .max(sweep.multiplicative_inflation.len());
    if widest > 9 {
        result.add_warning("参数列表超过 9 项，组合目录名将使用 '_' 分隔");
    }

    let truth = SweepLayout::new(&config.output.directory, config.output.dirname.clone()).truth_path();
    if truth.exists() {
        result.add_warning(format!(
            "{} 已存在，身份不符时扫描会拒绝运行",
            truth.display()
        ));
    }
}

fn print_validation_result(result: &ValidationResult, strict: bool) -> Result<()> {
    println!("\n=== 验证结果 ===");

    if !result.errors.is_empty() {
        println!("\n错误 ({}):", result.errors.len());
        for err in &result.errors {
            error!("{}", err);
            println!("  ✗ {}", err);
        }
    }

    if !result.warnings.is_empty() {
        println!("\n警告 ({}):", result.warnings.len());
        for warning in &result.warnings {
            warn!("{}", warning);
            println!("  ⚠ {}", warning);
        }
    }

    if result.is_ok(strict) {
        println!("\n✓ 验证通过");
        Ok(())
    } else {
        println!("\n✗ 验证失败");
        bail!(
            "验证失败：发现 {} 个错误，{} 个警告",
            result.errors.len(),
            result.warnings.len()
        )
    }
}
