// apps/mh_cli/src/main.rs

//! MariHydro EnKF 实验命令行界面
//!
//! 规划调参扫描、检查单个组合的输出，并为外部绘图生成诊断报告。

mod commands;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// MariHydro EnKF 实验命令行工具
#[derive(Parser)]
#[command(name = "mh_enkf")]
#[command(author = "MariHydro Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "MariHydro EnKF tuning sweep and ensemble verification", long_about = None)]
struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 列出扫描计划
    Plan(commands::plan::PlanArgs),
    /// 显示单个组合的输出形状
    Info(commands::info::InfoArgs),
    /// 生成诊断报告
    Verify(commands::verify::VerifyArgs),
    /// 验证配置
    Validate(commands::validate::ValidateArgs),
}

fn parse_level(name: &str) -> Level {
    match name.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(parse_level(&cli.log_level))
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Plan(args) => commands::plan::execute(args),
        Commands::Info(args) => commands::info::execute(args),
        Commands::Verify(args) => commands::verify::execute(args),
        Commands::Validate(args) => commands::validate::execute(args),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_verify_all() {
        let cli = Cli::try_parse_from(["mh_enkf", "-l", "debug", "verify", "--run", "out/test_enkf111", "--all"])
            .unwrap();
        assert_eq!(parse_level(&cli.log_level), Level::DEBUG);
        assert!(matches!(cli.command, Commands::Verify(ref a) if a.all && a.time.is_none()));
    }

    #[test]
    fn test_unknown_level_defaults_to_info() {
        assert_eq!(parse_level("loud"), Level::INFO);
    }
}
