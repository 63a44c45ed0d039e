//! # CLI 模块
//!
//! 使用 `clap` 定义命令行参数和子命令。
//!
//! ## 命令结构
//! - `fit`: 拟合单个 V-P 数据文件
//! - `batch`: 批量并行拟合目录中的数据文件
//! - `curve`: 按给定参数计算 P(V) 曲线
//!
//! 拟合相关的数值参数都可以用环境变量覆盖默认值
//! （`EOSFIT_REGULARIZATION`, `EOSFIT_MAX_ITER`, `EOSFIT_TOLERANCE`, `EOSFIT_JOBS`）。
//!
//! ## 依赖关系
//! - 被 `main.rs` 使用
//! - 子模块: fit, batch, curve

pub mod batch;
pub mod curve;
pub mod fit;

use clap::{Parser, Subcommand};

/// eosfit - 高压 XRD 状态方程拟合
#[derive(Parser)]
#[command(name = "eosfit")]
#[command(author = "Changjiang Wu")]
#[command(version)]
#[command(about = "Equation-of-state fitting for high-pressure P-V data", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// 可用的子命令
#[derive(Subcommand)]
pub enum Commands {
    /// Fit an equation of state to a single P-V data file
    Fit(fit::FitArgs),

    /// Fit every matching data file in a directory in parallel
    Batch(batch::BatchArgs),

    /// Evaluate an equation of state over a volume range
    Curve(curve::CurveArgs),
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_fit_command() {
        let cli = Cli::try_parse_from([
            "eosfit",
            "fit",
            "mgo.csv",
            "--eos",
            "vinet",
            "--lock",
            "b0p=4",
            "--regularization",
            "0.5",
        ])
        .unwrap();

        match cli.command {
            Commands::Fit(args) => {
                assert_eq!(args.model.eos, fit::EosChoice::Vinet);
                assert_eq!(args.model.lock.len(), 1);
                assert_eq!(args.model.lock[0].value, Some(4.0));
                assert_eq!(args.tuning.regularization, 0.5);
            }
            _ => panic!("expected fit command"),
        }
    }

    #[test]
    fn test_parse_curve_command() {
        let cli = Cli::try_parse_from([
            "eosfit", "curve", "--v0", "74.7", "--b0", "160", "--range", "60-75",
        ])
        .unwrap();
        match cli.command {
            Commands::Curve(args) => {
                assert_eq!(args.b0_prime, 4.0);
                assert_eq!(args.range, "60-75");
            }
            _ => panic!("expected curve command"),
        }
    }
}
