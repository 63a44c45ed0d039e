//! # curve 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 参数传递给 `commands/curve.rs`

use super::fit::EosChoice;
use clap::Args;
use std::path::PathBuf;

/// curve 子命令参数
#[derive(Args, Debug)]
pub struct CurveArgs {
    /// Equation-of-state form
    #[arg(long, value_enum, default_value = "bm3")]
    pub eos: EosChoice,

    /// Zero-pressure volume V0 (Å³)
    #[arg(long)]
    pub v0: f64,

    /// Bulk modulus B0 (GPa)
    #[arg(long)]
    pub b0: f64,

    /// Pressure derivative B0'
    #[arg(long, default_value_t = 4.0)]
    pub b0_prime: f64,

    /// Second pressure derivative B0'' (GPa⁻¹, BM4 only; default: implied value)
    #[arg(long)]
    pub b0_double_prime: Option<f64>,

    /// Volume range in Å³ (e.g., "60-75")
    #[arg(long)]
    pub range: String,

    /// Number of points
    #[arg(long, default_value_t = 200)]
    pub points: usize,

    /// Output file (CSV or XY, by extension)
    #[arg(short, long, default_value = "eos_curve.csv")]
    pub output: PathBuf,
}
