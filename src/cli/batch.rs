//! # batch 子命令 CLI 定义
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs` 使用
//! - 复用 `cli/fit.rs` 的 ModelArgs, FitTuning, PressureUnit
//! - 参数传递给 `commands/batch.rs`

use super::fit::{FitTuning, ModelArgs, PressureUnit};
use clap::Args;
use std::path::PathBuf;

/// batch 子命令参数
#[derive(Args, Debug)]
pub struct BatchArgs {
    /// Directory containing P-V data files
    pub input: PathBuf,

    /// Glob pattern(s) for input files, comma separated
    #[arg(long, default_value = "*.csv,*.dat,*.xy,*.txt")]
    pub pattern: String,

    /// Recurse into subdirectories
    #[arg(long, default_value_t = false)]
    pub recursive: bool,

    /// Number of parallel jobs (0 = all cores)
    #[arg(short, long, env = "EOSFIT_JOBS", default_value_t = 0)]
    pub jobs: usize,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub tuning: FitTuning,

    /// Pressure unit used in the input files
    #[arg(long, value_enum, default_value = "gpa")]
    pub pressure_unit: PressureUnit,

    /// Summary CSV with one row per file
    #[arg(long, default_value = "eos_summary.csv")]
    pub summary: PathBuf,
}
