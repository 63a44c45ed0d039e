//! # eosfit - 状态方程拟合命令行工具
//!
//! ## 子命令
//! - `fit`   - 拟合单个 V-P 数据文件
//! - `batch` - 批量并行拟合目录中的数据文件
//! - `curve` - 按给定参数计算 P(V) 曲线

use clap::Parser;
use eosfit::cli::Cli;
use eosfit::{commands, utils};

fn main() {
    // Initialize colored output for Windows compatibility
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    let cli = Cli::parse();

    if let Err(e) = commands::run(cli.command) {
        utils::output::print_error(&format!("{}", e));
        std::process::exit(1);
    }
}
