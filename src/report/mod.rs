//! # 报告模块
//!
//! 把拟合结果写成 CSV/XY 文件与 P-V、F-f 图。
//!
//! ## 依赖关系
//! - 被 `commands/` 调用
//! - 使用 `eos/` 计算曲线，`models/` 的 FitResult
//! - 子模块: export, plot

pub mod export;
pub mod plot;

pub use export::{
    curve_to_csv, curve_to_xy, residuals_to_csv, summary_to_csv, write_curve, write_fit_report,
    SummaryRow,
};
pub use plot::{generate_ff_plot, generate_pv_plot};
