//! # 状态方程拟合核心
//!
//! 纯计算模块：无 I/O、无全局状态、不使用随机数，同一输入总是得到同一结果。
//! 数据集只读，可在多个线程中同时拟合。
//!
//! ## 依赖关系
//! - 被 `commands/`, `report/` 使用
//! - 使用 `models/` 的数据类型
//! - 子模块: pressure, strain, estimator, linear, nonlinear, fitter, stats, options

pub mod estimator;
pub mod fitter;
pub mod linear;
pub mod nonlinear;
pub mod options;
pub mod pressure;
pub mod stats;
pub mod strain;

pub use estimator::initial_guess;
pub use fitter::{backend, fit, fit_columns, select_strategy};
pub use linear::TwoStageLinearFitter;
pub use nonlinear::NonlinearFitter;
pub use options::FitOptions;
pub use pressure::{bulk_modulus_at, pressure, pressure_curve, sample_curve};

use crate::models::{Dataset, EosParameters, FitMethod, FitResult};

/// 拟合后端
///
/// 后端只负责在给定起点上求解；选择后端、退回与重启由 `fitter` 决定。
/// 失败以结果中的状态码表示，不返回错误。
pub trait FitBackend: Send + Sync {
    /// 后端名称（用于日志）
    fn name(&self) -> &'static str;

    fn method(&self) -> FitMethod;

    fn fit(&self, dataset: &Dataset, seed: &EosParameters, options: &FitOptions) -> FitResult;
}
