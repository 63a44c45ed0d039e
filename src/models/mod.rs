//! # 数据模型模块
//!
//! 定义 V-P 数据集、状态方程参数与拟合结果。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `eos/`, `commands/`, `report/` 使用
//! - 子模块: dataset, parameters, fit_result

pub mod dataset;
pub mod fit_result;
pub mod parameters;

pub use dataset::{Dataset, Sample};
pub use fit_result::{FitMethod, FitResult, FitStatus, Residual, StandardErrors};
pub use parameters::{implied_b0_double_prime, EosParameters, EosType, ParamName, PhysicalBounds};
