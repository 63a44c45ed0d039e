//! # 拟合选项
//!
//! 所有可调参数显式随每次调用传入，不存在模块级可变状态。

use crate::models::PhysicalBounds;

/// 默认正则化强度，相当于 B0′ 先验标准差约 0.3
pub const DEFAULT_REGULARIZATION: f64 = 10.0;
/// 默认外层（V0）最大迭代次数
pub const DEFAULT_MAX_OUTER_ITERATIONS: usize = 10;
/// 默认收敛容差（V0 相对变化、B0′ 绝对变化）
pub const DEFAULT_TOLERANCE: f64 = 1e-6;
/// 默认非线性（L-BFGS）最大迭代次数
pub const DEFAULT_MAX_NONLINEAR_ITERATIONS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// 正则化强度 (≥ 0)，只阻尼 F–f 斜率项；按残差方差缩放
    pub regularization_strength: f64,
    pub max_outer_iterations: usize,
    pub tolerance: f64,
    pub max_nonlinear_iterations: usize,
    pub bounds: PhysicalBounds,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            regularization_strength: DEFAULT_REGULARIZATION,
            max_outer_iterations: DEFAULT_MAX_OUTER_ITERATIONS,
            tolerance: DEFAULT_TOLERANCE,
            max_nonlinear_iterations: DEFAULT_MAX_NONLINEAR_ITERATIONS,
            bounds: PhysicalBounds::default(),
        }
    }
}

impl FitOptions {
    pub fn with_regularization(mut self, strength: f64) -> Self {
        self.regularization_strength = strength.max(0.0);
        self
    }

    pub fn with_max_outer_iterations(mut self, iterations: usize) -> Self {
        self.max_outer_iterations = iterations.max(1);
        self
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_nonlinear_iterations(mut self, iterations: usize) -> Self {
        self.max_nonlinear_iterations = iterations.max(1);
        self
    }
}
