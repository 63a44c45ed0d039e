//! # 拟合结果模型
//!
//! 每次拟合调用产生一个不可变的 `FitResult`，由报告/绘图层消费。
//!
//! ## 依赖关系
//! - 由 `eos/` 拟合器创建
//! - 被 `commands/`, `report/` 使用

use crate::models::{EosParameters, EosType, ParamName};

use nalgebra::DMatrix;
use std::fmt;

/// 拟合终止原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitStatus {
    /// 满足收敛容差
    Converged,
    /// 达到迭代上限，返回最后一次的参数
    MaxIterReached,
    /// 数据点少于该 EoS 形式要求的最小数目
    InsufficientData,
    /// 应变无分布或线性系统不可解
    Degenerate,
}

impl fmt::Display for FitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitStatus::Converged => write!(f, "converged"),
            FitStatus::MaxIterReached => write!(f, "max iterations reached"),
            FitStatus::InsufficientData => write!(f, "insufficient data"),
            FitStatus::Degenerate => write!(f, "degenerate data"),
        }
    }
}

/// 使用的拟合策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitMethod {
    /// F–f 线性化两阶段正则化最小二乘（仅 BM3）
    TwoStageLinear,
    /// 有界 L-BFGS（argmin）
    Nonlinear,
}

impl fmt::Display for FitMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FitMethod::TwoStageLinear => write!(f, "two-stage F-f"),
            FitMethod::Nonlinear => write!(f, "nonlinear L-BFGS"),
        }
    }
}

/// 参数标准误差
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardErrors {
    pub v0: f64,
    pub b0: f64,
    pub b0_prime: f64,
    pub b0_double_prime: f64,
}

impl StandardErrors {
    pub fn zero() -> Self {
        StandardErrors {
            v0: 0.0,
            b0: 0.0,
            b0_prime: 0.0,
            b0_double_prime: 0.0,
        }
    }

    pub fn nan() -> Self {
        StandardErrors {
            v0: f64::NAN,
            b0: f64::NAN,
            b0_prime: f64::NAN,
            b0_double_prime: f64::NAN,
        }
    }

    pub fn get(&self, name: ParamName) -> f64 {
        match name {
            ParamName::V0 => self.v0,
            ParamName::B0 => self.b0,
            ParamName::B0Prime => self.b0_prime,
            ParamName::B0DoublePrime => self.b0_double_prime,
        }
    }

    pub fn set(&mut self, name: ParamName, value: f64) {
        match name {
            ParamName::V0 => self.v0 = value,
            ParamName::B0 => self.b0 = value,
            ParamName::B0Prime => self.b0_prime = value,
            ParamName::B0DoublePrime => self.b0_double_prime = value,
        }
    }
}

/// 单点残差（物理单位）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Residual {
    pub volume: f64,
    pub pressure_observed: f64,
    pub pressure_model: f64,
    /// P_obs − P_model
    pub residual: f64,
}

/// 一次拟合的完整结果
#[derive(Debug, Clone)]
pub struct FitResult {
    pub parameters: EosParameters,
    pub standard_errors: StandardErrors,
    /// 协方差矩阵，行列顺序见 `covariance_labels`
    pub covariance: DMatrix<f64>,
    pub covariance_labels: Vec<ParamName>,
    pub r_squared: f64,
    pub rmse: f64,
    /// 约化 χ²（无 σ 时为单位权重）
    pub chi_square: f64,
    pub residuals: Vec<Residual>,
    pub converged: bool,
    pub iterations_used: usize,
    pub status: FitStatus,
    pub method: FitMethod,
    /// 拟合结束时贴在物理边界上的参数
    pub constrained: Vec<ParamName>,
    /// 多起点重试次数
    pub restarts: usize,
}

impl FitResult {
    /// 失败结果：参数为 NaN，`converged = false`
    pub fn failed(eos_type: EosType, method: FitMethod, status: FitStatus) -> Self {
        FitResult {
            parameters: EosParameters::nan(eos_type),
            standard_errors: StandardErrors::nan(),
            covariance: DMatrix::zeros(0, 0),
            covariance_labels: Vec::new(),
            r_squared: f64::NAN,
            rmse: f64::NAN,
            chi_square: f64::NAN,
            residuals: Vec::new(),
            converged: false,
            iterations_used: 0,
            status,
            method,
            constrained: Vec::new(),
            restarts: 0,
        }
    }

    /// 是否得到了可用的参数（可能未收敛）
    pub fn has_parameters(&self) -> bool {
        self.parameters.is_finite()
    }

    pub fn is_constrained(&self) -> bool {
        !self.constrained.is_empty()
    }

    /// 按参数名取协方差项
    pub fn covariance_of(&self, a: ParamName, b: ParamName) -> Option<f64> {
        let i = self.covariance_labels.iter().position(|p| *p == a)?;
        let j = self.covariance_labels.iter().position(|p| *p == b)?;
        Some(self.covariance[(i, j)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_result_has_nan_parameters() {
        let r = FitResult::failed(EosType::Bm3, FitMethod::TwoStageLinear, FitStatus::InsufficientData);
        assert!(!r.converged);
        assert!(!r.has_parameters());
        assert!(r.parameters.v0.is_nan());
        assert_eq!(r.covariance_of(ParamName::B0, ParamName::B0), None);
    }

    #[test]
    fn test_standard_errors_accessors() {
        let mut se = StandardErrors::zero();
        se.set(ParamName::B0Prime, 0.25);
        assert_eq!(se.get(ParamName::B0Prime), 0.25);
        assert_eq!(se.get(ParamName::V0), 0.0);
    }
}
