//! # 拟合质量统计
//!
//! 所有统计量在原始 (V, P) 空间、以物理单位计算，而不是在 F–f 空间。

use crate::eos::pressure::pressure;
use crate::models::{
    Dataset, EosParameters, FitMethod, FitResult, FitStatus, ParamName, Residual, StandardErrors,
};

use nalgebra::DMatrix;

/// 拟合优度
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitQuality {
    pub r_squared: f64,
    pub rmse: f64,
    /// 约化 χ² = Σw·r² / (n − k)
    pub chi_square: f64,
}

/// 逐点残差 P_obs − P_model
pub fn residuals(dataset: &Dataset, params: &EosParameters) -> Vec<Residual> {
    dataset
        .samples()
        .iter()
        .map(|s| {
            let model = pressure(s.volume, params);
            Residual {
                volume: s.volume,
                pressure_observed: s.pressure,
                pressure_model: model,
                residual: s.pressure - model,
            }
        })
        .collect()
}

/// 加权残差平方和
pub fn weighted_rss(dataset: &Dataset, params: &EosParameters) -> f64 {
    dataset
        .samples()
        .iter()
        .map(|s| {
            let r = s.pressure - pressure(s.volume, params);
            s.weight() * r * r
        })
        .sum()
}

impl FitQuality {
    /// 由残差与拟合自由参数个数计算
    pub fn from_residuals(dataset: &Dataset, residuals: &[Residual], n_params: usize) -> Self {
        let n = residuals.len();
        if n == 0 {
            return FitQuality {
                r_squared: f64::NAN,
                rmse: f64::NAN,
                chi_square: f64::NAN,
            };
        }

        let ss_res: f64 = residuals.iter().map(|r| r.residual * r.residual).sum();
        let mean_p = residuals.iter().map(|r| r.pressure_observed).sum::<f64>() / n as f64;
        let ss_tot: f64 = residuals
            .iter()
            .map(|r| (r.pressure_observed - mean_p).powi(2))
            .sum();

        let weighted: f64 = residuals
            .iter()
            .zip(dataset.samples())
            .map(|(r, s)| s.weight() * r.residual * r.residual)
            .sum();
        let dof = n.saturating_sub(n_params).max(1);

        FitQuality {
            r_squared: if ss_tot > 0.0 { 1.0 - ss_res / ss_tot } else { 0.0 },
            rmse: (ss_res / n as f64).sqrt(),
            chi_square: weighted / dof as f64,
        }
    }
}

/// 各拟合后端产出结果时的公共部分
pub(crate) struct ResultParts {
    pub parameters: EosParameters,
    pub covariance: DMatrix<f64>,
    pub covariance_labels: Vec<ParamName>,
    pub standard_errors: StandardErrors,
    pub iterations_used: usize,
    pub status: FitStatus,
    pub method: FitMethod,
    pub constrained: Vec<ParamName>,
    pub n_free: usize,
}

impl ResultParts {
    /// 补上残差与拟合优度，生成最终结果
    pub fn into_result(self, dataset: &Dataset) -> FitResult {
        let residuals = residuals(dataset, &self.parameters);
        let quality = FitQuality::from_residuals(dataset, &residuals, self.n_free);

        FitResult {
            parameters: self.parameters,
            standard_errors: self.standard_errors,
            covariance: self.covariance,
            covariance_labels: self.covariance_labels,
            r_squared: quality.r_squared,
            rmse: quality.rmse,
            chi_square: quality.chi_square,
            residuals,
            converged: self.status == FitStatus::Converged,
            iterations_used: self.iterations_used,
            status: self.status,
            method: self.method,
            constrained: self.constrained,
            restarts: 0,
        }
    }
}
