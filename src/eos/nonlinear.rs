//! # 有界非线性最小二乘
//!
//! 对任意 EoS 形式的未锁定参数最小化 Σw·(P_i − P(V_i))²，物理边界作为箱约束。
//!
//! ## 算法概述
//! 1. 自由参数按起点量级缩放，代价按起点代价归一化
//! 2. `argmin` 的 L-BFGS + More–Thuente 线搜索求极小
//! 3. 代价与梯度只在箱内求值（越界参数先夹取）；贴边且指向外侧的梯度分量置零
//! 4. 收敛判据：从最优点出发的 Gauss–Newton 步不再移动任何活动参数
//!
//! ## 依赖关系
//! - 被 `eos/fitter.rs` 调用，也为 `eos/linear.rs` 提供协方差
//! - 使用 `argmin` 做有界极小化，`nalgebra` 做小规模线性代数

use crate::eos::options::FitOptions;
use crate::eos::pressure::pressure;
use crate::eos::stats::{weighted_rss, ResultParts};
use crate::eos::FitBackend;
use crate::models::{
    Dataset, EosParameters, FitMethod, FitResult, FitStatus, ParamName, PhysicalBounds,
    StandardErrors,
};

use argmin::core::{CostFunction, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use nalgebra::{DMatrix, DVector};
use std::sync::Mutex;

const LBFGS_MEMORY: usize = 7;
/// 归一化代价下的梯度范数阈值
const GRADIENT_TOLERANCE: f64 = 1e-12;
/// Gauss–Newton 步相对参数量级的阈值
const STATIONARY_STEP: f64 = 1e-6;
const BOUND_EPSILON: f64 = 1e-12;
const COST_FLOOR: f64 = 1e-28;

/// 极小化的原始输出
#[derive(Debug, Clone)]
pub struct MinimizeOutcome {
    pub params: EosParameters,
    pub cost: f64,
    pub converged: bool,
    pub iterations: usize,
}

/// 模型压力对参数的偏导 ∂P(V_i)/∂θ_j，n × k
pub fn jacobian(dataset: &Dataset, params: &EosParameters, names: &[ParamName]) -> DMatrix<f64> {
    let samples = dataset.samples();
    let mut jac = DMatrix::zeros(samples.len(), names.len());

    for (j, &name) in names.iter().enumerate() {
        let value = params.get(name);
        let h = 1e-6 * value.abs().max(1.0);

        let mut plus = params.clone();
        plus.set(name, value + h);
        let mut minus = params.clone();
        minus.set(name, value - h);

        for (i, s) in samples.iter().enumerate() {
            jac[(i, j)] = (pressure(s.volume, &plus) - pressure(s.volume, &minus)) / (2.0 * h);
        }
    }

    jac
}

/// JᵗWJ 与 JᵗW·r
fn normal_equations(
    dataset: &Dataset,
    params: &EosParameters,
    names: &[ParamName],
) -> (DMatrix<f64>, DVector<f64>) {
    let jac = jacobian(dataset, params, names);
    let w = DVector::from_vec(dataset.weights());
    let r = DVector::from_iterator(
        dataset.len(),
        dataset
            .samples()
            .iter()
            .map(|s| s.pressure - pressure(s.volume, params)),
    );

    let mut jw = jac.clone();
    for i in 0..jw.nrows() {
        for j in 0..jw.ncols() {
            jw[(i, j)] *= w[i];
        }
    }

    (jw.transpose() * &jac, jw.transpose() * r)
}

/// 自由参数的缩放与箱约束
///
/// 优化器看到的坐标是 x_j = θ_j / s_j，s_j 取起点的量级。
struct Scaling {
    free: Vec<ParamName>,
    scales: Vec<f64>,
    /// 物理单位下的 [下限, 上限]
    limits: Vec<(f64, f64)>,
}

impl Scaling {
    fn new(start: &EosParameters, bounds: &PhysicalBounds, max_volume: f64) -> Self {
        let free = start.free_parameters();
        let limits: Vec<(f64, f64)> = free.iter().map(|&name| bounds.range(name, max_volume)).collect();
        let scales = free
            .iter()
            .zip(&limits)
            .map(|(&name, &(lo, hi))| {
                let magnitude = start.get(name).abs();
                if magnitude > 1e-8 {
                    magnitude
                } else {
                    (hi - lo).abs().max(1.0)
                }
            })
            .collect();

        Scaling { free, scales, limits }
    }

    fn to_scaled(&self, params: &EosParameters) -> Vec<f64> {
        self.free
            .iter()
            .zip(&self.scales)
            .map(|(&name, &s)| params.get(name) / s)
            .collect()
    }

    /// 缩放坐标 → 物理参数，越界的分量夹回边界
    fn apply(&self, template: &EosParameters, x: &[f64]) -> EosParameters {
        let mut params = template.clone();
        for (j, &name) in self.free.iter().enumerate() {
            let (lo, hi) = self.limits[j];
            params.set(name, (x[j] * self.scales[j]).clamp(lo, hi));
        }
        params
    }

    /// 参数贴边且 JᵗW·r 把它推向箱外
    fn pushed_out(&self, j: usize, value: f64, descent: f64) -> bool {
        let (lo, hi) = self.limits[j];
        let tol = BOUND_EPSILON * self.scales[j];
        (value <= lo + tol && descent < 0.0) || (value >= hi - tol && descent > 0.0)
    }
}

/// 交给 `argmin` 的问题：缩放坐标、归一化代价
///
/// 记录求值过的最优点，线搜索中途出错时也不丢失进展。
struct BoundedProblem<'a> {
    dataset: &'a Dataset,
    template: &'a EosParameters,
    scaling: &'a Scaling,
    cost_scale: f64,
    best: &'a Mutex<(f64, Vec<f64>)>,
}

impl CostFunction for BoundedProblem<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        let params = self.scaling.apply(self.template, x);
        let cost = weighted_rss(self.dataset, &params) / self.cost_scale;

        if let Ok(mut best) = self.best.lock() {
            if cost < best.0 {
                *best = (cost, x.clone());
            }
        }
        Ok(cost)
    }
}

impl Gradient for BoundedProblem<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, x: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        let params = self.scaling.apply(self.template, x);
        let (_, jtwr) = normal_equations(self.dataset, &params, &self.scaling.free);

        // ∂(Σw·r²)/∂x_j = −2·(JᵗW·r)_j·s_j；贴边外推的分量置零
        let grad = (0..self.scaling.free.len())
            .map(|j| {
                let value = params.get(self.scaling.free[j]);
                if self.scaling.pushed_out(j, value, jtwr[j]) {
                    0.0
                } else {
                    -2.0 * jtwr[j] * self.scaling.scales[j] / self.cost_scale
                }
            })
            .collect();

        Ok(grad)
    }
}

/// 从 `params` 出发的 Gauss–Newton 步是否可以忽略
///
/// 贴边且被推向箱外的参数不参与判断。
fn is_stationary(dataset: &Dataset, params: &EosParameters, scaling: &Scaling) -> bool {
    if weighted_rss(dataset, params) < COST_FLOOR {
        return true;
    }

    let (jtwj, jtwr) = normal_equations(dataset, params, &scaling.free);
    let active: Vec<usize> = (0..scaling.free.len())
        .filter(|&j| !scaling.pushed_out(j, params.get(scaling.free[j]), jtwr[j]))
        .collect();
    if active.is_empty() {
        return true;
    }

    let k = active.len();
    let reduced = DMatrix::from_fn(k, k, |a, b| jtwj[(active[a], active[b])]);
    let rhs = DVector::from_fn(k, |a, _| jtwr[active[a]]);

    let step = match reduced.clone().cholesky() {
        Some(chol) => chol.solve(&rhs),
        None => match reduced.pseudo_inverse(1e-14) {
            Ok(inv) => inv * rhs,
            Err(_) => return false,
        },
    };

    active
        .iter()
        .enumerate()
        .all(|(a, &j)| (step[a] / scaling.scales[j]).abs() <= STATIONARY_STEP)
}

/// 箱约束下最小化加权残差平方和
///
/// 锁定参数保持起点的取值；自由参数先被投影进边界。
pub fn minimize_bounded(
    dataset: &Dataset,
    seed: &EosParameters,
    bounds: &PhysicalBounds,
    max_iterations: usize,
) -> MinimizeOutcome {
    let max_volume = dataset.max_volume();

    let mut start = seed.clone();
    for name in start.free_parameters() {
        start.set(name, bounds.clamp(name, start.get(name), max_volume));
    }

    let initial_cost = weighted_rss(dataset, &start);
    if start.free_parameters().is_empty() || !initial_cost.is_finite() || initial_cost < COST_FLOOR {
        return MinimizeOutcome {
            converged: initial_cost.is_finite(),
            params: start,
            cost: initial_cost,
            iterations: 0,
        };
    }

    let scaling = Scaling::new(&start, bounds, max_volume);
    let x0 = scaling.to_scaled(&start);
    let best = Mutex::new((1.0, x0.clone()));
    let problem = BoundedProblem {
        dataset,
        template: &start,
        scaling: &scaling,
        cost_scale: initial_cost,
        best: &best,
    };

    // 不按代价变化量停止：由梯度阈值、目标代价或线搜索失败结束
    let run = LBFGS::new(MoreThuenteLineSearch::new(), LBFGS_MEMORY)
        .with_tolerance_grad(GRADIENT_TOLERANCE)
        .and_then(|solver| solver.with_tolerance_cost(0.0))
        .and_then(|solver| {
            Executor::new(problem, solver)
                .configure(|state| {
                    state
                        .param(x0.clone())
                        .max_iters(max_iterations.max(1) as u64)
                        .target_cost(COST_FLOOR / initial_cost)
                })
                .run()
        });

    let iterations = match run {
        Ok(result) => result.state().get_iter() as usize,
        Err(_) => max_iterations,
    };
    let best_x = match best.into_inner() {
        Ok((_, x)) => x,
        Err(poisoned) => poisoned.into_inner().1,
    };

    let params = scaling.apply(&start, &best_x);
    let cost = weighted_rss(dataset, &params);
    let converged = cost.is_finite() && is_stationary(dataset, &params, &scaling);

    MinimizeOutcome {
        params,
        cost,
        converged,
        iterations,
    }
}

/// 协方差 s²·(JᵗWJ)⁺，s² = cost / (n − k)
pub fn covariance(dataset: &Dataset, params: &EosParameters, names: &[ParamName], cost: f64) -> DMatrix<f64> {
    let k = names.len();
    if k == 0 {
        return DMatrix::zeros(0, 0);
    }

    let (jtwj, _) = normal_equations(dataset, params, names);
    let dof = dataset.len().saturating_sub(k).max(1) as f64;
    let s2 = cost / dof;

    match jtwj.pseudo_inverse(1e-14) {
        Ok(inv) => inv * s2,
        Err(_) => DMatrix::from_element(k, k, f64::NAN),
    }
}

/// 贴在物理边界上的参数（V0 贴下限 max(V) 属正常情况，不计入）
pub fn constrained_parameters(
    params: &EosParameters,
    free: &[ParamName],
    bounds: &PhysicalBounds,
    max_volume: f64,
) -> Vec<ParamName> {
    free.iter()
        .copied()
        .filter(|&name| {
            let value = params.get(name);
            match name {
                ParamName::V0 => {
                    let (_, hi) = bounds.range(name, max_volume);
                    (value - hi).abs() <= 1e-9 * hi
                }
                _ => bounds.is_at_bound(name, value, max_volume),
            }
        })
        .collect()
}

/// 通用非线性拟合后端
#[derive(Debug, Clone, Copy, Default)]
pub struct NonlinearFitter;

impl FitBackend for NonlinearFitter {
    fn name(&self) -> &'static str {
        "bounded-lbfgs"
    }

    fn method(&self) -> FitMethod {
        FitMethod::Nonlinear
    }

    fn fit(&self, dataset: &Dataset, seed: &EosParameters, options: &FitOptions) -> FitResult {
        if dataset.len() < seed.eos_type.min_samples() {
            return FitResult::failed(seed.eos_type, FitMethod::Nonlinear, FitStatus::InsufficientData);
        }

        let outcome = minimize_bounded(
            dataset,
            seed,
            &options.bounds,
            options.max_nonlinear_iterations,
        );

        if !outcome.params.is_finite() || !outcome.cost.is_finite() {
            return FitResult::failed(seed.eos_type, FitMethod::Nonlinear, FitStatus::Degenerate);
        }

        let free = outcome.params.free_parameters();
        let cov = covariance(dataset, &outcome.params, &free, outcome.cost);

        let mut standard_errors = StandardErrors::zero();
        for (i, &name) in free.iter().enumerate() {
            standard_errors.set(name, cov[(i, i)].max(0.0).sqrt());
        }

        let constrained =
            constrained_parameters(&outcome.params, &free, &options.bounds, dataset.max_volume());

        ResultParts {
            parameters: outcome.params,
            covariance: cov,
            covariance_labels: free.clone(),
            standard_errors,
            iterations_used: outcome.iterations,
            status: if outcome.converged {
                FitStatus::Converged
            } else {
                FitStatus::MaxIterReached
            },
            method: FitMethod::Nonlinear,
            constrained,
            n_free: free.len(),
        }
        .into_result(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EosType;
    use approx::assert_relative_eq;

    fn synthetic(truth: &EosParameters, n: usize, span: f64) -> Dataset {
        let volumes: Vec<f64> = (0..n)
            .map(|i| truth.v0 * (1.0 - span * i as f64 / (n - 1) as f64))
            .collect();
        let pressures: Vec<f64> = volumes.iter().map(|&v| pressure(v, truth)).collect();
        Dataset::from_columns("synthetic", &volumes, &pressures).unwrap()
    }

    #[test]
    fn test_recovers_vinet_parameters() {
        let truth = EosParameters::new(EosType::Vinet, 40.0, 120.0, 5.2);
        let ds = synthetic(&truth, 10, 0.2);
        let seed = EosParameters::new(EosType::Vinet, 40.0, 200.0, 4.0);

        let outcome = minimize_bounded(&ds, &seed, &PhysicalBounds::default(), 200);
        assert!(outcome.converged);
        assert_relative_eq!(outcome.params.v0, 40.0, max_relative = 1e-6);
        assert_relative_eq!(outcome.params.b0, 120.0, max_relative = 1e-4);
        assert_relative_eq!(outcome.params.b0_prime, 5.2, max_relative = 1e-4);
    }

    #[test]
    fn test_recovers_murnaghan_parameters() {
        let truth = EosParameters::new(EosType::Murnaghan, 40.0, 120.0, 5.2);
        let ds = synthetic(&truth, 10, 0.2);
        let seed = EosParameters::new(EosType::Murnaghan, 40.0, 210.0, 4.0);

        let outcome = minimize_bounded(&ds, &seed, &PhysicalBounds::default(), 200);
        assert!(outcome.converged);
        assert_relative_eq!(outcome.params.b0, 120.0, max_relative = 1e-4);
        assert_relative_eq!(outcome.params.b0_prime, 5.2, max_relative = 1e-4);
    }

    #[test]
    fn test_locked_parameter_is_untouched() {
        let truth = EosParameters::new(EosType::Bm3, 60.0, 180.0, 4.6);
        let ds = synthetic(&truth, 8, 0.12);
        let seed = EosParameters::new(EosType::Bm3, 60.5, 150.0, 4.0)
            .with_locked([ParamName::B0Prime]);

        let outcome = minimize_bounded(&ds, &seed, &PhysicalBounds::default(), 200);
        assert_eq!(outcome.params.b0_prime, 4.0);
        assert!(outcome.params.v0 >= ds.max_volume());
    }

    #[test]
    fn test_respects_box_constraints() {
        // 这组数据的曲率要求 B0′ < 2，拟合应停在下边界
        let ds = Dataset::from_columns(
            "odd",
            &[74.68, 74.22, 73.48, 72.90, 72.28, 71.65],
            &[0.0, 2.01, 5.03, 7.49, 10.10, 12.84],
        )
        .unwrap();
        let seed = EosParameters::new(EosType::Bm3, 74.68, 315.0, 4.0);

        let outcome = minimize_bounded(&ds, &seed, &PhysicalBounds::default(), 200);
        assert!(outcome.converged);
        let p = &outcome.params;
        assert!(p.b0_prime >= 2.0 && p.b0_prime <= 8.0);
        assert!(p.b0 >= 20.0 && p.b0 <= 800.0);
        assert!(p.v0 >= 74.68);

        let constrained =
            constrained_parameters(p, &p.free_parameters(), &PhysicalBounds::default(), 74.68);
        assert!(constrained.contains(&ParamName::B0Prime));
    }

    #[test]
    fn test_backend_reports_insufficient_data() {
        let ds = Dataset::from_columns("tiny", &[10.0, 9.9], &[0.0, 1.0]).unwrap();
        let seed = EosParameters::new(EosType::Vinet, 10.0, 100.0, 4.0);
        let result = NonlinearFitter.fit(&ds, &seed, &FitOptions::default());
        assert!(!result.converged);
        assert_eq!(result.status, FitStatus::InsufficientData);
    }

    #[test]
    fn test_backend_standard_errors_are_non_negative() {
        let truth = EosParameters::new(EosType::Bm3, 60.0, 180.0, 4.6);
        let volumes: Vec<f64> = (0..8).map(|i| 60.0 * (1.0 - 0.015 * i as f64)).collect();
        let pressures: Vec<f64> = volumes
            .iter()
            .enumerate()
            .map(|(i, &v)| pressure(v, &truth) + 0.05 * ((i as f64) * 1.7).sin())
            .collect();
        let ds = Dataset::from_columns("noisy", &volumes, &pressures).unwrap();
        let seed = EosParameters::new(EosType::Bm3, 60.0, 150.0, 4.0);

        let result = NonlinearFitter.fit(&ds, &seed, &FitOptions::default());
        assert!(result.has_parameters());
        assert_eq!(result.covariance.nrows(), 3);
        assert!(result.standard_errors.v0 >= 0.0);
        assert!(result.standard_errors.b0 > 0.0);
        assert!(result.standard_errors.b0_prime > 0.0);
    }

    #[test]
    fn test_single_iteration_from_far_seed_is_not_converged() {
        let truth = EosParameters::new(EosType::Vinet, 40.0, 120.0, 5.2);
        let ds = synthetic(&truth, 10, 0.2);
        let seed = EosParameters::new(EosType::Vinet, 41.0, 400.0, 7.0);
        let start_cost = weighted_rss(&ds, &seed);

        let outcome = minimize_bounded(&ds, &seed, &PhysicalBounds::default(), 1);
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 1);
        assert!(outcome.cost < start_cost);
        assert!(outcome.params.b0 >= 20.0 && outcome.params.b0 <= 800.0);
    }

    #[test]
    fn test_stationarity_at_truth_only() {
        let truth = EosParameters::new(EosType::Bm3, 60.0, 180.0, 4.6);
        let ds = synthetic(&truth, 8, 0.12);
        let bounds = PhysicalBounds::default();

        let scaling = Scaling::new(&truth, &bounds, ds.max_volume());
        assert!(is_stationary(&ds, &truth, &scaling));

        let off = EosParameters::new(EosType::Bm3, 60.0, 170.0, 4.6);
        assert!(!is_stationary(&ds, &off, &scaling));
    }

    #[test]
    fn test_pushed_out_only_at_bounds() {
        let start = EosParameters::new(EosType::Bm3, 60.0, 180.0, 4.6);
        let scaling = Scaling::new(&start, &PhysicalBounds::default(), 60.0);
        let bp = scaling
            .free
            .iter()
            .position(|&n| n == ParamName::B0Prime)
            .unwrap();

        assert!(scaling.pushed_out(bp, 2.0, -1.0));
        assert!(!scaling.pushed_out(bp, 2.0, 1.0));
        assert!(scaling.pushed_out(bp, 8.0, 1.0));
        assert!(!scaling.pushed_out(bp, 5.0, -1.0));
    }

    #[test]
    fn test_scaled_coordinates_round_trip() {
        let start = EosParameters::new(EosType::Bm3, 60.0, 180.0, 4.6);
        let scaling = Scaling::new(&start, &PhysicalBounds::default(), 60.0);
        let x = scaling.to_scaled(&start);
        assert!(x.iter().all(|v| (v - 1.0).abs() < 1e-12));

        // 越界的坐标被夹回边界
        let clamped = scaling.apply(&start, &[0.5, 10.0, 1.0]);
        assert_eq!(clamped.v0, 60.0);
        assert_eq!(clamped.b0, 800.0);
        assert_relative_eq!(clamped.b0_prime, 4.6, max_relative = 1e-12);
    }
}
