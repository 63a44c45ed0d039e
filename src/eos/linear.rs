//! # 两阶段正则化 F–f 线性拟合器（仅 BM3）
//!
//! 三阶 Birch–Murnaghan 在 F–f 空间对 f 线性：
//!
//! ```text
//! F = β0 + β1·f,   B0 = β0,   B0′ = 4 + 2β1 / (3β0)
//! ```
//!
//! 直接对 (V0, B0, B0′) 做非线性拟合时参数强相关、B0′ 容易发散；这里改为两层：
//!
//! - 内层：固定 V0，做加权、Tikhonov 正则化的 2×2 线性回归得到 B0, B0′，
//!   然后夹到物理区间
//! - 外层：在当前 V0 附近做一维黄金分割搜索，目标是压力空间的残差平方和
//!   （每个试探 V0 都重新跑一次内层），直到 V0 与 B0′ 稳定
//!
//! 状态流转：Initializing → OuterIterating → Converged | MaxIterReached | Failed。
//! 对格式正确的数值输入从不 panic，失败以 NaN 参数 + `converged = false` 返回。
//!
//! ## 权重
//! w = 1/(f² + 0.001)（CrysFML 方案），零应变点权重为 0，整体归一化到均值 1。
//!
//! ## 正则化
//! λ = strength·mean(w)·s²/(1.5β̂0)²，其中 β̂0 与 s² 来自同一 V0 下未正则化的回归。
//! 等价于 B0′ ~ N(4, 1/strength) 的先验：无噪声数据 s² → 0，结果无偏；
//! 噪声越大、f 范围越窄，B0′ 越被拉向 4。
//!
//! ## 参考
//! - Angel et al. (2014), Z. Kristallogr. 229, 405
//! - Gonzalez-Platas et al. (2016), J. Appl. Cryst. 49, 1377
//!
//! ## 依赖关系
//! - 被 `eos/fitter.rs` 调用
//! - 使用 `eos/strain.rs`, `eos/pressure.rs`, `eos/estimator.rs`, `eos/nonlinear.rs`
//! - 使用 `nalgebra` 的 2×2 定长矩阵

use crate::eos::estimator::initial_guess;
use crate::eos::nonlinear;
use crate::eos::options::FitOptions;
use crate::eos::stats::{weighted_rss, ResultParts};
use crate::eos::strain::{is_degenerate_strain, transform, DEGENERATE_STRAIN};
use crate::eos::FitBackend;
use crate::models::{
    Dataset, EosParameters, EosType, FitMethod, FitResult, FitStatus, ParamName, StandardErrors,
};

use nalgebra::{DMatrix, Matrix2, Vector2};

/// 权重公式中的 ε
pub const WEIGHT_EPSILON: f64 = 1e-3;

const INITIAL_SEARCH_SPAN: f64 = 0.02;
const MIN_SEARCH_SPAN: f64 = 1e-4;
const GOLDEN_ITERATIONS: usize = 80;

/// 固定 V0 时内层 F–f 回归的解
#[derive(Debug, Clone)]
pub struct FfSolution {
    pub v0: f64,
    /// 夹取后的 B0
    pub b0: f64,
    /// 夹取后的 B0′
    pub b0_prime: f64,
    /// 未夹取的回归系数 [β0, β1]
    pub beta: Vector2<f64>,
    /// 正则化后的正规矩阵 AᵗWA + λR
    pub normal: Matrix2<f64>,
    pub b0_clipped: bool,
    pub b0_prime_clipped: bool,
    /// 压力空间的加权残差平方和
    pub rss: f64,
}

impl FfSolution {
    fn clip_state(&self) -> (bool, bool) {
        (self.b0_clipped, self.b0_prime_clipped)
    }

    fn parameters(&self) -> EosParameters {
        EosParameters::new(EosType::Bm3, self.v0, self.b0, self.b0_prime)
    }
}

/// 逐点权重 w = 1/(f² + ε)，零应变为 0，归一化到均值 1
pub fn strain_weights(strains: &[f64]) -> Vec<f64> {
    let raw: Vec<f64> = strains
        .iter()
        .map(|&f| {
            if is_degenerate_strain(f) {
                0.0
            } else {
                1.0 / (f * f + WEIGHT_EPSILON)
            }
        })
        .collect();

    let mean = raw.iter().sum::<f64>() / raw.len().max(1) as f64;
    if mean > 0.0 {
        raw.iter().map(|w| w / mean).collect()
    } else {
        raw
    }
}

/// 固定 V0 求解正则化 F–f 回归
///
/// 有效点少于两个、应变无分布或方程奇异时返回 `None`。
pub fn solve_ff(dataset: &Dataset, v0: f64, options: &FitOptions) -> Option<FfSolution> {
    let volumes = dataset.volumes();
    let pressures = dataset.pressures();
    let (f, big_f) = transform(&volumes, &pressures, v0);
    let w = strain_weights(&f);

    let used: Vec<usize> = (0..w.len()).filter(|&i| w[i] > 0.0).collect();
    if used.len() < 2 {
        return None;
    }

    let f_min = used.iter().map(|&i| f[i]).fold(f64::INFINITY, f64::min);
    let f_max = used.iter().map(|&i| f[i]).fold(f64::NEG_INFINITY, f64::max);
    if f_max - f_min <= DEGENERATE_STRAIN {
        return None;
    }

    let mut ata = Matrix2::<f64>::zeros();
    let mut atb = Vector2::<f64>::zeros();
    for &i in &used {
        ata[(0, 0)] += w[i];
        ata[(0, 1)] += w[i] * f[i];
        ata[(1, 1)] += w[i] * f[i] * f[i];
        atb[0] += w[i] * big_f[i];
        atb[1] += w[i] * big_f[i] * f[i];
    }
    ata[(1, 0)] = ata[(0, 1)];

    // Tikhonov：只阻尼斜率项
    let mean_w = w.iter().sum::<f64>() / w.len() as f64;
    let lambda = if options.regularization_strength > 0.0 {
        let free = ata.try_inverse()? * atb;
        let rss: f64 = used
            .iter()
            .map(|&i| {
                let r = big_f[i] - (free[0] + free[1] * f[i]);
                w[i] * r * r
            })
            .sum();
        let s2 = rss / used.len().saturating_sub(2).max(1) as f64;
        let slope_scale = (1.5 * free[0]).powi(2);

        if slope_scale > f64::EPSILON && s2.is_finite() {
            options.regularization_strength * mean_w * s2 / slope_scale
        } else {
            0.0
        }
    } else {
        0.0
    };
    let mut normal = ata;
    normal[(1, 1)] += lambda;

    let beta = normal.try_inverse()? * atb;
    if !beta.iter().all(|b| b.is_finite()) {
        return None;
    }

    let raw_b0 = beta[0];
    let raw_b0_prime = if raw_b0.abs() > f64::EPSILON {
        4.0 + 2.0 * beta[1] / (3.0 * raw_b0)
    } else {
        4.0
    };

    let (b0_lo, b0_hi) = options.bounds.b0;
    let (bp_lo, bp_hi) = options.bounds.b0_prime;
    let b0 = raw_b0.clamp(b0_lo, b0_hi);
    let b0_prime = raw_b0_prime.clamp(bp_lo, bp_hi);

    let mut solution = FfSolution {
        v0,
        b0,
        b0_prime,
        beta,
        normal,
        b0_clipped: b0 != raw_b0,
        b0_prime_clipped: b0_prime != raw_b0_prime,
        rss: f64::INFINITY,
    };
    solution.rss = weighted_rss(dataset, &solution.parameters());

    Some(solution)
}

/// 一维黄金分割搜索最小值
fn golden_section<F: Fn(f64) -> f64>(objective: F, lo: f64, hi: f64, iterations: usize) -> f64 {
    let ratio = (5.0_f64.sqrt() - 1.0) / 2.0;
    let (mut a, mut b) = (lo, hi);
    let mut c = b - ratio * (b - a);
    let mut d = a + ratio * (b - a);
    let mut fc = objective(c);
    let mut fd = objective(d);

    for _ in 0..iterations {
        if fc < fd {
            b = d;
            d = c;
            fd = fc;
            c = b - ratio * (b - a);
            fc = objective(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + ratio * (b - a);
            fd = objective(d);
        }
    }

    0.5 * (a + b)
}

/// 两阶段拟合主流程
pub fn fit_bm3(dataset: &Dataset, seed: &EosParameters, options: &FitOptions) -> FitResult {
    if dataset.len() < EosType::Bm3.min_samples() {
        return FitResult::failed(EosType::Bm3, FitMethod::TwoStageLinear, FitStatus::InsufficientData);
    }
    if dataset.distinct_volumes() < 2 {
        return FitResult::failed(EosType::Bm3, FitMethod::TwoStageLinear, FitStatus::Degenerate);
    }

    // Initializing
    let (lower, upper) = options.bounds.range(ParamName::V0, dataset.max_volume());
    let mut v0 = if seed.v0.is_finite() {
        seed.v0.clamp(lower, upper)
    } else {
        initial_guess(dataset).v0.clamp(lower, upper)
    };

    let objective = |x: f64| {
        solve_ff(dataset, x, options)
            .map(|s| s.rss)
            .unwrap_or(f64::INFINITY)
    };

    // OuterIterating
    let mut span = INITIAL_SEARCH_SPAN;
    let mut previous: Option<FfSolution> = None;
    let mut status = FitStatus::MaxIterReached;
    let mut iterations = 0;

    for iteration in 1..=options.max_outer_iterations.max(1) {
        iterations = iteration;

        let lo = (v0 * (1.0 - span)).clamp(lower, upper);
        let hi = (v0 * (1.0 + span)).max(lower * (1.0 + 1e-9)).min(upper);
        let candidate = golden_section(&objective, lo, hi, GOLDEN_ITERATIONS);

        // 下界 max(V) 单独作为候选：P≈0 点恰在 V0 处时目标函数在边界不连续
        let best = match (
            solve_ff(dataset, candidate, options),
            solve_ff(dataset, lower, options),
        ) {
            (Some(c), Some(l)) => Some(if c.rss <= l.rss { c } else { l }),
            (Some(c), None) => Some(c),
            (None, Some(l)) => Some(l),
            (None, None) => None,
        };

        let Some(best) = best else {
            break;
        };

        let on_upper_edge = (best.v0 - hi).abs() < 0.01 * (hi - lo);
        let stable = previous.as_ref().is_some_and(|p| {
            (best.v0 - p.v0).abs() < options.tolerance * best.v0
                && (best.b0_prime - p.b0_prime).abs() < options.tolerance
                && p.clip_state() == best.clip_state()
        });

        v0 = best.v0;
        previous = Some(best);

        if !on_upper_edge {
            span = (span * 0.5).max(MIN_SEARCH_SPAN);
        }
        if stable {
            status = FitStatus::Converged;
            break;
        }
    }

    match previous {
        Some(solution) => finalize(dataset, solution, status, iterations, upper),
        None => FitResult::failed(EosType::Bm3, FitMethod::TwoStageLinear, FitStatus::Degenerate),
    }
}

/// 误差传递与拟合优度
fn finalize(
    dataset: &Dataset,
    solution: FfSolution,
    status: FitStatus,
    iterations: usize,
    v0_upper: f64,
) -> FitResult {
    let params = solution.parameters();

    // F–f 空间残差方差，用夹取后的参数对应的斜率
    let (f, big_f) = transform(&dataset.volumes(), &dataset.pressures(), solution.v0);
    let w = strain_weights(&f);
    let b0 = solution.b0;
    let b1 = 1.5 * b0 * (solution.b0_prime - 4.0);

    let (rss_f, n_eff) = f
        .iter()
        .zip(&big_f)
        .zip(&w)
        .filter(|(_, wi)| **wi > 0.0)
        .fold((0.0, 0usize), |(acc, n), ((fi, fi_stress), wi)| {
            let r = fi_stress - (b0 + b1 * fi);
            (acc + wi * r * r, n + 1)
        });
    let s2 = rss_f / n_eff.saturating_sub(2).max(1) as f64;

    // (β0, β1) → (B0, B0′) 的 Jacobian
    let g = Matrix2::new(1.0, 0.0, -2.0 * b1 / (3.0 * b0 * b0), 2.0 / (3.0 * b0));
    let cov = match solution.normal.try_inverse() {
        Some(inv) => g * (inv * s2) * g.transpose(),
        None => Matrix2::from_element(f64::NAN),
    };

    let mut standard_errors = StandardErrors::zero();
    standard_errors.b0 = cov[(0, 0)].max(0.0).sqrt();
    standard_errors.b0_prime = cov[(1, 1)].max(0.0).sqrt();

    // V0 的误差取自压力空间的三参数 Jacobian
    let names = [ParamName::V0, ParamName::B0, ParamName::B0Prime];
    let cost = weighted_rss(dataset, &params);
    let cov3 = nonlinear::covariance(dataset, &params, &names, cost);
    let var_v0 = cov3[(0, 0)];
    standard_errors.v0 = if var_v0.is_finite() {
        var_v0.max(0.0).sqrt()
    } else {
        f64::NAN
    };

    let mut constrained = Vec::new();
    if (solution.v0 - v0_upper).abs() <= 1e-9 * v0_upper {
        constrained.push(ParamName::V0);
    }
    if solution.b0_clipped {
        constrained.push(ParamName::B0);
    }
    if solution.b0_prime_clipped {
        constrained.push(ParamName::B0Prime);
    }

    ResultParts {
        parameters: params,
        covariance: DMatrix::from_iterator(2, 2, cov.iter().copied()),
        covariance_labels: vec![ParamName::B0, ParamName::B0Prime],
        standard_errors,
        iterations_used: iterations,
        status,
        method: FitMethod::TwoStageLinear,
        constrained,
        n_free: 3,
    }
    .into_result(dataset)
}

/// F–f 两阶段拟合后端
///
/// 只拟合 BM3 且忽略锁定集合；由 `eos::fitter` 负责只在适用时路由到这里。
#[derive(Debug, Clone, Copy, Default)]
pub struct TwoStageLinearFitter;

impl FitBackend for TwoStageLinearFitter {
    fn name(&self) -> &'static str {
        "two-stage-ff"
    }

    fn method(&self) -> FitMethod {
        FitMethod::TwoStageLinear
    }

    fn fit(&self, dataset: &Dataset, seed: &EosParameters, options: &FitOptions) -> FitResult {
        fit_bm3(dataset, seed, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eos::pressure::pressure;
    use approx::assert_relative_eq;

    fn mgo() -> Dataset {
        Dataset::from_columns(
            "mgo",
            &[74.68, 74.22, 73.48, 72.90, 72.28, 71.65],
            &[0.0, 2.01, 5.03, 7.49, 10.10, 12.84],
        )
        .unwrap()
    }

    fn bm3_dataset(v0: f64, b0: f64, b0_prime: f64, volumes: Vec<f64>) -> Dataset {
        let truth = EosParameters::new(EosType::Bm3, v0, b0, b0_prime);
        let pressures: Vec<f64> = volumes.iter().map(|&v| pressure(v, &truth)).collect();
        Dataset::from_columns("synthetic", &volumes, &pressures).unwrap()
    }

    fn unregularized() -> FitOptions {
        FitOptions::default().with_regularization(0.0)
    }

    #[test]
    fn test_round_trip_recovers_parameters() {
        let cases = [
            (74.7, 160.0, 4.0),
            (100.0, 50.0, 5.5),
            (40.0, 300.0, 3.5),
            (20.0, 600.0, 7.0),
            (60.0, 100.0, 2.5),
        ];

        for (v0, b0, b0_prime) in cases {
            // 从 V0 处开始取点，以及完全处于压缩区的取点
            let from_ambient: Vec<f64> = (0..10).map(|i| v0 * (1.0 - 0.15 * i as f64 / 9.0)).collect();
            let compressed: Vec<f64> = (0..8).map(|i| v0 * (0.97 - 0.12 * i as f64 / 7.0)).collect();

            for volumes in [from_ambient, compressed] {
                let ds = bm3_dataset(v0, b0, b0_prime, volumes);
                let seed = initial_guess(&ds);
                let result = fit_bm3(&ds, &seed, &FitOptions::default());

                assert!(result.converged, "case ({}, {}, {}) did not converge", v0, b0, b0_prime);
                assert_eq!(result.status, FitStatus::Converged);
                assert_relative_eq!(result.parameters.v0, v0, max_relative = 1e-3);
                assert_relative_eq!(result.parameters.b0, b0, max_relative = 1e-3);
                assert_relative_eq!(result.parameters.b0_prime, b0_prime, max_relative = 1e-3);
                assert!(result.rmse < 1e-3);
            }
        }
    }

    #[test]
    fn test_regularization_scales_with_noise() {
        // 无噪声数据：即便强度很大，λ 也趋于 0
        let volumes: Vec<f64> = (0..10).map(|i| 60.0 * (1.0 - 0.15 * i as f64 / 9.0)).collect();
        let ds = bm3_dataset(60.0, 100.0, 7.0, volumes);
        let strong = FitOptions::default().with_regularization(1000.0);
        let exact = solve_ff(&ds, 60.0, &strong).unwrap();
        assert_relative_eq!(exact.b0_prime, 7.0, max_relative = 1e-6);

        // 有噪声时同样的强度把 B0′ 拉向 4
        let noisy = solve_ff(&mgo(), 74.68, &strong).unwrap();
        assert!((noisy.b0_prime - 4.0).abs() < 0.1);
    }

    #[test]
    fn test_v0_pinned_at_upper_bound_is_constrained() {
        let volumes: Vec<f64> = (0..6).map(|i| 64.0 - 0.8 * i as f64).collect();
        let ds = bm3_dataset(100.0, 100.0, 4.0, volumes);
        let seed = EosParameters::new(EosType::Bm3, 95.0, 100.0, 4.0);

        let result = fit_bm3(&ds, &seed, &unregularized());
        let upper = 1.5 * ds.max_volume();
        assert!(result.parameters.v0 <= upper);
        assert_relative_eq!(result.parameters.v0, upper, max_relative = 1e-9);
        assert!(result.constrained.contains(&ParamName::V0));
    }

    #[test]
    fn test_default_regularization_is_unbiased_at_b0p_four() {
        let volumes: Vec<f64> = (0..10).map(|i| 74.7 * (1.0 - 0.15 * i as f64 / 9.0)).collect();
        let ds = bm3_dataset(74.7, 160.0, 4.0, volumes);
        let result = fit_bm3(&ds, &initial_guess(&ds), &FitOptions::default());

        assert!(result.converged);
        assert_relative_eq!(result.parameters.b0, 160.0, max_relative = 1e-3);
        assert_relative_eq!(result.parameters.b0_prime, 4.0, max_relative = 1e-3);
    }

    #[test]
    fn test_weights_peak_at_zero_strain() {
        let strains = [0.03, 1e-5, 0.01, 0.05];
        let w = strain_weights(&strains);

        let max_idx = (0..w.len())
            .max_by(|&a, &b| w[a].partial_cmp(&w[b]).unwrap())
            .unwrap();
        assert_eq!(max_idx, 1);

        let mean = w.iter().sum::<f64>() / w.len() as f64;
        assert_relative_eq!(mean, 1.0, max_relative = 1e-12);
    }

    #[test]
    fn test_degenerate_strain_gets_zero_weight() {
        let w = strain_weights(&[0.0, 0.01, 0.02]);
        assert_eq!(w[0], 0.0);
        assert!(w[1] > w[2]);
    }

    #[test]
    fn test_too_few_samples() {
        let ds = Dataset::from_columns("two", &[10.0, 9.8], &[0.0, 1.0]).unwrap();
        let result = fit_bm3(&ds, &initial_guess(&ds), &FitOptions::default());
        assert!(!result.converged);
        assert_eq!(result.status, FitStatus::InsufficientData);
        assert!(result.parameters.v0.is_nan());
        assert!(result.parameters.b0.is_nan());
    }

    #[test]
    fn test_identical_volumes_are_degenerate() {
        let ds = Dataset::from_columns("flat", &[10.0, 10.0, 10.0], &[1.0, 2.0, 3.0]).unwrap();
        let result = fit_bm3(&ds, &initial_guess(&ds), &FitOptions::default());
        assert!(!result.converged);
        assert_eq!(result.status, FitStatus::Degenerate);
        assert!(result.parameters.b0_prime.is_nan());
    }

    #[test]
    fn test_bounds_hold_on_adversarial_data() {
        let volumes: Vec<f64> = (0..9).map(|i| 50.0 - 0.7 * i as f64).collect();
        let mut datasets = Vec::new();
        for amp in [0.5, 5.0, 50.0] {
            let pressures: Vec<f64> = (0..9)
                .map(|i| 2.0 * i as f64 + amp * (3.1 * i as f64).sin())
                .collect();
            datasets.push(Dataset::from_columns("noisy", &volumes, &pressures).unwrap());
        }
        // 压力随压缩反而下降
        let falling: Vec<f64> = (0..9).map(|i| 20.0 - 2.0 * i as f64).collect();
        datasets.push(Dataset::from_columns("falling", &volumes, &falling).unwrap());

        for ds in &datasets {
            for strength in [0.0, 1.0, 100.0] {
                let options = FitOptions::default().with_regularization(strength);
                let result = fit_bm3(ds, &initial_guess(ds), &options);
                let p = &result.parameters;

                assert!(result.has_parameters());
                assert!(p.b0 >= 20.0 && p.b0 <= 800.0, "B0 = {}", p.b0);
                assert!(p.b0_prime >= 2.0 && p.b0_prime <= 8.0, "B0' = {}", p.b0_prime);
                assert!(p.v0 >= ds.max_volume());
            }
        }
    }

    #[test]
    fn test_unregularized_mgo_pins_b0_prime() {
        let result = fit_bm3(&mgo(), &initial_guess(&mgo()), &unregularized());
        assert_eq!(result.parameters.b0_prime, 2.0);
        assert!(result.constrained.contains(&ParamName::B0Prime));
        assert!(result.is_constrained());
    }

    #[test]
    fn test_regularization_pulls_b0_prime_towards_four() {
        let ds = mgo();
        let free = solve_ff(&ds, 74.68, &unregularized()).unwrap();
        let damped = solve_ff(&ds, 74.68, &FitOptions::default()).unwrap();

        let raw_free = 4.0 + 2.0 * free.beta[1] / (3.0 * free.beta[0]);
        let raw_damped = 4.0 + 2.0 * damped.beta[1] / (3.0 * damped.beta[0]);
        assert!((raw_damped - 4.0).abs() < (raw_free - 4.0).abs());
        assert!(!damped.b0_prime_clipped);
    }

    #[test]
    fn test_mgo_standard_errors_and_covariance() {
        let result = fit_bm3(&mgo(), &initial_guess(&mgo()), &FitOptions::default());
        assert!(result.converged);
        assert_eq!(result.covariance.nrows(), 2);
        assert_eq!(result.covariance_labels, vec![ParamName::B0, ParamName::B0Prime]);
        assert!(result.standard_errors.b0 >= 0.0);
        assert!(result.standard_errors.b0_prime >= 0.0);
        assert!(result.standard_errors.v0 >= 0.0);
        assert_eq!(result.residuals.len(), 6);
    }

    #[test]
    fn test_iteration_cap_returns_last_parameters() {
        let volumes: Vec<f64> = (0..8).map(|i| 40.0 * (0.97 - 0.12 * i as f64 / 7.0)).collect();
        let ds = bm3_dataset(40.0, 300.0, 3.5, volumes);
        let options = unregularized().with_max_outer_iterations(1);

        let result = fit_bm3(&ds, &initial_guess(&ds), &options);
        assert!(!result.converged);
        assert_eq!(result.status, FitStatus::MaxIterReached);
        assert_eq!(result.iterations_used, 1);
        assert!(result.has_parameters());
    }

    #[test]
    fn test_backend_trait_dispatch() {
        let backend: &dyn FitBackend = &TwoStageLinearFitter;
        assert_eq!(backend.method(), FitMethod::TwoStageLinear);
        let result = backend.fit(&mgo(), &initial_guess(&mgo()), &FitOptions::default());
        assert_eq!(result.method, FitMethod::TwoStageLinear);
    }
}
