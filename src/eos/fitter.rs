//! # 拟合调度
//!
//! 根据 EoS 形式与锁定参数选择拟合后端：
//!
//! | EoS | 锁定为空 | 后端 |
//! |---|---|---|
//! | BM3 | 是 | 两阶段 F–f 线性拟合；得到 NaN 时退回非线性 |
//! | BM3 | 否 | 非线性，锁定参数固定 |
//! | 其他 | 任意 | 非线性，只拟合未锁定参数 |
//!
//! 非线性路径未收敛时做一次确定性的扰动重启，返回收敛的那次或 χ² 更小的那次。
//!
//! ## 依赖关系
//! - 被 `commands/fit.rs`, `commands/batch.rs` 调用
//! - 使用 `eos/linear.rs`, `eos/nonlinear.rs`, `eos/estimator.rs`

use crate::eos::estimator::initial_guess;
use crate::eos::linear::TwoStageLinearFitter;
use crate::eos::nonlinear::NonlinearFitter;
use crate::eos::options::FitOptions;
use crate::eos::FitBackend;
use crate::error::Result;
use crate::models::{
    implied_b0_double_prime, Dataset, EosParameters, EosType, FitMethod, FitResult, FitStatus,
    ParamName,
};

/// 重启时 B0′ 的起始值
const RESTART_B0_PRIME: f64 = 5.0;

/// 按决策表选择拟合方法
///
/// 只考虑该 EoS 形式实际使用的参数，例如 BM3 锁定 B0″ 不影响选择。
pub fn select_strategy(eos_type: EosType, locked: &[ParamName]) -> FitMethod {
    let any_locked = locked.iter().any(|p| eos_type.uses(*p));
    if eos_type == EosType::Bm3 && !any_locked {
        FitMethod::TwoStageLinear
    } else {
        FitMethod::Nonlinear
    }
}

/// 拟合方法对应的后端
pub fn backend(method: FitMethod) -> &'static dyn FitBackend {
    match method {
        FitMethod::TwoStageLinear => &TwoStageLinearFitter,
        FitMethod::Nonlinear => &NonlinearFitter,
    }
}

/// 拟合一个数据集
///
/// `initial` 为调用方提供的起始参数（锁定参数的取值也从这里读取）；
/// 为 `None` 时由数据估计。调用方的参数不会被修改。
pub fn fit(
    dataset: &Dataset,
    eos_type: EosType,
    locked: &[ParamName],
    initial: Option<&EosParameters>,
    options: &FitOptions,
) -> FitResult {
    let method = select_strategy(eos_type, locked);

    if dataset.len() < eos_type.min_samples() {
        return FitResult::failed(eos_type, method, FitStatus::InsufficientData);
    }

    let seed = build_seed(dataset, eos_type, locked, initial, options);

    match method {
        FitMethod::TwoStageLinear => {
            let result = backend(method).fit(dataset, &seed, options);
            if result.has_parameters() {
                result
            } else {
                fit_with_restart(dataset, &seed, options)
            }
        }
        FitMethod::Nonlinear => fit_with_restart(dataset, &seed, options),
    }
}

/// 直接从两列数值拟合，输入不合法时返回 `InvalidInput`
pub fn fit_columns(
    volumes: &[f64],
    pressures: &[f64],
    eos_type: EosType,
    locked: &[ParamName],
    initial: Option<&EosParameters>,
    options: &FitOptions,
) -> Result<FitResult> {
    let dataset = Dataset::from_columns("columns", volumes, pressures)?;
    Ok(fit(&dataset, eos_type, locked, initial, options))
}

/// 组装起始参数：转换 EoS 形式、设置锁定集合、把自由参数投影进物理边界
fn build_seed(
    dataset: &Dataset,
    eos_type: EosType,
    locked: &[ParamName],
    initial: Option<&EosParameters>,
    options: &FitOptions,
) -> EosParameters {
    let estimated = initial_guess(dataset);
    let base = match initial {
        Some(params) => {
            let mut params = params.clone();
            // 调用方未给出的值用估计值补齐
            for name in [ParamName::V0, ParamName::B0, ParamName::B0Prime] {
                if !params.get(name).is_finite() {
                    params.set(name, estimated.get(name));
                }
            }
            if !params.b0_double_prime.is_finite() {
                params.b0_double_prime =
                    implied_b0_double_prime(params.b0, params.b0_prime);
            }
            params
        }
        None => estimated,
    };

    let locked: Vec<ParamName> = locked.iter().copied().filter(|p| eos_type.uses(*p)).collect();
    let mut seed = base.with_eos_type(eos_type).with_locked(locked);

    let max_volume = dataset.max_volume();
    for name in seed.free_parameters() {
        let value = options.bounds.clamp(name, seed.get(name), max_volume);
        seed.set(name, value);
    }

    seed
}

/// 扰动后的起点：V0·1.01、B0·0.8，B0′ 未锁定时取 5
fn perturbed_seed(seed: &EosParameters, options: &FitOptions, max_volume: f64) -> EosParameters {
    let mut restart = seed.clone();
    let adjustments = [
        (ParamName::V0, seed.v0 * 1.01),
        (ParamName::B0, seed.b0 * 0.8),
        (ParamName::B0Prime, RESTART_B0_PRIME),
    ];
    for (name, value) in adjustments {
        if seed.eos_type.uses(name) && !seed.is_locked(name) {
            restart.set(name, options.bounds.clamp(name, value, max_volume));
        }
    }
    restart
}

/// 非线性拟合，未收敛时做一次扰动重启
fn fit_with_restart(dataset: &Dataset, seed: &EosParameters, options: &FitOptions) -> FitResult {
    let nonlinear = backend(FitMethod::Nonlinear);
    let first = nonlinear.fit(dataset, seed, options);
    if first.converged {
        return first;
    }

    let retry_seed = perturbed_seed(seed, options, dataset.max_volume());
    let mut second = nonlinear.fit(dataset, &retry_seed, options);

    let pick_second = if second.converged {
        true
    } else if !first.has_parameters() {
        second.has_parameters()
    } else {
        second.has_parameters() && second.chi_square < first.chi_square
    };

    if pick_second {
        second.restarts = 1;
        second
    } else {
        let mut first = first;
        first.restarts = 1;
        first
    }
}
