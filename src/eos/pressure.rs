//! # 状态方程压力模型
//!
//! 纯函数：给定体积与参数计算压力，支持 Murnaghan、BM2/BM3/BM4、Vinet、
//! 自然应变六种形式。
//!
//! V ≤ 0 无定义，由数据集边界校验保证不会出现；V > V0 是合法的负压区间
//! （例如热膨胀数据），不得 panic。
//!
//! ## 参考
//! - Birch (1947), Phys. Rev. 71, 809
//! - Vinet et al. (1987), J. Geophys. Res. 92, 9319
//! - Angel et al. (2014), Z. Kristallogr. 229, 405 (EosFit7c)
//!
//! ## 依赖关系
//! - 被 `eos/` 其余子模块与 `report/` 使用
//! - 使用 `models/parameters.rs`

use crate::eos::strain::eulerian_strain;
use crate::models::{EosParameters, EosType};

/// 计算 P(V)，单位与 B0 相同（GPa）
pub fn pressure(volume: f64, params: &EosParameters) -> f64 {
    let v0 = params.v0;
    let b0 = params.b0;
    let bp = params.b0_prime;

    match params.eos_type {
        EosType::Murnaghan => b0 / bp * ((v0 / volume).powf(bp) - 1.0),
        EosType::Bm2 => {
            let f = eulerian_strain(volume, v0);
            3.0 * b0 * f * (1.0 + 2.0 * f).powf(2.5)
        }
        EosType::Bm3 => {
            let f = eulerian_strain(volume, v0);
            3.0 * b0 * f * (1.0 + 2.0 * f).powf(2.5) * (1.0 + 1.5 * (bp - 4.0) * f)
        }
        EosType::Bm4 => {
            let f = eulerian_strain(volume, v0);
            let c2 = 1.5 * (b0 * params.b0_double_prime + (bp - 4.0) * (bp - 3.0) + 35.0 / 9.0);
            3.0 * b0 * f * (1.0 + 2.0 * f).powf(2.5) * (1.0 + 1.5 * (bp - 4.0) * f + c2 * f * f)
        }
        EosType::Vinet => {
            let eta = (volume / v0).cbrt();
            3.0 * b0 * (1.0 - eta) / (eta * eta) * (1.5 * (bp - 1.0) * (1.0 - eta)).exp()
        }
        EosType::NaturalStrain => {
            let fn_ = (volume / v0).ln();
            -b0 * fn_ * (1.0 - 0.5 * (bp - 2.0) * fn_)
        }
    }
}

/// 对一组体积逐点计算压力
pub fn pressure_curve(volumes: &[f64], params: &EosParameters) -> Vec<f64> {
    volumes.iter().map(|&v| pressure(v, params)).collect()
}

/// 数值计算给定体积处的体模量 K = −V·dP/dV
pub fn bulk_modulus_at(volume: f64, params: &EosParameters) -> f64 {
    let h = volume * 1e-6;
    let dp_dv = (pressure(volume + h, params) - pressure(volume - h, params)) / (2.0 * h);
    -volume * dp_dv
}

/// 在 [v_min, v_max] 上均匀采样，返回 (V, P) 曲线
pub fn sample_curve(v_min: f64, v_max: f64, points: usize, params: &EosParameters) -> Vec<(f64, f64)> {
    let n = points.max(2);
    let step = (v_max - v_min) / (n - 1) as f64;
    (0..n)
        .map(|i| {
            let v = v_min + i as f64 * step;
            (v, pressure(v, params))
        })
        .collect()
}
