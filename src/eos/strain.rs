//! # F–f 应变-应力变换
//!
//! 把 (V, P) 观测转换为 Euler 有限应变 f 与归一化应力 F：
//!
//! ```text
//! f = 0.5·[(V0/V)^(2/3) − 1]
//! F = P / [3f(1+2f)^2.5]
//! ```
//!
//! 对 BM3，F = B0 + 1.5·B0·(B0′−4)·f，对 f 线性。
//! f 接近零时分母趋于零，此时 F 记为 0 并由拟合器赋零权重，不产生 inf/NaN。
//! 输出与输入等长同序，不做任何过滤。
//!
//! ## 依赖关系
//! - 被 `eos/linear.rs`, `eos/pressure.rs`, `report/plot.rs` 使用

/// |f| 不超过此值视为零应变
pub const DEGENERATE_STRAIN: f64 = 1e-10;

/// Euler 有限应变
pub fn eulerian_strain(volume: f64, v0: f64) -> f64 {
    0.5 * ((v0 / volume).powf(2.0 / 3.0) - 1.0)
}

pub fn is_degenerate_strain(f: f64) -> bool {
    f.abs() <= DEGENERATE_STRAIN
}

/// 归一化应力；零应变时返回 0
pub fn normalized_stress(pressure: f64, f: f64) -> f64 {
    if is_degenerate_strain(f) {
        return 0.0;
    }
    pressure / (3.0 * f * (1.0 + 2.0 * f).powf(2.5))
}

/// 对整组数据做 F–f 变换
pub fn transform(volumes: &[f64], pressures: &[f64], v0: f64) -> (Vec<f64>, Vec<f64>) {
    volumes
        .iter()
        .zip(pressures)
        .map(|(&v, &p)| {
            let f = eulerian_strain(v, v0);
            (f, normalized_stress(p, f))
        })
        .unzip()
}
