//! # 初始参数估计
//!
//! 从数据的低压行为和压缩趋势给出物理上合理的起始值 (V0, B0, B0′)。
//!
//! ## 算法概述
//! 1. V0：取压力最低的两个（压力不同的）点做 V-P 线性外推到 P = 0，
//!    限制在 [max(V), 1.1·max(V)]
//! 2. B0：过原点拟合 P = B0·(V0 − V)/V0，限制在物理区间内
//! 3. B0′：文献典型值 4
//!
//! 不同体积少于两个时返回退化估计，而不是报错。
//!
//! ## 依赖关系
//! - 被 `eos/fitter.rs`, `eos/linear.rs` 调用
//! - 使用 `models/` 的 Dataset, EosParameters

use crate::models::{Dataset, EosParameters, EosType, PhysicalBounds};

const DEFAULT_B0: f64 = 150.0;
const DEFAULT_B0_PRIME: f64 = 4.0;
const MAX_V0_FACTOR: f64 = 1.1;

/// 估计 BM3 起始参数（不锁定任何参数）
pub fn initial_guess(dataset: &Dataset) -> EosParameters {
    let bounds = PhysicalBounds::default();

    if dataset.is_empty() {
        return EosParameters::new(EosType::Bm3, f64::NAN, DEFAULT_B0, DEFAULT_B0_PRIME);
    }

    let v_max = dataset.max_volume();

    if dataset.distinct_volumes() < 2 {
        return EosParameters::new(EosType::Bm3, v_max * 1.01, DEFAULT_B0, DEFAULT_B0_PRIME);
    }

    let v0 = estimate_v0(dataset);
    let b0 = estimate_b0(dataset, v0).clamp(bounds.b0.0, bounds.b0.1);

    EosParameters::new(EosType::Bm3, v0, b0, DEFAULT_B0_PRIME)
}

/// 低压外推 V0
fn estimate_v0(dataset: &Dataset) -> f64 {
    let v_max = dataset.max_volume();

    let mut by_pressure: Vec<_> = dataset.samples().to_vec();
    by_pressure.sort_by(|a, b| {
        a.pressure
            .partial_cmp(&b.pressure)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let lowest = by_pressure[0];
    let second = by_pressure
        .iter()
        .skip(1)
        .find(|s| (s.pressure - lowest.pressure).abs() > f64::EPSILON);

    let extrapolated = match second {
        Some(s) => {
            let slope = (s.volume - lowest.volume) / (s.pressure - lowest.pressure);
            lowest.volume - lowest.pressure * slope
        }
        None => v_max,
    };

    if extrapolated.is_finite() {
        extrapolated.clamp(v_max, v_max * MAX_V0_FACTOR)
    } else {
        v_max
    }
}

/// 由体积压缩率估计 B0 = ΣP·x / Σx²，x = (V0 − V)/V0
fn estimate_b0(dataset: &Dataset, v0: f64) -> f64 {
    let (num, den) = dataset
        .samples()
        .iter()
        .map(|s| ((v0 - s.volume) / v0, s.pressure))
        .filter(|(x, _)| *x > 0.0)
        .fold((0.0, 0.0), |(num, den), (x, p)| (num + p * x, den + x * x));

    if den > 0.0 && num > 0.0 {
        num / den
    } else {
        DEFAULT_B0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eos::pressure::pressure;

    fn mgo() -> Dataset {
        Dataset::from_columns(
            "mgo",
            &[74.68, 74.22, 73.48, 72.90, 72.28, 71.65],
            &[0.0, 2.01, 5.03, 7.49, 10.10, 12.84],
        )
        .unwrap()
    }

    #[test]
    fn test_v0_not_below_max_volume() {
        let guess = initial_guess(&mgo());
        assert!(guess.v0 >= 74.68);
        assert!(guess.v0 < 74.68 * 1.1);
        assert_eq!(guess.b0_prime, 4.0);
        assert_eq!(guess.eos_type, EosType::Bm3);
    }

    #[test]
    fn test_b0_within_physical_band() {
        let guess = initial_guess(&mgo());
        assert!(guess.b0 >= 20.0 && guess.b0 <= 800.0);
        // 该组数据 2 GPa 下压缩约 0.6%，B0 应在 300 GPa 量级
        assert!(guess.b0 > 200.0 && guess.b0 < 400.0);
    }

    #[test]
    fn test_extrapolates_v0_when_data_starts_compressed() {
        let truth = EosParameters::new(EosType::Bm3, 40.0, 120.0, 4.0);
        let volumes: Vec<f64> = (0..6).map(|i| 40.0 * (0.97 - 0.02 * i as f64)).collect();
        let pressures: Vec<f64> = volumes.iter().map(|&v| pressure(v, &truth)).collect();
        let ds = Dataset::from_columns("synthetic", &volumes, &pressures).unwrap();

        let guess = initial_guess(&ds);
        assert!(guess.v0 > ds.max_volume());
        assert!((guess.v0 - 40.0).abs() < 0.2);
    }

    #[test]
    fn test_degenerate_guess_for_single_volume() {
        let ds = Dataset::from_columns("flat", &[10.0, 10.0, 10.0], &[1.0, 2.0, 3.0]).unwrap();
        let guess = initial_guess(&ds);
        assert!((guess.v0 - 10.1).abs() < 1e-12);
        assert_eq!(guess.b0, 150.0);
        assert_eq!(guess.b0_prime, 4.0);
    }

    #[test]
    fn test_single_sample_does_not_panic() {
        let ds = Dataset::from_columns("one", &[10.0], &[0.0]).unwrap();
        let guess = initial_guess(&ds);
        assert!((guess.v0 - 10.1).abs() < 1e-12);
    }

    #[test]
    fn test_compressibility_clipped_to_band() {
        // 压力随压缩几乎不变 → B0 极小，被夹到下限
        let ds = Dataset::from_columns("soft", &[10.0, 9.0, 8.0], &[0.0, 0.01, 0.02]).unwrap();
        let guess = initial_guess(&ds);
        assert_eq!(guess.b0, 20.0);
    }
}
