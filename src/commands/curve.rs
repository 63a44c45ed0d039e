//! # curve 命令实现
//!
//! 按给定参数在体积区间上计算 P(V)，写出 CSV 或 XY。
//!
//! ## 依赖关系
//! - 使用 `cli/curve.rs` 定义的 CurveArgs
//! - 使用 `eos/pressure.rs`, `report/export.rs`

use crate::cli::curve::CurveArgs;
use crate::eos::{bulk_modulus_at, pressure, sample_curve};
use crate::error::{EosFitError, Result};
use crate::models::{EosParameters, EosType};
use crate::report;
use crate::utils::output;

use regex::Regex;

/// 执行 curve 命令
pub fn execute(args: CurveArgs) -> Result<()> {
    output::print_header("Equation of State Curve");

    let (v_min, v_max) = parse_volume_range(&args.range)?;

    if !(args.v0.is_finite() && args.v0 > 0.0) {
        return Err(EosFitError::InvalidArgument(format!(
            "--v0 must be positive, got {}",
            args.v0
        )));
    }
    if !(args.b0.is_finite() && args.b0 > 0.0) {
        return Err(EosFitError::InvalidArgument(format!(
            "--b0 must be positive, got {}",
            args.b0
        )));
    }
    if args.points < 2 {
        return Err(EosFitError::InvalidArgument(
            "--points must be at least 2".to_string(),
        ));
    }

    let eos_type: EosType = args.eos.into();
    let mut params =
        EosParameters::new(eos_type, args.v0, args.b0, args.b0_prime).with_eos_type(eos_type);
    if let Some(value) = args.b0_double_prime {
        params = params.with_b0_double_prime(value);
    }

    output::print_info(&format!(
        "{}: V0 = {:.4} Å³, B0 = {:.2} GPa, B0' = {:.3}",
        eos_type, params.v0, params.b0, params.b0_prime
    ));

    let points = sample_curve(v_min, v_max, args.points, &params);

    output::print_kv("P(V min)", &format!("{:.4} GPa", pressure(v_min, &params)));
    output::print_kv("P(V max)", &format!("{:.4} GPa", pressure(v_max, &params)));
    output::print_kv("K(V min)", &format!("{:.2} GPa", bulk_modulus_at(v_min, &params)));

    report::write_curve(&points, &params, &args.output)?;
    output::print_written("curve", &args.output);

    Ok(())
}

/// 解析体积区间 "VMIN-VMAX"（也接受 "VMIN:VMAX"）
fn parse_volume_range(range: &str) -> Result<(f64, f64)> {
    let re = Regex::new(r"^\s*([0-9]*\.?[0-9]+)\s*[-:]\s*([0-9]*\.?[0-9]+)\s*$")
        .map_err(|e| EosFitError::Other(e.to_string()))?;

    let caps = re
        .captures(range)
        .ok_or_else(|| EosFitError::InvalidRange(range.to_string()))?;

    let min: f64 = caps[1]
        .parse()
        .map_err(|_| EosFitError::InvalidRange(range.to_string()))?;
    let max: f64 = caps[2]
        .parse()
        .map_err(|_| EosFitError::InvalidRange(range.to_string()))?;

    if min <= 0.0 || max <= min {
        return Err(EosFitError::InvalidRange(format!(
            "{} (must be 0 < min < max)",
            range
        )));
    }

    Ok((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::fit::EosChoice;
    use std::fs;

    #[test]
    fn test_parse_volume_range() {
        assert_eq!(parse_volume_range("60-75").unwrap(), (60.0, 75.0));
        assert_eq!(parse_volume_range(" 60.5 : 74.7 ").unwrap(), (60.5, 74.7));
        assert!(matches!(
            parse_volume_range("75-60"),
            Err(EosFitError::InvalidRange(_))
        ));
        assert!(parse_volume_range("0-10").is_err());
        assert!(parse_volume_range("abc").is_err());
    }

    #[test]
    fn test_execute_writes_curve() {
        let dir = std::env::temp_dir().join("eosfit_curve_command");
        fs::create_dir_all(&dir).unwrap();
        let output_path = dir.join("curve.csv");

        let args = CurveArgs {
            eos: EosChoice::Vinet,
            v0: 40.0,
            b0: 120.0,
            b0_prime: 5.0,
            b0_double_prime: None,
            range: "32-40".to_string(),
            points: 9,
            output: output_path.clone(),
        };
        execute(args).unwrap();

        let content = fs::read_to_string(&output_path).unwrap();
        assert_eq!(content.lines().count(), 10);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_rejects_non_positive_b0() {
        let args = CurveArgs {
            eos: EosChoice::Bm3,
            v0: 40.0,
            b0: -1.0,
            b0_prime: 4.0,
            b0_double_prime: None,
            range: "32-40".to_string(),
            points: 9,
            output: std::env::temp_dir().join("eosfit_never_written.csv"),
        };
        assert!(matches!(execute(args), Err(EosFitError::InvalidArgument(_))));
    }
}
