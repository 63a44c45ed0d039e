//! # fit 子命令 CLI 定义
//!
//! 也定义了 `batch`、`curve` 共用的 EoS 选择、参数锁定与拟合调优参数。
//!
//! ## 依赖关系
//! - 被 `cli/mod.rs`, `cli/batch.rs`, `cli/curve.rs` 使用
//! - 参数传递给 `commands/fit.rs`

use crate::eos::options::{
    FitOptions, DEFAULT_MAX_OUTER_ITERATIONS, DEFAULT_REGULARIZATION, DEFAULT_TOLERANCE,
};
use crate::error::{EosFitError, Result};
use crate::models::{EosParameters, EosType, ParamName};

use clap::{Args, ValueEnum};
use std::path::PathBuf;

// ─────────────────────────────────────────────────────────────
// 共用参数类型
// ─────────────────────────────────────────────────────────────

/// EoS 形式
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum EosChoice {
    /// Murnaghan
    Murnaghan,
    /// 2nd-order Birch-Murnaghan (B0' = 4)
    Bm2,
    /// 3rd-order Birch-Murnaghan
    #[default]
    Bm3,
    /// 4th-order Birch-Murnaghan
    Bm4,
    /// Vinet
    Vinet,
    /// Natural (Hencky) strain
    NaturalStrain,
}

impl From<EosChoice> for EosType {
    fn from(choice: EosChoice) -> Self {
        match choice {
            EosChoice::Murnaghan => EosType::Murnaghan,
            EosChoice::Bm2 => EosType::Bm2,
            EosChoice::Bm3 => EosType::Bm3,
            EosChoice::Bm4 => EosType::Bm4,
            EosChoice::Vinet => EosType::Vinet,
            EosChoice::NaturalStrain => EosType::NaturalStrain,
        }
    }
}

/// 输入文件的压力单位
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq, Default)]
pub enum PressureUnit {
    /// GPa
    #[default]
    Gpa,
    /// kbar (0.1 GPa)
    Kbar,
}

impl PressureUnit {
    /// 换算到 GPa 的系数
    pub fn to_gpa(&self) -> f64 {
        match self {
            PressureUnit::Gpa => 1.0,
            PressureUnit::Kbar => 0.1,
        }
    }
}

impl std::fmt::Display for PressureUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PressureUnit::Gpa => write!(f, "GPa"),
            PressureUnit::Kbar => write!(f, "kbar"),
        }
    }
}

/// `--lock NAME[=VALUE]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LockSpec {
    pub name: ParamName,
    pub value: Option<f64>,
}

/// 解析 `NAME` 或 `NAME=VALUE`
pub fn parse_lock(input: &str) -> std::result::Result<LockSpec, String> {
    let (name, value) = match input.split_once('=') {
        Some((name, value)) => {
            let value: f64 = value
                .trim()
                .parse()
                .map_err(|_| format!("Invalid value in lock '{}'", input))?;
            (name, Some(value))
        }
        None => (input, None),
    };

    let name = name.parse::<ParamName>()?;
    Ok(LockSpec { name, value })
}

/// EoS 形式、锁定参数与起始值
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// Equation-of-state form
    #[arg(long, value_enum, default_value = "bm3")]
    pub eos: EosChoice,

    /// Hold a parameter fixed: NAME or NAME=VALUE (v0, b0, b0p, b0pp), repeatable
    #[arg(long, value_parser = parse_lock)]
    pub lock: Vec<LockSpec>,

    /// Starting value for V0 (Å³)
    #[arg(long)]
    pub v0: Option<f64>,

    /// Starting value for B0 (GPa)
    #[arg(long)]
    pub b0: Option<f64>,

    /// Starting value for B0'
    #[arg(long)]
    pub b0_prime: Option<f64>,

    /// Starting value for B0'' (GPa⁻¹, BM4 only)
    #[arg(long)]
    pub b0_double_prime: Option<f64>,
}

impl ModelArgs {
    pub fn eos_type(&self) -> EosType {
        self.eos.into()
    }

    pub fn locked_names(&self) -> Vec<ParamName> {
        self.lock.iter().map(|l| l.name).collect()
    }

    /// 用户给出的起始参数；未给出的项为 NaN，由拟合器估计补齐
    pub fn seed(&self) -> Option<EosParameters> {
        let mut seed = EosParameters::new(
            self.eos_type(),
            self.v0.unwrap_or(f64::NAN),
            self.b0.unwrap_or(f64::NAN),
            self.b0_prime.unwrap_or(f64::NAN),
        )
        .with_b0_double_prime(self.b0_double_prime.unwrap_or(f64::NAN));

        let mut any = self.v0.is_some()
            || self.b0.is_some()
            || self.b0_prime.is_some()
            || self.b0_double_prime.is_some();

        // 锁定值优先于起始值
        for lock in &self.lock {
            if let Some(value) = lock.value {
                seed.set(lock.name, value);
                any = true;
            }
        }

        any.then_some(seed)
    }
}

/// 拟合调优参数
#[derive(Args, Debug, Clone)]
pub struct FitTuning {
    /// Regularization strength: prior precision pulling B0' towards 4 (0 disables it)
    #[arg(long, env = "EOSFIT_REGULARIZATION", default_value_t = DEFAULT_REGULARIZATION)]
    pub regularization: f64,

    /// Maximum number of outer (V0) iterations
    #[arg(long = "max-iter", env = "EOSFIT_MAX_ITER", default_value_t = DEFAULT_MAX_OUTER_ITERATIONS)]
    pub max_iter: usize,

    /// Convergence tolerance (relative for V0, absolute for B0')
    #[arg(long, env = "EOSFIT_TOLERANCE", default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: f64,
}

impl FitTuning {
    pub fn to_options(&self) -> Result<FitOptions> {
        if !self.regularization.is_finite() || self.regularization < 0.0 {
            return Err(EosFitError::InvalidArgument(format!(
                "--regularization must be >= 0, got {}",
                self.regularization
            )));
        }
        if !self.tolerance.is_finite() || self.tolerance <= 0.0 {
            return Err(EosFitError::InvalidArgument(format!(
                "--tolerance must be > 0, got {}",
                self.tolerance
            )));
        }
        if self.max_iter == 0 {
            return Err(EosFitError::InvalidArgument(
                "--max-iter must be at least 1".to_string(),
            ));
        }

        Ok(FitOptions::default()
            .with_regularization(self.regularization)
            .with_max_outer_iterations(self.max_iter)
            .with_tolerance(self.tolerance))
    }
}

// ─────────────────────────────────────────────────────────────
// fit 子命令
// ─────────────────────────────────────────────────────────────

/// fit 子命令参数
#[derive(Args, Debug)]
pub struct FitArgs {
    /// Input P-V data file (.csv, .dat, .xy, .txt)
    pub input: PathBuf,

    #[command(flatten)]
    pub model: ModelArgs,

    #[command(flatten)]
    pub tuning: FitTuning,

    /// Pressure unit used in the input file
    #[arg(long, value_enum, default_value = "gpa")]
    pub pressure_unit: PressureUnit,

    /// Write a fit report (CSV)
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Write per-point residuals (CSV)
    #[arg(long)]
    pub residuals: Option<PathBuf>,

    /// Plot data and fitted curve (PNG or SVG, by extension)
    #[arg(long)]
    pub plot: Option<PathBuf>,

    /// Plot normalized stress against Eulerian strain (PNG or SVG)
    #[arg(long)]
    pub ff_plot: Option<PathBuf>,

    /// Write the fitted P(V) curve (CSV or XY, by extension)
    #[arg(long)]
    pub curve: Option<PathBuf>,

    /// Number of points on the exported curve
    #[arg(long, default_value_t = 200)]
    pub curve_points: usize,

    /// Figure width in pixels (for PNG) or points (for SVG)
    #[arg(long, default_value_t = 1200)]
    pub width: u32,

    /// Figure height in pixels (for PNG) or points (for SVG)
    #[arg(long, default_value_t = 800)]
    pub height: u32,

    /// Title for the plots (default: data file name)
    #[arg(long)]
    pub title: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lock() {
        assert_eq!(
            parse_lock("b0p").unwrap(),
            LockSpec {
                name: ParamName::B0Prime,
                value: None
            }
        );
        assert_eq!(parse_lock("V0=74.7").unwrap().value, Some(74.7));
        assert!(parse_lock("b0=abc").is_err());
        assert!(parse_lock("c11=3").is_err());
    }

    #[test]
    fn test_seed_prefers_lock_values() {
        let model = ModelArgs {
            eos: EosChoice::Bm3,
            lock: vec![parse_lock("b0p=4.5").unwrap()],
            v0: None,
            b0: Some(200.0),
            b0_prime: Some(3.0),
            b0_double_prime: None,
        };
        let seed = model.seed().unwrap();
        assert_eq!(seed.b0_prime, 4.5);
        assert_eq!(seed.b0, 200.0);
        assert!(seed.v0.is_nan());
        assert_eq!(model.locked_names(), vec![ParamName::B0Prime]);
    }

    #[test]
    fn test_no_seed_without_values() {
        let model = ModelArgs {
            eos: EosChoice::Vinet,
            lock: vec![parse_lock("b0p").unwrap()],
            v0: None,
            b0: None,
            b0_prime: None,
            b0_double_prime: None,
        };
        assert!(model.seed().is_none());
        assert_eq!(model.eos_type(), EosType::Vinet);
    }

    #[test]
    fn test_tuning_validation() {
        let tuning = FitTuning {
            regularization: -1.0,
            max_iter: 10,
            tolerance: 1e-6,
        };
        assert!(matches!(tuning.to_options(), Err(EosFitError::InvalidArgument(_))));

        let tuning = FitTuning {
            regularization: 0.0,
            max_iter: 5,
            tolerance: 1e-8,
        };
        let options = tuning.to_options().unwrap();
        assert_eq!(options.regularization_strength, 0.0);
        assert_eq!(options.max_outer_iterations, 5);
    }

    #[test]
    fn test_pressure_unit_factor() {
        assert_eq!(PressureUnit::Gpa.to_gpa(), 1.0);
        assert_eq!(PressureUnit::Kbar.to_gpa(), 0.1);
    }
}
