//! # 状态方程参数模型
//!
//! 定义 EoS 类型、参数名、参数集以及拟合时的物理边界。
//!
//! ## 依赖关系
//! - 被 `eos/` 全部子模块使用
//! - 被 `cli/`, `commands/`, `report/` 使用

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// 状态方程形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EosType {
    Murnaghan,
    /// 二阶 Birch–Murnaghan（B0′ 固定为 4）
    Bm2,
    /// 三阶 Birch–Murnaghan
    Bm3,
    /// 四阶 Birch–Murnaghan
    Bm4,
    Vinet,
    /// 自然应变（Poirier–Tarantola 型）
    NaturalStrain,
}

impl EosType {
    pub const ALL: [EosType; 6] = [
        EosType::Murnaghan,
        EosType::Bm2,
        EosType::Bm3,
        EosType::Bm4,
        EosType::Vinet,
        EosType::NaturalStrain,
    ];

    /// 该形式实际使用的参数
    pub fn parameters(&self) -> &'static [ParamName] {
        match self {
            EosType::Bm2 => &[ParamName::V0, ParamName::B0],
            EosType::Bm4 => &[
                ParamName::V0,
                ParamName::B0,
                ParamName::B0Prime,
                ParamName::B0DoublePrime,
            ],
            EosType::Murnaghan | EosType::Bm3 | EosType::Vinet | EosType::NaturalStrain => {
                &[ParamName::V0, ParamName::B0, ParamName::B0Prime]
            }
        }
    }

    /// 拟合所需最少数据点
    pub fn min_samples(&self) -> usize {
        self.parameters().len().max(3)
    }

    pub fn uses(&self, name: ParamName) -> bool {
        self.parameters().contains(&name)
    }
}

impl fmt::Display for EosType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EosType::Murnaghan => write!(f, "Murnaghan"),
            EosType::Bm2 => write!(f, "BM2"),
            EosType::Bm3 => write!(f, "BM3"),
            EosType::Bm4 => write!(f, "BM4"),
            EosType::Vinet => write!(f, "Vinet"),
            EosType::NaturalStrain => write!(f, "Natural strain"),
        }
    }
}

/// 参数名
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ParamName {
    V0,
    B0,
    B0Prime,
    B0DoublePrime,
}

impl ParamName {
    /// 表格/报告里使用的符号
    pub fn symbol(&self) -> &'static str {
        match self {
            ParamName::V0 => "V0",
            ParamName::B0 => "B0",
            ParamName::B0Prime => "B0'",
            ParamName::B0DoublePrime => "B0''",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            ParamName::V0 => "Å³",
            ParamName::B0 => "GPa",
            ParamName::B0Prime => "",
            ParamName::B0DoublePrime => "GPa⁻¹",
        }
    }
}

impl fmt::Display for ParamName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for ParamName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "v0" => Ok(ParamName::V0),
            "b0" | "k0" => Ok(ParamName::B0),
            "b0p" | "b0'" | "k0p" | "k0'" | "b0_prime" => Ok(ParamName::B0Prime),
            "b0pp" | "b0''" | "k0pp" | "k0''" | "b0_double_prime" => {
                Ok(ParamName::B0DoublePrime)
            }
            other => Err(format!(
                "Unknown parameter '{}'. Use one of: v0, b0, b0p, b0pp",
                other
            )),
        }
    }
}

/// 状态方程参数集
///
/// 拟合器总是返回新的参数集，不会原地修改调用方持有的副本。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EosParameters {
    pub eos_type: EosType,
    /// 零压体积（Å³ / 化学式单元）
    pub v0: f64,
    /// 零压体模量（GPa）
    pub b0: f64,
    /// 体模量压力导数
    pub b0_prime: f64,
    /// 体模量二阶压力导数（GPa⁻¹），仅 BM4 使用
    pub b0_double_prime: f64,
    /// 调用方禁止拟合器改动的参数
    pub locked: BTreeSet<ParamName>,
}

impl EosParameters {
    pub fn new(eos_type: EosType, v0: f64, b0: f64, b0_prime: f64) -> Self {
        EosParameters {
            eos_type,
            v0,
            b0,
            b0_prime,
            b0_double_prime: implied_b0_double_prime(b0, b0_prime),
            locked: BTreeSet::new(),
        }
    }

    /// 全部为 NaN 的参数集，用于失败的拟合结果
    pub fn nan(eos_type: EosType) -> Self {
        EosParameters {
            eos_type,
            v0: f64::NAN,
            b0: f64::NAN,
            b0_prime: f64::NAN,
            b0_double_prime: f64::NAN,
            locked: BTreeSet::new(),
        }
    }

    pub fn with_eos_type(mut self, eos_type: EosType) -> Self {
        self.eos_type = eos_type;
        if eos_type == EosType::Bm2 {
            self.b0_prime = 4.0;
        }
        self
    }

    pub fn with_b0_double_prime(mut self, value: f64) -> Self {
        self.b0_double_prime = value;
        self
    }

    pub fn with_locked<I: IntoIterator<Item = ParamName>>(mut self, locked: I) -> Self {
        self.locked = locked.into_iter().collect();
        self
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

    pub fn is_locked(&self, name: ParamName) -> bool {
        self.locked.contains(&name)
    }

    /// 未锁定、且该 EoS 形式实际使用的参数（拟合自由度）
    pub fn free_parameters(&self) -> Vec<ParamName> {
        self.eos_type
            .parameters()
            .iter()
            .copied()
            .filter(|p| !self.is_locked(*p))
            .collect()
    }

    pub fn is_finite(&self) -> bool {
        self.eos_type
            .parameters()
            .iter()
            .all(|p| self.get(*p).is_finite())
    }
}

/// BM4 截断时隐含的 B0″ = −[(3−B0′)(4−B0′) + 35/9] / B0
pub fn implied_b0_double_prime(b0: f64, b0_prime: f64) -> f64 {
    if b0 == 0.0 {
        return 0.0;
    }
    -((3.0 - b0_prime) * (4.0 - b0_prime) + 35.0 / 9.0) / b0
}

/// 拟合时强制的物理边界
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhysicalBounds {
    pub b0: (f64, f64),
    pub b0_prime: (f64, f64),
    pub b0_double_prime: (f64, f64),
    /// V0 上限相对 max(V) 的倍数；下限恒为 max(V)
    pub v0_max_factor: f64,
}

impl Default for PhysicalBounds {
    fn default() -> Self {
        PhysicalBounds {
            b0: (20.0, 800.0),
            b0_prime: (2.0, 8.0),
            b0_double_prime: (-1.0, 1.0),
            v0_max_factor: 1.5,
        }
    }
}

impl PhysicalBounds {
    /// 参数的 [下限, 上限]；V0 的区间依赖数据中的最大体积
    pub fn range(&self, name: ParamName, max_volume: f64) -> (f64, f64) {
        match name {
            ParamName::V0 => (max_volume, max_volume * self.v0_max_factor),
            ParamName::B0 => self.b0,
            ParamName::B0Prime => self.b0_prime,
            ParamName::B0DoublePrime => self.b0_double_prime,
        }
    }

    pub fn clamp(&self, name: ParamName, value: f64, max_volume: f64) -> f64 {
        let (lo, hi) = self.range(name, max_volume);
        value.clamp(lo, hi)
    }

    /// 参数是否贴在边界上
    pub fn is_at_bound(&self, name: ParamName, value: f64, max_volume: f64) -> bool {
        let (lo, hi) = self.range(name, max_volume);
        let tol = 1e-9 * lo.abs().max(hi.abs()).max(1.0);
        (value - lo).abs() <= tol || (value - hi).abs() <= tol
    }
}
