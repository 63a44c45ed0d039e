//! # V-P 数据集模型
//!
//! 一个数据集是同一物相的一组 (V, P) 观测点，保持输入顺序。
//! 只能通过带校验的构造函数创建，非物理输入（V ≤ 0、非有限值、长度不匹配）
//! 在边界处直接拒绝。
//!
//! ## 依赖关系
//! - 被 `parsers/`, `eos/`, `report/` 使用

use crate::error::{EosFitError, Result};

use serde::{Deserialize, Serialize};

/// 单个观测点
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// 体积（Å³ / 化学式单元或原子）
    pub volume: f64,
    /// 压力（GPa）
    pub pressure: f64,
    /// 压力不确定度（GPa），可选
    pub sigma: Option<f64>,
}

impl Sample {
    pub fn new(volume: f64, pressure: f64) -> Self {
        Sample {
            volume,
            pressure,
            sigma: None,
        }
    }

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = Some(sigma);
        self
    }

    /// 非线性拟合权重 1/σ²，无 σ 时为 1
    pub fn weight(&self) -> f64 {
        match self.sigma {
            Some(s) => 1.0 / (s * s),
            None => 1.0,
        }
    }
}

/// V-P 数据集
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    /// 数据集名称（通常为文件名）
    pub name: String,
    samples: Vec<Sample>,
}

impl Dataset {
    /// 从观测点列表创建，校验每个点
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Result<Self> {
        for (i, s) in samples.iter().enumerate() {
            if !s.volume.is_finite() || !s.pressure.is_finite() {
                return Err(EosFitError::InvalidInput(format!(
                    "sample {} has a non-finite value (V = {}, P = {})",
                    i + 1,
                    s.volume,
                    s.pressure
                )));
            }
            if s.volume <= 0.0 {
                return Err(EosFitError::InvalidInput(format!(
                    "sample {} has non-positive volume V = {}",
                    i + 1,
                    s.volume
                )));
            }
            if let Some(sigma) = s.sigma {
                if !sigma.is_finite() || sigma <= 0.0 {
                    return Err(EosFitError::InvalidInput(format!(
                        "sample {} has invalid pressure uncertainty {}",
                        i + 1,
                        sigma
                    )));
                }
            }
        }

        Ok(Dataset {
            name: name.into(),
            samples,
        })
    }

    /// 从两列等长数组创建
    pub fn from_columns(name: impl Into<String>, volumes: &[f64], pressures: &[f64]) -> Result<Self> {
        if volumes.len() != pressures.len() {
            return Err(EosFitError::InvalidInput(format!(
                "volume and pressure columns differ in length ({} vs {})",
                volumes.len(),
                pressures.len()
            )));
        }

        let samples = volumes
            .iter()
            .zip(pressures)
            .map(|(&v, &p)| Sample::new(v, p))
            .collect();

        Dataset::new(name, samples)
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.volume).collect()
    }

    pub fn pressures(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.pressure).collect()
    }

    pub fn weights(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.weight()).collect()
    }

    pub fn max_volume(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.volume)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    pub fn min_volume(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.volume)
            .fold(f64::INFINITY, f64::min)
    }

    pub fn max_pressure(&self) -> f64 {
        self.samples
            .iter()
            .map(|s| s.pressure)
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// 不同体积值的个数（相对容差 1e-12）
    pub fn distinct_volumes(&self) -> usize {
        let mut volumes = self.volumes();
        volumes.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        volumes.dedup_by(|a, b| (*a - *b).abs() <= 1e-12 * b.abs());
        volumes.len()
    }

    /// 所有点都有 σ 时返回 true
    pub fn has_uncertainties(&self) -> bool {
        !self.samples.is_empty() && self.samples.iter().all(|s| s.sigma.is_some())
    }

    /// 返回压力换算后的新数据集（例如 kbar → GPa 传入 0.1）
    pub fn scaled_pressures(&self, factor: f64) -> Dataset {
        Dataset {
            name: self.name.clone(),
            samples: self
                .samples
                .iter()
                .map(|s| Sample {
                    volume: s.volume,
                    pressure: s.pressure * factor,
                    sigma: s.sigma.map(|sig| sig * factor.abs()),
                })
                .collect(),
        }
    }
}
