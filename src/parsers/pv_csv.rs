//! # CSV 格式 V-P 数据解析器
//!
//! ```text
//! volume,pressure,sigma
//! 74.68,0.00,0.05
//! 74.22,2.01,0.05
//! ```
//!
//! 列名不区分大小写，`V`/`P` 缩写也可；`sigma` 列可省略或留空。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 使用
//! - 使用 `csv` + `serde` 反序列化记录

use crate::error::{EosFitError, Result};
use crate::models::{Dataset, Sample};
use serde::Deserialize;
use std::path::Path;

/// 一行记录
#[derive(Debug, Deserialize)]
struct PvRecord {
    #[serde(alias = "v", alias = "V", alias = "Volume", alias = "VOLUME")]
    volume: f64,
    #[serde(alias = "p", alias = "P", alias = "Pressure", alias = "PRESSURE")]
    pressure: f64,
    #[serde(default, alias = "sigma_p", alias = "Sigma", alias = "SIGMA", alias = "sigma_P")]
    sigma: Option<f64>,
}

/// 解析 CSV 文件
pub fn parse_csv_file(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path).map_err(|e| EosFitError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_csv_content(&content, &super::dataset_name(path), &path.display().to_string())
}

/// 从字符串内容解析 CSV
pub fn parse_csv_content(content: &str, name: &str, source: &str) -> Result<Dataset> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(content.as_bytes());

    let mut samples = Vec::new();
    for (i, record) in reader.deserialize::<PvRecord>().enumerate() {
        let record = record.map_err(|e| EosFitError::ParseError {
            format: "CSV".to_string(),
            path: source.to_string(),
            reason: format!("row {}: {}", i + 1, e),
        })?;

        let sample = Sample::new(record.volume, record.pressure);
        samples.push(match record.sigma {
            Some(sigma) => sample.with_sigma(sigma),
            None => sample,
        });
    }

    if samples.is_empty() {
        return Err(EosFitError::ParseError {
            format: "CSV".to_string(),
            path: source.to_string(),
            reason: "no data rows".to_string(),
        });
    }

    Dataset::new(name, samples)
}
