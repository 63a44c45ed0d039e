//! # 解析器模块
//!
//! 读取 V-P 数据文件，生成经过校验的 `Dataset`。
//!
//! ## 支持的格式
//! - `.csv`：带表头，列名 `volume`/`V`、`pressure`/`P`，可选 `sigma`/`sigma_p`
//! - `.dat` / `.xy` / `.txt`：空白、逗号或分号分隔的两到三列数值，`#` 开头为注释
//!
//! ## 依赖关系
//! - 被 `commands/` 模块使用
//! - 使用 `models/dataset.rs`
//! - 子模块: pv_csv, pv_dat

pub mod pv_csv;
pub mod pv_dat;

use crate::error::{EosFitError, Result};
use crate::models::Dataset;
use std::path::Path;

/// 支持的数据文件扩展名
pub const SUPPORTED_EXTENSIONS: &[&str] = &["csv", "dat", "xy", "txt"];

/// 从文件路径推断格式并解析
pub fn parse_pv_file(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(EosFitError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => pv_csv::parse_csv_file(path),
        "dat" | "xy" | "txt" => pv_dat::parse_dat_file(path),
        _ => Err(EosFitError::ParseError {
            format: "V-P".to_string(),
            path: path.display().to_string(),
            reason: format!(
                "Unsupported extension '{}', expected one of: {}",
                ext,
                SUPPORTED_EXTENSIONS.join(", ")
            ),
        }),
    }
}

/// 文件名（不含扩展名）作为数据集名称
pub(crate) fn dataset_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("unknown")
        .to_string()
}
