//! # 拟合结果导出
//!
//! ## 支持格式
//! - 拟合报告 CSV：每个参数一行（值、标准误差、是否锁定、是否贴边），后接拟合优度
//! - 残差 CSV：V, P_obs, P_model, P_obs − P_model
//! - 曲线 CSV / XY：模型 P(V)
//! - 批量汇总 CSV：每个文件一行
//!
//! ## 依赖关系
//! - 被 `commands/fit.rs`, `commands/batch.rs`, `commands/curve.rs` 调用
//! - 使用 `csv` + `serde` 写入 CSV 文件

use crate::error::{EosFitError, Result};
use crate::models::{EosParameters, FitResult};

use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

fn write_error(path: &Path, e: std::io::Error) -> EosFitError {
    EosFitError::FileWriteError {
        path: path.display().to_string(),
        source: e,
    }
}

/// 导出拟合报告
pub fn write_fit_report(result: &FitResult, dataset_name: &str, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record(["quantity", "value", "std_error", "unit", "note"])?;

    let params = &result.parameters;
    for &name in params.eos_type.parameters() {
        let note = if params.is_locked(name) {
            "locked"
        } else if result.constrained.contains(&name) {
            "at bound"
        } else {
            ""
        };
        wtr.write_record([
            name.to_string(),
            format!("{:.6}", params.get(name)),
            format!("{:.6}", result.standard_errors.get(name)),
            name.unit().to_string(),
            note.to_string(),
        ])?;
    }

    let rows = [
        ("dataset", dataset_name.to_string()),
        ("eos", params.eos_type.to_string()),
        ("method", result.method.to_string()),
        ("status", result.status.to_string()),
        ("converged", result.converged.to_string()),
        ("iterations", result.iterations_used.to_string()),
        ("restarts", result.restarts.to_string()),
        ("r_squared", format!("{:.8}", result.r_squared)),
        ("rmse", format!("{:.6}", result.rmse)),
        ("chi_square", format!("{:.6}", result.chi_square)),
    ];
    for (key, value) in rows {
        wtr.write_record([key, value.as_str(), "", "", ""])?;
    }

    wtr.flush().map_err(|e| write_error(output_path, e))?;
    Ok(())
}

/// 导出逐点残差
pub fn residuals_to_csv(result: &FitResult, output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record(["volume", "pressure_obs", "pressure_model", "residual"])?;
    for r in &result.residuals {
        wtr.write_record([
            format!("{:.6}", r.volume),
            format!("{:.6}", r.pressure_observed),
            format!("{:.6}", r.pressure_model),
            format!("{:.6}", r.residual),
        ])?;
    }

    wtr.flush().map_err(|e| write_error(output_path, e))?;
    Ok(())
}

/// 导出模型曲线为 CSV
pub fn curve_to_csv(points: &[(f64, f64)], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;

    wtr.write_record(["volume", "pressure"])?;
    for (v, p) in points {
        wtr.write_record([format!("{:.6}", v), format!("{:.6}", p)])?;
    }

    wtr.flush().map_err(|e| write_error(output_path, e))?;
    Ok(())
}

/// 导出模型曲线为 XY（带 `#` 注释头）
pub fn curve_to_xy(points: &[(f64, f64)], params: &EosParameters, output_path: &Path) -> Result<()> {
    let file = File::create(output_path).map_err(|e| write_error(output_path, e))?;
    let mut out = BufWriter::new(file);

    let mut body = String::new();
    body.push_str(&format!("# EoS: {}\n", params.eos_type));
    for &name in params.eos_type.parameters() {
        body.push_str(&format!("# {} = {:.6} {}\n", name, params.get(name), name.unit()));
    }
    body.push_str("# Columns: V (A^3), P (GPa)\n");
    for (v, p) in points {
        body.push_str(&format!("{:.6}\t{:.6}\n", v, p));
    }

    out.write_all(body.as_bytes())
        .and_then(|_| out.flush())
        .map_err(|e| write_error(output_path, e))
}

/// 按扩展名写曲线：`.xy`/`.dat`/`.txt` 为 XY，其余为 CSV
pub fn write_curve(points: &[(f64, f64)], params: &EosParameters, output_path: &Path) -> Result<()> {
    let ext = output_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s| s.to_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "xy" | "dat" | "txt" => curve_to_xy(points, params, output_path),
        _ => curve_to_csv(points, output_path),
    }
}

/// 批量拟合汇总的一行
#[derive(Debug, Clone, Serialize)]
pub struct SummaryRow {
    pub file: String,
    pub eos: String,
    pub method: String,
    pub status: String,
    pub converged: bool,
    pub v0: f64,
    pub v0_err: f64,
    pub b0: f64,
    pub b0_err: f64,
    pub b0_prime: f64,
    pub b0_prime_err: f64,
    pub r_squared: f64,
    pub rmse: f64,
    pub chi_square: f64,
    /// 贴边参数，分号分隔
    pub constrained: String,
}

impl SummaryRow {
    pub fn from_result(file: &str, result: &FitResult) -> Self {
        let p = &result.parameters;
        let se = &result.standard_errors;
        SummaryRow {
            file: file.to_string(),
            eos: p.eos_type.to_string(),
            method: result.method.to_string(),
            status: result.status.to_string(),
            converged: result.converged,
            v0: p.v0,
            v0_err: se.v0,
            b0: p.b0,
            b0_err: se.b0,
            b0_prime: p.b0_prime,
            b0_prime_err: se.b0_prime,
            r_squared: result.r_squared,
            rmse: result.rmse,
            chi_square: result.chi_square,
            constrained: result
                .constrained
                .iter()
                .map(|p| p.to_string())
                .collect::<Vec<_>>()
                .join(";"),
        }
    }
}

/// 导出批量汇总
pub fn summary_to_csv(rows: &[SummaryRow], output_path: &Path) -> Result<()> {
    let mut wtr = csv::Writer::from_path(output_path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(|e| write_error(output_path, e))?;
    Ok(())
}
