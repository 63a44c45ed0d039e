//! # batch 命令实现
//!
//! 收集目录中的数据文件，在 rayon 线程池上并行拟合，打印汇总表并写出汇总 CSV。
//! 单个文件的失败不会中断整批。
//!
//! ## 依赖关系
//! - 使用 `cli/batch.rs` 定义的 BatchArgs
//! - 使用 `batch/` 收集与并行执行
//! - 使用 `eos/` 拟合，`report/export.rs` 写汇总

use super::load_dataset;
use crate::batch::{BatchRunner, FileCollector, ProcessResult};
use crate::cli::batch::BatchArgs;
use crate::cli::fit::PressureUnit;
use crate::eos::{self, FitOptions};
use crate::error::Result;
use crate::models::{EosParameters, EosType, FitResult, ParamName};
use crate::report::{self, SummaryRow};
use crate::utils::output;

use std::path::Path;
use tabled::{Table, Tabled};

/// 每个文件共享的拟合配置
struct BatchFitConfig {
    eos_type: EosType,
    locked: Vec<ParamName>,
    seed: Option<EosParameters>,
    options: FitOptions,
    unit: PressureUnit,
}

/// 执行 batch 命令
pub fn execute(args: BatchArgs) -> Result<()> {
    output::print_header("Batch Equation of State Fit");

    let options = args.tuning.to_options()?;

    let files = FileCollector::new(args.input.clone())
        .with_pattern(&args.pattern)?
        .recursive(args.recursive)
        .collect()?;

    if files.is_empty() {
        output::print_warning(&format!(
            "No matching files found with pattern '{}'",
            args.pattern
        ));
        return Ok(());
    }

    let runner = BatchRunner::new(args.jobs);
    output::print_info(&format!(
        "Found {} data files, fitting {} with {} jobs",
        files.len(),
        args.model.eos_type(),
        runner.jobs()
    ));

    let config = BatchFitConfig {
        eos_type: args.model.eos_type(),
        locked: args.model.locked_names(),
        seed: args.model.seed(),
        options,
        unit: args.pressure_unit,
    };

    let result = runner.run(files, |path| fit_file(path, &config))?;

    for (path, reason) in &result.skipped {
        output::print_skip(&format!("{}: {}", path.display(), reason));
    }
    for (path, err) in &result.failures {
        output::print_error(&format!("{}: {}", path, err));
    }

    let rows: Vec<SummaryRow> = result
        .success
        .iter()
        .map(|(path, fit)| SummaryRow::from_result(&path.display().to_string(), fit))
        .collect();

    print_summary_table(&result.success);

    let unconverged = result.success.iter().filter(|(_, r)| !r.converged).count();
    if unconverged > 0 {
        output::print_warning(&format!("{} fit(s) did not converge", unconverged));
    }

    if !rows.is_empty() {
        report::summary_to_csv(&rows, &args.summary)?;
        output::print_written("summary", &args.summary);
    }

    output::print_done(&format!(
        "{} fitted, {} skipped, {} failed (total {})",
        result.success.len(),
        result.skipped.len(),
        result.failures.len(),
        result.total()
    ));

    Ok(())
}

/// 拟合单个文件
fn fit_file(path: &Path, config: &BatchFitConfig) -> ProcessResult<FitResult> {
    let dataset = match load_dataset(path, config.unit) {
        Ok(d) => d,
        Err(e) => return ProcessResult::Failed(path.display().to_string(), e.to_string()),
    };

    let needed = config.eos_type.min_samples();
    if dataset.len() < needed {
        return ProcessResult::Skipped(format!(
            "{} samples, {} needs at least {}",
            dataset.len(),
            config.eos_type,
            needed
        ));
    }

    let result = eos::fit(
        &dataset,
        config.eos_type,
        &config.locked,
        config.seed.as_ref(),
        &config.options,
    );

    if result.has_parameters() {
        ProcessResult::Success(result)
    } else {
        ProcessResult::Failed(
            path.display().to_string(),
            format!("fit failed: {}", result.status),
        )
    }
}

fn print_summary_table(fits: &[(std::path::PathBuf, FitResult)]) {
    #[derive(Tabled)]
    struct SummaryTableRow {
        #[tabled(rename = "File")]
        file: String,
        #[tabled(rename = "V0 (Å³)")]
        v0: String,
        #[tabled(rename = "B0 (GPa)")]
        b0: String,
        #[tabled(rename = "B0'")]
        b0_prime: String,
        #[tabled(rename = "R²")]
        r_squared: String,
        #[tabled(rename = "Status")]
        status: String,
    }

    let rows: Vec<SummaryTableRow> = fits
        .iter()
        .map(|(path, r)| {
            let p = &r.parameters;
            let se = &r.standard_errors;
            let mut status = r.status.to_string();
            if r.is_constrained() {
                status.push_str(" (constrained)");
            }
            SummaryTableRow {
                file: path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("?")
                    .to_string(),
                v0: output::format_with_error(p.v0, se.v0, 3),
                b0: output::format_with_error(p.b0, se.b0, 1),
                b0_prime: output::format_with_error(p.b0_prime, se.b0_prime, 2),
                r_squared: format!("{:.5}", r.r_squared),
                status,
            }
        })
        .collect();

    if !rows.is_empty() {
        output::print_header(&format!("{} fitted datasets", rows.len()));
        println!("{}", Table::new(&rows));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::fit::{EosChoice, FitTuning, ModelArgs};
    use std::fs;

    #[test]
    fn test_batch_writes_summary_and_survives_bad_files() {
        let dir = std::env::temp_dir().join("eosfit_batch_command");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("mgo.csv"),
            "V,P\n74.68,0.00\n74.22,2.01\n73.48,5.03\n72.90,7.49\n72.28,10.10\n71.65,12.84\n",
        )
        .unwrap();
        fs::write(dir.join("short.dat"), "10.0 0.0\n9.9 1.0\n").unwrap();
        fs::write(dir.join("broken.csv"), "V,P\n10.0,abc\n").unwrap();

        let summary = dir.join("summary.out");
        let args = BatchArgs {
            input: dir.clone(),
            pattern: "*.csv,*.dat".to_string(),
            recursive: false,
            jobs: 2,
            model: ModelArgs {
                eos: EosChoice::Bm3,
                lock: Vec::new(),
                v0: None,
                b0: None,
                b0_prime: None,
                b0_double_prime: None,
            },
            tuning: FitTuning {
                regularization: 1.0,
                max_iter: 10,
                tolerance: 1e-6,
            },
            pressure_unit: PressureUnit::Gpa,
            summary: summary.clone(),
        };

        execute(args).unwrap();

        let content = fs::read_to_string(&summary).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert!(content.contains("mgo.csv"));
        fs::remove_dir_all(&dir).ok();
    }
}
