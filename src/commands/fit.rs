//! # fit 命令实现
//!
//! 拟合单个 V-P 数据文件，打印参数表与拟合优度，按需导出报告、残差、曲线和图。
//!
//! ## 依赖关系
//! - 使用 `cli/fit.rs` 定义的 FitArgs
//! - 使用 `eos/` 拟合，`report/` 导出
//! - 使用 `utils/output.rs` 打印

use super::{is_svg, load_dataset};
use crate::cli::fit::{FitArgs, PressureUnit};
use crate::eos::{self, bulk_modulus_at, sample_curve};
use crate::error::Result;
use crate::models::{Dataset, EosType, FitResult};
use crate::report;
use crate::utils::output;

use tabled::{Table, Tabled};

/// 执行 fit 命令
pub fn execute(args: FitArgs) -> Result<()> {
    output::print_header("Equation of State Fit");

    let dataset = load_dataset(&args.input, args.pressure_unit)?;
    output::print_success(&format!(
        "Loaded {} samples from '{}'",
        dataset.len(),
        args.input.display()
    ));
    if args.pressure_unit != PressureUnit::Gpa {
        output::print_info(&format!("Pressures converted from {} to GPa", args.pressure_unit));
    }
    if dataset.has_uncertainties() {
        output::print_info("Using pressure uncertainties as weights (w = 1/σ²)");
    }

    let options = args.tuning.to_options()?;
    let eos_type = args.model.eos_type();
    let locked = args.model.locked_names();
    let seed = args.model.seed();

    let planned = eos::select_strategy(eos_type, &locked);
    output::print_info(&format!(
        "EoS: {}, backend: {}",
        eos_type,
        eos::backend(planned).name()
    ));

    let result = eos::fit(&dataset, eos_type, &locked, seed.as_ref(), &options);

    if result.method != planned {
        output::print_warning("Two-stage F-f fit failed, fell back to nonlinear least squares");
    }

    print_result(&dataset, &result);
    print_warnings(&result);

    write_outputs(&args, &dataset, &result)?;

    output::print_done("Fit finished");
    Ok(())
}

#[derive(Tabled)]
struct ParameterRow {
    #[tabled(rename = "Parameter")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Std. error")]
    error: String,
    #[tabled(rename = "Unit")]
    unit: String,
    #[tabled(rename = "Note")]
    note: String,
}

fn print_result(dataset: &Dataset, result: &FitResult) {
    let params = &result.parameters;

    let rows: Vec<ParameterRow> = params
        .eos_type
        .parameters()
        .iter()
        .map(|&name| ParameterRow {
            name: name.to_string(),
            value: format!("{:.4}", params.get(name)),
            error: format!("{:.4}", result.standard_errors.get(name)),
            unit: name.unit().to_string(),
            note: if params.is_locked(name) {
                "locked".to_string()
            } else if result.constrained.contains(&name) {
                "at bound".to_string()
            } else {
                String::new()
            },
        })
        .collect();

    output::print_header(&format!("{} parameters ({})", params.eos_type, result.method));
    println!("{}", Table::new(&rows));
    println!();

    output::print_kv("Status", &result.status.to_string());
    output::print_kv("Iterations", &result.iterations_used.to_string());
    if result.restarts > 0 {
        output::print_kv("Restarts", &result.restarts.to_string());
    }
    output::print_kv("R²", &format!("{:.6}", result.r_squared));
    output::print_kv("RMSE", &format!("{:.4} GPa", result.rmse));
    output::print_kv("χ² (reduced)", &format!("{:.4}", result.chi_square));

    if result.has_parameters() {
        let v_min = dataset.min_volume();
        output::print_kv(
            "K at P max",
            &format!(
                "{:.2} GPa at {:.2} GPa",
                bulk_modulus_at(v_min, params),
                dataset.max_pressure()
            ),
        );
    }
    output::print_separator();
}

fn print_warnings(result: &FitResult) {
    if !result.converged {
        output::print_warning(&format!("Fit did not converge: {}", result.status));
    }
    if result.is_constrained() {
        let names: Vec<String> = result.constrained.iter().map(|p| p.to_string()).collect();
        output::print_warning(&format!(
            "{} pinned at a physical bound, the fit is constrained",
            names.join(", ")
        ));
    }
}

fn write_outputs(args: &FitArgs, dataset: &Dataset, result: &FitResult) -> Result<()> {
    if let Some(path) = &args.report {
        report::write_fit_report(result, &dataset.name, path)?;
        output::print_written("report", path);
    }

    if let Some(path) = &args.residuals {
        report::residuals_to_csv(result, path)?;
        output::print_written("residuals", path);
    }

    let wants_figures = args.curve.is_some() || args.plot.is_some() || args.ff_plot.is_some();
    if !result.has_parameters() {
        if wants_figures {
            output::print_skip("No fitted parameters, curve and plots not written");
        }
        return Ok(());
    }

    if let Some(path) = &args.curve {
        let v_max = result.parameters.v0.max(dataset.max_volume());
        let points = sample_curve(dataset.min_volume(), v_max, args.curve_points, &result.parameters);
        report::write_curve(&points, &result.parameters, path)?;
        output::print_written("curve", path);
    }

    let title = args.title.clone().unwrap_or_else(|| dataset.name.clone());

    if let Some(path) = &args.plot {
        report::generate_pv_plot(
            dataset,
            result,
            path,
            &title,
            args.width,
            args.height,
            is_svg(path),
        )?;
        output::print_written("P-V plot", path);
    }

    if let Some(path) = &args.ff_plot {
        if matches!(result.parameters.eos_type, EosType::Bm2 | EosType::Bm3) {
            report::generate_ff_plot(
                dataset,
                result,
                path,
                &format!("{} (F-f)", title),
                args.width,
                args.height,
                is_svg(path),
            )?;
            output::print_written("F-f plot", path);
        } else {
            output::print_skip("F-f plot is only drawn for BM2/BM3 fits");
        }
    }

    Ok(())
}
