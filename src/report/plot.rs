//! # P-V 与 F-f 图
//!
//! 使用 `plotters` 生成拟合结果图。
//!
//! ## 功能
//! - P-V 图：实验点 + 拟合曲线，右上角标注拟合参数
//! - F-f 图：归一化应力对 Eulerian 应变，BM3 下为直线，便于肉眼检查 B0′
//! - 支持 PNG 和 SVG 输出
//!
//! ## 依赖关系
//! - 被 `commands/fit.rs` 调用
//! - 使用 `eos/pressure.rs`, `eos/strain.rs`
//! - 使用 `plotters` 渲染图表

use crate::eos::{sample_curve, strain};
use crate::error::{EosFitError, Result};
use crate::models::{Dataset, FitResult};

use plotters::prelude::*;
use std::path::Path;

const CURVE_POINTS: usize = 200;

fn plot_error<E: std::fmt::Debug>(e: E) -> EosFitError {
    EosFitError::PlotError(format!("{:?}", e))
}

/// 数据范围两端各留 5% 空白
fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !lo.is_finite() || !hi.is_finite() {
        return (0.0, 1.0);
    }
    let pad = if hi > lo { 0.05 * (hi - lo) } else { 0.05 * lo.abs().max(1.0) };
    (lo - pad, hi + pad)
}

/// 生成 P-V 图
pub fn generate_pv_plot(
    dataset: &Dataset,
    result: &FitResult,
    output_path: &Path,
    title: &str,
    width: u32,
    height: u32,
    use_svg: bool,
) -> Result<()> {
    if use_svg {
        let root = SVGBackend::new(output_path, (width, height)).into_drawing_area();
        draw_pv_chart(&root, dataset, result, title)?;
        root.present().map_err(plot_error)?;
    } else {
        let root = BitMapBackend::new(output_path, (width, height)).into_drawing_area();
        draw_pv_chart(&root, dataset, result, title)?;
        root.present().map_err(plot_error)?;
    }
    Ok(())
}

fn draw_pv_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    dataset: &Dataset,
    result: &FitResult,
    title: &str,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(plot_error)?;

    let params = &result.parameters;
    let v_hi_curve = if params.v0.is_finite() {
        params.v0.max(dataset.max_volume())
    } else {
        dataset.max_volume()
    };
    let curve = if result.has_parameters() {
        sample_curve(dataset.min_volume(), v_hi_curve, CURVE_POINTS, params)
    } else {
        Vec::new()
    };

    let (v_min, v_max) = padded_range(
        dataset
            .volumes()
            .into_iter()
            .chain(curve.iter().map(|(v, _)| *v)),
    );
    let (p_min, p_max) = padded_range(
        dataset
            .pressures()
            .into_iter()
            .chain(curve.iter().map(|(_, p)| *p)),
    );

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 28).into_font())
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(v_min..v_max, p_min..p_max)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("V (Å³)")
        .y_desc("P (GPa)")
        .x_label_style(("sans-serif", 16))
        .y_label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()
        .map_err(plot_error)?;

    let line_color = RGBColor(0, 102, 204);
    let point_color = RGBColor(204, 51, 0);

    if !curve.is_empty() {
        chart
            .draw_series(LineSeries::new(curve.iter().copied(), line_color.stroke_width(2)))
            .map_err(plot_error)?;
    }

    chart
        .draw_series(
            dataset
                .samples()
                .iter()
                .map(|s| Circle::new((s.volume, s.pressure), 4, point_color.filled())),
        )
        .map_err(plot_error)?;

    // 参数标注
    let text_style = ("sans-serif", 14).into_font().color(&BLACK);
    let mut lines = vec![format!("{} ({})", params.eos_type, result.method)];
    for &name in params.eos_type.parameters() {
        let se = result.standard_errors.get(name);
        lines.push(format!("{} = {:.3} ± {:.3} {}", name, params.get(name), se, name.unit()));
    }
    lines.push(format!("R² = {:.5}", result.r_squared));

    let x_text = v_max - 0.35 * (v_max - v_min);
    for (i, line) in lines.into_iter().enumerate() {
        let y_text = p_max - (0.05 + 0.06 * i as f64) * (p_max - p_min);
        chart
            .draw_series(std::iter::once(Text::new(line, (x_text, y_text), text_style.clone())))
            .map_err(plot_error)?;
    }

    Ok(())
}

/// 生成 F-f 图
pub fn generate_ff_plot(
    dataset: &Dataset,
    result: &FitResult,
    output_path: &Path,
    title: &str,
    width: u32,
    height: u32,
    use_svg: bool,
) -> Result<()> {
    if !result.has_parameters() {
        return Err(EosFitError::PlotError(
            "fit produced no parameters, F-f plot unavailable".to_string(),
        ));
    }

    if use_svg {
        let root = SVGBackend::new(output_path, (width, height)).into_drawing_area();
        draw_ff_chart(&root, dataset, result, title)?;
        root.present().map_err(plot_error)?;
    } else {
        let root = BitMapBackend::new(output_path, (width, height)).into_drawing_area();
        draw_ff_chart(&root, dataset, result, title)?;
        root.present().map_err(plot_error)?;
    }
    Ok(())
}

fn draw_ff_chart<DB: DrawingBackend>(
    root: &DrawingArea<DB, plotters::coord::Shift>,
    dataset: &Dataset,
    result: &FitResult,
    title: &str,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE).map_err(plot_error)?;

    let params = &result.parameters;
    let (f, big_f) = strain::transform(&dataset.volumes(), &dataset.pressures(), params.v0);
    let points: Vec<(f64, f64)> = f
        .iter()
        .zip(&big_f)
        .filter(|(fi, _)| !strain::is_degenerate_strain(**fi))
        .map(|(fi, fs)| (*fi, *fs))
        .collect();

    // BM3：F = B0 + 1.5·B0·(B0′ − 4)·f
    let slope = 1.5 * params.b0 * (params.b0_prime - 4.0);
    let (f_min, f_max) = padded_range(points.iter().map(|(x, _)| *x).chain(std::iter::once(0.0)));
    let line = [(f_min, params.b0 + slope * f_min), (f_max, params.b0 + slope * f_max)];
    let (y_min, y_max) = padded_range(
        points
            .iter()
            .map(|(_, y)| *y)
            .chain(line.iter().map(|(_, y)| *y)),
    );

    let mut chart = ChartBuilder::on(root)
        .caption(title, ("sans-serif", 28).into_font())
        .margin(30)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(f_min..f_max, y_min..y_max)
        .map_err(plot_error)?;

    chart
        .configure_mesh()
        .x_desc("Eulerian strain f")
        .y_desc("Normalized stress F (GPa)")
        .x_label_style(("sans-serif", 16))
        .y_label_style(("sans-serif", 16))
        .axis_desc_style(("sans-serif", 18))
        .draw()
        .map_err(plot_error)?;

    chart
        .draw_series(LineSeries::new(line, RGBColor(0, 102, 204).stroke_width(2)))
        .map_err(plot_error)?;

    chart
        .draw_series(
            points
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 4, RGBColor(204, 51, 0).filled())),
        )
        .map_err(plot_error)?;

    let label = format!("V0 = {:.4} Å³", params.v0);
    chart
        .draw_series(std::iter::once(Text::new(
            label,
            (f_min + 0.05 * (f_max - f_min), y_max - 0.05 * (y_max - y_min)),
            ("sans-serif", 14).into_font().color(&BLACK),
        )))
        .map_err(plot_error)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_range() {
        let (lo, hi) = padded_range([1.0, 3.0, 2.0].into_iter());
        assert!((lo - 0.9).abs() < 1e-12);
        assert!((hi - 3.1).abs() < 1e-12);
    }

    #[test]
    fn test_padded_range_single_value_and_nan() {
        let (lo, hi) = padded_range([5.0, f64::NAN].into_iter());
        assert!(lo < 5.0 && hi > 5.0);

        assert_eq!(padded_range(std::iter::empty()), (0.0, 1.0));
    }
}
