//! # 命令执行模块
//!
//! 实现各子命令的业务逻辑。
//!
//! ## 依赖关系
//! - 被 `main.rs` 调用
//! - 使用 `cli/`, `parsers/`, `eos/`, `report/`, `batch/`, `utils/`
//! - 子模块: fit, batch, curve

pub mod batch;
pub mod curve;
pub mod fit;

use crate::cli::fit::PressureUnit;
use crate::cli::Commands;
use crate::error::Result;
use crate::models::Dataset;
use crate::parsers;

use std::path::Path;

/// 执行命令
pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Fit(args) => fit::execute(args),
        Commands::Batch(args) => batch::execute(args),
        Commands::Curve(args) => curve::execute(args),
    }
}

/// 读取数据文件并把压力换算到 GPa
pub(crate) fn load_dataset(path: &Path, unit: PressureUnit) -> Result<Dataset> {
    let dataset = parsers::parse_pv_file(path)?;
    Ok(match unit {
        PressureUnit::Gpa => dataset,
        _ => dataset.scaled_pressures(unit.to_gpa()),
    })
}

/// 按扩展名判断是否输出 SVG
pub(crate) fn is_svg(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("svg"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_load_dataset_converts_kbar() {
        let dir = std::env::temp_dir().join("eosfit_commands_load");
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("kbar.dat");
        fs::write(&path, "74.68 0.0\n74.22 20.1\n73.48 50.3\n").unwrap();

        let ds = load_dataset(&path, PressureUnit::Kbar).unwrap();
        assert!((ds.samples()[1].pressure - 2.01).abs() < 1e-12);
        let ds = load_dataset(&path, PressureUnit::Gpa).unwrap();
        assert_eq!(ds.samples()[1].pressure, 20.1);
        fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_is_svg() {
        assert!(is_svg(Path::new("fit.SVG")));
        assert!(!is_svg(Path::new("fit.png")));
        assert!(!is_svg(Path::new("fit")));
    }
}
