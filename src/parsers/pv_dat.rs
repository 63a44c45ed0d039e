//! # 纯文本 V-P 数据解析器
//!
//! 适用于 `.dat` / `.xy` / `.txt`：
//!
//! ```text
//! # V(A^3)   P(GPa)   sigma
//! 74.68      0.00
//! 74.22      2.01     0.05
//! ```
//!
//! 分隔符可以是空白、逗号或分号；`#` 之后为注释；
//! 开头不能解析为数值的行视为表头跳过。
//!
//! ## 依赖关系
//! - 被 `parsers/mod.rs` 使用
//! - 使用 `regex` 切分字段

use crate::error::{EosFitError, Result};
use crate::models::{Dataset, Sample};
use regex::Regex;
use std::path::Path;

/// 解析纯文本文件
pub fn parse_dat_file(path: &Path) -> Result<Dataset> {
    let content = std::fs::read_to_string(path).map_err(|e| EosFitError::FileReadError {
        path: path.display().to_string(),
        source: e,
    })?;

    parse_dat_content(&content, &super::dataset_name(path), &path.display().to_string())
}

/// 从字符串内容解析
pub fn parse_dat_content(content: &str, name: &str, source: &str) -> Result<Dataset> {
    let separator = Regex::new(r"[\s,;]+").map_err(|e| EosFitError::Other(e.to_string()))?;
    let parse_error = |line_no: usize, reason: String| EosFitError::ParseError {
        format: "DAT".to_string(),
        path: source.to_string(),
        reason: format!("line {}: {}", line_no, reason),
    };

    let mut samples = Vec::new();

    for (idx, raw) in content.lines().enumerate() {
        let line = raw.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = separator.split(line).filter(|s| !s.is_empty()).collect();
        let values: Vec<Option<f64>> = fields.iter().map(|s| s.parse::<f64>().ok()).collect();

        // 数据开始前的表头行
        if samples.is_empty() && values.first().map_or(true, |v| v.is_none()) {
            continue;
        }

        if fields.len() < 2 {
            return Err(parse_error(idx + 1, "expected at least two columns".to_string()));
        }

        let number = |i: usize| {
            values[i].ok_or_else(|| parse_error(idx + 1, format!("'{}' is not a number", fields[i])))
        };

        let sample = Sample::new(number(0)?, number(1)?);
        samples.push(if fields.len() >= 3 {
            sample.with_sigma(number(2)?)
        } else {
            sample
        });
    }

    if samples.is_empty() {
        return Err(EosFitError::ParseError {
            format: "DAT".to_string(),
            path: source.to_string(),
            reason: "no data lines".to_string(),
        });
    }

    Dataset::new(name, samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_whitespace_columns_with_header() {
        let content = "V(A^3)  P(GPa)\n74.68  0.00\n74.22\t2.01\n\n73.48   5.03  # loaded\n";
        let ds = parse_dat_content(content, "mgo", "inline").unwrap();
        assert_eq!(ds.len(), 3);
        assert_eq!(ds.samples()[2].pressure, 5.03);
        assert_eq!(ds.samples()[0].sigma, None);
    }

    #[test]
    fn test_mixed_separators_and_sigma() {
        let content = "# comment\n74.68,0.0;0.05\n74.22 ; 2.01 , 0.05\n";
        let ds = parse_dat_content(content, "mgo", "inline").unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.samples()[1].sigma, Some(0.05));
    }

    #[test]
    fn test_garbage_after_data_is_error() {
        let content = "74.68 0.0\n74.22 oops\n";
        let err = parse_dat_content(content, "mgo", "inline").unwrap_err();
        match err {
            EosFitError::ParseError { reason, .. } => assert!(reason.starts_with("line 2")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_single_column_is_error() {
        let err = parse_dat_content("74.68\n", "mgo", "inline").unwrap_err();
        assert!(matches!(err, EosFitError::ParseError { .. }));
    }

    #[test]
    fn test_empty_file_is_error() {
        assert!(parse_dat_content("# nothing\n\n", "empty", "inline").is_err());
    }
}
