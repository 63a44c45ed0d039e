//! # 批量处理模块
//!
//! 收集目录中的 V-P 数据文件并行拟合。
//!
//! ## 依赖关系
//! - 被 `commands/batch.rs` 使用
//! - 使用 `walkdir` + `glob` 收集文件
//! - 使用 `rayon` 并行处理，`indicatif` 显示进度

pub mod collector;
pub mod runner;

pub use collector::FileCollector;
pub use runner::{BatchResult, BatchRunner, ProcessResult};
