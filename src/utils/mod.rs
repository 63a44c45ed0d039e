//! # 工具函数模块
//!
//! 终端输出与进度条。
//!
//! ## 依赖关系
//! - 被 `commands/`, `batch/` 使用
//! - 子模块: output, progress

pub mod output;
pub mod progress;
