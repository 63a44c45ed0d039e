//! # eosfit - 高压 XRD 状态方程拟合
//!
//! 从 (V, P) 数据拟合状态方程（EoS），核心为三阶 Birch–Murnaghan 的 F–f
//! 线性化两阶段正则化最小二乘；其他 EoS 形式与锁定参数走有界非线性最小二乘。
//!
//! 二进制 `eosfit` 只是本库的一层薄封装，拟合核心可以被任何前端直接调用。
//!
//! ## 依赖关系
//! ```text
//! main.rs
//!   ├── cli/        (命令行参数定义)
//!   ├── commands/   (命令执行逻辑)
//!   │     ├── parsers/   (V-P 数据文件解析)
//!   │     ├── report/    (报告导出与绘图)
//!   │     └── batch/     (批量并行拟合)
//!   ├── eos/        (拟合核心，只依赖 models/ 与 nalgebra)
//!   ├── models/     (数据模型)
//!   ├── utils/      (终端输出、进度条)
//!   └── error.rs    (错误处理)
//! ```

pub mod batch;
pub mod cli;
pub mod commands;
pub mod eos;
pub mod error;
pub mod models;
pub mod parsers;
pub mod report;
pub mod utils;
