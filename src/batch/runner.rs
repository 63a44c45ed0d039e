//! # 批量执行器
//!
//! 在独立的 rayon 线程池上并行处理文件列表，结果顺序与输入一致。
//!
//! ## 依赖关系
//! - 被 `commands/batch.rs` 调用
//! - 使用 `utils/progress.rs` 创建进度条
//! - 使用 `rayon` 进行并行计算

use crate::error::{EosFitError, Result};
use crate::utils::progress;

use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

/// 单个文件处理结果
#[derive(Debug, Clone)]
pub enum ProcessResult<T> {
    Success(T),
    /// 跳过（如数据点不足）
    Skipped(String),
    /// 处理失败：(文件路径, 错误信息)
    Failed(String, String),
}

/// 批量处理结果统计
#[derive(Debug)]
pub struct BatchResult<T> {
    /// 成功的文件与结果，按输入顺序
    pub success: Vec<(PathBuf, T)>,
    pub skipped: Vec<(PathBuf, String)>,
    pub failures: Vec<(String, String)>,
}

impl<T> Default for BatchResult<T> {
    fn default() -> Self {
        Self {
            success: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }
}

impl<T> BatchResult<T> {
    fn merge(&mut self, path: PathBuf, result: ProcessResult<T>) {
        match result {
            ProcessResult::Success(value) => self.success.push((path, value)),
            ProcessResult::Skipped(reason) => self.skipped.push((path, reason)),
            ProcessResult::Failed(file, err) => self.failures.push((file, err)),
        }
    }

    pub fn total(&self) -> usize {
        self.success.len() + self.skipped.len() + self.failures.len()
    }
}

/// 批量执行器
pub struct BatchRunner {
    jobs: usize,
}

impl BatchRunner {
    /// `jobs = 0` 时使用全部 CPU 核心
    pub fn new(jobs: usize) -> Self {
        let jobs = if jobs == 0 { num_cpus::get() } else { jobs };
        Self { jobs }
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// 并行处理文件列表
    pub fn run<T, F>(&self, files: Vec<PathBuf>, processor: F) -> Result<BatchResult<T>>
    where
        T: Send,
        F: Fn(&Path) -> ProcessResult<T> + Sync + Send,
    {
        let pb = progress::create_progress_bar(files.len() as u64, "Fitting");

        let success_count = AtomicUsize::new(0);
        let failed_count = AtomicUsize::new(0);

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .build()
            .map_err(|e| EosFitError::Other(format!("Failed to build thread pool: {}", e)))?;

        let results: Vec<ProcessResult<T>> = pool.install(|| {
            files
                .par_iter()
                .map(|file| {
                    let result = processor(file.as_path());

                    match &result {
                        ProcessResult::Success(_) => {
                            success_count.fetch_add(1, Ordering::Relaxed);
                        }
                        ProcessResult::Failed(_, _) => {
                            failed_count.fetch_add(1, Ordering::Relaxed);
                        }
                        ProcessResult::Skipped(_) => {}
                    }

                    pb.set_message(format!(
                        "ok {} / failed {}",
                        success_count.load(Ordering::Relaxed),
                        failed_count.load(Ordering::Relaxed)
                    ));
                    pb.inc(1);
                    result
                })
                .collect()
        });

        pb.finish_and_clear();

        let mut batch_result = BatchResult::default();
        for (path, result) in files.into_iter().zip(results) {
            batch_result.merge(path, result);
        }

        Ok(batch_result)
    }
}
