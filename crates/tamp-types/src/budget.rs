//! 搜索预算
//!
//! 每次采样调用都受两个上限约束：迭代次数与墙钟时间，任一耗尽即停止。

use std::time::{Duration, Instant};

/// 迭代次数 + 超时
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub max_iterations: usize,
    pub timeout: Duration,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Budget {
    #[must_use]
    pub const fn new(max_iterations: usize, timeout: Duration) -> Self {
        Self {
            max_iterations,
            timeout,
        }
    }

    /// 仅限制迭代次数
    #[must_use]
    pub const fn iterations(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            timeout: Duration::MAX,
        }
    }

    /// 开始计时
    #[must_use]
    pub fn start(&self) -> BudgetTracker {
        BudgetTracker {
            budget: *self,
            started: Instant::now(),
            iterations: 0,
        }
    }
}

/// 正在消耗的预算
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    budget: Budget,
    started: Instant,
    iterations: usize,
}

impl BudgetTracker {
    /// 消耗一次迭代
    ///
    /// 返回 `false` 表示预算已耗尽，本次迭代不应执行。
    pub fn tick(&mut self) -> bool {
        if self.is_exhausted() {
            return false;
        }
        self.iterations += 1;
        true
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.iterations >= self.budget.max_iterations || self.started.elapsed() >= self.budget.timeout
    }

    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
