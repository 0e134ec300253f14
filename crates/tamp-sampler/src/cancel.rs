//! 粗粒度取消
//!
//! 取消只在顶层候选之间检查，一次几何查询不会被中途打断。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// 可克隆的取消令牌
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// 清除取消标记，令牌可以复用
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::Release);
    }
}
