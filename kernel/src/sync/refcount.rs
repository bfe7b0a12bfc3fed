//! 引用计数
//!
//! 对应 Linux 内核的 refcount_t (include/linux/refcount.h)，语义取最简形式：
//! - `increment`: 原子加一
//! - `decrement`: 原子减一，并报告结果是否已不大于零
//!
//! 文件对象和 inode 通过它判断"最后一个持有者"何时离开，不依赖调度锁。

use core::sync::atomic::{AtomicI64, Ordering};

/// 引用计数
#[derive(Debug)]
pub struct RefCount {
    count: AtomicI64,
}

impl RefCount {
    /// 以给定初值创建
    pub const fn new(initial: i64) -> Self {
        Self { count: AtomicI64::new(initial) }
    }

    /// 增加一个引用
    #[inline]
    pub fn increment(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    /// 减少一个引用
    ///
    /// # 返回
    /// 减少后计数不大于零时返回 `true`，调用者负责回收对象
    #[inline]
    pub fn decrement(&self) -> bool {
        self.count.fetch_sub(1, Ordering::AcqRel) - 1 <= 0
    }

    /// 当前计数
    #[inline]
    pub fn get(&self) -> i64 {
        self.count.load(Ordering::Acquire)
    }

    /// 重置计数（仅用于对象复用前的初始化）
    #[inline]
    pub fn set(&self, value: i64) {
        self.count.store(value, Ordering::Release);
    }
}

impl Default for RefCount {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_last_decrement_reports_zero() {
        let rc = RefCount::new(1);
        rc.increment();
        assert_eq!(rc.get(), 2);
        assert!(!rc.decrement());
        assert!(rc.decrement());
        assert_eq!(rc.get(), 0);
    }

    #[test]
    fn test_decrement_below_zero_still_reports() {
        let rc = RefCount::default();
        assert!(rc.decrement());
        assert_eq!(rc.get(), -1);
    }

    #[test]
    fn test_exactly_one_releaser() {
        let rc = Arc::new(RefCount::new(0));
        for _ in 0..8000 {
            rc.increment();
        }
        let workers: Vec<_> = (0..8)
            .map(|_| {
                let rc = Arc::clone(&rc);
                std::thread::spawn(move || (0..1000).filter(|_| rc.decrement()).count())
            })
            .collect();
        let releasers: usize = workers.into_iter().map(|w| w.join().unwrap()).sum();
        assert_eq!(releasers, 1);
        assert_eq!(rc.get(), 0);
    }
}
