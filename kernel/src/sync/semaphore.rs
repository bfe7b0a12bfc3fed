//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 信号量 (Semaphore) 机制
//!
//! 对应 Linux 内核的 `struct semaphore` (kernel/locking/semaphore.c)
//!
//! 核心概念：
//! - P 操作 (down/down_interruptible): 获取信号量，可能睡眠
//! - V 操作 (up): 释放信号量，唤醒等待的进程
//!
//! 内部用一把自旋锁保护计数，等待者以信号量地址为通道睡眠。

use core::sync::atomic::{AtomicI32, Ordering};

use super::spinlock::SpinLock;
use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::process::WaitChannel;

/// 计数信号量
pub struct Semaphore {
    lock: SpinLock,
    /// 只在持有 `lock` 时修改
    count: AtomicI32,
}

impl Semaphore {
    /// 创建新信号量
    ///
    /// 初值 1 即二值信号量，初值 n 表示 n 个资源
    pub const fn new(value: i32) -> Self {
        Self {
            lock: SpinLock::new("semaphore"),
            count: AtomicI32::new(value),
        }
    }

    #[inline]
    fn channel(&self) -> WaitChannel {
        WaitChannel::of(self)
    }

    /// P 操作（不可中断）
    pub fn down(&self, kernel: &Kernel) {
        self.lock.acquire();
        while self.count.load(Ordering::Relaxed) <= 0 {
            kernel.sleep(self.channel(), &self.lock);
        }
        self.count.fetch_sub(1, Ordering::Relaxed);
        self.lock.release();
    }

    /// P 操作（可中断）
    ///
    /// 等待期间当前进程被 kill 则放弃，返回 `EINTR`
    pub fn down_interruptible(&self, kernel: &Kernel) -> Result<(), Errno> {
        self.lock.acquire();
        while self.count.load(Ordering::Relaxed) <= 0 {
            if kernel.killed() {
                self.lock.release();
                return Err(Errno::InterruptedSystemCall);
            }
            kernel.sleep(self.channel(), &self.lock);
        }
        self.count.fetch_sub(1, Ordering::Relaxed);
        self.lock.release();
        Ok(())
    }

    /// 尝试 P 操作，不睡眠
    pub fn down_trylock(&self) -> Result<(), Errno> {
        self.lock.acquire();
        let result = if self.count.load(Ordering::Relaxed) > 0 {
            self.count.fetch_sub(1, Ordering::Relaxed);
            Ok(())
        } else {
            Err(Errno::TryAgain)
        };
        self.lock.release();
        result
    }

    /// V 操作
    pub fn up(&self, kernel: &Kernel) {
        self.lock.acquire();
        self.count.fetch_add(1, Ordering::Relaxed);
        kernel.wakeup(self.channel());
        self.lock.release();
    }

    /// 当前计数
    pub fn count(&self) -> i32 {
        self.count.load(Ordering::Relaxed)
    }
}

impl core::fmt::Debug for Semaphore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Semaphore").field("count", &self.count()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trylock_counts_down() {
        let sem = Semaphore::new(2);
        assert_eq!(sem.down_trylock(), Ok(()));
        assert_eq!(sem.down_trylock(), Ok(()));
        assert_eq!(sem.down_trylock(), Err(Errno::TryAgain));
        assert_eq!(sem.count(), 0);
    }
}
