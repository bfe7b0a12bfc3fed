//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 条件变量 (Condition Variable) 机制
//!
//! 对应 Linux 内核的等待队列 (kernel/sched/wait.c) 与 POSIX `pthread_cond_t`。
//!
//! 核心概念：
//! - 条件变量必须与一把 `SpinLock` 配合使用
//! - `wait()` 原子地释放锁并睡眠，被唤醒后重新获取锁
//! - `notify_all()` 唤醒所有等待者，等待者醒来后自行重新检查条件
//!
//! 等待通道就是条件变量自身的地址。唤醒只作用于当前调度器的进程表，
//! 跨容器共享的条件变量不会唤醒其他容器中的等待者。

use core::sync::atomic::{AtomicU64, Ordering};

use super::spinlock::SpinLock;
use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::process::WaitChannel;

/// 条件变量
///
/// 典型用法：
/// ```text
/// lock.acquire();
/// while !condition() {
///     cond.wait(kernel, &lock);
/// }
/// // ... 临界区 ...
/// lock.release();
///
/// // 另一个进程：
/// lock.acquire();
/// // ... 修改条件 ...
/// cond.notify_all(kernel);
/// lock.release();
/// ```
#[derive(Debug, Default)]
pub struct ConditionVariable {
    /// 已发出的通知次数
    generation: AtomicU64,
}

impl ConditionVariable {
    pub const fn new() -> Self {
        Self {
            generation: AtomicU64::new(0),
        }
    }

    /// 等待通道
    #[inline]
    fn channel(&self) -> WaitChannel {
        WaitChannel::of(self)
    }

    /// 等待通知（不可中断）
    ///
    /// 调用者必须持有 `lock`；返回时重新持有。可能虚假唤醒，调用者应循环检查条件。
    pub fn wait(&self, kernel: &Kernel, lock: &SpinLock) {
        kernel.sleep(self.channel(), lock);
    }

    /// 等待通知（可中断）
    ///
    /// 当前进程已被 kill 时不再睡眠，返回 `EINTR`；返回时仍持有 `lock`
    pub fn wait_interruptible(&self, kernel: &Kernel, lock: &SpinLock) -> Result<(), Errno> {
        if kernel.killed() {
            return Err(Errno::InterruptedSystemCall);
        }
        kernel.sleep(self.channel(), lock);
        if kernel.killed() {
            return Err(Errno::InterruptedSystemCall);
        }
        Ok(())
    }

    /// 唤醒所有等待者，返回被唤醒的进程数
    pub fn notify_all(&self, kernel: &Kernel) -> usize {
        self.generation.fetch_add(1, Ordering::Relaxed);
        kernel.wakeup(self.channel())
    }

    /// 已发出的通知次数
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Relaxed)
    }
}
