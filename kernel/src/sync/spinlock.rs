//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 自旋锁 (Spin Lock)
//!
//! 对应 Linux 内核的 ticket spinlock (arch/x86 的 arch_spinlock_t，
//! 后来的 qspinlock 同样保证 FIFO) 以及 xv6 的 `struct spinlock`：
//! - `acquire`: 取号排队，按号忙等，Acquire 语义
//! - `release`: 叫下一个号，Release 语义
//! - `holding`: 当前 CPU 是否持有（只用于断言）
//!
//! 排队保证公平：刚释放锁的 CPU 立即重新获取时排在已等待者之后，
//! 调度循环每个槽位获取一次调度锁，不会把其他 CPU 饿死。
//!
//! 与带数据的 `spin::Mutex` 不同，这是一把"裸"锁：获取和释放不必出现在同一个
//! 作用域中，sleep/wakeup 与调度锁的交接都依赖这一点。

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::arch;

/// 无持有者
const NO_OWNER: usize = usize::MAX;

/// 自旋锁
pub struct SpinLock {
    /// 锁名（调试用）
    name: &'static str,
    /// 下一个发出的号
    next: AtomicUsize,
    /// 正在服务的号
    serving: AtomicUsize,
    /// 持有者标签（CPU 编号）
    owner: AtomicUsize,
}

impl SpinLock {
    /// 创建新的自旋锁
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            next: AtomicUsize::new(0),
            serving: AtomicUsize::new(0),
            owner: AtomicUsize::new(NO_OWNER),
        }
    }

    /// 锁名
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// 获取锁，忙等直到轮到自己
    ///
    /// 同一 CPU 重复获取是内核缺陷，直接 panic
    pub fn acquire(&self) {
        self.acquire_unless(|| false);
    }

    /// 排队获取锁，`abandon` 返回 true 时放弃等待并返回 false
    ///
    /// 放弃后号码不会被叫到，之后所有排队者都将永远等待；只能在停机后使用
    pub fn acquire_unless<F>(&self, mut abandon: F) -> bool
    where
        F: FnMut() -> bool,
    {
        if self.holding() {
            panic!("acquire: {} already held by this cpu", self.name);
        }
        let ticket = self.next.fetch_add(1, Ordering::Relaxed);
        let mut spins = 0u32;
        while self.serving.load(Ordering::Acquire) != ticket {
            if abandon() {
                log::warn!("acquire: {} abandoned ticket {}", self.name, ticket);
                return false;
            }
            arch::cpu_relax(&mut spins);
        }
        self.owner.store(arch::lock_owner_tag(), Ordering::Relaxed);
        true
    }

    /// 尝试获取锁，不等待（只在无人排队时成功）
    pub fn try_acquire(&self) -> bool {
        if self.holding() {
            panic!("try_acquire: {} already held by this cpu", self.name);
        }
        let serving = self.serving.load(Ordering::Relaxed);
        let taken = self
            .next
            .compare_exchange(serving, serving.wrapping_add(1), Ordering::Acquire, Ordering::Relaxed)
            .is_ok();
        if taken {
            self.owner.store(arch::lock_owner_tag(), Ordering::Relaxed);
        }
        taken
    }

    /// 释放锁
    ///
    /// 释放未持有的锁是内核缺陷，直接 panic
    pub fn release(&self) {
        if !self.holding() {
            panic!("release: {} not held by this cpu", self.name);
        }
        self.owner.store(NO_OWNER, Ordering::Relaxed);
        let serving = self.serving.load(Ordering::Relaxed);
        self.serving.store(serving.wrapping_add(1), Ordering::Release);
    }

    /// 当前 CPU 是否持有此锁
    pub fn holding(&self) -> bool {
        self.is_locked() && self.owner.load(Ordering::Relaxed) == arch::lock_owner_tag()
    }

    /// 是否被任意 CPU 持有（或有人排队）
    pub fn is_locked(&self) -> bool {
        self.queued() != 0
    }

    /// 持有者加排队者的数量
    pub fn queued(&self) -> usize {
        let serving = self.serving.load(Ordering::Relaxed);
        self.next.load(Ordering::Relaxed).wrapping_sub(serving)
    }
}

impl core::fmt::Debug for SpinLock {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SpinLock")
            .field("name", &self.name)
            .field("locked", &self.is_locked())
            .finish()
    }
}
