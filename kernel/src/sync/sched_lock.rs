//! 调度锁与锁令牌
//!
//! 调度锁保护所有 PCB 的调度状态和每一次 switch。它的特殊之处在于交接：
//! 让出者获取锁，switch 时把锁"带走"，由下一个恢复运行的执行流释放。
//! 因此这里不用作用域守卫，而是用一个不可复制的 `SchedToken` 值表示
//! "持有调度锁"，它随 switch 在执行流之间传递，最终被 `release` 消耗一次。
//!
//! `SchedCell<T>` 是只能凭令牌访问的数据：`get_mut(&mut token)` 的借用规则
//! 保证了在交出令牌（switch）之前所有引用都已失效。

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::spinlock::SpinLock;

/// 调度锁编号分配器，每个内核实例一把锁
static NEXT_LOCK_ID: AtomicUsize = AtomicUsize::new(1);

/// 持有调度锁的凭证
///
/// 不可复制、不可克隆；随 switch 交接给下一个执行流。
#[must_use = "the scheduling lock stays held until the token is released"]
#[derive(Debug)]
pub struct SchedToken {
    lock: usize,
}

/// 调度锁
pub struct SchedLock {
    id: usize,
    raw: SpinLock,
}

impl SchedLock {
    pub fn new() -> Self {
        Self {
            id: NEXT_LOCK_ID.fetch_add(1, Ordering::Relaxed),
            raw: SpinLock::new("sched"),
        }
    }

    /// 获取调度锁
    pub fn acquire(&self) -> SchedToken {
        self.raw.acquire();
        SchedToken { lock: self.id }
    }

    /// 排队获取调度锁，`abandon` 返回 true 时放弃
    pub fn acquire_unless<F>(&self, abandon: F) -> Option<SchedToken>
    where
        F: FnMut() -> bool,
    {
        self.raw.acquire_unless(abandon).then(|| SchedToken { lock: self.id })
    }

    /// 尝试获取调度锁
    pub fn try_acquire(&self) -> Option<SchedToken> {
        if self.raw.try_acquire() {
            Some(SchedToken { lock: self.id })
        } else {
            None
        }
    }

    /// 释放调度锁，消耗令牌
    pub fn release(&self, token: SchedToken) {
        self.check(&token);
        self.raw.release();
    }

    /// 当前 CPU 是否持有调度锁
    pub fn holding(&self) -> bool {
        self.raw.holding()
    }

    #[inline]
    fn check(&self, token: &SchedToken) {
        if token.lock != self.id {
            panic!("sched lock: token of lock {} used with lock {}", token.lock, self.id);
        }
    }
}

impl Default for SchedLock {
    fn default() -> Self {
        Self::new()
    }
}

/// 受调度锁保护的数据
pub struct SchedCell<T> {
    lock: usize,
    value: UnsafeCell<T>,
}

// SAFETY: 访问都要求出示同一把调度锁的令牌，令牌的唯一性保证互斥
unsafe impl<T: Send> Sync for SchedCell<T> {}
unsafe impl<T: Send> Send for SchedCell<T> {}

impl<T> SchedCell<T> {
    pub fn new(lock: &SchedLock, value: T) -> Self {
        Self {
            lock: lock.id,
            value: UnsafeCell::new(value),
        }
    }

    /// 只读访问
    pub fn get<'a>(&'a self, token: &'a SchedToken) -> &'a T {
        self.check(token);
        // SAFETY: 令牌证明持有调度锁，且可变访问需要 `&mut SchedToken`
        unsafe { &*self.value.get() }
    }

    /// 可变访问
    pub fn get_mut<'a>(&'a self, token: &'a mut SchedToken) -> &'a mut T {
        self.check(token);
        // SAFETY: 独占借用令牌，同一时刻只有一个可变引用
        unsafe { &mut *self.value.get() }
    }

    #[inline]
    fn check(&self, token: &SchedToken) {
        if token.lock != self.lock {
            panic!("sched cell: token of lock {} used with cell of lock {}", token.lock, self.lock);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch;

    #[test]
    fn test_token_roundtrip() {
        let lock = SchedLock::new();
        let cell = SchedCell::new(&lock, 0u32);
        let mut token = lock.acquire();
        assert!(lock.holding());
        *cell.get_mut(&mut token) += 5;
        assert_eq!(*cell.get(&token), 5);
        lock.release(token);
        assert!(!lock.holding());
    }

    #[test]
    #[should_panic(expected = "used with cell")]
    fn test_foreign_token_rejected() {
        let a = SchedLock::new();
        let b = SchedLock::new();
        let cell = SchedCell::new(&b, ());
        let token = a.acquire();
        let _ = cell.get(&token);
    }

    #[test]
    fn test_token_crosses_threads() {
        let lock = std::sync::Arc::new(SchedLock::new());
        let local = std::sync::Arc::clone(&lock);
        let token = std::thread::spawn(move || {
            arch::set_cpu_id(0);
            local.acquire()
        })
        .join()
        .unwrap();

        // 同一逻辑 CPU 上的另一个执行流释放
        let remote = std::sync::Arc::clone(&lock);
        std::thread::spawn(move || {
            arch::set_cpu_id(0);
            remote.release(token);
        })
        .join()
        .unwrap();

        let again = lock.try_acquire().expect("lock should be free after hand-off release");
        lock.release(again);
    }
}
