//! CPU 相关操作 (host)
//!
//! 真实硬件上 CPU 编号来自 mhartid/tp 寄存器；宿主机模拟中每个线程在被
//! switch 恢复时记录自己此刻所在的逻辑 CPU。进程线程可能在不同 CPU 上被
//! 恢复，所以编号随每次恢复更新。

use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 逻辑 CPU 编号
pub type CpuId = usize;

thread_local! {
    /// 当前线程所在的逻辑 CPU
    static CPU_ID: Cell<Option<CpuId>> = const { Cell::new(None) };

    /// 不在任何 CPU 上运行的线程使用的锁持有者标签
    static OFF_CPU_TAG: Cell<usize> = const { Cell::new(0) };
}

/// 离线线程标签的起点，与 CPU 编号区间不重叠
static NEXT_OFF_CPU_TAG: AtomicUsize = AtomicUsize::new(usize::MAX / 2);

/// 获取当前逻辑 CPU 编号
///
/// 引导线程、测试主线程等不在任何 CPU 上运行的线程返回 `None`
#[inline]
pub fn cpu_id() -> Option<CpuId> {
    CPU_ID.with(|id| id.get())
}

/// 获取当前逻辑 CPU 编号，不在 CPU 上运行属于内核缺陷
#[inline]
pub fn current_cpu() -> CpuId {
    match cpu_id() {
        Some(id) => id,
        None => panic!("current_cpu: thread {:?} is not running on a cpu", std::thread::current().name()),
    }
}

/// 记录当前线程所在的逻辑 CPU
#[inline]
pub fn set_cpu_id(id: CpuId) {
    CPU_ID.with(|cell| cell.set(Some(id)));
}

/// 自旋锁持有者标签
///
/// 在 CPU 上运行时就是 CPU 编号（与 xv6 的 `lk->cpu == mycpu()` 语义一致）；
/// 离线线程分配一个唯一标签。
pub fn lock_owner_tag() -> usize {
    if let Some(id) = cpu_id() {
        return id;
    }
    OFF_CPU_TAG.with(|tag| {
        if tag.get() == 0 {
            tag.set(NEXT_OFF_CPU_TAG.fetch_add(1, Ordering::Relaxed));
        }
        tag.get()
    })
}

/// 忙等一次
///
/// 每 64 次让出一次宿主 CPU，避免持锁者的宿主线程得不到运行
#[inline]
pub fn cpu_relax(spins: &mut u32) {
    *spins = spins.wrapping_add(1);
    if *spins % 64 == 0 {
        std::thread::yield_now();
    } else {
        core::hint::spin_loop();
    }
}

/// 空闲等待（对应 wfi）
#[inline]
pub fn wait_for_interrupt() {
    std::thread::yield_now();
}
