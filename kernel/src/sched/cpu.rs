//! 每 CPU 状态
//!
//! 对应 Linux 的 struct rq 中与当前 CPU 相关的字段以及 xv6 的 `struct cpu`。
//! 所有字段都是原子量：只有本 CPU 上的执行流写入，调试快照可以从任意线程读取。

use core::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crate::arch::CpuId;
use crate::config::TIME_SLICE_TICKS;
use crate::container::ContainerId;
use crate::process::ProcHandle;

/// 无调度器
const NO_SCHED: usize = usize::MAX;

/// 逻辑 CPU
#[derive(Debug)]
pub struct Cpu {
    id: CpuId,
    current_process: AtomicU64,
    current_scheduler: AtomicUsize,
    need_resched: AtomicBool,
    ticks: AtomicU64,
    active_aspace: AtomicUsize,
    dispatches: AtomicU64,
}

impl Cpu {
    pub fn new(id: CpuId) -> Self {
        Self {
            id,
            current_process: AtomicU64::new(ProcHandle::NONE),
            current_scheduler: AtomicUsize::new(NO_SCHED),
            need_resched: AtomicBool::new(false),
            ticks: AtomicU64::new(0),
            active_aspace: AtomicUsize::new(0),
            dispatches: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> CpuId {
        self.id
    }

    /// 正在运行的进程（在子容器调度器中时是该容器的代表进程）
    pub fn current_process(&self) -> Option<ProcHandle> {
        ProcHandle::unpack(self.current_process.load(Ordering::Acquire))
    }

    pub fn set_current_process(&self, proc: Option<ProcHandle>) {
        let raw = proc.map_or(ProcHandle::NONE, ProcHandle::pack);
        self.current_process.store(raw, Ordering::Release);
    }

    /// 正在执行的调度器所属容器
    pub fn current_scheduler(&self) -> Option<ContainerId> {
        match self.current_scheduler.load(Ordering::Acquire) {
            NO_SCHED => None,
            id => Some(ContainerId(id)),
        }
    }

    pub fn set_current_scheduler(&self, id: ContainerId) {
        self.current_scheduler.store(id.0, Ordering::Release);
    }

    /// 切换地址空间（对应写 satp/ttbr0）
    pub fn activate(&self, asid: usize) {
        self.active_aspace.store(asid, Ordering::Release);
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn active_aspace(&self) -> usize {
        self.active_aspace.load(Ordering::Acquire)
    }

    /// 已分派的普通进程次数
    pub fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }

    /// 时钟中断，对应 scheduler_tick()
    ///
    /// 每 `TIME_SLICE_TICKS` 个节拍置一次 need_resched
    pub fn tick(&self) {
        let ticks = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
        if ticks % TIME_SLICE_TICKS as u64 == 0 {
            self.need_resched.store(true, Ordering::Release);
        }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// 取走并清除 need_resched
    pub fn take_need_resched(&self) -> bool {
        self.need_resched.swap(false, Ordering::AcqRel)
    }

    pub fn need_resched(&self) -> bool {
        self.need_resched.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tick_sets_need_resched() {
        let cpu = Cpu::new(0);
        for _ in 1..TIME_SLICE_TICKS {
            cpu.tick();
        }
        assert!(!cpu.need_resched());
        cpu.tick();
        assert!(cpu.take_need_resched());
        assert!(!cpu.need_resched());
    }

    #[test]
    fn test_current_process_roundtrip() {
        let cpu = Cpu::new(1);
        assert_eq!(cpu.current_process(), None);
        let h = ProcHandle::new(ContainerId(3), 5);
        cpu.set_current_process(Some(h));
        assert_eq!(cpu.current_process(), Some(h));
        cpu.set_current_process(None);
        assert_eq!(cpu.current_process(), None);
        cpu.set_current_scheduler(ContainerId::ROOT);
        assert_eq!(cpu.current_scheduler(), Some(ContainerId::ROOT));
    }
}
