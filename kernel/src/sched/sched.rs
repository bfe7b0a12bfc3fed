//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器实现
//!
//! 对应 Linux 的 kernel/sched/core.c (schedule/__schedule/context_switch)
//! 与 xv6 的 scheduler()/sched()/yield()。
//!
//! 每个容器一个调度器：固定容量的进程表，每个 CPU 一个保存的调度上下文。
//! 调度器之间组成一棵树：
//! - 根调度器运行在 CPU 的引导线程上
//! - 父调度器选中子容器的代表进程时，CPU 切换到子调度器在这个 CPU 上的上下文
//! - 子调度器每分派一次或完成一次完整扫描后让回父调度器
//!
//! 调度锁在每次 switch 时随令牌交接，由下一个恢复运行的执行流释放。

use alloc::boxed::Box;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::policy::SchedPolicy;
use crate::arch::{self, context, CpuId, ExecutionContext, Power};
use crate::container::{Container, ContainerId};
use crate::kernel::Kernel;
use crate::process::{Pcb, ProcData, ProcHandle, ProcState};
use crate::sync::{SchedCell, SchedLock, SchedToken};

/// 容器调度器
pub struct Scheduler {
    container: ContainerId,
    parent: Option<ContainerId>,
    policy: Box<dyn SchedPolicy>,
    /// 进程表的调度半部，由调度锁保护
    table: SchedCell<Vec<Pcb>>,
    /// 进程表的资源半部
    slots: Box<[spin::Mutex<ProcData>]>,
    /// 每个 CPU 一个调度上下文
    contexts: Box<[Arc<ExecutionContext>]>,
}

impl Scheduler {
    pub(crate) fn new(
        container: ContainerId,
        parent: Option<ContainerId>,
        policy: Box<dyn SchedPolicy>,
        nproc: usize,
        ncpu: usize,
        lock: &SchedLock,
        power: &Arc<Power>,
    ) -> Self {
        let contexts: Vec<Arc<ExecutionContext>> = (0..ncpu)
            .map(|cpu| ExecutionContext::new(format!("{}-sched{}", container, cpu), power))
            .collect();
        let slots: Vec<spin::Mutex<ProcData>> = (0..nproc).map(|_| spin::Mutex::new(ProcData::new())).collect();
        Self {
            container,
            parent,
            policy,
            table: SchedCell::new(lock, alloc::vec![Pcb::unused(); nproc]),
            slots: slots.into_boxed_slice(),
            contexts: contexts.into_boxed_slice(),
        }
    }

    pub fn container(&self) -> ContainerId {
        self.container
    }

    pub fn parent(&self) -> Option<ContainerId> {
        self.parent
    }

    pub fn policy(&self) -> &dyn SchedPolicy {
        self.policy.as_ref()
    }

    /// 进程表容量
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// 进程表（只读）
    pub fn table<'a>(&'a self, token: &'a SchedToken) -> &'a [Pcb] {
        self.table.get(token)
    }

    /// 进程表（可变）
    pub fn table_mut<'a>(&'a self, token: &'a mut SchedToken) -> &'a mut [Pcb] {
        self.table.get_mut(token)
    }

    /// 槽位的私有资源
    pub fn data(&self, index: usize) -> spin::MutexGuard<'_, ProcData> {
        self.slots[index].lock()
    }

    /// 本调度器在 `cpu` 上的上下文
    pub fn context(&self, cpu: CpuId) -> &Arc<ExecutionContext> {
        &self.contexts[cpu]
    }

    pub(crate) fn contexts(&self) -> &[Arc<ExecutionContext>] {
        &self.contexts
    }

    /// 进程的执行上下文
    fn proc_context(&self, index: usize) -> Arc<ExecutionContext> {
        match self.data(index).context() {
            Some(ctx) => ctx,
            None => panic!("sched: {}/{} has no kernel stack", self.container, index),
        }
    }
}

impl core::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Scheduler")
            .field("container", &self.container)
            .field("policy", &self.policy.name())
            .field("capacity", &self.capacity())
            .finish()
    }
}

/// 调度循环，永不返回
///
/// 进入时不持有调度锁
pub(crate) fn run(kernel: &Kernel, container: &Container) -> ! {
    let scheduler = &container.scheduler;
    let cpu_id = arch::current_cpu();
    let cpu = kernel.cpu(cpu_id);
    let own = scheduler.context(cpu_id);
    let capacity = scheduler.capacity();
    log::debug!("sched: cpu{} enters {} ({})", cpu_id, container.id, scheduler.policy.name());

    loop {
        let mut ran = false;
        for step in 0..capacity {
            if kernel.power().is_halted() {
                context::terminate();
            }
            let index = scheduler.policy.pick(step, capacity);
            let mut token = kernel.lock_sched();

            let dispatch = {
                let pcb = &mut scheduler.table_mut(&mut token)[index];
                if pcb.state == ProcState::Runnable {
                    pcb.state = ProcState::Running;
                    Some(pcb.child)
                } else {
                    None
                }
            };

            if let Some(child) = dispatch {
                ran = true;
                let handle = ProcHandle::new(container.id, index);
                cpu.set_current_process(Some(handle));
                token = match child {
                    Some(child) => {
                        let child = kernel.live(child);
                        arch::switch(own, child.scheduler.context(cpu_id), token)
                    }
                    None => {
                        let (asid, ctx) = {
                            let data = scheduler.data(index);
                            let asid = data.aspace.as_ref().map_or(0, |space| space.id());
                            match data.context() {
                                Some(ctx) => (asid, ctx),
                                None => panic!("sched: runnable {} has no kernel stack", handle),
                            }
                        };
                        cpu.activate(asid);
                        cpu.record_dispatch();
                        arch::switch(own, &ctx, token)
                    }
                };
                cpu.set_current_process(container.rep);
                token = yield_scheduler(kernel, container, token);
            }
            kernel.unlock_sched(token);
        }

        let token = kernel.lock_sched();
        let token = yield_scheduler(kernel, container, token);
        kernel.unlock_sched(token);

        if !ran {
            arch::wait_for_interrupt();
        }
    }
}

/// 让回父调度器
///
/// 根容器上是空操作。持有调度锁调用，返回时仍持有。
pub(crate) fn yield_scheduler(kernel: &Kernel, container: &Container, mut token: SchedToken) -> SchedToken {
    let (Some(parent_id), Some(rep)) = (container.parent, container.rep) else {
        return token;
    };
    let cpu_id = arch::current_cpu();
    let parent = kernel.live(parent_id);

    kernel.cpu(cpu_id).set_current_scheduler(parent_id);
    parent.scheduler.table_mut(&mut token)[rep.index].state = ProcState::Runnable;
    if container.is_dying() {
        kernel.wake_destroyers(container, &mut token);
    }

    token = arch::switch(
        container.scheduler.context(cpu_id),
        parent.scheduler.context(cpu_id),
        token,
    );

    kernel.cpu(arch::current_cpu()).set_current_scheduler(container.id);
    token
}

/// 子容器调度上下文第一次被恢复时的入口
pub(crate) fn container_entry(kernel: Arc<Kernel>, id: ContainerId, token: SchedToken) {
    let cpu_id = arch::current_cpu();
    kernel.cpu(cpu_id).set_current_scheduler(id);
    kernel.unlock_sched(token);
    let container = kernel.live(id);
    run(&kernel, &container)
}

impl Kernel {
    /// 从当前进程切换回它所在容器的调度器
    ///
    /// 调用者持有调度锁并已把自己的状态改为非 RUNNING
    pub(crate) fn sched(&self, me: ProcHandle, container: &Container, token: SchedToken) -> SchedToken {
        if !self.sched_lock().holding() {
            panic!("sched: sched lock not held");
        }
        let cpu_id = arch::current_cpu();
        let cpu = self.cpu(cpu_id);
        let state = container.scheduler.table(&token)[me.index].state;
        if state == ProcState::Running {
            panic!("sched: {} still running", me);
        }
        if cpu.current_process() != Some(me) {
            panic!("sched: {} is not the current process of cpu{}", me, cpu_id);
        }
        if cpu.current_scheduler() != Some(me.container) {
            panic!("sched: cpu{} is not running the scheduler of {}", cpu_id, me.container);
        }

        let ctx = container.scheduler.proc_context(me.index);
        arch::switch(&ctx, container.scheduler.context(cpu_id), token)
    }

    /// 主动让出 CPU，对应 sched_yield()
    pub fn yield_now(&self) {
        let me = self.myproc();
        let container = self.live(me.container);
        let mut token = self.lock_sched();
        container.scheduler.table_mut(&mut token)[me.index].state = ProcState::Runnable;
        token = self.sched(me, &container, token);
        self.unlock_sched(token);
    }
}
