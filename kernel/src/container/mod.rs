//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 容器：调度隔离域
//!
//! 容器组成一棵树。每个容器拥有自己的调度器（进程表 + 调度策略）和 pid
//! 命名空间；非根容器在父容器的进程表中由一个代表进程表示，父调度器分派
//! 这个代表进程时，CPU 进入子容器的调度循环。
//!
//! 对应 Linux 中 cgroup + pid_namespace 的组合，但隔离只体现在进程表分区上。
//!
//! 生命周期：spawn → running → dying (`kill_container`) → destroyed
//! (`destroy_container`)。

pub mod registry;

use alloc::boxed::Box;
use alloc::format;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

pub use registry::ContainerRegistry;

use crate::arch::context;
use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::process::{Pid, ProcFlags, ProcHandle, ProcState, WaitChannel};
use crate::sched::{self, PidNamespace, SchedPolicy, Scheduler};
use crate::sync::SchedToken;

/// 容器编号
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub usize);

impl ContainerId {
    /// 根容器
    pub const ROOT: Self = Self(0);

    pub fn is_root(self) -> bool {
        self == Self::ROOT
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// 容器
pub struct Container {
    pub(crate) id: ContainerId,
    /// 根容器为 `None`
    pub(crate) parent: Option<ContainerId>,
    /// 父容器进程表中的代表进程，根容器为 `None`
    pub(crate) rep: Option<ProcHandle>,
    pub(crate) scheduler: Scheduler,
    /// 容器锁：保护 pid 命名空间
    pub(crate) pids: spin::Mutex<PidNamespace>,
    /// 容器的 init，第一个被创建的进程
    reaper: spin::Once<ProcHandle>,
    dying: AtomicBool,
}

impl Container {
    pub(crate) fn new(
        id: ContainerId,
        parent: Option<ContainerId>,
        rep: Option<ProcHandle>,
        scheduler: Scheduler,
        npid: usize,
    ) -> Self {
        Self {
            id,
            parent,
            rep,
            scheduler,
            pids: spin::Mutex::new(PidNamespace::new(npid)),
            reaper: spin::Once::new(),
            dying: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn parent(&self) -> Option<ContainerId> {
        self.parent
    }

    pub fn representative(&self) -> Option<ProcHandle> {
        self.rep
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// 容器的回收者
    pub fn reaper(&self) -> Option<ProcHandle> {
        self.reaper.get().copied()
    }

    /// 第一个进程成为回收者，返回是否设置成功
    pub(crate) fn adopt_reaper(&self, handle: ProcHandle) -> bool {
        let mut adopted = false;
        self.reaper.call_once(|| {
            adopted = true;
            handle
        });
        adopted
    }

    pub fn is_dying(&self) -> bool {
        self.dying.load(Ordering::Acquire)
    }

    /// 按本容器的 pid 查找进程（可能位于子孙容器中）
    pub fn lookup(&self, pid: Pid) -> Option<ProcHandle> {
        self.pids.lock().lookup(pid)
    }

    /// 进程在本容器命名空间中的 pid
    pub fn pid_of(&self, handle: ProcHandle) -> Option<Pid> {
        self.pids.lock().pid_of(handle)
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("id", &self.id)
            .field("parent", &self.parent)
            .field("rep", &self.rep)
            .field("dying", &self.is_dying())
            .finish()
    }
}

impl Kernel {
    /// 在所属容器及所有祖先容器中为进程分配 pid，返回所属容器中的 pid
    ///
    /// 持有调度锁调用。容器锁按 子 → 父 的顺序嵌套。
    pub(crate) fn register_pid(&self, container: &Container, handle: ProcHandle) -> Result<Pid, Errno> {
        let mut pids = container.pids.lock();
        let pid = pids.alloc(handle)?;
        if let Some(parent) = container.parent {
            let parent = self.live(parent);
            if let Err(e) = self.register_pid(&parent, handle) {
                pids.release(pid);
                return Err(e);
            }
        }
        Ok(pid)
    }

    /// 从所属容器及所有祖先容器注销进程
    pub(crate) fn unregister_pid(&self, container: &Container, handle: ProcHandle) {
        container.pids.lock().remove(handle);
        let mut next = container.parent;
        while let Some(id) = next {
            let ancestor = self.live(id);
            ancestor.pids.lock().remove(handle);
            next = ancestor.parent;
        }
    }

    /// 创建子容器，返回新容器编号
    pub fn spawn_container(&self, parent: ContainerId, policy: Box<dyn SchedPolicy>) -> Result<ContainerId, Errno> {
        let parent_container = self.container(parent)?;
        if parent_container.is_dying() {
            return Err(Errno::OperationNotPermitted);
        }
        let id = self.containers().reserve()?;

        let rep = match self.alloc_pcb(&parent_container) {
            Ok(rep) => rep,
            Err(e) => {
                self.containers().release(id);
                return Err(e);
            }
        };

        let scheduler = Scheduler::new(
            id,
            Some(parent),
            policy,
            self.config().nproc,
            self.config().ncpu,
            self.sched_lock(),
            self.power(),
        );
        let container = Arc::new(Container::new(id, Some(parent), Some(rep), scheduler, self.config().npid));

        for ctx in container.scheduler.contexts() {
            let kernel = self.arc();
            if let Err(e) = context::spawn(ctx, move |token| sched::container_entry(kernel, id, token)) {
                log::warn!("container: failed to start scheduler thread for {}: {}", id, e);
                for ctx in container.scheduler.contexts() {
                    ctx.retire();
                }
                let mut token = self.lock_sched();
                self.reclaim(&parent_container, rep, &mut token);
                self.unlock_sched(token);
                self.containers().release(id);
                return Err(Errno::OutOfMemory);
            }
        }

        self.containers().install(Arc::clone(&container));
        parent_container.scheduler.data(rep.index).name = format!("{}", id);

        let mut token = self.lock_sched();
        {
            let pcb = &mut parent_container.scheduler.table_mut(&mut token)[rep.index];
            pcb.flags |= ProcFlags::CONTAINER;
            pcb.child = Some(id);
            pcb.state = ProcState::Runnable;
        }
        self.unlock_sched(token);

        log::debug!(
            "container: spawned {} under {} ({}), representative {}",
            id,
            parent,
            container.scheduler.policy().name(),
            rep
        );
        Ok(id)
    }

    /// 终止容器：标记 dying，kill 其中（以及子孙容器中）所有进程
    pub fn kill_container(&self, id: ContainerId) -> Result<(), Errno> {
        if id.is_root() {
            return Err(Errno::OperationNotPermitted);
        }
        let container = self.container(id)?;
        let mut token = self.lock_sched();
        let killed = self.kill_tree(&container, &mut token);
        self.unlock_sched(token);
        log::debug!("container: {} dying, {} processes killed", id, killed);
        Ok(())
    }

    fn kill_tree(&self, container: &Container, token: &mut SchedToken) -> usize {
        container.dying.store(true, Ordering::Release);
        let mut killed = 0;
        let mut children = Vec::new();
        for pcb in container.scheduler.table_mut(token).iter_mut() {
            if let Some(child) = pcb.child {
                children.push(child);
                continue;
            }
            if pcb.is_live() {
                pcb.flags |= ProcFlags::KILLED;
                if pcb.state == ProcState::Sleeping {
                    pcb.state = ProcState::Runnable;
                }
                killed += 1;
            }
        }
        for child in children {
            let child = self.live(child);
            killed += self.kill_tree(&child, token);
        }
        killed
    }

    /// 销毁已终止的容器
    ///
    /// 由祖先容器中的进程调用。仍登记着的子孙容器自底向上先被销毁；每一层
    /// 等待其中所有进程退出，回收僵尸、调度上下文和代表进程，最后释放容器编号
    pub fn destroy_container(&self, id: ContainerId) -> Result<(), Errno> {
        if id.is_root() {
            return Err(Errno::OperationNotPermitted);
        }
        let container = self.container(id)?;
        if !container.is_dying() {
            return Err(Errno::DeviceOrResourceBusy);
        }
        let me = self.myproc();
        if !self.is_ancestor(me.container, &container) {
            return Err(Errno::OperationNotPermitted);
        }
        self.teardown(&container, me)
    }

    /// `ancestor` 是否是 `container` 的真祖先
    fn is_ancestor(&self, ancestor: ContainerId, container: &Container) -> bool {
        let mut next = container.parent;
        while let Some(id) = next {
            if id == ancestor {
                return true;
            }
            next = self.containers().get(id).and_then(|c| c.parent);
        }
        false
    }

    fn teardown(&self, container: &Container, me: ProcHandle) -> Result<(), Errno> {
        let id = container.id;
        for child in self.containers().children(id) {
            let child = self.container(child)?;
            if !child.is_dying() {
                return Err(Errno::DeviceOrResourceBusy);
            }
            self.teardown(&child, me)?;
        }
        let (Some(parent_id), Some(rep)) = (container.parent, container.rep) else {
            return Err(Errno::OperationNotPermitted);
        };
        let parent = self.live(parent_id);
        let caller = self.live(me.container);

        let mut token = self.lock_sched();
        loop {
            let busy = container.scheduler.table(&token).iter().any(|pcb| pcb.is_live())
                || parent.scheduler.table(&token)[rep.index].state == ProcState::Running;
            if !busy {
                break;
            }
            if caller.scheduler.table(&token)[me.index].killed() {
                self.unlock_sched(token);
                return Err(Errno::InterruptedSystemCall);
            }
            token = self.sleep_locked(WaitChannel::Container(id), token);
        }

        for index in 0..container.scheduler.capacity() {
            if container.scheduler.table(&token)[index].state == ProcState::Zombie {
                self.reclaim(container, ProcHandle::new(id, index), &mut token);
            }
        }
        for ctx in container.scheduler.contexts() {
            ctx.retire();
        }
        parent.scheduler.table_mut(&mut token)[rep.index].state = ProcState::Zombie;
        self.reclaim(&parent, rep, &mut token);
        self.containers().release(id);
        self.unlock_sched(token);

        log::debug!("container: destroyed {}", id);
        Ok(())
    }

    /// 唤醒祖先容器中等待销毁 `container` 的进程
    ///
    /// 持有调度锁调用
    pub(crate) fn wake_destroyers(&self, container: &Container, token: &mut SchedToken) {
        let mut next = container.parent;
        while let Some(id) = next {
            self.wakeup_in(id, WaitChannel::Container(container.id), None, token);
            next = self.live(id).parent;
        }
    }
}
