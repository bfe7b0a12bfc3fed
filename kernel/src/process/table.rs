//! 进程表槽位的分配与回收
//!
//! 对应 xv6 的 allocproc()/freeproc() 和 Linux 的 copy_process() 前半段、
//! release_task()。
//!
//! 分配分两半：
//! - `alloc_pcb`: 槽位 + pid（容器代表进程只需要这一半）
//! - `alloc_process`: 再加上内核栈页和执行上下文，第一次被恢复时进入 forkret
//!
//! 任何一步失败都完整回滚。

use alloc::format;

use super::task::{KernelStack, Pcb, ProcData, ProcHandle, ProcState};
use super::usermod::forkret;
use crate::arch::{context, ExecutionContext};
use crate::container::Container;
use crate::errno::Errno;
use crate::kernel::Kernel;
use crate::mm::FrameAllocator;
use crate::process::Pid;
use crate::sync::SchedToken;

impl Kernel {
    /// 分配一个 EMBRYO 槽位并登记 pid
    pub(crate) fn alloc_pcb(&self, container: &Container) -> Result<ProcHandle, Errno> {
        let mut token = self.lock_sched();
        let result = self.alloc_pcb_locked(container, &mut token);
        self.unlock_sched(token);
        result
    }

    fn alloc_pcb_locked(&self, container: &Container, token: &mut SchedToken) -> Result<ProcHandle, Errno> {
        if container.is_dying() {
            return Err(Errno::OperationNotPermitted);
        }
        let index = container
            .scheduler
            .table(token)
            .iter()
            .position(|pcb| pcb.state == ProcState::Unused)
            .ok_or(Errno::TryAgain)?;
        let handle = ProcHandle::new(container.id, index);
        let pid = self.register_pid(container, handle)?;

        let pcb = &mut container.scheduler.table_mut(token)[index];
        *pcb = Pcb::unused();
        pcb.state = ProcState::Embryo;
        pcb.pid = pid;
        Ok(handle)
    }

    /// 分配一个带内核栈的 EMBRYO 进程
    pub(crate) fn alloc_process(&self, container: &Container) -> Result<ProcHandle, Errno> {
        let handle = self.alloc_pcb(container)?;
        if let Err(e) = self.attach_kstack(container, handle) {
            let mut token = self.lock_sched();
            self.reclaim(container, handle, &mut token);
            self.unlock_sched(token);
            return Err(e);
        }
        Ok(handle)
    }

    fn attach_kstack(&self, container: &Container, handle: ProcHandle) -> Result<(), Errno> {
        let page = self.memory().alloc_page().ok_or(Errno::OutOfMemory)?;
        let context = ExecutionContext::new(format!("{}", handle), self.power());
        let kernel = self.arc();
        if let Err(e) = context::spawn(&context, move |token| forkret(kernel, handle, token)) {
            log::warn!("proc: failed to start kernel thread for {}: {}", handle, e);
            self.memory().free_page(page);
            return Err(Errno::OutOfMemory);
        }
        container.scheduler.data(handle.index).kstack = Some(KernelStack { page, context });
        Ok(())
    }

    /// 回收一个 EMBRYO 或 ZOMBIE 槽位，返回 (pid, 退出状态)
    ///
    /// 持有调度锁调用：退役内核栈、释放页和地址空间、关闭残留的文件、
    /// 注销所有命名空间中的 pid，槽位变回 UNUSED
    pub(crate) fn reclaim(&self, container: &Container, handle: ProcHandle, token: &mut SchedToken) -> (Pid, i32) {
        let (pid, xstate) = {
            let pcb = &mut container.scheduler.table_mut(token)[handle.index];
            match pcb.state {
                ProcState::Embryo | ProcState::Zombie => {}
                state => panic!("reclaim: {} in state {:?}", handle, state),
            }
            let taken = (pcb.pid, pcb.xstate);
            *pcb = Pcb::unused();
            taken
        };

        let data = core::mem::take(&mut *container.scheduler.data(handle.index));
        let ProcData {
            kstack,
            aspace,
            ofile,
            cwd,
            ..
        } = data;
        if let Some(kstack) = kstack {
            kstack.context.retire();
            self.memory().free_page(kstack.page);
        }
        if let Some(space) = aspace {
            space.destroy(self.memory());
        }
        for file in ofile.into_iter().flatten() {
            self.fs().fclose(file);
        }
        if let Some(cwd) = cwd {
            self.fs().iput(cwd);
        }

        self.unregister_pid(container, handle);
        log::debug!("proc: reclaimed {} (pid {}, status {})", handle, pid, xstate);
        (pid, xstate)
    }
}
