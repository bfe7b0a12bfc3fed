//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程退出、等待与 kill
//!
//! 对应 Linux 的 kernel/exit.c (do_exit/do_wait/forget_original_parent)
//! 和 kernel/signal.c 中 SIGKILL 的投递：
//! - exit: 关闭文件、唤醒父进程、把子进程过继给容器的 init、变成僵尸
//! - wait: 回收一个僵尸子进程；没有子进程立即返回 ECHILD
//! - kill: 置 killed 标志，进程在下一个系统调用边界以 -1 退出；init 受保护

use super::task::{ProcFlags, ProcHandle, ProcState};
use super::wait::{wake_matching, WaitChannel};
use super::Pid;
use crate::container::ContainerId;
use crate::errno::Errno;
use crate::kernel::Kernel;

impl Kernel {
    /// 当前进程退出，永不返回
    ///
    /// # Panics
    /// 根容器的 init 退出，或非 dying 容器的 init 退出
    pub fn exit(&self, status: i32) -> ! {
        let me = self.myproc();
        let container = self.live(me.container);

        let token = self.lock_sched();
        let is_init = container.scheduler.table(&token)[me.index].flags.contains(ProcFlags::INIT);
        self.unlock_sched(token);
        if is_init && (container.id.is_root() || !container.is_dying()) {
            panic!("exit: init of {} exiting with status {}", container.id, status);
        }

        let (files, cwd) = {
            let mut data = container.scheduler.data(me.index);
            let files = core::mem::replace(&mut data.ofile, core::array::from_fn(|_| None));
            (files, data.cwd.take())
        };
        for file in files.into_iter().flatten() {
            self.fs().fclose(file);
        }
        if let Some(cwd) = cwd {
            self.fs().iput(cwd);
        }

        let mut token = self.lock_sched();
        let reaper = container.reaper().filter(|reaper| *reaper != me);
        {
            let table = container.scheduler.table_mut(&mut token);
            if let Some(parent) = table[me.index].parent {
                wake_matching(table, WaitChannel::Proc(parent), None);
            }

            let mut orphan_zombie = false;
            for pcb in table.iter_mut() {
                if pcb.parent == Some(me) {
                    pcb.parent = reaper;
                    orphan_zombie |= pcb.state == ProcState::Zombie;
                }
            }
            if let (true, Some(reaper)) = (orphan_zombie, reaper) {
                wake_matching(table, WaitChannel::Proc(reaper), None);
            }

            let pcb = &mut table[me.index];
            pcb.xstate = status;
            pcb.state = ProcState::Zombie;
        }
        if container.is_dying() {
            self.wake_destroyers(&container, &mut token);
        }
        log::debug!("exit: {} status {}", me, status);

        let _token = self.sched(me, &container, token);
        panic!("exit: zombie {} resumed", me)
    }

    /// 等待一个子进程退出，返回它的 pid
    pub fn wait(&self) -> Result<Pid, Errno> {
        self.wait_status().map(|(pid, _)| pid)
    }

    /// 等待一个子进程退出，返回 (pid, 退出状态)
    pub fn wait_status(&self) -> Result<(Pid, i32), Errno> {
        let me = self.myproc();
        let container = self.live(me.container);
        let mut token = self.lock_sched();
        loop {
            let mut have_kids = false;
            let mut zombie = None;
            for (index, pcb) in container.scheduler.table(&token).iter().enumerate() {
                if pcb.parent == Some(me) {
                    have_kids = true;
                    if pcb.state == ProcState::Zombie {
                        zombie = Some(index);
                        break;
                    }
                }
            }

            if let Some(index) = zombie {
                let reaped = self.reclaim(&container, ProcHandle::new(container.id, index), &mut token);
                self.unlock_sched(token);
                return Ok(reaped);
            }
            if !have_kids {
                self.unlock_sched(token);
                return Err(Errno::NoChild);
            }
            if container.scheduler.table(&token)[me.index].killed() {
                self.unlock_sched(token);
                return Err(Errno::InterruptedSystemCall);
            }
            token = self.sleep_locked(WaitChannel::Proc(me), token);
        }
    }

    /// kill：按调用者命名空间中的 pid 终止进程（可以是子孙容器中的进程）
    pub fn kill(&self, pid: Pid) -> Result<(), Errno> {
        let scope = match self.current_process() {
            Some(me) => me.container,
            None => ContainerId::ROOT,
        };
        self.kill_in(scope, pid)
    }

    /// 在指定容器的命名空间中按 pid 终止进程
    ///
    /// 代表进程不能被 kill；容器的 init 只有在容器终止后才能被 kill
    pub fn kill_in(&self, scope: ContainerId, pid: Pid) -> Result<(), Errno> {
        let container = self.container(scope)?;
        let mut token = self.lock_sched();
        let Some(target) = container.lookup(pid) else {
            self.unlock_sched(token);
            return Err(Errno::NoSuchProcess);
        };
        let owner = self.live(target.container);
        let result = {
            let pcb = &mut owner.scheduler.table_mut(&mut token)[target.index];
            let protected_init =
                pcb.flags.contains(ProcFlags::INIT) && (owner.id.is_root() || !owner.is_dying());
            if pcb.is_representative() || protected_init {
                Err(Errno::OperationNotPermitted)
            } else {
                pcb.flags |= ProcFlags::KILLED;
                if pcb.state == ProcState::Sleeping {
                    pcb.state = ProcState::Runnable;
                }
                Ok(())
            }
        };
        self.unlock_sched(token);
        if result.is_ok() {
            log::debug!("kill: pid {} in {} -> {}", pid, scope, target);
        }
        result
    }

    /// 当前进程是否已被 kill
    pub fn killed(&self) -> bool {
        let Some(me) = self.current_process() else {
            return false;
        };
        let Some(container) = self.containers().get(me.container) else {
            return false;
        };
        let token = self.lock_sched();
        let killed = container.scheduler.table(&token)[me.index].killed();
        self.unlock_sched(token);
        killed
    }
}
