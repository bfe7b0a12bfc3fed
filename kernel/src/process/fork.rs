//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程创建
//!
//! 对应 Linux 的 kernel/fork.c (kernel_clone/copy_process) 与 xv6 的 fork()：
//! - 在调用者的进程表中分配子进程
//! - 复制地址空间、陷入帧（子进程 x0 = 0）
//! - 复制打开文件和 cwd 的引用
//!
//! `spawn_process` 直接构造一个新程序的进程，用来启动容器的 init。

use alloc::string::String;

use super::task::{ProcFlags, ProcHandle, ProcState};
use super::usermod::Program;
use super::Pid;
use crate::arch::Trapframe;
use crate::config::{NOFILE, PAGE_SIZE};
use crate::container::{Container, ContainerId};
use crate::errno::Errno;
use crate::fs::{FileRef, InodeRef};
use crate::kernel::Kernel;
use crate::mm::AddressSpace;

/// 从父进程拷贝出来、等待装入子进程的资源
struct Inherited {
    space: AddressSpace,
    tf: Trapframe,
    entry: Option<Program>,
    name: String,
    files: [Option<FileRef>; NOFILE],
    cwd: Option<InodeRef>,
}

impl Kernel {
    /// fork：返回子进程在调用者命名空间中的 pid
    pub fn fork(&self) -> Result<Pid, Errno> {
        let me = self.myproc();
        let container = self.live(me.container);
        let child = self.alloc_process(&container)?;

        let inherited = match self.inherit(&container, me) {
            Ok(inherited) => inherited,
            Err(e) => {
                let mut token = self.lock_sched();
                self.reclaim(&container, child, &mut token);
                self.unlock_sched(token);
                log::debug!("fork: {} failed: {}", me, e);
                return Err(e);
            }
        };

        {
            let mut data = container.scheduler.data(child.index);
            data.aspace = Some(inherited.space);
            data.tf = inherited.tf;
            data.tf.set_ret(0);
            data.entry = inherited.entry;
            data.name = inherited.name;
            data.ofile = inherited.files;
            data.cwd = inherited.cwd;
        }

        let mut token = self.lock_sched();
        let pid = {
            let pcb = &mut container.scheduler.table_mut(&mut token)[child.index];
            pcb.parent = Some(me);
            pcb.state = ProcState::Runnable;
            pcb.pid
        };
        self.unlock_sched(token);

        log::debug!("fork: {} -> {} (pid {})", me, child, pid);
        Ok(pid)
    }

    fn inherit(&self, container: &Container, me: ProcHandle) -> Result<Inherited, Errno> {
        let parent = container.scheduler.data(me.index);
        let space = match parent.aspace.as_ref() {
            Some(space) => space.copy(self.memory())?,
            None => return Err(Errno::BadAddress),
        };
        let files = core::array::from_fn(|fd| parent.ofile[fd].as_ref().map(|file| self.fs().fdup(file)));
        let cwd = parent.cwd.as_ref().map(|cwd| self.fs().idup(cwd));
        Ok(Inherited {
            space,
            tf: parent.tf,
            entry: parent.entry.clone(),
            name: parent.name.clone(),
            files,
            cwd,
        })
    }

    /// 在容器中创建一个运行 `program` 的新进程，返回它在该容器中的 pid
    ///
    /// 容器的第一个进程成为它的 init（回收者），之后的进程以 init 为父进程
    pub fn spawn_process(&self, id: ContainerId, name: &str, program: Program) -> Result<Pid, Errno> {
        let container = self.container(id)?;
        let handle = self.alloc_process(&container)?;

        let image = self.user_image().and_then(|space| match self.fs().root() {
            Ok(cwd) => Ok((space, cwd)),
            Err(e) => {
                space.destroy(self.memory());
                Err(e)
            }
        });
        let (space, cwd) = match image {
            Ok(image) => image,
            Err(e) => {
                let mut token = self.lock_sched();
                self.reclaim(&container, handle, &mut token);
                self.unlock_sched(token);
                return Err(e);
            }
        };

        {
            let mut data = container.scheduler.data(handle.index);
            data.name = name.into();
            data.aspace = Some(space);
            data.tf = Trapframe::user_entry(0, PAGE_SIZE as u64);
            data.entry = Some(program);
            data.cwd = Some(cwd);
        }

        let mut token = self.lock_sched();
        let init = container.adopt_reaper(handle);
        let reaper = container.reaper();
        let pid = {
            let pcb = &mut container.scheduler.table_mut(&mut token)[handle.index];
            if init {
                pcb.flags |= ProcFlags::INIT;
            } else {
                pcb.parent = reaper;
            }
            pcb.state = ProcState::Runnable;
            pcb.pid
        };
        self.unlock_sched(token);

        log::debug!("proc: spawned {} '{}' in {} (pid {}{})", handle, name, id, pid, if init { ", init" } else { "" });
        Ok(pid)
    }

    /// 一页大小的新用户镜像
    pub(crate) fn user_image(&self) -> Result<AddressSpace, Errno> {
        let mut space = AddressSpace::create(self.memory())?;
        if let Err(e) = space.grow(self.memory(), PAGE_SIZE) {
            space.destroy(self.memory());
            return Err(e);
        }
        Ok(space)
    }

    /// 在根容器中启动第一个进程
    pub fn spawn_init(&self, name: &str, program: Program) -> Result<Pid, Errno> {
        self.spawn_process(ContainerId::ROOT, name, program)
    }
}
