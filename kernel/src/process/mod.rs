//! 进程管理模块
//!
//! 本模块实现进程管理功能，遵循 Linux 内核的进程模型：
//! - `task`: 进程控制块 (task_struct)
//! - `table`: 进程表槽位的分配与回收
//! - `wait`: 睡眠与唤醒 (kernel/sched/wait.c)
//! - `fork`: 进程创建 (kernel/fork.c)
//! - `exit`: 退出、等待与 kill (kernel/exit.c)
//! - `exec`: 程序替换与 sbrk
//! - `fd`: 文件描述符表
//! - `usermod`: 用户模式执行

pub mod exec;
pub mod exit;
pub mod fd;
pub mod fork;
pub mod table;
pub mod task;
pub mod usermod;
pub mod wait;

pub use task::{Fd, KernelStack, Pcb, Pid, ProcData, ProcFlags, ProcHandle, ProcState};
pub use usermod::{program, Program, UserContext};
pub use wait::WaitChannel;

use crate::arch::Trapframe;
use crate::errno::Errno;
use crate::kernel::Kernel;

impl Kernel {
    /// 当前进程，不在进程上下文中属于内核缺陷
    pub fn myproc(&self) -> ProcHandle {
        match self.current_process() {
            Some(me) => me,
            None => panic!("myproc: no current process"),
        }
    }

    /// 当前进程在所属容器中的 pid
    pub fn getpid(&self) -> Pid {
        let me = self.myproc();
        let container = self.live(me.container);
        let token = self.lock_sched();
        let pid = container.scheduler.table(&token)[me.index].pid;
        self.unlock_sched(token);
        pid
    }

    /// 父进程的 pid，没有父进程时为 0
    pub fn getppid(&self) -> Pid {
        let me = self.myproc();
        let container = self.live(me.container);
        let token = self.lock_sched();
        let table = container.scheduler.table(&token);
        let ppid = table[me.index].parent.map_or(0, |parent| table[parent.index].pid);
        self.unlock_sched(token);
        ppid
    }

    /// 陷入时保存用户寄存器
    pub(crate) fn save_trapframe(&self, me: ProcHandle, tf: &Trapframe) {
        self.live(me.container).scheduler.data(me.index).tf = *tf;
    }

    pub(crate) fn saved_trapframe(&self, me: ProcHandle) -> Trapframe {
        self.live(me.container).scheduler.data(me.index).tf
    }

    pub(crate) fn user_program(&self, me: ProcHandle) -> Option<Program> {
        self.live(me.container).scheduler.data(me.index).entry.clone()
    }

    /// 从进程的用户内存读取
    pub fn copyin(&self, proc: ProcHandle, va: usize, buf: &mut [u8]) -> Result<(), Errno> {
        let container = self.live(proc.container);
        let data = container.scheduler.data(proc.index);
        data.aspace.as_ref().ok_or(Errno::BadAddress)?.read(va, buf)
    }

    /// 写入进程的用户内存
    pub fn copyout(&self, proc: ProcHandle, va: usize, bytes: &[u8]) -> Result<(), Errno> {
        let container = self.live(proc.container);
        let mut data = container.scheduler.data(proc.index);
        data.aspace.as_mut().ok_or(Errno::BadAddress)?.write(va, bytes)
    }

    /// 从进程的用户内存读取以 NUL 结尾的字符串
    pub fn copyin_str(&self, proc: ProcHandle, va: usize, max: usize) -> Result<alloc::string::String, Errno> {
        let container = self.live(proc.container);
        let data = container.scheduler.data(proc.index);
        data.aspace.as_ref().ok_or(Errno::BadAddress)?.read_str(va, max)
    }
}
