//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 用户态执行
//!
//! 宿主机模拟中用户程序是一个闭包 `Fn(&mut UserContext)`，在进程自己的内核
//! 线程上运行。`UserContext` 是用户态看到的"机器"：一份陷入帧，加上按编号
//! 陷入内核的系统调用入口。
//!
//! fork 的子进程不会从父进程的调用点继续，而是以父进程陷入时保存的陷入帧
//! 重新进入同一个程序：`resume_point()`（即 elr）告诉程序从哪里继续，
//! x0 为 0。
//!
//! 陷入路径：
//! - 进入：检查停机和 killed，把陷入帧保存到 PCB
//! - 返回：再次检查 killed，need_resched 置位时让出 CPU

use alloc::sync::Arc;

use super::task::{Fd, ProcHandle};
use super::Pid;
use crate::arch::{self, context, Trapframe};
use crate::errno::Errno;
use crate::fs::FileFlags;
use crate::kernel::Kernel;
use crate::sync::SchedToken;
use crate::syscall::{self, SyscallNo, AT_FDCWD, PATH_MAX, REBOOT_POWER_OFF, SIGCHLD, SIGKILL};

/// 用户程序
pub type Program = Arc<dyn Fn(&mut UserContext) + Send + Sync>;

/// 把闭包包装成用户程序
pub fn program<F>(f: F) -> Program
where
    F: Fn(&mut UserContext) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// wait 状态在用户栈上的位置（距栈顶）
const STATUS_SLOT: usize = 8;

/// 用户态上下文
pub struct UserContext {
    kernel: Arc<Kernel>,
    me: ProcHandle,
    tf: Trapframe,
}

impl UserContext {
    pub fn kernel(&self) -> &Arc<Kernel> {
        &self.kernel
    }

    pub fn handle(&self) -> ProcHandle {
        self.me
    }

    pub fn trapframe(&self) -> &Trapframe {
        &self.tf
    }

    /// 程序的续点：新程序为 0，fork 的子进程为父进程传入的值
    pub fn resume_point(&self) -> u64 {
        self.tf.elr
    }

    /// 按编号陷入内核
    pub fn syscall(&mut self, no: SyscallNo, args: &[u64]) -> i64 {
        self.tf.set_syscall(no as u64, args);
        self.trap_entry();
        let ret = syscall::dispatch(&self.kernel, &mut self.tf);
        self.tf.set_ret(ret as u64);
        self.trap_exit();
        ret
    }

    fn trap_entry(&mut self) {
        if self.kernel.power().is_halted() {
            context::terminate();
        }
        if self.kernel.killed() {
            self.kernel.exit(-1);
        }
        self.kernel.save_trapframe(self.me, &self.tf);
    }

    fn trap_exit(&mut self) {
        if self.kernel.power().is_halted() {
            context::terminate();
        }
        if self.kernel.killed() {
            self.kernel.exit(-1);
        }
        if self.kernel.cpu(arch::current_cpu()).take_need_resched() {
            self.kernel.yield_now();
        }
    }

    fn check(ret: i64) -> Result<u64, Errno> {
        if ret < 0 {
            Err(Errno::from_neg(ret).unwrap_or(Errno::InvalidArgument))
        } else {
            Ok(ret as u64)
        }
    }

    /// fork，子进程以 `resume_at` 为续点重新进入程序
    pub fn fork(&mut self, resume_at: u64) -> Result<Pid, Errno> {
        let saved = self.tf.elr;
        self.tf.elr = resume_at;
        let ret = self.syscall(SyscallNo::Clone, &[SIGCHLD]);
        self.tf.elr = saved;
        Self::check(ret).map(|pid| pid as Pid)
    }

    pub fn exit(&mut self, status: i32) -> ! {
        self.syscall(SyscallNo::Exit, &[status as i64 as u64]);
        panic!("exit: {} returned to user mode", self.me)
    }

    pub fn wait(&mut self) -> Result<Pid, Errno> {
        let ret = self.syscall(SyscallNo::Wait4, &[-1i64 as u64, 0, 0]);
        Self::check(ret).map(|pid| pid as Pid)
    }

    /// wait，同时取回退出状态
    pub fn wait_status(&mut self) -> Result<(Pid, i32), Errno> {
        let addr = self.tf.sp as usize - STATUS_SLOT;
        let ret = self.syscall(SyscallNo::Wait4, &[-1i64 as u64, addr as u64, 0]);
        let pid = Self::check(ret)? as Pid;
        let mut status = [0u8; 4];
        self.load(addr, &mut status)?;
        Ok((pid, i32::from_le_bytes(status)))
    }

    pub fn yield_now(&mut self) {
        self.syscall(SyscallNo::SchedYield, &[]);
    }

    pub fn getpid(&mut self) -> Pid {
        self.syscall(SyscallNo::Getpid, &[]) as Pid
    }

    pub fn getppid(&mut self) -> Pid {
        self.syscall(SyscallNo::Getppid, &[]) as Pid
    }

    /// sbrk，返回旧的大小
    pub fn sbrk(&mut self, n: isize) -> Result<usize, Errno> {
        let ret = self.syscall(SyscallNo::Brk, &[n as i64 as u64]);
        Self::check(ret).map(|size| size as usize)
    }

    pub fn kill(&mut self, pid: Pid) -> Result<(), Errno> {
        let ret = self.syscall(SyscallNo::Kill, &[pid as u64, SIGKILL]);
        Self::check(ret).map(|_| ())
    }

    /// 打开文件：路径先压到用户栈上
    pub fn open(&mut self, path: &str, flags: FileFlags) -> Result<Fd, Errno> {
        if path.len() >= PATH_MAX {
            return Err(Errno::InvalidArgument);
        }
        let addr = self.tf.sp as usize - STATUS_SLOT - PATH_MAX;
        let mut bytes = [0u8; PATH_MAX];
        bytes[..path.len()].copy_from_slice(path.as_bytes());
        self.store(addr, &bytes[..=path.len()])?;
        let ret = self.syscall(SyscallNo::Openat, &[AT_FDCWD as u64, addr as u64, flags.bits() as u64]);
        Self::check(ret).map(|fd| fd as Fd)
    }

    pub fn dup(&mut self, fd: Fd) -> Result<Fd, Errno> {
        let ret = self.syscall(SyscallNo::Dup, &[fd as u64]);
        Self::check(ret).map(|fd| fd as Fd)
    }

    pub fn close(&mut self, fd: Fd) -> Result<(), Errno> {
        let ret = self.syscall(SyscallNo::Close, &[fd as u64]);
        Self::check(ret).map(|_| ())
    }

    /// 换成新程序，只在失败时返回
    pub fn exec(&mut self, name: &str, program: Program) -> Errno {
        self.trap_entry();
        if let Err(e) = self.kernel.exec(name, Arc::clone(&program)) {
            self.trap_exit();
            return e;
        }
        self.tf = self.kernel.saved_trapframe(self.me);
        program(self);
        self.exit(0)
    }

    /// 写自己的用户内存
    pub fn store(&mut self, addr: usize, bytes: &[u8]) -> Result<(), Errno> {
        self.kernel.copyout(self.me, addr, bytes)
    }

    /// 读自己的用户内存
    pub fn load(&mut self, addr: usize, buf: &mut [u8]) -> Result<(), Errno> {
        self.kernel.copyin(self.me, addr, buf)
    }

    /// 关机，只在被拒绝时返回
    pub fn power_off(&mut self) -> Errno {
        let ret = self.syscall(SyscallNo::Reboot, &[REBOOT_POWER_OFF]);
        match Self::check(ret) {
            Ok(_) => context::terminate(),
            Err(e) => e,
        }
    }

    /// 关机，永不返回
    pub fn shutdown(&mut self) -> ! {
        let e = self.power_off();
        panic!("shutdown: {} refused with {}", self.me, e.name())
    }
}

/// 新进程第一次被调度时的入口
///
/// 释放 switch 交来的调度锁，然后返回用户态
pub(crate) fn forkret(kernel: Arc<Kernel>, me: ProcHandle, token: SchedToken) {
    kernel.unlock_sched(token);
    trap_return(kernel, me)
}

/// 以 PCB 中保存的陷入帧进入用户程序；程序返回视为 exit(0)
pub(crate) fn trap_return(kernel: Arc<Kernel>, me: ProcHandle) -> ! {
    let Some(program) = kernel.user_program(me) else {
        panic!("trap_return: {} has no user program", me);
    };
    let tf = kernel.saved_trapframe(me);
    let mut user = UserContext { kernel, me, tf };
    program(&mut user);
    user.exit(0)
}
