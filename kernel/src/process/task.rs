//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 进程控制块 (Process Control Block)
//!
//! 对应 Linux 内核的 `struct task_struct` 与 xv6 的 `struct proc`，拆成两半：
//! - `Pcb`: 调度相关字段（状态、pid、父进程、等待通道、标志），只能在持有
//!   调度锁时通过 `SchedCell` 访问
//! - `ProcData`: 进程私有资源（内核栈、地址空间、陷入帧、打开文件、cwd），
//!   每个槽位一把叶子锁
//!
//! 进程之间的引用一律使用 `ProcHandle`（容器编号 + 槽位下标），不使用指针。

use alloc::string::String;
use alloc::sync::Arc;
use core::fmt;

use bitflags::bitflags;

use super::usermod::Program;
use super::wait::WaitChannel;
use crate::arch::{ExecutionContext, Trapframe};
use crate::config::NOFILE;
use crate::container::ContainerId;
use crate::fs::{FileRef, InodeRef};
use crate::mm::{AddressSpace, Page};

/// 进程号（所在命名空间内的本地编号）
pub type Pid = usize;

/// 文件描述符
pub type Fd = usize;

/// 进程句柄：所属容器 + 进程表槽位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcHandle {
    pub container: ContainerId,
    pub index: usize,
}

impl ProcHandle {
    /// 打包后的"无进程"
    pub(crate) const NONE: u64 = u64::MAX;

    pub const fn new(container: ContainerId, index: usize) -> Self {
        Self { container, index }
    }

    /// 打包成 u64，供每 CPU 原子量使用
    pub(crate) fn pack(self) -> u64 {
        ((self.container.0 as u64) << 32) | (self.index as u64 & 0xffff_ffff)
    }

    pub(crate) fn unpack(raw: u64) -> Option<Self> {
        if raw == Self::NONE {
            return None;
        }
        Some(Self {
            container: ContainerId((raw >> 32) as usize),
            index: (raw & 0xffff_ffff) as usize,
        })
    }
}

impl fmt::Display for ProcHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.index)
    }
}

/// 进程状态
///
/// UNUSED → EMBRYO → RUNNABLE ⇄ RUNNING → (RUNNABLE | SLEEPING | ZOMBIE)，
/// ZOMBIE 由回收者变回 UNUSED
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ProcState {
    Unused = 0,
    Embryo = 1,
    Sleeping = 2,
    Runnable = 3,
    Running = 4,
    Zombie = 5,
}

impl ProcState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Unused => "unused",
            Self::Embryo => "embryo",
            Self::Sleeping => "sleep",
            Self::Runnable => "runble",
            Self::Running => "run",
            Self::Zombie => "zombie",
        }
    }
}

bitflags! {
    /// 进程标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ProcFlags: u32 {
        /// 已被 kill，在下一个系统调用边界退出
        const KILLED    = 1 << 0;
        /// 子容器的代表进程
        const CONTAINER = 1 << 1;
        /// 容器的 init（回收者）
        const INIT      = 1 << 2;
    }
}

/// 调度相关字段，由调度锁保护
#[derive(Debug, Clone)]
pub struct Pcb {
    pub state: ProcState,
    pub pid: Pid,
    pub parent: Option<ProcHandle>,
    /// 只在 SLEEPING 时有效
    pub channel: Option<WaitChannel>,
    pub flags: ProcFlags,
    /// 代表进程对应的子容器
    pub child: Option<ContainerId>,
    /// 退出状态
    pub xstate: i32,
}

impl Pcb {
    pub const fn unused() -> Self {
        Self {
            state: ProcState::Unused,
            pid: 0,
            parent: None,
            channel: None,
            flags: ProcFlags::empty(),
            child: None,
            xstate: 0,
        }
    }

    /// 既不是空槽也不是僵尸
    pub fn is_live(&self) -> bool {
        !matches!(self.state, ProcState::Unused | ProcState::Zombie)
    }

    pub fn is_representative(&self) -> bool {
        self.flags.contains(ProcFlags::CONTAINER)
    }

    pub fn killed(&self) -> bool {
        self.flags.contains(ProcFlags::KILLED)
    }
}

/// 内核栈：一个物理页加上驻留在其上的执行上下文
pub struct KernelStack {
    pub page: Page,
    pub context: Arc<ExecutionContext>,
}

/// 进程私有资源，每个槽位一把叶子锁
pub struct ProcData {
    pub name: String,
    pub kstack: Option<KernelStack>,
    pub aspace: Option<AddressSpace>,
    /// 最近一次陷入时保存的用户寄存器
    pub tf: Trapframe,
    /// 用户程序
    pub entry: Option<Program>,
    pub ofile: [Option<FileRef>; NOFILE],
    pub cwd: Option<InodeRef>,
}

impl ProcData {
    pub fn new() -> Self {
        Self {
            name: String::new(),
            kstack: None,
            aspace: None,
            tf: Trapframe::default(),
            entry: None,
            ofile: core::array::from_fn(|_| None),
            cwd: None,
        }
    }

    /// 用户内存大小
    pub fn size(&self) -> usize {
        self.aspace.as_ref().map_or(0, AddressSpace::size)
    }

    /// 执行上下文
    pub fn context(&self) -> Option<Arc<ExecutionContext>> {
        self.kstack.as_ref().map(|ks| Arc::clone(&ks.context))
    }
}

impl Default for ProcData {
    fn default() -> Self {
        Self::new()
    }
}
