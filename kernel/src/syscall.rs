//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 系统调用分发
//!
//! 编号沿用 Linux asm-generic (AArch64/RISC-V) 的编号。
//!
//! 约定:
//! - x8: 系统调用号
//! - x0-x5: 参数 (最多6个)
//! - 返回值: x0，失败时为负的 errno
//!
//! brk 按 sbrk 语义实现：参数是增量，返回调整前的大小。

use crate::arch::Trapframe;
use crate::container::ContainerId;
use crate::errno::Errno;
use crate::fs::FileFlags;
use crate::kernel::Kernel;

/// openat 的 AT_FDCWD
pub const AT_FDCWD: i64 = -100;
/// 路径长度上限（含结尾的 NUL）
pub const PATH_MAX: usize = 128;
pub const SIGKILL: u64 = 9;
pub const SIGCHLD: u64 = 17;
/// reboot(LINUX_REBOOT_CMD_POWER_OFF)
pub const REBOOT_POWER_OFF: u64 = 0x4321_fedc;

#[repr(u64)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SyscallNo {
    /// 文件操作
    Dup = 23,
    Openat = 56,
    Close = 57,

    /// 进程操作
    Exit = 93,
    Getppid = 110,
    SchedYield = 124,
    Kill = 129,
    Getpid = 172,
    Brk = 214,
    Clone = 220,
    Wait4 = 260,

    /// 其他
    Reboot = 142,
}

impl SyscallNo {
    pub fn from_u64(no: u64) -> Option<Self> {
        let no = match no {
            23 => Self::Dup,
            56 => Self::Openat,
            57 => Self::Close,
            93 => Self::Exit,
            110 => Self::Getppid,
            124 => Self::SchedYield,
            129 => Self::Kill,
            142 => Self::Reboot,
            172 => Self::Getpid,
            214 => Self::Brk,
            220 => Self::Clone,
            260 => Self::Wait4,
            _ => return None,
        };
        Some(no)
    }
}

/// 分发一次系统调用，返回写回 x0 的值
pub fn dispatch(kernel: &Kernel, tf: &mut Trapframe) -> i64 {
    let args = [tf.arg(0), tf.arg(1), tf.arg(2), tf.arg(3), tf.arg(4), tf.arg(5)];
    let Some(no) = SyscallNo::from_u64(tf.syscall_no()) else {
        log::warn!("syscall: unknown syscall {}", tf.syscall_no());
        return Errno::FunctionNotImplemented.as_neg_i64();
    };

    let result = match no {
        SyscallNo::Clone => sys_clone(kernel, args),
        SyscallNo::Exit => sys_exit(kernel, args),
        SyscallNo::Wait4 => sys_wait4(kernel, args),
        SyscallNo::Kill => sys_kill(kernel, args),
        SyscallNo::Getpid => Ok(kernel.getpid() as u64),
        SyscallNo::Getppid => Ok(kernel.getppid() as u64),
        SyscallNo::Brk => sys_brk(kernel, args),
        SyscallNo::Openat => sys_openat(kernel, args),
        SyscallNo::Dup => sys_dup(kernel, args),
        SyscallNo::Close => sys_close(kernel, args),
        SyscallNo::SchedYield => {
            kernel.yield_now();
            Ok(0)
        }
        SyscallNo::Reboot => sys_reboot(kernel, args),
    };

    match result {
        Ok(ret) => ret as i64,
        Err(e) => {
            log::trace!("syscall: {:?} failed: {}", no, e.name());
            e.as_neg_i64()
        }
    }
}

fn sys_clone(kernel: &Kernel, args: [u64; 6]) -> Result<u64, Errno> {
    // 只支持 fork 语义：flags 只能是 SIGCHLD
    if args[0] != SIGCHLD {
        return Err(Errno::InvalidArgument);
    }
    kernel.fork().map(|pid| pid as u64)
}

fn sys_exit(kernel: &Kernel, args: [u64; 6]) -> Result<u64, Errno> {
    kernel.exit(args[0] as i32)
}

fn sys_wait4(kernel: &Kernel, args: [u64; 6]) -> Result<u64, Errno> {
    let pid = args[0] as i64;
    let wstatus = args[1] as usize;
    let options = args[2];
    if pid != -1 || options != 0 {
        return Err(Errno::InvalidArgument);
    }

    let (child, status) = kernel.wait_status()?;
    if wstatus != 0 {
        kernel.copyout(kernel.myproc(), wstatus, &status.to_le_bytes())?;
    }
    Ok(child as u64)
}

fn sys_kill(kernel: &Kernel, args: [u64; 6]) -> Result<u64, Errno> {
    if args[1] != SIGKILL {
        return Err(Errno::InvalidArgument);
    }
    kernel.kill(args[0] as usize).map(|_| 0)
}

fn sys_brk(kernel: &Kernel, args: [u64; 6]) -> Result<u64, Errno> {
    kernel.grow(args[0] as i64 as isize).map(|old| old as u64)
}

fn sys_openat(kernel: &Kernel, args: [u64; 6]) -> Result<u64, Errno> {
    if args[0] as i64 != AT_FDCWD {
        return Err(Errno::BadFileNumber);
    }
    let path = kernel.copyin_str(kernel.myproc(), args[1] as usize, PATH_MAX)?;
    let flags = FileFlags::new(args[2] as u32);
    if flags.bits() & FileFlags::O_ACCMODE == FileFlags::O_ACCMODE {
        return Err(Errno::InvalidArgument);
    }
    kernel.open(&path, flags).map(|fd| fd as u64)
}

fn sys_dup(kernel: &Kernel, args: [u64; 6]) -> Result<u64, Errno> {
    kernel.dup(args[0] as usize).map(|fd| fd as u64)
}

fn sys_close(kernel: &Kernel, args: [u64; 6]) -> Result<u64, Errno> {
    kernel.close(args[0] as usize).map(|_| 0)
}

fn sys_reboot(kernel: &Kernel, args: [u64; 6]) -> Result<u64, Errno> {
    if args[0] != REBOOT_POWER_OFF {
        return Err(Errno::InvalidArgument);
    }
    // 只有根容器中的进程能关机
    if kernel.myproc().container != ContainerId::ROOT {
        return Err(Errno::OperationNotPermitted);
    }
    kernel.power_off();
    Ok(0)
}
