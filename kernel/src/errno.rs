//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 标准错误代码定义
//!
//! 和 include/uapi/asm-generic/errno-base.h 保持一致，只保留调度核心用得到的部分

use core::fmt;

/// 标准错误代码
///
/// 调度核心内部统一返回 `Result<T, Errno>`，系统调用层再转换成负数返回值。
///
/// 使用方法：
/// ```
/// use rux_nest::errno::Errno;
///
/// fn reap() -> Result<u32, Errno> {
///     Err(Errno::NoChild)
/// }
///
/// assert_eq!(reap().unwrap_err().as_neg_i32(), -10);
/// ```
#[repr(i32)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Errno {
    /// Operation not permitted (EPERM, 1)
    OperationNotPermitted = 1,

    /// No such file or directory (ENOENT, 2)
    NoSuchFileOrDirectory = 2,

    /// No such process (ESRCH, 3)
    NoSuchProcess = 3,

    /// Interrupted system call (EINTR, 4)
    InterruptedSystemCall = 4,

    /// Bad file number (EBADF, 9)
    BadFileNumber = 9,

    /// No child process (ECHILD, 10)
    NoChild = 10,

    /// Try again (EAGAIN, 11)
    TryAgain = 11,

    /// Out of memory (ENOMEM, 12)
    OutOfMemory = 12,

    /// Bad address (EFAULT, 14)
    BadAddress = 14,

    /// Device or resource busy (EBUSY, 16)
    DeviceOrResourceBusy = 16,

    /// File exists (EEXIST, 17)
    FileExists = 17,

    /// Invalid argument (EINVAL, 22)
    InvalidArgument = 22,

    /// File table overflow (ENFILE, 23)
    FileTableOverflow = 23,

    /// Too many open files (EMFILE, 24)
    TooManyOpenFiles = 24,

    /// Function not implemented (ENOSYS, 38)
    FunctionNotImplemented = 38,
}

impl Errno {
    /// 获取错误代码的正数值（用于比较）
    #[inline]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// 获取错误代码的负数值（用于系统调用返回）
    #[inline]
    pub const fn as_neg_i32(self) -> i32 {
        -(self as i32)
    }

    /// 获取错误代码的负数值（i64，写回 x0）
    #[inline]
    pub const fn as_neg_i64(self) -> i64 {
        -(self as i64)
    }

    /// 从系统调用返回值还原错误代码
    ///
    /// 非负数或未知错误码返回 `None`
    pub fn from_neg(ret: i64) -> Option<Self> {
        let errno = match -ret {
            1 => Self::OperationNotPermitted,
            2 => Self::NoSuchFileOrDirectory,
            3 => Self::NoSuchProcess,
            4 => Self::InterruptedSystemCall,
            9 => Self::BadFileNumber,
            10 => Self::NoChild,
            11 => Self::TryAgain,
            12 => Self::OutOfMemory,
            14 => Self::BadAddress,
            16 => Self::DeviceOrResourceBusy,
            17 => Self::FileExists,
            22 => Self::InvalidArgument,
            23 => Self::FileTableOverflow,
            24 => Self::TooManyOpenFiles,
            38 => Self::FunctionNotImplemented,
            _ => return None,
        };
        Some(errno)
    }

    /// 对应的宏名
    pub const fn name(self) -> &'static str {
        match self {
            Self::OperationNotPermitted => "EPERM",
            Self::NoSuchFileOrDirectory => "ENOENT",
            Self::NoSuchProcess => "ESRCH",
            Self::InterruptedSystemCall => "EINTR",
            Self::BadFileNumber => "EBADF",
            Self::NoChild => "ECHILD",
            Self::TryAgain => "EAGAIN",
            Self::OutOfMemory => "ENOMEM",
            Self::BadAddress => "EFAULT",
            Self::DeviceOrResourceBusy => "EBUSY",
            Self::FileExists => "EEXIST",
            Self::InvalidArgument => "EINVAL",
            Self::FileTableOverflow => "ENFILE",
            Self::TooManyOpenFiles => "EMFILE",
            Self::FunctionNotImplemented => "ENOSYS",
        }
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.as_i32())
    }
}

/// 常用的错误代码常量
pub mod constants {
    pub const EPERM: i32 = 1;
    pub const ENOENT: i32 = 2;
    pub const ESRCH: i32 = 3;
    pub const EINTR: i32 = 4;
    pub const EBADF: i32 = 9;
    pub const ECHILD: i32 = 10;
    pub const EAGAIN: i32 = 11;
    pub const ENOMEM: i32 = 12;
    pub const EFAULT: i32 = 14;
    pub const EBUSY: i32 = 16;
    pub const EEXIST: i32 = 17;
    pub const EINVAL: i32 = 22;
    pub const ENFILE: i32 = 23;
    pub const EMFILE: i32 = 24;
    pub const ENOSYS: i32 = 38;
}
