//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! Rux nest：进程/容器调度核心
//!
//! 运行在宿主机上的多处理器调度核心模拟：
//! - 每个逻辑 CPU、每个执行上下文各对应一个宿主线程，上下文切换就是
//!   线程之间交接接力棒
//! - 进程表按容器分区，容器组成一棵树，父调度器把子容器当成一个进程调度
//! - fork/exit/wait/kill/sleep/wakeup 的语义与 xv6/Linux 一致
//!
//! 用户程序是闭包，通过 `UserContext::syscall` 按 Linux 编号陷入内核。

extern crate alloc;

pub mod arch;
pub mod config;
pub mod container;
pub mod errno;
pub mod fs;
pub mod kernel;
pub mod logger;
pub mod mm;
pub mod process;
pub mod sched;
pub mod sync;
pub mod syscall;

#[cfg(test)]
mod tests;

pub use kernel::{Kernel, KernelConfig, ProcInfo};
