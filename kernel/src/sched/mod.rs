//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 调度器模块
//!
//! 遵循 Linux 内核的调度器设计 (kernel/sched/)：
//! - `sched`: 容器调度器、调度循环、sched()/yield
//! - `policy`: 可替换的扫描顺序（默认轮转）
//! - `cpu`: 每 CPU 状态 (struct rq 的一部分)
//! - `pid`: pid 命名空间 (kernel/pid_namespace.c)

pub mod cpu;
pub mod pid;
pub mod policy;
pub mod sched;

pub use cpu::Cpu;
pub use pid::PidNamespace;
pub use policy::{Reverse, RoundRobin, SchedPolicy};
pub use sched::Scheduler;

pub(crate) use sched::{container_entry, run};
#[cfg(test)]
pub(crate) use sched::yield_scheduler;
