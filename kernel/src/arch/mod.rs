//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 架构相关代码
//!
//! 当前支持的架构：
//! - **host** - 宿主机模拟：每个逻辑 CPU、每个执行上下文各对应一个宿主线程，
//!   上下文切换通过线程间传递接力棒完成
//!
//! 调度核心只通过本模块导出的接口访问"硬件"：当前 CPU 编号、上下文切换、
//! 陷入帧以及关机。

pub mod host;

// 导出 cpu 相关函数
pub use host::cpu::{cpu_id, cpu_relax, current_cpu, lock_owner_tag, set_cpu_id, wait_for_interrupt, CpuId};

// 导出 context 模块
pub use host::context::{self, switch, ExecutionContext};

// 导出 trap 模块
pub use host::trap::{self, Trapframe};

// 导出 power 模块
pub use host::power::{self, Power, Shutdown};
