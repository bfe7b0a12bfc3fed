//! Rux nest 内核配置（自动生成）
//!
//! 此文件由 build.rs 根据 Kernel.toml 自动生成，请勿手动修改

// ============================================================
// 基本信息
// ============================================================

/// 内核名称
pub const KERNEL_NAME: &str = "Rux nest";

/// 内核版本
pub const KERNEL_VERSION: &str = "0.1.0";

// ============================================================
// CPU 配置
// ============================================================

/// 最大CPU数量
pub const MAX_CPUS: usize = 4;

// ============================================================
// 进程配置
// ============================================================

/// 每个容器进程表的槽位数
pub const NPROC: usize = 64;

/// 每个容器 PID 命名空间的容量
pub const NPID: usize = 128;

/// 每个进程的文件描述符数量
pub const NOFILE: usize = 16;

/// 容器注册表容量（包含根容器）
pub const MAX_CONTAINERS: usize = 16;

// ============================================================
// 内存配置
// ============================================================

/// 页大小
pub const PAGE_SIZE: usize = 4096;

/// 页大小位移
pub const PAGE_SHIFT: usize = 12;

/// 模拟物理内存页数
pub const PHYS_PAGES: usize = 1024;

/// 执行上下文宿主线程的栈大小（字节）
pub const KERNEL_STACK_SIZE: usize = 1048576;

// ============================================================
// 文件系统配置
// ============================================================

/// 系统打开文件表大小
pub const NFILE: usize = 100;

/// 内存 inode 缓存大小
pub const NINODE: usize = 50;

// ============================================================
// 调度器配置
// ============================================================

/// 时间片滴答数
pub const TIME_SLICE_TICKS: u32 = 4;
