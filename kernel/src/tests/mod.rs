//! 场景测试
//!
//! 每个测试引导一台模拟机器，由 init 程序驱动场景：
//! - 结果通过 `Arc<spin::Mutex<..>>` 带回测试线程
//! - init 最后调用 `shutdown()`，`Kernel::run` 返回 `Ok(())`
//! - 看门狗限制每次运行的时间，死锁表现为 `Shutdown::Watchdog`
//!
//! 运行测试：
//! ```text
//! cargo test --package rux-nest
//! ```

pub mod fork;
pub mod process_tree;
pub mod user_syscall;

use std::sync::Arc;
use std::time::Duration;

use crate::arch::Shutdown;
use crate::container::ContainerId;
use crate::kernel::{Kernel, KernelConfig, ProcInfo};
use crate::logger;
use crate::process::{program, Pid, ProcState, UserContext};

/// 看门狗
pub const WATCHDOG: Duration = Duration::from_secs(20);

/// fork 的续点
pub const CHILD: u64 = 1;
pub const GRANDCHILD: u64 = 2;

/// 线程间共享的记录
pub type Record<T> = Arc<spin::Mutex<Vec<T>>>;

pub fn record<T>() -> Record<T> {
    Arc::new(spin::Mutex::new(Vec::new()))
}

/// 测试用配置：没有时钟，带看门狗
pub fn config(ncpu: usize) -> KernelConfig {
    KernelConfig {
        ncpu,
        timer: None,
        watchdog: Some(WATCHDOG),
        ..KernelConfig::default()
    }
}

pub fn boot(config: KernelConfig) -> Arc<Kernel> {
    logger::init_with_level(log::LevelFilter::Warn);
    Kernel::boot(config).unwrap()
}

/// 以 `init` 为根容器的第一个进程运行机器，直到停机
pub fn run_init<F>(kernel: &Arc<Kernel>, init: F) -> Result<(), Shutdown>
where
    F: Fn(&mut UserContext) + Send + Sync + 'static,
{
    assert_eq!(kernel.spawn_init("init", program(init)), Ok(1));
    kernel.run()
}

/// 按容器内 pid 查找进程快照
pub fn proc_info(kernel: &Kernel, container: ContainerId, pid: Pid) -> Option<ProcInfo> {
    kernel
        .snapshot()
        .into_iter()
        .find(|info| info.handle.container == container && info.pid == pid && info.child.is_none())
}

pub fn state_of(kernel: &Kernel, container: ContainerId, pid: Pid) -> Option<ProcState> {
    proc_info(kernel, container, pid).map(|info| info.state)
}

/// 容器中处于某个状态的普通进程数
pub fn count_in(kernel: &Kernel, container: ContainerId, state: ProcState) -> usize {
    kernel
        .snapshot()
        .iter()
        .filter(|info| info.handle.container == container && info.child.is_none() && info.state == state)
        .count()
}

/// 让出 CPU 直到条件成立
pub fn yield_until<C>(user: &mut UserContext, cond: C)
where
    C: Fn(&Kernel) -> bool,
{
    let kernel = Arc::clone(user.kernel());
    while !cond(&kernel) {
        user.yield_now();
    }
}
