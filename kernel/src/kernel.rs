//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 机器对象
//!
//! `Kernel` 持有逻辑 CPU、容器登记表、物理内存、文件系统和电源状态：
//! - `boot`: 校验配置，建立根容器（对应 start_kernel 中 sched_init 之前的部分）
//! - `run`: 每个逻辑 CPU 一个线程进入根容器的调度循环，直到停机
//!
//! 所有进程操作都是 `Kernel` 上的方法，实现分布在 process/、sched/、
//! container/ 中。

use alloc::boxed::Box;
use alloc::format;
use alloc::string::String;
use alloc::sync::{Arc, Weak};
use alloc::vec::Vec;
use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::arch::{self, context, CpuId, Power, Shutdown};
use crate::config::{
    KERNEL_NAME, KERNEL_STACK_SIZE, KERNEL_VERSION, MAX_CONTAINERS, MAX_CPUS, NFILE, NINODE, NPID, NPROC,
    PHYS_PAGES,
};
use crate::container::{Container, ContainerId, ContainerRegistry};
use crate::errno::Errno;
use crate::fs::FileSystem;
use crate::mm::PhysicalMemory;
use crate::process::{Pid, ProcHandle, ProcState};
use crate::sched::{self, Cpu, RoundRobin, Scheduler};
use crate::sync::{SchedLock, SchedToken};

/// 默认时钟中断间隔
const DEFAULT_TIMER_PERIOD: Duration = Duration::from_millis(2);

/// 停机后等待调度锁的宽限期
const HALT_GRACE: Duration = Duration::from_millis(200);

/// 运行时配置，默认值来自 Kernel.toml
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    /// 逻辑 CPU 数
    pub ncpu: usize,
    /// 每个容器的进程表槽位数
    pub nproc: usize,
    /// 每个容器的 pid 命名空间容量
    pub npid: usize,
    pub max_containers: usize,
    pub phys_pages: usize,
    pub nfile: usize,
    pub ninode: usize,
    /// 时钟中断间隔，`None` 表示没有时钟（纯协作调度）
    pub timer: Option<Duration>,
    /// 看门狗，超时后以 `Shutdown::Watchdog` 停机
    pub watchdog: Option<Duration>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            ncpu: MAX_CPUS,
            nproc: NPROC,
            npid: NPID,
            max_containers: MAX_CONTAINERS,
            phys_pages: PHYS_PAGES,
            nfile: NFILE,
            ninode: NINODE,
            timer: Some(DEFAULT_TIMER_PERIOD),
            watchdog: None,
        }
    }
}

impl KernelConfig {
    /// 检查配置，不合法时返回 `EINVAL`
    pub fn validate(&self) -> Result<(), Errno> {
        let sized = self.nproc > 0
            && self.npid > 0
            && self.max_containers > 0
            && self.phys_pages > 0
            && self.nfile > 0
            && self.ninode > 0;
        if !sized || self.ncpu == 0 || self.ncpu > MAX_CPUS {
            return Err(Errno::InvalidArgument);
        }
        if self.timer == Some(Duration::ZERO) {
            return Err(Errno::InvalidArgument);
        }
        Ok(())
    }
}

/// 调试快照中的一个进程
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcInfo {
    pub handle: ProcHandle,
    pub pid: Pid,
    pub state: ProcState,
    pub parent: Option<ProcHandle>,
    /// 代表进程对应的子容器
    pub child: Option<ContainerId>,
    pub killed: bool,
    pub name: String,
}

impl fmt::Display for ProcInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<6} {:>4} {:<9} {}", self.handle, self.pid, self.state.name(), self.name)?;
        if let Some(child) = self.child {
            write!(f, " -> {}", child)?;
        }
        if self.killed {
            write!(f, " (killed)")?;
        }
        Ok(())
    }
}

/// 模拟机器
pub struct Kernel {
    me: Weak<Kernel>,
    config: KernelConfig,
    power: Arc<Power>,
    sched_lock: SchedLock,
    cpus: Box<[Cpu]>,
    containers: ContainerRegistry,
    memory: PhysicalMemory,
    fs: FileSystem,
    started: AtomicBool,
}

impl Kernel {
    /// 引导：校验配置、建立根容器
    pub fn boot(config: KernelConfig) -> Result<Arc<Kernel>, Errno> {
        config.validate()?;

        let power = Power::new();
        let sched_lock = SchedLock::new();
        let containers = ContainerRegistry::new(config.max_containers);
        let root = containers.reserve()?;
        if !root.is_root() {
            panic!("boot: root container got id {}", root);
        }
        // 根调度器的上下文由 CPU 引导线程自己占用，不另起线程
        let scheduler = Scheduler::new(
            root,
            None,
            Box::new(RoundRobin),
            config.nproc,
            config.ncpu,
            &sched_lock,
            &power,
        );
        containers.install(Arc::new(Container::new(root, None, None, scheduler, config.npid)));

        let cpus: Vec<Cpu> = (0..config.ncpu).map(Cpu::new).collect();
        let kernel = Arc::new_cyclic(|me| Kernel {
            me: me.clone(),
            memory: PhysicalMemory::new(config.phys_pages),
            fs: FileSystem::new(config.ninode, config.nfile),
            config,
            power,
            sched_lock,
            cpus: cpus.into_boxed_slice(),
            containers,
            started: AtomicBool::new(false),
        });

        log::info!(
            "{} v{}: {} cpus, {} slots per container, {} pages",
            KERNEL_NAME,
            KERNEL_VERSION,
            kernel.config.ncpu,
            kernel.config.nproc,
            kernel.config.phys_pages
        );
        Ok(kernel)
    }

    /// 自身的强引用，交给新建的执行流
    pub fn arc(&self) -> Arc<Kernel> {
        match self.me.upgrade() {
            Some(kernel) => kernel,
            None => panic!("kernel: instance already dropped"),
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn power(&self) -> &Arc<Power> {
        &self.power
    }

    pub fn sched_lock(&self) -> &SchedLock {
        &self.sched_lock
    }

    pub fn containers(&self) -> &ContainerRegistry {
        &self.containers
    }

    pub fn memory(&self) -> &PhysicalMemory {
        &self.memory
    }

    pub fn fs(&self) -> &FileSystem {
        &self.fs
    }

    pub fn cpu(&self, id: CpuId) -> &Cpu {
        &self.cpus[id]
    }

    pub fn cpus(&self) -> &[Cpu] {
        &self.cpus
    }

    /// 获取调度锁
    ///
    /// 停机后持锁者可能已经退出。CPU 上的执行流在停机后再排队
    /// `HALT_GRACE` 仍未轮到，就放弃并结束
    pub fn lock_sched(&self) -> SchedToken {
        let on_cpu = arch::cpu_id().is_some();
        let mut halted_at = None;
        let token = self.sched_lock.acquire_unless(|| {
            if !on_cpu || !self.power.is_halted() {
                return false;
            }
            halted_at.get_or_insert_with(Instant::now).elapsed() >= HALT_GRACE
        });
        match token {
            Some(token) => token,
            None => context::terminate(),
        }
    }

    pub fn unlock_sched(&self, token: SchedToken) {
        self.sched_lock.release(token);
    }

    /// 当前 CPU 上运行的进程
    pub fn current_process(&self) -> Option<ProcHandle> {
        arch::cpu_id().and_then(|id| self.cpus.get(id)).and_then(Cpu::current_process)
    }

    /// 当前 CPU 正在执行的调度器
    pub fn current_scheduler(&self) -> Option<ContainerId> {
        arch::cpu_id().and_then(|id| self.cpus.get(id)).and_then(Cpu::current_scheduler)
    }

    /// 按编号查找存活的容器，不存在时返回 `ESRCH`
    pub fn container(&self, id: ContainerId) -> Result<Arc<Container>, Errno> {
        self.containers.get(id).ok_or(Errno::NoSuchProcess)
    }

    /// 按编号查找必然存活的容器（当前进程所在容器、调度中的容器）
    pub(crate) fn live(&self, id: ContainerId) -> Arc<Container> {
        match self.containers.get(id) {
            Some(container) => container,
            None => panic!("kernel: container {} is gone", id),
        }
    }

    /// 启动所有逻辑 CPU，阻塞直到停机
    ///
    /// 正常关机返回 `Ok`；内核 panic 或看门狗超时返回对应的停机原因。
    /// CPU 线程在停机后自行退出，这里不等待它们。
    pub fn run(&self) -> Result<(), Shutdown> {
        if self.started.swap(true, Ordering::AcqRel) {
            panic!("run: kernel already started");
        }

        for id in 0..self.config.ncpu {
            let kernel = self.arc();
            let spawned = thread::Builder::new()
                .name(format!("cpu{}", id))
                .stack_size(KERNEL_STACK_SIZE)
                .spawn(move || {
                    let power = Arc::clone(&kernel.power);
                    context::run_guarded(&power, || {
                        arch::set_cpu_id(id);
                        kernel.cpu(id).set_current_scheduler(ContainerId::ROOT);
                        let root = kernel.live(ContainerId::ROOT);
                        sched::run(&kernel, &root)
                    });
                });
            if let Err(e) = spawned {
                self.power.halt(Shutdown::Panic(format!("run: failed to start cpu{}: {}", id, e)));
                break;
            }
        }

        if let Some(period) = self.config.timer {
            let kernel = self.arc();
            let spawned = thread::Builder::new().name("timer".into()).spawn(move || {
                while !kernel.power.is_halted() {
                    thread::sleep(period);
                    for id in 0..kernel.config.ncpu {
                        kernel.timer_interrupt(id);
                    }
                }
            });
            if let Err(e) = spawned {
                log::warn!("run: no timer thread, scheduling stays cooperative: {}", e);
            }
        }

        log::info!("run: {} cpus online", self.config.ncpu);
        match self.power.wait(self.config.watchdog) {
            Shutdown::PowerOff => Ok(()),
            why => Err(why),
        }
    }

    /// 关机
    pub fn power_off(&self) {
        self.power.halt(Shutdown::PowerOff);
    }

    /// 时钟中断
    pub fn timer_interrupt(&self, cpu: CpuId) {
        self.cpus[cpu].tick();
    }

    /// 所有存活容器中已分配槽位的快照
    pub fn snapshot(&self) -> Vec<ProcInfo> {
        let containers = self.containers.live();
        let token = self.lock_sched();
        let mut procs = Vec::new();
        for container in &containers {
            for (index, pcb) in container.scheduler.table(&token).iter().enumerate() {
                if pcb.state == ProcState::Unused {
                    continue;
                }
                procs.push(ProcInfo {
                    handle: ProcHandle::new(container.id, index),
                    pid: pcb.pid,
                    state: pcb.state,
                    parent: pcb.parent,
                    child: pcb.child,
                    killed: pcb.killed(),
                    name: String::new(),
                });
            }
        }
        self.unlock_sched(token);

        for info in procs.iter_mut() {
            if let Some(container) = self.containers.get(info.handle.container) {
                info.name = container.scheduler.data(info.handle.index).name.clone();
            }
        }
        procs
    }

    /// 打印进程列表，对应 xv6 的 procdump()
    pub fn procdump(&self) {
        for info in self.snapshot() {
            log::info!("{}", info);
        }
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("config", &self.config)
            .field("halted", &self.power.is_halted())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_validate() {
        assert_eq!(KernelConfig::default().validate(), Ok(()));
        let bad = KernelConfig {
            ncpu: MAX_CPUS + 1,
            ..KernelConfig::default()
        };
        assert_eq!(bad.validate(), Err(Errno::InvalidArgument));
        let bad = KernelConfig {
            nproc: 0,
            ..KernelConfig::default()
        };
        assert_eq!(Kernel::boot(bad).err(), Some(Errno::InvalidArgument));
    }

    #[test]
    fn test_boot_installs_root() {
        let kernel = Kernel::boot(KernelConfig::default()).unwrap();
        let root = kernel.container(ContainerId::ROOT).unwrap();
        assert!(root.parent().is_none());
        assert!(root.representative().is_none());
        assert_eq!(root.scheduler().capacity(), NPROC);
        assert_eq!(kernel.current_process(), None);
        assert!(kernel.snapshot().is_empty());
        assert_eq!(kernel.container(ContainerId(5)).err(), Some(Errno::NoSuchProcess));
    }
}
