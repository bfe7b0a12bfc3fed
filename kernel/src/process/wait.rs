//! 睡眠与唤醒
//!
//! 对应 xv6 的 sleep()/wakeup() 以及 Linux 的 kernel/sched/wait.c：
//! - 进程以一个等待通道睡眠：记录通道、置 SLEEPING、切换回调度器
//! - 唤醒者把当前调度器进程表中所有在同一通道上睡眠的进程置为 RUNNABLE
//!
//! 丢失唤醒由锁交接避免：`sleep` 先获取调度锁再释放条件锁，而唤醒者必须
//! 获取调度锁才能检查睡眠者，所以在睡眠者真正进入 SLEEPING 之前唤醒者
//! 无法插入。

use core::fmt;

use super::task::{Pcb, ProcHandle, ProcState};
use crate::container::ContainerId;
use crate::kernel::Kernel;
use crate::sync::{SchedToken, SpinLock};

/// 等待通道
///
/// 睡眠者和唤醒者约定的一个稳定值
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitChannel {
    /// 某个进程（wait 在自己的 PCB 上睡眠，exit 唤醒父进程）
    Proc(ProcHandle),
    /// 某个容器（销毁容器时等待其中的进程全部退出）
    Container(ContainerId),
    /// 任意内核对象的地址
    Addr(usize),
}

impl WaitChannel {
    /// 以对象地址作为通道
    pub fn of<T>(object: &T) -> Self {
        Self::Addr(object as *const T as usize)
    }
}

impl fmt::Display for WaitChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Proc(h) => write!(f, "proc {}", h),
            Self::Container(id) => write!(f, "container {}", id),
            Self::Addr(addr) => write!(f, "{:#x}", addr),
        }
    }
}

/// 把表中在 `chan` 上睡眠的进程置为 RUNNABLE，跳过 `except`
pub(crate) fn wake_matching(table: &mut [Pcb], chan: WaitChannel, except: Option<usize>) -> usize {
    let mut woken = 0;
    for (i, pcb) in table.iter_mut().enumerate() {
        if Some(i) == except {
            continue;
        }
        if pcb.state == ProcState::Sleeping && pcb.channel == Some(chan) {
            pcb.state = ProcState::Runnable;
            woken += 1;
        }
    }
    woken
}

impl Kernel {
    /// 在 `chan` 上睡眠
    ///
    /// 调用者持有 `lock`；睡眠期间释放，返回前重新获取
    pub fn sleep(&self, chan: WaitChannel, lock: &SpinLock) {
        if !lock.holding() {
            panic!("sleep: {} not held", lock.name());
        }
        let token = self.lock_sched();
        lock.release();
        let token = self.sleep_locked(chan, token);
        self.unlock_sched(token);
        lock.acquire();
    }

    /// 已持有调度锁时在 `chan` 上睡眠，返回时仍持有
    pub fn sleep_locked(&self, chan: WaitChannel, mut token: SchedToken) -> SchedToken {
        let me = self.myproc();
        let container = self.live(me.container);
        {
            let pcb = &mut container.scheduler.table_mut(&mut token)[me.index];
            pcb.channel = Some(chan);
            pcb.state = ProcState::Sleeping;
        }
        log::trace!("sleep: {} on {}", me, chan);

        token = self.sched(me, &container, token);

        container.scheduler.table_mut(&mut token)[me.index].channel = None;
        token
    }

    /// 唤醒当前调度器进程表中在 `chan` 上睡眠的进程，返回唤醒数
    pub fn wakeup(&self, chan: WaitChannel) -> usize {
        let cpu = self.cpu(crate::arch::current_cpu());
        let scheduler = match cpu.current_scheduler() {
            Some(id) => id,
            None => panic!("wakeup: cpu{} has no current scheduler", cpu.id()),
        };
        let except = cpu.current_process().filter(|h| h.container == scheduler).map(|h| h.index);
        let mut token = self.lock_sched();
        let woken = self.wakeup_in(scheduler, chan, except, &mut token);
        self.unlock_sched(token);
        woken
    }

    /// 已持有调度锁时唤醒指定容器进程表中的睡眠者
    pub(crate) fn wakeup_in(
        &self,
        container: ContainerId,
        chan: WaitChannel,
        except: Option<usize>,
        token: &mut SchedToken,
    ) -> usize {
        let container = self.live(container);
        let woken = wake_matching(container.scheduler.table_mut(token), chan, except);
        if woken > 0 {
            log::trace!("wakeup: {} woke {} in {}", chan, woken, container.id);
        }
        woken
    }
}
