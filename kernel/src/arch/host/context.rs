//! 执行上下文与上下文切换 (host)
//!
//! 对应 Linux 的 __switch_to() / xv6 的 swtch()。
//!
//! 真实硬件上 switch 把 callee-saved 寄存器和栈指针压入旧上下文、再从新上下文
//! 弹出。宿主机模拟中每个执行上下文拥有一个宿主线程（它的"内核栈"）：
//! - 保存：当前线程在自己的接力棒上阻塞
//! - 恢复：向目标接力棒投递 (CPU 编号, 调度锁令牌)
//!
//! 调度锁令牌随接力棒交接，所以"持锁进入 switch、由下一个执行流释放"的协议
//! 被原样保留。任意时刻每个逻辑 CPU 上只有一个线程在运行。

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::cpu::{self, CpuId};
use super::power::{Power, Shutdown};
use crate::config::KERNEL_STACK_SIZE;
use crate::sync::SchedToken;

/// 驻留上下文检查停机标志的间隔
const PARK_POLL: Duration = Duration::from_millis(20);

/// 执行流被回收或停机时的展开标记
pub(crate) struct Retired;

/// 接力棒内容
enum Baton {
    /// 在指定 CPU 上恢复运行，并接过调度锁
    Resume { cpu: CpuId, token: SchedToken },
    /// 上下文已被回收（内核栈释放），执行流退出
    Retire,
}

/// 保存的执行上下文
pub struct ExecutionContext {
    name: String,
    baton: Mutex<Option<Baton>>,
    signal: Condvar,
    power: Arc<Power>,
}

impl ExecutionContext {
    /// 创建新上下文
    pub fn new(name: impl Into<String>, power: &Arc<Power>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            baton: Mutex::new(None),
            signal: Condvar::new(),
            power: Arc::clone(power),
        })
    }

    /// 上下文名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 回收上下文：驻留在此的执行流将退出
    ///
    /// 只能回收不会再被恢复的上下文（ZOMBIE 进程、失败的 EMBRYO、销毁的容器调度器）
    pub fn retire(&self) {
        self.deliver(Baton::Retire);
    }

    fn deliver(&self, baton: Baton) {
        let mut slot = self.baton.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.as_ref() {
            None => {}
            Some(Baton::Resume { .. }) => panic!("switch: context {} resumed twice", self.name),
            Some(Baton::Retire) => panic!("switch: context {} used after retire", self.name),
        }
        *slot = Some(baton);
        self.signal.notify_one();
    }

    /// 阻塞直到被恢复
    fn park(&self) -> (CpuId, SchedToken) {
        let mut slot = self.baton.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            match slot.take() {
                Some(Baton::Resume { cpu, token }) => return (cpu, token),
                Some(Baton::Retire) => {
                    drop(slot);
                    terminate();
                }
                None => {}
            }
            if self.power.is_halted() {
                drop(slot);
                terminate();
            }
            slot = self
                .signal
                .wait_timeout(slot, PARK_POLL)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }
}

impl core::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ExecutionContext").field("name", &self.name).finish()
    }
}

/// 上下文切换
///
/// 把当前 CPU 从 `save` 转交给 `resume`，同时交出调度锁令牌；调用者阻塞在
/// `save` 上，直到之后某次 switch 恢复它，届时返回恢复者交来的令牌。
///
/// # Panics
/// 不在逻辑 CPU 上调用、切换到自身、重复恢复同一上下文都是内核缺陷
pub fn switch(save: &ExecutionContext, resume: &ExecutionContext, token: SchedToken) -> SchedToken {
    if core::ptr::eq(save, resume) {
        panic!("switch: {} switching to itself", save.name);
    }
    let cpu = cpu::current_cpu();
    log::trace!("switch: cpu{} {} -> {}", cpu, save.name, resume.name);
    resume.deliver(Baton::Resume { cpu, token });
    let (cpu, token) = save.park();
    cpu::set_cpu_id(cpu);
    token
}

/// 为上下文创建宿主线程
///
/// 线程先驻留在上下文上，第一次被恢复时以交来的令牌调用 `entry`
/// （进程的 forkret、容器调度器的 container_entry）。
pub fn spawn<F>(context: &Arc<ExecutionContext>, entry: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce(SchedToken) + Send + 'static,
{
    let ctx = Arc::clone(context);
    thread::Builder::new()
        .name(context.name.clone())
        .stack_size(KERNEL_STACK_SIZE)
        .spawn(move || {
            let power = Arc::clone(&ctx.power);
            run_guarded(&power, move || {
                let (cpu, token) = ctx.park();
                cpu::set_cpu_id(cpu);
                entry(token);
            });
        })
}

/// 运行一个执行流，捕获其中的内核 panic 并使整机停机
///
/// 回收/停机引起的展开是正常退出
pub fn run_guarded<F: FnOnce()>(power: &Power, f: F) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(f)) {
        if payload.is::<Retired>() {
            return;
        }
        power.halt(Shutdown::Panic(panic_message(payload.as_ref())));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// 结束当前执行流
#[cfg(panic = "unwind")]
pub fn terminate() -> ! {
    panic::resume_unwind(Box::new(Retired))
}

/// 结束当前执行流
///
/// panic=abort 时无法展开，线程永久驻留
#[cfg(not(panic = "unwind"))]
pub fn terminate() -> ! {
    loop {
        thread::park();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::SchedLock;

    #[test]
    fn test_switch_hands_token_over() {
        let power = Power::new();
        let lock = Arc::new(SchedLock::new());
        let boot = ExecutionContext::new("boot", &power);
        let worker = ExecutionContext::new("worker", &power);
        let trace = Arc::new(spin::Mutex::new(Vec::new()));

        let (w, b, t, l) = (Arc::clone(&worker), Arc::clone(&boot), Arc::clone(&trace), Arc::clone(&lock));
        let handle = spawn(&worker, move |token| {
            assert!(l.holding());
            t.lock().push(("worker", cpu::current_cpu()));
            let token = switch(&w, &b, token);
            t.lock().push(("worker-again", cpu::current_cpu()));
            let _ = switch(&w, &b, token);
        })
        .unwrap();

        let (b, w, t) = (Arc::clone(&boot), Arc::clone(&worker), Arc::clone(&trace));
        thread::spawn(move || {
            cpu::set_cpu_id(1);
            let token = lock.acquire();
            let token = switch(&b, &w, token);
            t.lock().push(("boot", cpu::current_cpu()));
            let token = switch(&b, &w, token);
            assert!(lock.holding());
            lock.release(token);
        })
        .join()
        .unwrap();

        assert_eq!(
            *trace.lock(),
            vec![("worker", 1), ("boot", 1), ("worker-again", 1)]
        );
        worker.retire();
        handle.join().unwrap();
    }

    #[test]
    fn test_guard_reports_panic() {
        let power = Power::new();
        run_guarded(&power, || panic!("invariant broken"));
        assert_eq!(power.reason(), Some(Shutdown::Panic("invariant broken".to_string())));
    }

    #[test]
    fn test_retire_is_quiet() {
        let power = Power::new();
        let ctx = ExecutionContext::new("idle", &power);
        let handle = spawn(&ctx, |_token| unreachable!("never resumed")).unwrap();
        ctx.retire();
        handle.join().unwrap();
        assert!(!power.is_halted());
    }
}
