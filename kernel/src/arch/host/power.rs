//! 关机与故障停机 (host)
//!
//! 对应 SBI 的 system_reset：一旦停机，所有逻辑 CPU 在下一个检查点退出，
//! 驻留的执行上下文在轮询时自行退出。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// 停机原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Shutdown {
    /// 正常关机（init 调用 shutdown）
    PowerOff,
    /// 内核不变量被破坏，整机停止
    Panic(String),
    /// 看门狗超时
    Watchdog,
}

/// 电源状态
pub struct Power {
    halted: AtomicBool,
    reason: Mutex<Option<Shutdown>>,
    signal: Condvar,
}

impl Power {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            halted: AtomicBool::new(false),
            reason: Mutex::new(None),
            signal: Condvar::new(),
        })
    }

    /// 是否已经停机
    #[inline]
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::Acquire)
    }

    /// 停机，只记录第一个原因
    pub fn halt(&self, why: Shutdown) {
        let mut reason = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        if reason.is_none() {
            match &why {
                Shutdown::PowerOff => log::info!("power: system halted"),
                Shutdown::Panic(msg) => log::error!("power: kernel panic: {}", msg),
                Shutdown::Watchdog => log::error!("power: watchdog expired"),
            }
            *reason = Some(why);
        }
        self.halted.store(true, Ordering::Release);
        self.signal.notify_all();
    }

    /// 停机原因（尚未停机时为 `None`）
    pub fn reason(&self) -> Option<Shutdown> {
        self.reason.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// 阻塞直到停机；超过 `timeout` 则以看门狗原因停机
    pub fn wait(&self, timeout: Option<Duration>) -> Shutdown {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut reason = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(why) = reason.as_ref() {
                return why.clone();
            }
            match deadline {
                None => {
                    reason = self.signal.wait(reason).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        drop(reason);
                        self.halt(Shutdown::Watchdog);
                        reason = self.reason.lock().unwrap_or_else(PoisonError::into_inner);
                        continue;
                    }
                    reason = self
                        .signal
                        .wait_timeout(reason, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|e| e.into_inner().0);
                }
            }
        }
    }
}
