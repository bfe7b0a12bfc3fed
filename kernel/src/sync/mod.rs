//! 同步原语 (Synchronization Primitives)
//!
//! 遵循 Linux 内核的同步机制设计：
//! - `include/linux/spinlock.h` - 自旋锁
//! - `include/linux/kref.h` - 引用计数
//! - `include/linux/semaphore.h` - 信号量
//! - `kernel/sched/wait.c` - 睡眠与唤醒
//!
//! 锁顺序（由外到内）：
//! 1. 调用者自己的 `SpinLock`（sleep 的条件锁、信号量内部锁）
//! 2. 调度锁 `SchedLock`
//! 3. 容器锁（pid 命名空间，子容器先于父容器）
//! 4. 叶子锁：进程数据锁、内存池、文件表、容器登记表

pub mod condvar;
pub mod refcount;
pub mod sched_lock;
pub mod semaphore;
pub mod spinlock;

pub use condvar::ConditionVariable;
pub use refcount::RefCount;
pub use sched_lock::{SchedCell, SchedLock, SchedToken};
pub use semaphore::Semaphore;
pub use spinlock::SpinLock;
