//! 调度策略
//!
//! 每个容器的调度器持有一个策略对象，决定一次完整扫描中各步访问哪个槽位。
//! 策略必须是一个排列：一次扫描恰好访问每个槽位一次。

/// 调度策略
pub trait SchedPolicy: Send + Sync {
    /// 策略名
    fn name(&self) -> &'static str;

    /// 一次扫描的第 `step` 步访问的槽位，`0 <= step < capacity`
    fn pick(&self, step: usize, capacity: usize) -> usize;
}

/// 轮转：按槽位升序扫描
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobin;

impl SchedPolicy for RoundRobin {
    fn name(&self) -> &'static str {
        "round-robin"
    }

    #[inline]
    fn pick(&self, step: usize, _capacity: usize) -> usize {
        step
    }
}

/// 逆序扫描
///
/// 只改变访问顺序，用来验证调度循环不依赖具体顺序
#[derive(Debug, Default, Clone, Copy)]
pub struct Reverse;

impl SchedPolicy for Reverse {
    fn name(&self) -> &'static str {
        "reverse"
    }

    #[inline]
    fn pick(&self, step: usize, capacity: usize) -> usize {
        capacity - 1 - step
    }
}
