//! 宿主机模拟架构
//!
//! - `cpu`: 逻辑 CPU 编号（线程局部）与忙等辅助
//! - `context`: 执行上下文与 switch 原语
//! - `trap`: 用户态陷入帧
//! - `power`: 关机与故障停机

pub mod context;
pub mod cpu;
pub mod power;
pub mod trap;
