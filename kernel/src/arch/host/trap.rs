//! 用户态陷入帧 (host)
//!
//! 布局沿用 AArch64：x0~x30、sp_el0、elr_el1、spsr_el1。
//! - x0: 系统调用第一个参数 / 返回值
//! - x8: 系统调用号
//! - elr: 返回用户态后继续执行的位置
//!
//! 宿主机模拟中用户程序是一个闭包，`elr` 充当"续点"：fork 的子进程以父进程
//! 陷入时保存的 `elr` 重新进入程序，程序据此决定从哪里继续。

/// 陷入帧
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Trapframe {
    /// 通用寄存器 x0~x30
    pub regs: [u64; 31],
    /// 用户栈指针 (sp_el0)
    pub sp: u64,
    /// 异常返回地址 (elr_el1)
    pub elr: u64,
    /// 保存的程序状态 (spsr_el1)
    pub spsr: u64,
}

impl Trapframe {
    /// 返回值寄存器 (x0)
    pub const RET: usize = 0;
    /// 系统调用号寄存器 (x8)
    pub const SYSNO: usize = 8;
    /// 系统调用参数个数上限
    pub const MAX_ARGS: usize = 6;

    /// 用户程序入口帧
    pub fn user_entry(entry: u64, stack_top: u64) -> Self {
        Self {
            elr: entry,
            sp: stack_top,
            ..Self::default()
        }
    }

    /// 第 n 个系统调用参数
    #[inline]
    pub fn arg(&self, n: usize) -> u64 {
        assert!(n < Self::MAX_ARGS, "syscall argument {} out of range", n);
        self.regs[n]
    }

    /// 系统调用号
    #[inline]
    pub fn syscall_no(&self) -> u64 {
        self.regs[Self::SYSNO]
    }

    /// 填写系统调用号和参数（陷入前由用户态完成）
    pub fn set_syscall(&mut self, no: u64, args: &[u64]) {
        assert!(args.len() <= Self::MAX_ARGS, "too many syscall arguments: {}", args.len());
        self.regs[Self::SYSNO] = no;
        self.regs[..args.len()].copy_from_slice(args);
    }

    /// 返回值
    #[inline]
    pub fn ret(&self) -> u64 {
        self.regs[Self::RET]
    }

    /// 写入返回值
    #[inline]
    pub fn set_ret(&mut self, value: u64) {
        self.regs[Self::RET] = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syscall_registers() {
        let mut tf = Trapframe::user_entry(0, 4096);
        tf.set_syscall(220, &[7, 8]);
        assert_eq!(tf.syscall_no(), 220);
        assert_eq!(tf.arg(0), 7);
        assert_eq!(tf.arg(1), 8);
        tf.set_ret(42);
        assert_eq!(tf.ret(), 42);
        assert_eq!(tf.sp, 4096);
    }
}
