//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! PID 命名空间
//!
//! 对应 Linux 的 struct pid_namespace (kernel/pid_namespace.c)：
//! - 每个容器一个命名空间，pid 从 1 开始单调递增，不复用
//! - 一个进程在所属容器以及每个祖先容器中各有一个 pid
//! - 容量为 `NPID`，满时分配返回 `EAGAIN`

use alloc::collections::BTreeMap;

use crate::errno::Errno;
use crate::process::{Pid, ProcHandle};

/// PID 命名空间
#[derive(Debug)]
pub struct PidNamespace {
    last: Pid,
    capacity: usize,
    entries: BTreeMap<Pid, ProcHandle>,
}

impl PidNamespace {
    pub fn new(capacity: usize) -> Self {
        Self {
            last: 0,
            capacity,
            entries: BTreeMap::new(),
        }
    }

    /// 分配下一个 pid 并登记进程
    pub fn alloc(&mut self, handle: ProcHandle) -> Result<Pid, Errno> {
        if self.entries.len() >= self.capacity {
            return Err(Errno::TryAgain);
        }
        self.last += 1;
        self.entries.insert(self.last, handle);
        Ok(self.last)
    }

    /// 注销 pid
    pub fn release(&mut self, pid: Pid) -> Option<ProcHandle> {
        self.entries.remove(&pid)
    }

    /// 注销进程，返回它在本命名空间中的 pid
    pub fn remove(&mut self, handle: ProcHandle) -> Option<Pid> {
        let pid = self.pid_of(handle)?;
        self.entries.remove(&pid);
        Some(pid)
    }

    /// 按 pid 查找进程
    pub fn lookup(&self, pid: Pid) -> Option<ProcHandle> {
        self.entries.get(&pid).copied()
    }

    /// 进程在本命名空间中的 pid
    pub fn pid_of(&self, handle: ProcHandle) -> Option<Pid> {
        self.entries.iter().find(|(_, h)| **h == handle).map(|(pid, _)| *pid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ContainerId;

    #[test]
    fn test_pids_are_monotonic() {
        let mut ns = PidNamespace::new(2);
        let a = ProcHandle::new(ContainerId::ROOT, 0);
        let b = ProcHandle::new(ContainerId::ROOT, 1);
        assert_eq!(ns.alloc(a), Ok(1));
        assert_eq!(ns.alloc(b), Ok(2));
        assert_eq!(ns.alloc(b), Err(Errno::TryAgain));

        assert_eq!(ns.remove(a), Some(1));
        assert_eq!(ns.lookup(1), None);
        // 不复用已释放的 pid
        assert_eq!(ns.alloc(a), Ok(3));
        assert_eq!(ns.pid_of(a), Some(3));
        assert_eq!(ns.release(2), Some(b));
        assert_eq!(ns.len(), 1);
    }
}
