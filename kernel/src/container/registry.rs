//! 容器登记表
//!
//! 固定容量，编号即下标；根容器固定占用 0 号。登记表锁是叶子锁，
//! 可以在持有调度锁时查询。

use alloc::sync::Arc;
use alloc::vec::Vec;

use super::{Container, ContainerId};
use crate::errno::Errno;

enum Entry {
    Free,
    /// 编号已预留，容器尚在构建
    Reserved,
    Live(Arc<Container>),
}

/// 容器登记表
pub struct ContainerRegistry {
    entries: spin::RwLock<Vec<Entry>>,
}

impl ContainerRegistry {
    pub fn new(capacity: usize) -> Self {
        let mut entries = Vec::with_capacity(capacity);
        entries.resize_with(capacity, || Entry::Free);
        Self {
            entries: spin::RwLock::new(entries),
        }
    }

    /// 预留一个编号，满时返回 `EAGAIN`
    pub fn reserve(&self) -> Result<ContainerId, Errno> {
        let mut entries = self.entries.write();
        let id = entries
            .iter()
            .position(|entry| matches!(entry, Entry::Free))
            .ok_or(Errno::TryAgain)?;
        entries[id] = Entry::Reserved;
        Ok(ContainerId(id))
    }

    /// 登记构建完成的容器
    pub fn install(&self, container: Arc<Container>) {
        let id = container.id.0;
        let mut entries = self.entries.write();
        match entries[id] {
            Entry::Reserved => entries[id] = Entry::Live(container),
            _ => panic!("container registry: {} installed without reservation", container.id),
        }
    }

    /// 释放编号
    pub fn release(&self, id: ContainerId) {
        let mut entries = self.entries.write();
        match entries.get(id.0) {
            Some(Entry::Reserved) | Some(Entry::Live(_)) => entries[id.0] = Entry::Free,
            _ => panic!("container registry: releasing free id {}", id),
        }
    }

    /// 查找存活的容器
    pub fn get(&self, id: ContainerId) -> Option<Arc<Container>> {
        match self.entries.read().get(id.0) {
            Some(Entry::Live(container)) => Some(Arc::clone(container)),
            _ => None,
        }
    }

    /// 直接子容器
    pub fn children(&self, id: ContainerId) -> Vec<ContainerId> {
        self.entries
            .read()
            .iter()
            .filter_map(|entry| match entry {
                Entry::Live(c) if c.parent == Some(id) => Some(c.id),
                _ => None,
            })
            .collect()
    }

    /// 所有存活的容器
    pub fn live(&self) -> Vec<Arc<Container>> {
        self.entries
            .read()
            .iter()
            .filter_map(|entry| match entry {
                Entry::Live(c) => Some(Arc::clone(c)),
                _ => None,
            })
            .collect()
    }

    pub fn capacity(&self) -> usize {
        self.entries.read().len()
    }
}
