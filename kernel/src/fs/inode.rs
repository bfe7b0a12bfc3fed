//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! inode 缓存
//!
//! 对应 Linux 的 fs/inode.c (iget/ihold/iput) 与 xv6 的 icache：
//! 固定数量的内存 inode 槽位，每个槽位一个引用计数，最后一个引用释放时槽位回收。

use alloc::boxed::Box;
use alloc::vec::Vec;

use crate::errno::Errno;
use crate::sync::RefCount;

pub type Ino = u32;

/// 文件类型与权限
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InodeMode(u32);

impl InodeMode {
    pub const S_IFMT: u32 = 0o170000;
    pub const S_IFDIR: u32 = 0o040000;
    pub const S_IFREG: u32 = 0o100000;
    pub const S_IFCHR: u32 = 0o020000;

    pub const fn new(mode: u32) -> Self {
        Self(mode)
    }

    pub fn is_regular_file(&self) -> bool {
        self.0 & Self::S_IFMT == Self::S_IFREG
    }

    pub fn is_directory(&self) -> bool {
        self.0 & Self::S_IFMT == Self::S_IFDIR
    }

    pub fn is_char_device(&self) -> bool {
        self.0 & Self::S_IFMT == Self::S_IFCHR
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// 内存 inode 的句柄
///
/// 不可克隆：复制引用必须经过 `InodeCache::dup`，释放经过 `InodeCache::release`
#[derive(Debug, PartialEq, Eq)]
pub struct InodeRef {
    slot: usize,
    ino: Ino,
}

impl InodeRef {
    pub fn ino(&self) -> Ino {
        self.ino
    }
}

struct InodeSlot {
    refs: RefCount,
    /// (ino, mode)，`None` 表示空闲
    id: spin::Mutex<Option<(Ino, InodeMode)>>,
}

/// inode 缓存
pub struct InodeCache {
    slots: Box<[InodeSlot]>,
    /// 查找与回收互斥
    lock: spin::Mutex<()>,
}

impl InodeCache {
    pub fn new(ninode: usize) -> Self {
        let slots: Vec<InodeSlot> = (0..ninode)
            .map(|_| InodeSlot {
                refs: RefCount::new(0),
                id: spin::Mutex::new(None),
            })
            .collect();
        Self {
            slots: slots.into_boxed_slice(),
            lock: spin::Mutex::new(()),
        }
    }

    /// 获取 inode 的一个引用（iget），缓存满返回 `ENFILE`
    pub fn get(&self, ino: Ino, mode: InodeMode) -> Result<InodeRef, Errno> {
        let _guard = self.lock.lock();
        let mut empty = None;
        for (i, slot) in self.slots.iter().enumerate() {
            match *slot.id.lock() {
                Some((cached, _)) if cached == ino => {
                    slot.refs.increment();
                    return Ok(InodeRef { slot: i, ino });
                }
                None if empty.is_none() => empty = Some(i),
                _ => {}
            }
        }
        let i = empty.ok_or(Errno::FileTableOverflow)?;
        *self.slots[i].id.lock() = Some((ino, mode));
        self.slots[i].refs.set(1);
        Ok(InodeRef { slot: i, ino })
    }

    /// 复制引用（ihold）
    pub fn dup(&self, inode: &InodeRef) -> InodeRef {
        self.slots[inode.slot].refs.increment();
        InodeRef {
            slot: inode.slot,
            ino: inode.ino,
        }
    }

    /// 释放引用（iput），最后一个引用回收槽位
    pub fn release(&self, inode: InodeRef) {
        let _guard = self.lock.lock();
        let slot = &self.slots[inode.slot];
        if slot.refs.decrement() {
            *slot.id.lock() = None;
        }
    }

    /// 类型
    pub fn mode(&self, inode: &InodeRef) -> InodeMode {
        match *self.slots[inode.slot].id.lock() {
            Some((_, mode)) => mode,
            None => panic!("icache: inode {} used after release", inode.ino),
        }
    }

    /// 当前引用数
    pub fn refs(&self, inode: &InodeRef) -> i64 {
        self.slots[inode.slot].refs.get()
    }

    /// 正在使用的槽位数
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.id.lock().is_some()).count()
    }
}
