//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 文件对象与系统打开文件表
//!
//! 对应 Linux 的 fs/file_table.c (alloc_file/fget/fput)：
//! - 全局 `NFILE` 个文件对象，多个描述符可以共享一个（dup/fork）
//! - 最后一个引用关闭时交还底层 inode

use alloc::boxed::Box;
use alloc::vec::Vec;

use super::inode::{Ino, InodeRef};
use crate::errno::Errno;
use crate::sync::RefCount;

/// 打开标志
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFlags(u32);

impl FileFlags {
    pub const O_RDONLY: u32 = 0o0;
    pub const O_WRONLY: u32 = 0o1;
    pub const O_RDWR: u32 = 0o2;
    pub const O_ACCMODE: u32 = 0o3;

    pub const fn new(flags: u32) -> Self {
        Self(flags)
    }

    pub fn is_readonly(&self) -> bool {
        self.0 & Self::O_ACCMODE == Self::O_RDONLY
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

/// 打开文件对象的句柄
///
/// 不可克隆：共享必须经过 `FileTable::dup`，释放经过 `FileTable::close`
#[derive(Debug, PartialEq, Eq)]
pub struct FileRef {
    slot: usize,
}

struct OpenFile {
    inode: InodeRef,
    flags: FileFlags,
}

struct FileSlot {
    refs: RefCount,
    file: spin::Mutex<Option<OpenFile>>,
}

/// 系统打开文件表
pub struct FileTable {
    slots: Box<[FileSlot]>,
    lock: spin::Mutex<()>,
}

impl FileTable {
    pub fn new(nfile: usize) -> Self {
        let slots: Vec<FileSlot> = (0..nfile)
            .map(|_| FileSlot {
                refs: RefCount::new(0),
                file: spin::Mutex::new(None),
            })
            .collect();
        Self {
            slots: slots.into_boxed_slice(),
            lock: spin::Mutex::new(()),
        }
    }

    /// 分配文件对象，表满时把 inode 原样交还并返回 `ENFILE`
    pub fn alloc(&self, inode: InodeRef, flags: FileFlags) -> Result<FileRef, (Errno, InodeRef)> {
        let _guard = self.lock.lock();
        match self.slots.iter().position(|slot| slot.file.lock().is_none()) {
            Some(i) => {
                *self.slots[i].file.lock() = Some(OpenFile { inode, flags });
                self.slots[i].refs.set(1);
                Ok(FileRef { slot: i })
            }
            None => Err((Errno::FileTableOverflow, inode)),
        }
    }

    /// 复制引用（get_file）
    pub fn dup(&self, file: &FileRef) -> FileRef {
        self.slots[file.slot].refs.increment();
        FileRef { slot: file.slot }
    }

    /// 释放引用（fput），最后一个引用返回底层 inode 交给调用者释放
    pub fn close(&self, file: FileRef) -> Option<InodeRef> {
        let _guard = self.lock.lock();
        let slot = &self.slots[file.slot];
        if slot.refs.decrement() {
            slot.file.lock().take().map(|open| open.inode)
        } else {
            None
        }
    }

    /// 当前引用数
    pub fn refs(&self, file: &FileRef) -> i64 {
        self.slots[file.slot].refs.get()
    }

    /// 底层 inode 编号与打开标志
    pub fn stat(&self, file: &FileRef) -> (Ino, FileFlags) {
        match self.slots[file.slot].file.lock().as_ref() {
            Some(open) => (open.inode.ino(), open.flags),
            None => panic!("file table: slot {} used after close", file.slot),
        }
    }

    /// 正在使用的文件对象数
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|slot| slot.file.lock().is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::inode::{InodeCache, InodeMode};

    #[test]
    fn test_last_close_returns_inode() {
        let icache = InodeCache::new(4);
        let table = FileTable::new(2);
        let inode = icache.get(3, InodeMode::new(InodeMode::S_IFREG)).unwrap();

        let f = table.alloc(inode, FileFlags::new(FileFlags::O_RDONLY)).unwrap();
        let g = table.dup(&f);
        assert_eq!(table.refs(&f), 2);
        assert_eq!(table.stat(&g).0, 3);
        assert!(table.stat(&g).1.is_readonly());

        assert!(table.close(f).is_none());
        let inode = table.close(g).expect("last close hands the inode back");
        assert_eq!(table.in_use(), 0);
        icache.release(inode);
        assert_eq!(icache.in_use(), 0);
    }

    #[test]
    fn test_table_overflow() {
        let icache = InodeCache::new(4);
        let table = FileTable::new(1);
        let mode = InodeMode::new(InodeMode::S_IFREG);
        let f = table.alloc(icache.get(1, mode).unwrap(), FileFlags::new(0)).unwrap();
        let (err, inode) = table.alloc(icache.get(2, mode).unwrap(), FileFlags::new(0)).unwrap_err();
        assert_eq!(err, Errno::FileTableOverflow);
        icache.release(inode);
        if let Some(inode) = table.close(f) {
            icache.release(inode);
        }
        assert_eq!(icache.in_use(), 0);
    }
}
