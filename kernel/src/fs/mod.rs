//! 文件系统
//!
//! 调度核心只需要文件系统的引用计数语义：fork 复制描述符和 cwd，exit 关闭它们。
//! 这里提供一个最小的内存实现：
//! - `inode`: inode 缓存 (fs/inode.c)
//! - `file`: 系统打开文件表 (fs/file_table.c)
//! - `FileSystem`: 平坦的 路径 → inode 名字表，加上 lookup/mknod/open

pub mod file;
pub mod inode;

use alloc::collections::BTreeMap;
use alloc::string::{String, ToString};
use core::sync::atomic::{AtomicU32, Ordering};

pub use file::{FileFlags, FileRef, FileTable};
pub use inode::{Ino, InodeCache, InodeMode, InodeRef};

use crate::errno::Errno;

/// 根目录的 inode 编号
pub const ROOT_INO: Ino = 1;

/// 文件系统
pub struct FileSystem {
    names: spin::RwLock<BTreeMap<String, (Ino, InodeMode)>>,
    next_ino: AtomicU32,
    icache: InodeCache,
    ftable: FileTable,
}

impl FileSystem {
    pub fn new(ninode: usize, nfile: usize) -> Self {
        let mut names = BTreeMap::new();
        names.insert("/".to_string(), (ROOT_INO, InodeMode::new(InodeMode::S_IFDIR | 0o755)));
        Self {
            names: spin::RwLock::new(names),
            next_ino: AtomicU32::new(ROOT_INO + 1),
            icache: InodeCache::new(ninode),
            ftable: FileTable::new(nfile),
        }
    }

    /// 根目录
    pub fn root(&self) -> Result<InodeRef, Errno> {
        self.lookup_path("/")
    }

    /// 按路径查找（namei），返回 inode 引用
    pub fn lookup_path(&self, path: &str) -> Result<InodeRef, Errno> {
        let (ino, mode) = *self.names.read().get(path).ok_or(Errno::NoSuchFileOrDirectory)?;
        self.icache.get(ino, mode)
    }

    /// 创建节点
    pub fn mknod(&self, path: &str, mode: InodeMode) -> Result<Ino, Errno> {
        if !path.starts_with('/') || path.len() < 2 {
            return Err(Errno::InvalidArgument);
        }
        let mut names = self.names.write();
        if names.contains_key(path) {
            return Err(Errno::FileExists);
        }
        let ino = self.next_ino.fetch_add(1, Ordering::Relaxed);
        names.insert(path.to_string(), (ino, mode));
        log::debug!("fs: mknod {} -> ino {}", path, ino);
        Ok(ino)
    }

    /// 打开文件，返回系统打开文件表中的对象
    pub fn open(&self, path: &str, flags: FileFlags) -> Result<FileRef, Errno> {
        let inode = self.lookup_path(path)?;
        self.ftable.alloc(inode, flags).map_err(|(e, inode)| {
            self.icache.release(inode);
            e
        })
    }

    /// 复制 inode 引用
    pub fn idup(&self, inode: &InodeRef) -> InodeRef {
        self.icache.dup(inode)
    }

    /// 释放 inode 引用
    pub fn iput(&self, inode: InodeRef) {
        self.icache.release(inode);
    }

    /// 复制文件引用
    pub fn fdup(&self, file: &FileRef) -> FileRef {
        self.ftable.dup(file)
    }

    /// 关闭文件引用
    pub fn fclose(&self, file: FileRef) {
        if let Some(inode) = self.ftable.close(file) {
            self.icache.release(inode);
        }
    }

    pub fn inode_refs(&self, inode: &InodeRef) -> i64 {
        self.icache.refs(inode)
    }

    pub fn file_refs(&self, file: &FileRef) -> i64 {
        self.ftable.refs(file)
    }

    /// 文件对象对应的 inode 编号
    pub fn file_ino(&self, file: &FileRef) -> Ino {
        self.ftable.stat(file).0
    }

    pub fn icache(&self) -> &InodeCache {
        &self.icache
    }

    pub fn ftable(&self) -> &FileTable {
        &self.ftable
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close() {
        let fs = FileSystem::new(4, 4);
        let ino = fs.mknod("/console", InodeMode::new(InodeMode::S_IFCHR)).unwrap();
        assert_eq!(fs.mknod("/console", InodeMode::new(InodeMode::S_IFCHR)), Err(Errno::FileExists));
        assert_eq!(fs.open("/missing", FileFlags::new(0)), Err(Errno::NoSuchFileOrDirectory));

        let f = fs.open("/console", FileFlags::new(FileFlags::O_RDWR)).unwrap();
        assert_eq!(fs.file_ino(&f), ino);
        let g = fs.fdup(&f);
        assert_eq!(fs.file_refs(&g), 2);
        fs.fclose(f);
        fs.fclose(g);
        assert_eq!(fs.ftable().in_use(), 0);
        assert_eq!(fs.icache().in_use(), 0);
    }

    #[test]
    fn test_root_refs() {
        let fs = FileSystem::new(4, 4);
        let root = fs.root().unwrap();
        assert!(fs.icache().mode(&root).is_directory());
        let cwd = fs.idup(&root);
        assert_eq!(fs.inode_refs(&root), 2);
        fs.iput(cwd);
        fs.iput(root);
        assert_eq!(fs.icache().in_use(), 0);
    }
}
