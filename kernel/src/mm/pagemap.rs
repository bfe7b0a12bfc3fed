//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!
//! 用户地址空间
//!
//! 对应 xv6 的 uvmcreate/uvmcopy/uvmfree/uvmalloc/uvmdealloc 以及 Linux 的
//! mm_struct。宿主机模拟中"页表"是一张 页号 → 物理页 的映射，外加一个根页
//! 占位，使创建地址空间本身也会消耗物理内存。
//!
//! 用户内存从虚拟地址 0 开始连续分布在 `[0, size)`。

use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicUsize, Ordering};

use super::page::{page_round_up, FrameAllocator, Page, VirtAddr, VirtPageNr};
use crate::config::PAGE_SIZE;
use crate::errno::Errno;

/// 地址空间编号分配器（对应 ASID）
static NEXT_ASID: AtomicUsize = AtomicUsize::new(1);

/// 用户地址空间
pub struct AddressSpace {
    asid: usize,
    root: Option<Page>,
    pages: BTreeMap<VirtPageNr, Page>,
    size: usize,
}

impl AddressSpace {
    /// 创建空地址空间
    pub fn create(alloc: &dyn FrameAllocator) -> Result<Self, Errno> {
        let root = alloc.alloc_page().ok_or(Errno::OutOfMemory)?;
        Ok(Self {
            asid: NEXT_ASID.fetch_add(1, Ordering::Relaxed),
            root: Some(root),
            pages: BTreeMap::new(),
            size: 0,
        })
    }

    /// 地址空间编号
    pub fn id(&self) -> usize {
        self.asid
    }

    /// 用户内存大小（字节）
    pub fn size(&self) -> usize {
        self.size
    }

    /// 已映射的页数
    pub fn mapped_pages(&self) -> usize {
        self.pages.len()
    }

    /// 在页对齐地址映射一个清零页
    pub fn map(&mut self, alloc: &dyn FrameAllocator, va: VirtAddr) -> Result<(), Errno> {
        if !va.is_aligned() {
            return Err(Errno::InvalidArgument);
        }
        let vpn = va.floor();
        if self.pages.contains_key(&vpn) {
            return Err(Errno::InvalidArgument);
        }
        let page = alloc.alloc_page().ok_or(Errno::OutOfMemory)?;
        self.pages.insert(vpn, page);
        Ok(())
    }

    fn unmap(&mut self, alloc: &dyn FrameAllocator, vpn: VirtPageNr) {
        if let Some(page) = self.pages.remove(&vpn) {
            alloc.free_page(page);
        }
    }

    /// 增长 `n` 字节，返回新大小
    ///
    /// 中途内存不足时撤销本次已映射的页
    pub fn grow(&mut self, alloc: &dyn FrameAllocator, n: usize) -> Result<usize, Errno> {
        let old = self.size;
        let new = old.checked_add(n).ok_or(Errno::OutOfMemory)?;
        let mut va = page_round_up(old);
        while va < new {
            if let Err(e) = self.map(alloc, VirtAddr::new(va)) {
                let mut undo = page_round_up(old);
                while undo < va {
                    self.unmap(alloc, VirtAddr::new(undo).floor());
                    undo += PAGE_SIZE;
                }
                return Err(e);
            }
            va += PAGE_SIZE;
        }
        self.size = new;
        Ok(new)
    }

    /// 收缩 `n` 字节，返回新大小
    pub fn shrink(&mut self, alloc: &dyn FrameAllocator, n: usize) -> Result<usize, Errno> {
        let new = self.size.checked_sub(n).ok_or(Errno::InvalidArgument)?;
        let mut va = page_round_up(new);
        while va < page_round_up(self.size) {
            self.unmap(alloc, VirtAddr::new(va).floor());
            va += PAGE_SIZE;
        }
        self.size = new;
        Ok(new)
    }

    /// 复制整个地址空间（fork）
    ///
    /// 失败时已复制的部分全部释放
    pub fn copy(&self, alloc: &dyn FrameAllocator) -> Result<Self, Errno> {
        let mut child = Self::create(alloc)?;
        for (&vpn, page) in &self.pages {
            match alloc.alloc_page() {
                Some(mut copy) => {
                    copy.as_mut_slice().copy_from_slice(page.as_slice());
                    child.pages.insert(vpn, copy);
                }
                None => {
                    child.destroy(alloc);
                    return Err(Errno::OutOfMemory);
                }
            }
        }
        child.size = self.size;
        Ok(child)
    }

    /// 释放所有页和根页
    pub fn destroy(mut self, alloc: &dyn FrameAllocator) {
        for (_, page) in core::mem::take(&mut self.pages) {
            alloc.free_page(page);
        }
        if let Some(root) = self.root.take() {
            alloc.free_page(root);
        }
    }

    /// 从用户内存读取（copyin）
    pub fn read(&self, va: usize, buf: &mut [u8]) -> Result<(), Errno> {
        self.check_range(va, buf.len())?;
        let mut done = 0;
        while done < buf.len() {
            let addr = VirtAddr::new(va + done);
            let page = self.pages.get(&addr.floor()).ok_or(Errno::BadAddress)?;
            let off = addr.page_offset();
            let n = (PAGE_SIZE - off).min(buf.len() - done);
            buf[done..done + n].copy_from_slice(&page.as_slice()[off..off + n]);
            done += n;
        }
        Ok(())
    }

    /// 写入用户内存（copyout）
    pub fn write(&mut self, va: usize, buf: &[u8]) -> Result<(), Errno> {
        self.check_range(va, buf.len())?;
        let mut done = 0;
        while done < buf.len() {
            let addr = VirtAddr::new(va + done);
            let page = self.pages.get_mut(&addr.floor()).ok_or(Errno::BadAddress)?;
            let off = addr.page_offset();
            let n = (PAGE_SIZE - off).min(buf.len() - done);
            page.as_mut_slice()[off..off + n].copy_from_slice(&buf[done..done + n]);
            done += n;
        }
        Ok(())
    }

    /// 读取以 NUL 结尾的字符串，最多 `max` 字节
    pub fn read_str(&self, va: usize, max: usize) -> Result<alloc::string::String, Errno> {
        let mut bytes = alloc::vec::Vec::new();
        for i in 0..max {
            let mut byte = [0u8; 1];
            self.read(va + i, &mut byte)?;
            if byte[0] == 0 {
                return alloc::string::String::from_utf8(bytes).map_err(|_| Errno::InvalidArgument);
            }
            bytes.push(byte[0]);
        }
        Err(Errno::InvalidArgument)
    }

    fn check_range(&self, va: usize, len: usize) -> Result<(), Errno> {
        match va.checked_add(len) {
            Some(end) if end <= self.size => Ok(()),
            _ => Err(Errno::BadAddress),
        }
    }
}

impl Drop for AddressSpace {
    fn drop(&mut self) {
        if self.root.is_some() {
            log::warn!("mm: address space {} dropped without destroy, {} pages leaked", self.asid, self.pages.len() + 1);
        }
    }
}

impl core::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("asid", &self.asid)
            .field("size", &self.size)
            .field("pages", &self.pages.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::PhysicalMemory;

    #[test]
    fn test_grow_shrink_accounting() {
        let mem = PhysicalMemory::new(8);
        let mut space = AddressSpace::create(&mem).unwrap();
        assert_eq!(mem.free_pages(), 7);

        assert_eq!(space.grow(&mem, PAGE_SIZE + 1), Ok(PAGE_SIZE + 1));
        assert_eq!(space.mapped_pages(), 2);
        assert_eq!(space.shrink(&mem, 1), Ok(PAGE_SIZE));
        assert_eq!(space.mapped_pages(), 1);
        assert_eq!(space.shrink(&mem, 2 * PAGE_SIZE), Err(Errno::InvalidArgument));

        space.destroy(&mem);
        assert_eq!(mem.free_pages(), 8);
    }

    #[test]
    fn test_grow_rolls_back() {
        let mem = PhysicalMemory::new(3);
        let mut space = AddressSpace::create(&mem).unwrap();
        assert_eq!(space.grow(&mem, 3 * PAGE_SIZE), Err(Errno::OutOfMemory));
        assert_eq!(space.size(), 0);
        assert_eq!(space.mapped_pages(), 0);
        assert_eq!(mem.free_pages(), 2);
        space.destroy(&mem);
    }

    #[test]
    fn test_copy_is_independent() {
        let mem = PhysicalMemory::new(8);
        let mut parent = AddressSpace::create(&mem).unwrap();
        parent.grow(&mem, PAGE_SIZE).unwrap();
        parent.write(100, b"parent").unwrap();

        let mut child = parent.copy(&mem).unwrap();
        assert_ne!(child.id(), parent.id());
        child.write(100, b"child!").unwrap();

        let mut buf = [0u8; 6];
        parent.read(100, &mut buf).unwrap();
        assert_eq!(&buf, b"parent");
        child.read(100, &mut buf).unwrap();
        assert_eq!(&buf, b"child!");

        assert_eq!(parent.write(PAGE_SIZE - 2, b"xyz"), Err(Errno::BadAddress));
        child.destroy(&mem);
        parent.destroy(&mem);
        assert_eq!(mem.free_pages(), 8);
    }

    #[test]
    fn test_copy_rolls_back() {
        let mem = PhysicalMemory::new(4);
        let mut parent = AddressSpace::create(&mem).unwrap();
        parent.grow(&mem, 2 * PAGE_SIZE).unwrap();
        // 剩 1 页：只够子空间的根页
        assert_eq!(parent.copy(&mem).err(), Some(Errno::OutOfMemory));
        assert_eq!(mem.free_pages(), 1);
        parent.destroy(&mem);
    }

    #[test]
    fn test_read_str() {
        let mem = PhysicalMemory::new(4);
        let mut space = AddressSpace::create(&mem).unwrap();
        space.grow(&mem, PAGE_SIZE).unwrap();
        space.write(8, b"/init\0").unwrap();
        assert_eq!(space.read_str(8, 16).as_deref(), Ok("/init"));
        assert_eq!(space.read_str(8, 3), Err(Errno::InvalidArgument));
        space.destroy(&mem);
    }
}
