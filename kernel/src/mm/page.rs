//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 页帧管理
//!
//! 宿主机模拟的物理内存是一个有界页帧池：帧号只是记账单位，页内容存放在
//! 随页一起移动的堆缓冲区中。池耗尽时分配返回 `None`，调用者映射为 `ENOMEM`。

use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;

use crate::config::{PAGE_SHIFT, PAGE_SIZE};

pub const PAGE_MASK: usize = PAGE_SIZE - 1;

pub type PhysFrameNr = usize;

pub type VirtPageNr = usize;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtAddr(pub usize);

impl VirtAddr {
    pub fn new(addr: usize) -> Self {
        Self(addr)
    }

    pub fn as_usize(&self) -> usize {
        self.0
    }

    /// 所在页号
    pub fn floor(&self) -> VirtPageNr {
        self.0 >> PAGE_SHIFT
    }

    /// 页内偏移
    pub fn page_offset(&self) -> usize {
        self.0 & PAGE_MASK
    }

    pub fn is_aligned(&self) -> bool {
        self.page_offset() == 0
    }
}

/// 字节数向上取整到页
#[inline]
pub const fn page_round_up(size: usize) -> usize {
    (size + PAGE_MASK) & !PAGE_MASK
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysFrame {
    pub number: PhysFrameNr,
}

impl PhysFrame {
    pub fn new(number: PhysFrameNr) -> Self {
        Self { number }
    }

    pub fn start_address(&self) -> usize {
        self.number << PAGE_SHIFT
    }
}

/// 一个已分配的物理页
///
/// 不可克隆：页只能通过 `FrameAllocator::free_page` 归还一次
pub struct Page {
    frame: PhysFrame,
    data: Box<[u8]>,
}

impl Page {
    pub fn frame(&self) -> PhysFrame {
        self.frame
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl core::fmt::Debug for Page {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Page").field("frame", &self.frame.number).finish()
    }
}

/// 页帧分配器接口
///
/// 对应 Linux 的 alloc_page() / __free_page()
pub trait FrameAllocator: Send + Sync {
    /// 分配一个清零的页，池耗尽返回 `None`
    fn alloc_page(&self) -> Option<Page>;

    /// 归还一个页
    fn free_page(&self, page: Page);

    /// 剩余空闲页数
    fn free_pages(&self) -> usize;
}

/// 有界物理页池
pub struct PhysicalMemory {
    total_frames: usize,
    inner: spin::Mutex<FramePool>,
}

struct FramePool {
    /// 回收的空闲帧（LIFO）
    free_list: Vec<PhysFrameNr>,
    /// 尚未分配过的下一帧
    next_free: PhysFrameNr,
    in_use: Vec<bool>,
}

impl PhysicalMemory {
    pub fn new(total_frames: usize) -> Self {
        Self {
            total_frames,
            inner: spin::Mutex::new(FramePool {
                free_list: Vec::new(),
                next_free: 0,
                in_use: vec![false; total_frames],
            }),
        }
    }

    pub fn total_frames(&self) -> usize {
        self.total_frames
    }
}

impl FrameAllocator for PhysicalMemory {
    fn alloc_page(&self) -> Option<Page> {
        let number = {
            let mut pool = self.inner.lock();
            let number = match pool.free_list.pop() {
                Some(number) => number,
                None if pool.next_free < self.total_frames => {
                    pool.next_free += 1;
                    pool.next_free - 1
                }
                None => return None,
            };
            pool.in_use[number] = true;
            number
        };
        Some(Page {
            frame: PhysFrame::new(number),
            data: vec![0u8; PAGE_SIZE].into_boxed_slice(),
        })
    }

    fn free_page(&self, page: Page) {
        let number = page.frame.number;
        let mut pool = self.inner.lock();
        if number >= self.total_frames || !pool.in_use[number] {
            panic!("free_page: frame {} is not allocated", number);
        }
        pool.in_use[number] = false;
        pool.free_list.push(number);
    }

    fn free_pages(&self) -> usize {
        let pool = self.inner.lock();
        self.total_frames - pool.next_free + pool.free_list.len()
    }
}
