//! MIT License
//!
//! Copyright (c) 2026 Fei Wang
//!

//! 内存管理模块
//!
//! - `page`: 物理页与有界页帧池
//! - `pagemap`: 用户地址空间

pub mod page;
pub mod pagemap;

pub use page::{page_round_up, FrameAllocator, Page, PhysFrame, PhysicalMemory, VirtAddr};
pub use pagemap::AddressSpace;

pub use crate::config::PAGE_SIZE;
