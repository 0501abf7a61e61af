//! 物理内存管理子系统
//!
//! 提供地址抽象、每核物理帧分配、写时复制（COW）引用计数
//! 和页表遍历接口。
//!
//! # 架构解耦
//!
//! 通过 trait 抽象与架构特定组件解耦：
//! - [`ArchMmOps`]: 物理地址到可访问虚拟地址的转换
//! - [`MmConfig`]: 内存布局常量（页大小、物理内存范围、CPU 数量）
//!
//! 使用前必须调用 [`register_arch_ops`] 和 [`register_config`] 注册实现。

#![no_std]

extern crate alloc;

mod arch_ops;
mod config;

pub mod address;
pub mod frame_allocator;
pub mod page_table;

pub use arch_ops::{ArchMmOps, arch_ops, register_arch_ops};
pub use config::{MmConfig, mm_config, register_config};

// Re-export 常用类型
pub use address::{AlignOps, Paddr, Ppn, PpnRange, UsizeConvert, Vaddr, Vpn};
pub use frame_allocator::{
    AllocError, FrameTracker, PageAllocator, alloc_frame, dealloc_frame, frame_ref_count,
    free_frames, inc_share, init_frame_allocator, resolve_write,
};
pub use page_table::{PageTableOps, PagingError, PagingResult, UniversalPTEFlag};
