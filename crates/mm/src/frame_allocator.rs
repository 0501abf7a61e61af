//! 帧分配器模块
//!
//! 本模块提供物理内存帧的分配、共享计数和写时复制支持。
//!
//! ## 分配策略（每核空闲链）
//!
//! 每个 CPU 核拥有一条独立的空闲帧列表，各自由自旋锁保护：
//!
//! - 快速路径：从本核列表弹出一帧，只竞争本核的锁
//! - 本核耗尽：按固定顺序（`cpu+1, cpu+2, ...` 回绕）探测其它核，
//!   捐赠核的锁只在摘取一帧的瞬间持有
//! - 所有核都空：返回 [`AllocError::OutOfMemory`]，由调用方决定
//!   放弃哪个操作（例如失败的 fork 或缺页处理）
//!
//! 被窃取的帧从捐赠核列表摘下后直接交给请求核，
//! 任何时刻一帧至多出现在一条空闲列表上。
//!
//! ## 引用计数与写时复制
//!
//! 一张全局引用计数表（单独一把自旋锁）记录每帧的共享数：
//!
//! - 分配时计数置 1；共享映射（如 fork）通过 [`PageAllocator::inc_share`] 递增
//! - 释放递减计数，**减到 0 是帧回到空闲列表的唯一途径**；
//!   此时帧内容清零，防止数据泄漏给下一个使用者
//! - 写故障由 [`PageAllocator::resolve_write`] 处理：计数为 1 原地改写权限
//!   （零拷贝），否则分配新帧复制内容并递减旧帧一次
//!
//! 自旋锁临界区只覆盖表项操作；清零和页复制都在不持锁时进行
//! （此时帧对其它执行流不可达，或内容对所有共享者只读因而稳定）。
//!
//! ## RAII：自动回收
//!
//! [`FrameTracker`] 是面向全局分配器的单帧 RAII 封装：
//! `clone` 等价于共享计数递增，`Drop` 时递减并在归零时回收。
//!
//! # 模块组成
//!
//! - [`PageAllocator`]：可独立实例化的分配器（便于测试多种拓扑）
//! - [`init_frame_allocator`]：初始化全局帧分配器
//! - [`alloc_frame`] / [`dealloc_frame`] / [`inc_share`] / [`resolve_write`]：
//!   面向当前 CPU 的全局 API

use crate::address::{AlignOps, Paddr, Ppn, PpnRange, UsizeConvert};
use crate::arch_ops::frame_ptr;
use crate::page_table::{PageTableOps, PagingError, PagingResult, UniversalPTEFlag};
use alloc::boxed::Box;
use alloc::vec::Vec;
use once_cell::race::OnceBox;
use sync::SpinLock;

// ============================================================================
// 错误类型
// ============================================================================

/// 帧分配失败
///
/// 可恢复错误：只中止当前操作，不影响系统其余部分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// 所有核的空闲列表都已耗尽
    OutOfMemory,
}

// ============================================================================
// PageAllocator - 每核空闲链 + 引用计数表
// ============================================================================

/// 物理帧分配器。
///
/// 空闲帧按核分片，引用计数表支持写时复制共享。
/// 所有方法都以 `&self` 工作，内部细粒度加锁，可被多核并发调用。
pub struct PageAllocator {
    /// 管理的物理页码范围
    range: PpnRange,
    /// 每核空闲帧列表（索引即核号）
    free_lists: Vec<SpinLock<Vec<Ppn>>>,
    /// 每帧引用计数，索引为帧在 range 内的偏移
    ref_counts: SpinLock<Vec<u32>>,
}

impl PageAllocator {
    /// 创建分配器，将 `range` 内的帧平均分配到 `cpu_count` 条空闲列表。
    ///
    /// 前 `cpu_count - 1` 个核各得 `total / cpu_count` 帧的连续区段，
    /// 余数归最后一个核。帧内容不清零：分配出的帧内容未定义，
    /// 由调用者初始化（清零发生在释放归零时）。
    pub fn new(range: PpnRange, cpu_count: usize) -> Self {
        assert!(cpu_count > 0, "PageAllocator: cpu_count must be nonzero");

        let total = range.len();
        let per_cpu = total / cpu_count;

        let mut free_lists = Vec::with_capacity(cpu_count);
        for cpu in 0..cpu_count {
            let lo = cpu * per_cpu;
            let hi = if cpu == cpu_count - 1 { total } else { lo + per_cpu };
            let chunk: Vec<Ppn> = (lo..hi).map(|off| range.start() + off).collect();
            free_lists.push(SpinLock::new(chunk));
        }

        log::debug!(
            "mm: page allocator managing {} frames across {} cpus",
            total,
            cpu_count
        );

        PageAllocator {
            range,
            free_lists,
            ref_counts: SpinLock::new(alloc::vec![0u32; total]),
        }
    }

    /// 管理的页码范围。
    pub fn range(&self) -> PpnRange {
        self.range
    }

    /// 参与分配的核数。
    pub fn cpu_count(&self) -> usize {
        self.free_lists.len()
    }

    /// 总帧数。
    pub fn total_frames(&self) -> usize {
        self.range.len()
    }

    /// 指定核的空闲帧数。
    pub fn free_frames_on(&self, cpu: usize) -> usize {
        self.free_lists[cpu].lock().len()
    }

    /// 所有核的空闲帧总数。
    pub fn free_frames(&self) -> usize {
        (0..self.cpu_count()).map(|c| self.free_frames_on(c)).sum()
    }

    /// 指定核空闲列表的快照（仅用于测试中的穷举扫描）。
    #[cfg(test)]
    pub(crate) fn free_list_on(&self, cpu: usize) -> Vec<Ppn> {
        self.free_lists[cpu].lock().clone()
    }

    /// 帧在引用计数表中的索引；不在管理范围内时返回 None。
    fn index_of(&self, ppn: Ppn) -> Option<usize> {
        self.range
            .contains(ppn)
            .then(|| ppn.as_usize() - self.range.start().as_usize())
    }

    /// 帧的当前引用计数。
    ///
    /// # Panics
    /// 帧不在管理范围内时 panic。
    pub fn ref_count(&self, ppn: Ppn) -> u32 {
        let idx = self
            .index_of(ppn)
            .unwrap_or_else(|| panic!("ref_count: frame {:#x} out of range", ppn.as_usize()));
        self.ref_counts.lock()[idx]
    }

    /// 在 `cpu` 核上分配一帧，引用计数置 1，内容未定义。
    ///
    /// 本核列表为空时按固定顺序窃取其它核的空闲帧；
    /// 捐赠核的锁只在摘取单帧期间持有。
    pub fn alloc_frame_on(&self, cpu: usize) -> Result<Ppn, AllocError> {
        let ncpu = self.cpu_count();
        debug_assert!(cpu < ncpu, "alloc_frame_on: bad cpu id {cpu}");

        for probe in 0..ncpu {
            let target = (cpu + probe) % ncpu;
            // 锁只覆盖单帧摘取，绝不跨核嵌套
            let taken = self.free_lists[target].lock().pop();

            if let Some(ppn) = taken {
                let idx = self.index_of(ppn).unwrap_or_else(|| {
                    panic!("alloc_frame_on: free list held foreign frame {:#x}", ppn.as_usize())
                });
                let mut counts = self.ref_counts.lock();
                debug_assert_eq!(
                    counts[idx], 0,
                    "alloc_frame_on: frame on free list with live references"
                );
                counts[idx] = 1;
                return Ok(ppn);
            }
        }

        Err(AllocError::OutOfMemory)
    }

    /// 在 `cpu` 核上释放一帧（递减引用计数）。
    ///
    /// 计数减到 0 时清零帧内容并把帧压入 `cpu` 核的空闲列表；
    /// 计数仍为正时帧保持已分配状态，其余共享者不受影响。
    ///
    /// # Panics
    /// 帧不在管理范围内，或帧本来就没有存活引用（重复释放）。
    pub fn dealloc_frame_on(&self, cpu: usize, ppn: Ppn) {
        let idx = self
            .index_of(ppn)
            .unwrap_or_else(|| panic!("dealloc_frame: frame {:#x} out of range", ppn.as_usize()));

        let now_free = {
            let mut counts = self.ref_counts.lock();
            assert!(
                counts[idx] > 0,
                "dealloc_frame: double free of frame {:#x}",
                ppn.as_usize()
            );
            counts[idx] -= 1;
            counts[idx] == 0
        };

        if now_free {
            // 计数已归零，帧对所有执行流不可达，可以在锁外清零
            clear_frame(ppn);
            self.free_lists[cpu].lock().push(ppn);
        }
    }

    /// 按物理地址释放一帧。
    ///
    /// # Panics
    /// 地址未按页对齐或不在管理范围内（无效释放，程序错误）。
    pub fn dealloc_paddr_on(&self, cpu: usize, paddr: Paddr) {
        let page_size = crate::mm_config().page_size();
        assert!(
            paddr.is_aligned(page_size),
            "dealloc_frame: unaligned physical address {:#x}",
            paddr.as_usize()
        );
        self.dealloc_frame_on(cpu, Ppn::from_addr_floor(paddr));
    }

    /// 为已分配的帧增加一个共享者（例如 fork 共享映射时）。
    ///
    /// # Panics
    /// 帧不在管理范围内或当前没有存活引用。
    pub fn inc_share(&self, ppn: Ppn) {
        let idx = self
            .index_of(ppn)
            .unwrap_or_else(|| panic!("inc_share: frame {:#x} out of range", ppn.as_usize()));
        let mut counts = self.ref_counts.lock();
        assert!(
            counts[idx] > 0,
            "inc_share: frame {:#x} has no live references",
            ppn.as_usize()
        );
        counts[idx] += 1;
    }

    /// 写时复制故障处理。
    ///
    /// 查询 `vaddr` 的当前映射：
    ///
    /// - 引用计数为 1：独占帧，原地把映射改为可写（零拷贝）
    /// - 引用计数大于 1：在 `cpu` 核上分配新帧，复制内容，
    ///   以可写安装新映射后旧帧递减一次引用；其它共享者不受影响。
    ///   映射更新失败时副本被回收，旧帧引用保持不变
    ///
    /// 返回故障地址最终映射到的物理页码。
    ///
    /// 页复制在不持任何自旋锁时进行：旧帧对所有共享者均为只读，
    /// 内容在复制期间稳定。并发的其它共享者可能同时完成自己的复制，
    /// 使旧帧计数先行下降，这不影响本次复制的正确性。
    pub fn resolve_write(
        &self,
        pt: &mut dyn PageTableOps,
        vaddr: crate::address::Vaddr,
        cpu: usize,
    ) -> PagingResult<Ppn> {
        let (old_ppn, flags) = pt.lookup(vaddr)?;
        if !flags.contains(UniversalPTEFlag::VALID) {
            return Err(PagingError::NotMapped);
        }

        let idx = self
            .index_of(old_ppn)
            .ok_or(PagingError::InvalidAddress)?;
        let new_flags = (flags | UniversalPTEFlag::WRITABLE) - UniversalPTEFlag::COW;

        let shared = {
            let counts = self.ref_counts.lock();
            assert!(
                counts[idx] > 0,
                "resolve_write: write fault on free frame {:#x}",
                old_ppn.as_usize()
            );
            counts[idx] > 1
        };

        if !shared {
            // 独占：只需升级权限
            pt.update(vaddr, old_ppn, new_flags)?;
            return Ok(old_ppn);
        }

        let new_ppn = self.alloc_frame_on(cpu).map_err(|_| {
            log::warn!("mm: copy-on-write allocation failed at {:#x}", vaddr.as_usize());
            PagingError::OutOfMemory
        })?;

        copy_frame(old_ppn, new_ppn);
        // 先安装新映射再递减旧帧：更新失败时回收副本，
        // 旧映射连同其引用计数保持原样
        if let Err(e) = pt.update(vaddr, new_ppn, new_flags) {
            self.dealloc_frame_on(cpu, new_ppn);
            return Err(e);
        }
        self.dealloc_frame_on(cpu, old_ppn);
        Ok(new_ppn)
    }
}

// ============================================================================
// 帧内容操作
// ============================================================================

/// 将指定的物理页帧清零。
fn clear_frame(ppn: Ppn) {
    let page_size = crate::mm_config().page_size();
    unsafe {
        // 通过注册的地址转换获得可写指针
        let va = frame_ptr(ppn.start_addr());
        core::ptr::write_bytes(va, 0, page_size);
    }
}

/// 将 src 帧的内容复制到 dst 帧。
fn copy_frame(src: Ppn, dst: Ppn) {
    let page_size = crate::mm_config().page_size();
    unsafe {
        let src_va = frame_ptr(src.start_addr());
        let dst_va = frame_ptr(dst.start_addr());
        core::ptr::copy_nonoverlapping(src_va, dst_va, page_size);
    }
}

// ============================================================================
// 全局帧分配器
// ============================================================================

static FRAME_ALLOCATOR: OnceBox<PageAllocator> = OnceBox::new();

/// 获取全局帧分配器。
fn frame_allocator() -> &'static PageAllocator {
    match FRAME_ALLOCATOR.get() {
        Some(a) => a,
        None => panic!("mm: frame allocator not initialized"),
    }
}

/// 当前核号。
#[inline]
fn current_cpu() -> usize {
    sync::arch_ops().cpu_id()
}

/// 初始化全局帧分配器。
///
/// 物理内存范围与核数均取自注册的 [`crate::MmConfig`]；
/// 起始地址向上、结束地址向下取整到页边界。
///
/// # Panics
/// 重复初始化时 panic。
pub fn init_frame_allocator() {
    let config = crate::mm_config();
    let start_ppn = Ppn::from_addr_ceil(Paddr::from_usize(config.memory_start()));
    let end_ppn = Ppn::from_addr_floor(Paddr::from_usize(config.memory_end()));
    let range = PpnRange::new(start_ppn, end_ppn);
    let cpu_count = config.cpu_count();

    let allocator = Box::new(PageAllocator::new(range, cpu_count));
    if FRAME_ALLOCATOR.set(allocator).is_err() {
        panic!("mm: frame allocator already initialized");
    }
}

/// 在当前核上分配一帧，返回 RAII 跟踪器。
pub fn alloc_frame() -> Result<FrameTracker, AllocError> {
    frame_allocator()
        .alloc_frame_on(current_cpu())
        .map(FrameTracker)
}

/// 在当前核上按物理地址释放一帧。
///
/// # Panics
/// 地址未对齐或不在管理范围内。
pub fn dealloc_frame(paddr: Paddr) {
    frame_allocator().dealloc_paddr_on(current_cpu(), paddr);
}

/// 为指定帧增加一个共享者。
pub fn inc_share(ppn: Ppn) {
    frame_allocator().inc_share(ppn);
}

/// 查询指定帧的引用计数。
pub fn frame_ref_count(ppn: Ppn) -> u32 {
    frame_allocator().ref_count(ppn)
}

/// 在当前核上处理写时复制故障。
pub fn resolve_write(
    pt: &mut dyn PageTableOps,
    vaddr: crate::address::Vaddr,
) -> PagingResult<Ppn> {
    frame_allocator().resolve_write(pt, vaddr, current_cpu())
}

/// 全局分配器的空闲帧总数。
pub fn free_frames() -> usize {
    frame_allocator().free_frames()
}

// ============================================================================
// FrameTracker - 单帧 RAII 封装
// ============================================================================

/// 物理帧跟踪器。
///
/// 实现了 RAII 模式：`clone` 为帧增加一个共享者，
/// drop 时递减引用，计数归零则帧被自动回收。
/// 由它管理的帧**不得**再通过 [`dealloc_frame`] 手动释放。
#[derive(Debug)]
pub struct FrameTracker(Ppn);

impl FrameTracker {
    /// 获取此帧跟踪器所管理的物理页号 (Ppn)。
    pub fn ppn(&self) -> Ppn {
        self.0
    }
}

impl Clone for FrameTracker {
    /// 共享该帧：引用计数加一。
    fn clone(&self) -> Self {
        frame_allocator().inc_share(self.0);
        FrameTracker(self.0)
    }
}

impl Drop for FrameTracker {
    /// 自动递减引用计数，归零时回收物理页帧。
    fn drop(&mut self) {
        frame_allocator().dealloc_frame_on(current_cpu(), self.0);
    }
}

// ============================================================================
// 测试
// ============================================================================


#[cfg(test)]
mod tests {
    extern crate std;

    use super::tests_util::*;
    use super::*;
    use crate::address::{UsizeConvert, Vaddr};
    use std::collections::BTreeSet;
    use std::thread;
    use std::vec::Vec;
    use test_support::mock::mm::MockPageTable;

    #[test]
    fn test_refcount_walk_and_zero_on_free() {
        let alloc = PageAllocator::new(carve(8), 2);
        assert_eq!(alloc.free_frames(), 8);

        let ppn = alloc.alloc_frame_on(0).unwrap();
        assert_eq!(alloc.ref_count(ppn), 1);
        assert_eq!(alloc.free_frames(), 7);

        fill_frame(ppn, 0xA5);
        alloc.inc_share(ppn);
        assert_eq!(alloc.ref_count(ppn), 2);

        // 第一次释放：帧仍被另一个共享者持有
        alloc.dealloc_frame_on(0, ppn);
        assert_eq!(alloc.ref_count(ppn), 1);
        assert_eq!(alloc.free_frames(), 7);
        assert_eq!(frame_byte(ppn, 0), 0xA5);

        // 第二次释放：归零并回到某条空闲列表
        alloc.dealloc_frame_on(0, ppn);
        assert_eq!(alloc.ref_count(ppn), 0);
        assert_eq!(alloc.free_frames(), 8);
        assert_eq!(frame_byte(ppn, 0), 0);
        assert_eq!(frame_byte(ppn, PAGE_SIZE - 1), 0);
    }

    #[test]
    fn test_steal_from_fixed_probe_order() {
        // 4 核 × 16 帧
        let alloc = PageAllocator::new(carve(64), 4);
        for cpu in 0..4 {
            assert_eq!(alloc.free_frames_on(cpu), 16);
        }

        // 耗尽核 0 和核 1 的本地列表
        let mut held = Vec::new();
        for _ in 0..16 {
            held.push(alloc.alloc_frame_on(0).unwrap());
        }
        for _ in 0..16 {
            held.push(alloc.alloc_frame_on(1).unwrap());
        }
        assert_eq!(alloc.free_frames_on(0), 0);
        assert_eq!(alloc.free_frames_on(1), 0);

        // 核 0 的下一次分配按 1 → 2 的顺序探测，从核 2 窃取
        let stolen = alloc.alloc_frame_on(0).unwrap();
        assert_eq!(alloc.free_frames_on(2), 15);
        assert_eq!(alloc.free_frames_on(3), 16);
        assert_eq!(alloc.ref_count(stolen), 1);

        // 被窃取的帧不得同时出现在任何空闲列表上
        for cpu in 0..4 {
            assert!(!alloc.free_list_on(cpu).contains(&stolen));
        }
    }

    #[test]
    fn test_out_of_memory_is_recoverable() {
        let alloc = PageAllocator::new(carve(8), 2);

        let mut held = Vec::new();
        for _ in 0..8 {
            held.push(alloc.alloc_frame_on(0).unwrap());
        }
        assert_eq!(alloc.alloc_frame_on(0), Err(AllocError::OutOfMemory));
        assert_eq!(alloc.alloc_frame_on(1), Err(AllocError::OutOfMemory));

        // 释放一帧即可恢复（压入核 1 的列表，核 0 通过窃取拿到）
        alloc.dealloc_frame_on(1, held.pop().unwrap());
        let again = alloc.alloc_frame_on(0).unwrap();
        assert_eq!(alloc.ref_count(again), 1);
    }

    #[test]
    fn test_resolve_write_exclusive_is_zero_copy() {
        let alloc = PageAllocator::new(carve(8), 2);
        let ppn = alloc.alloc_frame_on(0).unwrap();
        fill_frame(ppn, 0x3C);

        let mut pt = MockPageTable::new();
        let va = 0x1000_0000;
        let cow = UniversalPTEFlag::VALID | UniversalPTEFlag::READABLE | UniversalPTEFlag::COW;
        assert!(pt.map(va, ppn.as_usize(), cow.bits()));

        let free_before = alloc.free_frames();
        let resolved = alloc
            .resolve_write(&mut pt, Vaddr::from_usize(va + 0x42), 0)
            .unwrap();

        // 独占帧：原页原地升级，没有任何分配或复制
        assert_eq!(resolved, ppn);
        assert_eq!(alloc.free_frames(), free_before);
        assert_eq!(alloc.ref_count(ppn), 1);

        let mapping = pt.find(va).unwrap();
        let flags = UniversalPTEFlag::from_bits_truncate(mapping.flags);
        assert!(flags.contains(UniversalPTEFlag::WRITABLE));
        assert!(!flags.contains(UniversalPTEFlag::COW));
        assert_eq!(frame_byte(ppn, 7), 0x3C);
    }

    #[test]
    fn test_resolve_write_shared_copies_once() {
        let alloc = PageAllocator::new(carve(8), 2);
        let ppn = alloc.alloc_frame_on(0).unwrap();
        fill_frame(ppn, 0x77);

        // 两个地址空间共享同一帧（fork 后的典型局面）
        alloc.inc_share(ppn);
        let cow = UniversalPTEFlag::VALID | UniversalPTEFlag::READABLE | UniversalPTEFlag::COW;
        let mut parent = MockPageTable::new();
        let mut child = MockPageTable::new();
        let va = 0x2000_0000;
        assert!(parent.map(va, ppn.as_usize(), cow.bits()));
        assert!(child.map(va, ppn.as_usize(), cow.bits()));

        let free_before = alloc.free_frames();
        let new_ppn = alloc
            .resolve_write(&mut child, Vaddr::from_usize(va), 1)
            .unwrap();

        // 恰好一次复制、一次旧帧递减
        assert_ne!(new_ppn, ppn);
        assert_eq!(alloc.free_frames(), free_before - 1);
        assert_eq!(alloc.ref_count(ppn), 1);
        assert_eq!(alloc.ref_count(new_ppn), 1);
        assert_eq!(frame_byte(new_ppn, 0), 0x77);
        assert_eq!(frame_byte(new_ppn, PAGE_SIZE - 1), 0x77);

        // 子映射指向新帧且可写；父映射保持不变
        let child_map = child.find(va).unwrap();
        assert_eq!(child_map.ppn, new_ppn.as_usize());
        let child_flags = UniversalPTEFlag::from_bits_truncate(child_map.flags);
        assert!(child_flags.contains(UniversalPTEFlag::WRITABLE));
        assert!(!child_flags.contains(UniversalPTEFlag::COW));

        let parent_map = parent.find(va).unwrap();
        assert_eq!(parent_map.ppn, ppn.as_usize());
        assert_eq!(UniversalPTEFlag::from_bits_truncate(parent_map.flags), cow);
    }

    #[test]
    fn test_resolve_write_errors() {
        let alloc = PageAllocator::new(carve(4), 2);
        let mut pt = MockPageTable::new();

        // 未映射地址
        assert_eq!(
            alloc.resolve_write(&mut pt, Vaddr::from_usize(0x9000_0000), 0),
            Err(PagingError::NotMapped)
        );

        // 共享帧 + 内存耗尽 → OutOfMemory，且旧帧不受影响
        let mut held = Vec::new();
        let ppn = alloc.alloc_frame_on(0).unwrap();
        while let Ok(p) = alloc.alloc_frame_on(0) {
            held.push(p);
        }
        alloc.inc_share(ppn);
        let cow = UniversalPTEFlag::VALID | UniversalPTEFlag::READABLE | UniversalPTEFlag::COW;
        let va = 0x3000_0000;
        assert!(pt.map(va, ppn.as_usize(), cow.bits()));

        assert_eq!(
            alloc.resolve_write(&mut pt, Vaddr::from_usize(va), 0),
            Err(PagingError::OutOfMemory)
        );
        assert_eq!(alloc.ref_count(ppn), 2);
        assert_eq!(pt.find(va).unwrap().ppn, ppn.as_usize());
    }

    #[test]
    fn test_resolve_write_update_failure_releases_copy() {
        // 只读页表：查找正常，任何映射更新都失败
        struct FrozenPageTable(MockPageTable);

        impl PageTableOps for FrozenPageTable {
            fn lookup(&self, vaddr: Vaddr) -> PagingResult<(Ppn, UniversalPTEFlag)> {
                self.0.lookup(vaddr)
            }

            fn update(
                &mut self,
                _vaddr: Vaddr,
                _ppn: Ppn,
                _flags: UniversalPTEFlag,
            ) -> PagingResult<()> {
                Err(PagingError::InvalidAddress)
            }
        }

        let alloc = PageAllocator::new(carve(8), 2);
        let ppn = alloc.alloc_frame_on(0).unwrap();
        alloc.inc_share(ppn);

        let cow = UniversalPTEFlag::VALID | UniversalPTEFlag::READABLE | UniversalPTEFlag::COW;
        let mut inner = MockPageTable::new();
        let va = 0x4000_0000;
        assert!(inner.map(va, ppn.as_usize(), cow.bits()));
        let mut pt = FrozenPageTable(inner);

        let free_before = alloc.free_frames();
        assert_eq!(
            alloc.resolve_write(&mut pt, Vaddr::from_usize(va), 0),
            Err(PagingError::InvalidAddress)
        );

        // 副本已回收、旧帧引用原封不动
        assert_eq!(alloc.free_frames(), free_before);
        assert_eq!(alloc.ref_count(ppn), 2);
        assert_eq!(pt.0.find(va).unwrap().ppn, ppn.as_usize());
    }

    #[test]
    #[should_panic(expected = "out of range")]
    fn test_dealloc_out_of_range_panics() {
        let alloc = PageAllocator::new(carve(4), 1);
        let bogus = alloc.range().end() + 100;
        alloc.dealloc_frame_on(0, bogus);
    }

    #[test]
    #[should_panic(expected = "unaligned")]
    fn test_dealloc_unaligned_panics() {
        let alloc = PageAllocator::new(carve(4), 1);
        let pa = Paddr::from_usize(alloc.range().start().start_addr().as_usize() + 1);
        alloc.dealloc_paddr_on(0, pa);
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn test_double_free_panics() {
        let alloc = PageAllocator::new(carve(4), 1);
        let ppn = alloc.alloc_frame_on(0).unwrap();
        alloc.dealloc_frame_on(0, ppn);
        alloc.dealloc_frame_on(0, ppn);
    }

    #[test]
    fn test_concurrent_fuzz_no_double_listing() {
        let alloc = PageAllocator::new(carve(64), 4);

        thread::scope(|s| {
            for cpu in 0..4usize {
                let alloc = &alloc;
                s.spawn(move || {
                    // 线程即核；简单 xorshift 驱动随机分配/释放
                    let mut state = 0x9E37_79B9u32.wrapping_add(cpu as u32);
                    let mut rand = move || {
                        state ^= state << 13;
                        state ^= state >> 17;
                        state ^= state << 5;
                        state
                    };

                    let mut held: Vec<Ppn> = Vec::new();
                    for _ in 0..1000 {
                        if held.is_empty() || rand() % 2 == 0 {
                            if let Ok(ppn) = alloc.alloc_frame_on(cpu) {
                                held.push(ppn);
                            }
                        } else {
                            let i = (rand() as usize) % held.len();
                            alloc.dealloc_frame_on(cpu, held.swap_remove(i));
                        }
                    }
                    for ppn in held {
                        alloc.dealloc_frame_on(cpu, ppn);
                    }
                });
            }
        });

        // 穷举扫描：每帧只出现在一条空闲列表上，总数不增不减
        let mut seen = BTreeSet::new();
        let mut total = 0usize;
        for cpu in 0..4 {
            let list = alloc.free_list_on(cpu);
            total += list.len();
            for ppn in list {
                assert!(
                    seen.insert(ppn.as_usize()),
                    "frame {:#x} on two lists",
                    ppn.as_usize()
                );
                assert_eq!(alloc.ref_count(ppn), 0);
            }
        }
        assert_eq!(total, 64);
    }

    #[test]
    fn test_global_allocator_and_frame_tracker() {
        init_mm_test_env();
        // 全局分配器管理注册配置报告的整段物理内存
        init_frame_allocator();
        assert_eq!(free_frames(), GLOBAL_FRAMES);

        let frame = alloc_frame().unwrap();
        let ppn = frame.ppn();
        assert_eq!(frame_ref_count(ppn), 1);

        let shared = frame.clone();
        assert_eq!(frame_ref_count(ppn), 2);

        drop(frame);
        assert_eq!(frame_ref_count(ppn), 1);
        drop(shared);
        assert_eq!(frame_ref_count(ppn), 0);
        assert_eq!(free_frames(), GLOBAL_FRAMES);

        // 手动地址释放路径：对齐检查之后等价于按页号释放
        let frame = alloc_frame().unwrap();
        let pa = frame.ppn().start_addr();
        inc_share(frame.ppn());
        dealloc_frame(pa);
        assert_eq!(frame_ref_count(frame.ppn()), 1);
    }
}
