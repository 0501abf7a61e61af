//! 页表遍历接口
//!
//! 本模块定义帧分配器所消费的页表访问接口。
//! 页表的具体结构（层级、PTE 格式、TLB 维护）由各架构实现，
//! COW 故障处理只需要"查映射、改映射"两个同步操作。

use crate::address::{Ppn, Vaddr};
use bitflags::bitflags;

bitflags! {
    /// 架构无关的页表项标志
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UniversalPTEFlag: u64 {
        /// 映射有效
        const VALID = 1 << 0;
        /// 可读
        const READABLE = 1 << 1;
        /// 可写
        const WRITABLE = 1 << 2;
        /// 可执行
        const EXECUTABLE = 1 << 3;
        /// 用户态可访问
        const USER = 1 << 4;
        /// 写时复制页（只读共享，写入触发私有复制）
        const COW = 1 << 5;
    }
}

/// 分页操作中可能发生的错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PagingError {
    /// 虚拟地址未被映射
    NotMapped,
    /// 提供了无效的地址
    InvalidAddress,
    /// 内存耗尽
    OutOfMemory,
}

/// 分页操作的结果类型
pub type PagingResult<T> = Result<T, PagingError>;

/// 页表遍历接口
///
/// 由各架构的页表实现提供；[`crate::frame_allocator::PageAllocator::resolve_write`]
/// 通过它读取和更新故障地址的映射。两个操作都是同步的短操作，
/// 实现中不得阻塞。
pub trait PageTableOps {
    /// 查找虚拟地址对应的映射
    fn lookup(&self, vaddr: Vaddr) -> PagingResult<(Ppn, UniversalPTEFlag)>;

    /// 更新虚拟地址的映射（目标物理页与标志）
    fn update(&mut self, vaddr: Vaddr, ppn: Ppn, flags: UniversalPTEFlag) -> PagingResult<()>;
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::{UsizeConvert, Vaddr};
    use crate::frame_allocator::tests_util::init_mm_test_env;
    use test_support::mock::mm::MockPageTable;

    #[test]
    fn test_mock_page_table_lookup_update() {
        init_mm_test_env();
        let mut pt = MockPageTable::new();
        assert!(pt.map(0x4000, 9, (UniversalPTEFlag::VALID | UniversalPTEFlag::READABLE).bits()));

        // 页内偏移不影响查找
        let (ppn, flags) = PageTableOps::lookup(&pt, Vaddr::from_usize(0x4123)).unwrap();
        assert_eq!(ppn.as_usize(), 9);
        assert!(flags.contains(UniversalPTEFlag::READABLE));
        assert!(!flags.contains(UniversalPTEFlag::WRITABLE));

        PageTableOps::update(
            &mut pt,
            Vaddr::from_usize(0x4000),
            Ppn::from_usize(12),
            UniversalPTEFlag::VALID | UniversalPTEFlag::WRITABLE,
        )
        .unwrap();
        let (ppn, flags) = PageTableOps::lookup(&pt, Vaddr::from_usize(0x4000)).unwrap();
        assert_eq!(ppn.as_usize(), 12);
        assert!(flags.contains(UniversalPTEFlag::WRITABLE));

        assert_eq!(
            PageTableOps::lookup(&pt, Vaddr::from_usize(0x8000)).unwrap_err(),
            PagingError::NotMapped
        );
    }
}
