//! 内存管理相关操作的 Mock 实现
//!
//! 注意：这里不直接依赖 `mm` crate（避免循环依赖）。
//! `mm` crate 在 `cfg(test)` 下为这些类型实现其 trait
//! （例如 `ArchMmOps` / `PageTableOps`）。

/// Mock 的内存管理架构操作
///
/// 默认实现采用"恒等映射"（vaddr == paddr），
/// 测试以宿主机堆内存充当"物理内存"，因此恒等映射即可直接读写帧内容。
pub struct MockMmOps;

impl MockMmOps {
    /// 创建 Mock 实例
    pub const fn new() -> Self {
        Self
    }

    /// 将虚拟地址转换为物理地址（测试默认：恒等映射）
    ///
    /// # Safety
    /// 仅用于测试环境的可控输入。
    pub unsafe fn vaddr_to_paddr(&self, vaddr: usize) -> usize {
        vaddr
    }

    /// 将物理地址转换为虚拟地址（测试默认：恒等映射）
    pub fn paddr_to_vaddr(&self, paddr: usize) -> usize {
        paddr
    }
}

/// 全局 Mock 实例
pub static MOCK_MM_OPS: MockMmOps = MockMmOps::new();

/// Mock 页表的单条映射
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MockMapping {
    /// 虚拟地址（按页对齐）
    pub vaddr: usize,
    /// 物理页号
    pub ppn: usize,
    /// 原始标志位（由使用方解释）
    pub flags: u64,
}

/// Mock 页表
///
/// 固定容量的线性表，足以覆盖单元测试使用的映射数量。
/// `mm` crate 在 `cfg(test)` 下为它实现页表遍历 trait。
pub struct MockPageTable {
    entries: [Option<MockMapping>; Self::CAPACITY],
}

impl MockPageTable {
    /// 容量上限
    pub const CAPACITY: usize = 64;

    /// 创建空页表
    pub const fn new() -> Self {
        Self {
            entries: [None; Self::CAPACITY],
        }
    }

    /// 建立一条映射；容量耗尽时返回 false
    pub fn map(&mut self, vaddr: usize, ppn: usize, flags: u64) -> bool {
        if self.find(vaddr).is_some() {
            return false;
        }
        for slot in self.entries.iter_mut() {
            if slot.is_none() {
                *slot = Some(MockMapping { vaddr, ppn, flags });
                return true;
            }
        }
        false
    }

    /// 查找映射
    pub fn find(&self, vaddr: usize) -> Option<MockMapping> {
        self.entries
            .iter()
            .flatten()
            .copied()
            .find(|m| m.vaddr == vaddr)
    }

    /// 更新既有映射；映射不存在时返回 false
    pub fn update(&mut self, vaddr: usize, ppn: usize, flags: u64) -> bool {
        for slot in self.entries.iter_mut() {
            if let Some(m) = slot {
                if m.vaddr == vaddr {
                    m.ppn = ppn;
                    m.flags = flags;
                    return true;
                }
            }
        }
        false
    }
}

impl Default for MockPageTable {
    fn default() -> Self {
        Self::new()
    }
}
