//! 地址模块
//!
//! 此模块提供了用于处理物理地址和虚拟地址，
//! 以及内存管理系统中的页码的抽象。
//!
//! # 地址类型
//!
//! - [`Paddr`] - 物理地址类型
//! - [`Vaddr`] - 虚拟地址类型
//!
//! # 页码
//!
//! - [`Ppn`] - 物理页码（Physical Page Number）
//! - [`Vpn`] - 虚拟页码（Virtual Page Number）
//! - [`PpnRange`] - 物理页码范围（半开区间，可迭代）
//!
//! # 操作
//!
//! - [`UsizeConvert`] - 在类型和 usize 之间进行转换
//! - [`AlignOps`] - 地址对齐操作
//!
//! 页大小来自注册的 [`crate::MmConfig`]。

use core::ops::Add;

/// 获取页大小
#[inline]
fn page_size() -> usize {
    crate::mm_config().page_size()
}

/// 在类型和 usize 之间进行转换的 trait。
pub trait UsizeConvert: Sized {
    /// 从 usize 构造。
    fn from_usize(v: usize) -> Self;
    /// 转换为 usize。
    fn as_usize(&self) -> usize;
}

/// 地址对齐操作。
pub trait AlignOps: UsizeConvert {
    /// 向下对齐到 align 的倍数（align 必须是 2 的幂）。
    fn align_down(&self, align: usize) -> Self {
        Self::from_usize(self.as_usize() & !(align - 1))
    }

    /// 向上对齐到 align 的倍数（align 必须是 2 的幂）。
    fn align_up(&self, align: usize) -> Self {
        Self::from_usize((self.as_usize() + align - 1) & !(align - 1))
    }

    /// 检查是否对齐到 align 的倍数。
    fn is_aligned(&self, align: usize) -> bool {
        self.as_usize() & (align - 1) == 0
    }
}

macro_rules! usize_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(usize);

        impl UsizeConvert for $name {
            fn from_usize(v: usize) -> Self {
                $name(v)
            }

            fn as_usize(&self) -> usize {
                self.0
            }
        }
    };
}

usize_newtype! {
    /// 物理地址
    Paddr
}

usize_newtype! {
    /// 虚拟地址
    Vaddr
}

usize_newtype! {
    /// 物理页码
    Ppn
}

usize_newtype! {
    /// 虚拟页码
    Vpn
}

impl AlignOps for Paddr {}
impl AlignOps for Vaddr {}

macro_rules! page_num_impl {
    ($name:ident, $addr:ident) => {
        impl $name {
            /// 从地址向下取整得到页码。
            pub fn from_addr_floor(addr: $addr) -> Self {
                Self(addr.as_usize() / page_size())
            }

            /// 从地址向上取整得到页码。
            pub fn from_addr_ceil(addr: $addr) -> Self {
                Self(addr.as_usize().div_ceil(page_size()))
            }

            /// 页的起始地址。
            pub fn start_addr(&self) -> $addr {
                $addr::from_usize(self.0 * page_size())
            }

            /// 页的结束地址（不包含）。
            pub fn end_addr(&self) -> $addr {
                $addr::from_usize((self.0 + 1) * page_size())
            }
        }

        impl Add<usize> for $name {
            type Output = $name;

            fn add(self, rhs: usize) -> Self::Output {
                $name(self.0 + rhs)
            }
        }
    };
}

page_num_impl!(Ppn, Paddr);
page_num_impl!(Vpn, Vaddr);

/// 物理页码范围（半开区间 [start, end)）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpnRange {
    start: Ppn,
    end: Ppn,
}

impl PpnRange {
    /// 从起止页码构造。
    pub fn new(start: Ppn, end: Ppn) -> Self {
        debug_assert!(start <= end);
        PpnRange { start, end }
    }

    /// 从起始页码和长度构造。
    pub fn from_start_len(start: Ppn, len: usize) -> Self {
        PpnRange {
            start,
            end: start + len,
        }
    }

    /// 起始页码。
    pub fn start(&self) -> Ppn {
        self.start
    }

    /// 结束页码（不包含）。
    pub fn end(&self) -> Ppn {
        self.end
    }

    /// 范围内的页数。
    pub fn len(&self) -> usize {
        self.end.as_usize() - self.start.as_usize()
    }

    /// 范围是否为空。
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// 检查页码是否落在范围内。
    pub fn contains(&self, ppn: Ppn) -> bool {
        self.start <= ppn && ppn < self.end
    }
}

impl Iterator for PpnRange {
    type Item = Ppn;

    fn next(&mut self) -> Option<Ppn> {
        if self.start < self.end {
            let cur = self.start;
            self.start = self.start + 1;
            Some(cur)
        } else {
            None
        }
    }
}
