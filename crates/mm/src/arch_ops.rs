//! 内存管理架构操作 trait 定义和注册
//!
//! 帧分配器需要读写物理帧的内容（释放时清零、COW 时拷贝），
//! 而物理地址如何映射为可访问的虚拟地址取决于架构与内核布局。
//! 该依赖通过 [`ArchMmOps`] 抽象；宿主机测试用恒等映射实现。

use crate::address::Paddr;
use core::sync::atomic::{AtomicUsize, Ordering};

/// 内存管理架构操作
pub trait ArchMmOps: Send + Sync {
    /// 将物理地址转换为当前可访问的虚拟地址
    fn paddr_to_vaddr(&self, paddr: Paddr) -> usize;
}

static ARCH_OPS_DATA: AtomicUsize = AtomicUsize::new(0);
static ARCH_OPS_VTABLE: AtomicUsize = AtomicUsize::new(0);

/// 注册架构操作实现
///
/// # Safety
/// 必须在单线程环境下调用，且只能调用一次
pub unsafe fn register_arch_ops(ops: &'static dyn ArchMmOps) {
    let ptr = ops as *const dyn ArchMmOps;
    // SAFETY: 将 fat pointer 拆分为 data 和 vtable 两部分存储
    let (data, vtable) =
        unsafe { core::mem::transmute::<*const dyn ArchMmOps, (usize, usize)>(ptr) };
    ARCH_OPS_DATA.store(data, Ordering::Release);
    ARCH_OPS_VTABLE.store(vtable, Ordering::Release);
}

/// 获取已注册的架构操作实现
///
/// # Panics
/// 如果尚未调用 [`register_arch_ops`] 注册实现，则 panic
#[inline]
pub fn arch_ops() -> &'static dyn ArchMmOps {
    let data = ARCH_OPS_DATA.load(Ordering::Acquire);
    let vtable = ARCH_OPS_VTABLE.load(Ordering::Acquire);
    if data == 0 {
        panic!("mm: ArchMmOps not registered");
    }
    // SAFETY: 重组 fat pointer
    unsafe { &*core::mem::transmute::<(usize, usize), *const dyn ArchMmOps>((data, vtable)) }
}

/// 获取指向物理帧起始处的可写指针
#[inline]
pub(crate) fn frame_ptr(paddr: Paddr) -> *mut u8 {
    arch_ops().paddr_to_vaddr(paddr) as *mut u8
}
