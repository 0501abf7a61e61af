//! 架构相关操作的 Mock 实现

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Mock 架构操作
pub struct MockArchOps {
    /// 模拟的中断使能状态
    pub interrupt_state: AtomicBool,
    /// 模拟的当前 CPU ID
    pub cpu_id: AtomicUsize,
    /// 模拟的 CPU 数量
    pub max_cpus: AtomicUsize,
}

impl MockArchOps {
    /// 创建默认 Mock（单核、中断开启）
    pub const fn new() -> Self {
        Self {
            interrupt_state: AtomicBool::new(true),
            cpu_id: AtomicUsize::new(0),
            max_cpus: AtomicUsize::new(1),
        }
    }

    /// 读取并"禁用"模拟中断，返回之前的状态
    ///
    /// # Safety
    /// 仅用于测试环境，不涉及真实硬件状态。
    pub unsafe fn read_and_disable_interrupts(&self) -> usize {
        self.interrupt_state.swap(false, Ordering::SeqCst) as usize
    }

    /// 恢复模拟中断状态
    ///
    /// # Safety
    /// flags 必须是之前 read_and_disable_interrupts 返回的值。
    pub unsafe fn restore_interrupts(&self, flags: usize) {
        self.interrupt_state.store(flags != 0, Ordering::SeqCst);
    }

    /// 中断使能位
    pub fn sstatus_sie(&self) -> usize {
        0x2 // SIE bit
    }

    /// 当前 CPU ID
    pub fn cpu_id(&self) -> usize {
        self.cpu_id.load(Ordering::Relaxed)
    }

    /// CPU 数量
    pub fn max_cpu_count(&self) -> usize {
        self.max_cpus.load(Ordering::Relaxed)
    }
}

impl Default for MockArchOps {
    fn default() -> Self {
        Self::new()
    }
}

/// 全局 Mock 实例
pub static MOCK_ARCH_OPS: MockArchOps = MockArchOps::new();
