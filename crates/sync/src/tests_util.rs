// Shared test bootstrap for the sync crate.
//
// Registers a host-side ArchOps backed by test-support's MockArchOps.
// Registration is process-global, so it is guarded the same way the
// device crate's ram-disk tests guard theirs.

extern crate std;

use crate::ArchOps;
use core::sync::atomic::{AtomicUsize, Ordering};
use test_support::mock::arch::MOCK_ARCH_OPS;

struct HostArchOps;

impl ArchOps for HostArchOps {
    unsafe fn read_and_disable_interrupts(&self) -> usize {
        unsafe { MOCK_ARCH_OPS.read_and_disable_interrupts() }
    }

    unsafe fn restore_interrupts(&self, flags: usize) {
        unsafe { MOCK_ARCH_OPS.restore_interrupts(flags) }
    }

    fn sstatus_sie(&self) -> usize {
        MOCK_ARCH_OPS.sstatus_sie()
    }

    fn cpu_id(&self) -> usize {
        MOCK_ARCH_OPS.cpu_id()
    }

    fn max_cpu_count(&self) -> usize {
        MOCK_ARCH_OPS.max_cpu_count()
    }

    fn yield_now(&self) {
        // 宿主机上直接让给其它线程
        std::thread::yield_now();
    }
}

static HOST_ARCH_OPS: HostArchOps = HostArchOps;
// 0 = uninit, 1 = initializing, 2 = ready
static SYNC_INIT: AtomicUsize = AtomicUsize::new(0);

pub fn init_sync_arch_ops() {
    match SYNC_INIT.compare_exchange(0, 1, Ordering::AcqRel, Ordering::Acquire) {
        Ok(_) => {
            // Safety: tests use a single global ArchOps instance.
            unsafe { crate::register_arch_ops(&HOST_ARCH_OPS) };
            SYNC_INIT.store(2, Ordering::Release);
        }
        Err(_) => {
            while SYNC_INIT.load(Ordering::Acquire) != 2 {
                core::hint::spin_loop();
            }
        }
    }
}
