//! 读写自旋锁
//!
//! 基于 `lock_api` 实现的读写锁：多个读者可以并发访问，
//! 写者独占。适用于"初始化阶段写、运行阶段读"的注册表类
//! 数据（例如设备驱动列表）。
//!
//! # 注意
//! 与 [`crate::SpinLock`] 不同，读写锁不禁用本地中断，
//! 因此不要在中断处理路径中获取写锁。

use core::{
    hint,
    sync::atomic::{AtomicUsize, Ordering},
};
use lock_api::GuardSend;

/// 写锁占用时的状态值
const WRITE_LOCKED: usize = usize::MAX;

/// `lock_api::RawRwLock` 的自旋实现。
///
/// 状态编码：0 表示空闲，`WRITE_LOCKED` 表示写者独占，
/// 其余值表示当前读者数量。
pub struct RawRwSpinLock {
    state: AtomicUsize,
}

// Safety: 状态机保证读者与写者互斥、写者与写者互斥。
unsafe impl lock_api::RawRwLock for RawRwSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawRwSpinLock {
        state: AtomicUsize::new(0),
    };

    type GuardMarker = GuardSend;

    fn lock_shared(&self) {
        while !self.try_lock_shared() {
            hint::spin_loop();
        }
    }

    fn try_lock_shared(&self) -> bool {
        self.state
            .fetch_update(Ordering::Acquire, Ordering::Relaxed, |state| {
                if state == WRITE_LOCKED || state == WRITE_LOCKED - 1 {
                    None
                } else {
                    Some(state + 1)
                }
            })
            .is_ok()
    }

    unsafe fn unlock_shared(&self) {
        self.state.fetch_sub(1, Ordering::Release);
    }

    fn lock_exclusive(&self) {
        while !self.try_lock_exclusive() {
            hint::spin_loop();
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        self.state
            .compare_exchange(0, WRITE_LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_exclusive(&self) {
        self.state.store(0, Ordering::Release);
    }
}

/// 读写自旋锁
pub type RwLock<T> = lock_api::RwLock<RawRwSpinLock, T>;

/// 读保护器
pub type RwLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawRwSpinLock, T>;

/// 写保护器
pub type RwLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawRwSpinLock, T>;
