//! 睡眠锁
//!
//! 长临界区使用的独占锁。与自旋锁不同，睡眠锁允许持有者
//! 在持锁期间阻塞（例如块缓冲区持有者等待磁盘 I/O 完成），
//! 因此它是内核中唯一允许挂起持有者线程的锁类型。
//!
//! 等待者通过 [`crate::ArchOps::yield_now`] 让出执行流，
//! 由注册的架构实现决定是切换到调度器还是简单自旋。
//!
//! 锁状态本身由一个 [`SpinLock`] 保护，自旋临界区只覆盖
//! 标志位的检查与翻转，不覆盖任何长操作。

use core::cell::UnsafeCell;

use crate::arch_ops;
use crate::spin_lock::SpinLock;

/// 睡眠锁，提供可跨阻塞操作持有的互斥访问。
///
/// # 示例
/// ```ignore
/// let lock = SleepLock::new([0u8; 512]);
/// {
///     let mut guard = lock.lock(); // 可能让出 CPU 直到锁可用
///     device_read(&mut guard[..]); // 持锁期间允许阻塞 I/O
/// } // 离开作用域，自动释放锁
/// ```
///
/// # 注意
/// 与 [`SpinLock`] 相反，**不得**在持有任何自旋锁时获取睡眠锁：
/// 自旋锁持有者不允许挂起。
#[derive(Debug)]
pub struct SleepLock<T> {
    /// 锁标志，true 表示已被某个持有者占用
    locked: SpinLock<bool>,
    data: UnsafeCell<T>,
}

impl<T> SleepLock<T> {
    /// 创建一个新的 SleepLock 实例，初始化内部数据。
    pub const fn new(data: T) -> Self {
        SleepLock {
            locked: SpinLock::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// 获取睡眠锁，并返回一个 RAII 保护器。
    ///
    /// 锁不可用时反复让出执行流，直到成功取得独占权。
    pub fn lock(&self) -> SleepLockGuard<'_, T> {
        loop {
            {
                let mut locked = self.locked.lock();
                if !*locked {
                    *locked = true;
                    break;
                }
            }
            // 锁被占用：在不持有任何自旋锁的情况下让出
            arch_ops().yield_now();
        }

        SleepLockGuard {
            lock: self,
            data: unsafe { &mut *self.data.get() },
        }
    }

    /// 尝试获取睡眠锁，如果成功则返回 RAII 保护器，否则返回 None。
    pub fn try_lock(&self) -> Option<SleepLockGuard<'_, T>> {
        let mut locked = self.locked.lock();
        if *locked {
            None
        } else {
            *locked = true;
            drop(locked);
            Some(SleepLockGuard {
                lock: self,
                data: unsafe { &mut *self.data.get() },
            })
        }
    }

    /// 仅翻转锁标志。
    fn unlock(&self) {
        let mut locked = self.locked.lock();
        debug_assert!(*locked, "SleepLock::unlock: lock not held");
        *locked = false;
    }
}

/// SleepLock 的 RAII 保护器，提供对锁定数据的独占访问。
///
/// 当保护器离开作用域时，自动释放锁。
pub struct SleepLockGuard<'a, T> {
    lock: &'a SleepLock<T>,
    data: &'a mut T,
}

impl<T> core::ops::Deref for SleepLockGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        self.data
    }
}

impl<T> core::ops::DerefMut for SleepLockGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data
    }
}

impl<T> Drop for SleepLockGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.unlock();
    }
}

// Safety: SleepLock 保证同一时刻至多一个持有者访问数据。
unsafe impl<T: Send> Send for SleepLock<T> {}
unsafe impl<T: Send> Sync for SleepLock<T> {}
