//! 内存模拟块设备

use super::BlockDriver;
use crate::driver::{DeviceType, Driver};
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicUsize, Ordering};
use sync::SpinLock;

/// 内存模拟的块设备
///
/// 用于测试和开发。除数据本身外还统计读写次数，
/// 便于验证"命中不读盘、未命中只读一次"这类缓存性质。
pub struct RamDisk {
    /// 存储数据
    data: SpinLock<Vec<u8>>,

    /// 块大小
    block_size: usize,

    /// 设备 ID
    device_id: usize,

    /// 累计读块次数
    reads: AtomicUsize,

    /// 累计写块次数
    writes: AtomicUsize,
}

impl RamDisk {
    /// 创建指定大小的内存磁盘
    pub fn new(size: usize, block_size: usize, device_id: usize) -> Arc<Self> {
        Arc::new(Self {
            data: SpinLock::new(vec![0u8; size]),
            block_size,
            device_id,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        })
    }

    /// 从字节数组创建
    pub fn from_bytes(data: Vec<u8>, block_size: usize, device_id: usize) -> Arc<Self> {
        Arc::new(Self {
            data: SpinLock::new(data),
            block_size,
            device_id,
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        })
    }

    /// 获取原始数据（用于调试）
    pub fn raw_data(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    /// 累计读块次数
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// 累计写块次数
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Driver for RamDisk {
    fn device_type(&self) -> DeviceType {
        DeviceType::Block
    }

    fn get_id(&self) -> String {
        alloc::format!("ramdisk_{}", self.device_id)
    }
}

// 实现 BlockDriver trait
impl BlockDriver for RamDisk {
    fn device_id(&self) -> usize {
        self.device_id
    }

    fn read_block(&self, block_id: usize, buf: &mut [u8]) -> bool {
        if buf.len() != self.block_size {
            return false;
        }

        let data = self.data.lock();
        let offset = block_id * self.block_size;

        if offset + self.block_size > data.len() {
            return false;
        }

        buf.copy_from_slice(&data[offset..offset + self.block_size]);
        self.reads.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn write_block(&self, block_id: usize, buf: &[u8]) -> bool {
        if buf.len() != self.block_size {
            return false;
        }

        let mut data = self.data.lock();
        let offset = block_id * self.block_size;

        if offset + self.block_size > data.len() {
            return false;
        }

        data[offset..offset + self.block_size].copy_from_slice(buf);
        self.writes.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn flush(&self) -> bool {
        true // 内存设备无需 flush
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn total_blocks(&self) -> usize {
        self.data.lock().len() / self.block_size
    }
}
