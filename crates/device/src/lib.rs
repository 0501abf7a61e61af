//! 内核存储设备驱动框架
//!
//! 此 crate 提供块设备驱动的抽象接口和参考实现，包括：
//!
//! - [`Driver`] trait - 设备驱动基础接口
//! - [`BlockDriver`] trait - 块设备驱动接口（扇区读写、刷新）
//! - [`RamDisk`] - 内存模拟块设备，用于测试和开发
//!
//! 块缓存（bcache crate）在缓存未命中和显式提交时，
//! 通过 [`BlockDriver`] 执行阻塞式扇区 I/O。

#![no_std]

extern crate alloc;

pub mod block;
pub mod driver;

// Re-export driver
pub use driver::{DeviceType, Driver};

// Re-export block
pub use block::{BlockDriver, RamDisk, block_driver, register_block_driver};
