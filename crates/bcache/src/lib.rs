//! 块缓冲缓存
//!
//! 在块设备之上维护一层固定容量的缓冲池，按块号分片以降低锁竞争。
//! 每个缓冲区由自旋锁保护的分片元数据与睡眠锁保护的数据页组成，
//! 持有 [`BufRef`] 即持有对应数据页的独占访问权。
//!
//! 使用方式:
//! 1. 通过 [`device::register_block_driver`] 注册块设备驱动;
//! 2. 调用 [`acquire`] 取得某个磁盘块的缓冲区引用;
//! 3. 读写缓冲区内容，必要时调用 [`BufRef::commit`] 写回;
//! 4. 引用离开作用域时自动归还缓冲区。

#![no_std]

extern crate alloc;

mod cache;
mod config;
mod error;

pub use cache::{BLOCK_CACHE, BlockCache, BufRef, acquire, unpin};
pub use config::{BLOCK_SIZE, BUF_COUNT, SHARD_COUNT};
pub use error::{CacheError, CacheResult};
