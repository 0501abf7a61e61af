//! 缓冲缓存的编译期参数

/// 单个缓冲区的字节数，注册到缓存的块驱动必须使用同样的块大小。
pub const BLOCK_SIZE: usize = 1024;

/// 缓冲池容量，所有分片共享这一池子。
pub const BUF_COUNT: usize = 30;

/// 分片数量，取素数使块号取模后分布均匀。
pub const SHARD_COUNT: usize = 13;
