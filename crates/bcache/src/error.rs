//! 缓冲缓存错误类型

/// 缓存操作失败的原因。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheError {
    /// 所有缓冲区都被引用，暂时无法为新块腾出空间。
    /// 调用方可在释放部分引用后重试。
    NoFreeBuffer,
    /// 目标设备号没有注册对应的块驱动。
    UnknownDevice,
    /// 底层驱动读或写失败。
    Io,
}

/// 缓存操作的统一返回类型。
pub type CacheResult<T> = Result<T, CacheError>;
