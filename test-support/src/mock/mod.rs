//! Mock 实现模块
//!
//! 为宿主机单元测试提供架构与内存管理的 Mock。
//! 这里不依赖任何内核 crate（避免循环依赖）：
//! 各 crate 在 `cfg(test)` 下为这些类型实现自己的 trait。

pub mod arch;
pub mod mm;
