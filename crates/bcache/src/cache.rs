//! 分片块缓存的核心实现
//!
//! 缓冲区元数据（标识与引用计数）按块号哈希到若干分片，
//! 每个分片由一把自旋锁保护；缓冲区数据页各自由一把睡眠锁保护。
//! 常见路径只竞争单个分片的锁，只有跨分片迁移空闲缓冲区时
//! 才短暂持有全局协调锁。
//!
//! 锁的层次（获取顺序）固定为: 全局锁 -> 捐赠分片锁 -> 本分片锁。
//! 快速路径只取本分片锁，不参与该层次。睡眠锁总是在所有自旋锁
//! 释放之后才获取，持有睡眠锁期间可以执行设备 I/O。

use alloc::{collections::VecDeque, sync::Arc, vec::Vec};
use core::mem::ManuallyDrop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use device::{BlockDriver, block_driver};
use lazy_static::lazy_static;
use sync::{RawSpinLock, SleepLock, SleepLockGuard, SpinLock};

use crate::config::{BLOCK_SIZE, BUF_COUNT, SHARD_COUNT};
use crate::error::{CacheError, CacheResult};

/// 未绑定任何磁盘块的缓冲区使用的占位设备号
const NO_DEV: usize = usize::MAX;

/// 分片内的一条缓冲区元数据
///
/// 标识 (dev, blockno) 与引用计数都受所在分片的自旋锁保护。
/// 引用计数大于零期间标识不会改变。
struct BufEntry {
    /// 对应数据页在 `BlockCache::slots` 中的下标
    slot: usize,
    dev: usize,
    blockno: usize,
    refcnt: u32,
}

/// 一个分片：按使用新旧排序的元数据队列
///
/// 队首是最近使用端，队尾是最久未用端。回收从队尾方向扫描。
struct Shard {
    entries: VecDeque<BufEntry>,
}

/// 一个缓冲区的数据页与有效位
///
/// `valid` 为 false 表示数据页内容与当前标识不符，
/// 首个取得睡眠锁的持有者负责从磁盘读入。
/// 清除发生在分片锁内（换标识时），置位发生在睡眠锁内（读入后），
/// 因此同一标识至多触发一次磁盘读取。
struct BufSlot {
    valid: AtomicBool,
    data: SleepLock<[u8; BLOCK_SIZE]>,
}

/// 分片块缓存
///
/// 容量固定为 [`BUF_COUNT`] 个缓冲区，缓冲区可以在分片之间迁移：
/// 本分片没有空闲缓冲区时，从其它分片挪一个过来。
pub struct BlockCache {
    /// 跨分片迁移的协调锁，保证同时至多一个迁移在进行
    global: RawSpinLock,
    shards: Vec<SpinLock<Shard>>,
    slots: Vec<BufSlot>,
}

impl BlockCache {
    /// 创建一个空缓存，缓冲区轮转分配到各分片
    pub fn new() -> Self {
        let slots = (0..BUF_COUNT)
            .map(|_| BufSlot {
                valid: AtomicBool::new(false),
                data: SleepLock::new([0; BLOCK_SIZE]),
            })
            .collect();
        let mut shards: Vec<Shard> = (0..SHARD_COUNT)
            .map(|_| Shard {
                entries: VecDeque::new(),
            })
            .collect();
        for slot in 0..BUF_COUNT {
            shards[slot % SHARD_COUNT].entries.push_back(BufEntry {
                slot,
                dev: NO_DEV,
                blockno: 0,
                refcnt: 0,
            });
        }
        BlockCache {
            global: RawSpinLock::new(),
            shards: shards.into_iter().map(SpinLock::new).collect(),
            slots,
        }
    }

    /// 取得 (dev, blockno) 对应缓冲区的独占引用
    ///
    /// 命中时直接增加引用计数；未命中时先在本分片回收，
    /// 再尝试从其它分片迁移。取得引用后若数据页失效则从磁盘读入。
    ///
    /// 同一执行流重复 acquire 同一个块会在睡眠锁上自我等待，
    /// 调用方必须先释放上一个引用。
    ///
    /// # Errors
    ///
    /// - [`CacheError::UnknownDevice`]: dev 没有注册块驱动;
    /// - [`CacheError::NoFreeBuffer`]: 所有缓冲区都被引用;
    /// - [`CacheError::Io`]: 磁盘读取失败。
    pub fn acquire(&self, dev: usize, blockno: usize) -> CacheResult<BufRef<'_>> {
        debug_assert_ne!(dev, NO_DEV);
        let driver = block_driver(dev).ok_or(CacheError::UnknownDevice)?;
        let shard_idx = blockno % SHARD_COUNT;

        // 快速路径: 命中或在本分片回收
        let fast = {
            let mut shard = self.shards[shard_idx].lock();
            self.lookup_or_recycle(&mut shard, dev, blockno)
        };
        if let Some(slot) = fast {
            return self.finish(slot, shard_idx, dev, blockno, driver);
        }

        // 慢速路径: 从其它分片迁移一个空闲缓冲区
        let slot = self.migrate(shard_idx, dev, blockno)?;
        self.finish(slot, shard_idx, dev, blockno, driver)
    }

    /// 在分片内查找标识，或从最久未用端回收一个空闲缓冲区
    ///
    /// 回收会换上新标识并清除有效位，调用方持有分片锁。
    fn lookup_or_recycle(&self, shard: &mut Shard, dev: usize, blockno: usize) -> Option<usize> {
        if let Some(e) = shard
            .entries
            .iter_mut()
            .find(|e| e.dev == dev && e.blockno == blockno)
        {
            e.refcnt += 1;
            return Some(e.slot);
        }
        if let Some(pos) = Self::lru_free_pos(shard) {
            let e = &mut shard.entries[pos];
            e.dev = dev;
            e.blockno = blockno;
            e.refcnt = 1;
            let slot = e.slot;
            // 新标识的内容还在磁盘上
            self.slots[slot].valid.store(false, Ordering::Release);
            return Some(slot);
        }
        None
    }

    /// 从最久未用端起第一个无人引用的缓冲区位置
    fn lru_free_pos(shard: &Shard) -> Option<usize> {
        shard.entries.iter().rposition(|e| e.refcnt == 0)
    }

    /// 全局锁下跨分片迁移一个空闲缓冲区到本分片
    ///
    /// 探测按分片编号升序进行，找到捐赠方后保持其锁不放，
    /// 避免候选缓冲区在迁移完成前被别人拿走。
    fn migrate(&self, shard_idx: usize, dev: usize, blockno: usize) -> CacheResult<usize> {
        let _global = self.global.lock();

        let mut donor = None;
        for i in 0..SHARD_COUNT {
            if i == shard_idx {
                continue;
            }
            let guard = self.shards[i].lock();
            if let Some(pos) = Self::lru_free_pos(&guard) {
                donor = Some((guard, pos));
                break;
            }
        }

        let mut shard = self.shards[shard_idx].lock();
        // 等待全局锁期间别人可能已把这个块缓存好，重查一次
        if let Some(slot) = self.lookup_or_recycle(&mut shard, dev, blockno) {
            return Ok(slot);
        }

        let (mut donor_shard, pos) = donor.ok_or(CacheError::NoFreeBuffer)?;
        let mut entry = donor_shard
            .entries
            .remove(pos)
            .expect("donor entry vanished while its shard lock was held");
        entry.dev = dev;
        entry.blockno = blockno;
        entry.refcnt = 1;
        let slot = entry.slot;
        self.slots[slot].valid.store(false, Ordering::Release);
        shard.entries.push_front(entry);
        Ok(slot)
    }

    /// 取得数据页的睡眠锁，必要时从磁盘读入，构造引用
    ///
    /// 进入时调用方已不持有任何自旋锁。
    fn finish(
        &self,
        slot: usize,
        shard: usize,
        dev: usize,
        blockno: usize,
        driver: Arc<dyn BlockDriver>,
    ) -> CacheResult<BufRef<'_>> {
        let mut guard = self.slots[slot].data.lock();
        if !self.slots[slot].valid.load(Ordering::Acquire) {
            if !driver.read_block(blockno, guard.as_mut_slice()) {
                drop(guard);
                self.release_ref(shard, slot);
                log::warn!("bcache: read failed, dev {} block {}", dev, blockno);
                return Err(CacheError::Io);
            }
            self.slots[slot].valid.store(true, Ordering::Release);
        }
        Ok(BufRef {
            cache: self,
            slot,
            shard,
            dev,
            blockno,
            driver,
            guard: ManuallyDrop::new(guard),
        })
    }

    /// 归还一次引用，降到零时移到分片的最近使用端
    fn release_ref(&self, shard_idx: usize, slot: usize) {
        let mut shard = self.shards[shard_idx].lock();
        let pos = shard
            .entries
            .iter()
            .position(|e| e.slot == slot)
            .expect("buffer entry missing from its shard");
        let e = &mut shard.entries[pos];
        debug_assert!(e.refcnt > 0);
        e.refcnt -= 1;
        if e.refcnt == 0 {
            if let Some(entry) = shard.entries.remove(pos) {
                shard.entries.push_front(entry);
            }
        }
    }

    /// 归还一次常驻引用，与 [`BufRef::pin`] 配对
    ///
    /// # Panics
    ///
    /// 目标块不在缓存中或引用计数已为零时 panic，
    /// 这说明调用方的 pin/unpin 没有配对。
    pub fn unpin(&self, dev: usize, blockno: usize) {
        let mut shard = self.shards[blockno % SHARD_COUNT].lock();
        let e = shard
            .entries
            .iter_mut()
            .find(|e| e.dev == dev && e.blockno == blockno)
            .unwrap_or_else(|| panic!("bcache: unpin of uncached block {blockno} on dev {dev}"));
        assert!(
            e.refcnt > 0,
            "bcache: unpin of unreferenced block {blockno} on dev {dev}"
        );
        e.refcnt -= 1;
    }
}

impl Default for BlockCache {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl BlockCache {
    /// 查询某个块当前的引用计数，不在缓存中返回 None
    pub(crate) fn ref_count_of(&self, dev: usize, blockno: usize) -> Option<u32> {
        let shard = self.shards[blockno % SHARD_COUNT].lock();
        shard
            .entries
            .iter()
            .find(|e| e.dev == dev && e.blockno == blockno)
            .map(|e| e.refcnt)
    }

    /// 某个分片当前持有的缓冲区数量
    pub(crate) fn shard_len(&self, idx: usize) -> usize {
        self.shards[idx].lock().entries.len()
    }

    /// 全量一致性检查：缓冲区总数不变、无重复、归属分片正确
    pub(crate) fn assert_integrity(&self, expect_idle: bool) {
        use alloc::collections::BTreeSet;

        let mut slots_seen = BTreeSet::new();
        let mut idents = BTreeSet::new();
        let mut total = 0;
        for (idx, s) in self.shards.iter().enumerate() {
            let shard = s.lock();
            for e in shard.entries.iter() {
                total += 1;
                assert!(slots_seen.insert(e.slot), "slot listed twice");
                if e.dev != NO_DEV {
                    assert_eq!(e.blockno % SHARD_COUNT, idx, "entry in wrong shard");
                    assert!(idents.insert((e.dev, e.blockno)), "duplicate identity");
                }
                if expect_idle {
                    assert_eq!(e.refcnt, 0, "buffer still referenced");
                }
            }
        }
        assert_eq!(total, BUF_COUNT);
    }
}

// ==================== 缓冲区引用 ====================

/// 对一个缓冲区的独占引用
///
/// 持有期间数据页的睡眠锁被占用，其它执行流对同一个块的
/// acquire 会等待。通过 `Deref`/`DerefMut` 访问数据页内容。
/// 离开作用域时先释放睡眠锁，再归还引用计数。
pub struct BufRef<'a> {
    cache: &'a BlockCache,
    slot: usize,
    shard: usize,
    dev: usize,
    blockno: usize,
    driver: Arc<dyn BlockDriver>,
    guard: ManuallyDrop<SleepLockGuard<'a, [u8; BLOCK_SIZE]>>,
}

impl core::fmt::Debug for BufRef<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BufRef")
            .field("dev", &self.dev)
            .field("blockno", &self.blockno)
            .finish_non_exhaustive()
    }
}

impl BufRef<'_> {
    /// 缓冲区对应的设备号
    pub fn dev(&self) -> usize {
        self.dev
    }

    /// 缓冲区对应的块号
    pub fn blockno(&self) -> usize {
        self.blockno
    }

    /// 把数据页写回磁盘
    ///
    /// 缓存本身不做回写，修改后的内容只有调用此方法才会落盘。
    ///
    /// # Errors
    ///
    /// 驱动写入失败时返回 [`CacheError::Io`]，缓存内容不受影响。
    pub fn commit(&mut self) -> CacheResult<()> {
        if self.driver.write_block(self.blockno, self.as_slice()) {
            Ok(())
        } else {
            log::warn!(
                "bcache: write failed, dev {} block {}",
                self.dev,
                self.blockno
            );
            Err(CacheError::Io)
        }
    }

    /// 追加一次常驻引用，让缓冲区在本引用释放后仍不可回收
    ///
    /// 必须用 [`BlockCache::unpin`] 成对解除。
    pub fn pin(&self) {
        let mut shard = self.cache.shards[self.shard].lock();
        let e = shard
            .entries
            .iter_mut()
            .find(|e| e.slot == self.slot)
            .expect("pinned buffer missing from its shard");
        e.refcnt += 1;
    }
}

impl Deref for BufRef<'_> {
    type Target = [u8; BLOCK_SIZE];

    fn deref(&self) -> &Self::Target {
        &self.guard
    }
}

impl DerefMut for BufRef<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.guard
    }
}

impl Drop for BufRef<'_> {
    fn drop(&mut self) {
        // 先放开数据页的睡眠锁，再归还引用计数。
        // 顺序不能反: 引用计数归零意味着睡眠锁必然空闲。
        // SAFETY: guard 此后不再被访问
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        self.cache.release_ref(self.shard, self.slot);
    }
}

// ==================== 全局实例 ====================

lazy_static! {
    /// 全局块缓存实例
    pub static ref BLOCK_CACHE: BlockCache = BlockCache::new();
}

/// 取得全局缓存中 (dev, blockno) 对应缓冲区的独占引用
pub fn acquire(dev: usize, blockno: usize) -> CacheResult<BufRef<'static>> {
    BLOCK_CACHE.acquire(dev, blockno)
}

/// 解除全局缓存中某个块的一次常驻引用
pub fn unpin(dev: usize, blockno: usize) {
    BLOCK_CACHE.unpin(dev, blockno)
}
