//! Block cache (spec section 4.8): a `(device, sector)`-keyed cache of
//! locked buffers with dirty writeback, sitting between the VFS and
//! whatever driver actually backs a [`device::BlockDevice`].
//!
//! Grounded on the spec's `bread`/`brelease`/`bdflushd` contract: a hash
//! table (here a `BTreeMap`, since the kernel doesn't carry a hasher crate)
//! maps `(device, sector)` to a shared buffer; an LRU list tracks which
//! buffers are currently unreferenced so one of them can be reclaimed when
//! the cache is full.

extern crate alloc;

use alloc::collections::{BTreeMap, VecDeque};
use alloc::sync::Arc;
use alloc::vec::Vec;

pub mod device;
pub mod partition;

pub use device::{BlockDevice, DeviceId};
pub use partition::{parse_mbr, PartitionDevice, PartitionEntry};

use crate::error::KernelError;
use crate::sync::Spinlock;

/// Upper bound on cached buffers before the LRU tail is reclaimed.
/// Spec doesn't pin a number; this is generous enough that ordinary
/// single-task exercising of the cache never evicts anything live.
const CACHE_CAPACITY: usize = 1024;

type BlockKey = (DeviceId, u64);

struct BlockInner {
    data: Vec<u8>,
    valid: bool,
    dirty: bool,
}

/// A cached disk block (spec's `block`). Data access always goes through
/// the inner spinlock -- `dirty => valid` is maintained by every writer.
pub struct Block {
    pub device: DeviceId,
    pub sector: u64,
    pub block_size: usize,
    inner: Spinlock<BlockInner>,
}

impl Block {
    fn new(device: DeviceId, sector: u64, block_size: usize) -> Self {
        Self {
            device,
            sector,
            block_size,
            inner: Spinlock::new(BlockInner {
                data: alloc::vec![0u8; block_size],
                valid: false,
                dirty: false,
            }),
        }
    }

    /// Read the block's cached bytes. Caller must have `bread`'d the
    /// block (so it's known `valid`).
    pub fn data(&self) -> Vec<u8> {
        self.inner.lock().data.clone()
    }

    /// Overwrite the block's cached bytes and mark it dirty for the next
    /// writeback sweep.
    pub fn write(&self, offset: usize, bytes: &[u8]) -> Result<(), KernelError> {
        let mut inner = self.inner.lock();
        let end = offset + bytes.len();
        if end > inner.data.len() {
            return Err(KernelError::InvalidArgument);
        }
        inner.data[offset..end].copy_from_slice(bytes);
        inner.dirty = true;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.inner.lock().dirty
    }
}

struct Cache {
    blocks: BTreeMap<BlockKey, Arc<Block>>,
    /// Keys currently unreferenced (i.e. every outstanding `Arc` from a
    /// prior `bread` has been `brelease`d), oldest first.
    lru: VecDeque<BlockKey>,
}

static CACHE: Spinlock<Cache> = Spinlock::new(Cache {
    blocks: BTreeMap::new(),
    lru: VecDeque::new(),
});

pub fn init() {
    println!("[BLOCK] block cache initialized (capacity {CACHE_CAPACITY} buffers)");
}

/// Acquire (creating if necessary) the buffer for `(device, sector)`,
/// reading it from the backing device if not already valid, and removing
/// it from the LRU list (the caller now holds a reference). Pair with
/// [`brelease`].
pub fn bread(dev: Arc<dyn BlockDevice>, device: DeviceId, sector: u64) -> Result<Arc<Block>, KernelError> {
    let block = {
        let mut cache = CACHE.lock();
        cache.lru.retain(|k| *k != (device, sector));

        if let Some(block) = cache.blocks.get(&(device, sector)) {
            block.clone()
        } else {
            if cache.blocks.len() >= CACHE_CAPACITY {
                reclaim_one(&mut cache)?;
            }
            let block = Arc::new(Block::new(device, sector, dev.block_size()));
            cache.blocks.insert((device, sector), block.clone());
            block
        }
    };

    let needs_read = !block.inner.lock().valid;
    if needs_read {
        let mut buf = alloc::vec![0u8; block.block_size];
        dev.read_block(sector, &mut buf)?;
        let mut inner = block.inner.lock();
        inner.data = buf;
        inner.valid = true;
    }

    Ok(block)
}

/// Release a reference obtained from [`bread`], making the buffer eligible
/// for LRU reclamation.
pub fn brelease(block: &Arc<Block>) {
    let mut cache = CACHE.lock();
    let key = (block.device, block.sector);
    if cache.blocks.contains_key(&key) {
        cache.lru.retain(|k| *k != key);
        cache.lru.push_back(key);
    }
}

/// Reclaim the least-recently-used unreferenced buffer to make room for a
/// new one. Writes it back first if dirty -- the spec requires writeback
/// on eviction, not silent data loss.
fn reclaim_one(cache: &mut Cache) -> Result<(), KernelError> {
    let Some(key) = cache.lru.pop_front() else {
        return Err(KernelError::NoMemory); // cache full of referenced blocks
    };
    if let Some(block) = cache.blocks.get(&key) {
        if block.is_dirty() {
            if let Some(dev) = device::get(block.device) {
                let data = block.data();
                let _ = dev.write_block(block.sector, &data);
                block.inner.lock().dirty = false;
            }
        }
    }
    cache.blocks.remove(&key);
    Ok(())
}

/// Walk every cached block and write back the dirty ones. Grounded on the
/// spec's `bdflushd`/`sync()`: this is the synchronous sweep both would
/// invoke. There is no periodic `bdflushd` task driving it automatically
/// yet -- that needs the kernel timer (`sync::timer`, not built) to sleep
/// between sweeps -- so today only an explicit `sync()` syscall would
/// trigger it.
pub fn sync_all() {
    let keys: Vec<BlockKey> = CACHE.lock().blocks.keys().copied().collect();
    for key in keys {
        let block = CACHE.lock().blocks.get(&key).cloned();
        let Some(block) = block else { continue };
        if !block.is_dirty() {
            continue;
        }
        let Some(dev) = device::get(block.device) else {
            continue;
        };
        let data = block.data();
        if dev.write_block(block.sector, &data).is_ok() {
            block.inner.lock().dirty = false;
        }
    }
}

/// Probe a just-registered disk device for an MBR and register its
/// partitions as their own devices, per spec section 4.8's "Partitions".
pub fn probe_partitions(disk_id: DeviceId) -> Result<Vec<DeviceId>, KernelError> {
    let disk = device::get(disk_id).ok_or(KernelError::NoSuchDevice)?;
    let mut sector0 = alloc::vec![0u8; disk.block_size()];
    disk.read_block(0, &mut sector0)?;

    let Some(entries) = parse_mbr(&sector0) else {
        return Ok(Vec::new());
    };

    let mut ids = Vec::new();
    for entry in entries {
        let name = alloc::format!("{}p{}", disk.name(), entry.number);
        let part = PartitionDevice::new(name, disk.clone(), entry);
        ids.push(device::register(alloc::boxed::Box::new(part)));
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::String;
    use device::RamBlockDevice;

    #[test_case]
    fn test_bread_caches_and_reads() {
        let raw = Arc::new(RamBlockDevice::new(String::from("t1"), 512, 8));
        let marker = [7u8; 512];
        raw.write_block(3, &marker).unwrap();
        let dev: Arc<dyn BlockDevice> = raw;
        let id = device::register(alloc::boxed::Box::new(RamBlockDevice::new(
            String::from("t1-registered"),
            512,
            8,
        )));

        let block = bread(dev, id, 3).unwrap();
        assert_eq!(block.data(), alloc::vec![7u8; 512]);
        brelease(&block);
    }

    #[test_case]
    fn test_write_marks_dirty() {
        let dev: Arc<dyn BlockDevice> = Arc::new(RamBlockDevice::new(String::from("t2"), 512, 8));
        let id = device::register(alloc::boxed::Box::new(RamBlockDevice::new(
            String::from("t2-registered"),
            512,
            8,
        )));
        let block = bread(dev, id, 0).unwrap();
        assert!(!block.is_dirty());
        block.write(0, &[1, 2, 3]).unwrap();
        assert!(block.is_dirty());
        brelease(&block);
    }
}
