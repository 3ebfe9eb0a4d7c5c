//! Block device abstraction (spec section 4.9), grounded on
//! `fs::blockdev`'s `BlockDevice`/`RamBlockDevice` but keyed by a
//! registry so `block::mod`'s cache can address any device by id rather
//! than holding a direct reference to one.

extern crate alloc;

use alloc::boxed::Box;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use crate::error::KernelError;
use crate::sync::Spinlock;

/// Identifies a registered block device, independent of its backing
/// implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(pub u32);

/// A block-addressable storage device.
pub trait BlockDevice: Send + Sync {
    fn name(&self) -> &str;
    fn block_size(&self) -> usize;
    fn block_count(&self) -> u64;
    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<(), KernelError>;
    fn write_block(&self, block: u64, buf: &[u8]) -> Result<(), KernelError>;
}

/// RAM-backed block device, used for the initramfs and in tests.
pub struct RamBlockDevice {
    name: String,
    block_size: usize,
    data: Spinlock<Vec<u8>>,
}

impl RamBlockDevice {
    pub fn new(name: String, block_size: usize, block_count: u64) -> Self {
        Self {
            name,
            block_size,
            data: Spinlock::new(alloc::vec![0u8; block_size * block_count as usize]),
        }
    }
}

impl BlockDevice for RamBlockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> u64 {
        (self.data.lock().len() / self.block_size) as u64
    }

    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<(), KernelError> {
        let start = block as usize * self.block_size;
        let data = self.data.lock();
        let end = start + buf.len();
        if end > data.len() {
            return Err(KernelError::InvalidArgument);
        }
        buf.copy_from_slice(&data[start..end]);
        Ok(())
    }

    fn write_block(&self, block: u64, buf: &[u8]) -> Result<(), KernelError> {
        let start = block as usize * self.block_size;
        let mut data = self.data.lock();
        let end = start + buf.len();
        if end > data.len() {
            return Err(KernelError::InvalidArgument);
        }
        data[start..end].copy_from_slice(buf);
        Ok(())
    }
}

struct Registry {
    devices: Vec<(DeviceId, Arc<dyn BlockDevice>)>,
    next_id: u32,
}

static REGISTRY: Spinlock<Registry> = Spinlock::new(Registry {
    devices: Vec::new(),
    next_id: 0,
});

/// Register a block device and return the id the rest of the kernel
/// should address it by (e.g. in a partition table entry or `mount`).
pub fn register(device: Box<dyn BlockDevice>) -> DeviceId {
    let mut reg = REGISTRY.lock();
    let id = DeviceId(reg.next_id);
    reg.next_id += 1;
    reg.devices.push((id, Arc::from(device)));
    id
}

/// Look up a previously registered device.
pub fn get(id: DeviceId) -> Option<Arc<dyn BlockDevice>> {
    REGISTRY
        .lock()
        .devices
        .iter()
        .find(|(did, _)| *did == id)
        .map(|(_, dev)| dev.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_case]
    fn test_ram_block_device_roundtrip() {
        let dev = RamBlockDevice::new(String::from("test"), 512, 4);
        let write_data = [0x42u8; 512];
        dev.write_block(1, &write_data).unwrap();

        let mut read_data = [0u8; 512];
        dev.read_block(1, &mut read_data).unwrap();
        assert_eq!(read_data, write_data);
    }

    #[test_case]
    fn test_ram_block_device_out_of_range() {
        let dev = RamBlockDevice::new(String::from("test"), 512, 1);
        let buf = [0u8; 512];
        assert!(dev.write_block(5, &buf).is_err());
    }

    #[test_case]
    fn test_registry_roundtrip() {
        let dev = RamBlockDevice::new(String::from("reg-test"), 512, 1);
        let id = register(Box::new(dev));
        assert!(get(id).is_some());
        assert_eq!(get(id).unwrap().name(), "reg-test");
    }
}
