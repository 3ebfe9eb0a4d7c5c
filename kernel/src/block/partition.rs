//! MBR partition parsing (spec section 4.9): on open of a disk device,
//! sector 0 is read; a valid `0x55AA`-signed MBR yields up to four
//! partition devices that translate sector numbers by adding the
//! partition's LBA-start offset.
//!
//! Grounded on the teacher pack's `block::partition` MBR layout (adapted:
//! GPT is out of spec's scope here, so only the legacy table is parsed).

extern crate alloc;

use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;

use super::device::BlockDevice;
use crate::error::KernelError;

const MBR_SIGNATURE_OFFSET: usize = 510;
const MBR_SIGNATURE: u16 = 0xAA55;
const PARTITION_TABLE_OFFSET: usize = 0x1BE;
const PARTITION_ENTRY_SIZE: usize = 16;
const PARTITION_COUNT: usize = 4;

/// One parsed MBR partition table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionEntry {
    /// 1-based slot in the MBR's table (1..=4).
    pub number: u8,
    pub bootable: bool,
    pub system_id: u8,
    pub lba_start: u32,
    pub lba_length: u32,
}

/// Parse sector 0 of `sector0` (exactly one sector's worth of bytes) as an
/// MBR. Returns the (up to four) non-empty partition entries, or `None` if
/// the `0x55AA` signature is absent.
pub fn parse_mbr(sector0: &[u8]) -> Option<Vec<PartitionEntry>> {
    if sector0.len() <= MBR_SIGNATURE_OFFSET + 1 {
        return None;
    }
    let signature = u16::from_le_bytes([
        sector0[MBR_SIGNATURE_OFFSET],
        sector0[MBR_SIGNATURE_OFFSET + 1],
    ]);
    if signature != MBR_SIGNATURE {
        return None;
    }

    let mut entries = Vec::new();
    for i in 0..PARTITION_COUNT {
        let off = PARTITION_TABLE_OFFSET + i * PARTITION_ENTRY_SIZE;
        let raw = &sector0[off..off + PARTITION_ENTRY_SIZE];

        let system_id = raw[4];
        let lba_start = u32::from_le_bytes(raw[8..12].try_into().unwrap());
        let lba_length = u32::from_le_bytes(raw[12..16].try_into().unwrap());

        if system_id == 0 || lba_length == 0 {
            continue; // empty slot
        }

        entries.push(PartitionEntry {
            number: (i + 1) as u8,
            bootable: raw[0] == 0x80,
            system_id,
            lba_start,
            lba_length,
        });
    }

    Some(entries)
}

/// A block device view of one partition: reads/writes are sector numbers
/// relative to the partition, translated by adding `entry.lba_start`
/// before reaching the backing whole-disk device.
pub struct PartitionDevice {
    name: String,
    backing: Arc<dyn BlockDevice>,
    entry: PartitionEntry,
}

impl PartitionDevice {
    pub fn new(name: String, backing: Arc<dyn BlockDevice>, entry: PartitionEntry) -> Self {
        Self {
            name,
            backing,
            entry,
        }
    }

    fn translate(&self, block: u64) -> Result<u64, KernelError> {
        if block >= self.entry.lba_length as u64 {
            return Err(KernelError::InvalidArgument);
        }
        Ok(block + self.entry.lba_start as u64)
    }
}

impl BlockDevice for PartitionDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn block_size(&self) -> usize {
        self.backing.block_size()
    }

    fn block_count(&self) -> u64 {
        self.entry.lba_length as u64
    }

    fn read_block(&self, block: u64, buf: &mut [u8]) -> Result<(), KernelError> {
        self.backing.read_block(self.translate(block)?, buf)
    }

    fn write_block(&self, block: u64, buf: &[u8]) -> Result<(), KernelError> {
        self.backing.write_block(self.translate(block)?, buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::device::RamBlockDevice;

    fn mbr_with_one_partition(lba_start: u32, lba_length: u32) -> [u8; 512] {
        let mut sector = [0u8; 512];
        let off = PARTITION_TABLE_OFFSET;
        sector[off] = 0x80; // bootable
        sector[off + 4] = 0x83; // Linux
        sector[off + 8..off + 12].copy_from_slice(&lba_start.to_le_bytes());
        sector[off + 12..off + 16].copy_from_slice(&lba_length.to_le_bytes());
        sector[MBR_SIGNATURE_OFFSET..MBR_SIGNATURE_OFFSET + 2]
            .copy_from_slice(&MBR_SIGNATURE.to_le_bytes());
        sector
    }

    #[test_case]
    fn test_parse_mbr_no_signature() {
        let sector = [0u8; 512];
        assert!(parse_mbr(&sector).is_none());
    }

    #[test_case]
    fn test_parse_mbr_one_partition() {
        let sector = mbr_with_one_partition(2048, 102400);
        let entries = parse_mbr(&sector).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].lba_start, 2048);
        assert_eq!(entries[0].lba_length, 102400);
        assert_eq!(entries[0].number, 1);
        assert!(entries[0].bootable);
    }

    #[test_case]
    fn test_partition_device_sector_translation() {
        let disk = Arc::new(RamBlockDevice::new(
            alloc::string::String::from("disk0"),
            512,
            4096,
        ));
        let marker = [0x5Au8; 512];
        disk.write_block(2048, &marker).unwrap();

        let entry = PartitionEntry {
            number: 1,
            bootable: true,
            system_id: 0x83,
            lba_start: 2048,
            lba_length: 2048,
        };
        let part = PartitionDevice::new(alloc::string::String::from("disk0p1"), disk, entry);

        let mut buf = [0u8; 512];
        part.read_block(0, &mut buf).unwrap();
        assert_eq!(buf, marker);
    }

    #[test_case]
    fn test_partition_device_out_of_range() {
        let disk: Arc<dyn BlockDevice> = Arc::new(RamBlockDevice::new(
            alloc::string::String::from("disk0"),
            512,
            4096,
        ));
        let entry = PartitionEntry {
            number: 1,
            bootable: false,
            system_id: 0x83,
            lba_start: 0,
            lba_length: 10,
        };
        let part = PartitionDevice::new(alloc::string::String::from("disk0p1"), disk, entry);
        let mut buf = [0u8; 512];
        assert!(part.read_block(10, &mut buf).is_err());
    }
}
