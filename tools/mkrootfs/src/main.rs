//! Builds the disk image QEMU boots against: an MBR partition table in
//! sector 0 (spec section 6, "MBR layout") followed by a single Linux
//! partition (type 0x83) holding a ustar tar archive of a host
//! directory tree. The kernel's `fs::tar` loader unpacks that archive
//! into the ramfs root at boot.
//!
//! Usage: `mkrootfs <source-dir> <output-image>`

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};

const SECTOR_SIZE: usize = 512;
/// Leave room for the bootloader/stage-1 code before the partition starts,
/// matching the conventional 1 MiB alignment used by modern partitioners.
const PARTITION_START_SECTOR: u32 = 2048;
const PARTITION_TYPE_LINUX: u8 = 0x83;

fn octal_field(value: u64, width: usize) -> Vec<u8> {
    let s = format!("{:0width$o}\0", value, width = width - 1);
    let mut buf = s.into_bytes();
    buf.truncate(width);
    buf
}

fn write_header(name: &str, size: u64, typeflag: u8, mode: u32) -> [u8; SECTOR_SIZE] {
    let mut header = [0u8; SECTOR_SIZE];

    let name_bytes = name.as_bytes();
    let len = name_bytes.len().min(100);
    header[0..len].copy_from_slice(&name_bytes[..len]);

    header[100..108].copy_from_slice(&octal_field(mode as u64, 8));
    header[124..136].copy_from_slice(&octal_field(size, 12));
    header[156] = typeflag;
    header[257..263].copy_from_slice(b"ustar\0");
    header[263..265].copy_from_slice(b"00");

    header[148..156].copy_from_slice(b"        ");
    let cksum: u32 = header.iter().map(|&b| b as u32).sum();
    let cksum_field = format!("{:06o}\0 ", cksum);
    header[148..156].copy_from_slice(cksum_field.as_bytes());

    header
}

fn pad_to_block(buf: &mut Vec<u8>) {
    let rem = buf.len() % SECTOR_SIZE;
    if rem != 0 {
        buf.extend(std::iter::repeat(0u8).take(SECTOR_SIZE - rem));
    }
}

/// Recursively walk `dir`, appending ustar directory and file entries with
/// paths relative to `root`.
fn append_tree(root: &Path, dir: &Path, archive: &mut Vec<u8>) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let rel = path
            .strip_prefix(root)
            .expect("walked path is under root")
            .to_string_lossy()
            .replace('\\', "/");
        let meta = entry.metadata()?;

        if meta.is_dir() {
            let mut name = rel.clone();
            name.push('/');
            archive.extend_from_slice(&write_header(&name, 0, b'5', 0o755));
            append_tree(root, &path, archive)?;
        } else if meta.is_file() {
            let data = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            archive.extend_from_slice(&write_header(&rel, data.len() as u64, b'0', 0o644));
            archive.extend_from_slice(&data);
            pad_to_block(archive);
        }
        // Symlinks and other special files are not expected in the initrd
        // source tree; skip silently.
    }
    Ok(())
}

fn build_tar_archive(source_dir: &Path) -> Result<Vec<u8>> {
    let mut archive = Vec::new();
    append_tree(source_dir, source_dir, &mut archive)?;
    archive.extend(std::iter::repeat(0u8).take(2 * SECTOR_SIZE));
    Ok(archive)
}

/// Encode a CHS placeholder value. Modern BIOSes and QEMU ignore CHS and
/// use LBA, so we emit the standard 0xfe/0xff/0xff sentinel used when the
/// true geometry exceeds the CHS-addressable range.
const CHS_PLACEHOLDER: [u8; 3] = [0xfe, 0xff, 0xff];

fn build_mbr(partition_sectors: u32) -> [u8; SECTOR_SIZE] {
    let mut mbr = [0u8; SECTOR_SIZE];

    let entry_off = 446;
    mbr[entry_off] = 0x80; // bootable
    mbr[entry_off + 1..entry_off + 4].copy_from_slice(&CHS_PLACEHOLDER);
    mbr[entry_off + 4] = PARTITION_TYPE_LINUX;
    mbr[entry_off + 5..entry_off + 8].copy_from_slice(&CHS_PLACEHOLDER);
    mbr[entry_off + 8..entry_off + 12].copy_from_slice(&PARTITION_START_SECTOR.to_le_bytes());
    mbr[entry_off + 12..entry_off + 16].copy_from_slice(&partition_sectors.to_le_bytes());

    mbr[510] = 0x55;
    mbr[511] = 0xaa;
    mbr
}

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() != 3 {
        bail!("usage: mkrootfs <source-dir> <output-image>");
    }
    let source_dir = PathBuf::from(&args[1]);
    let output_path = PathBuf::from(&args[2]);

    if !source_dir.is_dir() {
        bail!("{} is not a directory", source_dir.display());
    }

    let tar = build_tar_archive(&source_dir)?;
    let partition_sectors = (tar.len() / SECTOR_SIZE) as u32;

    let mbr = build_mbr(partition_sectors);

    let mut image = fs::File::create(&output_path)
        .with_context(|| format!("creating image {}", output_path.display()))?;
    image.write_all(&mbr)?;
    let gap = (PARTITION_START_SECTOR as usize - 1) * SECTOR_SIZE;
    image.write_all(&vec![0u8; gap])?;
    image.write_all(&tar)?;

    eprintln!(
        "mkrootfs: wrote {} ({} partition sectors starting at LBA {})",
        output_path.display(),
        partition_sectors,
        PARTITION_START_SECTOR
    );
    Ok(())
}
