//! Multiboot2 header, boot trampoline, and boot-info tag walk.

use core::arch::global_asm;
use core::mem;

// Multiboot2 header
global_asm!(
    r#"
.section .multiboot_header, "aw"
.align 8

multiboot_header_start:
    .long 0xe85250d6                // magic number
    .long 0                         // architecture (0 = i386)
    .long multiboot_header_end - multiboot_header_start  // header length

    // checksum
    .long -(0xe85250d6 + 0 + (multiboot_header_end - multiboot_header_start))

    // End tag
    .word 0                         // type
    .word 0                         // flags
    .long 8                         // size
multiboot_header_end:
"#
);

const MULTIBOOT2_MAGIC: u32 = 0x36d76289;

#[no_mangle]
pub extern "C" fn multiboot_main(magic: u32, info_addr: u32) -> ! {
    if magic != MULTIBOOT2_MAGIC {
        panic!("Invalid multiboot magic: 0x{:x}", magic);
    }

    crate::kernel_main(info_addr as usize)
}

/// A single Multiboot2 boot-info tag: `tag_type` plus the bytes following
/// its 8-byte header (so callers never see the header fields themselves).
pub struct Tag {
    pub tag_type: u32,
    pub data: &'static [u8],
}

/// Common Multiboot2 tag types this kernel reads.
pub const TAG_CMDLINE: u32 = 1;
pub const TAG_MEMORY_MAP: u32 = 6;
pub const TAG_END: u32 = 0;

/// Walk the tag list starting right after the info header (`total_size`,
/// `reserved`, both `u32`) at `info_addr`.
///
/// # Safety
/// `info_addr` must be the physical address the bootloader passed to
/// `multiboot_main`, identity-mapped and still intact (i.e. called before
/// anything overwrites the boot info).
pub unsafe fn tags(info_addr: usize) -> impl Iterator<Item = Tag> {
    let total_size = unsafe { *(info_addr as *const u32) } as usize;
    TagIter {
        ptr: info_addr + 8,
        end: info_addr + total_size,
    }
}

/// Convenience: find the first tag of type `tag_type`.
///
/// # Safety
/// Same contract as [`tags`].
pub unsafe fn find_tag(info_addr: usize, tag_type: u32) -> Option<Tag> {
    unsafe { tags(info_addr) }.find(|t| t.tag_type == tag_type)
}

struct TagIter {
    ptr: usize,
    end: usize,
}

impl Iterator for TagIter {
    type Item = Tag;

    fn next(&mut self) -> Option<Tag> {
        if self.ptr + 8 > self.end {
            return None;
        }
        // SAFETY: bounds-checked above against the info block's declared
        // `total_size`; each tag's own `size` field is likewise checked.
        let (tag_type, size) = unsafe {
            (
                *(self.ptr as *const u32),
                *((self.ptr + 4) as *const u32) as usize,
            )
        };
        if tag_type == TAG_END || size < 8 || self.ptr + size > self.end {
            return None;
        }

        let data_ptr = (self.ptr + 8) as *const u8;
        let data_len = size - 8;
        // SAFETY: `data_ptr..data_ptr+data_len` lies within the checked
        // `[ptr, ptr+size)` tag range, itself within the checked info block.
        let data = unsafe { core::slice::from_raw_parts(data_ptr, data_len) };

        // Tags are 8-byte aligned; advance past any padding.
        let aligned = (size + 7) & !7;
        self.ptr += aligned;

        Some(Tag { tag_type, data })
    }
}

/// Memory map entry as laid out by the Multiboot2 `TAG_MEMORY_MAP` tag.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct MemMapEntry {
    pub base_addr: u64,
    pub length: u64,
    pub entry_type: u32,
    pub reserved: u32,
}

/// Multiboot2 memory region type: available RAM.
pub const MEMORY_AVAILABLE: u32 = 1;

/// Parse a `TAG_MEMORY_MAP` tag's data into its fixed-size entries.
pub fn memory_map_entries(data: &[u8]) -> impl Iterator<Item = MemMapEntry> + '_ {
    let entry_size = u32::from_ne_bytes(data[0..4].try_into().unwrap_or_default()) as usize;
    let entries_data = &data[8..];
    let stride = entry_size.max(mem::size_of::<MemMapEntry>());
    entries_data
        .chunks_exact(stride)
        .filter_map(|chunk| chunk.get(..mem::size_of::<MemMapEntry>()))
        .map(|chunk| {
            let mut raw = [0u8; mem::size_of::<MemMapEntry>()];
            raw.copy_from_slice(chunk);
            // SAFETY: `MemMapEntry` is `repr(C)` and every bit pattern of
            // its fields is valid.
            unsafe { mem::transmute::<[u8; mem::size_of::<MemMapEntry>()], MemMapEntry>(raw) }
        })
}
