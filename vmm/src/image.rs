// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Boot image format detection.

use std::fmt;

use arch::GuestMemoryLayout;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use vm_memory::GuestAddress;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const GZIP_MAGIC: &[u8; 2] = b"\x1f\x8b";
const UIMAGE_MAGIC: u32 = 0x2705_1956;
const FDT_MAGIC: u32 = 0xd00d_feed;

// The zImage header follows nine words of boot code.
const ZIMAGE_MAGIC: u32 = 0x016f_2818;
const ZIMAGE_MAGIC_OFFSET: usize = 0x24;
const ZIMAGE_START_OFFSET: usize = 0x28;
const ZIMAGE_END_OFFSET: usize = 0x2c;
const ZIMAGE_HEADER_SIZE: usize = 0x30;

/// Kind of blob found in the boot archive.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageType {
    /// Uncompressed kernel, loaded where the kernel expects it.
    RawBinary,
    /// Compressed, self-relocating kernel (zImage).
    CompressedSelfRelocating,
    DeviceTree,
    Elf,
    Uimage,
    GzipInitrd,
    Unknown,
}

impl fmt::Display for ImageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ImageType::RawBinary => "raw binary",
            ImageType::CompressedSelfRelocating => "zImage",
            ImageType::DeviceTree => "device tree",
            ImageType::Elf => "ELF",
            ImageType::Uimage => "uImage",
            ImageType::GzipInitrd => "gzip initrd",
            ImageType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

fn is_zimage(blob: &[u8]) -> bool {
    blob.len() >= ZIMAGE_HEADER_SIZE
        && LittleEndian::read_u32(&blob[ZIMAGE_MAGIC_OFFSET..]) == ZIMAGE_MAGIC
}

/// Detects the type of a blob from its header. Anything without a known
/// magic is taken to be a raw binary.
pub fn detect_image_type(blob: &[u8]) -> ImageType {
    if blob.is_empty() {
        return ImageType::Unknown;
    }

    let be_magic = (blob.len() >= 4).then(|| BigEndian::read_u32(blob));
    if blob.starts_with(ELF_MAGIC) {
        ImageType::Elf
    } else if is_zimage(blob) {
        ImageType::CompressedSelfRelocating
    } else if be_magic == Some(UIMAGE_MAGIC) {
        ImageType::Uimage
    } else if be_magic == Some(FDT_MAGIC) {
        ImageType::DeviceTree
    } else if blob.starts_with(GZIP_MAGIC) {
        ImageType::GzipInitrd
    } else {
        ImageType::RawBinary
    }
}

/// Relocation header of a zImage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZimageHeader {
    /// Link address, zero when the image is position independent.
    pub start: u32,
    pub end: u32,
}

impl ZimageHeader {
    pub fn parse(blob: &[u8]) -> Option<Self> {
        if !is_zimage(blob) {
            return None;
        }
        Some(ZimageHeader {
            start: LittleEndian::read_u32(&blob[ZIMAGE_START_OFFSET..]),
            end: LittleEndian::read_u32(&blob[ZIMAGE_END_OFFSET..]),
        })
    }

    /// Address the image has to be loaded at in `layout`.
    pub fn load_address(&self, layout: &GuestMemoryLayout) -> GuestAddress {
        if self.start == 0 {
            layout.kernel_addr()
        } else {
            GuestAddress(u64::from(self.start))
        }
    }
}

/// Kernel formats the loader can boot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KernelFormat {
    RawBinary,
    Zimage(ZimageHeader),
}

impl KernelFormat {
    /// Returns `None` for blobs that are not bootable kernels.
    pub fn from_blob(blob: &[u8]) -> Option<Self> {
        match detect_image_type(blob) {
            ImageType::RawBinary => Some(KernelFormat::RawBinary),
            ImageType::CompressedSelfRelocating => {
                ZimageHeader::parse(blob).map(KernelFormat::Zimage)
            }
            _ => None,
        }
    }

    pub fn entry_address(&self, layout: &GuestMemoryLayout) -> GuestAddress {
        match self {
            KernelFormat::RawBinary => layout.kernel_addr(),
            KernelFormat::Zimage(header) => header.load_address(layout),
        }
    }

    pub fn image_type(&self) -> ImageType {
        match self {
            KernelFormat::RawBinary => ImageType::RawBinary,
            KernelFormat::Zimage(_) => ImageType::CompressedSelfRelocating,
        }
    }
}
