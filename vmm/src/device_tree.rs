// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Device tree blob installation.

use arch::layout::FDT_MAX_SIZE;
use arch::MemoryRange;
use byteorder::{BigEndian, ByteOrder};
use log::info;
use thiserror::Error;
use vm_memory::{GuestAddress, GuestUsize};

use crate::archive::BootArchive;
use crate::image::{detect_image_type, ImageType};
use crate::machine::{GuestMachine, MachineError};

// Offset of the big-endian totalsize field in the FDT header.
const FDT_TOTALSIZE_OFFSET: usize = 4;

/// Errors associated with installing the device tree
#[derive(Debug, Error)]
pub enum Error {
    #[error("Device tree '{0}' not found in the boot archive")]
    DtbNotFound(String),

    #[error("'{name}' is not a device tree (detected {detected})")]
    NotADeviceTree { name: String, detected: ImageType },

    #[error("Device tree '{name}' header claims {header} bytes but the blob has {actual}")]
    Truncated {
        name: String,
        header: usize,
        actual: usize,
    },

    #[error("Device tree '{name}' is {size} bytes, the limit is {FDT_MAX_SIZE}")]
    DtbTooLarge { name: String, size: usize },

    #[error("Device tree '{name}' at {range} does not fit in guest RAM {ram}")]
    OutsideRam {
        name: String,
        range: MemoryRange,
        ram: MemoryRange,
    },

    #[error("Failed to load device tree '{name}' at 0x{addr:x}")]
    CopyFailed {
        name: String,
        addr: u64,
        #[source]
        source: MachineError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A device tree blob about to be placed in guest memory.
#[derive(Debug)]
pub struct DeviceTreeBlob<'a> {
    pub addr: GuestAddress,
    pub blob: &'a [u8],
}

impl DeviceTreeBlob<'_> {
    pub fn range(&self) -> MemoryRange {
        MemoryRange::new(self.addr, self.blob.len() as GuestUsize)
    }
}

/// Validates the device tree called `name` and copies it to `fdt_addr`.
///
/// Nothing is written to the guest unless the blob is a device tree.
pub fn install_device_tree(
    machine: &mut dyn GuestMachine,
    archive: &dyn BootArchive,
    name: &str,
    fdt_addr: GuestAddress,
    ram: MemoryRange,
) -> Result<GuestAddress> {
    let blob = archive
        .find(name)
        .ok_or_else(|| Error::DtbNotFound(name.to_owned()))?;

    let detected = detect_image_type(blob);
    if detected != ImageType::DeviceTree {
        return Err(Error::NotADeviceTree {
            name: name.to_owned(),
            detected,
        });
    }

    let total_size = blob
        .get(FDT_TOTALSIZE_OFFSET..FDT_TOTALSIZE_OFFSET + 4)
        .map_or(usize::MAX, |field| BigEndian::read_u32(field) as usize);
    if total_size > blob.len() {
        return Err(Error::Truncated {
            name: name.to_owned(),
            header: total_size,
            actual: blob.len(),
        });
    }
    if blob.len() > FDT_MAX_SIZE {
        return Err(Error::DtbTooLarge {
            name: name.to_owned(),
            size: blob.len(),
        });
    }

    let dtb = DeviceTreeBlob {
        addr: fdt_addr,
        blob,
    };
    if !ram.contains_range(&dtb.range()) {
        return Err(Error::OutsideRam {
            name: name.to_owned(),
            range: dtb.range(),
            ram,
        });
    }

    machine
        .copy_into(dtb.blob, dtb.addr)
        .map_err(|source| Error::CopyFailed {
            name: name.to_owned(),
            addr: dtb.addr.0,
            source,
        })?;

    info!(
        "Loaded device tree '{}' ({} bytes) at 0x{:x}",
        name,
        blob.len(),
        dtb.addr.0
    );

    Ok(dtb.addr)
}

#[cfg(test)]
mod tests {
    use arch::GuestMemoryLayout;

    use super::*;
    use crate::archive::MemoryArchive;
    use crate::image::tests::{device_tree, zimage};
    use crate::test_util::{Call, MockMachine};

    fn install(machine: &mut MockMachine, blob: Vec<u8>) -> Result<GuestAddress> {
        let layout = GuestMemoryLayout::default();
        let mut archive = MemoryArchive::new();
        archive.insert("linux-dtb", blob);
        install_device_tree(
            machine,
            &archive,
            "linux-dtb",
            layout.fdt_addr(),
            layout.ram(),
        )
    }

    #[test]
    fn test_install_device_tree() {
        let mut machine = MockMachine::default();
        let addr = install(&mut machine, device_tree(0x800)).unwrap();
        assert_eq!(addr, GuestAddress(0x4900_0000));
        assert_eq!(
            machine.calls(),
            vec![Call::Copy {
                addr: 0x4900_0000,
                len: 0x800
            }]
        );
    }

    #[test]
    fn test_dtb_not_found() {
        let mut machine = MockMachine::default();
        let layout = GuestMemoryLayout::default();
        let err = install_device_tree(
            &mut machine,
            &MemoryArchive::new(),
            "linux-dtb",
            layout.fdt_addr(),
            layout.ram(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::DtbNotFound(_)));
    }

    #[test]
    fn test_wrong_type_is_never_copied() {
        for blob in [vec![0u8; 4096], zimage(0, 0x1000), vec![0x1f, 0x8b, 8]] {
            let mut machine = MockMachine::default();
            let err = install(&mut machine, blob).unwrap_err();
            assert!(matches!(err, Error::NotADeviceTree { .. }));
            assert!(machine.calls().is_empty());
        }
    }

    #[test]
    fn test_truncated_device_tree() {
        let mut machine = MockMachine::default();
        let mut blob = device_tree(0x100);
        blob.truncate(0x80);
        assert!(matches!(
            install(&mut machine, blob),
            Err(Error::Truncated { header: 0x100, .. })
        ));
        assert!(machine.calls().is_empty());
    }

    #[test]
    fn test_device_tree_too_large() {
        let mut machine = MockMachine::default();
        assert!(matches!(
            install(&mut machine, device_tree(FDT_MAX_SIZE + 8)),
            Err(Error::DtbTooLarge { .. })
        ));
    }

    #[test]
    fn test_copy_failure() {
        let mut machine = MockMachine::default().fail_copy_at(0x4900_0000);
        assert!(matches!(
            install(&mut machine, device_tree(64)),
            Err(Error::CopyFailed { .. })
        ));
    }
}
