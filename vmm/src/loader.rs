// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Guest kernel loading.

use arch::layout::FDT_MAX_SIZE;
use arch::{GuestMemoryLayout, MemoryRange};
use log::info;
use thiserror::Error;
use vm_memory::{GuestAddress, GuestUsize};

use crate::archive::BootArchive;
use crate::image::{detect_image_type, ImageType, KernelFormat};
use crate::machine::{GuestMachine, MachineError};

/// Errors associated with loading the guest kernel
#[derive(Debug, Error)]
pub enum Error {
    #[error("Kernel image '{0}' not found in the boot archive")]
    KernelNotFound(String),

    #[error("Unknown kernel image format for '{name}' (detected {detected})")]
    UnknownImageFormat { name: String, detected: ImageType },

    #[error("Kernel '{name}' at {range} does not fit in guest RAM {ram}")]
    OutsideRam {
        name: String,
        range: MemoryRange,
        ram: MemoryRange,
    },

    #[error("Kernel '{name}' at {range} overlaps the {region} at {reserved}")]
    OverlapsReserved {
        name: String,
        range: MemoryRange,
        region: &'static str,
        reserved: MemoryRange,
    },

    #[error("Failed to load '{name}' at 0x{addr:x}")]
    CopyFailed {
        name: String,
        addr: u64,
        #[source]
        source: MachineError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// A kernel image placed in guest memory. Lives only as long as the load.
#[derive(Debug)]
pub struct GuestImage<'a> {
    pub format: KernelFormat,
    pub load_addr: GuestAddress,
    pub name: &'a str,
    pub blob: &'a [u8],
}

impl GuestImage<'_> {
    pub fn range(&self) -> MemoryRange {
        MemoryRange::new(self.load_addr, self.blob.len() as GuestUsize)
    }

    /// Checks the image footprint against RAM and the reserved regions.
    fn check_placement(&self, layout: &GuestMemoryLayout) -> Result<()> {
        let range = self.range();
        let ram = layout.ram();
        if !ram.contains(self.load_addr) || !ram.contains_range(&range) {
            return Err(Error::OutsideRam {
                name: self.name.to_owned(),
                range,
                ram,
            });
        }

        for (region, reserved) in [
            ("legacy tags", layout.atags_range()),
            (
                "device tree",
                MemoryRange::new(layout.fdt_addr(), FDT_MAX_SIZE as GuestUsize),
            ),
        ] {
            if range.overlaps(&reserved) {
                return Err(Error::OverlapsReserved {
                    name: self.name.to_owned(),
                    range,
                    region,
                    reserved,
                });
            }
        }

        Ok(())
    }
}

/// Loads the kernel called `name` and returns its entry point.
pub fn load_kernel(
    machine: &mut dyn GuestMachine,
    archive: &dyn BootArchive,
    name: &str,
    layout: &GuestMemoryLayout,
) -> Result<GuestAddress> {
    let blob = archive
        .find(name)
        .ok_or_else(|| Error::KernelNotFound(name.to_owned()))?;

    let format = KernelFormat::from_blob(blob).ok_or_else(|| Error::UnknownImageFormat {
        name: name.to_owned(),
        detected: detect_image_type(blob),
    })?;

    let image = GuestImage {
        format,
        load_addr: format.entry_address(layout),
        name,
        blob,
    };
    image.check_placement(layout)?;

    machine
        .copy_into(image.blob, image.load_addr)
        .map_err(|source| Error::CopyFailed {
            name: name.to_owned(),
            addr: image.load_addr.0,
            source,
        })?;

    info!(
        "Loaded {} kernel '{}' ({} bytes) at 0x{:x}",
        format.image_type(),
        name,
        blob.len(),
        image.load_addr.0
    );

    Ok(image.load_addr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::MemoryArchive;
    use crate::image::tests::{device_tree, zimage};
    use crate::test_util::{Call, MockMachine};

    fn archive_with(name: &str, blob: Vec<u8>) -> MemoryArchive {
        let mut archive = MemoryArchive::new();
        archive.insert(name, blob);
        archive
    }

    #[test]
    fn test_load_raw_binary() {
        let mut machine = MockMachine::default();
        let archive = archive_with("linux", vec![0x5a; 4096]);
        let layout = GuestMemoryLayout::default();

        let entry = load_kernel(&mut machine, &archive, "linux", &layout).unwrap();
        assert_eq!(entry, GuestAddress(0x4000_8000));
        assert!(layout.ram().contains(entry));
        assert_eq!(
            machine.calls(),
            vec![Call::Copy {
                addr: 0x4000_8000,
                len: 4096
            }]
        );
    }

    #[test]
    fn test_load_is_deterministic() {
        let archive = archive_with("linux", zimage(0, 0x4000));
        let layout = GuestMemoryLayout::default();
        let first = load_kernel(&mut MockMachine::default(), &archive, "linux", &layout).unwrap();
        let second = load_kernel(&mut MockMachine::default(), &archive, "linux", &layout).unwrap();
        assert_eq!(first, second);
        assert!(layout.ram().contains(first));
    }

    #[test]
    fn test_load_zimage_at_link_address() {
        let mut machine = MockMachine::default();
        let archive = archive_with("linux", zimage(0x4200_0000, 0x4000));

        let entry =
            load_kernel(&mut machine, &archive, "linux", &GuestMemoryLayout::default()).unwrap();
        assert_eq!(entry, GuestAddress(0x4200_0000));
    }

    #[test]
    fn test_kernel_not_found() {
        let mut machine = MockMachine::default();
        let archive = MemoryArchive::new();
        let err = load_kernel(&mut machine, &archive, "linux", &GuestMemoryLayout::default())
            .unwrap_err();
        assert!(matches!(err, Error::KernelNotFound(ref n) if n == "linux"));
        assert!(machine.calls().is_empty());
    }

    #[test]
    fn test_unknown_format_is_not_copied() {
        for blob in [device_tree(128), b"\x7fELF\x01\x01\x01".to_vec(), Vec::new()] {
            let mut machine = MockMachine::default();
            let archive = archive_with("linux", blob);
            let err = load_kernel(&mut machine, &archive, "linux", &GuestMemoryLayout::default())
                .unwrap_err();
            assert!(matches!(err, Error::UnknownImageFormat { .. }));
            assert!(machine.calls().is_empty());
        }
    }

    #[test]
    fn test_zimage_outside_ram() {
        let mut machine = MockMachine::default();
        let archive = archive_with("linux", zimage(0x8000_0000, 0x1000));
        let err = load_kernel(&mut machine, &archive, "linux", &GuestMemoryLayout::default())
            .unwrap_err();
        assert!(matches!(err, Error::OutsideRam { .. }));
        assert!(machine.calls().is_empty());
    }

    #[test]
    fn test_zimage_overlapping_device_tree() {
        let mut machine = MockMachine::default();
        let archive = archive_with("linux", zimage(0x48ff_f000, 0x2000));
        let err = load_kernel(&mut machine, &archive, "linux", &GuestMemoryLayout::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::OverlapsReserved {
                region: "device tree",
                ..
            }
        ));
    }

    #[test]
    fn test_copy_failure() {
        let mut machine = MockMachine::default().fail_copy_at(0x4000_8000);
        let archive = archive_with("linux", vec![0; 4096]);
        let err = load_kernel(&mut machine, &archive, "linux", &GuestMemoryLayout::default())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::CopyFailed {
                addr: 0x4000_8000,
                ..
            }
        ));
    }
}
