// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// Copyright © 2026 The Guest VMM Authors
// SPDX-License-Identifier: Apache-2.0

/// Layout for the supported ARM boards.
pub mod layout;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use vm_memory::{GuestAddress, GuestUsize};

use crate::{MemoryRange, RegionType};

/// Errors thrown while validating an ARM guest memory layout.
#[derive(Debug, Error)]
pub enum Error {
    /// RAM is empty or runs past the end of the address space.
    #[error("RAM region 0x{base:x}+0x{size:x} is not a valid address range")]
    InvalidRam { base: u64, size: u64 },

    /// A reserved offset falls outside of RAM.
    #[error("{name} offset 0x{offset:x} lies outside RAM (size 0x{ram_size:x})")]
    ReservedOutsideRam {
        name: &'static str,
        offset: u64,
        ram_size: u64,
    },

    /// The device tree and the legacy tags share memory.
    #[error("Device tree at 0x{fdt:x} overlaps the legacy tags at 0x{atags:x}")]
    ReservedOverlap { fdt: u64, atags: u64 },

    /// The device tree window covers the raw kernel entry point.
    #[error("Device tree at 0x{fdt:x} covers the kernel entry point 0x{kernel:x}")]
    KernelOverlap { fdt: u64, kernel: u64 },
}

/// Guest physical layout for one board profile.
///
/// Only the values are board specific: the loaders take everything they need
/// from here, so a new target only has to provide its own layout.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GuestMemoryLayout {
    pub ram_base: u64,
    pub ram_size: u64,
    pub atags_offset: u64,
    pub fdt_offset: u64,
}

impl Default for GuestMemoryLayout {
    fn default() -> Self {
        GuestMemoryLayout {
            ram_base: layout::RAM_START.0,
            ram_size: layout::RAM_SIZE,
            atags_offset: layout::ATAGS_OFFSET,
            fdt_offset: layout::FDT_OFFSET,
        }
    }
}

impl GuestMemoryLayout {
    pub fn ram_start(&self) -> GuestAddress {
        GuestAddress(self.ram_base)
    }

    pub fn ram_size(&self) -> GuestUsize {
        self.ram_size
    }

    pub fn ram(&self) -> MemoryRange {
        MemoryRange::new(self.ram_start(), self.ram_size)
    }

    /// Address of the legacy ATAG list.
    pub fn atags_addr(&self) -> GuestAddress {
        GuestAddress(self.ram_base + self.atags_offset)
    }

    pub fn atags_range(&self) -> MemoryRange {
        MemoryRange::new(self.atags_addr(), layout::ATAGS_MAX_SIZE as GuestUsize)
    }

    /// Fixed address the device tree blob is copied to.
    pub fn fdt_addr(&self) -> GuestAddress {
        GuestAddress(self.ram_base + self.fdt_offset)
    }

    /// Entry point of a raw kernel image.
    pub fn kernel_addr(&self) -> GuestAddress {
        GuestAddress(self.ram_base + layout::KERNEL_OFFSET)
    }

    /// Checks the reserved offsets against RAM. Called once at setup, a
    /// failure here means the board profile itself is broken.
    pub fn validate(&self) -> Result<(), Error> {
        let ram = self.ram();
        if self.ram_size == 0 || ram.end().is_none() {
            return Err(Error::InvalidRam {
                base: self.ram_base,
                size: self.ram_size,
            });
        }

        for (name, offset) in [
            ("Legacy tags", self.atags_offset),
            ("Device tree", self.fdt_offset),
            ("Kernel", layout::KERNEL_OFFSET),
        ] {
            if offset == 0 || offset >= self.ram_size {
                return Err(Error::ReservedOutsideRam {
                    name,
                    offset,
                    ram_size: self.ram_size,
                });
            }
        }

        let fdt_window = MemoryRange::new(self.fdt_addr(), layout::FDT_MAX_SIZE as GuestUsize);
        if fdt_window.overlaps(&self.atags_range()) {
            return Err(Error::ReservedOverlap {
                fdt: self.fdt_addr().0,
                atags: self.atags_addr().0,
            });
        }
        if fdt_window.contains(self.kernel_addr()) {
            return Err(Error::KernelOverlap {
                fdt: self.fdt_addr().0,
                kernel: self.kernel_addr().0,
            });
        }

        Ok(())
    }
}

/// Returns the guest physical regions: the peripheral window below RAM and
/// RAM itself.
pub fn arch_memory_regions(layout: &GuestMemoryLayout) -> Vec<(GuestAddress, usize, RegionType)> {
    let mut regions = Vec::with_capacity(2);
    if layout.ram_base > 0 {
        regions.push((GuestAddress(0), layout.ram_base as usize, RegionType::Reserved));
    }
    regions.push((layout.ram_start(), layout.ram_size as usize, RegionType::Ram));
    regions
}
