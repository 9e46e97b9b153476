// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::fmt;

use vm_memory::GuestAddress;

/// Arguments handed to the guest entry point: the ARM boot protocol's
/// r1 (machine type) and r2 (device tree) alongside the pc.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootDescriptor {
    entry: GuestAddress,
    machine_type: u32,
    fdt: GuestAddress,
}

impl BootDescriptor {
    pub fn new(entry: GuestAddress, fdt: GuestAddress, machine_type: u32) -> Self {
        BootDescriptor {
            entry,
            machine_type,
            fdt,
        }
    }

    pub fn entry(&self) -> GuestAddress {
        self.entry
    }

    pub fn machine_type(&self) -> u32 {
        self.machine_type
    }

    pub fn fdt(&self) -> GuestAddress {
        self.fdt
    }
}

impl fmt::Display for BootDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "entry 0x{:x} machine 0x{:x} dtb 0x{:x}",
            self.entry.0, self.machine_type, self.fdt.0
        )
    }
}

#[cfg(test)]
mod tests {
    use arch::layout::MACH_TYPE_DEVICE_TREE;

    use super::*;

    #[test]
    fn test_boot_descriptor() {
        let boot = BootDescriptor::new(
            GuestAddress(0x4000_8000),
            GuestAddress(0x4900_0000),
            MACH_TYPE_DEVICE_TREE,
        );
        assert_eq!(boot.entry(), GuestAddress(0x4000_8000));
        assert_eq!(boot.fdt(), GuestAddress(0x4900_0000));
        assert_eq!(boot.machine_type(), 0xffff_ffff);
        assert_eq!(
            boot.to_string(),
            "entry 0x40008000 machine 0xffffffff dtb 0x49000000"
        );
    }
}
