// Copyright © 2019 Intel Corporation. All Rights Reserved.
// Copyright © 2026 The Guest VMM Authors
// SPDX-License-Identifier: Apache-2.0 AND BSD-3-Clause

//! Describes the devices a guest is given.
use std::fmt;

use serde::{Deserialize, Serialize};
use vm_memory::{GuestAddress, GuestUsize};

/// How a device is provided to the guest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    /// Virtual interrupt controller. Every interrupt route depends on it.
    InterruptController,
    /// Guest RAM, mapped rather than trapped.
    RamRange,
    /// Virtual IRQ combiner.
    IrqCombiner,
    /// Virtual system counter and timer.
    SystemTimer,
    /// Console owned by the monitor.
    Console,
    /// Physical device relayed to the guest.
    Passthrough,
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DeviceKind::InterruptController => "interrupt-controller",
            DeviceKind::RamRange => "ram",
            DeviceKind::IrqCombiner => "irq-combiner",
            DeviceKind::SystemTimer => "system-timer",
            DeviceKind::Console => "console",
            DeviceKind::Passthrough => "passthrough",
        };
        f.write_str(name)
    }
}

/// Guest physical window claimed by a device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct IoResource {
    /// Resource address.
    pub addr: u64,
    /// Resource size.
    pub size: GuestUsize,
}

impl IoResource {
    /// Build a Resource struct.
    pub fn new(addr: u64, size: GuestUsize) -> IoResource {
        IoResource { addr, size }
    }

    pub fn start(&self) -> GuestAddress {
        GuestAddress(self.addr)
    }
}

/// Legacy interrupt resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct IrqResource(pub u32);

/// Storing Device information for installation into a guest.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct DeviceDescriptor {
    /// Device name, unique within a board table.
    pub name: String,
    /// Emulation kind.
    pub kind: DeviceKind,
    /// Device resource set.
    #[serde(default)]
    pub resources: Vec<IoResource>,
    /// Device IRQ resource.
    #[serde(default)]
    pub irq: Option<IrqResource>,
}

impl DeviceDescriptor {
    /// Create a descriptor for one device.
    pub fn new(
        name: impl Into<String>,
        kind: DeviceKind,
        resources: Vec<IoResource>,
        irq: Option<IrqResource>,
    ) -> Self {
        DeviceDescriptor {
            name: name.into(),
            kind,
            resources,
            irq,
        }
    }

    /// Pass-through device with a single MMIO window.
    pub fn passthrough(
        name: impl Into<String>,
        addr: u64,
        size: GuestUsize,
        irq: Option<u32>,
    ) -> Self {
        Self::new(
            name,
            DeviceKind::Passthrough,
            vec![IoResource::new(addr, size)],
            irq.map(IrqResource),
        )
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.kind)
    }
}
