// Copyright © 2019 Intel Corporation
// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0 AND BSD-3-Clause
//

use std::collections::HashSet;

use log::{debug, info};
use thiserror::Error;
use vm_device::{DeviceDescriptor, DeviceKind};

use crate::machine::{GuestMachine, MachineError};

/// Errors associated with device installation
#[derive(Debug, Error)]
pub enum DeviceManagerError {
    /// Cannot install a device
    #[error("Cannot install device {device}")]
    Install {
        device: String,
        #[source]
        source: MachineError,
    },

    /// The same device appears twice in the install sequence
    #[error("Device {0} is listed more than once")]
    Duplicate(String),

    /// A core slot holds a device of the wrong kind
    #[error("Device {device} has kind {actual}, expected {expected}")]
    WrongKind {
        device: String,
        expected: DeviceKind,
        actual: DeviceKind,
    },
}

pub type DeviceManagerResult<T> = std::result::Result<T, DeviceManagerError>;

/// The emulated devices every guest gets, installed before anything that
/// routes interrupts through them.
#[derive(Clone, Debug)]
pub struct CoreDevices {
    pub interrupt_controller: DeviceDescriptor,
    pub ram: DeviceDescriptor,
    pub irq_combiner: DeviceDescriptor,
    pub system_timer: DeviceDescriptor,
    pub console: DeviceDescriptor,
}

impl CoreDevices {
    /// Devices in the order they have to be installed in.
    pub fn in_install_order(&self) -> [(&DeviceDescriptor, DeviceKind); 5] {
        [
            (&self.interrupt_controller, DeviceKind::InterruptController),
            (&self.ram, DeviceKind::RamRange),
            (&self.irq_combiner, DeviceKind::IrqCombiner),
            (&self.system_timer, DeviceKind::SystemTimer),
            (&self.console, DeviceKind::Console),
        ]
    }
}

/// Installs the core devices, then `passthrough` in table order. Stops at
/// the first failure.
pub fn install_devices(
    machine: &mut dyn GuestMachine,
    core: &CoreDevices,
    passthrough: &[DeviceDescriptor],
) -> DeviceManagerResult<()> {
    let mut installed = HashSet::new();

    let core = core.in_install_order();
    let sequence = core
        .iter()
        .map(|(device, kind)| (*device, *kind))
        .chain(passthrough.iter().map(|d| (d, DeviceKind::Passthrough)));

    for (device, expected) in sequence {
        if device.kind != expected {
            return Err(DeviceManagerError::WrongKind {
                device: device.name.clone(),
                expected,
                actual: device.kind,
            });
        }
        if !installed.insert(device.name.as_str()) {
            return Err(DeviceManagerError::Duplicate(device.name.clone()));
        }

        debug!("Installing {}", device);
        machine
            .install(device)
            .map_err(|source| DeviceManagerError::Install {
                device: device.to_string(),
                source,
            })?;
    }

    info!(
        "Installed {} core and {} pass-through devices",
        core.len(),
        passthrough.len()
    );

    Ok(())
}
