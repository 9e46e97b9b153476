// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! In-process guest machine.
//!
//! Guest RAM is an anonymous mapping and devices are bookkeeping records.
//! There is no vCPU, so faults only arrive when something posts them on the
//! channel handed out by [`HostedMachine::fault_sender`].

use anyhow::anyhow;
use arch::{GuestMemoryLayout, MemoryRange};
use log::{debug, info, warn};
use vm_device::DeviceDescriptor;
use vm_memory::{Bytes, GuestAddress, GuestMemoryMmap};

use crate::boot_args::BootDescriptor;
use crate::machine::{
    FaultCause, FaultEvent, FaultSender, GuestConfig, GuestMachine, Hypervisor, MachineError,
    Result,
};

/// Creates [`HostedMachine`]s.
#[derive(Default)]
pub struct HostedHypervisor {}

impl HostedHypervisor {
    pub fn new() -> Self {
        HostedHypervisor {}
    }
}

impl Hypervisor for HostedHypervisor {
    fn create_machine(
        &self,
        config: &GuestConfig,
        layout: &GuestMemoryLayout,
        faults: FaultSender,
    ) -> Result<Box<dyn GuestMachine>> {
        Ok(Box::new(HostedMachine::new(config, layout, faults)?))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum MachineState {
    Created,
    Running,
    Stopped,
}

struct InstalledDevice {
    name: String,
    windows: Vec<MemoryRange>,
}

pub struct HostedMachine {
    name: String,
    ram: MemoryRange,
    memory: GuestMemoryMmap,
    devices: Vec<InstalledDevice>,
    faults: FaultSender,
    boot: Option<BootDescriptor>,
    state: MachineState,
}

impl HostedMachine {
    pub fn new(
        config: &GuestConfig,
        layout: &GuestMemoryLayout,
        faults: FaultSender,
    ) -> Result<Self> {
        let ram = layout.ram();
        let memory = GuestMemoryMmap::from_ranges(&[(ram.base, ram.size as usize)])
            .map_err(|e| MachineError::Create(anyhow!("Cannot map guest RAM {}: {}", ram, e)))?;

        info!(
            "Created guest '{}' (priority {}, tag {}) with RAM {}",
            config.name, config.priority, config.tag, ram
        );

        Ok(HostedMachine {
            name: config.name.clone(),
            ram,
            memory,
            devices: Vec::new(),
            faults,
            boot: None,
            state: MachineState::Created,
        })
    }

    /// Sending end of the guest's fault channel.
    pub fn fault_sender(&self) -> FaultSender {
        self.faults.clone()
    }

    pub fn memory(&self) -> &GuestMemoryMmap {
        &self.memory
    }

    pub fn boot_descriptor(&self) -> Option<&BootDescriptor> {
        self.boot.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.state == MachineState::Running
    }

    fn device_at(&self, addr: GuestAddress) -> Option<&InstalledDevice> {
        self.devices
            .iter()
            .find(|d| d.windows.iter().any(|w| w.contains(addr)))
    }
}

impl GuestMachine for HostedMachine {
    fn copy_into(&mut self, buf: &[u8], addr: GuestAddress) -> Result<()> {
        let range = MemoryRange::new(addr, buf.len() as u64);
        if !self.ram.contains_range(&range) {
            return Err(MachineError::CopyOut(anyhow!(
                "{} is outside guest RAM {}",
                range,
                self.ram
            )));
        }
        self.memory
            .write_slice(buf, addr)
            .map_err(|e| MachineError::CopyOut(e.into()))
    }

    fn install(&mut self, device: &DeviceDescriptor) -> Result<()> {
        if self.devices.iter().any(|d| d.name == device.name) {
            return Err(MachineError::Install(anyhow!(
                "{} is already installed",
                device.name
            )));
        }

        let windows: Vec<MemoryRange> = device
            .resources
            .iter()
            .map(|r| MemoryRange::new(r.start(), r.size))
            .collect();
        for window in windows.iter() {
            if let Some(other) = self
                .devices
                .iter()
                .find(|d| d.windows.iter().any(|w| w.overlaps(window)))
            {
                return Err(MachineError::Install(anyhow!(
                    "{} window {} overlaps {}",
                    device.name,
                    window,
                    other.name
                )));
            }
        }

        debug!("{}: installed {}", self.name, device);
        self.devices.push(InstalledDevice {
            name: device.name.clone(),
            windows,
        });
        Ok(())
    }

    fn start(&mut self, boot: &BootDescriptor) -> Result<()> {
        if self.state != MachineState::Created {
            return Err(MachineError::Start(anyhow!(
                "guest '{}' was already started",
                self.name
            )));
        }
        if !self.ram.contains(boot.entry()) {
            return Err(MachineError::Start(anyhow!(
                "entry point 0x{:x} is outside guest RAM {}",
                boot.entry().0,
                self.ram
            )));
        }

        info!("{}: starting with {}", self.name, boot);
        self.boot = Some(*boot);
        self.state = MachineState::Running;
        Ok(())
    }

    fn stop(&mut self) {
        if self.state != MachineState::Stopped {
            info!("{}: stopped", self.name);
        }
        self.state = MachineState::Stopped;
    }

    fn dispatch_event(&mut self, event: &FaultEvent) -> Result<()> {
        if self.state != MachineState::Running {
            return Err(MachineError::Dispatch(anyhow!(
                "guest '{}' is not running",
                self.name
            )));
        }

        match event.cause {
            FaultCause::MemoryAccess { addr, write } => {
                let addr = GuestAddress(addr);
                if self.ram.contains(addr) {
                    debug!("{}: RAM access at 0x{:x}", self.name, addr.0);
                    Ok(())
                } else if let Some(device) = self.device_at(addr) {
                    debug!(
                        "{}: {} access at 0x{:x} handled by {}",
                        self.name,
                        if write { "write" } else { "read" },
                        addr.0,
                        device.name
                    );
                    Ok(())
                } else {
                    Err(MachineError::Dispatch(anyhow!(
                        "unhandled {} at 0x{:x}",
                        if write { "write" } else { "read" },
                        addr.0
                    )))
                }
            }
            FaultCause::Hypercall(nr) => {
                warn!("{}: ignoring hypercall {}", self.name, nr);
                Ok(())
            }
            FaultCause::VcpuException(hsr) => Err(MachineError::Dispatch(anyhow!(
                "unhandled vCPU exception (HSR 0x{:08x})",
                hsr
            ))),
            FaultCause::PowerOff => Err(MachineError::Dispatch(anyhow!(
                "guest '{}' powered off",
                self.name
            ))),
        }
    }
}
