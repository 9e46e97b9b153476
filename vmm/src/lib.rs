// Copyright © 2019 Intel Corporation
// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::result;

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::boot_args::BootDescriptor;
use crate::machine::{FaultEvent, FaultReceiver, GuestConfig, Hypervisor, MachineError, SenderTag};
use crate::vm::{BootContext, Error as VmError, Vm};

pub mod archive;
pub mod board;
pub mod boot_args;
pub mod device_manager;
pub mod device_tree;
pub mod hosted;
pub mod image;
pub mod loader;
pub mod machine;
#[cfg(test)]
mod test_util;
pub mod vm;

/// Errors associated with VMM management
#[derive(Debug, Error)]
pub enum Error {
    /// The board profile cannot describe a bootable guest
    #[error("Invalid board configuration")]
    InvalidBoard(#[source] board::Error),

    /// The guest could not be booted
    #[error("Guest boot failed at step '{}'", .0.step())]
    Boot(#[source] VmError),

    /// A fault message came from someone other than the guest
    #[error("Fault message from sender {received}, expected {expected}")]
    ForeignSender {
        expected: SenderTag,
        received: SenderTag,
    },

    /// The guest machine failed to handle a fault
    #[error("Guest fault handling failed")]
    EventDispatch(#[source] MachineError),

    /// Every sender of the fault channel is gone
    #[error("Fault channel closed")]
    FaultChannelClosed,

    /// The request does not make sense in the current state
    #[error("Invalid request in state {0:?}")]
    InvalidState(VmmState),
}
pub type Result<T> = result::Result<T, Error>;

/// Lifecycle of the monitor. Halted is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VmmState {
    Booting,
    Running,
    Halted,
}

/// Logs what is about to be booted: archive contents, guest memory regions
/// and the device table.
pub fn log_boot_info(ctx: &BootContext) {
    info!("Boot archive:");
    for (index, (name, size)) in ctx.archive.entries().iter().enumerate() {
        info!("  {:2}: {:<24} {} bytes", index, name, size);
    }

    info!("Guest memory regions:");
    for (base, size, region_type) in arch::arch_memory_regions(&ctx.board.layout) {
        info!(
            "  0x{:08x}-0x{:08x} {:?}",
            base.0,
            base.0.saturating_add(size as u64),
            region_type
        );
    }

    let core = ctx.board.core_devices();
    info!("Devices for board '{}':", ctx.board.name);
    for device in core
        .in_install_order()
        .iter()
        .map(|(device, _)| *device)
        .chain(ctx.board.passthrough.iter())
    {
        let windows: Vec<String> = device
            .resources
            .iter()
            .map(|r| format!("0x{:08x}+0x{:x}", r.addr, r.size))
            .collect();
        match device.irq {
            Some(irq) => info!("  {:<12} {} irq {}", device.name, windows.join(","), irq.0),
            None => info!("  {:<12} {}", device.name, windows.join(",")),
        }
    }
}

pub struct Vmm {
    config: GuestConfig,
    state: VmmState,
    vm: Option<Vm>,
    faults: Option<FaultReceiver>,
}

impl Vmm {
    pub fn new(config: GuestConfig) -> Self {
        Vmm {
            config,
            state: VmmState::Booting,
            vm: None,
            faults: None,
        }
    }

    pub fn state(&self) -> VmmState {
        self.state
    }

    pub fn boot_descriptor(&self) -> Option<&BootDescriptor> {
        self.vm.as_ref().and_then(|vm| vm.boot_descriptor())
    }

    /// Checks the board, creates the guest machine and runs the boot
    /// pipeline. Any failure leaves the monitor halted.
    pub fn boot(
        &mut self,
        hypervisor: &dyn Hypervisor,
        ctx: &BootContext,
    ) -> Result<BootDescriptor> {
        if self.state != VmmState::Booting {
            return Err(Error::InvalidState(self.state));
        }

        // Every address the pipeline computes is derived from this layout.
        if let Err(e) = ctx.board.validate() {
            self.state = VmmState::Halted;
            return Err(Error::InvalidBoard(e));
        }

        log_boot_info(ctx);

        let (sender, receiver) = flume::unbounded();
        let mut vm = match Vm::new(hypervisor, self.config.clone(), ctx.board, sender) {
            Ok(vm) => vm,
            Err(e) => {
                self.state = VmmState::Halted;
                return Err(Error::Boot(e));
            }
        };

        match vm.boot(ctx) {
            Ok(boot) => {
                self.vm = Some(vm);
                self.faults = Some(receiver);
                self.state = VmmState::Running;
                Ok(boot)
            }
            Err(e) => {
                // The guest never ran, there is nothing to stop.
                self.state = VmmState::Halted;
                Err(Error::Boot(e))
            }
        }
    }

    fn halt(&mut self, reason: &Error) {
        error!("Halting guest '{}': {}", self.config.name, reason);
        if let Some(vm) = self.vm.as_mut() {
            vm.shutdown();
        }
        self.state = VmmState::Halted;
    }

    /// Handles one message from the fault channel.
    pub fn handle_event(&mut self, event: &FaultEvent) -> Result<()> {
        if self.state != VmmState::Running {
            return Err(Error::InvalidState(self.state));
        }

        if event.sender != self.config.tag {
            let e = Error::ForeignSender {
                expected: self.config.tag,
                received: event.sender,
            };
            self.halt(&e);
            return Err(e);
        }

        debug!("Fault from {}: {:?}", event.sender, event.cause);
        let result = match self.vm.as_mut() {
            Some(vm) => vm.handle_fault(event),
            None => return Err(Error::InvalidState(self.state)),
        };
        if let Err(source) = result {
            let e = Error::EventDispatch(source);
            self.halt(&e);
            return Err(e);
        }

        Ok(())
    }

    /// Serves the guest until it can no longer run. Returns why the monitor
    /// halted.
    pub fn control_loop(&mut self) -> Error {
        let faults = match (self.state, self.faults.clone()) {
            (VmmState::Running, Some(faults)) => faults,
            _ => return Error::InvalidState(self.state),
        };

        loop {
            let event = match faults.recv() {
                Ok(event) => event,
                Err(flume::RecvError::Disconnected) => {
                    let e = Error::FaultChannelClosed;
                    self.halt(&e);
                    return e;
                }
            };

            if let Err(e) = self.handle_event(&event) {
                return e;
            }
        }
    }

    /// Stops the guest without waiting for a fault.
    pub fn shutdown(&mut self) {
        if self.state == VmmState::Running {
            warn!("Shutting down guest '{}'", self.config.name);
            if let Some(vm) = self.vm.as_mut() {
                vm.shutdown();
            }
        }
        self.state = VmmState::Halted;
    }
}
