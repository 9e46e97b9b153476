// Copyright © 2019 Intel Corporation
// Copyright © 2020, Microsoft Corporation
// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0 OR BSD-3-Clause
//

//! Contract between the monitor and the runtime that hosts the guest.

use std::fmt;

use arch::GuestMemoryLayout;
use thiserror::Error;
use vm_device::DeviceDescriptor;
use vm_memory::GuestAddress;

use crate::boot_args::BootDescriptor;

#[derive(Error, Debug)]
///
/// Enum for guest machine error
pub enum MachineError {
    ///
    /// Machine creation error
    ///
    #[error("Failed to create guest machine: {0}")]
    Create(#[source] anyhow::Error),
    ///
    /// Copy into guest memory error
    ///
    #[error("Failed to copy into guest memory: {0}")]
    CopyOut(#[source] anyhow::Error),
    ///
    /// Device installation error
    ///
    #[error("Failed to install device: {0}")]
    Install(#[source] anyhow::Error),
    ///
    /// Guest start error
    ///
    #[error("Failed to start guest: {0}")]
    Start(#[source] anyhow::Error),
    ///
    /// Fault handling error
    ///
    #[error("Failed to handle guest fault: {0}")]
    Dispatch(#[source] anyhow::Error),
}

///
/// Result type for returning from a function
///
pub type Result<T> = std::result::Result<T, MachineError>;

/// Badge identifying the guest a fault message came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SenderTag(pub u64);

impl fmt::Display for SenderTag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// What made the guest trap into the monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FaultCause {
    /// Stage-2 abort on a guest physical address.
    MemoryAccess { addr: u64, write: bool },
    /// Hypervisor call.
    Hypercall(u32),
    /// Exception the guest kernel could not take itself.
    VcpuException(u32),
    /// Guest asked to be switched off.
    PowerOff,
}

/// A message received on the fault channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FaultEvent {
    pub sender: SenderTag,
    pub cause: FaultCause,
}

impl FaultEvent {
    pub fn new(sender: SenderTag, cause: FaultCause) -> Self {
        FaultEvent { sender, cause }
    }
}

/// Sending half of the fault channel, handed to the guest machine.
pub type FaultSender = flume::Sender<FaultEvent>;
/// Receiving half of the fault channel, owned by the monitor loop.
pub type FaultReceiver = flume::Receiver<FaultEvent>;

/// Parameters used to create the guest machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuestConfig {
    pub name: String,
    pub priority: u8,
    /// Tag every fault message from this guest carries.
    pub tag: SenderTag,
}

///
/// Trait to represent a guest machine
///
/// A guest machine owns the device table, the guest memory mappings and the
/// sending end of the fault channel.
///
pub trait GuestMachine {
    /// Copies `buf` into guest RAM at `addr`.
    fn copy_into(&mut self, buf: &[u8], addr: GuestAddress) -> Result<()>;
    /// Makes a device visible to the guest.
    fn install(&mut self, device: &DeviceDescriptor) -> Result<()>;
    /// Starts the guest with the given boot arguments.
    fn start(&mut self, boot: &BootDescriptor) -> Result<()>;
    /// Stops the guest. Stopping is terminal.
    fn stop(&mut self);
    /// Handles one fault message. An error means the guest cannot continue.
    fn dispatch_event(&mut self, event: &FaultEvent) -> Result<()>;
}

///
/// Trait to represent the runtime that creates guest machines
///
pub trait Hypervisor {
    /// Creates a guest machine whose RAM follows `layout` and whose faults
    /// are delivered on `faults`.
    fn create_machine(
        &self,
        config: &GuestConfig,
        layout: &GuestMemoryLayout,
        faults: FaultSender,
    ) -> Result<Box<dyn GuestMachine>>;
}
