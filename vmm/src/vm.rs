// Copyright © 2019 Intel Corporation
// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::fmt;
use std::result;

use arch::layout::MACH_TYPE_DEVICE_TREE;
use log::{error, info};
use thiserror::Error;

use crate::archive::BootArchive;
use crate::board::BoardConfig;
use crate::boot_args::BootDescriptor;
use crate::device_manager::{self, DeviceManagerError};
use crate::machine::{
    FaultEvent, FaultSender, GuestConfig, GuestMachine, Hypervisor, MachineError,
};
use crate::{device_tree, loader};

pub const DEFAULT_KERNEL_NAME: &str = "linux";
pub const DEFAULT_DTB_NAME: &str = "linux-dtb";

/// Errors associated with booting the guest. Every one of them is terminal.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Cannot create the guest machine")]
    CreateMachine(#[source] MachineError),

    #[error("Cannot install the guest devices")]
    InstallDevices(#[source] DeviceManagerError),

    #[error("Cannot load the guest kernel")]
    LoadKernel(#[source] loader::Error),

    #[error("Cannot load the guest device tree")]
    LoadDeviceTree(#[source] device_tree::Error),

    #[error("Cannot start the guest")]
    StartGuest(#[source] MachineError),
}
pub type Result<T> = result::Result<T, Error>;

impl Error {
    /// The boot step that failed.
    pub fn step(&self) -> BootStep {
        match self {
            Error::CreateMachine(_) => BootStep::CreateMachine,
            Error::InstallDevices(_) => BootStep::InstallDevices,
            Error::LoadKernel(_) => BootStep::LoadKernel,
            Error::LoadDeviceTree(_) => BootStep::LoadDeviceTree,
            Error::StartGuest(_) => BootStep::StartGuest,
        }
    }
}

/// Named steps of the boot pipeline, in execution order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootStep {
    CreateMachine,
    InstallDevices,
    LoadKernel,
    LoadDeviceTree,
    StartGuest,
}

impl fmt::Display for BootStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            BootStep::CreateMachine => "create machine",
            BootStep::InstallDevices => "install devices",
            BootStep::LoadKernel => "load kernel",
            BootStep::LoadDeviceTree => "load device tree",
            BootStep::StartGuest => "start guest",
        };
        f.write_str(name)
    }
}

/// Everything the boot pipeline reads. Passed down explicitly, nothing is
/// looked up from global state.
pub struct BootContext<'a> {
    pub archive: &'a dyn BootArchive,
    pub board: &'a BoardConfig,
    pub kernel_name: &'a str,
    pub dtb_name: &'a str,
}

impl<'a> BootContext<'a> {
    pub fn new(archive: &'a dyn BootArchive, board: &'a BoardConfig) -> Self {
        BootContext {
            archive,
            board,
            kernel_name: DEFAULT_KERNEL_NAME,
            dtb_name: DEFAULT_DTB_NAME,
        }
    }
}

fn run_step<T>(step: BootStep, f: impl FnOnce() -> Result<T>) -> Result<T> {
    info!("Boot step: {}", step);
    f().inspect_err(|e| error!("Boot step '{}' failed: {}", step, e))
}

/// Runs the boot steps that follow machine creation, stopping at the first
/// failure. On success the guest is running.
pub fn boot_guest(machine: &mut dyn GuestMachine, ctx: &BootContext) -> Result<BootDescriptor> {
    let layout = &ctx.board.layout;

    run_step(BootStep::InstallDevices, || {
        device_manager::install_devices(
            machine,
            &ctx.board.core_devices(),
            &ctx.board.passthrough,
        )
        .map_err(Error::InstallDevices)
    })?;

    let entry = run_step(BootStep::LoadKernel, || {
        loader::load_kernel(machine, ctx.archive, ctx.kernel_name, layout)
            .map_err(Error::LoadKernel)
    })?;

    let fdt = run_step(BootStep::LoadDeviceTree, || {
        device_tree::install_device_tree(
            machine,
            ctx.archive,
            ctx.dtb_name,
            layout.fdt_addr(),
            layout.ram(),
        )
        .map_err(Error::LoadDeviceTree)
    })?;

    let boot = BootDescriptor::new(entry, fdt, MACH_TYPE_DEVICE_TREE);

    run_step(BootStep::StartGuest, || {
        machine.start(&boot).map_err(Error::StartGuest)
    })?;

    Ok(boot)
}

/// The one guest this monitor serves.
pub struct Vm {
    config: GuestConfig,
    machine: Box<dyn GuestMachine>,
    boot: Option<BootDescriptor>,
}

impl Vm {
    pub fn new(
        hypervisor: &dyn Hypervisor,
        config: GuestConfig,
        board: &BoardConfig,
        faults: FaultSender,
    ) -> Result<Self> {
        let machine = run_step(BootStep::CreateMachine, || {
            hypervisor
                .create_machine(&config, &board.layout, faults)
                .map_err(Error::CreateMachine)
        })?;

        Ok(Vm {
            config,
            machine,
            boot: None,
        })
    }

    pub fn boot(&mut self, ctx: &BootContext) -> Result<BootDescriptor> {
        let boot = boot_guest(self.machine.as_mut(), ctx)?;
        info!("Guest '{}' is running: {}", self.config.name, boot);
        self.boot = Some(boot);
        Ok(boot)
    }

    pub fn boot_descriptor(&self) -> Option<&BootDescriptor> {
        self.boot.as_ref()
    }

    pub fn handle_fault(&mut self, event: &FaultEvent) -> result::Result<(), MachineError> {
        self.machine.dispatch_event(event)
    }

    pub fn shutdown(&mut self) {
        self.machine.stop();
    }
}
