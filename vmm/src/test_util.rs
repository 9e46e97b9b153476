// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0
//

use std::cell::RefCell;
use std::rc::Rc;

use anyhow::anyhow;
use arch::GuestMemoryLayout;
use vm_device::DeviceDescriptor;
use vm_memory::GuestAddress;

use crate::archive::{BootArchive, MemoryArchive};
use crate::boot_args::BootDescriptor;
use crate::machine::{
    FaultCause, FaultEvent, FaultSender, GuestConfig, GuestMachine, Hypervisor, MachineError,
    Result,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    Copy { addr: u64, len: usize },
    Install(String),
    Start(BootDescriptor),
    Stop,
    Dispatch(FaultEvent),
}

/// Guest machine that records every call made on it.
#[derive(Clone, Default)]
pub struct MockMachine {
    calls: Rc<RefCell<Vec<Call>>>,
    fail_copy_at: Option<u64>,
    fail_install_of: Option<String>,
    fail_start: bool,
    pub faults: Option<FaultSender>,
}

impl MockMachine {
    pub fn fail_copy_at(mut self, addr: u64) -> Self {
        self.fail_copy_at = Some(addr);
        self
    }

    pub fn fail_install_of(mut self, name: &str) -> Self {
        self.fail_install_of = Some(name.to_owned());
        self
    }

    pub fn fail_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl GuestMachine for MockMachine {
    fn copy_into(&mut self, buf: &[u8], addr: GuestAddress) -> Result<()> {
        if self.fail_copy_at == Some(addr.0) {
            return Err(MachineError::CopyOut(anyhow!("injected copy failure")));
        }
        self.record(Call::Copy {
            addr: addr.0,
            len: buf.len(),
        });
        Ok(())
    }

    fn install(&mut self, device: &DeviceDescriptor) -> Result<()> {
        if self.fail_install_of.as_deref() == Some(device.name.as_str()) {
            return Err(MachineError::Install(anyhow!("injected install failure")));
        }
        self.record(Call::Install(device.name.clone()));
        Ok(())
    }

    fn start(&mut self, boot: &BootDescriptor) -> Result<()> {
        if self.fail_start {
            return Err(MachineError::Start(anyhow!("injected start failure")));
        }
        self.record(Call::Start(*boot));
        Ok(())
    }

    fn stop(&mut self) {
        self.record(Call::Stop);
    }

    fn dispatch_event(&mut self, event: &FaultEvent) -> Result<()> {
        self.record(Call::Dispatch(*event));
        match event.cause {
            FaultCause::PowerOff => Err(MachineError::Dispatch(anyhow!("guest powered off"))),
            _ => Ok(()),
        }
    }
}

/// Hands out clones of one `MockMachine`, keeping the fault sender so tests
/// can inject events.
#[derive(Default)]
pub struct MockHypervisor {
    pub machine: MockMachine,
    pub fail_create: bool,
    pub faults: RefCell<Option<FaultSender>>,
}

impl Hypervisor for MockHypervisor {
    fn create_machine(
        &self,
        _config: &GuestConfig,
        _layout: &GuestMemoryLayout,
        faults: FaultSender,
    ) -> Result<Box<dyn GuestMachine>> {
        if self.fail_create {
            return Err(MachineError::Create(anyhow!("injected create failure")));
        }
        *self.faults.borrow_mut() = Some(faults.clone());
        let mut machine = self.machine.clone();
        machine.faults = Some(faults);
        Ok(Box::new(machine))
    }
}

/// Archive that remembers which names were looked up.
pub struct RecordingArchive {
    pub inner: MemoryArchive,
    pub lookups: RefCell<Vec<String>>,
}

impl RecordingArchive {
    pub fn new(inner: MemoryArchive) -> Self {
        RecordingArchive {
            inner,
            lookups: RefCell::new(Vec::new()),
        }
    }
}

impl BootArchive for RecordingArchive {
    fn find(&self, name: &str) -> Option<&[u8]> {
        self.lookups.borrow_mut().push(name.to_owned());
        self.inner.find(name)
    }

    fn entries(&self) -> Vec<(&str, usize)> {
        self.inner.entries()
    }
}
