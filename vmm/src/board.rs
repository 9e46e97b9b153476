// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0
//

//! Per-board configuration: memory layout and device table.

use std::collections::HashSet;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use arch::GuestMemoryLayout;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use vm_device::{DeviceDescriptor, DeviceKind, IoResource, IrqResource};

use crate::device_manager::CoreDevices;

pub const DEFAULT_BOARD: &str = "exynos5410";

/// Errors associated with board configuration
#[derive(Debug, Error)]
pub enum Error {
    #[error("Unknown board '{0}'")]
    UnknownBoard(String),

    #[error("Cannot open board configuration")]
    Open(#[source] io::Error),

    #[error("Cannot parse board configuration")]
    Parse(#[source] serde_json::Error),

    #[error("Invalid memory layout for board '{board}'")]
    InvalidLayout {
        board: String,
        #[source]
        source: arch::Error,
    },

    #[error("Device {device} on board '{board}' must be {expected}, not {actual}")]
    WrongKind {
        board: String,
        device: String,
        expected: DeviceKind,
        actual: DeviceKind,
    },

    #[error("Device {device} appears more than once on board '{board}'")]
    DuplicateDevice { board: String, device: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Everything the monitor knows about one hardware target.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BoardConfig {
    pub name: String,
    #[serde(default)]
    pub layout: GuestMemoryLayout,
    pub interrupt_controller: DeviceDescriptor,
    pub irq_combiner: DeviceDescriptor,
    pub system_timer: DeviceDescriptor,
    pub console: DeviceDescriptor,
    #[serde(default)]
    pub passthrough: Vec<DeviceDescriptor>,
}

fn emulated(
    name: &str,
    kind: DeviceKind,
    addr: u64,
    size: u64,
    irq: Option<u32>,
) -> DeviceDescriptor {
    DeviceDescriptor::new(
        name,
        kind,
        vec![IoResource::new(addr, size)],
        irq.map(IrqResource),
    )
}

impl BoardConfig {
    /// Built-in board profiles.
    pub fn by_name(name: &str) -> Result<Self> {
        match name {
            "exynos5410" => Ok(Self::exynos5410()),
            _ => Err(Error::UnknownBoard(name.to_owned())),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(Error::Open)?;
        let board: BoardConfig =
            serde_json::from_reader(BufReader::new(file)).map_err(Error::Parse)?;
        board.validate()?;
        Ok(board)
    }

    /// Odroid-XU class Exynos5410 board.
    pub fn exynos5410() -> Self {
        let pt = |name: &str, addr: u64, irq: Option<u32>| {
            DeviceDescriptor::passthrough(name, addr, 0x1000, irq)
        };

        BoardConfig {
            name: "exynos5410".to_owned(),
            layout: GuestMemoryLayout::default(),
            interrupt_controller: emulated(
                "vgic",
                DeviceKind::InterruptController,
                0x1048_0000,
                0x8000,
                Some(25),
            ),
            irq_combiner: emulated("vcombiner", DeviceKind::IrqCombiner, 0x1044_0000, 0x1000, None),
            system_timer: emulated("vmct", DeviceKind::SystemTimer, 0x101c_0000, 0x1000, Some(152)),
            console: emulated("vconsole", DeviceKind::Console, 0x12c2_0000, 0x1000, Some(85)),
            passthrough: vec![
                pt("pwm_timer", 0x12dd_0000, Some(68)),
                pt("gpio_right", 0x1340_0000, None),
                pt("alive", 0x1004_0000, None),
                pt("cmu_top", 0x1002_0000, None),
                pt("cmu_core", 0x1001_0000, None),
                pt("chip_id", 0x1000_0000, None),
                pt("cmu_cpu", 0x1004_4000, None),
                pt("cmu_cdrex", 0x1003_0000, None),
                pt("cmu_mem", 0x1003_8000, None),
                pt("cmu_isp", 0x1001_c000, None),
                pt("cmu_acp", 0x1001_8000, None),
                pt("sysreg", 0x1005_0000, None),
                pt("i2c1", 0x12c7_0000, Some(89)),
                pt("i2c2", 0x12c8_0000, Some(90)),
                pt("i2c4", 0x12ca_0000, Some(92)),
                pt("i2c_hdmi", 0x12ce_0000, Some(96)),
                pt("usb2_ohci", 0x1212_0000, Some(103)),
                pt("usb2_ehci", 0x1211_0000, Some(103)),
                pt("usb2_ctrl", 0x1213_0000, None),
                pt("msh0", 0x1220_0000, Some(107)),
                pt("msh2", 0x1222_0000, Some(109)),
                pt("gpio_left", 0x1140_0000, None),
                pt("uart0", 0x12c0_0000, Some(83)),
                pt("uart1", 0x12c1_0000, Some(84)),
                pt("uart3", 0x12c3_0000, Some(86)),
                pt("tx_mixer", 0x1445_0000, Some(126)),
                pt("hdmi0", 0x1453_0000, Some(127)),
                pt("hdmi1", 0x1454_0000, None),
                pt("hdmi2", 0x1455_0000, None),
                pt("hdmi3", 0x1456_0000, None),
                pt("hdmi4", 0x1457_0000, None),
                pt("hdmi5", 0x1458_0000, None),
                pt("hdmi6", 0x1459_0000, None),
                pt("pdma0", 0x121a_0000, Some(66)),
                pt("pdma1", 0x121b_0000, Some(67)),
                pt("mdma0", 0x1080_0000, Some(65)),
                pt("mdma1", 0x11c1_0000, Some(124)),
            ],
        }
    }

    /// Guest RAM as a device, so the mapping is installed in sequence with
    /// the rest.
    pub fn ram_device(&self) -> DeviceDescriptor {
        DeviceDescriptor::new(
            "ram",
            DeviceKind::RamRange,
            vec![IoResource::new(self.layout.ram_base, self.layout.ram_size)],
            None,
        )
    }

    pub fn core_devices(&self) -> CoreDevices {
        CoreDevices {
            interrupt_controller: self.interrupt_controller.clone(),
            ram: self.ram_device(),
            irq_combiner: self.irq_combiner.clone(),
            system_timer: self.system_timer.clone(),
            console: self.console.clone(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.layout
            .validate()
            .map_err(|e| Error::InvalidLayout {
                board: self.name.clone(),
                source: e.into(),
            })?;

        let core = self.core_devices();
        let mut names = HashSet::new();
        for (device, expected) in core
            .in_install_order()
            .into_iter()
            .chain(self.passthrough.iter().map(|d| (d, DeviceKind::Passthrough)))
        {
            if device.kind != expected {
                return Err(Error::WrongKind {
                    board: self.name.clone(),
                    device: device.name.clone(),
                    expected,
                    actual: device.kind,
                });
            }
            if !names.insert(device.name.clone()) {
                return Err(Error::DuplicateDevice {
                    board: self.name.clone(),
                    device: device.name.clone(),
                });
            }
        }

        Ok(())
    }
}
