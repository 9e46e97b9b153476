// Copyright 2020 Arm Limited (or its affiliates). All rights reserved.
// Copyright 2019 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// Copyright © 2026 The Guest VMM Authors
// SPDX-License-Identifier: Apache-2.0

//
// Memory layout of the ARM (Exynos5410) Linux guest:
//
// Physical  +---------------------------------------------------------------+
// address   |                                                               |
// 2 GB      +---------------------------------------------------------------+
//           |                                                               |
//           ~                   ~                       ~                   ~
//           |                            DRAM                               |
//           |                                                               |
// 1G+144M   +---------------------------------------------------------------+
//           |                     Device tree blob                          |
//           +---------------------------------------------------------------+
//           ~                   ~                       ~                   ~
//           |                   Kernel (raw image and zImage)               |
// 1G+32K    +---------------------------------------------------------------+
//           |                                                               |
// 1G+256    +---------------------------------------------------------------+
//           |                     Legacy ATAGs                              |
// 1GB       +---------------------------------------------------------------+
//           |                                                               |
//           |         SoC peripherals (pass-through and emulated)           |
//           |                                                               |
// 0GB       +---------------------------------------------------------------+
//

use vm_memory::{GuestAddress, GuestUsize};

/// Start of guest RAM.
pub const RAM_START: GuestAddress = GuestAddress(0x4000_0000);

/// Size of guest RAM.
pub const RAM_SIZE: GuestUsize = 0x4000_0000;

/// Offset of the legacy ATAG list from the start of RAM.
pub const ATAGS_OFFSET: u64 = 0x100;

/// Offset of the device tree blob from the start of RAM.
pub const FDT_OFFSET: u64 = 0x0900_0000;

/// Offset at which the kernel's own boot-loader contract expects a raw image.
pub const KERNEL_OFFSET: u64 = 0x8000;

/// Maximum size of the device tree blob.
pub const FDT_MAX_SIZE: usize = 0x20_0000;

/// Size reserved for the legacy ATAG list.
pub const ATAGS_MAX_SIZE: usize = 0x100;

/// Machine type telling the kernel to take its configuration from the
/// device tree rather than a board id.
pub const MACH_TYPE_DEVICE_TREE: u32 = !0;
