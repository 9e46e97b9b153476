// Copyright © 2019 Intel Corporation. All Rights Reserved.
// Copyright © 2026 The Guest VMM Authors
// SPDX-License-Identifier: Apache-2.0 AND BSD-3-Clause

//! Device descriptions shared by the board tables and the guest machine.

mod device;

pub use crate::device::{DeviceDescriptor, DeviceKind, IoResource, IrqResource};
