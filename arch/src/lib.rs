// Copyright 2020 Arm Limited (or its affiliates). All rights reserved.
// Copyright 2018 Amazon.com, Inc. or its affiliates. All Rights Reserved.
// Copyright © 2026 The Guest VMM Authors
//
// SPDX-License-Identifier: Apache-2.0

//! Implements platform specific functionality.
//! Supported platforms: 32-bit ARM boards booting a device-tree Linux guest.

use std::fmt;

use thiserror::Error;
use vm_memory::{GuestAddress, GuestUsize};

/// Module for 32-bit ARM board layouts.
pub mod arm;

pub use arm::layout;
pub use arm::{arch_memory_regions, GuestMemoryLayout};

/// Type for returning error code.
#[derive(Debug, Error)]
pub enum Error {
    /// ARM specific error triggered during layout validation.
    #[error("Platform specific error (ARM)")]
    PlatformSpecific(#[from] arm::Error),
}

/// Type for returning public functions outcome.
pub type Result<T> = std::result::Result<T, Error>;

/// Type for memory region types.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RegionType {
    /// RAM type
    Ram,

    /// Reserved type.
    /// A Reserved memory region is one the guest sees only through installed
    /// devices, never as plain RAM.
    Reserved,
}

/// A contiguous guest physical address range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryRange {
    pub base: GuestAddress,
    pub size: GuestUsize,
}

impl MemoryRange {
    pub fn new(base: GuestAddress, size: GuestUsize) -> Self {
        MemoryRange { base, size }
    }

    /// Exclusive end of the range, `None` if it wraps the address space.
    pub fn end(&self) -> Option<u64> {
        self.base.0.checked_add(self.size)
    }

    pub fn contains(&self, addr: GuestAddress) -> bool {
        match self.end() {
            Some(end) => addr.0 >= self.base.0 && addr.0 < end,
            None => false,
        }
    }

    /// Whether `other` lies entirely within this range.
    pub fn contains_range(&self, other: &MemoryRange) -> bool {
        match (self.end(), other.end()) {
            (Some(end), Some(other_end)) => other.base.0 >= self.base.0 && other_end <= end,
            _ => false,
        }
    }

    pub fn overlaps(&self, other: &MemoryRange) -> bool {
        if self.size == 0 || other.size == 0 {
            return false;
        }
        let end = self.end().unwrap_or(u64::MAX);
        let other_end = other.end().unwrap_or(u64::MAX);
        self.base.0 < other_end && other.base.0 < end
    }
}

impl fmt::Display for MemoryRange {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "0x{:08x}->0x{:08x}",
            self.base.0,
            self.base.0.saturating_add(self.size)
        )
    }
}
