// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

// Core Modules
pub mod core;
pub mod extent;
pub mod fs;

// Reusable types and traits
pub use self::core::traits::*;
pub use self::core::{FileMode, VolumeGeometry};

// Extent preparation API
pub use extent::{
    EraseSequence, EraseStage, EraseState, ExtentError, ExtentRequest, ExtentResult, ExtentWriter,
    FileExtentHandle, Lba, PrepFailure, PrepStage, PrepState, SectorRange, erase_sectors,
    prepare_extent, resolve_first_sector,
};

/// FAT32 volume implementation.
///
/// See [`fat32::Fat32Volume`], [`fat32::Fat32Formatter`] and [`fat32::Fat32Allocator`].
pub mod fat32 {
    pub use super::fs::fat32::prelude::*;
}
