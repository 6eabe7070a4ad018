// SPDX-License-Identifier: MIT

// === Sub-modules ===
pub mod allocator;
pub mod errors;
pub mod extent_fs;
pub mod fat;
pub mod formatter;
mod macros;
pub mod meta;
pub mod utils;

// === Core Traits ===
pub mod traits {
    pub use super::allocator::{FsAllocator, FsHandle};
    pub use super::extent_fs::ExtentFs;
    pub use super::fat::ClusterMeta;
    pub use super::formatter::FsFormatter;
    pub use super::meta::FsMeta;
}

// === Error types ===
pub use errors::*;

// === Volume contract types ===
pub use extent_fs::{FileMode, Lba, VolumeGeometry};

// === Utilities ===
pub use utils::{time_utils::*, volume_utils::*};
