// SPDX-License-Identifier: MIT

pub mod allocator;
pub mod attr;
pub mod constant;
mod dir;
pub mod formatter;
pub mod meta;
pub mod types;
pub mod utils;
pub mod volume;

// === Public Interface ===
pub mod traits {
    pub use super::allocator::{Fat32Allocator, Fat32Handle};
    pub use super::formatter::Fat32Formatter;
    pub use super::meta::Fat32Meta;
    pub use super::volume::{Fat32File, Fat32Volume};
}

pub mod prelude {
    pub use super::traits::*;
    pub use crate::core::errors::*;
    pub use crate::core::traits::*;
    pub use crate::core::{FileMode, VolumeGeometry};
    pub use flashio::prelude::*;
}
