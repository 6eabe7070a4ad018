// SPDX-License-Identifier: MIT

//! Contiguous, pre-erased file extents for raw sequential capture.
//!
//! A file is reserved as one run of clusters through an [`ExtentFs`],
//! its header written through the filesystem, its first cluster turned
//! into an absolute sector, and everything past the header erased with
//! CMD32/CMD33/CMD38 before any payload goes out as raw block writes.
//!
//! [`ExtentFs`]: crate::core::traits::ExtentFs

pub mod erase;
pub mod errors;
pub mod preparer;
pub mod range;
pub mod resolver;
pub mod writer;

pub use crate::core::Lba;
pub use erase::{EraseSequence, EraseStage, EraseState, erase_sectors};
pub use errors::{ExtentError, ExtentResult};
pub use preparer::{
    ExtentPreparer, ExtentRequest, FileExtentHandle, PrepFailure, PrepStage, PrepState,
    prepare_extent,
};
pub use range::SectorRange;
pub use resolver::{resolve_extent, resolve_first_sector};
pub use writer::ExtentWriter;
