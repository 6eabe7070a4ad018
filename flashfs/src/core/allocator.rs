// SPDX-License-Identifier: MIT

pub use crate::core::errors::{FsAllocatorError, FsAllocatorResult};

/// Trait implemented by all FS allocation handles.
///
/// Example: cluster run handle, block handle, etc.
pub trait FsHandle {}

/// Trait for managing allocation of logical units in a filesystem.
///
/// - `Handle` is a handle representing an allocated run of units
pub trait FsAllocator<Handle: FsHandle + Sized + Clone> {
    /// Allocate `count` units as one physically contiguous run.
    ///
    /// Fails with [`FsAllocatorError::NoContiguousRun`] when free space exists
    /// but is too fragmented, [`FsAllocatorError::OutOfBlocks`] when it does not.
    fn allocate_contiguous(&mut self, count: usize) -> FsAllocatorResult<Handle>;

    /// Allocate a single unit and return its handle.
    fn allocate_unit(&mut self) -> FsAllocatorResult<Handle> {
        self.allocate_contiguous(1)
    }

    /// Return every unit of `handle` to the free pool.
    fn release(&mut self, handle: &Handle) -> FsAllocatorResult;

    /// Number of units currently free.
    fn free_units(&mut self) -> FsAllocatorResult<usize>;
}
