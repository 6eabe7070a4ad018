// SPDX-License-Identifier: MIT

//! The filesystem contract used by extent preparation.

use core::fmt;

use crate::core::errors::FsResult;

/// Sector address on the raw medium.
pub type Lba = u32;

/// How a file is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileMode {
    /// Existing file, read only.
    Read,
    /// Create, or truncate an existing file to zero length.
    #[default]
    Write,
    /// Create if missing, position at the end otherwise.
    Append,
}

impl FileMode {
    #[inline]
    pub fn is_writable(self) -> bool {
        !matches!(self, FileMode::Read)
    }
}

/// Layout constants of a mounted volume, as needed to turn clusters into sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VolumeGeometry {
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u32,
    /// Absolute sector of cluster 2 on the medium (partition offset included).
    pub data_region_base: Lba,
    /// Number of data clusters.
    pub cluster_count: u32,
}

impl VolumeGeometry {
    #[inline]
    pub fn cluster_bytes(&self) -> u64 {
        self.bytes_per_sector as u64 * self.sectors_per_cluster as u64
    }
}

/// Filesystem operations the extent preparer depends on.
///
/// Files are addressed through an opaque, copyable handle owned by the
/// implementation's open-file table.
pub trait ExtentFs {
    type File: Copy + Eq + fmt::Debug;

    fn is_mounted(&self) -> bool;

    fn geometry(&self) -> FsResult<VolumeGeometry>;

    fn open(&mut self, path: &str, mode: FileMode) -> FsResult<Self::File>;

    /// Reserves `total_bytes` for an empty file as one run of clusters and
    /// sets the file size to `total_bytes`.
    fn allocate_contiguous(&mut self, file: Self::File, total_bytes: u64) -> FsResult;

    fn is_contiguous(&mut self, file: Self::File) -> FsResult<bool>;

    /// Writes at the current position; returns how many bytes were accepted.
    fn write(&mut self, file: Self::File, data: &[u8]) -> FsResult<usize>;

    /// Commits the file's directory entry and any cached metadata to the medium.
    fn flush(&mut self, file: Self::File) -> FsResult;

    fn seek(&mut self, file: Self::File, offset: u64) -> FsResult;

    /// First cluster of the file's chain (`0` when nothing is allocated).
    fn first_cluster(&self, file: Self::File) -> FsResult<u32>;

    /// Shrinks the file to `len` bytes, releasing clusters past the new end.
    fn set_len(&mut self, file: Self::File, len: u64) -> FsResult;

    fn close(&mut self, file: Self::File) -> FsResult;
}
