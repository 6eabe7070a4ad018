// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(feature = "alloc")]
extern crate alloc;

// Core modules
pub mod command;
pub mod errors;
mod macros;
mod sector;

// Backend modules
#[cfg(feature = "mem")]
mod card;
#[cfg(feature = "mem")]
mod mem;

#[cfg(feature = "std")]
mod std;

// Prelude re-exports (central entrypoint)
pub mod prelude {
    pub use super::BlockIO;
    pub use super::BlockIOExt;
    pub use super::BlockIOStructExt;
    pub use super::command::*;
    pub use super::errors::*;
    pub use super::sector::SectorPort;

    #[cfg(feature = "mem")]
    pub use super::card::{CardPort, EmulatedCard};
    #[cfg(feature = "mem")]
    pub use super::mem::MemBlockIO;

    #[cfg(feature = "std")]
    pub use super::std::StdBlockIO;
}

// Internal use
use errors::*;

// Constants

/// Maximum size of internal scratch buffer (used for chunked ops).
/// 4 KiB = typical page size and common cluster size.
/// Safe for no_std stack usage.
pub const BLOCK_BUF_SIZE: usize = 4096;

/// Logical sector size used by SD cards in block addressing mode.
pub const SECTOR_SIZE: usize = 512;

// Traits

/// Block IO abstraction trait.
///
/// Allows read/write/flush at arbitrary byte offsets, relative to the
/// partition offset of the backend.
/// Implementations may target RAM, files, SD host controllers, etc.
pub trait BlockIO {
    /// Writes `data` at `offset` (partition relative).
    fn write_at(&mut self, offset: u64, data: &[u8]) -> BlockIOResult;

    /// Reads `buf.len()` bytes into `buf` from `offset` (partition relative).
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> BlockIOResult;

    /// Flushes any buffered data (may be a no-op).
    fn flush(&mut self) -> BlockIOResult;

    fn set_offset(&mut self, partition_offset: u64) -> u64;

    /// Absolute byte offset of the partition on the underlying medium.
    fn partition_offset(&self) -> u64;
}

/// Extension helpers for BlockIO.
///
/// - chunked writes
/// - sector-granular helpers
/// - zero fill, primitive reads/writes
pub trait BlockIOExt: BlockIO {
    /// Writes `buf.len()` bytes at `offset` in chunks of `chunk_size` or less.
    #[inline(always)]
    fn write_in_chunks(&mut self, offset: u64, buf: &[u8], chunk_size: usize) -> BlockIOResult {
        let mut remaining = buf.len();
        let mut off = offset;
        let mut pos = 0;

        while remaining > 0 {
            let to_write = remaining.min(chunk_size);
            self.write_at(off, &buf[pos..pos + to_write])?;
            off += to_write as u64;
            pos += to_write;
            remaining -= to_write;
        }

        Ok(())
    }

    /// Reads whole sectors starting at partition-relative sector `lba`.
    ///
    /// # Errors
    /// Returns `BlockIOError::Unaligned` if `buf.len()` is not a multiple of `sector_size`.
    #[inline]
    fn read_sectors(&mut self, lba: u64, buf: &mut [u8], sector_size: usize) -> BlockIOResult {
        if sector_size == 0 || !buf.len().is_multiple_of(sector_size) {
            return Err(BlockIOError::Unaligned);
        }
        self.read_at(lba * sector_size as u64, buf)
    }

    /// Writes whole sectors starting at partition-relative sector `lba`.
    ///
    /// # Errors
    /// Returns `BlockIOError::Unaligned` if `buf.len()` is not a multiple of `sector_size`.
    #[inline]
    fn write_sectors(&mut self, lba: u64, buf: &[u8], sector_size: usize) -> BlockIOResult {
        if sector_size == 0 || !buf.len().is_multiple_of(sector_size) {
            return Err(BlockIOError::Unaligned);
        }
        self.write_at(lba * sector_size as u64, buf)
    }

    /// Fills a region with zeroes.
    ///
    /// Used for FAT region clears, fresh directory clusters, etc.
    #[inline(always)]
    fn zero_fill(&mut self, offset: u64, len: usize) -> BlockIOResult {
        const ZERO_BUF: [u8; BLOCK_BUF_SIZE] = [0u8; BLOCK_BUF_SIZE];
        let mut remaining = len;
        let mut off = offset;
        while remaining > 0 {
            let chunk = remaining.min(ZERO_BUF.len());
            self.write_at(off, &ZERO_BUF[..chunk])?;
            off += chunk as u64;
            remaining -= chunk;
        }
        Ok(())
    }

    le_field_rw!(u16, u32, u64);
}

impl<T: BlockIO + ?Sized> BlockIOExt for T {}

/// Extension trait for reading and writing on-disk structs using zerocopy.
pub trait BlockIOStructExt: BlockIO {
    /// Reads a struct of type `T` from the given offset.
    fn read_struct<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
    ) -> BlockIOResult<T> {
        let size = core::mem::size_of::<T>();
        if size > BLOCK_BUF_SIZE {
            return Err(BlockIOError::Other("read_struct: type too large"));
        }
        let mut buf = [0u8; BLOCK_BUF_SIZE];
        self.read_at(offset, &mut buf[..size])?;
        T::read_from_bytes(&buf[..size]).map_err(|_| BlockIOError::Other("read_struct failed"))
    }

    /// Writes a struct of type `T` at the given offset.
    fn write_struct<T: zerocopy::IntoBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        offset: u64,
        val: &T,
    ) -> BlockIOResult {
        self.write_at(offset, val.as_bytes())
    }
}

impl<T: BlockIO + ?Sized> BlockIOStructExt for T {}
