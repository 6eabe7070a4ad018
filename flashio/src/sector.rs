// SPDX-License-Identifier: MIT

//! Raw block access over a plain [`BlockIO`].
//!
//! Lets the capture path target an image file or any byte-addressed
//! medium that has no command channel of its own.

use crate::{BlockIO, BlockIOExt, command::*, errors::*};

/// Absolute-LBA block writer on top of a partition-relative [`BlockIO`].
#[derive(Debug)]
pub struct SectorPort<IO: BlockIO> {
    io: IO,
    sector_size: usize,
}

impl<IO: BlockIO> SectorPort<IO> {
    pub fn new(io: IO, sector_size: usize) -> Self {
        Self { io, sector_size }
    }

    pub fn into_inner(self) -> IO {
        self.io
    }

    /// Maps an absolute LBA onto the backend's partition-relative sectors.
    fn relative_lba(&self, lba: u32) -> CommandResult<u64> {
        if self.sector_size == 0 {
            return Err(CommandError::IO(BlockIOError::Unaligned));
        }
        let ss = self.sector_size as u64;
        let rel = (lba as u64 * ss)
            .checked_sub(self.io.partition_offset())
            .ok_or(CommandError::OutOfRange)?;
        if rel % ss != 0 {
            return Err(CommandError::IO(BlockIOError::Unaligned));
        }
        Ok(rel / ss)
    }

    /// Reads whole blocks starting at absolute `lba`.
    pub fn read_blocks(&mut self, lba: u32, buf: &mut [u8]) -> CommandResult {
        let rel = self.relative_lba(lba)?;
        Ok(self.io.read_sectors(rel, buf, self.sector_size)?)
    }
}

impl<IO: BlockIO> RawBlockWriter for SectorPort<IO> {
    fn block_size(&self) -> usize {
        self.sector_size
    }

    fn write_blocks(&mut self, lba: u32, data: &[u8]) -> CommandResult {
        if data.is_empty() {
            return Err(CommandError::IO(BlockIOError::Unaligned));
        }
        let rel = self.relative_lba(lba)?;
        self.io.write_sectors(rel, data, self.sector_size)?;
        Ok(self.io.flush()?)
    }
}
