// SPDX-License-Identifier: MIT

use flashio::command::RawBlockWriter;

use crate::{
    core::Lba,
    extent::{errors::*, range::SectorRange},
};

/// Sequential cursor over a pre-erased sector range.
///
/// Takes whole sectors only and never writes outside the range. A failed
/// block write leaves the cursor where it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtentWriter {
    range: SectorRange,
    bytes_per_sector: u16,
    sectors_written: u64,
}

impl ExtentWriter {
    pub fn new(range: SectorRange, bytes_per_sector: u16) -> Self {
        Self {
            range,
            bytes_per_sector,
            sectors_written: 0,
        }
    }

    #[inline]
    pub fn range(&self) -> SectorRange {
        self.range
    }

    #[inline]
    pub fn sectors_written(&self) -> u64 {
        self.sectors_written
    }

    #[inline]
    pub fn bytes_written(&self) -> u64 {
        self.sectors_written * self.bytes_per_sector as u64
    }

    pub fn remaining_bytes(&self) -> u64 {
        (self.range.len() - self.sectors_written) * self.bytes_per_sector as u64
    }

    /// Sector the next write lands on, `None` once the range is full.
    pub fn next_lba(&self) -> Option<Lba> {
        if self.is_full() {
            return None;
        }
        Some(self.range.start() + self.sectors_written as u32)
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.sectors_written >= self.range.len()
    }

    /// Writes `data` at the cursor with one multi-block write.
    pub fn write<W: RawBlockWriter + ?Sized>(&mut self, dev: &mut W, data: &[u8]) -> ExtentResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let bps = self.bytes_per_sector as usize;
        if bps == 0 || dev.block_size() != bps {
            return Err(ExtentError::InvalidVolumeState(
                "device block size differs from volume sector size",
            ));
        }
        if !data.len().is_multiple_of(bps) {
            return Err(ExtentError::UnalignedWrite(data.len()));
        }

        let sectors = (data.len() / bps) as u64;
        let remaining = self.range.len() - self.sectors_written;
        if sectors > remaining {
            return Err(ExtentError::ExtentExhausted {
                requested: data.len() as u64,
                remaining: remaining * bps as u64,
            });
        }

        let lba = self.range.start() + self.sectors_written as u32;
        dev.write_blocks(lba, data)
            .map_err(|cause| ExtentError::RawWriteFailed { lba, cause })?;
        self.sectors_written += sectors;

        log::trace!("extent: wrote {sectors} sectors at {lba}");
        Ok(data.len())
    }
}
