// SPDX-License-Identifier: MIT

use flashio::{BlockIO, BlockIOExt, BlockIOStructExt};

pub use crate::core::formatter::*;

use crate::{
    core::fat::chain,
    fs::fat32::{constant::*, meta::*, types::*},
};

/// Fat32Formatter:
/// - Quick format: VBR (+ backup), FSInfo (+ backup), both FATs, root directory.
/// - The root directory holds only the volume label entry.
/// - `full_format` additionally zeroes the whole cluster heap.
pub struct Fat32Formatter<'a, IO: BlockIO + ?Sized> {
    io: &'a mut IO,
    meta: &'a Fat32Meta,
}

impl<'a, IO: BlockIO + ?Sized> Fat32Formatter<'a, IO> {
    pub fn new(io: &'a mut IO, meta: &'a Fat32Meta) -> Self {
        Self { io, meta }
    }

    #[inline]
    fn sector_offset(&self, sector: u64) -> u64 {
        sector * self.meta.bytes_per_sector as u64
    }

    fn write_vbr(&mut self) -> FsFormatterResult {
        let vbr = Fat32Vbr::from_meta(self.meta);

        self.io.write_struct(self.sector_offset(FAT_VBR_SECTOR), &vbr)?;
        self.io
            .write_struct(self.sector_offset(FAT_VBR_BACKUP_SECTOR), &vbr)?;

        Ok(())
    }

    fn write_fsinfo(&mut self) -> FsFormatterResult {
        let fsinfo = Fat32FsInfo::from_meta(self.meta);

        self.io
            .write_struct(self.sector_offset(FAT_FSINFO_SECTOR), &fsinfo)?;
        self.io
            .write_struct(self.sector_offset(FAT_FSINFO_BACKUP_SECTOR), &fsinfo)?;

        Ok(())
    }

    fn write_fat_region(&mut self) -> FsFormatterResult {
        let fat_bytes = self.meta.fat_size_sectors as u64 * self.meta.bytes_per_sector as u64;
        for fat_index in 0..self.meta.num_fats {
            let offset = self.meta.fat_offset_bytes + fat_index as u64 * fat_bytes;

            self.io.write_at(offset, FAT_RESERVED_ENTRIES)?;

            let written = FAT_RESERVED_ENTRIES.len() as u64;
            let remaining = fat_bytes.saturating_sub(written);
            self.io.zero_fill(offset + written, remaining as usize)?;
        }

        Ok(())
    }

    fn write_root_dir_cluster(&mut self) -> FsFormatterResult {
        let root = self.meta.root_unit();
        let offset = self.meta.unit_offset(root);

        self.io.zero_fill(offset, self.meta.unit_size())?;
        self.io
            .write_struct(offset, &Fat32Entry::volume_label(self.meta.volume_label))?;

        chain::write_chain(&mut *self.io, self.meta, &[root])?;
        Ok(())
    }

    fn zero_cluster_heap(&mut self) -> FsFormatterResult {
        let first = self.meta.unit_offset(self.meta.root_unit() + 1);
        let end = self.meta.unit_offset(self.meta.last_data_unit()) + self.meta.unit_size() as u64;
        let mut offset = first;
        while offset < end {
            let chunk = (end - offset).min(1 << 20);
            self.io.zero_fill(offset, chunk as usize)?;
            offset += chunk;
        }
        Ok(())
    }
}

impl<'a, IO: BlockIO + ?Sized> FsFormatter for Fat32Formatter<'a, IO> {
    fn format(&mut self, full_format: bool) -> FsFormatterResult {
        self.write_vbr()?;
        self.write_fsinfo()?;
        self.write_fat_region()?;
        self.write_root_dir_cluster()?;
        if full_format {
            self.zero_cluster_heap()?;
        }
        self.io.flush()?;
        log::debug!(
            "fat32: formatted {} clusters of {} bytes",
            self.meta.cluster_count,
            self.meta.bytes_per_cluster
        );
        Ok(())
    }
}
