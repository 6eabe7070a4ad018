// SPDX-License-Identifier: MIT

//! Directory scanning and path resolution for a mounted volume.

use alloc::{vec, vec::Vec};

use flashio::{BlockIO, BlockIOExt, BlockIOStructExt};
use zerocopy::FromBytes;

use crate::{
    core::{errors::*, fat::chain},
    fs::fat32::{
        allocator::*, constant::*, meta::*, types::Fat32Entry, utils::short_name,
        volume::Mounted,
    },
};

/// A directory entry together with its byte offset on the volume.
#[derive(Debug, Clone, Copy)]
pub(super) struct DirSlot {
    pub offset: u64,
    pub entry: Fat32Entry,
}

impl Mounted {
    /// Directory clusters stored as `0` in `..` entries stand for the root.
    #[inline]
    pub(super) fn dir_cluster(&self, stored: u32) -> u32 {
        if stored == 0 {
            self.meta.root_unit()
        } else {
            stored
        }
    }

    fn read_dir_cluster<IO: BlockIO + ?Sized>(
        &self,
        io: &mut IO,
        cluster: u32,
        buf: &mut [u8],
    ) -> FsVolumeResult<u64> {
        let base = self.meta.unit_offset(cluster);
        io.read_at(base, buf)?;
        Ok(base)
    }

    /// Looks up a live short-name entry in `dir`.
    pub(super) fn find_entry<IO: BlockIO + ?Sized>(
        &self,
        io: &mut IO,
        dir: u32,
        name: &[u8; 11],
    ) -> FsVolumeResult<Option<DirSlot>> {
        let clusters = chain::read_chain(io, &self.meta, dir)?;
        let mut buf = vec![0u8; self.meta.unit_size()];

        for cluster in clusters {
            let base = self.read_dir_cluster(io, cluster, &mut buf)?;
            for (i, raw) in buf.chunks_exact(FAT_DIR_ENTRY_SIZE).enumerate() {
                let entry = Fat32Entry::read_from_bytes(raw)
                    .map_err(|_| FsVolumeError::Corrupted("bad directory entry"))?;
                if entry.is_end_of_dir() {
                    return Ok(None);
                }
                if entry.is_named() && entry.name == *name {
                    return Ok(Some(DirSlot {
                        offset: base + (i * FAT_DIR_ENTRY_SIZE) as u64,
                        entry,
                    }));
                }
            }
        }
        Ok(None)
    }

    /// Offset of the first reusable slot in `dir`, growing the directory by
    /// one zeroed cluster when every slot is taken.
    pub(super) fn free_slot<IO: BlockIO + ?Sized>(
        &mut self,
        io: &mut IO,
        dir: u32,
    ) -> FsVolumeResult<u64> {
        let clusters = chain::read_chain(io, &self.meta, dir)?;
        let mut buf = vec![0u8; self.meta.unit_size()];

        for &cluster in &clusters {
            let base = self.read_dir_cluster(io, cluster, &mut buf)?;
            for (i, raw) in buf.chunks_exact(FAT_DIR_ENTRY_SIZE).enumerate() {
                if raw[0] == FAT_ENTRY_END_OF_DIR || raw[0] == FAT_ENTRY_DELETED {
                    return Ok(base + (i * FAT_DIR_ENTRY_SIZE) as u64);
                }
            }
        }

        let last = *clusters
            .last()
            .ok_or(FsVolumeError::Corrupted("empty directory chain"))?;
        let (cluster, next_free) = {
            let mut alloc = Fat32Allocator::with_hint(&mut *io, &self.meta, self.next_free);
            let cluster = alloc.extend_chain(last)?;
            (cluster, alloc.next_free())
        };
        self.note_allocated(next_free, 1);

        let offset = self.meta.unit_offset(cluster);
        io.zero_fill(offset, self.meta.unit_size())?;
        Ok(offset)
    }

    /// Follows one path component from `dir`.
    fn enter<IO: BlockIO + ?Sized>(&self, io: &mut IO, dir: u32, component: &str) -> FsVolumeResult<u32> {
        match component {
            "." => Ok(dir),
            ".." if dir == self.meta.root_unit() => Ok(dir),
            ".." => {
                let slot = self
                    .find_entry(io, dir, FAT_DOTDOT_NAME)?
                    .ok_or(FsVolumeError::Corrupted("directory without '..' entry"))?;
                Ok(self.dir_cluster(slot.entry.first_cluster()))
            }
            name => {
                let sfn = short_name(name)?;
                let slot = self
                    .find_entry(io, dir, &sfn)?
                    .ok_or(FsVolumeError::NotFound)?;
                if !slot.entry.is_dir() {
                    return Err(FsVolumeError::NotADirectory);
                }
                Ok(self.dir_cluster(slot.entry.first_cluster()))
            }
        }
    }

    fn split_path<'p>(&self, path: &'p str) -> (u32, Vec<&'p str>) {
        let start = if path.starts_with('/') {
            self.meta.root_unit()
        } else {
            self.cwd
        };
        let parts = path.split('/').filter(|c| !c.is_empty()).collect();
        (start, parts)
    }

    /// Resolves every component of `path` as a directory.
    pub(super) fn resolve_dir<IO: BlockIO + ?Sized>(&self, io: &mut IO, path: &str) -> FsVolumeResult<u32> {
        let (mut dir, parts) = self.split_path(path);
        for part in parts {
            dir = self.enter(io, dir, part)?;
        }
        Ok(dir)
    }

    /// Splits `path` into its parent directory cluster and final name.
    pub(super) fn resolve_parent<'p, IO: BlockIO + ?Sized>(
        &self,
        io: &mut IO,
        path: &'p str,
    ) -> FsVolumeResult<(u32, &'p str)> {
        let (mut dir, mut parts) = self.split_path(path);
        let name = parts.pop().ok_or(FsVolumeError::InvalidName)?;
        for part in parts {
            dir = self.enter(io, dir, part)?;
        }
        Ok((dir, name))
    }

    /// Existing entry named by `path`.
    pub(super) fn lookup<IO: BlockIO + ?Sized>(&self, io: &mut IO, path: &str) -> FsVolumeResult<DirSlot> {
        let (dir, name) = self.resolve_parent(io, path)?;
        let sfn = short_name(name)?;
        self.find_entry(io, dir, &sfn)?.ok_or(FsVolumeError::NotFound)
    }

    /// Creates a subdirectory of `parent` with its `.` and `..` entries.
    pub(super) fn create_dir<IO: BlockIO + ?Sized>(
        &mut self,
        io: &mut IO,
        parent: u32,
        name: [u8; 11],
    ) -> FsVolumeResult<u32> {
        let slot = self.free_slot(io, parent)?;

        let (cluster, next_free) = {
            let mut alloc = Fat32Allocator::with_hint(&mut *io, &self.meta, self.next_free);
            let handle = alloc.allocate_unit()?;
            (handle.first_cluster, alloc.next_free())
        };
        self.note_allocated(next_free, 1);

        let offset = self.meta.unit_offset(cluster);
        io.zero_fill(offset, self.meta.unit_size())?;
        io.write_struct(offset, &Fat32Entry::dot(cluster))?;

        let stored_parent = if parent == self.meta.root_unit() { 0 } else { parent };
        io.write_struct(offset + FAT_DIR_ENTRY_SIZE as u64, &Fat32Entry::dotdot(stored_parent))?;

        io.write_struct(slot, &Fat32Entry::dir(name, cluster))?;
        Ok(cluster)
    }
}
