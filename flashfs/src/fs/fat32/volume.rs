// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

use flashio::{BlockIO, BlockIOExt, BlockIOStructExt};
use time::PrimitiveDateTime;

use crate::{
    core::{
        errors::*,
        extent_fs::{ExtentFs, FileMode, VolumeGeometry},
        fat::{ClusterMeta, chain},
    },
    fs::fat32::{
        allocator::*, attr::Fat32Attributes, constant::*, meta::*, types::*, utils,
    },
};

/// Handle onto an open file of a [`Fat32Volume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fat32File(u32);

#[derive(Debug)]
struct OpenFile {
    id: u32,
    mode: FileMode,
    /// Byte offset of the file's directory entry.
    entry_offset: u64,
    first_cluster: u32,
    size: u32,
    position: u32,
    chain: Vec<u32>,
    dirty: bool,
}

/// State that only exists while a volume is mounted.
#[derive(Debug)]
pub(super) struct Mounted {
    pub(super) meta: Fat32Meta,
    pub(super) cwd: u32,
    pub(super) next_free: u32,
    free_count: Option<u32>,
    /// FSInfo signatures were intact at mount.
    fsinfo_valid: bool,
    fsinfo_dirty: bool,
    files: Vec<OpenFile>,
}

impl Mounted {
    pub(super) fn note_allocated(&mut self, next_free: u32, clusters: u32) {
        self.next_free = next_free;
        if let Some(free) = self.free_count.as_mut() {
            *free = free.saturating_sub(clusters);
        }
        self.fsinfo_dirty = true;
    }

    fn note_released(&mut self, next_free: u32, clusters: u32) {
        self.next_free = next_free;
        if let Some(free) = self.free_count.as_mut() {
            *free = free.saturating_add(clusters).min(self.meta.cluster_count);
        }
        self.fsinfo_dirty = true;
    }

    fn is_open(&self, entry_offset: u64) -> bool {
        self.files.iter().any(|f| f.entry_offset == entry_offset)
    }

    fn file(&self, id: Fat32File) -> FsVolumeResult<&OpenFile> {
        self.files
            .iter()
            .find(|f| f.id == id.0)
            .ok_or(FsVolumeError::InvalidHandle)
    }

    /// Runs `op` with the file temporarily taken out of the table.
    fn with_file<R>(
        &mut self,
        id: Fat32File,
        op: impl FnOnce(&mut Self, &mut OpenFile) -> FsVolumeResult<R>,
    ) -> FsVolumeResult<R> {
        let pos = self
            .files
            .iter()
            .position(|f| f.id == id.0)
            .ok_or(FsVolumeError::InvalidHandle)?;
        let mut file = self.files.swap_remove(pos);
        let res = op(self, &mut file);
        self.files.push(file);
        res
    }

    fn release<IO: BlockIO + ?Sized>(&mut self, io: &mut IO, clusters: &[u32]) -> FsVolumeResult {
        if clusters.is_empty() {
            return Ok(());
        }
        let next_free = {
            let mut alloc = Fat32Allocator::with_hint(&mut *io, &self.meta, self.next_free);
            alloc.release_chain(clusters)?;
            alloc.next_free()
        };
        self.note_released(next_free, clusters.len() as u32);
        Ok(())
    }

    /// Appends one cluster to the file's chain.
    fn grow<IO: BlockIO + ?Sized>(&mut self, io: &mut IO, file: &mut OpenFile) -> FsVolumeResult {
        let (cluster, next_free) = {
            let mut alloc = Fat32Allocator::with_hint(&mut *io, &self.meta, self.next_free);
            let cluster = match file.chain.last() {
                Some(&last) => alloc.extend_chain(last)?,
                None => alloc.allocate_unit()?.first_cluster,
            };
            (cluster, alloc.next_free())
        };
        self.note_allocated(next_free, 1);

        if file.chain.is_empty() {
            file.first_cluster = cluster;
        }
        file.chain.push(cluster);
        Ok(())
    }

    fn truncate<IO: BlockIO + ?Sized>(&mut self, io: &mut IO, file: &mut OpenFile, len: u32) -> FsVolumeResult {
        let keep = self.meta.clusters_for(len as u64) as usize;
        if keep < file.chain.len() {
            let tail = file.chain.split_off(keep);
            match file.chain.last() {
                Some(&last) => chain::write_entry(&mut *io, &self.meta, last, Fat32Meta::EOC)?,
                None => file.first_cluster = 0,
            }
            self.release(io, &tail)?;
        }
        file.size = len;
        file.position = file.position.min(len);
        file.dirty = true;
        Ok(())
    }

    fn write<IO: BlockIO + ?Sized>(&mut self, io: &mut IO, file: &mut OpenFile, data: &[u8]) -> FsVolumeResult<usize> {
        if !file.mode.is_writable() {
            return Err(FsVolumeError::ReadOnly);
        }
        let cb = self.meta.bytes_per_cluster as u64;
        let room = (FAT_MAX_FILE_SIZE - file.position as u64).min(data.len() as u64) as usize;
        let data = &data[..room];

        let mut done = 0usize;
        while done < data.len() {
            let pos = file.position as u64;
            let idx = (pos / cb) as usize;
            let within = pos % cb;

            if idx >= file.chain.len() {
                match self.grow(io, file) {
                    Ok(()) => {}
                    // Volume full: short write, like any other filesystem.
                    Err(FsVolumeError::Allocator(
                        FsAllocatorError::OutOfBlocks | FsAllocatorError::NoContiguousRun,
                    )) => break,
                    Err(e) => return Err(e),
                }
            }

            let cluster = *file
                .chain
                .get(idx)
                .ok_or(FsVolumeError::Corrupted("cluster chain shorter than file"))?;
            let n = (cb - within).min((data.len() - done) as u64) as usize;
            io.write_at(self.meta.unit_offset(cluster) + within, &data[done..done + n])?;

            done += n;
            file.position += n as u32;
            file.size = file.size.max(file.position);
            file.dirty = true;
        }
        Ok(done)
    }

    fn read<IO: BlockIO + ?Sized>(&self, io: &mut IO, file: &mut OpenFile, buf: &mut [u8]) -> FsVolumeResult<usize> {
        let cb = self.meta.bytes_per_cluster as u64;
        let avail = file.size.saturating_sub(file.position) as usize;
        let total = buf.len().min(avail);

        let mut done = 0usize;
        while done < total {
            let pos = file.position as u64;
            let cluster = *file
                .chain
                .get((pos / cb) as usize)
                .ok_or(FsVolumeError::Corrupted("cluster chain shorter than file"))?;
            let within = pos % cb;
            let n = (cb - within).min((total - done) as u64) as usize;
            io.read_at(self.meta.unit_offset(cluster) + within, &mut buf[done..done + n])?;

            done += n;
            file.position += n as u32;
        }
        Ok(done)
    }

    fn sync_fsinfo<IO: BlockIO + ?Sized>(&mut self, io: &mut IO) -> FsVolumeResult {
        if self.fsinfo_dirty {
            let base = self.meta.fsinfo_offset();
            let free = self.free_count.unwrap_or(FAT_FSINFO_FREE_COUNT_UNKNOWN);
            if self.fsinfo_valid {
                io.write_le_u32(base + FAT_FSINFO_FREE_COUNT_OFFSET, free)?;
                io.write_le_u32(base + FAT_FSINFO_NEXT_FREE_OFFSET, self.next_free)?;
            } else {
                io.write_struct(base, &Fat32FsInfo::new(free, self.next_free))?;
                self.fsinfo_valid = true;
            }
            self.fsinfo_dirty = false;
        }
        Ok(())
    }

    /// Writes size, first cluster and modification time back to the directory entry.
    fn sync_file<IO: BlockIO + ?Sized>(&mut self, io: &mut IO, file: &mut OpenFile) -> FsVolumeResult {
        if file.dirty {
            let mut entry: Fat32Entry = io.read_struct(file.entry_offset)?;
            entry.set_first_cluster(file.first_cluster);
            entry.file_size = file.size;
            entry.attr |= Fat32Attributes::ARCHIVE.bits();
            let (date, time, _) = utils::datetime_now();
            entry.set_modified(date, time);
            io.write_struct(file.entry_offset, &entry)?;
            file.dirty = false;
        }
        self.sync_fsinfo(io)?;
        io.flush()?;
        Ok(())
    }
}

/// A FAT32 volume on top of any [`BlockIO`].
///
/// Owns the medium and keeps a table of open files addressed by
/// [`Fat32File`] handles. Metadata changes reach the medium on `flush`,
/// `close` and `unmount`.
#[derive(Debug)]
pub struct Fat32Volume<IO: BlockIO> {
    io: IO,
    state: Option<Mounted>,
    next_id: u32,
}

impl<IO: BlockIO> Fat32Volume<IO> {
    /// Wraps a medium without mounting it.
    pub fn new(io: IO) -> Self {
        Self {
            io,
            state: None,
            next_id: 1,
        }
    }

    /// `new` followed by `mount`.
    pub fn open_volume(io: IO) -> FsVolumeResult<Self> {
        let mut volume = Self::new(io);
        volume.mount()?;
        Ok(volume)
    }

    /// Reads the boot sector and FSInfo. Mounting twice is a no-op.
    pub fn mount(&mut self) -> FsVolumeResult {
        if self.state.is_some() {
            return Ok(());
        }
        let vbr: Fat32Vbr = self.io.read_struct(FAT_VBR_SECTOR)?;
        let meta = Fat32Meta::from_vbr(&vbr)?;

        let info: Fat32FsInfo = self.io.read_struct(meta.fsinfo_offset())?;
        let fsinfo_valid = info.is_valid();
        let (free_count, next_free) = if fsinfo_valid {
            let free = Some(info.free_cluster_count).filter(|&n| n <= meta.cluster_count);
            (free, info.next_free_cluster)
        } else {
            (None, meta.first_data_unit())
        };
        let next_free = if meta.is_valid_unit(next_free) {
            next_free
        } else {
            meta.first_data_unit()
        };

        log::info!(
            "fat32: mounted {} clusters of {} bytes at byte {}",
            meta.cluster_count,
            meta.bytes_per_cluster,
            self.io.partition_offset()
        );

        self.state = Some(Mounted {
            cwd: meta.root_unit(),
            meta,
            next_free,
            free_count,
            fsinfo_valid,
            fsinfo_dirty: false,
            files: Vec::new(),
        });
        Ok(())
    }

    /// Syncs every open file and the FSInfo sector, then forgets the volume.
    ///
    /// The volume is unmounted even when syncing fails; the first error is returned.
    pub fn unmount(&mut self) -> FsVolumeResult {
        let Some(mut m) = self.state.take() else {
            return Err(FsVolumeError::NotMounted);
        };
        let mut result = Ok(());
        let files = core::mem::take(&mut m.files);
        for mut file in files {
            if let Err(e) = m.sync_file(&mut self.io, &mut file) {
                result = result.and(Err(e));
            }
        }
        if let Err(e) = m.sync_fsinfo(&mut self.io) {
            result = result.and(Err(e));
        }
        if let Err(e) = self.io.flush() {
            result = result.and(Err(e.into()));
        }
        log::debug!("fat32: unmounted");
        result
    }

    #[inline]
    pub fn is_mounted(&self) -> bool {
        self.state.is_some()
    }

    /// Layout of the mounted volume.
    pub fn meta(&self) -> Option<&Fat32Meta> {
        self.state.as_ref().map(|m| &m.meta)
    }

    pub fn inner(&self) -> &IO {
        &self.io
    }

    /// Gives the medium back. Nothing is synced; call [`unmount`](Self::unmount) first.
    pub fn into_inner(self) -> IO {
        self.io
    }

    fn mounted(&self) -> FsVolumeResult<&Mounted> {
        self.state.as_ref().ok_or(FsVolumeError::NotMounted)
    }

    fn parts(&mut self) -> FsVolumeResult<(&mut IO, &mut Mounted)> {
        let Self { io, state, .. } = self;
        let m = state.as_mut().ok_or(FsVolumeError::NotMounted)?;
        Ok((io, m))
    }

    pub fn geometry(&self) -> FsVolumeResult<VolumeGeometry> {
        self.mounted()?.meta.geometry(self.io.partition_offset())
    }

    /// Capacity of the data region.
    pub fn disk_size_bytes(&self) -> FsVolumeResult<u64> {
        let meta = &self.mounted()?.meta;
        Ok(meta.cluster_count as u64 * meta.bytes_per_cluster as u64)
    }

    /// Free clusters, in bytes. Counts the FAT once when FSInfo had no valid count.
    pub fn free_space_bytes(&mut self) -> FsVolumeResult<u64> {
        let (io, m) = self.parts()?;
        let free = match m.free_count {
            Some(free) => free,
            None => {
                let free = chain::count_free(io, &m.meta)?;
                m.free_count = Some(free);
                m.fsinfo_dirty = true;
                free
            }
        };
        Ok(free as u64 * m.meta.bytes_per_cluster as u64)
    }

    pub fn mkdir(&mut self, path: &str) -> FsVolumeResult {
        let (io, m) = self.parts()?;
        let (parent, name) = m.resolve_parent(io, path)?;
        let sfn = utils::short_name(name)?;
        if m.find_entry(io, parent, &sfn)?.is_some() {
            return Err(FsVolumeError::AlreadyExists);
        }
        m.create_dir(io, parent, sfn)?;
        io.flush()?;
        Ok(())
    }

    /// Changes the directory relative paths start from.
    pub fn chdir(&mut self, path: &str) -> FsVolumeResult {
        let (io, m) = self.parts()?;
        m.cwd = m.resolve_dir(io, path)?;
        Ok(())
    }

    pub fn open(&mut self, path: &str, mode: FileMode) -> FsVolumeResult<Fat32File> {
        let id = self.next_id;
        let (io, m) = self.parts()?;
        let (dir, name) = m.resolve_parent(io, path)?;
        let sfn = utils::short_name(name)?;

        let (entry_offset, entry) = match m.find_entry(io, dir, &sfn)? {
            Some(slot) => {
                if slot.entry.is_dir() {
                    return Err(FsVolumeError::NotAFile);
                }
                if m.is_open(slot.offset) {
                    return Err(FsVolumeError::AlreadyOpen);
                }
                if mode.is_writable() && slot.entry.attr & Fat32Attributes::READ_ONLY.bits() != 0 {
                    return Err(FsVolumeError::Denied);
                }
                (slot.offset, slot.entry)
            }
            None if mode.is_writable() => {
                let offset = m.free_slot(io, dir)?;
                let entry = Fat32Entry::file(sfn);
                io.write_struct(offset, &entry)?;
                (offset, entry)
            }
            None => return Err(FsVolumeError::NotFound),
        };

        let first_cluster = entry.first_cluster();
        let chain = if first_cluster != 0 {
            chain::read_chain(io, &m.meta, first_cluster)?
        } else {
            Vec::new()
        };
        // Write mode truncates below, so only a file that keeps its size must fit its chain.
        if mode != FileMode::Write {
            let covered = chain.len() as u64 * m.meta.bytes_per_cluster as u64;
            crate::ensure!(
                entry.file_size as u64 <= covered,
                FsVolumeError::Corrupted("cluster chain shorter than file")
            );
        }
        let mut file = OpenFile {
            id,
            mode,
            entry_offset,
            first_cluster,
            size: entry.file_size,
            position: 0,
            chain,
            dirty: false,
        };

        match mode {
            FileMode::Write if file.size != 0 || file.first_cluster != 0 => {
                m.truncate(io, &mut file, 0)?;
            }
            FileMode::Append => file.position = file.size,
            _ => {}
        }

        m.files.push(file);
        self.next_id = self.next_id.wrapping_add(1).max(1);
        Ok(Fat32File(id))
    }

    pub fn read(&mut self, file: Fat32File, buf: &mut [u8]) -> FsVolumeResult<usize> {
        let (io, m) = self.parts()?;
        m.with_file(file, |m, f| m.read(io, f, buf))
    }

    /// Writes at the current position, growing the chain as needed.
    ///
    /// Returns fewer bytes than requested when the volume runs out of space.
    pub fn write(&mut self, file: Fat32File, data: &[u8]) -> FsVolumeResult<usize> {
        let (io, m) = self.parts()?;
        m.with_file(file, |m, f| m.write(io, f, data))
    }

    /// Moves the position; seeking past the end of the file is refused.
    pub fn seek(&mut self, file: Fat32File, offset: u64) -> FsVolumeResult {
        let (_, m) = self.parts()?;
        m.with_file(file, |_, f| {
            crate::ensure!(offset <= f.size as u64, FsVolumeError::InvalidOffset);
            f.position = offset as u32;
            Ok(())
        })
    }

    pub fn position(&self, file: Fat32File) -> FsVolumeResult<u64> {
        Ok(self.mounted()?.file(file)?.position as u64)
    }

    pub fn size(&self, file: Fat32File) -> FsVolumeResult<u64> {
        Ok(self.mounted()?.file(file)?.size as u64)
    }

    /// First cluster of the file's chain, `0` for an empty file.
    pub fn first_cluster(&self, file: Fat32File) -> FsVolumeResult<u32> {
        Ok(self.mounted()?.file(file)?.first_cluster)
    }

    pub fn flush(&mut self, file: Fat32File) -> FsVolumeResult {
        let (io, m) = self.parts()?;
        m.with_file(file, |m, f| m.sync_file(io, f))
    }

    /// Flushes and releases the handle.
    pub fn close(&mut self, file: Fat32File) -> FsVolumeResult {
        let (io, m) = self.parts()?;
        m.with_file(file, |m, f| m.sync_file(io, f))?;
        m.files.retain(|f| f.id != file.0);
        Ok(())
    }

    /// Shrinks the file to `len` bytes and frees the clusters past it.
    pub fn set_len(&mut self, file: Fat32File, len: u64) -> FsVolumeResult {
        let (io, m) = self.parts()?;
        m.with_file(file, |m, f| {
            crate::ensure!(f.mode.is_writable(), FsVolumeError::ReadOnly);
            crate::ensure!(len <= f.size as u64, FsVolumeError::InvalidOffset);
            m.truncate(io, f, len as u32)
        })
    }

    /// Reserves `total_bytes` for an empty file as one contiguous run and
    /// sets its size to `total_bytes`.
    ///
    /// The file must be open for writing and hold no data yet.
    pub fn allocate_contiguous(&mut self, file: Fat32File, total_bytes: u64) -> FsVolumeResult {
        let (io, m) = self.parts()?;
        m.with_file(file, |m, f| {
            crate::ensure!(f.mode.is_writable(), FsVolumeError::ReadOnly);
            crate::ensure!(f.size == 0 && f.first_cluster == 0, FsVolumeError::Denied);
            crate::ensure!(total_bytes != 0, FsVolumeError::Invalid("zero-length allocation"));
            crate::ensure!(total_bytes <= FAT_MAX_FILE_SIZE, FsVolumeError::TooLarge);

            let count = m.meta.clusters_for(total_bytes) as usize;
            let (handle, next_free) = {
                let mut alloc = Fat32Allocator::with_hint(&mut *io, &m.meta, m.next_free);
                let handle = alloc.allocate_contiguous(count)?;
                (handle, alloc.next_free())
            };
            m.note_allocated(next_free, handle.cluster_count);

            f.first_cluster = handle.first_cluster;
            f.chain = handle.clusters().collect();
            f.size = total_bytes as u32;
            f.dirty = true;

            log::debug!(
                "fat32: reserved clusters {}..={} for {} bytes",
                handle.first_cluster,
                handle.last_cluster(),
                total_bytes
            );
            Ok(())
        })
    }

    /// Re-reads the file's chain from the FAT and checks it is a single run.
    pub fn is_contiguous(&mut self, file: Fat32File) -> FsVolumeResult<bool> {
        let (io, m) = self.parts()?;
        let first = m.file(file)?.first_cluster;
        if first == 0 {
            return Ok(true);
        }
        let on_disk = chain::read_chain(io, &m.meta, first)?;
        Ok(chain::is_contiguous(&on_disk))
    }

    /// Sets the modification time of a file or directory.
    pub fn set_timestamp(&mut self, path: &str, ts: PrimitiveDateTime) -> FsVolumeResult {
        let (io, m) = self.parts()?;
        let slot = m.lookup(io, path)?;
        let mut entry = slot.entry;
        let (date, time, _) = utils::datetime_from(ts);
        entry.set_modified(date, time);
        io.write_struct(slot.offset, &entry)?;
        io.flush()?;
        Ok(())
    }
}

impl<IO: BlockIO> ExtentFs for Fat32Volume<IO> {
    type File = Fat32File;

    fn is_mounted(&self) -> bool {
        Fat32Volume::is_mounted(self)
    }

    fn geometry(&self) -> FsResult<VolumeGeometry> {
        Ok(Fat32Volume::geometry(self)?)
    }

    fn open(&mut self, path: &str, mode: FileMode) -> FsResult<Fat32File> {
        Ok(Fat32Volume::open(self, path, mode)?)
    }

    fn allocate_contiguous(&mut self, file: Fat32File, total_bytes: u64) -> FsResult {
        Ok(Fat32Volume::allocate_contiguous(self, file, total_bytes)?)
    }

    fn is_contiguous(&mut self, file: Fat32File) -> FsResult<bool> {
        Ok(Fat32Volume::is_contiguous(self, file)?)
    }

    fn write(&mut self, file: Fat32File, data: &[u8]) -> FsResult<usize> {
        Ok(Fat32Volume::write(self, file, data)?)
    }

    fn flush(&mut self, file: Fat32File) -> FsResult {
        Ok(Fat32Volume::flush(self, file)?)
    }

    fn seek(&mut self, file: Fat32File, offset: u64) -> FsResult {
        Ok(Fat32Volume::seek(self, file, offset)?)
    }

    fn first_cluster(&self, file: Fat32File) -> FsResult<u32> {
        Ok(Fat32Volume::first_cluster(self, file)?)
    }

    fn set_len(&mut self, file: Fat32File, len: u64) -> FsResult {
        Ok(Fat32Volume::set_len(self, file, len)?)
    }

    fn close(&mut self, file: Fat32File) -> FsResult {
        Ok(Fat32Volume::close(self, file)?)
    }
}
