// SPDX-License-Identifier: MIT

use alloc::vec::Vec;

use flashio::BlockIO;

pub use crate::core::allocator::*;

use crate::{
    core::fat::chain,
    fs::fat32::meta::*,
};

/// A run of clusters handed out by [`Fat32Allocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fat32Handle {
    pub first_cluster: u32,
    pub cluster_count: u32,
}

impl Fat32Handle {
    pub fn new(first_cluster: u32, cluster_count: u32) -> Self {
        Self {
            first_cluster,
            cluster_count,
        }
    }

    #[inline]
    pub fn last_cluster(&self) -> u32 {
        self.first_cluster + self.cluster_count.saturating_sub(1)
    }

    pub fn clusters(&self) -> impl Iterator<Item = u32> + '_ {
        self.first_cluster..self.first_cluster + self.cluster_count
    }
}

impl FsHandle for Fat32Handle {}

/// FAT-backed allocator for a mounted volume.
///
/// Scans the primary FAT for free runs, first-fit, starting at the
/// next-free hint and wrapping once to the start of the data region.
/// Allocated runs are written as terminated chains into every FAT copy.
pub struct Fat32Allocator<'a, IO: BlockIO + ?Sized> {
    io: &'a mut IO,
    meta: &'a Fat32Meta,
    next_free: u32,
}

impl<'a, IO: BlockIO + ?Sized> Fat32Allocator<'a, IO> {
    pub fn new(io: &'a mut IO, meta: &'a Fat32Meta) -> Self {
        let next_free = meta.first_data_unit();
        Self::with_hint(io, meta, next_free)
    }

    /// Starts searching at `hint` (FSInfo next-free cluster).
    pub fn with_hint(io: &'a mut IO, meta: &'a Fat32Meta, hint: u32) -> Self {
        let next_free = if meta.is_valid_unit(hint) {
            hint
        } else {
            meta.first_data_unit()
        };
        Self {
            io,
            meta,
            next_free,
        }
    }

    /// Where the next search begins.
    #[inline]
    pub fn next_free(&self) -> u32 {
        self.next_free
    }

    fn find_run(&mut self, count: u32) -> FsAllocatorResult<Option<u32>> {
        if let Some(first) = chain::find_free_run(&mut *self.io, self.meta, self.next_free, count)? {
            return Ok(Some(first));
        }
        if self.next_free == self.meta.first_data_unit() {
            return Ok(None);
        }
        // Wrap: the run may lie entirely before the hint.
        Ok(chain::find_free_run(&mut *self.io, self.meta, self.meta.first_data_unit(), count)?)
    }

    /// Appends one fresh cluster after `last`, which must end a chain.
    pub fn extend_chain(&mut self, last: u32) -> FsAllocatorResult<u32> {
        let handle = self.allocate_unit()?;
        chain::write_entry(&mut *self.io, self.meta, last, handle.first_cluster)?;
        Ok(handle.first_cluster)
    }

    /// Frees an arbitrary chain (as read back from the FAT).
    pub fn release_chain(&mut self, clusters: &[u32]) -> FsAllocatorResult {
        chain::free_chain(&mut *self.io, self.meta, clusters)?;
        if let Some(&first) = clusters.iter().min() {
            self.next_free = self.next_free.min(first);
        }
        Ok(())
    }
}

impl<'a, IO: BlockIO + ?Sized> FsAllocator<Fat32Handle> for Fat32Allocator<'a, IO> {
    fn allocate_contiguous(&mut self, count: usize) -> FsAllocatorResult<Fat32Handle> {
        if count == 0 {
            return Err(FsAllocatorError::Other("zero-length allocation"));
        }
        if count > self.meta.total_units() {
            return Err(FsAllocatorError::OutOfBlocks);
        }
        let count = count as u32;

        let Some(first) = self.find_run(count)? else {
            let free = chain::count_free(&mut *self.io, self.meta)?;
            return Err(if free >= count {
                FsAllocatorError::NoContiguousRun
            } else {
                FsAllocatorError::OutOfBlocks
            });
        };

        let run: Vec<u32> = (first..first + count).collect();
        chain::write_chain(&mut *self.io, self.meta, &run)?;

        let after = first + count;
        self.next_free = if after > self.meta.last_data_unit() {
            self.meta.first_data_unit()
        } else {
            after
        };
        log::trace!("fat32: allocated clusters {first}..{after}");
        Ok(Fat32Handle::new(first, count))
    }

    fn release(&mut self, handle: &Fat32Handle) -> FsAllocatorResult {
        let run: Vec<u32> = handle.clusters().collect();
        self.release_chain(&run)
    }

    fn free_units(&mut self) -> FsAllocatorResult<usize> {
        Ok(chain::count_free(&mut *self.io, self.meta)? as usize)
    }
}

#[cfg(all(test, feature = "std", feature = "mem"))]
mod tests {
    use super::*;
    use crate::fs::fat32::{constant::FAT_EOC, formatter::*};
    use alloc::vec;
    use flashio::prelude::*;

    fn formatted(size: u64) -> (Vec<u8>, Fat32Meta) {
        let meta = Fat32Meta::new_custom(size, None, 1, 2, 512, 512, 32).unwrap();
        let mut buf = vec![0u8; size as usize];
        let mut io = MemBlockIO::new(&mut buf);
        Fat32Formatter::new(&mut io, &meta).format(false).unwrap();
        (buf, meta)
    }

    #[test]
    fn test_contiguous_run_after_root() {
        let (mut buf, meta) = formatted(4 << 20);
        let mut io = MemBlockIO::new(&mut buf);
        let mut alloc = Fat32Allocator::new(&mut io, &meta);

        let h = alloc.allocate_contiguous(10).unwrap();
        assert_eq!(h, Fat32Handle::new(3, 10));
        assert_eq!(alloc.next_free(), 13);

        let chain = chain::read_chain(&mut io, &meta, 3).unwrap();
        assert_eq!(chain, (3..13).collect::<Vec<_>>());
    }

    #[test]
    fn test_fragmented_space_is_not_out_of_blocks() {
        let (mut buf, meta) = formatted(1 << 20);
        let mut io = MemBlockIO::new(&mut buf);
        let total_free = {
            let mut alloc = Fat32Allocator::new(&mut io, &meta);
            alloc.free_units().unwrap()
        };

        // Occupy every other cluster.
        for c in (3..=meta.last_data_unit()).step_by(2) {
            chain::write_entry(&mut io, &meta, c, FAT_EOC).unwrap();
        }
        let mut alloc = Fat32Allocator::new(&mut io, &meta);
        let free = alloc.free_units().unwrap();
        assert!(free < total_free && free > 2);

        assert_eq!(alloc.allocate_contiguous(2), Err(FsAllocatorError::NoContiguousRun));
        assert_eq!(
            alloc.allocate_contiguous(total_free),
            Err(FsAllocatorError::OutOfBlocks)
        );
        assert!(alloc.allocate_contiguous(1).is_ok());
    }

    #[test]
    fn test_release_and_wrap_around_hint() {
        let (mut buf, meta) = formatted(4 << 20);
        let mut io = MemBlockIO::new(&mut buf);
        let mut alloc = Fat32Allocator::with_hint(&mut io, &meta, meta.last_data_unit() - 1);

        // Only two clusters remain past the hint, so the search wraps.
        let h = alloc.allocate_contiguous(4).unwrap();
        assert_eq!(h.first_cluster, 3);

        alloc.release(&h).unwrap();
        let again = alloc.allocate_contiguous(4).unwrap();
        assert_eq!(again.first_cluster, 3);
    }

    #[test]
    fn test_extend_chain_links_new_cluster() {
        let (mut buf, meta) = formatted(4 << 20);
        let mut io = MemBlockIO::new(&mut buf);
        let mut alloc = Fat32Allocator::new(&mut io, &meta);

        let h = alloc.allocate_unit().unwrap();
        let next = alloc.extend_chain(h.first_cluster).unwrap();
        assert_eq!(next, h.first_cluster + 1);

        let chain = chain::read_chain(&mut io, &meta, h.first_cluster).unwrap();
        assert_eq!(chain, vec![h.first_cluster, next]);
    }
}
