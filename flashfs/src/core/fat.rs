// SPDX-License-Identifier: MIT

use alloc::{vec, vec::Vec};

use flashio::{BLOCK_BUF_SIZE, prelude::*};

use crate::core::{errors::*, meta::FsMeta};

/// First cluster number that maps onto the data region.
///
/// Entries 0 and 1 of every FAT are reserved, so cluster `n` lives at
/// `(n - 2) * cluster_size` bytes into the cluster heap.
pub const FIRST_DATA_CLUSTER: u32 = 2;

/// FAT-style allocation table description.
///
/// Parameterizes the chain helpers below so they can work for any table
/// width (FAT32 today).
pub trait ClusterMeta: FsMeta<u32> {
    /// Value written to terminate a chain.
    const EOC: u32;
    /// Smallest value that reads back as end-of-chain.
    const EOC_MIN: u32;
    const FREE: u32 = 0;
    const ENTRY_SIZE: usize;
    const ENTRY_MASK: u32; // Mask to isolate useful bits

    /// Computes the offset of a FAT entry
    fn fat_entry_offset(&self, cluster: u32, fat_index: u8) -> u64;

    /// Checks if an entry value is End-of-Chain
    fn is_eoc(&self, value: u32) -> bool {
        value & Self::ENTRY_MASK >= Self::EOC_MIN
    }

    fn num_fats(&self) -> u8;
}

/// Generic FAT chain helpers.
pub mod chain {
    use super::*;

    #[inline(always)]
    fn decode_entry<M: ClusterMeta>(raw: &[u8]) -> u32 {
        let mut v = 0u32;
        for (i, b) in raw.iter().take(M::ENTRY_SIZE).enumerate() {
            v |= (*b as u32) << (8 * i);
        }
        v & M::ENTRY_MASK
    }

    #[inline]
    pub fn read_entry<IO, M>(io: &mut IO, meta: &M, cluster: u32, fat_index: u8) -> BlockIOResult<u32>
    where
        IO: BlockIO + ?Sized,
        M: ClusterMeta,
    {
        let off = meta.fat_entry_offset(cluster, fat_index);

        let mut buf = [0u8; 4];
        let n = M::ENTRY_SIZE;
        debug_assert!(n <= 4 && n != 0);

        io.read_at(off, &mut buf[..n])?;
        Ok(decode_entry::<M>(&buf[..n]))
    }

    /// Writes `value` into the entry of `cluster` in every FAT copy.
    pub fn write_entry<IO, M>(io: &mut IO, meta: &M, cluster: u32, value: u32) -> BlockIOResult
    where
        IO: BlockIO + ?Sized,
        M: ClusterMeta,
    {
        let bytes = (value & M::ENTRY_MASK).to_le_bytes();
        for fi in 0..meta.num_fats() {
            io.write_at(meta.fat_entry_offset(cluster, fi), &bytes[..M::ENTRY_SIZE])?;
        }
        Ok(())
    }

    /// Read an entire chain into a vector of clusters.
    ///
    /// A free or out-of-range link is reported as `InvalidCluster`, a chain
    /// longer than the volume as `LoopDetected`.
    pub fn read_chain<IO: BlockIO + ?Sized, M: ClusterMeta>(
        io: &mut IO,
        meta: &M,
        start_cluster: u32,
    ) -> FsChainResult<Vec<u32>> {
        let mut chain = Vec::new();
        let mut current = start_cluster;
        let limit = meta.total_units();

        loop {
            if !meta.is_valid_unit(current) {
                return Err(FsChainError::InvalidCluster(current));
            }
            chain.push(current);
            if chain.len() > limit {
                return Err(FsChainError::LoopDetected);
            }
            let next = read_entry(io, meta, current, 0)?;
            if meta.is_eoc(next) {
                break;
            }
            current = next;
        }
        Ok(chain)
    }

    /// Build raw FAT entries for a chain: each entry points to the next,
    /// last entry points to EOC. Entries are little-endian.
    pub fn build_entries<M: ClusterMeta>(chain: &[u32]) -> Vec<u8> {
        let n = M::ENTRY_SIZE;
        let mut out = vec![0u8; chain.len() * n];
        for (i, slot) in out.chunks_exact_mut(n).enumerate() {
            let next = chain.get(i + 1).copied().unwrap_or(M::EOC);
            slot.copy_from_slice(&(next & M::ENTRY_MASK).to_le_bytes()[..n]);
        }
        out
    }

    /// Write the constructed chain into all FAT copies.
    ///
    /// Contiguous chains go out as a single write per FAT copy.
    pub fn write_chain<IO: BlockIO + ?Sized, M: ClusterMeta>(
        io: &mut IO,
        meta: &M,
        chain: &[u32],
    ) -> BlockIOResult {
        if chain.is_empty() {
            return Ok(());
        }
        let entries = build_entries::<M>(chain);
        if is_contiguous(chain) {
            for fi in 0..meta.num_fats() {
                let off = meta.fat_entry_offset(chain[0], fi);
                io.write_in_chunks(off, &entries, BLOCK_BUF_SIZE)?;
            }
        } else {
            for (cluster, raw) in chain.iter().zip(entries.chunks_exact(M::ENTRY_SIZE)) {
                for fi in 0..meta.num_fats() {
                    io.write_at(meta.fat_entry_offset(*cluster, fi), raw)?;
                }
            }
        }
        Ok(())
    }

    /// Marks every cluster of `chain` free in all FAT copies.
    pub fn free_chain<IO: BlockIO + ?Sized, M: ClusterMeta>(
        io: &mut IO,
        meta: &M,
        chain: &[u32],
    ) -> BlockIOResult {
        if chain.is_empty() {
            return Ok(());
        }
        if is_contiguous(chain) {
            let len = chain.len() * M::ENTRY_SIZE;
            for fi in 0..meta.num_fats() {
                io.zero_fill(meta.fat_entry_offset(chain[0], fi), len)?;
            }
        } else {
            for &cluster in chain {
                write_entry(io, meta, cluster, M::FREE)?;
            }
        }
        Ok(())
    }

    /// First cluster of the first run of `count` free clusters at or after `from`.
    ///
    /// Reads the primary FAT sequentially in `BLOCK_BUF_SIZE` chunks.
    pub fn find_free_run<IO: BlockIO + ?Sized, M: ClusterMeta>(
        io: &mut IO,
        meta: &M,
        from: u32,
        count: u32,
    ) -> BlockIOResult<Option<u32>> {
        if count == 0 {
            return Ok(None);
        }
        let last = meta.last_data_unit();
        let per_chunk = (BLOCK_BUF_SIZE / M::ENTRY_SIZE) as u32;
        let mut buf = [0u8; BLOCK_BUF_SIZE];

        let mut cluster = from.max(meta.first_data_unit());
        let mut run_start = cluster;
        let mut run_len = 0u32;

        while cluster <= last {
            let n = per_chunk.min(last - cluster + 1);
            let bytes = n as usize * M::ENTRY_SIZE;
            io.read_at(meta.fat_entry_offset(cluster, 0), &mut buf[..bytes])?;

            for (i, raw) in buf[..bytes].chunks_exact(M::ENTRY_SIZE).enumerate() {
                if decode_entry::<M>(raw) == M::FREE {
                    if run_len == 0 {
                        run_start = cluster + i as u32;
                    }
                    run_len += 1;
                    if run_len == count {
                        return Ok(Some(run_start));
                    }
                } else {
                    run_len = 0;
                }
            }
            cluster += n;
        }
        Ok(None)
    }

    /// Number of free entries in the primary FAT.
    pub fn count_free<IO: BlockIO + ?Sized, M: ClusterMeta>(io: &mut IO, meta: &M) -> BlockIOResult<u32> {
        let last = meta.last_data_unit();
        let per_chunk = (BLOCK_BUF_SIZE / M::ENTRY_SIZE) as u32;
        let mut buf = [0u8; BLOCK_BUF_SIZE];

        let mut cluster = meta.first_data_unit();
        let mut free = 0u32;
        while cluster <= last {
            let n = per_chunk.min(last - cluster + 1);
            let bytes = n as usize * M::ENTRY_SIZE;
            io.read_at(meta.fat_entry_offset(cluster, 0), &mut buf[..bytes])?;
            free += buf[..bytes]
                .chunks_exact(M::ENTRY_SIZE)
                .filter(|raw| decode_entry::<M>(raw) == M::FREE)
                .count() as u32;
            cluster += n;
        }
        Ok(free)
    }

    /// Simple contiguity check: every cluster follows its predecessor.
    #[inline]
    pub fn is_contiguous(chain: &[u32]) -> bool {
        chain.windows(2).all(|w| w[0].checked_add(1) == Some(w[1]))
    }
}

#[cfg(all(test, feature = "std", feature = "mem"))]
mod tests {
    use super::chain::*;
    use super::*;

    /// 64 clusters, 2 FAT copies of 256 bytes each at offset 0.
    struct TinyFat;

    impl FsMeta<u32> for TinyFat {
        fn unit_size(&self) -> usize {
            512
        }
        fn unit_offset(&self, unit: u32) -> u64 {
            1024 + (unit - FIRST_DATA_CLUSTER) as u64 * 512
        }
        fn root_unit(&self) -> u32 {
            FIRST_DATA_CLUSTER
        }
        fn first_data_unit(&self) -> u32 {
            FIRST_DATA_CLUSTER
        }
        fn last_data_unit(&self) -> u32 {
            FIRST_DATA_CLUSTER + 61
        }
        fn total_units(&self) -> usize {
            62
        }
        fn size_bytes(&self) -> u64 {
            1024 + 62 * 512
        }
    }

    impl ClusterMeta for TinyFat {
        const EOC: u32 = 0x0FFF_FFFF;
        const EOC_MIN: u32 = 0x0FFF_FFF8;
        const ENTRY_SIZE: usize = 4;
        const ENTRY_MASK: u32 = 0x0FFF_FFFF;

        fn fat_entry_offset(&self, cluster: u32, fat_index: u8) -> u64 {
            fat_index as u64 * 256 + cluster as u64 * 4
        }

        fn num_fats(&self) -> u8 {
            2
        }
    }

    #[test]
    fn test_write_then_read_chain_in_both_fats() {
        let mut buf = vec![0u8; TinyFat.size_bytes() as usize];
        let mut io = MemBlockIO::new(&mut buf);

        write_chain(&mut io, &TinyFat, &[5, 9, 6]).unwrap();
        assert_eq!(read_chain(&mut io, &TinyFat, 5).unwrap(), vec![5, 9, 6]);
        assert_eq!(read_entry(&mut io, &TinyFat, 9, 1).unwrap(), 6);
        assert!(TinyFat.is_eoc(read_entry(&mut io, &TinyFat, 6, 1).unwrap()));
    }

    #[test]
    fn test_find_free_run_skips_short_gaps() {
        let mut buf = vec![0u8; TinyFat.size_bytes() as usize];
        let mut io = MemBlockIO::new(&mut buf);

        // [2..=4] used, 5..=6 free, 7 used, 8.. free
        write_chain(&mut io, &TinyFat, &[2, 3, 4]).unwrap();
        write_chain(&mut io, &TinyFat, &[7]).unwrap();

        assert_eq!(find_free_run(&mut io, &TinyFat, 2, 2).unwrap(), Some(5));
        assert_eq!(find_free_run(&mut io, &TinyFat, 2, 3).unwrap(), Some(8));
        assert_eq!(find_free_run(&mut io, &TinyFat, 9, 3).unwrap(), Some(9));
        assert_eq!(find_free_run(&mut io, &TinyFat, 2, 60).unwrap(), None);
        assert_eq!(count_free(&mut io, &TinyFat).unwrap(), 62 - 4);
    }

    #[test]
    fn test_free_chain_releases_entries() {
        let mut buf = vec![0u8; TinyFat.size_bytes() as usize];
        let mut io = MemBlockIO::new(&mut buf);

        write_chain(&mut io, &TinyFat, &[10, 11, 12]).unwrap();
        free_chain(&mut io, &TinyFat, &[10, 11, 12]).unwrap();
        assert_eq!(count_free(&mut io, &TinyFat).unwrap(), 62);
        assert_eq!(read_entry(&mut io, &TinyFat, 11, 1).unwrap(), 0);
    }

    #[test]
    fn test_broken_chains_are_reported() {
        let mut buf = vec![0u8; TinyFat.size_bytes() as usize];
        let mut io = MemBlockIO::new(&mut buf);

        // 20 -> 21 -> 20
        write_entry(&mut io, &TinyFat, 20, 21).unwrap();
        write_entry(&mut io, &TinyFat, 21, 20).unwrap();
        assert_eq!(
            read_chain(&mut io, &TinyFat, 20),
            Err(FsChainError::LoopDetected)
        );

        // 30 -> free
        write_entry(&mut io, &TinyFat, 30, 31).unwrap();
        assert_eq!(
            read_chain(&mut io, &TinyFat, 30),
            Err(FsChainError::InvalidCluster(0))
        );
        assert_eq!(
            read_chain(&mut io, &TinyFat, 1),
            Err(FsChainError::InvalidCluster(1))
        );
    }

    #[test]
    fn test_is_contiguous() {
        assert!(is_contiguous(&[]));
        assert!(is_contiguous(&[42]));
        assert!(is_contiguous(&[3, 4, 5]));
        assert!(!is_contiguous(&[3, 5, 6]));
        assert!(!is_contiguous(&[u32::MAX, 0]));
    }
}
