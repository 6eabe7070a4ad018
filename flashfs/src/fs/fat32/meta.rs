// SPDX-License-Identifier: MIT

pub use crate::core::meta::*;

use crate::{
    core::{errors::*, extent_fs::VolumeGeometry, fat::ClusterMeta, utils::volume_utils::*},
    fs::fat32::{constant::*, types::Fat32Vbr},
};

/// Layout of one FAT32 volume, either planned for formatting or read back from a VBR.
///
/// All byte offsets are relative to the start of the volume (the partition).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fat32Meta {
    pub volume_id: u32,
    pub volume_label: [u8; 11],

    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub bytes_per_cluster: u32,

    pub volume_size_bytes: u64,
    pub volume_size_sectors: u64,

    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub fat_offset_bytes: u64,
    pub fat_size_sectors: u32,

    pub cluster_heap_offset: u64,
    pub cluster_count: u32,

    pub root_cluster: u32,
    pub fsinfo_sector: u16,
}

impl Fat32Meta {
    /// Default layout: 512-byte sectors, 4 KiB clusters, two FATs.
    pub fn new(size_bytes: u64, volume_label: Option<&str>) -> FsFormatterResult<Self> {
        Self::new_custom(
            size_bytes,
            volume_label,
            generate_volume_id_32(),
            FAT_NUM_FATS,
            FAT_SECTOR_SIZE,
            FAT_CLUSTER_SIZE,
            DEFAULT_FAT_RESERVED_SECTORS,
        )
    }

    pub fn new_custom(
        volume_size_bytes: u64,
        volume_label: Option<&str>,
        volume_id: u32,
        num_fats: u8,
        bytes_per_sector: u16,
        bytes_per_cluster: u32,
        reserved_sectors: u16,
    ) -> FsFormatterResult<Self> {
        check_sector_size(bytes_per_sector).map_err(FsFormatterError::Invalid)?;
        if bytes_per_cluster == 0 || bytes_per_cluster % bytes_per_sector as u32 != 0 {
            return Err(FsFormatterError::Invalid(
                "cluster size must be a multiple of sector size",
            ));
        }
        let spc = bytes_per_cluster / bytes_per_sector as u32;
        check_sectors_per_cluster(spc).map_err(FsFormatterError::Invalid)?;
        if num_fats == 0 {
            return Err(FsFormatterError::Invalid("at least one FAT is required"));
        }
        if (reserved_sectors as u64) <= FAT_FSINFO_BACKUP_SECTOR {
            return Err(FsFormatterError::Invalid(
                "reserved area too small for boot sector backups",
            ));
        }

        let mut volume_label_safe = *FAT_VOLUME_LABEL_EMPTY;
        if let Some(label) = volume_label {
            volume_label_safe = [b' '; 11];
            for (i, b) in label.bytes().take(11).enumerate() {
                volume_label_safe[i] = b.to_ascii_uppercase();
            }
        }

        let volume_size_sectors = volume_size_bytes / bytes_per_sector as u64;
        if volume_size_sectors > u32::MAX as u64 {
            return Err(FsFormatterError::Invalid("volume too large for FAT32"));
        }

        let (fat_size_sectors, cluster_count) = converge_fat_layout(
            bytes_per_sector as u32,
            volume_size_sectors,
            reserved_sectors as u32,
            FAT_ENTRY_SIZE as u32,
            FAT_FIRST_CLUSTER,
            num_fats,
            spc,
        );
        if cluster_count < 2 {
            return Err(FsFormatterError::Invalid("volume too small"));
        }

        let fat_offset_bytes = reserved_sectors as u64 * bytes_per_sector as u64;
        let cluster_heap_offset =
            fat_offset_bytes + fat_size_sectors as u64 * num_fats as u64 * bytes_per_sector as u64;

        Ok(Self {
            volume_id,
            volume_label: volume_label_safe,
            bytes_per_sector,
            sectors_per_cluster: spc as u8,
            bytes_per_cluster,
            volume_size_bytes,
            volume_size_sectors,
            reserved_sectors,
            num_fats,
            fat_offset_bytes,
            fat_size_sectors,
            cluster_heap_offset,
            cluster_count,
            root_cluster: FAT_ROOT_CLUSTER,
            fsinfo_sector: FAT_FSINFO_SECTOR as u16,
        })
    }

    /// Rebuilds the layout of an existing volume from its boot sector.
    pub fn from_vbr(vbr: &Fat32Vbr) -> FsVolumeResult<Self> {
        if vbr.signature != FAT_SIGNATURE {
            return Err(FsVolumeError::Corrupted("missing boot sector signature"));
        }
        let bytes_per_sector = vbr.bytes_per_sector;
        check_sector_size(bytes_per_sector).map_err(FsVolumeError::Corrupted)?;
        let spc = vbr.sectors_per_cluster as u32;
        check_sectors_per_cluster(spc).map_err(FsVolumeError::Corrupted)?;

        let fat_size_sectors = vbr.fat_size_32;
        let root_entry_count = vbr.root_entry_count;
        if fat_size_sectors == 0 || root_entry_count != 0 {
            return Err(FsVolumeError::Corrupted("not a FAT32 volume"));
        }
        if vbr.num_fats == 0 || vbr.reserved_sectors == 0 {
            return Err(FsVolumeError::Corrupted("invalid BPB"));
        }

        let volume_size_sectors = match vbr.total_sectors_32 {
            0 => vbr.total_sectors_16 as u64,
            n => n as u64,
        };

        let bps = bytes_per_sector as u64;
        let fat_offset_bytes = vbr.reserved_sectors as u64 * bps;
        let heap_sector =
            vbr.reserved_sectors as u64 + fat_size_sectors as u64 * vbr.num_fats as u64;
        if heap_sector >= volume_size_sectors {
            return Err(FsVolumeError::Corrupted("FAT area exceeds volume"));
        }

        // Data clusters, capped by what the FAT can address.
        let by_area = (volume_size_sectors - heap_sector) / spc as u64;
        let by_fat = (fat_size_sectors as u64 * bps / FAT_ENTRY_SIZE as u64)
            .saturating_sub(FAT_FIRST_CLUSTER as u64);
        let cluster_count = by_area.min(by_fat).min(FAT_EOC_MIN as u64 - 2) as u32;

        let meta = Self {
            volume_id: vbr.volume_id,
            volume_label: vbr.volume_label,
            bytes_per_sector,
            sectors_per_cluster: vbr.sectors_per_cluster,
            bytes_per_cluster: bytes_per_sector as u32 * spc,
            volume_size_bytes: volume_size_sectors * bps,
            volume_size_sectors,
            reserved_sectors: vbr.reserved_sectors,
            num_fats: vbr.num_fats,
            fat_offset_bytes,
            fat_size_sectors,
            cluster_heap_offset: heap_sector * bps,
            cluster_count,
            root_cluster: vbr.root_cluster,
            fsinfo_sector: vbr.fsinfo_sector,
        };

        if !meta.is_valid_unit(meta.root_cluster) {
            return Err(FsVolumeError::Corrupted("root cluster out of range"));
        }
        Ok(meta)
    }

    /// Sector-level view of the data region once the volume sits at
    /// `partition_offset` bytes on the medium.
    pub fn geometry(&self, partition_offset: u64) -> FsVolumeResult<VolumeGeometry> {
        let bps = self.bytes_per_sector as u64;
        if partition_offset % bps != 0 {
            return Err(FsVolumeError::Invalid("partition not sector aligned"));
        }
        let base = (partition_offset + self.cluster_heap_offset) / bps;
        let data_region_base =
            u32::try_from(base).map_err(|_| FsVolumeError::Invalid("data region beyond 32-bit LBA"))?;

        Ok(VolumeGeometry {
            bytes_per_sector: self.bytes_per_sector,
            sectors_per_cluster: self.sectors_per_cluster as u32,
            data_region_base,
            cluster_count: self.cluster_count,
        })
    }

    #[inline]
    pub fn fsinfo_offset(&self) -> u64 {
        self.fsinfo_sector as u64 * self.bytes_per_sector as u64
    }

    /// Clusters needed to hold `bytes`.
    #[inline]
    pub fn clusters_for(&self, bytes: u64) -> u64 {
        bytes.div_ceil(self.bytes_per_cluster as u64)
    }
}

fn check_sector_size(bytes_per_sector: u16) -> Result<(), &'static str> {
    let bps = bytes_per_sector as usize;
    if !bps.is_power_of_two() || !(FAT_MIN_SECTOR_SIZE..=FAT_MAX_SECTOR_SIZE).contains(&bps) {
        return Err("unsupported sector size");
    }
    Ok(())
}

fn check_sectors_per_cluster(spc: u32) -> Result<(), &'static str> {
    if spc == 0 || spc > 128 || !spc.is_power_of_two() {
        return Err("unsupported sectors per cluster");
    }
    Ok(())
}

impl FsMeta<u32> for Fat32Meta {
    fn unit_size(&self) -> usize {
        self.bytes_per_cluster as usize
    }

    fn root_unit(&self) -> u32 {
        self.root_cluster
    }

    fn total_units(&self) -> usize {
        self.cluster_count as usize
    }

    fn size_bytes(&self) -> u64 {
        self.volume_size_bytes
    }

    fn unit_offset(&self, cluster: u32) -> u64 {
        self.cluster_heap_offset
            + (cluster.saturating_sub(FAT_FIRST_CLUSTER) as u64 * self.unit_size() as u64)
    }

    fn first_data_unit(&self) -> u32 {
        FAT_FIRST_CLUSTER
    }

    fn last_data_unit(&self) -> u32 {
        FAT_FIRST_CLUSTER + self.cluster_count - 1
    }
}

impl ClusterMeta for Fat32Meta {
    const EOC: u32 = FAT_EOC;
    const EOC_MIN: u32 = FAT_EOC_MIN;
    const ENTRY_SIZE: usize = FAT_ENTRY_SIZE;
    const ENTRY_MASK: u32 = FAT_MASK;

    fn fat_entry_offset(&self, cluster: u32, fat_index: u8) -> u64 {
        self.fat_offset_bytes
            + fat_index as u64 * self.fat_size_sectors as u64 * self.bytes_per_sector as u64
            + cluster as u64 * FAT_ENTRY_SIZE as u64
    }

    fn num_fats(&self) -> u8 {
        self.num_fats
    }
}

/// Computes the FAT size and cluster count for a given FAT configuration.
///
/// Iterates until the FAT is just large enough to describe every cluster
/// left after the reserved area and the FAT copies themselves.
///
/// # Arguments
/// - `sector_size`: Size of a sector in bytes (e.g., 512)
/// - `total_sectors`: Total number of sectors on the volume
/// - `reserved_sectors`: Number of reserved sectors (before the FAT area)
/// - `entry_size`: Size of a FAT entry (in bytes, 4 for FAT32)
/// - `min_entries`: Reserved FAT entries (2)
/// - `num_fats`: Number of FAT copies (usually 2)
/// - `sectors_per_cluster`: Number of sectors per cluster
///
/// # Returns
/// Tuple `(fat_size, cluster_count)`, FAT size in sectors and number of data clusters.
pub fn converge_fat_layout(
    sector_size: u32,
    total_sectors: u64,
    reserved_sectors: u32,
    entry_size: u32,
    min_entries: u32,
    num_fats: u8,
    sectors_per_cluster: u32,
) -> (u32, u32) {
    if sector_size == 0 || sectors_per_cluster == 0 {
        return (0, 0);
    }
    let spc = sectors_per_cluster as u64;
    let reserved = reserved_sectors as u64;

    let mut cluster_count = 0u32;
    let mut fat_size = 0u32;

    for _ in 0..32 {
        let entries = cluster_count as u64 + min_entries as u64;
        let fat_size_new = (entries * entry_size as u64).div_ceil(sector_size as u64) as u32;
        let fat_area = fat_size_new as u64 * num_fats as u64;
        let data_sectors = total_sectors
            .saturating_sub(reserved)
            .saturating_sub(fat_area);
        let cluster_count_new = (data_sectors / spc) as u32;

        if cluster_count_new == cluster_count && fat_size_new == fat_size {
            break;
        }

        cluster_count = cluster_count_new;
        fat_size = fat_size_new;
    }

    // Never hand out clusters the FAT cannot describe.
    let addressable = (fat_size as u64 * sector_size as u64 / entry_size as u64)
        .saturating_sub(min_entries as u64);
    cluster_count = cluster_count.min(addressable as u32);

    (fat_size, cluster_count)
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;

    #[test]
    fn test_layout_fits_volume() {
        let size = 64 * 1024 * 1024;
        let meta = Fat32Meta::new(size, Some("capture")).unwrap();

        assert_eq!(meta.volume_label, *b"CAPTURE    ");
        assert_eq!(meta.sectors_per_cluster, 8);

        // Every cluster has a FAT entry.
        let fat_entries = meta.fat_size_sectors as u64 * 512 / 4;
        assert!(fat_entries >= meta.cluster_count as u64 + 2);

        let end = meta.unit_offset(meta.last_data_unit()) + meta.unit_size() as u64;
        assert!(end <= size);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(Fat32Meta::new_custom(1 << 24, None, 1, 2, 500, 4096, 32).is_err());
        assert!(Fat32Meta::new_custom(1 << 24, None, 1, 2, 512, 1000, 32).is_err());
        assert!(Fat32Meta::new_custom(1 << 24, None, 1, 0, 512, 4096, 32).is_err());
        assert!(Fat32Meta::new_custom(1 << 24, None, 1, 2, 512, 4096, 4).is_err());
        assert!(Fat32Meta::new_custom(16 * 1024, None, 1, 2, 512, 4096, 32).is_err());
    }

    #[test]
    fn test_vbr_round_trip_preserves_layout() {
        let meta = Fat32Meta::new_custom(32 << 20, Some("REC"), 0xCAFE, 2, 512, 1024, 32).unwrap();
        let vbr = Fat32Vbr::from_meta(&meta);
        let back = Fat32Meta::from_vbr(&vbr).unwrap();

        assert_eq!(back, meta);
    }

    #[test]
    fn test_from_vbr_rejects_garbage() {
        let meta = Fat32Meta::new(32 << 20, None).unwrap();
        let mut vbr = Fat32Vbr::from_meta(&meta);
        vbr.signature = [0, 0];
        assert!(Fat32Meta::from_vbr(&vbr).is_err());

        let mut vbr = Fat32Vbr::from_meta(&meta);
        vbr.sectors_per_cluster = 3;
        assert!(Fat32Meta::from_vbr(&vbr).is_err());

        let mut vbr = Fat32Vbr::from_meta(&meta);
        vbr.fat_size_32 = 0;
        assert!(Fat32Meta::from_vbr(&vbr).is_err());
    }

    #[test]
    fn test_geometry_includes_partition_offset() {
        let meta = Fat32Meta::new(32 << 20, None).unwrap();
        let heap = (meta.cluster_heap_offset / 512) as u32;

        let g = meta.geometry(0).unwrap();
        assert_eq!(g.data_region_base, heap);
        assert_eq!(g.sectors_per_cluster, 8);
        assert_eq!(g.cluster_count, meta.cluster_count);

        let g = meta.geometry(2048 * 512).unwrap();
        assert_eq!(g.data_region_base, heap + 2048);

        assert!(meta.geometry(100).is_err());
    }
}
