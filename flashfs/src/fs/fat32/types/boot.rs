// SPDX-License-Identifier: MIT

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::fs::fat32::{constant::*, meta::*};

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct Fat32Vbr {
    pub jump_boot: [u8; 3],
    pub oem_name: [u8; 8],
    pub bytes_per_sector: u16,
    pub sectors_per_cluster: u8,
    pub reserved_sectors: u16,
    pub num_fats: u8,
    pub root_entry_count: u16,
    pub total_sectors_16: u16,
    pub media: u8,
    pub fat_size_16: u16,
    pub sectors_per_track: u16,
    pub num_heads: u16,
    pub hidden_sectors: u32,
    pub total_sectors_32: u32,

    // FAT32 Extended BPB
    pub fat_size_32: u32,
    pub ext_flags: u16,
    pub fs_version: u16,
    pub root_cluster: u32,
    pub fsinfo_sector: u16,
    pub backup_boot_sector: u16,
    pub reserved: [u8; 12],

    pub drive_number: u8,
    pub reserved1: u8,
    pub boot_signature: u8,
    pub volume_id: u32,
    pub volume_label: [u8; 11],
    pub fs_type: [u8; 8],

    pub boot_code: [u8; FAT_BOOT_CODE_SIZE],
    pub signature: [u8; 2],
}

impl Fat32Vbr {
    pub fn from_meta(meta: &Fat32Meta) -> Self {
        Self {
            jump_boot: FAT_JUMP_BOOT,
            oem_name: *FAT_OEM_NAME,
            bytes_per_sector: meta.bytes_per_sector,
            sectors_per_cluster: meta.sectors_per_cluster,
            reserved_sectors: meta.reserved_sectors,
            num_fats: meta.num_fats,
            root_entry_count: FAT_ROOT_ENTRY_COUNT,
            total_sectors_16: FAT_TOTAL_SECTORS_16,
            media: FAT_MEDIA_DESCRIPTOR,
            fat_size_16: FAT_FAT_SIZE_16,
            sectors_per_track: FAT_SECTORS_PER_TRACK,
            num_heads: FAT_HEADS,
            hidden_sectors: FAT_HIDDEN_SECTORS,
            total_sectors_32: meta.volume_size_sectors.min(u32::MAX as u64) as u32,
            fat_size_32: meta.fat_size_sectors,
            ext_flags: FAT_EXT_FLAGS,
            fs_version: FAT_FS_VERSION,
            root_cluster: meta.root_unit(),
            fsinfo_sector: meta.fsinfo_sector,
            backup_boot_sector: FAT_VBR_BACKUP_SECTOR as u16,
            reserved: [0u8; 12],
            drive_number: FAT_DRIVE_NUMBER,
            reserved1: 0,
            boot_signature: FAT_BOOT_SIGNATURE,
            volume_id: meta.volume_id,
            volume_label: meta.volume_label,
            fs_type: *FAT_FS_TYPE,
            boot_code: [0u8; FAT_BOOT_CODE_SIZE],
            signature: FAT_SIGNATURE,
        }
    }
}

#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct Fat32FsInfo {
    pub lead_signature: [u8; 4],
    pub reserved1: [u8; 480],
    pub struct_signature: [u8; 4],
    pub free_cluster_count: u32,
    pub next_free_cluster: u32,
    pub reserved2: [u8; 12],
    pub trail_signature: [u8; 4],
}

impl Fat32FsInfo {
    pub fn new(free_cluster_count: u32, next_free_cluster: u32) -> Self {
        Self {
            lead_signature: *FAT_FSINFO_LEAD_SIGNATURE,
            reserved1: [0u8; 480],
            struct_signature: *FAT_FSINFO_STRUCT_SIGNATURE,
            free_cluster_count,
            next_free_cluster,
            reserved2: [0u8; 12],
            trail_signature: FAT_FSINFO_TRAIL_SIGNATURE,
        }
    }

    /// Fresh volume: everything but the root cluster is free.
    pub fn from_meta(meta: &Fat32Meta) -> Self {
        Self::new(meta.cluster_count - 1, meta.root_unit() + 1)
    }

    pub fn is_valid(&self) -> bool {
        self.lead_signature == *FAT_FSINFO_LEAD_SIGNATURE
            && self.struct_signature == *FAT_FSINFO_STRUCT_SIGNATURE
            && self.trail_signature == FAT_FSINFO_TRAIL_SIGNATURE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boot_structures_are_one_sector() {
        assert_eq!(core::mem::size_of::<Fat32Vbr>(), 512);
        assert_eq!(core::mem::size_of::<Fat32FsInfo>(), 512);
    }

    #[test]
    fn test_signatures_at_sector_end() {
        let meta = Fat32Meta::new(32 << 20, None).unwrap();

        let vbr = Fat32Vbr::from_meta(&meta);
        assert_eq!(&vbr.as_bytes()[510..], &[0x55, 0xAA]);

        let info = Fat32FsInfo::from_meta(&meta);
        assert!(info.is_valid());
        assert_eq!(&info.as_bytes()[508..], &[0x00, 0x00, 0x55, 0xAA]);
        assert_eq!(&info.as_bytes()[..4], b"RRaA");
    }
}
