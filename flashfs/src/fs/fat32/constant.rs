// SPDX-License-Identifier: MIT

// === Disk Layout Parameters ===

pub const FAT_MAX_SECTOR_SIZE: usize = 4096;
pub const FAT_MIN_SECTOR_SIZE: usize = 512;
pub const FAT_SECTOR_SIZE: u16 = 512; // BPB_BytsPerSec
pub const FAT_CLUSTER_SIZE: u32 = 4096;

pub const DEFAULT_FAT_RESERVED_SECTORS: u16 = 32; // BPB_RsvdSecCnt
pub const FAT_NUM_FATS: u8 = 2; // BPB_NumFATs
pub const FAT_HEADS: u16 = 255; // BPB_NumHeads (CHS hint)
pub const FAT_SECTORS_PER_TRACK: u16 = 63; // BPB_SecPerTrk (CHS hint)
pub const FAT_HIDDEN_SECTORS: u32 = 0; // BPB_HiddSec

// === FAT Region Parameters ===

pub const FAT_ENTRY_SIZE: usize = 4;
pub const FAT_MASK: u32 = 0x0FFF_FFFF; // 28 significant bits
pub const FAT_MEDIA_DESCRIPTOR: u8 = 0xF8; // BPB_Media
pub const FAT_RESERVED_ENTRIES: &[u8] = &[
    FAT_MEDIA_DESCRIPTOR,
    0xFF,
    0xFF,
    0x0F, // FAT[0]
    0xFF,
    0xFF,
    0xFF,
    0x0F, // FAT[1]
];
pub const FAT_EOC: u32 = 0x0FFF_FFFF;
pub const FAT_EOC_MIN: u32 = 0x0FFF_FFF8;
pub const FAT_FIRST_CLUSTER: u32 = crate::core::fat::FIRST_DATA_CLUSTER;
pub const FAT_ROOT_CLUSTER: u32 = 2; // BPB_RootClus
/// FAT32 needs at least this many clusters to not be read as FAT16.
pub const FAT32_MIN_CLUSTERS: u32 = 65_525;

// === Special Sector Numbers ===

pub const FAT_VBR_SECTOR: u64 = 0;
pub const FAT_VBR_BACKUP_SECTOR: u64 = 6;
pub const FAT_FSINFO_SECTOR: u64 = 1;
pub const FAT_FSINFO_BACKUP_SECTOR: u64 = 7;

// === Standard FAT32 BPB / Extended BPB Constants ===

pub const FAT_JUMP_BOOT: [u8; 3] = [0xEB, 0x58, 0x90]; // BS_jmpBoot
pub const FAT_OEM_NAME: &[u8; 8] = b"MSWIN4.1"; // BS_OEMName
pub const FAT_ROOT_ENTRY_COUNT: u16 = 0; // BPB_RootEntCnt (always 0 for FAT32)
pub const FAT_TOTAL_SECTORS_16: u16 = 0; // BPB_TotSec16 (always 0 for FAT32)
pub const FAT_FAT_SIZE_16: u16 = 0; // BPB_FATSz16 (always 0 for FAT32)
pub const FAT_EXT_FLAGS: u16 = 0; // BPB_ExtFlags
pub const FAT_FS_VERSION: u16 = 0; // BPB_FSVer
pub const FAT_DRIVE_NUMBER: u8 = 0x80; // BS_DrvNum
pub const FAT_BOOT_SIGNATURE: u8 = 0x29; // BS_BootSig
pub const FAT_FS_TYPE: &[u8; 8] = b"FAT32   "; // BS_FilSysType
pub const FAT_SIGNATURE: [u8; 2] = [0x55, 0xAA]; // VBR signature
pub const FAT_VOLUME_LABEL_EMPTY: &[u8; 11] = b"NO NAME    ";
pub const FAT_BOOT_CODE_SIZE: usize = 420;

// === FSINFO Constants ===

pub const FAT_FSINFO_LEAD_SIGNATURE: &[u8; 4] = b"RRaA";
pub const FAT_FSINFO_STRUCT_SIGNATURE: &[u8; 4] = b"rrAa";
pub const FAT_FSINFO_FREE_COUNT_UNKNOWN: u32 = 0xFFFF_FFFF;
pub const FAT_FSINFO_TRAIL_SIGNATURE: [u8; 4] = [0x00, 0x00, 0x55, 0xAA];
/// Byte offsets of the two counters inside the FSInfo sector.
pub const FAT_FSINFO_FREE_COUNT_OFFSET: u64 = 488;
pub const FAT_FSINFO_NEXT_FREE_OFFSET: u64 = 492;

// === Directory Entries ===

pub const FAT_DIR_ENTRY_SIZE: usize = 32;
pub const FAT_ENTRY_END_OF_DIR: u8 = 0x00;
pub const FAT_ENTRY_DELETED: u8 = 0xE5;
/// Stands for a leading 0xE5 byte in a stored short name.
pub const FAT_ENTRY_KANJI_E5: u8 = 0x05;
pub const FAT_DOT_NAME: &[u8; 11] = b".          ";
pub const FAT_DOTDOT_NAME: &[u8; 11] = b"..         ";

/// Largest size a FAT32 directory entry can record.
pub const FAT_MAX_FILE_SIZE: u64 = u32::MAX as u64;
