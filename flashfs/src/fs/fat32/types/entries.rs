// SPDX-License-Identifier: MIT

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::fs::fat32::{attr::*, constant::*, utils};

/// 32-byte short-name directory entry.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct Fat32Entry {
    pub name: [u8; 11],
    pub attr: u8,
    pub nt_reserved: u8,
    pub creation_time_tenth: u8,
    pub creation_time: u16,
    pub creation_date: u16,
    pub access_date: u16,
    pub first_cluster_high: u16,
    pub write_time: u16,
    pub write_date: u16,
    pub first_cluster_low: u16,
    pub file_size: u32,
}

impl Fat32Entry {
    pub fn new(
        name: [u8; 11],
        attr: u8,
        cluster: u32,
        size: u32,
        date: u16,
        time: u16,
        fine: u8,
    ) -> Self {
        let high = ((cluster >> 16) & 0xFFFF) as u16;
        let low = (cluster & 0xFFFF) as u16;
        Self {
            name,
            attr,
            nt_reserved: 0,
            creation_time_tenth: fine,
            creation_time: time,
            creation_date: date,
            access_date: date,
            first_cluster_high: high,
            write_time: time,
            write_date: date,
            first_cluster_low: low,
            file_size: size,
        }
    }

    /// Empty archive file, stamped now.
    pub fn file(name: [u8; 11]) -> Self {
        let (date, time, fine) = utils::datetime_now();
        Self::new(name, Fat32Attributes::ARCHIVE.bits(), 0, 0, date, time, fine)
    }

    pub fn dir(name: [u8; 11], cluster: u32) -> Self {
        let (date, time, fine) = utils::datetime_now();
        Self::new(name, Fat32Attributes::DIRECTORY.bits(), cluster, 0, date, time, fine)
    }

    pub fn volume_label(name: [u8; 11]) -> Self {
        let (date, time, fine) = utils::datetime_now();
        Self::new(name, Fat32Attributes::VOLUME_ID.bits(), 0, 0, date, time, fine)
    }

    pub fn dot(current_cluster: u32) -> Self {
        Self::dir(*FAT_DOT_NAME, current_cluster)
    }

    /// `parent_cluster` is 0 when the parent is the root directory.
    pub fn dotdot(parent_cluster: u32) -> Self {
        Self::dir(*FAT_DOTDOT_NAME, parent_cluster)
    }

    pub fn first_cluster(&self) -> u32 {
        ((self.first_cluster_high as u32) << 16) | (self.first_cluster_low as u32)
    }

    pub fn set_first_cluster(&mut self, cluster: u32) {
        self.first_cluster_high = ((cluster >> 16) & 0xFFFF) as u16;
        self.first_cluster_low = (cluster & 0xFFFF) as u16;
    }

    pub fn set_modified(&mut self, date: u16, time: u16) {
        self.write_date = date;
        self.write_time = time;
        self.access_date = date;
    }

    #[inline]
    pub fn is_end_of_dir(&self) -> bool {
        self.name[0] == FAT_ENTRY_END_OF_DIR
    }

    #[inline]
    pub fn is_deleted(&self) -> bool {
        self.name[0] == FAT_ENTRY_DELETED
    }

    #[inline]
    pub fn is_lfn(&self) -> bool {
        Fat32Attributes::is_lfn(self.attr)
    }

    #[inline]
    pub fn is_volume_label(&self) -> bool {
        !self.is_lfn() && self.attr & Fat32Attributes::VOLUME_ID.bits() != 0
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        !self.is_lfn() && self.attr & Fat32Attributes::DIRECTORY.bits() != 0
    }

    /// Live short-name entry that names a file or directory.
    #[inline]
    pub fn is_named(&self) -> bool {
        !self.is_end_of_dir() && !self.is_deleted() && !self.is_lfn() && !self.is_volume_label()
    }
}
