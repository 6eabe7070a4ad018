// SPDX-License-Identifier: MIT
#![allow(dead_code)]

use std::cell::RefCell;

use flashfs::fat32::*;

/// Every filesystem call a [`MockFs`] saw, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Open(String, FileMode),
    Allocate(u64),
    IsContiguous,
    Write(usize),
    Flush,
    Seek(u64),
    FirstCluster,
    SetLen(u64),
    Close,
}

pub const FILE: u32 = 7;

/// Scriptable [`ExtentFs`] with a fixed geometry and a single file.
pub struct MockFs {
    pub mounted: bool,
    pub geometry: VolumeGeometry,
    pub first_cluster: u32,
    pub contiguous: bool,
    pub open_error: Option<FsError>,
    pub allocate_error: Option<FsError>,
    pub write_error: Option<FsError>,
    /// Accept at most this many bytes per write.
    pub short_write: Option<usize>,
    pub calls: RefCell<Vec<Call>>,
}

impl MockFs {
    /// spc 8, data region at sector 2048, file at cluster 10.
    pub fn new() -> Self {
        Self {
            mounted: true,
            geometry: VolumeGeometry {
                bytes_per_sector: 512,
                sectors_per_cluster: 8,
                data_region_base: 2048,
                cluster_count: 100_000,
            },
            first_cluster: 10,
            contiguous: true,
            open_error: None,
            allocate_error: None,
            write_error: None,
            short_write: None,
            calls: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn saw(&self, call: &Call) -> bool {
        self.calls.borrow().contains(call)
    }

    fn record(&self, call: Call) {
        self.calls.borrow_mut().push(call);
    }
}

impl ExtentFs for MockFs {
    type File = u32;

    fn is_mounted(&self) -> bool {
        self.mounted
    }

    fn geometry(&self) -> FsResult<VolumeGeometry> {
        if !self.mounted {
            return Err(FsVolumeError::NotMounted.into());
        }
        Ok(self.geometry)
    }

    fn open(&mut self, path: &str, mode: FileMode) -> FsResult<u32> {
        self.record(Call::Open(path.to_string(), mode));
        match self.open_error {
            Some(e) => Err(e),
            None => Ok(FILE),
        }
    }

    fn allocate_contiguous(&mut self, _: u32, total_bytes: u64) -> FsResult {
        self.record(Call::Allocate(total_bytes));
        match self.allocate_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn is_contiguous(&mut self, _: u32) -> FsResult<bool> {
        self.record(Call::IsContiguous);
        Ok(self.contiguous)
    }

    fn write(&mut self, _: u32, data: &[u8]) -> FsResult<usize> {
        self.record(Call::Write(data.len()));
        if let Some(e) = self.write_error {
            return Err(e);
        }
        Ok(self.short_write.map_or(data.len(), |n| n.min(data.len())))
    }

    fn flush(&mut self, _: u32) -> FsResult {
        self.record(Call::Flush);
        Ok(())
    }

    fn seek(&mut self, _: u32, offset: u64) -> FsResult {
        self.record(Call::Seek(offset));
        Ok(())
    }

    fn first_cluster(&self, _: u32) -> FsResult<u32> {
        self.record(Call::FirstCluster);
        Ok(self.first_cluster)
    }

    fn set_len(&mut self, _: u32, len: u64) -> FsResult {
        self.record(Call::SetLen(len));
        Ok(())
    }

    fn close(&mut self, _: u32) -> FsResult {
        self.record(Call::Close);
        Ok(())
    }
}

/// Card large enough for the mock geometry's extents.
pub fn card() -> EmulatedCard {
    EmulatedCard::new(8192)
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 256) as u8).collect()
}

/// A 40 MiB FAT32 volume (512-byte clusters) at `partition_offset` on a fresh card.
///
/// Large enough to count as FAT32 for independent readers.
pub fn formatted_card(partition_offset: u64, erased_byte: u8) -> (CardPort, Fat32Meta) {
    const VOLUME: u64 = 40 << 20;
    let blocks = ((partition_offset + VOLUME) / 512) as u32;
    let port = EmulatedCard::new(blocks)
        .with_erased_byte(erased_byte)
        .shared();

    let meta = Fat32Meta::new_custom(VOLUME, Some("CAPTURE"), 0x2026_1016, 2, 512, 512, 32)
        .expect("layout");
    let mut io = port.clone();
    io.set_offset(partition_offset);
    Fat32Formatter::new(&mut io, &meta)
        .format(false)
        .expect("format");
    (port, meta)
}
