// SPDX-License-Identifier: MIT

mod common;

use std::io::{Cursor, Read};

use common::*;
use flashfs::{extent::*, fat32::*, fs::fat32::constant::FAT32_MIN_CLUSTERS};
use time::macros::datetime;

/// 1 MiB in front of the volume, as on a partitioned card.
const PARTITION_OFFSET: u64 = 1 << 20;
const PARTITION_LBA: u32 = (PARTITION_OFFSET / 512) as u32;

fn partition_image(port: &CardPort) -> Vec<u8> {
    port.with(|card| card.as_bytes()[PARTITION_OFFSET as usize..].to_vec())
}

fn mounted(port: &CardPort) -> Fat32Volume<CardPort> {
    let mut io = port.clone();
    io.set_offset(PARTITION_OFFSET);
    Fat32Volume::open_volume(io).expect("mount")
}

#[test]
fn test_capture_end_to_end() {
    let (port, meta) = formatted_card(PARTITION_OFFSET, 0xFF);
    let mut vol = mounted(&port);
    let mut card = port.clone();

    // A neighbour file whose data must survive the erase.
    let notes = pattern(3000);
    let f = vol.open("NOTES.TXT", FileMode::Write).unwrap();
    vol.write(f, &notes).unwrap();
    vol.close(f).unwrap();

    vol.mkdir("REC").unwrap();
    let header = [b'H'; 1024];
    let req = ExtentRequest::new("/REC/TAKE1.WAV", 64 * 1024, &header);
    let (handle, range) = prepare_extent(&mut vol, &mut card, &req).unwrap();

    // Geometry is absolute: partition offset included.
    let g = vol.geometry().unwrap();
    assert_eq!(g.data_region_base as u64, PARTITION_LBA as u64 + meta.cluster_heap_offset / 512);
    assert_eq!(
        handle.start_sector(),
        g.data_region_base + (handle.first_cluster() - 2)
    );
    assert_eq!(range.start(), handle.start_sector() + 2);
    assert_eq!(range.len(), 128 - 2);

    port.with(|c| {
        assert_eq!(c.erase_count(), 1);
        assert_eq!(c.block(handle.start_sector()).unwrap(), &header[..512]);
        assert_eq!(c.block(handle.start_sector() + 1).unwrap(), &header[512..]);
        for lba in range.start()..=range.end() {
            assert!(c.block(lba).unwrap().iter().all(|&b| b == 0xFF));
        }
    });

    let mut writer = handle.writer();
    let payload = pattern(40 * 512);
    writer.write(&mut card, &payload[..8 * 512]).unwrap();
    writer.write(&mut card, &payload[8 * 512..]).unwrap();
    let final_len = handle.captured_len(&writer);
    assert_eq!(final_len, 1024 + 40 * 512);

    let free_before_close = vol.free_space_bytes().unwrap();
    handle.close(&mut vol, Some(final_len)).unwrap();
    assert_eq!(vol.free_space_bytes().unwrap(), free_before_close + (128 - 42) * 512);
    vol.unmount().unwrap();

    // Read back through a fresh mount.
    let mut vol = mounted(&port);
    let f = vol.open("REC/TAKE1.WAV", FileMode::Read).unwrap();
    assert_eq!(vol.size(f).unwrap(), final_len);
    let mut back = vec![0u8; final_len as usize];
    assert_eq!(vol.read(f, &mut back).unwrap(), back.len());
    assert_eq!(&back[..1024], &header[..]);
    assert_eq!(&back[1024..], &payload[..]);
    vol.close(f).unwrap();

    let f = vol.open("NOTES.TXT", FileMode::Read).unwrap();
    let mut back = vec![0u8; notes.len()];
    vol.read(f, &mut back).unwrap();
    assert_eq!(back, notes);
}

#[test]
fn test_image_reads_back_with_fatfs() {
    let (port, meta) = formatted_card(PARTITION_OFFSET, 0x00);
    assert!(meta.cluster_count >= FAT32_MIN_CLUSTERS);
    let mut vol = mounted(&port);
    let mut card = port.clone();

    vol.mkdir("REC").unwrap();
    let header = [0x52; 512];
    let req = ExtentRequest::new("REC/TAKE1.WAV", 32 * 1024, &header);
    let (handle, _) = prepare_extent(&mut vol, &mut card, &req).unwrap();

    let mut writer = handle.writer();
    let payload = pattern(10 * 512);
    writer.write(&mut card, &payload).unwrap();
    handle.close(&mut vol, Some(handle.captured_len(&writer))).unwrap();

    vol.set_timestamp("REC/TAKE1.WAV", datetime!(2024-05-17 10:30:42))
        .unwrap();
    vol.unmount().unwrap();

    let fs = fatfs::FileSystem::new(Cursor::new(partition_image(&port)), fatfs::FsOptions::new())
        .expect("fatfs mount");
    assert_eq!(fs.fat_type(), fatfs::FatType::Fat32);

    let entry = fs
        .root_dir()
        .open_dir("REC")
        .unwrap()
        .iter()
        .map(|e| e.unwrap())
        .find(|e| e.file_name() == "TAKE1.WAV")
        .expect("capture file listed");
    assert_eq!(entry.len(), 512 + 10 * 512);
    let modified = entry.modified();
    assert_eq!(
        (modified.date.year, modified.date.month, modified.date.day),
        (2024, 5, 17)
    );
    assert_eq!(
        (modified.time.hour, modified.time.min, modified.time.sec),
        (10, 30, 42)
    );

    let mut content = Vec::new();
    fs.root_dir()
        .open_file("REC/TAKE1.WAV")
        .unwrap()
        .read_to_end(&mut content)
        .unwrap();
    assert_eq!(&content[..512], &header[..]);
    assert_eq!(&content[512..], &payload[..]);
}

#[test]
fn test_failed_preparation_leaves_file_open() {
    let (port, _) = formatted_card(0, 0xFF);
    let mut vol = mounted_at_zero(&port);
    let mut card = port.clone();
    port.with_mut(|c| c.inject_fault(SdCommand::EraseWrBlkEnd, CommandError::Timeout));

    let req = ExtentRequest::new("TAKE1.WAV", 8192, &[]);
    let failure = prepare_extent(&mut vol, &mut card, &req).unwrap_err();
    assert_eq!(failure.stage, PrepStage::Erase);
    assert_eq!(
        failure.error,
        ExtentError::EraseCommandRejected {
            stage: EraseStage::SetEnd,
            cause: CommandError::Timeout
        }
    );

    // Still open, and the reservation is in place.
    let file = failure.file.expect("open handle");
    assert_eq!(vol.open("TAKE1.WAV", FileMode::Read), Err(FsVolumeError::AlreadyOpen));
    assert_eq!(vol.size(file).unwrap(), 8192);
    assert!(vol.is_contiguous(file).unwrap());

    // Once the card recovers the caller can retry on the same range.
    port.with_mut(|c| c.clear_faults());
    let range = resolve_extent(&vol.geometry().unwrap(), vol.first_cluster(file).unwrap(), 8192)
        .unwrap();
    erase_sectors(&mut card, range).unwrap();
    vol.close(file).unwrap();
}

#[test]
fn test_no_room_for_contiguous_run() {
    let (port, _) = formatted_card(0, 0xFF);
    let mut vol = mounted_at_zero(&port);
    let mut card = port.clone();

    let total = vol.disk_size_bytes().unwrap();
    let req = ExtentRequest::new("HUGE.BIN", total, &[]);
    let failure = prepare_extent(&mut vol, &mut card, &req).unwrap_err();

    assert_eq!(failure.stage, PrepStage::Allocate);
    assert!(matches!(failure.error, ExtentError::AllocationFailed(_)));
    port.with(|c| assert!(c.history().is_empty()));

    // Nothing was reserved.
    let file = failure.file.unwrap();
    assert_eq!(vol.first_cluster(file).unwrap(), 0);
    vol.close(file).unwrap();
}

fn mounted_at_zero(port: &CardPort) -> Fat32Volume<CardPort> {
    Fat32Volume::open_volume(port.clone()).expect("mount")
}
