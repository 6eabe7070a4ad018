use criterion::{Criterion, criterion_group, criterion_main};

use flashfs::{extent::*, fat32::*};

criterion_group!(benches, extent_bench);
criterion_main!(benches);

const SIZE_BYTES: u64 = 64 << 20;

fn fresh_card(meta: &Fat32Meta) -> CardPort {
    let port = EmulatedCard::new((SIZE_BYTES / 512) as u32).shared();
    let mut io = port.clone();
    Fat32Formatter::new(&mut io, meta)
        .format(false)
        .expect("format failed");
    port
}

pub fn extent_bench(c: &mut Criterion) {
    let meta = Fat32Meta::new(SIZE_BYTES, Some("BENCHFS")).expect("layout failed");
    let header = [0u8; 512];

    c.bench_function("fat32_format", |b| {
        b.iter(|| fresh_card(&meta));
    });

    c.bench_function("prepare_extent_8mib", |b| {
        b.iter_batched(
            || fresh_card(&meta),
            |port| {
                let mut vol = Fat32Volume::open_volume(port.clone()).expect("mount failed");
                let mut card = port;
                let req = ExtentRequest::new("TAKE.WAV", 8 << 20, &header);
                let (handle, range) =
                    prepare_extent(&mut vol, &mut card, &req).expect("prepare failed");
                handle.close(&mut vol, None).expect("close failed");
                range
            },
            criterion::BatchSize::LargeInput,
        );
    });

    let port = fresh_card(&meta);
    let mut vol = Fat32Volume::open_volume(port.clone()).expect("mount failed");
    let mut card = port;
    let req = ExtentRequest::new("STREAM.WAV", 32 << 20, &header);
    let (handle, range) = prepare_extent(&mut vol, &mut card, &req).expect("prepare failed");
    let chunk = vec![0xA5u8; 64 * 1024];

    c.bench_function("extent_writer_64k_blocks", |b| {
        b.iter(|| {
            let mut writer = handle.writer();
            while writer.remaining_bytes() >= chunk.len() as u64 {
                writer.write(&mut card, &chunk).expect("write failed");
            }
            writer.bytes_written()
        });
    });

    c.bench_function("erase_sectors", |b| {
        b.iter(|| erase_sectors(&mut card, range).expect("erase failed"));
    });
}
