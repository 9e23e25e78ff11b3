use criterion::{black_box, criterion_group, criterion_main, Criterion};
use topspeed::binary::RandomAccess;
use topspeed::block::Block;
use topspeed::codec;
use topspeed::crypto::Key;
use topspeed::recovery::{CandidateRange, PartialKey};

fn bench_rle_expand(c: &mut Criterion) {
    // 1 literal byte + 0x7E repeats, over and over: 512 runs -> ~64 KiB
    let mut encoded = Vec::new();
    for i in 0..512u32 {
        encoded.extend([0x01, i as u8, 0x7E]);
    }
    encoded.extend([0x01, 0xFF]);
    let rx = RandomAccess::from(encoded);

    c.bench_function("rle_expand_64k", |b| {
        b.iter(|| {
            let mut rx = rx.clone();
            codec::expand(black_box(&mut rx), 0x10000).unwrap()
        })
    });
}

fn bench_key_scan(c: &mut Criterion) {
    let cipher = Block::new(core::array::from_fn(|i| 0x0123_4567i32.wrapping_mul(i as i32 + 1)));
    let plain = Block::new(core::array::from_fn(|i| 0x7654_3210i32.wrapping_mul(i as i32 + 3)));
    let range = CandidateRange::new(0, 1 << 20).unwrap();
    let key = PartialKey::new();

    c.bench_function("cross_scan_1m", |b| {
        b.iter(|| key.key_index_scan_in(15, black_box(&cipher), &plain, &range).unwrap())
    });
    c.bench_function("self_scan_1m", |b| {
        b.iter(|| key.key_index_self_scan_in(15, black_box(&cipher), &plain, &range).unwrap())
    });
}

fn bench_decrypt(c: &mut Criterion) {
    let key = Key::new(core::array::from_fn(|i| 0x1357_9BDFi32.wrapping_add(i as i32 * 0x0101)));
    let data = vec![0xA5u8; 1024 * 1024];

    c.bench_function("decrypt_1mb", |b| {
        b.iter(|| {
            let mut buf = data.clone();
            key.decrypt(black_box(&mut buf));
            buf
        })
    });
}

criterion_group!(benches, bench_rle_expand, bench_key_scan, bench_decrypt);
criterion_main!(benches);
