use lockbox_crypto::{generate_document_key, open, seal, EnvelopeSealer, SegmentSize};

fn make_data(size: usize) -> Vec<u8> {
    (0..size)
        .map(|i| (i.wrapping_mul(7) ^ (i >> 3)) as u8)
        .collect()
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_seal(bencher: divan::Bencher, size: usize) {
    let key = generate_document_key();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            seal(
                divan::black_box(&key),
                SegmentSize::default(),
                divan::black_box(&data),
            )
            .unwrap()
        });
}

#[divan::bench(args = [1024, 65536, 1048576])]
fn bench_open(bencher: divan::Bencher, size: usize) {
    let key = generate_document_key();
    let data = make_data(size);
    let sealed = seal(&key, SegmentSize::default(), &data).unwrap();
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| open(divan::black_box(&key), divan::black_box(&sealed)).unwrap());
}

/// Sealing fed in 4 KiB writes, the way a scoped write handle sees data.
#[divan::bench(args = [65536, 1048576])]
fn bench_seal_streaming(bencher: divan::Bencher, size: usize) {
    let key = generate_document_key();
    let data = make_data(size);
    bencher
        .counter(divan::counter::BytesCount::new(size))
        .bench(|| {
            let mut sealer = EnvelopeSealer::new(&key, SegmentSize::default());
            let mut total = 0;
            for piece in divan::black_box(&data).chunks(4096) {
                total += sealer.update(piece).unwrap().len();
            }
            total + sealer.finish().unwrap().len()
        });
}

fn main() {
    divan::main();
}
