use criterion::{black_box, criterion_group, criterion_main, Criterion};
use depthtk::formats::depth_map::DepthMap;
use depthtk::raster::{read_pgm, write_pgm};
use depthtk::wire::WireMessage;

fn sample_map() -> DepthMap {
    let (width, height) = (640, 480);
    let values = (0..width * height)
        .map(|i| (i % 251) as f32 / 250.0)
        .collect();
    DepthMap::new(width, height, values)
}

fn sample_message() -> WireMessage {
    let mut message = WireMessage::request("IMAGE_AND_DEPTH");
    message.set("pversion", 2).unwrap();
    message.set("status", "new").unwrap();
    message.set("len_image", 65536).unwrap();
    message.set_payload(vec![0xa5; 65536]);
    message
}

fn bench_wire_encode(c: &mut Criterion) {
    c.bench_function("wire_encode", |b| {
        let message = sample_message();
        b.iter(|| black_box(&message).encode())
    });
}

fn bench_wire_decode(c: &mut Criterion) {
    c.bench_function("wire_decode", |b| {
        let bytes = sample_message().encode();
        b.iter(|| WireMessage::decode(black_box(&bytes)))
    });
}

fn bench_write_pgm(c: &mut Criterion) {
    c.bench_function("write_pgm", |b| {
        let map = sample_map();
        b.iter(|| {
            let mut out = Vec::with_capacity(map.values().len() + 32);
            write_pgm(black_box(&map), &mut out).unwrap();
            out
        })
    });
}

fn bench_read_pgm(c: &mut Criterion) {
    c.bench_function("read_pgm", |b| {
        let mut bytes = Vec::new();
        write_pgm(&sample_map(), &mut bytes).unwrap();
        b.iter(|| read_pgm(black_box(&mut bytes.as_slice())).unwrap())
    });
}

criterion_group!(
    benches,
    bench_wire_encode,
    bench_wire_decode,
    bench_write_pgm,
    bench_read_pgm
);
criterion_main!(benches);
