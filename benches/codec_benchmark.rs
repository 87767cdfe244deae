use bytes::BytesMut;
use criterion::measurement::WallTime;
use criterion::{
    black_box, criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion, Throughput,
};
use tokio_util::codec::{Decoder, Encoder};

use spv_net::benchmark_test_util::sample_args;
use spv_net::ucp::pattern::ALL_KINDS;
use spv_net::ucp::{decode, encode, Command, UcpCodec};

pub fn run_codec_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec_benchmark");
    let iterations = vec![100, 1000, 10000];

    encode_benchmark(&mut group, iterations.clone());
    decode_benchmark(&mut group, iterations.clone());
    frame_benchmark(&mut group, iterations.clone());

    group.finish();
}

fn commands(n: u64) -> Vec<Command> {
    (0..n as usize)
        .map(|i| {
            let kind = ALL_KINDS[i % ALL_KINDS.len()];
            Command::new(kind, sample_args(kind)).unwrap()
        })
        .collect()
}

fn encode_benchmark(group: &mut BenchmarkGroup<WallTime>, iterations: Vec<u64>) {
    for i in iterations.iter() {
        let commands = commands(*i);

        group.throughput(Throughput::Elements(*i));
        group.bench_with_input(BenchmarkId::new("encode", i), i, |b, _i| {
            b.iter(|| {
                for command in commands.iter() {
                    black_box(encode(command));
                }
            })
        });
    }
}

fn decode_benchmark(group: &mut BenchmarkGroup<WallTime>, iterations: Vec<u64>) {
    for i in iterations.iter() {
        let encoded = commands(*i).iter().map(encode).collect::<Vec<Vec<u8>>>();

        group.throughput(Throughput::Elements(*i));
        group.bench_with_input(BenchmarkId::new("decode", i), i, |b, _i| {
            b.iter(|| {
                for bytes in encoded.iter() {
                    black_box(decode(bytes).unwrap());
                }
            })
        });
    }
}

fn frame_benchmark(group: &mut BenchmarkGroup<WallTime>, iterations: Vec<u64>) {
    for i in iterations.iter() {
        let mut codec = UcpCodec::default();
        let mut stream = BytesMut::new();
        for command in commands(*i) {
            codec.encode(command, &mut stream).unwrap();
        }

        group.throughput(Throughput::Bytes(stream.len() as u64));
        group.bench_with_input(BenchmarkId::new("frame", i), i, |b, _i| {
            b.iter(|| {
                let mut buf = stream.clone();
                while let Some(frame) = codec.decode(&mut buf).unwrap() {
                    black_box(frame);
                }
            })
        });
    }
}

criterion_group!(benches, run_codec_benchmark);
criterion_main!(benches);
