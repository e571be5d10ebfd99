use criterion::{criterion_group, criterion_main, Criterion, black_box};

use terrastream::mesh::{ChunkMesher, MarchingCubes};
use terrastream::streaming::{ChunkKey, RenderMask};
use terrastream::terrain::{LayeredNoise, NoiseComposer, NoiseField, default_blueprints};

use glam::{IVec3, UVec3};

fn default_field() -> LayeredNoise {
    let blueprints = default_blueprints();
    let mut composer = NoiseComposer::new();
    composer.buffer_all(&blueprints).unwrap();
    composer.compose_layered(&blueprints, 8.0).unwrap()
}

fn bench_noise_sample(c: &mut Criterion) {
    let noise = NoiseField::new();

    c.bench_function("noise_sample_1k", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for i in 0..1000 {
                let t = i as f64 * 0.173;
                sum += noise.sample(black_box(t), black_box(t * 0.5), black_box(-t));
            }
            sum
        });
    });
}

fn bench_buffer_noise(c: &mut Criterion) {
    let blueprint = default_blueprints().remove(0);

    c.bench_function("buffer_noise_64", |b| {
        b.iter(|| {
            let mut composer = NoiseComposer::new();
            composer.buffer_noise(black_box(&blueprint)).unwrap();
            composer
        });
    });
}

fn bench_layered_sample(c: &mut Criterion) {
    let field = default_field();

    c.bench_function("layered_sample_32k", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for z in 0..32 {
                for y in 0..32 {
                    for x in 0..32 {
                        sum += field.sample(black_box(x as f32), y as f32, z as f32);
                    }
                }
            }
            sum
        });
    });
}

fn bench_march_chunk(c: &mut Criterion) {
    let field = default_field();
    let mesher = MarchingCubes::default();
    let origin = ChunkKey::new(0, 0, 0).world_origin(32);

    c.bench_function("march_chunk_32", |b| {
        b.iter(|| mesher.march(&field, black_box(origin), UVec3::splat(32)));
    });
}

fn bench_desired_keys(c: &mut Criterion) {
    let mask = RenderMask::cube(3);

    c.bench_function("desired_keys_cube3", |b| {
        b.iter(|| mask.desired_keys(black_box(ChunkKey::from(IVec3::new(5, 0, -9)))));
    });
}

criterion_group!(
    benches,
    bench_noise_sample,
    bench_buffer_noise,
    bench_layered_sample,
    bench_march_chunk,
    bench_desired_keys,
);

criterion_main!(benches);
