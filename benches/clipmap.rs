//! Clipmap planning and recording throughput

use cgmath::Vector2;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use hearth_terrain::clipmap::{level_origin, plan_level_update, Clipmap};
use hearth_terrain::gpu::shaders::{displace_shader, slots};
use hearth_terrain::gpu::{FieldFormat, GpuBackend, RecordingBackend, TextureSpec};

const SUBDIVISIONS: u32 = 65;
const LEVELS: u32 = 7;

fn bench_plan(c: &mut Criterion) {
    c.bench_function("plan_level_update diagonal walk", |b| {
        b.iter(|| {
            let mut displaced = [None; LEVELS as usize];
            let mut regions = 0;
            for step in 0..256 {
                let camera = Vector2::new(step as f32 * 0.37, step as f32 * 0.21);
                for level in 0..LEVELS {
                    let origin = level_origin(camera, 0.25, level, SUBDIVISIONS);
                    let slot = &mut displaced[level as usize];
                    regions += plan_level_update(*slot, origin, SUBDIVISIONS).len();
                    *slot = Some(origin);
                }
            }
            black_box(regions)
        })
    });
}

fn bench_run_compute(c: &mut Criterion) {
    let mut backend = RecordingBackend::new();
    let mut clipmap = Clipmap::new(SUBDIVISIONS, LEVELS, 0.25).expect("valid clipmap shape");
    clipmap.init(&mut backend).expect("clipmap init");
    let shader = backend
        .create_compute_shader(&displace_shader())
        .expect("displace shader");
    let heightmap = backend
        .create_texture(&TextureSpec::plane("Heightmap", 256, FieldFormat::R32Float, false))
        .expect("heightmap");
    backend.bind_shader(shader).expect("bind");
    backend.bind_texture(slots::DISPLACE_HEIGHTMAP, heightmap);

    c.bench_function("run_compute incremental frame", |b| {
        let mut x = 0.0f32;
        b.iter(|| {
            let previous = Vector2::new(x, 0.0);
            x += 0.3;
            let stats = clipmap
                .run_compute(
                    &mut backend,
                    shader,
                    slots::DISPLACE_HEIGHTS,
                    Vector2::new(x, 0.0),
                    Some(previous),
                )
                .expect("run_compute");
            backend.clear_commands();
            black_box(stats)
        })
    });
}

criterion_group!(benches, bench_plan, bench_run_compute);
criterion_main!(benches);
