//! Benchmarks for collision detection and scene stepping.
//!
//! Run with: cargo bench -p sim-core
//!
//! Groups:
//! - `box_to_box`: narrow phase on face, edge and separated configurations
//! - `dynamic_tree`: insertion and region queries on random boxes
//! - `scene_step`: full steps on piles of random cubes

#![allow(missing_docs, clippy::wildcard_imports)]

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use nalgebra::{Point3, Vector3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use sim_contact::Manifold;
use sim_core::{Aabb, BodyDef, BoxDef, DynamicTree, OrientedBox, Scene, SceneConfig, Transform, box_to_box};

fn random_point(rng: &mut StdRng, extent: f64) -> Point3<f64> {
    Point3::new(
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
        rng.gen_range(-extent..extent),
    )
}

/// A floor plus `count` unit cubes scattered above it.
fn random_pile(count: usize, seed: u64) -> Scene {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut scene = Scene::new(SceneConfig::default()).expect("valid config");

    let floor = scene.create_body(&BodyDef::fixed()).expect("heap has room");
    scene
        .add_box(floor, &BoxDef::new(Transform::identity(), Vector3::new(50.0, 50.0, 0.5)))
        .expect("valid box");

    let side = (count as f64).cbrt().ceil().max(1.0);
    for i in 0..count {
        let layer = (i as f64 / (side * side)).floor();
        let position = Point3::new(
            rng.gen_range(-side..side) * 1.2,
            rng.gen_range(-side..side) * 1.2,
            1.5 + layer * 1.2,
        );
        let def = BodyDef::dynamic()
            .with_position(position)
            .with_rotation(Vector3::new(rng.r#gen(), rng.r#gen(), rng.r#gen()), rng.gen_range(0.0..1.0));
        let body = scene.create_body(&def).expect("heap has room");
        scene
            .add_box(body, &BoxDef::new(Transform::identity(), Vector3::repeat(0.5)))
            .expect("valid box");
    }
    scene
}

fn bench_box_to_box(c: &mut Criterion) {
    let mut group = c.benchmark_group("box_to_box");
    let half = Vector3::repeat(0.5);
    let a = OrientedBox::new(Transform::identity(), half);

    let cases = [
        ("face", Transform::from_position(Point3::new(0.0, 0.0, 0.95))),
        (
            "face_rotated",
            Transform::from_axis_angle(Point3::new(0.1, 0.0, 0.95), Vector3::z(), 0.4),
        ),
        (
            "edge",
            Transform::from_axis_angle(Point3::new(0.0, 0.0, 1.15), Vector3::new(1.0, 1.0, 0.0), 0.8),
        ),
        ("separated", Transform::from_position(Point3::new(3.0, 0.0, 0.0))),
    ];

    for (name, tx) in cases {
        let b = OrientedBox::new(tx, half);
        group.bench_with_input(BenchmarkId::new("pair", name), &(a, b), |bench, (a, b)| {
            let mut manifold = Manifold::new(false);
            bench.iter(|| black_box(box_to_box(a, b, &mut manifold)));
        });
    }

    group.finish();
}

fn bench_dynamic_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("dynamic_tree");

    for count in [100, 1_000, 10_000] {
        let mut rng = StdRng::seed_from_u64(7);
        let boxes: Vec<Aabb> = (0..count)
            .map(|_| Aabb::from_center(random_point(&mut rng, 100.0), Vector3::repeat(0.5)))
            .collect();

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("build", count), &boxes, |b, boxes| {
            b.iter(|| {
                let mut tree = DynamicTree::new(0.5);
                for (i, aabb) in boxes.iter().enumerate() {
                    tree.insert(*aabb, i);
                }
                black_box(tree.height())
            });
        });

        let mut tree = DynamicTree::new(0.5);
        for (i, aabb) in boxes.iter().enumerate() {
            tree.insert(*aabb, i);
        }
        group.bench_with_input(BenchmarkId::new("query", count), &boxes, |b, boxes| {
            b.iter(|| {
                let mut hits = 0usize;
                for aabb in boxes.iter().take(100) {
                    tree.query_aabb(aabb, |_| {
                        hits += 1;
                        true
                    });
                }
                black_box(hits)
            });
        });
    }

    group.finish();
}

fn bench_scene_step(c: &mut Criterion) {
    let mut group = c.benchmark_group("scene_step");
    group.sample_size(20);

    for count in [64, 256, 1_000] {
        let mut settled = random_pile(count, 42);
        for _ in 0..60 {
            settled.step().expect("stable pile");
        }

        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("settling_pile", count), &settled, |b, scene| {
            b.iter_batched(
                || scene.clone(),
                |mut scene| black_box(scene.step().expect("stable pile")),
                criterion::BatchSize::LargeInput,
            );
        });
    }

    group.finish();
}

criterion_group!(benches, bench_box_to_box, bench_dynamic_tree, bench_scene_step);
criterion_main!(benches);
