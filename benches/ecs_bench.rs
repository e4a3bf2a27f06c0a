#![allow(dead_code)]

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use relic_ecs::World;

#[derive(Debug, Clone)]
struct Position(f32, f32, f32);

#[derive(Debug, Clone)]
struct Velocity(f32, f32, f32);

#[derive(Debug, Clone)]
struct Health(u32);

fn spawn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn");

    group.bench_function("spawn_2_components", |b| {
        let mut world = World::new();
        b.iter(|| {
            for _ in 0..1000 {
                let e = world.spawn();
                world.set(e, Position(1.0, 2.0, 3.0)).unwrap();
                world.set(e, Velocity(1.0, 0.0, 0.0)).unwrap();
                black_box(e);
            }
        });
    });

    group.bench_function("spawn_3_components", |b| {
        let mut world = World::new();
        b.iter(|| {
            for _ in 0..1000 {
                let e = world.spawn();
                world.set(e, Position(1.0, 2.0, 3.0)).unwrap();
                world.set(e, Velocity(1.0, 0.0, 0.0)).unwrap();
                world.set(e, Health(100)).unwrap();
                black_box(e);
            }
        });
    });

    group.finish();
}

fn churn_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("structural_churn");

    group.bench_function("add_remove_component", |b| {
        let mut world = World::new();
        let mut entities = Vec::new();
        for _ in 0..1000 {
            let e = world.spawn();
            world.set(e, Position(0.0, 0.0, 0.0)).unwrap();
            entities.push(e);
        }
        b.iter(|| {
            for &e in &entities {
                world.set(e, Velocity(1.0, 0.0, 0.0)).unwrap();
            }
            for &e in &entities {
                world.unset::<Velocity>(e).unwrap();
            }
        });
    });

    group.bench_function("deferred_merge_1000", |b| {
        let mut world = World::new();
        b.iter(|| {
            world.begin_deferred();
            for _ in 0..1000 {
                let e = world.spawn();
                world.set(e, Health(1)).unwrap();
                world.destroy(e).unwrap();
            }
            black_box(world.end_deferred());
        });
    });

    group.finish();
}

fn iterate_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("iterate");

    group.bench_function("iter_10k_two_columns", |b| {
        let mut world = World::new();
        for i in 0..10_000 {
            let e = world.spawn();
            world.set(e, Position(i as f32, 0.0, 0.0)).unwrap();
            world.set(e, Velocity(1.0, 0.0, 0.0)).unwrap();
        }
        let query = world.query().with::<Position>().with::<Velocity>().build();
        b.iter(|| {
            let mut sum = 0.0f32;
            for row in query.iter(&world) {
                sum += row.get::<Position>().unwrap().0;
            }
            black_box(sum);
        });
    });

    group.bench_function("each_mut_10k", |b| {
        let mut world = World::new();
        for i in 0..10_000 {
            let e = world.spawn();
            world.set(e, Position(i as f32, 0.0, 0.0)).unwrap();
            world.set(e, Velocity(1.0, 0.0, 0.0)).unwrap();
        }
        let query = world.query().with::<Position>().with::<Velocity>().build();
        b.iter(|| {
            query.each_mut(&mut world, |mut row| {
                let dx = row.get::<Velocity>().unwrap().0;
                row.get_mut::<Position>().unwrap().0 += dx;
            });
        });
    });

    group.finish();
}

criterion_group!(benches, spawn_benchmark, churn_benchmark, iterate_benchmark);
criterion_main!(benches);
