use criterion::{Criterion, black_box, criterion_group, criterion_main};
use counter_tokens::{
    BoundingBox, CounterStore, EngineConfig, GridSpec, Logger, MemoryCanvas, NullSink, Obstacle,
    Point, PresenceSignal, Size, SurfacePresenceTracker, SyncController, TokenGroupSpec,
    find_collision, pack,
};

fn grid() -> GridSpec {
    GridSpec::new(Point::new(30.0, 30.0), Size::new(30.0, 30.0), (35.0, 35.0), 10.0)
}

fn pack_hundred(c: &mut Criterion) {
    let grid = grid();
    c.bench_function("pack_100_instances", |b| {
        b.iter(|| pack(black_box(100), &grid));
    });
}

fn collision_scan(c: &mut Criterion) {
    let obstacles: Vec<Obstacle> = (0..50)
        .map(|i| {
            let left = 30.0 + i as f64 * 200.0;
            Obstacle {
                group: format!("group-{i}"),
                bounding_box: BoundingBox::new(left, left + 170.0, 15.0, 80.0),
                item_height: 30.0,
                spacing_y: 5.0,
            }
        })
        .collect();
    let moved = BoundingBox::new(9_815.0, 9_900.0, 15.0, 45.0);
    c.bench_function("collision_scan_50_groups", |b| {
        b.iter(|| find_collision(black_box(&moved), 30.0, 5.0, obstacles.iter().cloned()));
    });
}

fn build_controller() -> (CounterStore, SyncController) {
    let store = CounterStore::new();
    let presence = SurfacePresenceTracker::new(
        PresenceSignal::new("page-1").with_viewer("ana", "page-2"),
    );
    let config = EngineConfig::default().with_logger(Logger::new(NullSink));
    let controller = SyncController::new(store.clone(), presence, MemoryCanvas::new(), config)
        .expect("controller");
    store.create("hp", Some(40), Some(0)).expect("counter");
    store.create("mp", Some(40), Some(0)).expect("counter");
    controller
        .add_group(TokenGroupSpec::new("hp-token", "hp", "coin.png"))
        .expect("group");
    controller
        .add_group(TokenGroupSpec::new("mp-token", "mp", "gem.png"))
        .expect("group");
    (store, controller)
}

fn counter_swing(c: &mut Criterion) {
    let (store, _controller) = build_controller();
    c.bench_function("counter_swing_two_surfaces", |b| {
        b.iter(|| {
            store.set_value("hp", black_box(25)).expect("set");
            store.set_value("mp", black_box(12)).expect("set");
            store.set_value("hp", black_box(3)).expect("set");
            store.set_value("mp", black_box(0)).expect("set");
        });
    });
}

criterion_group!(benches, pack_hundred, collision_scan, counter_swing);
criterion_main!(benches);
