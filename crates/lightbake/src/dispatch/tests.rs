use glam::{Vec2, Vec3};

use super::*;
use crate::atlas::texel_center;
use crate::vertex::Vertex;

const BASELINE: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

const ALL: [(Strategy, AccumulationMode); 3] = [
    (Strategy::TexelDriven, AccumulationMode::ScatterResolve),
    (Strategy::TriangleDriven, AccumulationMode::Atomic),
    (Strategy::TriangleDriven, AccumulationMode::ScatterResolve),
];

fn store(uvs: &[[f32; 2]]) -> VertexStore {
    let vertices = uvs
        .iter()
        .map(|&uv| Vertex::at_light_uv(Vec2::from_array(uv)))
        .collect();
    VertexStore::from_vertices(vertices).unwrap()
}

fn bake(
    strategy: Strategy,
    accumulation: AccumulationMode,
    store: &VertexStore,
    contribution: &Contribution,
    width: u32,
    height: u32,
) -> Atlas {
    let scene = PreparedScene::prepare(store, contribution).unwrap();
    let mut atlas = Atlas::new(width, height, BASELINE);
    strategy
        .dispatcher(accumulation)
        .dispatch(&scene, &mut atlas, 4);
    atlas
}

/// Small deterministic generator; keeps the scenes reproducible.
struct Lcg(u64);

impl Lcg {
    fn next_f32(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        ((self.0 >> 40) as f32) / (1u64 << 24) as f32
    }
}

fn scattered_triangles(count: usize, seed: u64) -> Vec<[f32; 2]> {
    let mut rng = Lcg(seed);
    let mut uvs = Vec::with_capacity(count * 3);
    for _ in 0..count {
        let center = Vec2::new(rng.next_f32(), rng.next_f32());
        for _ in 0..3 {
            let offset = Vec2::new(rng.next_f32() - 0.5, rng.next_f32() - 0.5) * 0.2;
            uvs.push((center + offset).clamp(Vec2::ZERO, Vec2::ONE).to_array());
        }
    }
    uvs
}

#[test]
fn right_triangle_covers_texels_under_the_diagonal() {
    let store = store(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);

    for (strategy, mode) in ALL {
        let atlas = bake(strategy, mode, &store, &Contribution::default(), 4, 4);

        for y in 0..4 {
            for x in 0..4 {
                let c = texel_center(x, y, 4, 4);
                let expected = c.x + c.y <= 1.0;
                assert_eq!(
                    atlas.coverage_at(x, y) > 0,
                    expected,
                    "{strategy} {mode:?} texel ({x}, {y})"
                );
            }
        }
        assert_eq!(atlas.covered_texels(), 10, "{strategy} {mode:?}");
    }
}

#[test]
fn uncovered_texels_keep_the_baseline() {
    let store = store(&[[0.0, 0.0], [0.3, 0.0], [0.0, 0.3]]);
    let atlas = bake(
        Strategy::TexelDriven,
        AccumulationMode::ScatterResolve,
        &store,
        &Contribution::Constant([0.5, 0.5, 0.5]),
        8,
        8,
    );

    let tri = &PreparedScene::prepare(&store, &Contribution::default())
        .unwrap()
        .triangles[0];
    for y in 0..8 {
        for x in 0..8 {
            if !tri.covers(texel_center(x, y, 8, 8)) {
                assert_eq!(atlas.texel(x, y), BASELINE);
            } else {
                assert_eq!(atlas.texel(x, y), [0.5, 0.5, 0.5, 1.0]);
            }
        }
    }
}

#[test]
fn zero_area_triangles_add_nothing() {
    let store = store(&[
        [0.5, 0.5],
        [0.5, 0.5],
        [0.5, 0.5],
        [0.0, 0.0],
        [0.5, 0.5],
        [1.0, 1.0],
    ]);

    for (strategy, mode) in ALL {
        let atlas = bake(strategy, mode, &store, &Contribution::default(), 16, 16);
        assert_eq!(atlas.covered_texels(), 0, "{strategy} {mode:?}");
        assert!(atlas.texels().iter().all(|t| *t == BASELINE));
    }
}

#[test]
fn overlapping_triangles_are_summed_not_maxed() {
    let tri = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]];
    let store = store(&[tri[0], tri[1], tri[2], tri[0], tri[1], tri[2]]);
    let contribution = Contribution::PerTriangle(vec![[0.25, 0.0, 0.0], [0.5, 0.0, 0.0]]);

    for (strategy, mode) in ALL {
        let atlas = bake(strategy, mode, &store, &contribution, 4, 4);
        assert_eq!(atlas.texel(0, 0), [0.75, 0.0, 0.0, 1.0], "{strategy} {mode:?}");
        assert_eq!(atlas.coverage_at(0, 0), 2);
        assert_eq!(atlas.texel(3, 3), BASELINE);
    }
}

#[test]
fn strategies_agree_on_a_scattered_scene() {
    let store = store(&scattered_triangles(300, 7));
    let contribution = Contribution::PerTriangle(
        (0..store.triangle_count())
            .map(|t| [0.01 * (t % 7) as f32, 0.02, 0.003 * (t % 11) as f32])
            .collect(),
    );

    let texel = bake(
        Strategy::TexelDriven,
        AccumulationMode::ScatterResolve,
        &store,
        &contribution,
        64,
        48,
    );
    let scatter = bake(
        Strategy::TriangleDriven,
        AccumulationMode::ScatterResolve,
        &store,
        &contribution,
        64,
        48,
    );
    let atomic = bake(
        Strategy::TriangleDriven,
        AccumulationMode::Atomic,
        &store,
        &contribution,
        64,
        48,
    );

    assert!(texel.covered_texels() > 0);
    assert_eq!(texel.coverage(), scatter.coverage());
    assert_eq!(texel.coverage(), atomic.coverage());

    // Same summation order, so bit-identical.
    assert_eq!(texel.texels(), scatter.texels());

    for (a, b) in texel.texels().iter().zip(atomic.texels()) {
        for c in 0..4 {
            assert!((a[c] - b[c]).abs() < 1e-4, "{a:?} vs {b:?}");
        }
    }
}

#[test]
fn winding_order_does_not_change_the_bake() {
    let ccw = store(&[[0.1, 0.1], [0.9, 0.2], [0.4, 0.8]]);
    let cw = store(&[[0.1, 0.1], [0.4, 0.8], [0.9, 0.2]]);

    for (strategy, mode) in ALL {
        let a = bake(strategy, mode, &ccw, &Contribution::default(), 32, 32);
        let b = bake(strategy, mode, &cw, &Contribution::default(), 32, 32);
        assert!(a.covered_texels() > 0);
        assert_eq!(a, b, "{strategy} {mode:?}");
    }
}

#[test]
fn empty_scene_is_all_baseline() {
    let empty = VertexStore::from_vertices(Vec::new()).unwrap();

    for (strategy, mode) in ALL {
        let atlas = bake(strategy, mode, &empty, &Contribution::default(), 8, 8);
        assert!(!atlas.has_non_finite());
        assert!(atlas.texels().iter().all(|t| *t == BASELINE));
        assert_eq!(atlas.covered_texels(), 0);
    }
}

#[test]
fn batch_size_does_not_change_the_result() {
    let store = store(&scattered_triangles(50, 99));
    let scene = PreparedScene::prepare(&store, &Contribution::default()).unwrap();

    for (strategy, mode) in ALL {
        let dispatcher = strategy.dispatcher(mode);
        let mut small = Atlas::new(40, 40, BASELINE);
        let mut large = Atlas::new(40, 40, BASELINE);
        dispatcher.dispatch(&scene, &mut small, 1);
        dispatcher.dispatch(&scene, &mut large, 1024);
        assert_eq!(small.coverage(), large.coverage(), "{strategy} {mode:?}");
    }
}

#[test]
fn light_uv_outside_the_atlas_is_rejected() {
    let store = store(&[[0.0, 0.0], [1.5, 0.0], [0.0, 1.0]]);
    let err = PreparedScene::prepare(&store, &Contribution::default()).unwrap_err();
    assert!(matches!(err, BakeError::Configuration(_)));

    let nan = store_with_nan();
    assert!(PreparedScene::prepare(&nan, &Contribution::default()).is_err());
}

fn store_with_nan() -> VertexStore {
    let mut vertices = vec![Vertex::at_light_uv(Vec2::ZERO); 3];
    vertices[1].light_uv = Vec2::new(f32::NAN, 0.5);
    VertexStore::from_vertices(vertices).unwrap()
}

#[test]
fn degenerate_triangles_are_counted() {
    let store = store(&[[0.2, 0.2], [0.2, 0.2], [0.2, 0.2], [0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]);
    let scene = PreparedScene::prepare(&store, &Contribution::Constant([1.0, 0.0, 0.0])).unwrap();
    assert_eq!(scene.triangle_count(), 2);
    assert_eq!(scene.degenerate_count(), 1);
    assert_eq!(scene.contributions[1], Vec3::X);
}
