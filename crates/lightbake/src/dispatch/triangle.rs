use rayon::prelude::*;

use super::accumulate::{AtomicAccumulator, AtomicGrid, ScatterBuffer};
use super::{Dispatch, PreparedScene, Strategy};
use crate::atlas::{texel_center, Atlas};
use crate::config::AccumulationMode;
use crate::coverage::LightTriangle;

/// Inclusive texel rectangle `[x0, x1] x [y0, y1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TexelRect {
    pub x0: u32,
    pub y0: u32,
    pub x1: u32,
    pub y1: u32,
}

impl TexelRect {
    /// Texel rectangle spanned by a triangle's light UVs, `floor(uv * size)`
    /// per corner. `uv == 1.0` lands on the last texel rather than past it.
    /// Degenerate triangles and empty atlases get no rectangle.
    pub fn of(tri: &LightTriangle, width: u32, height: u32) -> Option<Self> {
        if tri.degenerate || width == 0 || height == 0 {
            return None;
        }

        let (min, max) = tri.bounds();
        let to_texel = |uv: f32, size: u32| ((uv * size as f32).floor() as u32).min(size - 1);

        Some(Self {
            x0: to_texel(min.x, width),
            y0: to_texel(min.y, height),
            x1: to_texel(max.x, width),
            y1: to_texel(max.y, height),
        })
    }

    #[inline]
    pub fn area(&self) -> usize {
        (self.x1 - self.x0 + 1) as usize * (self.y1 - self.y0 + 1) as usize
    }
}

/// Call `f` with the atlas index of every texel whose center `tri` covers.
#[inline]
fn for_each_covered(tri: &LightTriangle, width: u32, height: u32, mut f: impl FnMut(usize)) {
    let Some(rect) = TexelRect::of(tri, width, height) else {
        return;
    };

    for y in rect.y0..=rect.y1 {
        for x in rect.x0..=rect.x1 {
            if tri.covers(texel_center(x, y, width, height)) {
                f(y as usize * width as usize + x as usize);
            }
        }
    }
}

/// One task per triangle, scanning its texel rectangle. Rectangles of
/// different triangles overlap, so writes go through `accumulation`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TriangleDriven {
    pub accumulation: AccumulationMode,
}

impl Dispatch for TriangleDriven {
    fn strategy(&self) -> Strategy {
        Strategy::TriangleDriven
    }

    fn dispatch(&self, scene: &PreparedScene, atlas: &mut Atlas, batch_size: usize) {
        match self.accumulation {
            AccumulationMode::Atomic => atomic_pass(scene, atlas, batch_size),
            AccumulationMode::ScatterResolve => scatter_resolve_pass(scene, atlas, batch_size),
        }
    }
}

fn atomic_pass(scene: &PreparedScene, atlas: &mut Atlas, batch_size: usize) {
    let (width, height) = (atlas.width(), atlas.height());
    let grid = AtomicGrid::new(atlas.len());

    (0..scene.triangle_count())
        .into_par_iter()
        .with_min_len(batch_size)
        .for_each(|t| {
            let value = scene.contributions[t];
            for_each_covered(&scene.triangles[t], width, height, |texel| {
                grid.accumulate(texel, value)
            });
        });

    grid.resolve_into(atlas, batch_size);
}

fn scatter_resolve_pass(scene: &PreparedScene, atlas: &mut Atlas, batch_size: usize) {
    let (width, height) = (atlas.width(), atlas.height());

    // Phase 1: every triangle lists the texels it covers. `collect` keeps
    // the lists in triangle order.
    let fragments: Vec<Vec<u32>> = (0..scene.triangle_count())
        .into_par_iter()
        .with_min_len(batch_size)
        .map(|t| {
            let mut covered = Vec::new();
            for_each_covered(&scene.triangles[t], width, height, |texel| {
                covered.push(texel as u32)
            });
            covered
        })
        .collect();

    // Phase 2: separate dispatch, one task per texel.
    ScatterBuffer::from_fragments(atlas.len(), &fragments, &scene.contributions)
        .resolve_into(atlas, batch_size);
}
