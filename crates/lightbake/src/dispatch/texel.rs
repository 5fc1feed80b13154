use glam::Vec3;
use rayon::prelude::*;

use super::{Dispatch, PreparedScene, Strategy};
use crate::atlas::{texel_center, Atlas};

/// One task per texel. Each task sums every covering triangle, in triangle
/// order, and is the only writer of its cell.
#[derive(Clone, Copy, Debug, Default)]
pub struct TexelDriven;

impl Dispatch for TexelDriven {
    fn strategy(&self) -> Strategy {
        Strategy::TexelDriven
    }

    fn dispatch(&self, scene: &PreparedScene, atlas: &mut Atlas, batch_size: usize) {
        let (width, height) = (atlas.width(), atlas.height());
        let baseline = atlas.baseline();
        let Atlas {
            texels, coverage, ..
        } = atlas;

        texels
            .par_iter_mut()
            .zip(coverage.par_iter_mut())
            .enumerate()
            .with_min_len(batch_size)
            .for_each(|(i, (texel, count))| {
                let x = (i % width as usize) as u32;
                let y = (i / width as usize) as u32;
                let p = texel_center(x, y, width, height);

                let mut sum = Vec3::ZERO;
                let mut hits = 0u32;
                for (tri, value) in scene.triangles.iter().zip(&scene.contributions) {
                    if tri.covers(p) {
                        sum += *value;
                        hits += 1;
                    }
                }

                *texel = Atlas::resolve(baseline, sum);
                *count = hits;
            });
    }
}
