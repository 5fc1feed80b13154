//! Write paths for the triangle-driven pass, where many tasks can hit one
//! texel. Neither path overwrites: every contribution is added exactly once.

use std::sync::atomic::{AtomicU32, Ordering};

use glam::Vec3;
use rayon::prelude::*;

use crate::atlas::Atlas;

/// Add-and-store into a shared grid from any number of tasks at once.
pub trait AtomicAccumulator: Sync {
    fn accumulate(&self, texel: usize, value: Vec3);
}

/// Shared RGB sums stored as `f32` bit patterns, plus coverage counters.
///
/// Float addition is not associative, so color sums can differ in the last
/// bits between runs. Coverage counts are exact.
pub struct AtomicGrid {
    rgb: Vec<[AtomicU32; 3]>,
    hits: Vec<AtomicU32>,
}

impl AtomicGrid {
    pub fn new(len: usize) -> Self {
        // 0u32 is the bit pattern of 0.0f32.
        Self {
            rgb: (0..len)
                .map(|_| [AtomicU32::new(0), AtomicU32::new(0), AtomicU32::new(0)])
                .collect(),
            hits: (0..len).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.hits.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    /// Write `baseline + sum` into every texel. Consumes the grid, so it can
    /// only run once all accumulating tasks are done.
    pub fn resolve_into(self, atlas: &mut Atlas, batch_size: usize) {
        debug_assert_eq!(self.len(), atlas.len());

        let baseline = atlas.baseline();
        let Atlas {
            texels, coverage, ..
        } = atlas;

        texels
            .par_iter_mut()
            .zip(coverage.par_iter_mut())
            .zip(self.rgb.into_par_iter().zip(self.hits.into_par_iter()))
            .with_min_len(batch_size)
            .for_each(|((texel, count), (rgb, hits))| {
                let [r, g, b] = rgb.map(|c| f32::from_bits(c.into_inner()));
                *texel = Atlas::resolve(baseline, Vec3::new(r, g, b));
                *count = hits.into_inner();
            });
    }
}

#[inline]
fn atomic_add_f32(cell: &AtomicU32, v: f32) {
    // The closure never returns None, so the update cannot fail.
    let _ = cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
        Some((f32::from_bits(bits) + v).to_bits())
    });
}

impl AtomicAccumulator for AtomicGrid {
    #[inline]
    fn accumulate(&self, texel: usize, value: Vec3) {
        let cell = &self.rgb[texel];
        atomic_add_f32(&cell[0], value.x);
        atomic_add_f32(&cell[1], value.y);
        atomic_add_f32(&cell[2], value.z);
        self.hits[texel].fetch_add(1, Ordering::Relaxed);
    }
}

/// One entry in a texel's candidate list.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub triangle: u32,
    pub value: Vec3,
}

/// Per-texel candidate lists in CSR form: texel `i` owns
/// `candidates[offsets[i]..offsets[i + 1]]`, sorted by triangle id.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScatterBuffer {
    offsets: Vec<usize>,
    candidates: Vec<Candidate>,
}

impl ScatterBuffer {
    /// Bucket phase-one output by texel.
    ///
    /// `fragments[t]` lists the texels triangle `t` covers. Triangles are
    /// visited in index order, so each texel's list comes out sorted.
    pub fn from_fragments(texel_count: usize, fragments: &[Vec<u32>], values: &[Vec3]) -> Self {
        debug_assert_eq!(fragments.len(), values.len());

        let mut offsets = vec![0usize; texel_count + 1];
        for &texel in fragments.iter().flatten() {
            offsets[texel as usize + 1] += 1;
        }
        for i in 1..offsets.len() {
            offsets[i] += offsets[i - 1];
        }

        let mut cursor = offsets[..texel_count].to_vec();
        let mut candidates = vec![
            Candidate {
                triangle: 0,
                value: Vec3::ZERO,
            };
            offsets[texel_count]
        ];

        for (t, covered) in fragments.iter().enumerate() {
            for &texel in covered {
                let slot = &mut cursor[texel as usize];
                candidates[*slot] = Candidate {
                    triangle: t as u32,
                    value: values[t],
                };
                *slot += 1;
            }
        }

        Self {
            offsets,
            candidates,
        }
    }

    #[inline]
    pub fn texel_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Total number of (texel, triangle) pairs.
    #[inline]
    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn candidates(&self, texel: usize) -> &[Candidate] {
        &self.candidates[self.offsets[texel]..self.offsets[texel + 1]]
    }

    /// Reduce every list in triangle order and write the atlas, one task per
    /// texel.
    pub fn resolve_into(&self, atlas: &mut Atlas, batch_size: usize) {
        debug_assert_eq!(self.texel_count(), atlas.len());

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
                let list = self.candidates(i);
                debug_assert!(list.windows(2).all(|w| w[0].triangle < w[1].triangle));

                let sum = list.iter().fold(Vec3::ZERO, |acc, c| acc + c.value);
                *texel = Atlas::resolve(baseline, sum);
                *count = list.len() as u32;
            });
    }
}
