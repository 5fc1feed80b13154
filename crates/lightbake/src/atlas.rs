//! The output atlas: the only state a dispatch mutates.

use glam::{Vec2, Vec3};
use lmap::LmapAtlas;

use crate::config::BakeConfig;

/// Light-UV position of the center of texel `(x, y)`.
///
/// Both dispatch strategies sample through this one function so their
/// coverage decisions are bit-for-bit the same.
#[inline(always)]
pub fn texel_center(x: u32, y: u32, width: u32, height: u32) -> Vec2 {
    Vec2::new(
        (x as f32 + 0.5) / width as f32,
        (y as f32 + 0.5) / height as f32,
    )
}

/// Row-major RGBA grid plus a per-texel count of covering triangles.
#[derive(Clone, Debug, PartialEq)]
pub struct Atlas {
    width: u32,
    height: u32,
    baseline: [f32; 4],
    pub(crate) texels: Vec<[f32; 4]>,
    pub(crate) coverage: Vec<u32>,
}

impl Atlas {
    /// A freshly cleared atlas.
    pub fn new(width: u32, height: u32, baseline: [f32; 4]) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            baseline,
            texels: vec![baseline; len],
            coverage: vec![0; len],
        }
    }

    pub fn for_config(config: &BakeConfig) -> Self {
        Self::new(config.atlas_width, config.atlas_height, config.baseline)
    }

    /// Reset every texel to the baseline and drop all coverage.
    pub fn clear(&mut self) {
        self.texels.fill(self.baseline);
        self.coverage.fill(0);
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn baseline(&self) -> [f32; 4] {
        self.baseline
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.texels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.texels.is_empty()
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    pub fn texel(&self, x: u32, y: u32) -> [f32; 4] {
        self.texels[self.index(x, y)]
    }

    pub fn coverage_at(&self, x: u32, y: u32) -> u32 {
        self.coverage[self.index(x, y)]
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    pub fn coverage(&self) -> &[u32] {
        &self.coverage
    }

    /// Raw native-endian texel payload, as a GPU read-back would see it.
    pub fn texel_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    /// `true` for every texel at least one triangle covered.
    pub fn coverage_mask(&self) -> Vec<bool> {
        self.coverage.iter().map(|&n| n > 0).collect()
    }

    pub fn covered_texels(&self) -> usize {
        self.coverage.iter().filter(|&&n| n > 0).count()
    }

    /// Whether any channel holds a NaN or infinity.
    pub fn has_non_finite(&self) -> bool {
        self.texels.iter().flatten().any(|c| !c.is_finite())
    }

    /// Final texel value for an accumulated sum.
    #[inline(always)]
    pub(crate) fn resolve(baseline: [f32; 4], sum: Vec3) -> [f32; 4] {
        [
            baseline[0] + sum.x,
            baseline[1] + sum.y,
            baseline[2] + sum.z,
            baseline[3],
        ]
    }

    pub fn to_lmap(&self) -> LmapAtlas {
        LmapAtlas {
            width: self.width,
            height: self.height,
            baseline: self.baseline,
            texels: self.texels.clone(),
            coverage: Some(self.coverage.clone()),
        }
    }

    pub fn into_lmap(self) -> LmapAtlas {
        LmapAtlas {
            width: self.width,
            height: self.height,
            baseline: self.baseline,
            texels: self.texels,
            coverage: Some(self.coverage),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn centers_sit_mid_texel() {
        assert_eq!(texel_center(0, 0, 4, 4), Vec2::new(0.125, 0.125));
        assert_eq!(texel_center(3, 1, 4, 2), Vec2::new(0.875, 0.75));
    }

    #[test]
    fn clear_restores_baseline() {
        let mut atlas = Atlas::new(2, 2, [0.0, 0.0, 0.0, 1.0]);
        atlas.texels[3] = [1.0, 2.0, 3.0, 1.0];
        atlas.coverage[3] = 2;
        atlas.clear();

        assert!(atlas.texels().iter().all(|t| *t == [0.0, 0.0, 0.0, 1.0]));
        assert_eq!(atlas.covered_texels(), 0);
    }

    #[test]
    fn read_back_bytes_cover_every_channel() {
        let atlas = Atlas::new(3, 2, [0.25, 0.5, 0.75, 1.0]);
        let bytes = atlas.texel_bytes();
        assert_eq!(bytes.len(), 3 * 2 * 16);
        assert_eq!(&bytes[4..8], &0.5f32.to_ne_bytes());
    }

    #[test]
    fn lmap_conversion_keeps_coverage() {
        let mut atlas = Atlas::new(2, 1, [0.0, 0.0, 0.0, 1.0]);
        atlas.coverage[1] = 1;
        let file = atlas.to_lmap();
        assert_eq!(file.coverage.as_deref(), Some(&[0, 1][..]));
        assert_eq!(atlas.into_lmap(), file);
    }
}
