use serde::{Deserialize, Serialize};

use crate::error::{BakeError, Result};

/// Reference atlas edge length.
pub const DEFAULT_ATLAS_SIZE: u32 = 1024;
/// Texels or triangles handed to one rayon task at a time.
pub const DEFAULT_BATCH_SIZE: usize = 64;
/// Opaque black.
pub const DEFAULT_BASELINE: [f32; 4] = [0.0, 0.0, 0.0, 1.0];

/// How the triangle-driven pass resolves concurrent writes to one texel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccumulationMode {
    /// Compare-and-swap float adds straight into a shared grid.
    Atomic,
    /// Per-triangle fragment lists reduced per texel in triangle order.
    #[default]
    ScatterResolve,
}

/// Per-bake parameters. Nothing about the atlas is hard-coded in the passes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BakeConfig {
    pub atlas_width: u32,
    pub atlas_height: u32,
    /// Minimum number of invocations per parallel work unit.
    pub batch_size: usize,
    /// Value every texel is cleared to before the dispatch.
    pub baseline: [f32; 4],
    pub accumulation: AccumulationMode,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            atlas_width: DEFAULT_ATLAS_SIZE,
            atlas_height: DEFAULT_ATLAS_SIZE,
            batch_size: DEFAULT_BATCH_SIZE,
            baseline: DEFAULT_BASELINE,
            accumulation: AccumulationMode::default(),
        }
    }
}

impl BakeConfig {
    pub fn with_resolution(width: u32, height: u32) -> Self {
        Self {
            atlas_width: width,
            atlas_height: height,
            ..Self::default()
        }
    }

    #[inline]
    pub fn texel_count(&self) -> usize {
        self.atlas_width as usize * self.atlas_height as usize
    }

    pub fn validate(&self) -> Result<()> {
        if self.atlas_width == 0 || self.atlas_height == 0 {
            return Err(BakeError::config(format!(
                "atlas resolution {}x{} has no texels",
                self.atlas_width, self.atlas_height
            )));
        }

        // Texel indices are carried as u32 through the scatter phase.
        if self.texel_count() > u32::MAX as usize {
            return Err(BakeError::config(format!(
                "atlas resolution {}x{} exceeds the addressable texel range",
                self.atlas_width, self.atlas_height
            )));
        }

        if self.batch_size == 0 {
            return Err(BakeError::config("batch_size must be > 0"));
        }

        if !self.baseline.iter().all(|c| c.is_finite()) {
            return Err(BakeError::config("baseline color must be finite"));
        }

        Ok(())
    }
}
