//! The two parallelization schemes over one vertex store and one atlas.
//!
//! - [`TexelDriven`]: one task per texel, each owning exactly one output cell.
//! - [`TriangleDriven`]: one task per triangle, writing through either an
//!   [`AtomicAccumulator`] or a scatter/resolve pair of dispatches.
//!
//! Both sit behind [`Dispatch`]; a bake uses exactly one of them.

mod accumulate;
mod texel;
mod triangle;

pub use accumulate::{AtomicAccumulator, AtomicGrid, Candidate, ScatterBuffer};
pub use texel::TexelDriven;
pub use triangle::{TexelRect, TriangleDriven};

use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

use crate::atlas::Atlas;
use crate::config::AccumulationMode;
use crate::contribution::Contribution;
use crate::coverage::LightTriangle;
use crate::error::{BakeError, Result};
use crate::vertex::VertexStore;

/// Which launch configuration a bake uses.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// `W x H` tasks.
    TexelDriven,
    /// `T` tasks.
    TriangleDriven,
}

impl Strategy {
    pub fn dispatcher(self, accumulation: AccumulationMode) -> Box<dyn Dispatch> {
        match self {
            Strategy::TexelDriven => Box::new(TexelDriven),
            Strategy::TriangleDriven => Box::new(TriangleDriven { accumulation }),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Strategy::TexelDriven => "texel-driven",
            Strategy::TriangleDriven => "triangle-driven",
        };

        f.write_str(s)
    }
}

/// A launch over a prepared scene.
///
/// `dispatch` returns only after every task has finished; that return is the
/// completion barrier the controller reads back behind.
pub trait Dispatch: Send + Sync {
    fn strategy(&self) -> Strategy;

    fn dispatch(&self, scene: &PreparedScene, atlas: &mut Atlas, batch_size: usize);
}

/// Validated, read-only inputs shared by every task of a dispatch.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PreparedScene {
    pub triangles: Vec<LightTriangle>,
    pub contributions: Vec<Vec3>,
}

impl PreparedScene {
    /// Check light UVs and evaluate contributions.
    ///
    /// Light UVs must be finite and inside `[0, 1]`, which caps every
    /// triangle's texel rectangle at the atlas size.
    pub fn prepare(store: &VertexStore, contribution: &Contribution) -> Result<Self> {
        let triangles = (0..store.triangle_count())
            .map(|t| {
                let uv = store.light_uvs(t);
                if let Some(bad) = uv.iter().find(|p| !in_unit_square(**p)) {
                    return Err(BakeError::config(format!(
                        "triangle {} has light UV {} outside [0, 1]",
                        t, bad
                    )));
                }
                Ok(LightTriangle::new(uv))
            })
            .collect::<Result<Vec<_>>>()?;

        let contributions = contribution.evaluate(store)?;

        Ok(Self {
            triangles,
            contributions,
        })
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    pub fn degenerate_count(&self) -> usize {
        self.triangles.iter().filter(|t| t.degenerate).count()
    }
}

#[inline]
fn in_unit_square(p: Vec2) -> bool {
    p.is_finite() && p.cmpge(Vec2::ZERO).all() && p.cmple(Vec2::ONE).all()
}

#[cfg(test)]
mod tests;
