use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::{BakeError, Result};
use crate::vertex::VertexStore;

/// What a covering triangle adds to a texel. The engine treats the value as
/// opaque; radiance evaluation happens upstream.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind", content = "value")]
pub enum Contribution {
    /// The same RGB for every triangle.
    Constant([f32; 3]),
    /// Mean of the three vertex luminances, splatted to grey.
    Luminance,
    /// One RGB per triangle, indexed by triangle id.
    PerTriangle(Vec<[f32; 3]>),
}

impl Default for Contribution {
    fn default() -> Self {
        Contribution::Constant([1.0, 1.0, 1.0])
    }
}

impl Contribution {
    /// Evaluate every triangle up front so dispatch tasks only index a table.
    pub fn evaluate(&self, store: &VertexStore) -> Result<Vec<Vec3>> {
        let values: Vec<Vec3> = match self {
            Contribution::Constant(rgb) => vec![Vec3::from_array(*rgb); store.triangle_count()],
            Contribution::Luminance => {
                if !store.has_luminance() {
                    return Err(BakeError::config(
                        "luminance contribution needs vertices bound with luminance",
                    ));
                }
                store
                    .triangles()
                    .map(|tri| {
                        let sum: f32 = tri.iter().map(|v| v.luminance.unwrap_or_default()).sum();
                        Vec3::splat(sum / 3.0)
                    })
                    .collect()
            }
            Contribution::PerTriangle(values) => {
                if values.len() != store.triangle_count() {
                    return Err(BakeError::config(format!(
                        "{} per-triangle contributions for {} triangles",
                        values.len(),
                        store.triangle_count()
                    )));
                }
                values.iter().copied().map(Vec3::from_array).collect()
            }
        };

        if let Some(t) = values.iter().position(|v| !v.is_finite()) {
            return Err(BakeError::config(format!(
                "triangle {} has a non-finite contribution",
                t
            )));
        }

        Ok(values)
    }
}
