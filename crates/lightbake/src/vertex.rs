//! Read-only vertex store shared by every dispatch task.

use glam::{Vec2, Vec3};
use lmap::{decode_records, VertexLayout, VertexRecord, VertexRecords};

use crate::error::{BakeError, Result};

/// One mesh vertex. `light_uv` places it on the atlas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vertex {
    pub position: Vec3,
    pub normal: Vec3,
    pub shading_uv: Vec2,
    pub light_uv: Vec2,
    pub luminance: Option<f32>,
}

impl Vertex {
    pub fn new(position: Vec3, normal: Vec3, shading_uv: Vec2, light_uv: Vec2) -> Self {
        Self {
            position,
            normal,
            shading_uv,
            light_uv,
            luminance: None,
        }
    }

    /// A vertex that only carries a light UV; handy for coverage-only scenes.
    pub fn at_light_uv(light_uv: Vec2) -> Self {
        Self::new(Vec3::ZERO, Vec3::Y, Vec2::ZERO, light_uv)
    }

    pub fn with_luminance(mut self, luminance: f32) -> Self {
        self.luminance = Some(luminance);
        self
    }

    fn from_record(r: &VertexRecord, luminance: Option<f32>) -> Self {
        Self {
            position: Vec3::from_array(r.position),
            normal: Vec3::from_array(r.normal),
            shading_uv: Vec2::from_array(r.shading_uv),
            light_uv: Vec2::from_array(r.light_uv),
            luminance,
        }
    }

    fn to_record(self) -> VertexRecord {
        VertexRecord {
            position: self.position.to_array(),
            normal: self.normal.to_array(),
            shading_uv: self.shading_uv.to_array(),
            light_uv: self.light_uv.to_array(),
        }
    }
}

/// Triangle soup: triangle `t` is vertices `[3t, 3t + 3)`.
///
/// Every constructor validates the vertex count, so tasks can index
/// `3 * triangle_count()` vertices without further checks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexStore {
    vertices: Vec<Vertex>,
    has_luminance: bool,
}

impl VertexStore {
    /// Build from in-memory vertices; the declared count is the slice length.
    pub fn from_vertices(vertices: Vec<Vertex>) -> Result<Self> {
        let declared = vertices.len();
        Self::checked(vertices, declared)
    }

    /// Build from decoded records, checking them against the count the caller
    /// declared alongside the buffer.
    pub fn from_records(records: VertexRecords, declared_vertex_count: usize) -> Result<Self> {
        let VertexRecords {
            vertices,
            luminance,
        } = records;

        if let Some(lum) = luminance.as_ref() {
            if lum.len() != vertices.len() {
                return Err(BakeError::binding(format!(
                    "{} luminance values bound for {} vertices",
                    lum.len(),
                    vertices.len()
                )));
            }
        }

        let vertices = vertices
            .iter()
            .enumerate()
            .map(|(i, r)| Vertex::from_record(r, luminance.as_ref().map(|l| l[i])))
            .collect();

        Self::checked(vertices, declared_vertex_count)
    }

    /// Bind a raw upload buffer of fixed-stride records.
    pub fn from_bytes(bytes: &[u8], stride: usize, declared_vertex_count: usize) -> Result<Self> {
        let layout = VertexLayout::from_stride(stride).ok_or_else(|| {
            BakeError::binding(format!(
                "stride {} matches no vertex layout (expected {} or {})",
                stride,
                VertexLayout::Standard.stride(),
                VertexLayout::WithLuminance.stride()
            ))
        })?;

        let records =
            decode_records(bytes, layout).map_err(|e| BakeError::binding(e.to_string()))?;

        Self::from_records(records, declared_vertex_count)
    }

    fn checked(vertices: Vec<Vertex>, declared_vertex_count: usize) -> Result<Self> {
        if declared_vertex_count != vertices.len() {
            return Err(BakeError::config(format!(
                "declared vertex count {} does not match the {} vertices in the buffer",
                declared_vertex_count,
                vertices.len()
            )));
        }

        if vertices.len() % 3 != 0 {
            return Err(BakeError::config(format!(
                "vertex count {} is not a multiple of 3",
                vertices.len()
            )));
        }

        let with_lum = vertices.iter().filter(|v| v.luminance.is_some()).count();
        if with_lum != 0 && with_lum != vertices.len() {
            return Err(BakeError::config(format!(
                "only {} of {} vertices carry a luminance value",
                with_lum,
                vertices.len()
            )));
        }

        Ok(Self {
            has_luminance: with_lum != 0,
            vertices,
        })
    }

    #[inline]
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    #[inline]
    pub fn has_luminance(&self) -> bool {
        self.has_luminance
    }

    pub fn layout(&self) -> VertexLayout {
        if self.has_luminance {
            VertexLayout::WithLuminance
        } else {
            VertexLayout::Standard
        }
    }

    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// The three vertices of triangle `t`.
    #[inline]
    pub fn triangle(&self, t: usize) -> &[Vertex] {
        &self.vertices[3 * t..3 * t + 3]
    }

    pub fn triangles(&self) -> impl ExactSizeIterator<Item = &[Vertex]> + '_ {
        self.vertices.chunks_exact(3)
    }

    #[inline]
    pub fn light_uvs(&self, t: usize) -> [Vec2; 3] {
        let tri = self.triangle(t);
        [tri[0].light_uv, tri[1].light_uv, tri[2].light_uv]
    }

    /// Back to the upload record form (e.g. for writing an `.lvs` file).
    pub fn to_records(&self) -> VertexRecords {
        VertexRecords {
            vertices: self.vertices.iter().map(|v| v.to_record()).collect(),
            luminance: self.has_luminance.then(|| {
                self.vertices
                    .iter()
                    .map(|v| v.luminance.unwrap_or_default())
                    .collect()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lmap::encode_records;

    fn quad_store(luminance: bool) -> VertexStore {
        let uvs = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        let vertices = uvs
            .iter()
            .map(|&uv| {
                let v = Vertex::at_light_uv(uv);
                if luminance {
                    v.with_luminance(0.5)
                } else {
                    v
                }
            })
            .collect();
        VertexStore::from_vertices(vertices).unwrap()
    }

    #[test]
    fn triangles_are_consecutive_triples() {
        let store = quad_store(false);
        assert_eq!(store.triangle_count(), 2);
        assert_eq!(store.light_uvs(1)[1], Vec2::new(1.0, 1.0));
        assert_eq!(store.triangles().len(), 2);
    }

    #[test]
    fn bytes_upload_matches_records() {
        let store = quad_store(true);
        let bytes = encode_records(&store.to_records()).unwrap();

        let uploaded = VertexStore::from_bytes(&bytes, 44, 6).unwrap();
        assert_eq!(uploaded, store);
        assert!(uploaded.has_luminance());
    }

    #[test]
    fn declared_count_must_match_buffer() {
        let bytes = encode_records(&quad_store(false).to_records()).unwrap();
        let err = VertexStore::from_bytes(&bytes, 40, 9).unwrap_err();
        assert!(matches!(err, BakeError::Configuration(_)));
    }

    #[test]
    fn vertex_count_must_be_multiple_of_three() {
        let vertices = vec![Vertex::at_light_uv(Vec2::ZERO); 4];
        let err = VertexStore::from_vertices(vertices).unwrap_err();
        assert!(matches!(err, BakeError::Configuration(_)));
    }

    #[test]
    fn unknown_stride_is_a_binding_error() {
        let bytes = encode_records(&quad_store(false).to_records()).unwrap();
        assert!(matches!(
            VertexStore::from_bytes(&bytes, 48, 6),
            Err(BakeError::ResourceBinding(_))
        ));
        // Standard records read with the luminance stride do not divide evenly.
        assert!(matches!(
            VertexStore::from_bytes(&bytes, 44, 6),
            Err(BakeError::ResourceBinding(_))
        ));
    }
}
