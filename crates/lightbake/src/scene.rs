//! Procedural demo geometry: a walled voxel room with pillars and a hole in
//! the roof, every visible face packed into its own light-UV cell.

use glam::{IVec3, Vec2, Vec3};
use log::{debug, info};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{BakeError, Result};
use crate::vertex::{Vertex, VertexStore};

/// Offset along the normal before casting shadow rays.
const SHADOW_BIAS: f32 = 0.001;

const FACE_DIRS: [IVec3; 6] = [
    IVec3::X,
    IVec3::NEG_X,
    IVec3::Y,
    IVec3::NEG_Y,
    IVec3::Z,
    IVec3::NEG_Z,
];

// Two triangles per face, as (tangent, bitangent) signs.
const FACE_CORNERS: [(f32, f32); 6] = [
    (1.0, 1.0),
    (-1.0, 1.0),
    (1.0, -1.0),
    (1.0, -1.0),
    (-1.0, 1.0),
    (-1.0, -1.0),
];

/// Parameters of the generated room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoxelBox {
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    /// World-space edge length of one voxel.
    pub voxel_size: f32,
    /// Luminance every vertex starts with.
    pub ambient: f32,
    /// Space between neighbouring light-UV cells, as a fraction of a cell.
    pub gap: f32,
}

impl Default for VoxelBox {
    fn default() -> Self {
        Self {
            width: 32,
            height: 16,
            depth: 32,
            voxel_size: 8.0,
            ambient: 0.1,
            gap: 0.01,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Face {
    voxel: IVec3,
    dir: IVec3,
}

impl VoxelBox {
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
            ..Self::default()
        }
    }

    fn dims(&self) -> IVec3 {
        IVec3::new(self.width as i32, self.height as i32, self.depth as i32)
    }

    /// Solid voxels, indexed `x + w * (z + d * y)`.
    pub fn voxels(&self) -> Vec<bool> {
        let IVec3 { x: w, y: h, z: d } = self.dims();

        let hole_min = IVec3::new(w / 3 + 1, h / 2, d / 3 + 1);
        let hole_max = IVec3::new(2 * w / 3 - 1, h + 2, 2 * d / 3 - 1);
        let pillars = [
            (w / 3, d / 3),
            (2 * w / 3, d / 3),
            (w / 3, 2 * d / 3),
            (2 * w / 3, 2 * d / 3),
        ];

        let mut solid = Vec::with_capacity((w * h * d).max(0) as usize);
        for y in 0..h {
            for z in 0..d {
                for x in 0..w {
                    let p = IVec3::new(x, y, z);
                    let wall = x == 0 || x == w - 1 || y == 0 || y == h - 1 || z == 0 || z == d - 1;
                    let pillar = pillars.contains(&(x, z));
                    let in_hole = p.cmpge(hole_min).all() && p.cmple(hole_max).all();
                    solid.push((wall || pillar) && !in_hole);
                }
            }
        }
        solid
    }

    fn is_solid(&self, solid: &[bool], p: IVec3) -> bool {
        let dims = self.dims();
        if p.cmplt(IVec3::ZERO).any() || p.cmpge(dims).any() {
            return false;
        }
        solid[(p.x + dims.x * (p.z + dims.z * p.y)) as usize]
    }

    /// Every face of a solid voxel whose neighbour is empty or outside.
    fn visible_faces(&self, solid: &[bool]) -> Vec<Face> {
        let IVec3 { x: w, y: h, z: d } = self.dims();
        let mut faces = Vec::new();
        let mut culled = 0usize;

        for y in 0..h {
            for z in 0..d {
                for x in 0..w {
                    let voxel = IVec3::new(x, y, z);
                    if !self.is_solid(solid, voxel) {
                        continue;
                    }
                    for dir in FACE_DIRS {
                        if self.is_solid(solid, voxel + dir) {
                            culled += 1;
                        } else {
                            faces.push(Face { voxel, dir });
                        }
                    }
                }
            }
        }

        debug!("voxel box: {} faces visible, {} culled", faces.len(), culled);
        faces
    }

    /// Generate the mesh. Fails only on parameters that cannot make a room.
    pub fn build(&self) -> Result<LitMesh> {
        if self.width == 0 || self.height == 0 || self.depth == 0 {
            return Err(BakeError::config(format!(
                "voxel box {}x{}x{} has no voxels",
                self.width, self.height, self.depth
            )));
        }
        if self.dims().cmpgt(IVec3::splat(1024)).any() {
            return Err(BakeError::config("voxel box dimensions are limited to 1024"));
        }
        if !(0.0..1.0).contains(&self.gap) {
            return Err(BakeError::config(format!(
                "light-UV gap {} must be in [0, 1)",
                self.gap
            )));
        }
        if !self.voxel_size.is_finite() || self.voxel_size <= 0.0 || !self.ambient.is_finite() {
            return Err(BakeError::config("voxel size and ambient must be finite"));
        }

        let solid = self.voxels();
        let faces = self.visible_faces(&solid);

        let cells_per_row = (faces.len() as f64).sqrt().ceil().max(1.0) as usize;
        let cell = 1.0 / cells_per_row as f32;
        let gap = cell * self.gap;
        let size = cell - gap;

        let scale = 0.5 * self.voxel_size;
        let mut vertices = Vec::with_capacity(faces.len() * FACE_CORNERS.len());

        for (n, face) in faces.iter().enumerate() {
            let dir = face.dir.as_vec3();
            let tangent = Vec3::new(dir.y, dir.z, dir.x) * scale;
            let bitangent = dir.cross(tangent).normalize() * scale;
            let center = face.voxel.as_vec3() * self.voxel_size + dir * scale;

            let origin = Vec2::new(
                (n % cells_per_row) as f32 * cell,
                (n / cells_per_row) as f32 * cell,
            ) + Vec2::splat(0.5 * gap);

            for &(i, j) in FACE_CORNERS.iter() {
                let corner = Vec2::new(i.max(0.0), j.max(0.0));
                vertices.push(
                    Vertex::new(
                        center + tangent * i + bitangent * j,
                        dir,
                        corner,
                        origin + corner * size,
                    )
                    .with_luminance(self.ambient),
                );
            }
        }

        info!(
            "voxel box {}x{}x{}: {} faces, {} triangles, {}x{} light-UV cells",
            self.width,
            self.height,
            self.depth,
            faces.len(),
            vertices.len() / 3,
            cells_per_row,
            cells_per_row
        );

        Ok(LitMesh { vertices })
    }
}

/// Triangle soup whose per-vertex luminance can be relit before baking.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LitMesh {
    pub vertices: Vec<Vertex>,
}

impl LitMesh {
    pub fn triangle_count(&self) -> usize {
        self.vertices.len() / 3
    }

    /// World-space (min, max) of all vertex positions.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = self.vertices.first()?.position;
        Some(self.vertices.iter().fold((first, first), |(lo, hi), v| {
            (lo.min(v.position), hi.max(v.position))
        }))
    }

    /// Reset every vertex to `ambient`.
    pub fn clear_light(&mut self, ambient: f32) {
        self.vertices
            .par_iter_mut()
            .for_each(|v| v.luminance = Some(ambient));
    }

    /// Add direct light from a point, attenuated by distance and shadowed by
    /// every triangle of the mesh.
    pub fn add_point_light(&mut self, position: Vec3, strength: f32) {
        let occluders: Vec<[Vec3; 3]> = self
            .vertices
            .chunks_exact(3)
            .map(|t| [t[0].position, t[1].position, t[2].position])
            .collect();

        self.vertices.par_iter_mut().for_each(|v| {
            let origin = v.position + v.normal * SHADOW_BIAS;
            let to_light = position - v.position;
            let dir = to_light.normalize_or_zero();
            if dir == Vec3::ZERO || dir.dot(v.normal) < 0.0 {
                return;
            }

            let distance = origin.distance(position);
            let blocked = occluders
                .iter()
                .any(|tri| ray_hits(origin, dir, tri).is_some_and(|t| t < distance));

            if !blocked {
                *v.luminance.get_or_insert(0.0) += strength / distance;
            }
        });
    }

    pub fn into_store(self) -> Result<VertexStore> {
        VertexStore::from_vertices(self.vertices)
    }
}

/// Distance along the ray to the triangle's plane when the hit lies inside
/// the triangle, edges included.
fn ray_hits(origin: Vec3, dir: Vec3, [v0, v1, v2]: &[Vec3; 3]) -> Option<f32> {
    let n = (*v1 - *v0).cross(*v2 - *v0);
    let n_dot_dir = n.dot(dir);
    if n_dot_dir.abs() < 1e-5 {
        return None;
    }

    let t = n.dot(*v0 - origin) / n_dot_dir;
    if t < 0.0 {
        return None;
    }

    let p = origin + dir * t;
    let inside = [(*v0, *v1), (*v1, *v2), (*v2, *v0)]
        .iter()
        .all(|&(a, b)| n.dot((b - a).cross(p - a)) >= 0.0);

    inside.then_some(t)
}
