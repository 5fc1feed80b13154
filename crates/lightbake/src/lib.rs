//! Lightmap coverage bake.
//!
//! Given a triangle soup whose vertices carry light-map UVs, decide which
//! atlas texels each triangle covers (by testing the texel center) and add the
//! triangle's contribution into those texels. Two interchangeable schedules
//! produce the same coverage:
//!
//! ```text
//! texel-driven     W*H tasks, each scans every triangle, one writer per texel
//! triangle-driven  T tasks, each scans its UV rectangle, atomic or
//!                  scatter/resolve accumulation
//! ```
//!
//! [`BakeJob`] sequences a bake: upload, clear, dispatch, wait, read back.

pub mod atlas;
pub mod config;
pub mod contribution;
pub mod coverage;
pub mod dispatch;
pub mod error;
pub mod job;
pub mod scene;
pub mod vertex;

pub use atlas::{texel_center, Atlas};
pub use config::{AccumulationMode, BakeConfig};
pub use contribution::Contribution;
pub use coverage::{covers, LightTriangle};
pub use dispatch::{Dispatch, PreparedScene, Strategy};
pub use error::{BakeError, Result};
pub use job::{bake, cross_validate, BakeJob, BakeReport, BakeState, CrossValidation};
pub use scene::{LitMesh, VoxelBox};
pub use vertex::{Vertex, VertexStore};
