//! Raw vertex record files: headerless, fixed-stride, little-endian.
//!
//! Record layout:
//!   position   f32[3]
//!   normal     f32[3]
//!   shading_uv f32[2]
//!   light_uv   f32[2]
//!   luminance  f32      (only for `VertexLayout::WithLuminance`)

use bytemuck::{Pod, Zeroable};
use std::io::{self, ErrorKind};

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct VertexRecord {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub shading_uv: [f32; 2],
    pub light_uv: [f32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct LitVertexRecord {
    pub vertex: VertexRecord,
    pub luminance: f32,
}

/// The two record strides a vertex file can be bound with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VertexLayout {
    /// 40-byte records, no luminance.
    Standard,
    /// 44-byte records with a trailing scalar luminance.
    WithLuminance,
}

impl VertexLayout {
    #[inline]
    pub const fn stride(self) -> usize {
        match self {
            VertexLayout::Standard => std::mem::size_of::<VertexRecord>(),
            VertexLayout::WithLuminance => std::mem::size_of::<LitVertexRecord>(),
        }
    }

    /// Map a byte stride back to its layout.
    pub fn from_stride(stride: usize) -> Option<Self> {
        [VertexLayout::Standard, VertexLayout::WithLuminance]
            .into_iter()
            .find(|layout| layout.stride() == stride)
    }
}

/// Decoded records; `luminance` is present iff the source layout carried it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VertexRecords {
    pub vertices: Vec<VertexRecord>,
    pub luminance: Option<Vec<f32>>,
}

impl VertexRecords {
    #[inline]
    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn layout(&self) -> VertexLayout {
        if self.luminance.is_some() {
            VertexLayout::WithLuminance
        } else {
            VertexLayout::Standard
        }
    }
}

/// Decode a tightly packed record buffer.
pub fn decode_records(bytes: &[u8], layout: VertexLayout) -> io::Result<VertexRecords> {
    let stride = layout.stride();
    if bytes.len() % stride != 0 {
        return Err(io::Error::new(
            ErrorKind::InvalidData,
            format!(
                "{} bytes is not a whole number of {}-byte records",
                bytes.len(),
                stride
            ),
        ));
    }

    #[cfg(target_endian = "little")]
    let out = match layout {
        VertexLayout::Standard => VertexRecords {
            vertices: bytes
                .chunks_exact(stride)
                .map(bytemuck::pod_read_unaligned::<VertexRecord>)
                .collect(),
            luminance: None,
        },
        VertexLayout::WithLuminance => {
            let (vertices, luminance) = bytes
                .chunks_exact(stride)
                .map(bytemuck::pod_read_unaligned::<LitVertexRecord>)
                .map(|r| (r.vertex, r.luminance))
                .unzip();
            VertexRecords {
                vertices,
                luminance: Some(luminance),
            }
        }
    };

    #[cfg(not(target_endian = "little"))]
    let out = {
        let lanes = |c: &[u8]| -> Vec<f32> {
            c.chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        };
        let mut vertices = Vec::with_capacity(bytes.len() / stride);
        let mut luminance = Vec::new();
        for chunk in bytes.chunks_exact(stride) {
            let f = lanes(chunk);
            vertices.push(VertexRecord {
                position: [f[0], f[1], f[2]],
                normal: [f[3], f[4], f[5]],
                shading_uv: [f[6], f[7]],
                light_uv: [f[8], f[9]],
            });
            if layout == VertexLayout::WithLuminance {
                luminance.push(f[10]);
            }
        }
        VertexRecords {
            vertices,
            luminance: (layout == VertexLayout::WithLuminance).then_some(luminance),
        }
    };

    Ok(out)
}

/// Encode records using the layout implied by `records.luminance`.
pub fn encode_records(records: &VertexRecords) -> io::Result<Vec<u8>> {
    let layout = records.layout();
    let mut out = Vec::with_capacity(records.len() * layout.stride());

    let push = |out: &mut Vec<u8>, values: &[f32]| {
        for v in values {
            out.extend_from_slice(&v.to_le_bytes());
        }
    };

    if let Some(lum) = records.luminance.as_ref() {
        if lum.len() != records.vertices.len() {
            return Err(io::Error::new(
                ErrorKind::InvalidData,
                "luminance length != vertex length",
            ));
        }
    }

    for (i, v) in records.vertices.iter().enumerate() {
        push(&mut out, &v.position);
        push(&mut out, &v.normal);
        push(&mut out, &v.shading_uv);
        push(&mut out, &v.light_uv);
        if let Some(lum) = records.luminance.as_ref() {
            push(&mut out, &[lum[i]]);
        }
    }

    Ok(out)
}
