//! LMAP: small dependency-light container for baked lightmap atlases.
//!
//! - Stores a fixed-resolution RGBA `f32` atlas, row-major.
//! - Records the baseline the atlas was cleared to before the bake.
//! - Optional per-texel coverage counts (u32), one per texel.
//!
//! File layout (little-endian):
//!   00  : [u8;4]  magic = b"LMAP"
//!   04  : u32     version = 1
//!   08  : u32     flags (bitfield)
//!                 bit 0 => coverage block present
//!   0C  : u32     width
//!   10  : u32     height
//!   14  : f32[4]  baseline rgba
//!   24  : for each texel: f32 r, f32 g, f32 b, f32 a
//!   ..  : for each texel: u32 coverage      (if bit0)
//!
//! Raw vertex record files (`.lvs`) live in [`records`].

pub mod records;

use std::fs::File;
use std::io::{self, ErrorKind, Write};
use std::path::Path;

pub use records::{
    decode_records, encode_records, LitVertexRecord, VertexLayout, VertexRecord, VertexRecords,
};

pub const LMAP_MAGIC: [u8; 4] = *b"LMAP";
pub const LMAP_VERSION: u32 = 1;

const FLAG_COVERAGE: u32 = 1 << 0;
const HEADER_LEN: usize = 0x24;

/// A baked atlas as it lives on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct LmapAtlas {
    pub width: u32,
    pub height: u32,
    /// Clear value applied before accumulation.
    pub baseline: [f32; 4],
    /// Row-major RGBA texels, `width * height` entries.
    pub texels: Vec<[f32; 4]>,
    /// Number of triangles that covered each texel.
    pub coverage: Option<Vec<u32>>,
}

impl LmapAtlas {
    #[inline]
    pub fn texel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

#[inline(always)]
fn need(buf: &[u8], want: usize) -> io::Result<()> {
    if buf.len() < want {
        Err(io::Error::new(ErrorKind::UnexpectedEof, "truncated LMAP"))
    } else {
        Ok(())
    }
}

#[inline(always)]
fn take<'a>(buf: &mut &'a [u8], n: usize) -> io::Result<&'a [u8]> {
    need(buf, n)?;
    let (head, tail) = buf.split_at(n);
    *buf = tail;
    Ok(head)
}

#[inline(always)]
fn le_u32(buf: &mut &[u8]) -> io::Result<u32> {
    let b = take(buf, 4)?;
    Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

#[inline(always)]
fn le_f32(buf: &mut &[u8]) -> io::Result<f32> {
    Ok(f32::from_bits(le_u32(buf)?))
}

#[cold]
fn bad(msg: &str) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg)
}

/// Parse LMAP from a contiguous byte slice.
pub fn parse_lmap_bytes(mut p: &[u8]) -> io::Result<LmapAtlas> {
    if take(&mut p, 4)? != LMAP_MAGIC {
        return Err(bad("bad LMAP magic"));
    }

    let version = le_u32(&mut p)?;
    if version != LMAP_VERSION {
        return Err(bad("unsupported LMAP version"));
    }

    let flags = le_u32(&mut p)?;
    let has_coverage = (flags & FLAG_COVERAGE) != 0;

    let width = le_u32(&mut p)?;
    let height = le_u32(&mut p)?;
    if width == 0 || height == 0 {
        return Err(bad("atlas dimensions must be > 0"));
    }

    let baseline = [
        le_f32(&mut p)?,
        le_f32(&mut p)?,
        le_f32(&mut p)?,
        le_f32(&mut p)?,
    ];

    let count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| bad("atlas size overflow"))?;
    let texel_bytes = count.checked_mul(16).ok_or_else(|| bad("texel block overflow"))?;
    let raw = take(&mut p, texel_bytes)?;

    // Little-endian on disk; decode per lane so big-endian hosts stay correct.
    let texels: Vec<[f32; 4]> = raw
        .chunks_exact(16)
        .map(|c| {
            let lane = |i: usize| f32::from_le_bytes([c[i], c[i + 1], c[i + 2], c[i + 3]]);
            [lane(0), lane(4), lane(8), lane(12)]
        })
        .collect();

    let coverage = if has_coverage {
        let raw = take(&mut p, count * 4)?;
        Some(
            raw.chunks_exact(4)
                .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect(),
        )
    } else {
        None
    };

    Ok(LmapAtlas {
        width,
        height,
        baseline,
        texels,
        coverage,
    })
}

/// Fast path: prefer mmap; fall back to a single read.
#[cfg(feature = "mmap")]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<LmapAtlas> {
    let file = File::open(path)?;
    let map = unsafe { memmap2::MmapOptions::new().map(&file)? };
    parse_lmap_bytes(&map)
}

#[cfg(not(feature = "mmap"))]
pub fn read_file<P: AsRef<Path>>(path: P) -> io::Result<LmapAtlas> {
    let bytes = std::fs::read(path)?;
    parse_lmap_bytes(&bytes)
}

pub fn write_file<P: AsRef<Path>>(path: P, atlas: &LmapAtlas) -> io::Result<()> {
    let mut file = io::BufWriter::new(File::create(path)?);
    write_to(&mut file, atlas)?;
    file.flush()
}

pub fn write_to<W: Write>(w: &mut W, atlas: &LmapAtlas) -> io::Result<()> {
    if atlas.width == 0 || atlas.height == 0 {
        return Err(bad("atlas dimensions must be > 0"));
    }

    if atlas.texels.len() != atlas.texel_count() {
        return Err(bad("texels length != width * height"));
    }

    let mut flags = 0u32;

    if let Some(coverage) = atlas.coverage.as_ref() {
        if coverage.len() != atlas.texel_count() {
            return Err(bad("coverage length != width * height"));
        }
        flags |= FLAG_COVERAGE;
    }

    w.write_all(&LMAP_MAGIC)?;

    write_u32(w, LMAP_VERSION)?;
    write_u32(w, flags)?;
    write_u32(w, atlas.width)?;
    write_u32(w, atlas.height)?;

    for &c in &atlas.baseline {
        write_f32(w, c)?;
    }

    for texel in &atlas.texels {
        for &c in texel {
            write_f32(w, c)?;
        }
    }

    if let Some(coverage) = atlas.coverage.as_ref() {
        for &n in coverage {
            write_u32(w, n)?;
        }
    }

    Ok(())
}

/// Byte length of an encoded atlas; handy for sizing buffers.
pub fn encoded_len(atlas: &LmapAtlas) -> usize {
    let n = atlas.texel_count();
    HEADER_LEN + n * 16 + if atlas.coverage.is_some() { n * 4 } else { 0 }
}

#[inline]
fn write_u32<W: Write>(w: &mut W, v: u32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

#[inline]
fn write_f32<W: Write>(w: &mut W, v: f32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}
