//! Closed point-in-triangle test in light-UV space.

use glam::Vec2;

/// Signed doubled area of `(a, b, c)`.
#[inline(always)]
pub fn edge(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)
}

/// Collinear or repeated vertices. Such triangles cover nothing.
#[inline]
pub fn is_degenerate(v0: Vec2, v1: Vec2, v2: Vec2) -> bool {
    edge(v0, v1, v2) == 0.0
}

/// Boundary-inclusive containment, independent of winding order.
#[inline]
pub fn covers(p: Vec2, v0: Vec2, v1: Vec2, v2: Vec2) -> bool {
    // All three edge values are zero for a zero-area triangle, which the
    // sign rule alone would accept everywhere.
    if is_degenerate(v0, v1, v2) {
        return false;
    }
    covers_sign_rule(p, v0, v1, v2)
}

#[inline(always)]
fn covers_sign_rule(p: Vec2, v0: Vec2, v1: Vec2, v2: Vec2) -> bool {
    let d1 = edge(p, v0, v1);
    let d2 = edge(p, v1, v2);
    let d3 = edge(p, v2, v0);

    let neg = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
    let pos = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
    !(neg && pos)
}

/// A triangle's light-UV corners with the degeneracy check done once.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LightTriangle {
    pub uv: [Vec2; 3],
    pub degenerate: bool,
}

impl LightTriangle {
    pub fn new(uv: [Vec2; 3]) -> Self {
        Self {
            degenerate: is_degenerate(uv[0], uv[1], uv[2]),
            uv,
        }
    }

    #[inline(always)]
    pub fn covers(&self, p: Vec2) -> bool {
        !self.degenerate && covers_sign_rule(p, self.uv[0], self.uv[1], self.uv[2])
    }

    /// Component-wise (min, max) of the three corners.
    #[inline]
    pub fn bounds(&self) -> (Vec2, Vec2) {
        let [a, b, c] = self.uv;
        (a.min(b).min(c), a.max(b).max(c))
    }
}
