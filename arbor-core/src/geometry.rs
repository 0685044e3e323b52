//! Stateless numerical primitives shared by growth and mesh skinning.
//!
//! Everything here is a pure function of its arguments. Degenerate inputs
//! (zero vectors, parallel candidates, quadratics without real roots) are
//! resolved locally with a deterministic fallback instead of an error.

use glam::Vec3;
use std::f32::consts::{FRAC_PI_2, TAU};

/// Absolute tolerance used for "close enough to zero" decisions.
pub const EPSILON: f32 = 0.005;

/// Iteration cap for [`find_root`].
pub const MAX_ROOT_ITERATIONS: usize = 100;

const STANDARD_AXES: [Vec3; 3] = [Vec3::X, Vec3::Y, Vec3::Z];

#[inline]
pub fn approximately(a: f32, b: f32) -> bool {
    (a - b).abs() < EPSILON
}

/// An orthonormal basis `(u, v)` for the plane through the origin with the
/// given unit `normal`.
///
/// The basis is right-handed: `u × v == normal`, so polygons built with
/// increasing angle wind counter-clockwise around the normal.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneBasis {
    pub u: Vec3,
    pub v: Vec3,
    pub normal: Vec3,
}

impl PlaneBasis {
    /// Basis derived purely from the standard axes, with `+Y` as the normal.
    pub const fn standard() -> Self {
        Self {
            u: Vec3::X,
            v: Vec3::NEG_Z,
            normal: Vec3::Y,
        }
    }

    /// Basis for the plane with this normal, without any continuity hint.
    pub fn new(normal: Vec3) -> Self {
        Self::with_hints(normal, &[])
    }

    /// Finds a basis for the plane with this normal whose `u` vector stays as
    /// close as possible to the first usable hint.
    ///
    /// Candidates are tried in order: every hint, then the standard axes. The
    /// first one whose projection onto the plane (`n × (c × n)`) is not
    /// degenerate becomes `u`. This is what keeps consecutive rings and bud
    /// whorls from twisting when the normal changes slowly.
    ///
    /// A (numerically) zero normal yields [`PlaneBasis::standard`].
    pub fn with_hints(normal: Vec3, hints: &[Vec3]) -> Self {
        if normal.length_squared() < EPSILON * EPSILON {
            return Self::standard();
        }
        let normal = normal.normalize();

        for candidate in hints.iter().chain(STANDARD_AXES.iter()) {
            let u = normal.cross(candidate.cross(normal));
            if u.length() < EPSILON {
                continue;
            }
            let u = u.normalize();
            let v = normal.cross(u);
            return Self { u, v, normal };
        }

        // At least one standard axis is always far from parallel to a unit normal.
        Self::standard()
    }

    /// Unit vector in the plane at angle `theta`, measured from `u` towards `v`.
    #[inline]
    pub fn direction_at(&self, theta: f32) -> Vec3 {
        theta.cos() * self.u + theta.sin() * self.v
    }

    /// Angle in `[0, 2π)` of `p` around `centre`, after dropping `p` onto the
    /// plane through `centre`.
    pub fn angle_of(&self, p: Vec3, centre: Vec3) -> f32 {
        let p = ortho_proj_to_plane(p, self.normal, centre) - centre;
        invert_circle(p.dot(self.u), p.dot(self.v))
    }
}

/// Unit normal of the plane through `a`, `b` and `c`, or zero when the three
/// points are collinear.
pub fn plane_normal(a: Vec3, b: Vec3, c: Vec3) -> Vec3 {
    (a - b).cross(a - c).normalize_or_zero()
}

/// Vertices of a regular `resolution`-gon of circumradius `radius` around
/// `centre`, starting at `basis.u` and winding towards `basis.v`.
pub fn regular_polygon(basis: &PlaneBasis, centre: Vec3, radius: f32, resolution: usize) -> Vec<Vec3> {
    regular_polygon_with_normals(basis, centre, radius, resolution).0
}

/// Like [`regular_polygon`], also returning the outward unit normal of each vertex.
pub fn regular_polygon_with_normals(
    basis: &PlaneBasis,
    centre: Vec3,
    radius: f32,
    resolution: usize,
) -> (Vec<Vec3>, Vec<Vec3>) {
    assert!(resolution > 0, "polygon resolution must be positive");

    let step = TAU / resolution as f32;
    let mut vertices = Vec::with_capacity(resolution);
    let mut normals = Vec::with_capacity(resolution);

    for i in 0..resolution {
        let outward = basis.direction_at(step * i as f32);
        normals.push(outward);
        vertices.push(centre + outward * radius);
    }

    (vertices, normals)
}

/// Orthogonal projection of `p` onto the line through `x` with direction `d`.
///
/// A zero direction collapses the line to the point `x`.
pub fn ortho_proj_to_line(p: Vec3, d: Vec3, x: Vec3) -> Vec3 {
    let dd = d.dot(d);
    if dd < EPSILON * EPSILON {
        return x;
    }
    x + ((p - x).dot(d) / dd) * d
}

/// Orthogonal projection of `p` onto the plane through `x` with unit normal `n`.
pub fn ortho_proj_to_plane(p: Vec3, n: Vec3, x: Vec3) -> Vec3 {
    p - (p - x).dot(n) * n
}

/// Projects `p` onto the line `x1 + t (x2 - x1)` along the direction `d`.
///
/// The returned point `p'` is chosen so that `p - p'` makes the same angle
/// with the line as `d` does. The line parameter solves a quadratic; of the
/// two roots, the one whose offset best agrees with `d` wins. `clamp`
/// bounds the parameter, `Some((0.0, 1.0))` restricting the result to the
/// segment itself.
///
/// When the quadratic has no real root (for instance `d` parallel to the
/// line), the orthogonal projection onto the line is returned instead.
pub fn oblique_proj_to_line(p: Vec3, d: Vec3, x1: Vec3, x2: Vec3, clamp: Option<(f32, f32)>) -> Vec3 {
    let b = x2 - x1;
    if b.length_squared() < EPSILON * EPSILON {
        return x1;
    }
    let Some(g) = d.try_normalize() else {
        return ortho_proj_to_line(p, b, x1);
    };

    let a = x1 - p;
    let aa = a.dot(a);
    let ab = a.dot(b);
    let bb = b.dot(b);
    let bg = b.dot(g);

    let qa = bb * bb - bg * bg * bb;
    let qb = 2.0 * ab * bb - 2.0 * bg * bg * ab;
    let qc = ab * ab - bg * bg * aa;

    let Some((t1, t2)) = solve_quadratic(qa, qb, qc) else {
        return ortho_proj_to_line(p, b, x1);
    };

    let residual = |t: f32| {
        let w = p - (x1 + t * b);
        let len = w.length();
        if len < EPSILON { 0.0 } else { (1.0 - w.dot(g) / len).abs() }
    };

    let mut t = if residual(t1) <= residual(t2) { t1 } else { t2 };
    if let Some((t_min, t_max)) = clamp {
        t = t.clamp(t_min, t_max);
    }

    x1 + t * b
}

/// Intersection of the line through `p1` and `p2` with the plane through `x`
/// with normal `n`. `None` when the line is degenerate or parallel to the plane.
pub fn intersect_line_with_plane(p1: Vec3, p2: Vec3, n: Vec3, x: Vec3) -> Option<Vec3> {
    let d = (p2 - p1).try_normalize()?;
    let n = n.try_normalize()?;

    let denom = n.dot(d);
    if denom.abs() < EPSILON {
        return None;
    }

    let t = n.dot(x - p1) / denom;
    Some(p1 + t * d)
}

/// Real roots of `a t² + b t + c = 0`, smaller first.
///
/// A discriminant that is only slightly negative is treated as a double
/// root. A vanishing leading coefficient falls back to Newton's method
/// started from the linear solution. Returns `None` when there is no real
/// root at all.
pub fn solve_quadratic(a: f32, b: f32, c: f32) -> Option<(f32, f32)> {
    let disc = b * b - 4.0 * a * c;
    if disc < 0.0 && !approximately(disc, 0.0) {
        return None;
    }

    if a.abs() < f32::EPSILON {
        if b.abs() < f32::EPSILON {
            return None;
        }
        let t = find_root(-c / b, |t| (a * t + b) * t + c, |t| 2.0 * a * t + b);
        return Some((t, t));
    }

    if disc < 0.0 {
        let t = -b / (2.0 * a);
        return Some((t, t));
    }

    // Numerically stable form; avoids cancellation when b² >> 4ac.
    let q = -0.5 * (b + b.signum() * disc.sqrt());
    if q.abs() < f32::EPSILON {
        // b == 0 and c == 0
        return Some((0.0, 0.0));
    }
    let r1 = q / a;
    let r2 = c / q;
    Some((r1.min(r2), r1.max(r2)))
}

/// Newton's method from `x0`.
///
/// # Panics
/// Panics when `f` has not reached zero after [`MAX_ROOT_ITERATIONS`]
/// steps; callers only use it where a root is known to exist.
pub fn find_root(x0: f32, f: impl Fn(f32) -> f32, f_prime: impl Fn(f32) -> f32) -> f32 {
    let mut x = x0;
    let mut iter = 0;

    while !approximately(f(x), 0.0) {
        x -= f(x) / f_prime(x);
        iter += 1;
        assert!(
            iter < MAX_ROOT_ITERATIONS,
            "root finding did not converge: iter {iter}, x {x}, residual {}",
            f(x)
        );
    }

    x
}

/// Point on a sphere of radius `r` at elevation `theta` (from the XY plane
/// towards +Z) and azimuth `phi` (from +X towards +Y).
pub fn sphere(theta: f32, phi: f32, r: f32) -> Vec3 {
    Vec3::new(
        r * theta.cos() * phi.cos(),
        r * theta.cos() * phi.sin(),
        r * theta.sin(),
    )
}

/// Inverse of [`sphere`]: `(theta, phi)` with `theta` in `[-π/2, π/2]` and
/// `phi` in `[0, 2π)`. On the poles the azimuth is reported as 0.
pub fn invert_sphere(p: Vec3) -> (f32, f32) {
    let rcos_theta = (p.x * p.x + p.y * p.y).sqrt();
    let theta = p.z.atan2(rcos_theta).clamp(-FRAC_PI_2, FRAC_PI_2);
    let phi = invert_circle(p.x, p.y);
    (theta, phi)
}

/// Angle in `[0, 2π)` of the point `(r cos t, r sin t)`.
///
/// The origin itself has no angle and maps to 0.
pub fn invert_circle(rcos: f32, rsin: f32) -> f32 {
    let r = (rcos * rcos + rsin * rsin).sqrt();
    if r < f32::EPSILON {
        return 0.0;
    }

    let base = (rcos / r).clamp(-1.0, 1.0).acos();
    let theta = if rsin >= 0.0 { base } else { TAU - base };
    if theta >= TAU { 0.0 } else { theta }
}
