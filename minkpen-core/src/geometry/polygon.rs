use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, Result};
use crate::geometry::r2::R2;

/// Polygon vertices, always stored in counter-clockwise order.
///
/// A 2-vertex "polygon" is a degenerate line segment; the SDF and Minkowski
/// paths accept it. Fewer than 2 vertices, or a zero-length edge, is rejected
/// at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    vertices: Vec<R2<f64>>,
}

/// Orientation of the ordered triplet (p, q, r):
/// 0 if collinear, -1 if r lies left of pq, 1 if right.
pub(crate) fn orientation(p: &R2<f64>, q: &R2<f64>, r: &R2<f64>) -> i32 {
    let val = (*q - *p).cross(&(*r - *p));
    if val == 0. {
        0
    } else if val > 0. {
        -1
    } else {
        1
    }
}

/// Whether q lies on the axis-aligned bounding box of segment pr.
/// Only meaningful when p, q, r are collinear.
fn on_segment(p: &R2<f64>, q: &R2<f64>, r: &R2<f64>) -> bool {
    q.x <= p.x.max(r.x) && q.x >= p.x.min(r.x) && q.y <= p.y.max(r.y) && q.y >= p.y.min(r.y)
}

/// Proper segment intersection test. Fully collinear segments are not
/// counted as intersecting (adjacent polygon edges share endpoints).
pub(crate) fn segments_intersect(a: &R2<f64>, b: &R2<f64>, c: &R2<f64>, d: &R2<f64>) -> bool {
    if orientation(a, b, c) == 0 && orientation(a, b, d) == 0 {
        return false;
    }
    let o1 = orientation(a, b, c);
    let o2 = orientation(a, b, d);
    let o3 = orientation(c, d, a);
    let o4 = orientation(c, d, b);
    (o1 != o2 && o3 != o4)
        || (o1 == 0 && on_segment(a, c, b))
        || (o2 == 0 && on_segment(a, d, b))
        || (o3 == 0 && on_segment(c, a, d))
        || (o4 == 0 && on_segment(c, b, d))
}

impl Polygon {
    /// Build a polygon, normalizing vertex order to CCW.
    pub fn new(mut vertices: Vec<R2<f64>>) -> Result<Polygon> {
        if vertices.len() < 2 {
            return Err(LayoutError::DegeneratePolygon(format!(
                "{} vertices, need at least 2",
                vertices.len()
            )));
        }
        let n = vertices.len();
        for i in 0..n {
            let v = vertices[(i + 1) % n] - vertices[i];
            if v.norm2() == 0. {
                return Err(LayoutError::DegeneratePolygon(format!(
                    "zero-length edge at vertex {}",
                    i
                )));
            }
        }
        if signed_area(&vertices) < 0. {
            vertices.reverse();
        }
        Ok(Polygon { vertices })
    }

    pub fn vertices(&self) -> &[R2<f64>] {
        &self.vertices
    }

    pub fn num_vertices(&self) -> usize {
        self.vertices.len()
    }

    pub fn signed_area(&self) -> f64 {
        signed_area(&self.vertices)
    }

    /// Rigid translation, orientation and edge lengths are untouched.
    pub fn translate(&self, delta: R2<f64>) -> Polygon {
        Polygon {
            vertices: self.vertices.iter().map(|v| *v + delta).collect(),
        }
    }

    /// Reflect every vertex through the origin. A 180° rotation, so CCW
    /// order is preserved.
    pub fn negate(&self) -> Polygon {
        Polygon {
            vertices: self.vertices.iter().map(|v| -*v).collect(),
        }
    }

    /// A polygon is convex iff the turn direction never flips across
    /// consecutive edge triples. Collinear triples are allowed.
    pub fn is_convex(&self) -> bool {
        let n = self.vertices.len();
        for i in 0..n {
            let p0 = self.vertices[i];
            let p1 = self.vertices[(i + 1) % n];
            let p2 = self.vertices[(i + 2) % n];
            if (p1 - p0).cross(&(p2 - p1)) < 0. {
                return false;
            }
        }
        true
    }

    /// O(n²) pairwise non-adjacent edge intersection test; rejects
    /// self-intersecting input before it enters the kernel.
    pub fn is_simple(&self) -> bool {
        let n = self.vertices.len();
        for i in 0..n {
            for j in (i + 1)..n {
                if j - i == 1 || (i == 0 && j == n - 1) {
                    continue;
                }
                if segments_intersect(
                    &self.vertices[i],
                    &self.vertices[(i + 1) % n],
                    &self.vertices[j],
                    &self.vertices[(j + 1) % n],
                ) {
                    return false;
                }
            }
        }
        true
    }

    /// Reference signed distance from `x` to this polygon's boundary:
    /// negative inside, positive outside. Validation oracle for the
    /// differentiable reformulation in `sdf`, not on the optimization hot
    /// path.
    ///
    /// Per edge: if the projection parameter of `x` falls in `[0, z)` the
    /// candidate is the perpendicular distance to the edge line, else the
    /// distance to the near endpoint; the vertex-case sign comes from the
    /// cross of the previous edge direction against the current one.
    pub fn sdf(&self, x: R2<f64>) -> f64 {
        let pts = &self.vertices;
        let n = pts.len();
        let mut d = f64::INFINITY;
        let mut e = true;
        let mut j = 0;
        let mut s = 1.;
        let mut v0 = pts[0] - pts[n - 1];
        for i in 0..n {
            let u = x - pts[i];
            let v = pts[(i + 1) % n] - pts[i];
            let z = v.norm2();
            let udotv = u.dot(&v);
            if udotv >= 0. && udotv < z {
                let dd = u.cross(&v) * u.cross(&v) / z;
                if dd < d {
                    d = dd;
                    j = i;
                    e = true;
                }
            } else {
                let dd = u.norm2();
                if dd < d {
                    d = dd;
                    s = 1.;
                    e = false;
                    if v0.cross(&v) < 0. {
                        s = -1.;
                    }
                }
            }
            v0 = v;
        }
        if e {
            let u = x - pts[j];
            let v = pts[(j + 1) % n] - pts[j];
            u.cross(&v) / v.norm2().sqrt()
        } else {
            s * d.sqrt()
        }
    }
}

fn signed_area(vertices: &[R2<f64>]) -> f64 {
    let n = vertices.len();
    let mut area = 0.;
    for i in 0..n {
        let j = (i + 1) % n;
        area += vertices[i].x * vertices[j].y;
        area -= vertices[j].x * vertices[i].y;
    }
    area / 2.
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn square() -> Polygon {
        Polygon::new(vec![
            R2 { x: 0., y: 0. },
            R2 { x: 1., y: 0. },
            R2 { x: 1., y: 1. },
            R2 { x: 0., y: 1. },
        ])
        .unwrap()
    }

    fn right_triangle() -> Polygon {
        Polygon::new(vec![
            R2 { x: 0., y: 0. },
            R2 { x: 1., y: 0. },
            R2 { x: 0., y: 1. },
        ])
        .unwrap()
    }

    /// Even-odd ray cast, ground truth for SDF sign tests.
    fn contains(poly: &Polygon, p: R2<f64>) -> bool {
        let pts = poly.vertices();
        let n = pts.len();
        let mut inside = false;
        let mut j = n - 1;
        for i in 0..n {
            if (pts[i].y > p.y) != (pts[j].y > p.y)
                && p.x < (pts[j].x - pts[i].x) * (p.y - pts[i].y) / (pts[j].y - pts[i].y) + pts[i].x
            {
                inside = !inside;
            }
            j = i;
        }
        inside
    }

    /// xorshift, deterministic across runs
    fn samples(n: usize, lo: f64, hi: f64) -> Vec<R2<f64>> {
        let mut state = 0x9e3779b97f4a7c15u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            lo + (hi - lo) * ((state >> 11) as f64 / (1u64 << 53) as f64)
        };
        (0..n)
            .map(|_| R2 {
                x: next(),
                y: next(),
            })
            .collect()
    }

    #[test]
    fn test_too_few_vertices() {
        assert!(matches!(
            Polygon::new(vec![R2 { x: 0., y: 0. }]),
            Err(LayoutError::DegeneratePolygon(_))
        ));
        assert!(Polygon::new(vec![]).is_err());
    }

    #[test]
    fn test_zero_length_edge_rejected() {
        let r = Polygon::new(vec![
            R2 { x: 0., y: 0. },
            R2 { x: 0., y: 0. },
            R2 { x: 1., y: 1. },
        ]);
        assert!(matches!(r, Err(LayoutError::DegeneratePolygon(_))));
    }

    #[test]
    fn test_segment_shape() {
        let seg = Polygon::new(vec![R2 { x: 0., y: 0. }, R2 { x: 1., y: 0. }]).unwrap();
        assert_eq!(seg.num_vertices(), 2);
        assert!(seg.is_convex());
        // Distance from above the segment
        assert_relative_eq!(seg.sdf(R2 { x: 0.5, y: 1. }).abs(), 1., epsilon = 1e-12);
    }

    #[test]
    fn test_ccw_normalization_idempotent() {
        let cw = vec![
            R2 { x: 0., y: 0. },
            R2 { x: 0., y: 1. },
            R2 { x: 1., y: 1. },
            R2 { x: 1., y: 0. },
        ];
        let p = Polygon::new(cw).unwrap();
        assert!(p.signed_area() > 0.);
        let again = Polygon::new(p.vertices().to_vec()).unwrap();
        assert_eq!(p, again);
    }

    #[test]
    fn test_is_convex() {
        assert!(square().is_convex());
        assert!(right_triangle().is_convex());
        // L-shape is not convex
        let l = Polygon::new(vec![
            R2 { x: 0., y: 0. },
            R2 { x: 2., y: 0. },
            R2 { x: 2., y: 1. },
            R2 { x: 1., y: 1. },
            R2 { x: 1., y: 2. },
            R2 { x: 0., y: 2. },
        ])
        .unwrap();
        assert!(!l.is_convex());
        assert!(l.is_simple());
    }

    #[test]
    fn test_is_simple() {
        assert!(square().is_simple());
        // Bowtie
        let bowtie = Polygon::new(vec![
            R2 { x: 0., y: 0. },
            R2 { x: 1., y: 1. },
            R2 { x: 1., y: 0. },
            R2 { x: 0., y: 1. },
        ])
        .unwrap();
        assert!(!bowtie.is_simple());
    }

    #[test]
    fn test_negate() {
        let p = right_triangle().negate();
        assert!(p.signed_area() > 0.);
        assert!(p.vertices().iter().any(|v| v.x == -1. && v.y == 0.));
        assert!(p.vertices().iter().any(|v| v.x == 0. && v.y == -1.));
    }

    #[test]
    fn test_sdf_square_points() {
        let s = square();
        // Center: distance 0.5 to every edge, inside
        assert_relative_eq!(s.sdf(R2 { x: 0.5, y: 0.5 }), -0.5, epsilon = 1e-12);
        // Outside, facing an edge
        assert_relative_eq!(s.sdf(R2 { x: 0.5, y: -0.5 }), 0.5, epsilon = 1e-12);
        assert_relative_eq!(s.sdf(R2 { x: 2., y: 0.5 }), 1., epsilon = 1e-12);
        // Outside, nearest to a corner
        assert_relative_eq!(
            s.sdf(R2 { x: 2., y: 2. }),
            2f64.sqrt(),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_sdf_sign_matches_ray_cast() {
        for poly in [square(), right_triangle()] {
            let mut checked = 0;
            for p in samples(150, -0.5, 1.5) {
                let sdf = poly.sdf(p);
                // Skip samples too close to the boundary for either method
                if sdf.abs() < 1e-9 {
                    continue;
                }
                assert_eq!(
                    sdf < 0.,
                    contains(&poly, p),
                    "sdf {} disagrees with ray cast at {}",
                    sdf,
                    p
                );
                checked += 1;
            }
            assert!(checked >= 100);
        }
    }
}
