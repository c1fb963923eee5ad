use i_overlay::core::fill_rule::FillRule;
use i_overlay::core::overlay_rule::OverlayRule;
use i_overlay::float::single::SingleFloatOverlay;
use itertools::Itertools;
use log::debug;
use ordered_float::OrderedFloat;

use crate::error::{LayoutError, Result};
use crate::geometry::polygon::Polygon;
use crate::geometry::r2::R2;

const DEDUPE_EPS2: f64 = 1e-18;

/// Minkowski sum of two polygons. Both convex: O(|A|+|B|) two-cursor edge
/// walk. Otherwise: ear-clip both into convex pieces, sum pairwise, and union
/// the pieces with a Boolean overlay.
pub fn minkowski_sum(a: &Polygon, b: &Polygon) -> Result<Polygon> {
    let vertices = if a.is_convex() && b.is_convex() {
        convex_sum(a.vertices(), b.vertices())
    } else {
        general_sum(a, b)?
    };
    let vertices = dedupe(vertices);
    if vertices.len() < 2 {
        return Err(LayoutError::Computation(
            "Minkowski sum collapsed to fewer than 2 vertices".to_string(),
        ));
    }
    Polygon::new(vertices)
}

/// `A ⊖ B = A ⊕ (−B)`: reduces a two-polygon distance query to a
/// single-polygon query at the relative offset of the pair.
pub fn minkowski_diff(a: &Polygon, b: &Polygon) -> Result<Polygon> {
    minkowski_sum(a, &b.negate())
}

/// Rotate the vertex list to start at the lexicographically lowest point
/// (smallest y, then smallest x).
fn reorder(points: &[R2<f64>]) -> Vec<R2<f64>> {
    let pos = points
        .iter()
        .position_min_by_key(|p| (OrderedFloat(p.y), OrderedFloat(p.x)))
        .unwrap_or(0);
    let mut out = points[pos..].to_vec();
    out.extend_from_slice(&points[..pos]);
    out
}

/// Two-cursor walk over the sorted edge fans of both polygons. The first two
/// points of each are re-appended as wrap-around sentinels; an edge-cross tie
/// advances both cursors. Output length is generically |A| + |B|.
fn convex_sum(pa: &[R2<f64>], pb: &[R2<f64>]) -> Vec<R2<f64>> {
    let mut a = reorder(pa);
    let mut b = reorder(pb);
    a.push(a[0]);
    a.push(a[1]);
    b.push(b[0]);
    b.push(b[1]);

    let mut ret = Vec::with_capacity(pa.len() + pb.len());
    let mut i = 0;
    let mut j = 0;
    while i < a.len() - 2 || j < b.len() - 2 {
        ret.push(a[i] + b[j]);
        let va = a[i + 1] - a[i];
        let vb = b[j + 1] - b[j];
        let cross = va.cross(&vb);
        if cross >= 0. && i < a.len() - 2 {
            i += 1;
        }
        if cross <= 0. && j < b.len() - 2 {
            j += 1;
        }
    }
    ret
}

/// General fallback: convex decomposition, pairwise convex sums, Boolean
/// union, outer contour.
fn general_sum(a: &Polygon, b: &Polygon) -> Result<Vec<R2<f64>>> {
    let pieces_a = decompose(a)?;
    let pieces_b = decompose(b)?;
    let mut partial: Vec<Vec<[f64; 2]>> = Vec::new();
    for pa in &pieces_a {
        for pb in &pieces_b {
            let piece = dedupe(convex_sum(pa, pb));
            if piece.len() >= 3 {
                partial.push(piece.iter().map(|p| [p.x, p.y]).collect());
            }
        }
    }
    debug!(
        "general minkowski sum: {}x{} convex pieces, {} partial sums",
        pieces_a.len(),
        pieces_b.len(),
        partial.len()
    );
    if partial.is_empty() {
        return Err(LayoutError::Computation(
            "no convex pieces to sum".to_string(),
        ));
    }
    union_outer_contour(partial)
}

/// Union all contours with `i_overlay` and keep the outer boundary (the
/// contour of largest absolute area).
fn union_outer_contour(partial: Vec<Vec<[f64; 2]>>) -> Result<Vec<R2<f64>>> {
    let mut result: Vec<Vec<[f64; 2]>> = vec![partial[0].clone()];
    for contour in &partial[1..] {
        let shapes = result.overlay(
            &[contour.clone()],
            OverlayRule::Union,
            FillRule::NonZero,
        );
        let merged: Vec<Vec<[f64; 2]>> = shapes
            .into_iter()
            .flatten()
            .filter(|c| c.len() >= 3)
            .collect();
        if !merged.is_empty() {
            result = merged;
        }
    }
    result
        .into_iter()
        .map(|c| c.into_iter().map(|[x, y]| R2 { x, y }).collect::<Vec<_>>())
        .max_by_key(|c: &Vec<R2<f64>>| OrderedFloat(abs_area(c)))
        .ok_or_else(|| LayoutError::Computation("Boolean union returned no contours".to_string()))
}

fn abs_area(points: &[R2<f64>]) -> f64 {
    let n = points.len();
    let mut area = 0.;
    for i in 0..n {
        let j = (i + 1) % n;
        area += points[i].cross(&points[j]);
    }
    (area / 2.).abs()
}

/// Convex pieces of a polygon: the polygon itself if already convex, else
/// ear-clipped triangles (vertices are CCW by the `Polygon` invariant).
fn decompose(p: &Polygon) -> Result<Vec<Vec<R2<f64>>>> {
    if p.is_convex() {
        return Ok(vec![p.vertices().to_vec()]);
    }
    let mut verts = p.vertices().to_vec();
    let mut pieces = Vec::new();
    while verts.len() > 3 {
        let n = verts.len();
        let mut clipped = false;
        for i in 0..n {
            let prev = (i + n - 1) % n;
            let next = (i + 1) % n;
            if is_ear(&verts, prev, i, next) {
                pieces.push(vec![verts[prev], verts[i], verts[next]]);
                verts.remove(i);
                clipped = true;
                break;
            }
        }
        if !clipped {
            return Err(LayoutError::Computation(
                "ear clipping found no ear; input may be self-intersecting".to_string(),
            ));
        }
    }
    pieces.push(verts);
    Ok(pieces)
}

fn is_ear(verts: &[R2<f64>], prev: usize, i: usize, next: usize) -> bool {
    let a = verts[prev];
    let b = verts[i];
    let c = verts[next];
    // Reflex or collinear corners are not ears
    if (b - a).cross(&(c - b)) <= 0. {
        return false;
    }
    for (k, p) in verts.iter().enumerate() {
        if k == prev || k == i || k == next {
            continue;
        }
        if in_triangle(p, &a, &b, &c) {
            return false;
        }
    }
    true
}

/// Inclusive of the boundary; a, b, c must wind CCW.
fn in_triangle(p: &R2<f64>, a: &R2<f64>, b: &R2<f64>, c: &R2<f64>) -> bool {
    (*b - *a).cross(&(*p - *a)) >= 0.
        && (*c - *b).cross(&(*p - *b)) >= 0.
        && (*a - *c).cross(&(*p - *c)) >= 0.
}

/// Collapse consecutive duplicate vertices (Boolean output sometimes repeats
/// corners), including a trailing repeat of the first.
fn dedupe(points: Vec<R2<f64>>) -> Vec<R2<f64>> {
    let mut out: Vec<R2<f64>> = Vec::with_capacity(points.len());
    for p in points {
        if out.last().map_or(true, |q| (p - *q).norm2() > DEDUPE_EPS2) {
            out.push(p);
        }
    }
    while out.len() > 1 && (out[0] - out[out.len() - 1]).norm2() <= DEDUPE_EPS2 {
        out.pop();
    }
    out
}
