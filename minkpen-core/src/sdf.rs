//! Branch-free signed-distance function over a fixed polygon, emitted into an
//! expression graph so it can be differentiated with respect to a variable
//! query offset.
//!
//! The polygon vertices are compile-time constants (the Minkowski difference
//! of a relation pair, built once); only the offset is variable. Every edge
//! updates all running state through `select` nodes instead of control flow,
//! so the graph is static and one reverse pass yields d(sdf)/d(offset).
//!
//! Identity: the emitted function at `offset` equals the reference
//! `Polygon::sdf` at `-offset` (sign convention: negative inside).

use crate::error::{LayoutError, Result};
use crate::geometry::r2::R2;
use crate::graph::{Graph, NodeId};

/// Emit `sdf(offset)` for the given polygon into `g`, returning the output
/// node. Zero-length edges are rejected here rather than surfacing as a
/// division by zero inside the graph.
pub fn emit_sdf(g: &mut Graph, offset: [NodeId; 2], points: &[R2<f64>]) -> Result<NodeId> {
    let n = points.len();
    if n < 2 {
        return Err(LayoutError::DegeneratePolygon(format!(
            "{} vertices, need at least 2",
            n
        )));
    }
    for i in 0..n {
        if (points[(i + 1) % n] - points[i]).norm2() == 0. {
            return Err(LayoutError::DegeneratePolygon(format!(
                "zero-length edge at vertex {}",
                i
            )));
        }
    }

    // sdf_offset(0) = sdf_original(-offset)
    let ox = g.neg(offset[0]);
    let oy = g.neg(offset[1]);

    let zero = g.constant(0.);
    let one = g.constant(1.);

    // Running minimum squared distance, edge-vs-vertex flag (1/0), vertex
    // sign, and the closest edge's (u, v) components.
    let mut d = g.constant(f64::MAX);
    let mut e = one;
    let mut s = one;
    let (mut uux, mut uuy) = (zero, zero);
    let (mut vvx, mut vvy) = (zero, zero);

    let mut v0 = points[0] - points[n - 1];
    for i in 0..n {
        let p = points[i];
        let v = points[(i + 1) % n] - p;
        let z = v.norm2();

        let px = g.constant(p.x);
        let py = g.constant(p.y);
        let vx = g.constant(v.x);
        let vy = g.constant(v.y);
        let zn = g.constant(z);

        // u = offset - P[i]
        let ux = g.sub(ox, px);
        let uy = g.sub(oy, py);

        // udotv = u·v, cross = u×v
        let uxvx = g.mul(ux, vx);
        let uyvy = g.mul(uy, vy);
        let udotv = g.add(uxvx, uyvy);
        let uxvy = g.mul(ux, vy);
        let uyvx = g.mul(uy, vx);
        let cross = g.sub(uxvy, uyvx);

        // projection-in-range predicate: 0 <= udotv < z
        let ge0 = g.ge(udotv, zero);
        let ltz = g.lt(udotv, zn);
        let in_range = g.and(ge0, ltz);

        // candidate squared distances: perpendicular-to-edge vs to-vertex
        let cross2 = g.sqr(cross);
        let dd_edge = g.div(cross2, zn);
        let ux2 = g.sqr(ux);
        let uy2 = g.sqr(uy);
        let dd_vert = g.add(ux2, uy2);
        let dd = g.select(in_range, dd_edge, dd_vert);

        let new_min = g.lt(dd, d);

        // flag: edge case when (in_range ∧ new_min), vertex case when
        // (¬in_range ∧ new_min), else unchanged
        let not_in_range = g.not(in_range);
        let edge_wins = g.and(in_range, new_min);
        let vert_wins = g.and(not_in_range, new_min);
        let keep = g.select(vert_wins, zero, e);
        e = g.select(edge_wins, one, keep);

        // vertex sign: cross of the previous edge direction against the
        // current one, constant-folded since both edges are constants
        let sign = g.constant(if v0.cross(&v) < 0. { -1. } else { 1. });
        s = g.select(vert_wins, sign, s);

        // closest-edge endpoints track the latest edge-case winner (the flag
        // just updated must agree)
        let upd = g.and(e, new_min);
        uux = g.select(upd, ux, uux);
        uuy = g.select(upd, uy, uuy);
        vvx = g.select(upd, vx, vvx);
        vvy = g.select(upd, vy, vvy);

        d = g.min(d, dd);
        v0 = v;
    }

    // edge case: signed perpendicular distance cross(uu, vv)/|vv|;
    // vertex case: s·√d
    let a = g.mul(uux, vvy);
    let b = g.mul(uuy, vvx);
    let cross_uv = g.sub(a, b);
    let vvx2 = g.sqr(vvx);
    let vvy2 = g.sqr(vvy);
    let vv2 = g.add(vvx2, vvy2);
    let vv_norm = g.sqrt(vv2);
    let edge_val = g.div(cross_uv, vv_norm);
    let sd = g.sqrt(d);
    let vert_val = g.mul(s, sd);
    Ok(g.select(e, edge_val, vert_val))
}
