//! Compiles relation sets into one differentiable loss.
//!
//! Each relation instance `(i, j)` gets its Minkowski difference computed
//! once, a branch-free SDF emitted over it, and a squared penalty built from
//! the SDF at the pair's relative offset. The offset is read from the
//! parameter vector at every evaluation; the graph itself is built once per
//! problem and only re-evaluated as the penalty coefficient and parameters
//! change.

use std::str::FromStr;

use derive_more::Display;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{LayoutError, Result};
use crate::geometry::minkowski::minkowski_diff;
use crate::graph::{Graph, NodeId};
use crate::model::Shape;
use crate::sdf::emit_sdf;

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationKind {
    #[display(fmt = "notOverlap")]
    #[serde(rename = "notOverlap")]
    NotOverlap,
    #[display(fmt = "overlap")]
    #[serde(rename = "overlap")]
    Overlap,
    #[display(fmt = "tangent")]
    #[serde(rename = "tangent")]
    Tangent,
    #[display(fmt = "contain")]
    #[serde(rename = "contain")]
    Contain,
}

impl RelationKind {
    pub fn code(&self) -> &'static str {
        match self {
            RelationKind::NotOverlap => "notOverlap",
            RelationKind::Overlap => "overlap",
            RelationKind::Tangent => "tangent",
            RelationKind::Contain => "contain",
        }
    }
}

impl FromStr for RelationKind {
    type Err = LayoutError;
    fn from_str(s: &str) -> Result<RelationKind> {
        match s {
            "notOverlap" => Ok(RelationKind::NotOverlap),
            "overlap" => Ok(RelationKind::Overlap),
            "tangent" => Ok(RelationKind::Tangent),
            "contain" => Ok(RelationKind::Contain),
            _ => Err(LayoutError::InvalidRelationType(s.to_string())),
        }
    }
}

/// The four pairwise relation lists plus the indices of shapes pinned in
/// place. Pairs reference shapes purely by position in the shape list;
/// `contain` is directional, first index is the container.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Relations {
    #[serde(default, rename = "notOverlap")]
    pub not_overlap: Vec<(usize, usize)>,
    #[serde(default)]
    pub overlap: Vec<(usize, usize)>,
    #[serde(default)]
    pub tangent: Vec<(usize, usize)>,
    #[serde(default)]
    pub contain: Vec<(usize, usize)>,
    #[serde(default)]
    pub fixed: Vec<usize>,
}

impl Relations {
    pub fn add(&mut self, kind: RelationKind, i: usize, j: usize) {
        match kind {
            RelationKind::NotOverlap => self.not_overlap.push((i, j)),
            RelationKind::Overlap => self.overlap.push((i, j)),
            RelationKind::Tangent => self.tangent.push((i, j)),
            RelationKind::Contain => self.contain.push((i, j)),
        }
    }

    pub fn len(&self) -> usize {
        self.not_overlap.len() + self.overlap.len() + self.tangent.len() + self.contain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (RelationKind, usize, usize)> + '_ {
        let tag = |kind: RelationKind| move |&(i, j): &(usize, usize)| (kind, i, j);
        self.not_overlap
            .iter()
            .map(tag(RelationKind::NotOverlap))
            .chain(self.overlap.iter().map(tag(RelationKind::Overlap)))
            .chain(self.tangent.iter().map(tag(RelationKind::Tangent)))
            .chain(self.contain.iter().map(tag(RelationKind::Contain)))
    }

    /// Every index pair must reference two distinct existing shapes, and
    /// every fixed index an existing shape. Fails fast; never silently skips.
    pub fn validate(&self, shape_count: usize) -> Result<()> {
        for (kind, i, j) in self.iter() {
            if i == j {
                return Err(LayoutError::SelfRelation { kind: kind.code(), i });
            }
            for idx in [i, j] {
                if idx >= shape_count {
                    return Err(LayoutError::MalformedRelationIndex {
                        kind: kind.code(),
                        i,
                        j,
                        idx,
                        len: shape_count,
                    });
                }
            }
        }
        for &idx in &self.fixed {
            if idx >= shape_count {
                return Err(LayoutError::MalformedRelationIndex {
                    kind: "fixed",
                    i: idx,
                    j: idx,
                    idx,
                    len: shape_count,
                });
            }
        }
        Ok(())
    }
}

/// Builds the base-objective node over a fresh graph; parameter slots are
/// reachable through `Graph::input`. The default is a constant zero.
pub type ObjectiveBuilder<'a> = &'a dyn Fn(&mut Graph) -> NodeId;

/// A loss graph compiled for one problem: fixed relation structure, variable
/// parameters and penalty coefficient.
pub struct CompiledLoss {
    graph: Graph,
    objective: NodeId,
    penalty: NodeId,
}

impl CompiledLoss {
    pub fn n_params(&self) -> usize {
        self.graph.n_inputs()
    }

    /// `objective(params) + c·penalty(params)` and its gradient, from one
    /// forward and one seeded reverse pass.
    pub fn eval(&self, params: &[f64], c: f64) -> (f64, Vec<f64>) {
        let vals = self.graph.forward(params);
        let loss = vals[self.objective.index()] + c * vals[self.penalty.index()];
        let grad = self
            .graph
            .backward(&[(self.objective, 1.), (self.penalty, c)], &vals);
        (loss, grad)
    }

    /// Unweighted penalty sum, mostly for inspection and tests.
    pub fn penalty_value(&self, params: &[f64]) -> f64 {
        self.graph.forward(params)[self.penalty.index()]
    }
}

/// Compile all relation instances over the given shapes into one loss graph.
pub fn compile(
    shapes: &[Shape],
    relations: &Relations,
    objective: Option<ObjectiveBuilder>,
) -> Result<CompiledLoss> {
    relations.validate(shapes.len())?;
    let n_params = 2 * shapes.len();
    let mut g = Graph::new(n_params);
    let zero = g.constant(0.);

    let mut penalty = zero;
    for (kind, i, j) in relations.iter() {
        let a = shapes[i].polygon();
        let b = shapes[j].polygon();
        let diff = match kind {
            RelationKind::Contain => minkowski_diff(a, &b.negate())?,
            _ => minkowski_diff(a, b)?,
        };
        let offset = offset_nodes(&mut g, zero, shapes, i, j);
        let sdf = emit_sdf(&mut g, offset, diff.vertices())?;
        let term = match kind {
            // zero once separated (sdf >= 0)
            RelationKind::NotOverlap => {
                let m = g.min(zero, sdf);
                let n = g.neg(m);
                g.sqr(n)
            }
            // zero once touching or overlapping (sdf <= 0)
            RelationKind::Overlap => {
                let m = g.max(zero, sdf);
                g.sqr(m)
            }
            // zero only at exact boundary contact
            RelationKind::Tangent | RelationKind::Contain => g.sqr(sdf),
        };
        penalty = g.add(penalty, term);
    }

    let objective = match objective {
        Some(build) => build(&mut g),
        None => zero,
    };
    debug!(
        "compiled {} relation terms over {} params into {} graph nodes",
        relations.len(),
        n_params,
        g.len()
    );
    Ok(CompiledLoss {
        graph: g,
        objective,
        penalty,
    })
}

/// Offset rule per translatability of the pair: both movable reads the
/// relative window `p2 - p1`; a half-fixed pair reads the free shape's window
/// directly; a fully-fixed pair contributes a constant term.
fn offset_nodes(
    g: &mut Graph,
    zero: NodeId,
    shapes: &[Shape],
    i: usize,
    j: usize,
) -> [NodeId; 2] {
    let ti = shapes[i].translatable;
    let tj = shapes[j].translatable;
    if ti && tj {
        let p1x = g.input(2 * i);
        let p1y = g.input(2 * i + 1);
        let p2x = g.input(2 * j);
        let p2y = g.input(2 * j + 1);
        [g.sub(p2x, p1x), g.sub(p2y, p1y)]
    } else if ti {
        [g.input(2 * i), g.input(2 * i + 1)]
    } else if tj {
        [g.input(2 * j), g.input(2 * j + 1)]
    } else {
        [zero, zero]
    }
}
