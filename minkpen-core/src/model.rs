//! The entity set: shapes, relation sets, and the flat parameter vector,
//! plus the optimize/commit lifecycle. Relations reference shapes purely by
//! integer index, so the whole model is serializable and free of cyclic
//! ownership.

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::polygon::Polygon;
use crate::geometry::r2::R2;
use crate::optimizer::{optimize, OptimizeConfig, Outcome};
use crate::relation::{compile, ObjectiveBuilder, Relations};

/// A placeable polygon. `fill` is opaque to the core; `translation`
/// accumulates committed movement separately from the optimizer's parameter
/// vector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    polygon: Polygon,
    pub fill: Option<String>,
    pub translatable: bool,
    pub translation: R2<f64>,
}

impl Shape {
    pub fn new(polygon: Polygon) -> Shape {
        Shape {
            polygon,
            fill: None,
            translatable: true,
            translation: R2 { x: 0., y: 0. },
        }
    }

    pub fn polygon(&self) -> &Polygon {
        &self.polygon
    }

    /// Fold the accumulated translation into the stored vertices and clear
    /// it.
    pub fn apply_translation(&mut self) {
        if self.translation.x == 0. && self.translation.y == 0. {
            return;
        }
        self.polygon = self.polygon.translate(self.translation);
        self.translation = R2 { x: 0., y: 0. };
    }

    #[cfg(test)]
    pub(crate) fn unit_square() -> Shape {
        Shape::new(
            Polygon::new(vec![
                R2 { x: 0., y: 0. },
                R2 { x: 1., y: 0. },
                R2 { x: 1., y: 1. },
                R2 { x: 0., y: 1. },
            ])
            .unwrap(),
        )
    }
}

/// Shapes, relations and the parameter vector. The vector always holds
/// exactly two slots per shape — the (x, y) translation of shape `i` lives at
/// `(2i, 2i+1)` — and is owned exclusively by the optimizer for the duration
/// of an `optimize` call.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Layout {
    shapes: Vec<Shape>,
    relations: Relations,
    params: Vec<f64>,
}

impl Layout {
    pub fn new() -> Layout {
        Layout::default()
    }

    pub fn shapes(&self) -> &[Shape] {
        &self.shapes
    }

    pub fn relations(&self) -> &Relations {
        &self.relations
    }

    pub fn params(&self) -> &[f64] {
        &self.params
    }

    pub fn shape_count(&self) -> usize {
        self.shapes.len()
    }

    pub fn param_index(i: usize) -> usize {
        2 * i
    }

    /// Append a shape, growing the parameter vector by one (x, y) window.
    pub fn add_shape(&mut self, shape: Shape) -> usize {
        self.shapes.push(shape);
        self.params.extend([0., 0.]);
        self.shapes.len() - 1
    }

    /// Remove a shape and its parameter window. Relations touching it are
    /// dropped; higher indices shift down to stay aligned with the shape
    /// list.
    pub fn remove_shape(&mut self, idx: usize) -> Option<Shape> {
        if idx >= self.shapes.len() {
            return None;
        }
        let shape = self.shapes.remove(idx);
        self.params.truncate(2 * self.shapes.len());
        let remap = |pairs: &mut Vec<(usize, usize)>| {
            pairs.retain(|&(i, j)| i != idx && j != idx);
            for (i, j) in pairs.iter_mut() {
                if *i > idx {
                    *i -= 1;
                }
                if *j > idx {
                    *j -= 1;
                }
            }
        };
        remap(&mut self.relations.not_overlap);
        remap(&mut self.relations.overlap);
        remap(&mut self.relations.tangent);
        remap(&mut self.relations.contain);
        self.relations.fixed.retain(|&i| i != idx);
        for i in self.relations.fixed.iter_mut() {
            if *i > idx {
                *i -= 1;
            }
        }
        Some(shape)
    }

    /// Replace the relation sets wholesale, re-deriving every shape's
    /// `translatable` flag from the `fixed` set.
    pub fn set_relations(&mut self, relations: Relations) -> Result<()> {
        relations.validate(self.shapes.len())?;
        for shape in self.shapes.iter_mut() {
            shape.translatable = true;
        }
        for &idx in &relations.fixed {
            self.shapes[idx].translatable = false;
        }
        self.relations = relations;
        Ok(())
    }

    pub fn optimize(&mut self, cfg: &OptimizeConfig) -> Result<Outcome> {
        self.optimize_with_objective(cfg, None)
    }

    /// Build the loss graph for the current shapes and relations, drive the
    /// penalty optimizer, then commit: fold each translatable shape's
    /// parameter window into its vertices and zero the vector, so repeated
    /// calls never double-apply translation.
    pub fn optimize_with_objective(
        &mut self,
        cfg: &OptimizeConfig,
        objective: Option<ObjectiveBuilder>,
    ) -> Result<Outcome> {
        self.params.fill(0.);
        let loss = compile(&self.shapes, &self.relations, objective)?;
        let outcome = optimize(&loss, &mut self.params, cfg);
        debug!(
            "optimize: converged={} epochs={} params={:?}",
            outcome.converged, outcome.epochs, self.params
        );
        for (i, shape) in self.shapes.iter_mut().enumerate() {
            if !shape.translatable {
                continue;
            }
            shape.translation = shape.translation
                + R2 {
                    x: self.params[2 * i],
                    y: self.params[2 * i + 1],
                };
            shape.apply_translation();
        }
        self.params.fill(0.);
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::RelationKind;
    use test_log::test;

    fn square_at(x0: f64, y0: f64) -> Shape {
        Shape::new(
            Polygon::new(vec![
                R2 { x: x0, y: y0 },
                R2 { x: x0 + 1., y: y0 },
                R2 {
                    x: x0 + 1.,
                    y: y0 + 1.,
                },
                R2 { x: x0, y: y0 + 1. },
            ])
            .unwrap(),
        )
    }

    fn center(shape: &Shape) -> R2<f64> {
        let pts = shape.polygon().vertices();
        let mut c = R2 { x: 0., y: 0. };
        for p in pts {
            c = c + *p;
        }
        c / pts.len() as f64
    }

    #[test]
    fn test_param_vector_tracks_shape_count() {
        let mut layout = Layout::new();
        assert_eq!(layout.params().len(), 0);
        let a = layout.add_shape(square_at(0., 0.));
        let b = layout.add_shape(square_at(2., 0.));
        layout.add_shape(square_at(4., 0.));
        assert_eq!(layout.params().len(), 6);
        assert_eq!(Layout::param_index(b), 2);

        layout.remove_shape(a);
        assert_eq!(layout.params().len(), 4);
        layout.remove_shape(10);
        assert_eq!(layout.params().len(), 4);
    }

    #[test]
    fn test_remove_shape_remaps_relations() {
        let mut layout = Layout::new();
        layout.add_shape(square_at(0., 0.));
        layout.add_shape(square_at(2., 0.));
        layout.add_shape(square_at(4., 0.));
        let mut rel = Relations::default();
        rel.add(RelationKind::NotOverlap, 0, 1);
        rel.add(RelationKind::Overlap, 1, 2);
        rel.fixed = vec![2];
        layout.set_relations(rel).unwrap();

        layout.remove_shape(0);
        assert_eq!(layout.relations().not_overlap, vec![]);
        assert_eq!(layout.relations().overlap, vec![(0, 1)]);
        assert_eq!(layout.relations().fixed, vec![1]);
        // still valid against the shrunken shape list
        assert!(layout.relations().validate(layout.shape_count()).is_ok());
    }

    #[test]
    fn test_set_relations_applies_fixed_set() {
        let mut layout = Layout::new();
        layout.add_shape(square_at(0., 0.));
        layout.add_shape(square_at(2., 0.));
        let rel = Relations {
            fixed: vec![1],
            ..Relations::default()
        };
        layout.set_relations(rel).unwrap();
        assert!(layout.shapes()[0].translatable);
        assert!(!layout.shapes()[1].translatable);

        // replacing wholesale re-derives the flags
        layout.set_relations(Relations::default()).unwrap();
        assert!(layout.shapes()[1].translatable);
    }

    #[test]
    fn test_set_relations_rejects_bad_index() {
        let mut layout = Layout::new();
        layout.add_shape(square_at(0., 0.));
        let mut rel = Relations::default();
        rel.add(RelationKind::Tangent, 0, 3);
        assert!(layout.set_relations(rel).is_err());
    }

    #[test]
    fn test_two_squares_separate() {
        // Free square at the origin, fixed square half-overlapping it.
        // After optimization the centers sit at least one unit apart along
        // the separating axis.
        let mut layout = Layout::new();
        layout.add_shape(square_at(0., 0.));
        layout.add_shape(square_at(0.5, 0.));
        let mut rel = Relations::default();
        rel.add(RelationKind::NotOverlap, 0, 1);
        rel.fixed = vec![1];
        layout.set_relations(rel).unwrap();

        let before = center(&layout.shapes()[1]);
        let outcome = layout.optimize(&OptimizeConfig::default()).unwrap();
        assert!(outcome.converged, "expected convergence, got {:?}", outcome);

        let free = center(&layout.shapes()[0]);
        let fixed = center(&layout.shapes()[1]);
        assert_eq!(fixed, before);
        assert!(
            (free.x - fixed.x).abs() >= 1. - 1e-3,
            "separation {} too small",
            (free.x - fixed.x).abs()
        );
        assert_relative_eq!(free.y, fixed.y, epsilon = 1e-6);
        // penalty is satisfied: no overlap remains
        assert!(layout.shapes()[0].polygon().sdf(fixed) > 0.);
    }

    #[test]
    fn test_optimize_is_idempotent_at_convergence() {
        let mut layout = Layout::new();
        layout.add_shape(square_at(0., 0.));
        layout.add_shape(square_at(0.5, 0.));
        let mut rel = Relations::default();
        rel.add(RelationKind::NotOverlap, 0, 1);
        rel.fixed = vec![1];
        layout.set_relations(rel).unwrap();

        let cfg = OptimizeConfig::default();
        let first = layout.optimize(&cfg).unwrap();
        assert!(first.converged);
        let after_first = center(&layout.shapes()[0]);

        // A second run starts from the committed, already-satisfied state
        let second = layout.optimize(&cfg).unwrap();
        assert!(second.converged);
        assert_eq!(second.epochs, 0);
        let after_second = center(&layout.shapes()[0]);
        assert!((after_second.x - after_first.x).abs() < cfg.convergence_threshold);
        assert!((after_second.y - after_first.y).abs() < cfg.convergence_threshold);
        assert_eq!(layout.params().len(), 2 * layout.shape_count());
    }

    #[test]
    fn test_commit_clears_translation() {
        let mut layout = Layout::new();
        layout.add_shape(square_at(0., 0.));
        layout.add_shape(square_at(0.5, 0.));
        let mut rel = Relations::default();
        rel.add(RelationKind::NotOverlap, 0, 1);
        rel.fixed = vec![1];
        layout.set_relations(rel).unwrap();
        layout.optimize(&OptimizeConfig::default()).unwrap();

        for shape in layout.shapes() {
            assert_eq!(shape.translation, R2 { x: 0., y: 0. });
        }
        assert!(layout.params().iter().all(|&p| p == 0.));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let mut layout = Layout::new();
        let mut s = square_at(0., 0.);
        s.fill = Some("#aa33ff".to_string());
        layout.add_shape(s);
        layout.add_shape(square_at(3., 0.));
        let mut rel = Relations::default();
        rel.add(RelationKind::Contain, 0, 1);
        rel.fixed = vec![0];
        layout.set_relations(rel).unwrap();

        let json = serde_json::to_string(&layout).unwrap();
        assert!(json.contains("notOverlap"));
        assert!(json.contains("#aa33ff"));
        let back: Layout = serde_json::from_str(&json).unwrap();
        assert_eq!(back, layout);
    }
}
