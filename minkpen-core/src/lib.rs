#[cfg_attr(not(test), allow(unused_imports))]
#[macro_use]
extern crate approx;

pub mod error;
pub mod geometry;
pub mod graph;
pub mod model;
pub mod optimizer;
pub mod relation;
pub mod sdf;

pub use error::{LayoutError, Result};
pub use geometry::minkowski::{minkowski_diff, minkowski_sum};
pub use geometry::polygon::Polygon;
pub use geometry::r2::R2;
pub use graph::{Graph, NodeId};
pub use model::{Layout, Shape};
pub use optimizer::{optimize, OptimizeConfig, Outcome};
pub use relation::{compile, CompiledLoss, RelationKind, Relations};
pub use sdf::emit_sdf;

/// Parse a log level string into LevelFilter.
pub fn parse_log_level(level: Option<&str>) -> log::LevelFilter {
    match level {
        Some("error") => log::LevelFilter::Error,
        Some("warn") => log::LevelFilter::Warn,
        Some("info") | Some("") | None => log::LevelFilter::Info,
        Some("debug") => log::LevelFilter::Debug,
        Some("trace") => log::LevelFilter::Trace,
        Some(level) => panic!("invalid log level: {}", level),
    }
}
