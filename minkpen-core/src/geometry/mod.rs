pub mod minkowski;
pub mod polygon;
pub mod r2;
