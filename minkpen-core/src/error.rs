pub type Result<T> = std::result::Result<T, LayoutError>;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum LayoutError {
    #[error("Unknown relation type: {0:?}")]
    InvalidRelationType(String),

    #[error("Relation {kind} ({i}, {j}) references shape {idx}, but only {len} shapes exist")]
    MalformedRelationIndex {
        kind: &'static str,
        i: usize,
        j: usize,
        idx: usize,
        len: usize,
    },

    #[error("Relation {kind} relates shape {i} to itself")]
    SelfRelation { kind: &'static str, i: usize },

    #[error("Degenerate polygon: {0}")]
    DegeneratePolygon(String),

    #[error("Minkowski computation failed: {0}")]
    Computation(String),
}
