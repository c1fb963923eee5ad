//! Arena-allocated scalar expression graph with a single-pass reverse-mode
//! differentiation routine.
//!
//! Nodes only reference earlier nodes, so insertion order is a topological
//! order: one forward sweep evaluates every node, one reverse sweep
//! accumulates adjoints. Comparison nodes evaluate to 1.0/0.0 and carry no
//! gradient; `Select`, `Min` and `Max` route the adjoint through whichever
//! branch is live for the current inputs (first argument wins exact ties), so
//! the graph stays static while still giving subgradient semantics at
//! decision boundaries.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Clone, Copy, Debug)]
enum Node {
    Const(f64),
    Input(usize),
    Add(NodeId, NodeId),
    Sub(NodeId, NodeId),
    Mul(NodeId, NodeId),
    Div(NodeId, NodeId),
    Neg(NodeId),
    Sqrt(NodeId),
    Min(NodeId, NodeId),
    Max(NodeId, NodeId),
    Ge(NodeId, NodeId),
    Lt(NodeId, NodeId),
    And(NodeId, NodeId),
    Not(NodeId),
    Select(NodeId, NodeId, NodeId),
}

#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
    n_inputs: usize,
}

impl Graph {
    pub fn new(n_inputs: usize) -> Graph {
        Graph {
            nodes: Vec::new(),
            n_inputs,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        NodeId(self.nodes.len() - 1)
    }

    pub fn constant(&mut self, v: f64) -> NodeId {
        self.push(Node::Const(v))
    }

    /// A parameter slot of the external parameter vector.
    pub fn input(&mut self, slot: usize) -> NodeId {
        assert!(slot < self.n_inputs, "input slot {} out of range", slot);
        self.push(Node::Input(slot))
    }

    pub fn add(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Node::Add(a, b))
    }

    pub fn sub(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Node::Sub(a, b))
    }

    pub fn mul(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Node::Mul(a, b))
    }

    pub fn div(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Node::Div(a, b))
    }

    pub fn neg(&mut self, a: NodeId) -> NodeId {
        self.push(Node::Neg(a))
    }

    pub fn sqrt(&mut self, a: NodeId) -> NodeId {
        self.push(Node::Sqrt(a))
    }

    pub fn min(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Node::Min(a, b))
    }

    pub fn max(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Node::Max(a, b))
    }

    pub fn sqr(&mut self, a: NodeId) -> NodeId {
        self.push(Node::Mul(a, a))
    }

    /// `a >= b`, as 1.0/0.0
    pub fn ge(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Node::Ge(a, b))
    }

    /// `a < b`, as 1.0/0.0
    pub fn lt(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Node::Lt(a, b))
    }

    pub fn and(&mut self, a: NodeId, b: NodeId) -> NodeId {
        self.push(Node::And(a, b))
    }

    pub fn not(&mut self, a: NodeId) -> NodeId {
        self.push(Node::Not(a))
    }

    /// `if cond { t } else { f }`; both branches stay in the graph, the
    /// adjoint follows the live one.
    pub fn select(&mut self, cond: NodeId, t: NodeId, f: NodeId) -> NodeId {
        self.push(Node::Select(cond, t, f))
    }

    /// Evaluate every node for the given parameter vector.
    pub fn forward(&self, params: &[f64]) -> Vec<f64> {
        debug_assert_eq!(params.len(), self.n_inputs);
        let mut vals: Vec<f64> = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let v = match *node {
                Node::Const(c) => c,
                Node::Input(slot) => params[slot],
                Node::Add(a, b) => vals[a.0] + vals[b.0],
                Node::Sub(a, b) => vals[a.0] - vals[b.0],
                Node::Mul(a, b) => vals[a.0] * vals[b.0],
                Node::Div(a, b) => vals[a.0] / vals[b.0],
                Node::Neg(a) => -vals[a.0],
                Node::Sqrt(a) => vals[a.0].sqrt(),
                Node::Min(a, b) => {
                    if vals[a.0] <= vals[b.0] {
                        vals[a.0]
                    } else {
                        vals[b.0]
                    }
                }
                Node::Max(a, b) => {
                    if vals[a.0] >= vals[b.0] {
                        vals[a.0]
                    } else {
                        vals[b.0]
                    }
                }
                Node::Ge(a, b) => (vals[a.0] >= vals[b.0]) as u8 as f64,
                Node::Lt(a, b) => (vals[a.0] < vals[b.0]) as u8 as f64,
                Node::And(a, b) => ((vals[a.0] != 0.) && (vals[b.0] != 0.)) as u8 as f64,
                Node::Not(a) => (vals[a.0] == 0.) as u8 as f64,
                Node::Select(c, t, f) => {
                    if vals[c.0] != 0. {
                        vals[t.0]
                    } else {
                        vals[f.0]
                    }
                }
            };
            vals.push(v);
        }
        vals
    }

    /// One reverse sweep from the given seeds (output node, seed weight).
    /// Seeding several outputs at once differentiates any fixed linear
    /// combination of them — e.g. `objective + c·penalty` — without touching
    /// the graph. Returns the gradient over parameter slots.
    pub fn backward(&self, seeds: &[(NodeId, f64)], vals: &[f64]) -> Vec<f64> {
        debug_assert_eq!(vals.len(), self.nodes.len());
        let mut adj = vec![0.; self.nodes.len()];
        for &(id, w) in seeds {
            adj[id.0] += w;
        }
        let mut grad = vec![0.; self.n_inputs];
        for (idx, node) in self.nodes.iter().enumerate().rev() {
            let w = adj[idx];
            if w == 0. {
                continue;
            }
            match *node {
                Node::Const(_) => {}
                Node::Input(slot) => grad[slot] += w,
                Node::Add(a, b) => {
                    adj[a.0] += w;
                    adj[b.0] += w;
                }
                Node::Sub(a, b) => {
                    adj[a.0] += w;
                    adj[b.0] -= w;
                }
                Node::Mul(a, b) => {
                    adj[a.0] += w * vals[b.0];
                    adj[b.0] += w * vals[a.0];
                }
                Node::Div(a, b) => {
                    adj[a.0] += w / vals[b.0];
                    adj[b.0] -= w * vals[a.0] / (vals[b.0] * vals[b.0]);
                }
                Node::Neg(a) => adj[a.0] -= w,
                Node::Sqrt(a) => adj[a.0] += w / (2. * vals[idx]),
                Node::Min(a, b) => {
                    if vals[a.0] <= vals[b.0] {
                        adj[a.0] += w;
                    } else {
                        adj[b.0] += w;
                    }
                }
                Node::Max(a, b) => {
                    if vals[a.0] >= vals[b.0] {
                        adj[a.0] += w;
                    } else {
                        adj[b.0] += w;
                    }
                }
                Node::Ge(..) | Node::Lt(..) | Node::And(..) | Node::Not(..) => {}
                Node::Select(c, t, f) => {
                    if vals[c.0] != 0. {
                        adj[t.0] += w;
                    } else {
                        adj[f.0] += w;
                    }
                }
            }
        }
        grad
    }
}
