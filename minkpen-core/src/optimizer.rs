//! Quadratic-penalty gradient descent: fixed step size, geometrically
//! growing penalty coefficient, early stop on the gradient infinity-norm.
//! No dual variables, line search or momentum.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::relation::CompiledLoss;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptimizeConfig {
    /// Gradient-descent step size.
    pub eta: f64,
    /// Initial penalty coefficient.
    pub c0: f64,
    /// Per-epoch penalty growth factor.
    pub eta_c: f64,
    pub max_epochs: usize,
    /// Stop once max|grad| falls below this.
    pub convergence_threshold: f64,
}

impl Default for OptimizeConfig {
    fn default() -> Self {
        OptimizeConfig {
            eta: 0.1,
            c0: 1e-3,
            eta_c: 10.,
            max_epochs: 50,
            convergence_threshold: 1e-5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub converged: bool,
    /// Epoch at which convergence was reported, or the epoch cap.
    pub epochs: usize,
}

/// Minimize `objective + c·penalty` over `params`, in place. The loss graph
/// is compiled once by the caller; each epoch only re-evaluates it with the
/// grown coefficient. Exhausting the epoch budget is a best-effort outcome,
/// not an error: the last parameters are kept and `converged` is false.
pub fn optimize(loss: &CompiledLoss, params: &mut [f64], cfg: &OptimizeConfig) -> Outcome {
    debug_assert_eq!(params.len(), loss.n_params());
    let mut c = cfg.c0;
    for epoch in 0..cfg.max_epochs {
        let (f, grad) = loss.eval(params, c);
        let mut max_grad = 0f64;
        for (p, g) in params.iter_mut().zip(&grad) {
            *p -= cfg.eta * g;
            max_grad = max_grad.max(g.abs());
        }
        debug!(
            "epoch {}: loss {:.6e}, max|grad| {:.3e}, c {:.3e}",
            epoch, f, max_grad, c
        );
        if max_grad < cfg.convergence_threshold {
            info!("converged in {} epochs", epoch);
            return Outcome {
                converged: true,
                epochs: epoch,
            };
        }
        c *= cfg.eta_c;
    }
    warn!(
        "no convergence within {} epochs; returning best-effort parameters",
        cfg.max_epochs
    );
    Outcome {
        converged: false,
        epochs: cfg.max_epochs,
    }
}
