//! Failure reasons reported by the solvers.

use thiserror::Error;

/// Terminal failure of a Lambert solve.
///
/// These never escape a solver as `Err`; they ride inside
/// [`Status::Failed`](crate::Status::Failed) so that sweeps over many
/// geometries can keep going. Use
/// [`TransferSolution::into_result`](crate::TransferSolution::into_result)
/// to turn them back into a `Result`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LambertError {
    /// Zero-length position, coincident endpoints with nothing to return,
    /// or an undefined transfer plane.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
    /// Transfer angle at which the chosen formulation is singular.
    #[error("degenerate geometry: {0}")]
    DegenerateGeometry(String),
    /// Requested time of flight is below the minimum for the branch.
    #[error("time of flight {tof:.6} s is below the {nrev}-revolution minimum of {tof_min:.6} s")]
    InfeasibleTimeOfFlight { tof: f64, tof_min: f64, nrev: u32 },
    /// Iteration cap exceeded without meeting the residual tolerance.
    #[error("no convergence after {iterations} iterations (residual {residual:.3e})")]
    NotConverged { iterations: usize, residual: f64 },
}
