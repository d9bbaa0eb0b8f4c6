//! # Multi-revolution Lambert solvers
//!
//! Three formulations of Lambert's problem behind one interface:
//!
//! - [`UniversalVariableSolver`]: Newton on the universal variable psi
//!   with Stumpff functions, bisection when a step leaves its bracket.
//! - [`BattinSolver`]: Halley on the Lancaster-Blanchard x, with Battin's
//!   hypergeometric continued fraction near the parabola and the closed
//!   Lancaster time form elsewhere. The only one that handles exact
//!   180 degree transfers, given a plane.
//! - [`KVariableSolver`]: Halley on the vercosine k with the
//!   transformed W(k) function, falling back to Newton.
//!
//! Every solve goes through the same pipeline: the minimum time of flight
//! of the requested revolution count is located first and decides
//! feasibility, the brackets and the starting point; the converged arc is
//! then cross-checked with Lagrange f and g coefficients and its perigee is
//! screened against the body radius.
//!
//! [`kepler::propagate`] is part of that path, not only a test aid: it
//! moves the departure point when a request carries a coast, and the
//! default Stumpff cross-check solves Kepler's equation through the same
//! universal-anomaly iteration.
//!
//! ## References
//!
//! 1. Vallado, D. A., *Fundamentals of Astrodynamics and Applications*,
//!    4th ed., Microcosm Press, 2013, chapter 7.
//! 2. Battin, R. H., *An Introduction to the Mathematics and Methods of
//!    Astrodynamics*, revised ed., AIAA, 1999, chapter 7.
//! 3. Izzo, D., "Revisiting Lambert's problem," Celestial Mechanics and
//!    Dynamical Astronomy, Vol. 121, 2015, pp. 1-15.
//! 4. Russell, R. P., "On the Solution to Every Lambert Problem,"
//!    Celestial Mechanics and Dynamical Astronomy, Vol. 131, Article 50, 2019.
//!
//! ## Example
//!
//! ```rust
//! use lambert_multirev::{
//!     solve_lambert, Body, Direction, Energy, Method, SolverConfig, Status, TransferRequest,
//! };
//!
//! let r1 = [15945.34, 0.0, 0.0];                // km
//! let r2 = [12214.83899, 10249.46731, 0.0];    // km
//! let body = Body::EARTH;
//! let config = SolverConfig::default();
//!
//! // Zero-revolution short-way transfer in 76 minutes
//! let request = TransferRequest::new(Direction::Short, 4560.0);
//! let sol = solve_lambert(&r1, &r2, &request, Method::UniversalVariable, &config, &body);
//! assert_eq!(sol.status, Status::Converged);
//! println!("v1 = {:?} km/s, {}", sol.v1, sol.summary());
//!
//! // One full revolution first, on the high-energy branch
//! let request = TransferRequest::new(Direction::Short, 30_000.0).with_revolutions(1, Energy::High);
//! let sol = solve_lambert(&r1, &r2, &request, Method::Battin, &config, &body);
//! assert!(sol.converged);
//! ```

mod battin;
mod config;
mod error;
mod fg;
mod geometry;
mod impact;
pub mod kepler;
mod kvariable;
mod min_time;
mod solution;
mod solver;
mod stumpff;
mod universal;
mod vector;
mod velocity;

pub use battin::BattinSolver;
pub use config::{Body, ConfigError, SolverConfig};
pub use error::LambertError;
pub use fg::{cross_check, lagrange_coefficients, ConsistencyCheck, FgMethod, LagrangeCoefficients};
pub use geometry::{AngleRegime, Direction, Energy, TransferGeometry};
pub use impact::{check_impact, ImpactReport};
pub use kvariable::KVariableSolver;
pub use min_time::{curve_side, k_from_psi, minimum_time, psi_from_k, CurveMinimum, CurveSide, MinimumTimeRecord};
pub use solution::{Diagnostics, Guard, Status, TransferRequest, TransferSolution};
pub use solver::{max_revolutions, solve_all_branches, solve_lambert, LambertSolver, Method};
pub use universal::UniversalVariableSolver;
