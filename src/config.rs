//! Solver tolerances and primary-body constants.
//!
//! Both types are plain values with sensible defaults. They can be built in
//! code or loaded from TOML, with any missing key falling back to its default:
//!
//! ```toml
//! max_iterations = 80
//! tof_tolerance = 1e-12
//! fg_method = "series"
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fg::FgMethod;

/// Iteration caps and tolerances shared by every solver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Maximum root-finder iterations per solve (per update rule for the
    /// k-variable solver, which may retry with Newton).
    pub max_iterations: usize,
    /// Convergence tolerance on the time equation, in non-dimensional time.
    pub tof_tolerance: f64,
    /// Largest time residual accepted when the root bracket has collapsed
    /// to rounding width before reaching `tof_tolerance`. Anything larger
    /// fails with `NotConverged`.
    pub precision_limit: f64,
    /// Relative tolerance when locating the minimum of the time curve.
    pub min_time_tolerance: f64,
    /// Allowed |f*g_dot - f_dot*g - 1| before the result is flagged.
    pub fg_tolerance: f64,
    /// Allowed relative position error |f*r1 + g*v1 - r2| / |r2|.
    pub position_tolerance: f64,
    /// Which Lagrange-coefficient derivation the post-solve check uses.
    pub fg_method: FgMethod,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            tof_tolerance: 1e-11,
            precision_limit: 1e-8,
            min_time_tolerance: 1e-12,
            fg_tolerance: 1e-5,
            position_tolerance: 1e-6,
            fg_method: FgMethod::Stumpff,
        }
    }
}

impl SolverConfig {
    /// Parse from TOML text and validate.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: SolverConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject caps and tolerances that would stall or never terminate.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_iterations == 0 {
            return Err(ConfigError::Invalid("max_iterations must be positive".into()));
        }
        let tolerances = [
            ("tof_tolerance", self.tof_tolerance),
            ("precision_limit", self.precision_limit),
            ("min_time_tolerance", self.min_time_tolerance),
            ("fg_tolerance", self.fg_tolerance),
            ("position_tolerance", self.position_tolerance),
        ];
        for (name, value) in tolerances {
            if !(value > 0.0 && value.is_finite()) {
                return Err(ConfigError::Invalid(format!("{name} must be positive, got {value}")));
            }
        }
        if self.precision_limit < self.tof_tolerance {
            return Err(ConfigError::Invalid("precision_limit must not be below tof_tolerance".into()));
        }
        Ok(())
    }
}

/// Gravitational parameter and radius of the central body.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Gravitational parameter (km^3/s^2)
    pub mu: f64,
    /// Equatorial radius (km)
    pub radius: f64,
}

impl Body {
    /// WGS-84 Earth.
    pub const EARTH: Body = Body { mu: 398_600.441_8, radius: 6_378.137 };

    pub fn new(mu: f64, radius: f64) -> Self {
        Self { mu, radius }
    }

    /// Parse from TOML text, e.g. `mu = 42828.37` / `radius = 3396.19`.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let body: Body = toml::from_str(text)?;
        if !(body.mu > 0.0 && body.mu.is_finite()) {
            return Err(ConfigError::Invalid(format!("mu must be positive, got {}", body.mu)));
        }
        if !(body.radius >= 0.0 && body.radius.is_finite()) {
            return Err(ConfigError::Invalid(format!("radius must be non-negative, got {}", body.radius)));
        }
        Ok(body)
    }
}

impl Default for Body {
    fn default() -> Self {
        Body::EARTH
    }
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
