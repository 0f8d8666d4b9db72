//! # TALLYSIM-RS
//!
//! Estimator construction and phase-space binning for Monte Carlo radiation
//! transport.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────────┐
//! │                          TALLYSIM-RS                                        │
//! ├─────────────────────────────────────────────────────────────────────────────┤
//! │  INPUT:     geometry property tags  +  run configuration (JSON / TOML)      │
//! │  RESOLVE:   tag decoding, merge, entity measure cache                       │
//! │  BUILD:     estimator factory (6 variants × 2 weighting policies)           │
//! │  BIN:       continuous / ordered-discrete / unordered phase-space bins      │
//! │  SCORE:     event handler, worker-local tally sheets, rayon batches         │
//! │  REPORT:    mean, relative error, variance of variance, figure of merit     │
//! └─────────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tallysim_rs::*;
//!
//! let geometry = InMemoryGeometry::concentric_spheres(&[1.0, 2.0])
//!     .with_property(EntityKind::Cell, 1, "estimator", "0.cell.tl.flux.n");
//! let config = RunConfig::default();
//! let factory = EstimatorFactory::from_config(Arc::new(geometry), &config)?;
//! let mut handler = EventHandler::new();
//! factory.build_all(&config, &mut handler)?;
//! # Ok::<(), TallyError>(())
//! ```

pub mod types;
pub mod error;
pub mod logging;
pub mod config;
pub mod geometry;
pub mod particle;
pub mod discretization;
pub mod estimator;
pub mod resolve;
pub mod factory;
pub mod handler;
pub mod transport;

// Re-exports
pub use types::*;
pub use error::{Result, TallyError};
pub use config::{BinRecord, EstimatorRecord, PropertyNames, ResponseFunctionRecord, RunConfig};
pub use geometry::{GeometryQuery, InMemoryGeometry};
pub use particle::{ObservedEvent, ParticleState};
pub use discretization::{PhaseSpaceBinning, PhaseSpaceDimension, PhaseSpacePoint};
pub use estimator::{Estimator, EstimatorDefinition, EstimatorKind, EstimatorReport, WeightingPolicy};
pub use factory::EstimatorFactory;
pub use handler::{BatchSummary, EventHandler, HistorySource};
pub use transport::{ShellMaterial, SphericalRandomWalk};

/// TALLYSIM version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Information about the library
pub fn info() -> String {
    format!(
        "TALLYSIM-RS v{}\n\
         Estimator construction and phase-space binning engine\n\
         Estimators: {}",
        VERSION,
        EstimatorKind::ALL
            .iter()
            .map(|k| k.canonical_name())
            .collect::<Vec<_>>()
            .join(", ")
    )
}
