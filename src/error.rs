//! # Error Taxonomy
//!
//! Every failure raised while resolving, merging or building estimators.
//!
//! All "invalid representation" errors are fatal to the run: an estimator that
//! was declared wrongly would silently tally the wrong physics, so nothing here
//! is retried or downgraded to a warning.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::{EntityKind, EstimatorId};

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, TallyError>;

/// Errors raised by the estimator construction engine
#[derive(Debug, Error)]
pub enum TallyError {
    // ------------------------------------------------------------------
    // Invalid estimator representation
    // ------------------------------------------------------------------
    #[error("estimator property `{tag}` is malformed (expected id.type.ptype): {reason}")]
    MalformedPropertyTag { tag: String, reason: &'static str },

    #[error("estimator id {id} is used more than once ({first} and {second})")]
    DuplicateEstimatorId {
        id: EstimatorId,
        first: &'static str,
        second: &'static str,
    },

    #[error("estimator id {id} is reserved")]
    ReservedEstimatorId { id: EstimatorId },

    #[error("estimator {id} has an invalid type `{type_name}` for a {context} estimator")]
    InvalidEstimatorType {
        id: EstimatorId,
        type_name: String,
        context: &'static str,
    },

    #[error("estimator {id} specified particle type `{name}`, which is not valid")]
    InvalidParticleType { id: EstimatorId, name: String },

    #[error("estimator {id} is a pulse height estimator and cannot observe neutrons")]
    IncompatibleParticleType { id: EstimatorId },

    #[error("estimator {id} has no {kind}s assigned to it")]
    EmptyEntityBinding { id: EstimatorId, kind: EntityKind },

    #[error("estimator {id} has an ambiguous type: geometry requested `{geometry}` while the configuration requested `{config}`")]
    AmbiguousEstimatorType {
        id: EstimatorId,
        geometry: String,
        config: String,
    },

    #[error("estimator {id} has inconsistent particle types: geometry requested `{geometry}` while the configuration requested `{config}`")]
    AmbiguousParticleType {
        id: EstimatorId,
        geometry: String,
        config: String,
    },

    #[error("estimator {id} does not have a type specified")]
    MissingEstimatorType { id: EstimatorId },

    #[error("estimator {id} does not have a particle type specified")]
    MissingParticleType { id: EstimatorId },

    #[error("estimator {id} specified {kind} {entity}, which does not exist")]
    UnknownEntity {
        id: EstimatorId,
        kind: EntityKind,
        entity: u32,
    },

    #[error("estimator {id} requested response function {response_id}, which does not exist")]
    UnknownResponseFunction { id: EstimatorId, response_id: u32 },

    #[error("the {dimension} requested for estimator {id} are not sorted from lowest to highest")]
    UnsortedBinBoundaries { id: EstimatorId, dimension: String },

    #[error("the {dimension} requested for estimator {id} need at least {required} entries (got {found})")]
    InsufficientBinBoundaries {
        id: EstimatorId,
        dimension: String,
        required: usize,
        found: usize,
    },

    #[error("estimator {id} is a {kind} estimator and cannot bin the {dimension} dimension")]
    UnsupportedDimension {
        id: EstimatorId,
        kind: String,
        dimension: String,
    },

    #[error("estimator {id} has a non-positive multiplier ({multiplier})")]
    NonPositiveMultiplier { id: EstimatorId, multiplier: f64 },

    #[error("estimator {id} has invalid mesh planes: {reason}")]
    InvalidMeshPlanes { id: EstimatorId, reason: String },

    #[error("response function {id} is invalid: {reason}")]
    InvalidResponseFunction { id: u32, reason: String },

    #[error("property name synonyms are invalid: {0}")]
    InvalidPropertyNames(String),

    #[error("history source is invalid: {0}")]
    InvalidSourceModel(String),

    // ------------------------------------------------------------------
    // Configuration input
    // ------------------------------------------------------------------
    #[error("failed to read {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse JSON configuration: {0}")]
    ConfigJson(#[from] serde_json::Error),

    #[error("failed to parse TOML configuration: {0}")]
    ConfigToml(#[from] toml::de::Error),

    #[error("unsupported configuration format for {path:?} (expected .json or .toml)")]
    UnsupportedConfigFormat { path: PathBuf },
}

impl TallyError {
    /// True for the "invalid representation" class (a bad estimator declaration)
    pub fn is_representation_error(&self) -> bool {
        !matches!(
            self,
            TallyError::ConfigIo { .. }
                | TallyError::ConfigJson(_)
                | TallyError::ConfigToml(_)
                | TallyError::UnsupportedConfigFormat { .. }
        )
    }

    /// Estimator id the error refers to, when there is one
    pub fn estimator_id(&self) -> Option<EstimatorId> {
        use TallyError::*;
        match self {
            DuplicateEstimatorId { id, .. }
            | ReservedEstimatorId { id }
            | InvalidEstimatorType { id, .. }
            | InvalidParticleType { id, .. }
            | IncompatibleParticleType { id }
            | EmptyEntityBinding { id, .. }
            | AmbiguousEstimatorType { id, .. }
            | AmbiguousParticleType { id, .. }
            | MissingEstimatorType { id }
            | MissingParticleType { id }
            | UnknownEntity { id, .. }
            | UnknownResponseFunction { id, .. }
            | UnsortedBinBoundaries { id, .. }
            | InsufficientBinBoundaries { id, .. }
            | UnsupportedDimension { id, .. }
            | NonPositiveMultiplier { id, .. }
            | InvalidMeshPlanes { id, .. } => Some(*id),
            _ => None,
        }
    }
}
