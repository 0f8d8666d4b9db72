//! # Estimator Resolution
//!
//! Turns the two independent estimator sources, geometry property tags and
//! run-configuration records, into one map of fully specified estimator
//! definitions.
//!
//! ## Tag format
//!
//! ```text
//! <id>.<type-name>.<particle-code>        e.g. 12.cell.tl.flux.n
//! ```
//!
//! Type names may themselves contain dots, so a tag is split at its first and
//! last dot. The particle code is one of `n`, `p`, `e`.
//!
//! ## Flow
//!
//! ```text
//! geometry tags ──► PropertyResolver ──► GeometryEstimators ──┐
//!                                                             ├──► merge ──► definitions
//! configuration records ──────────────────────────────────────┘
//! ```

pub mod measure;
pub mod merge;

pub use measure::EntityMeasureCache;
pub use merge::merge;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::config::PropertyNames;
use crate::error::{Result, TallyError};
use crate::estimator::EstimatorKind;
use crate::geometry::GeometryQuery;
use crate::types::{EntityId, EntityKind, EstimatorId, ParticleType};

// ============================================================================
// PROPERTY TAGS
// ============================================================================

/// Decoded `id.type.particle` property value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PropertyTag {
    pub id: EstimatorId,
    pub type_name: String,
    pub particle_code: String,
}

impl PropertyTag {
    pub fn new(id: EstimatorId, type_name: &str, particle_code: &str) -> Self {
        Self {
            id,
            type_name: type_name.to_string(),
            particle_code: particle_code.to_string(),
        }
    }
}

impl FromStr for PropertyTag {
    type Err = TallyError;

    fn from_str(tag: &str) -> Result<Self> {
        let malformed = |reason| TallyError::MalformedPropertyTag {
            tag: tag.to_string(),
            reason,
        };

        let (Some(first), Some(last)) = (tag.find('.'), tag.rfind('.')) else {
            return Err(malformed("missing separators"));
        };
        if first == last {
            return Err(malformed("missing separators"));
        }

        let id = &tag[..first];
        let type_name = &tag[first + 1..last];
        let particle_code = &tag[last + 1..];
        if id.is_empty() || type_name.is_empty() || particle_code.is_empty() {
            return Err(malformed("empty field"));
        }
        if !id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("id is not an unsigned integer"));
        }
        let id: u32 = id
            .parse()
            .map_err(|_| malformed("id is not an unsigned integer"))?;

        Ok(Self::new(EstimatorId::new(id), type_name, particle_code))
    }
}

impl fmt::Display for PropertyTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.id, self.type_name, self.particle_code)
    }
}

// ============================================================================
// RESOLVER
// ============================================================================

/// Estimator declared by geometry tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedEstimator {
    pub kind: EstimatorKind,
    pub particle_type: ParticleType,
    pub entities: BTreeSet<EntityId>,
}

/// Geometry-declared estimators, partitioned by entity class
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeometryEstimators {
    pub cells: BTreeMap<EstimatorId, TaggedEstimator>,
    pub surfaces: BTreeMap<EstimatorId, TaggedEstimator>,
}

impl GeometryEstimators {
    pub fn get(&self, id: EstimatorId) -> Option<&TaggedEstimator> {
        self.cells.get(&id).or_else(|| self.surfaces.get(&id))
    }

    pub fn len(&self) -> usize {
        self.cells.len() + self.surfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EstimatorId, &TaggedEstimator)> {
        self.cells.iter().chain(self.surfaces.iter())
    }
}

/// Reads estimator tags out of the geometry
pub struct PropertyResolver<'a> {
    geometry: &'a dyn GeometryQuery,
    names: &'a PropertyNames,
}

impl<'a> PropertyResolver<'a> {
    pub fn new(geometry: &'a dyn GeometryQuery, names: &'a PropertyNames) -> Self {
        Self { geometry, names }
    }

    /// Tagged estimators of one entity class, grouped by id
    pub fn resolve(&self, kind: EntityKind) -> Result<BTreeMap<EstimatorId, TaggedEstimator>> {
        let mut resolved: BTreeMap<EstimatorId, TaggedEstimator> = BTreeMap::new();

        let tagged = self
            .geometry
            .entities_with_property_value(kind, &self.names.estimator);
        for (entity, values) in tagged {
            for value in values {
                let tag: PropertyTag = value.parse()?;
                let (estimator_kind, particle_type) = self.decode(&tag, kind)?;

                match resolved.get_mut(&tag.id) {
                    Some(existing)
                        if existing.kind == estimator_kind
                            && existing.particle_type == particle_type =>
                    {
                        existing.entities.insert(entity);
                    }
                    Some(_) => {
                        return Err(TallyError::DuplicateEstimatorId {
                            id: tag.id,
                            first: kind.name(),
                            second: kind.name(),
                        });
                    }
                    None => {
                        resolved.insert(
                            tag.id,
                            TaggedEstimator {
                                kind: estimator_kind,
                                particle_type,
                                entities: BTreeSet::from([entity]),
                            },
                        );
                    }
                }
            }
        }

        if let Some((&id, _)) = resolved.iter().find(|(_, e)| e.entities.is_empty()) {
            return Err(TallyError::EmptyEntityBinding { id, kind });
        }

        debug!(%kind, estimators = resolved.len(), "resolved tagged estimators");
        Ok(resolved)
    }

    /// Cell and surface estimators; an id may live in only one partition
    pub fn resolve_all(&self) -> Result<GeometryEstimators> {
        let cells = self.resolve(EntityKind::Cell)?;
        let surfaces = self.resolve(EntityKind::Surface)?;

        if let Some(&id) = cells.keys().find(|id| surfaces.contains_key(id)) {
            return Err(TallyError::DuplicateEstimatorId {
                id,
                first: EntityKind::Cell.name(),
                second: EntityKind::Surface.name(),
            });
        }
        Ok(GeometryEstimators { cells, surfaces })
    }

    fn decode(&self, tag: &PropertyTag, kind: EntityKind) -> Result<(EstimatorKind, ParticleType)> {
        if tag.id.is_reserved() {
            return Err(TallyError::ReservedEstimatorId { id: tag.id });
        }

        let estimator_kind = self
            .names
            .kind_for_tag(&tag.type_name)
            .filter(|k| k.entity_kind() == kind)
            .ok_or_else(|| TallyError::InvalidEstimatorType {
                id: tag.id,
                type_name: tag.type_name.clone(),
                context: kind.name(),
            })?;

        let particle_type = ParticleType::from_code(&tag.particle_code).ok_or_else(|| {
            TallyError::InvalidParticleType {
                id: tag.id,
                name: tag.particle_code.clone(),
            }
        })?;

        if estimator_kind.is_pulse_height() && particle_type == ParticleType::Neutron {
            return Err(TallyError::IncompatibleParticleType { id: tag.id });
        }
        Ok((estimator_kind, particle_type))
    }
}
