//! Merge of configuration records into the geometry-declared estimators.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, warn};

use super::{GeometryEstimators, TaggedEstimator};
use crate::config::{EstimatorRecord, PropertyNames};
use crate::error::{Result, TallyError};
use crate::estimator::{EstimatorDefinition, EstimatorKind, HexMesh};
use crate::geometry::GeometryQuery;
use crate::types::{EntityKind, EstimatorId, ParticleType};

/// Resolved definitions, one per estimator id
pub type Definitions = BTreeMap<EstimatorId, EstimatorDefinition>;

/// Combine geometry-declared estimators with configuration records
///
/// Geometry-only estimators keep their defaults. A record for an id the
/// geometry already declares must agree with it on type and particle type and
/// may add entities; a record for a new id must be complete.
pub fn merge(
    tagged: &GeometryEstimators,
    records: &[EstimatorRecord],
    names: &PropertyNames,
    geometry: &dyn GeometryQuery,
) -> Result<Definitions> {
    let mut definitions: Definitions = tagged
        .iter()
        .map(|(&id, t)| (id, from_tagged(id, t)))
        .collect();

    let mut seen = BTreeSet::new();
    for record in records {
        let id = record.id;
        if !seen.insert(id) {
            return Err(TallyError::DuplicateEstimatorId {
                id,
                first: "configuration",
                second: "configuration",
            });
        }
        if id.is_reserved() {
            return Err(TallyError::ReservedEstimatorId { id });
        }

        let requested_kind = record
            .type_name
            .as_deref()
            .map(|name| parse_kind(id, name, names))
            .transpose()?;
        let requested_particle = record
            .particle_type
            .as_deref()
            .map(|name| {
                ParticleType::from_name(name).ok_or_else(|| TallyError::InvalidParticleType {
                    id,
                    name: name.to_string(),
                })
            })
            .transpose()?;

        let definition = match tagged.get(id) {
            Some(existing) => {
                if let Some(kind) = requested_kind.filter(|&k| k != existing.kind) {
                    return Err(TallyError::AmbiguousEstimatorType {
                        id,
                        geometry: existing.kind.to_string(),
                        config: kind.to_string(),
                    });
                }
                if let Some(particle) = requested_particle.filter(|&p| p != existing.particle_type) {
                    return Err(TallyError::AmbiguousParticleType {
                        id,
                        geometry: existing.particle_type.to_string(),
                        config: particle.to_string(),
                    });
                }
                debug!(%id, "merging configuration into tagged estimator");
                let base = from_tagged(id, existing);
                let extra = checked_entities(record, existing.kind, geometry)?;
                apply_record(base.with_entities(extra), record)
            }
            None => {
                let kind = requested_kind.ok_or(TallyError::MissingEstimatorType { id })?;
                let particle = requested_particle.ok_or(TallyError::MissingParticleType { id })?;
                if kind.is_pulse_height() && particle == ParticleType::Neutron {
                    return Err(TallyError::IncompatibleParticleType { id });
                }
                debug!(%id, %kind, "configuration-only estimator");
                configured(id, kind, particle, record, geometry)?
            }
        };

        definitions.insert(id, definition);
    }

    for definition in definitions.values() {
        if definition.entities.is_empty() {
            return Err(TallyError::EmptyEntityBinding {
                id: definition.id,
                kind: definition.entity_kind(),
            });
        }
    }
    Ok(definitions)
}

fn from_tagged(id: EstimatorId, tagged: &TaggedEstimator) -> EstimatorDefinition {
    EstimatorDefinition::new(id, tagged.kind, tagged.particle_type)
        .with_entities(tagged.entities.iter().copied())
}

/// Canonical names first, then the geometry tag synonyms
fn parse_kind(id: EstimatorId, name: &str, names: &PropertyNames) -> Result<EstimatorKind> {
    EstimatorKind::from_canonical_name(name)
        .or_else(|| names.kind_for_tag(name))
        .ok_or_else(|| TallyError::InvalidEstimatorType {
            id,
            type_name: name.to_string(),
            context: "configured",
        })
}

fn configured(
    id: EstimatorId,
    kind: EstimatorKind,
    particle: ParticleType,
    record: &EstimatorRecord,
    geometry: &dyn GeometryQuery,
) -> Result<EstimatorDefinition> {
    let base = EstimatorDefinition::new(id, kind, particle);

    if kind == EstimatorKind::HexMeshTrackLengthFlux {
        let planes = record.mesh_planes().ok_or_else(|| TallyError::InvalidMeshPlanes {
            id,
            reason: "no mesh planes were given".to_string(),
        })?;
        let mesh = HexMesh::from_planes(id, &planes)?;
        return Ok(apply_record(
            base.with_entities(mesh.element_ids()).with_mesh(planes),
            record,
        ));
    }

    let entities = checked_entities(record, kind, geometry)?;
    if entities.is_empty() {
        return Err(TallyError::EmptyEntityBinding {
            id,
            kind: kind.entity_kind(),
        });
    }
    Ok(apply_record(base.with_entities(entities), record))
}

/// Entities of the estimator's class listed by a record, existence-checked
fn checked_entities(
    record: &EstimatorRecord,
    kind: EstimatorKind,
    geometry: &dyn GeometryQuery,
) -> Result<BTreeSet<u32>> {
    let entity_kind = kind.entity_kind();
    for foreign in [EntityKind::Cell, EntityKind::Surface] {
        if foreign != entity_kind && !record.entities(foreign).is_empty() {
            warn!(
                id = %record.id,
                %kind,
                "ignoring the {}s listed for a {} estimator",
                foreign,
                entity_kind
            );
        }
    }

    let mut entities = BTreeSet::new();
    for &entity in record.entities(entity_kind) {
        if !geometry.does_entity_exist(entity_kind, entity) {
            return Err(TallyError::UnknownEntity {
                id: record.id,
                kind: entity_kind,
                entity,
            });
        }
        entities.insert(entity);
    }
    Ok(entities)
}

fn apply_record(definition: EstimatorDefinition, record: &EstimatorRecord) -> EstimatorDefinition {
    definition
        .with_multiplier(record.multiplier)
        .with_energy_multiplication(record.energy_multiplication)
        .with_response_functions(record.response_functions.clone())
        .with_bins(record.bins.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BinRecord;
    use crate::geometry::InMemoryGeometry;
    use crate::resolve::PropertyResolver;

    fn geometry() -> InMemoryGeometry {
        InMemoryGeometry::concentric_spheres(&[1.0, 2.0, 3.0])
            .with_property(EntityKind::Cell, 1, "estimator", "0.cell.tl.flux.n")
            .with_property(EntityKind::Surface, 2, "estimator", "1.surface.flux.p")
    }

    fn run(records: &[EstimatorRecord]) -> Result<Definitions> {
        let g = geometry();
        let names = PropertyNames::default();
        let tagged = PropertyResolver::new(&g, &names).resolve_all()?;
        merge(&tagged, records, &names, &g)
    }

    #[test]
    fn test_geometry_only_defaults() {
        let defs = run(&[]).unwrap();
        assert_eq!(defs.len(), 2);
        let d = &defs[&EstimatorId::new(0)];
        assert_eq!(d.multiplier, 1.0);
        assert!(!d.energy_multiplication);
        assert!(d.response_functions.is_empty());
        assert!(d.bins.is_empty());
    }

    #[test]
    fn test_record_extends_tagged_estimator() {
        let record = EstimatorRecord::new(0)
            .with_type("Cell Track-Length Flux")
            .with_particle_type("Neutron")
            .with_cells(vec![2, 1])
            .with_multiplier(3.0);
        let defs = run(&[record]).unwrap();
        let d = &defs[&EstimatorId::new(0)];
        assert_eq!(d.entities, BTreeSet::from([1, 2]));
        assert_eq!(d.multiplier, 3.0);
    }

    #[test]
    fn test_type_disagreement_is_ambiguous() {
        let record = EstimatorRecord::new(0).with_type("Cell Collision Flux");
        let err = run(&[record]).unwrap_err();
        assert!(matches!(err, TallyError::AmbiguousEstimatorType { .. }));

        let record = EstimatorRecord::new(1).with_particle_type("Electron");
        let err = run(&[record]).unwrap_err();
        assert!(matches!(err, TallyError::AmbiguousParticleType { .. }));
    }

    #[test]
    fn test_tag_synonym_accepted_as_type() {
        let record = EstimatorRecord::new(0).with_type("cell.tl.flux");
        assert!(run(&[record]).is_ok());
    }

    #[test]
    fn test_new_record_must_be_complete() {
        let err = run(&[EstimatorRecord::new(5).with_cells(vec![1])]).unwrap_err();
        assert!(matches!(err, TallyError::MissingEstimatorType { .. }));

        let err = run(&[EstimatorRecord::new(5).with_type("Cell Collision Flux").with_cells(vec![1])])
            .unwrap_err();
        assert!(matches!(err, TallyError::MissingParticleType { .. }));

        let err = run(&[EstimatorRecord::new(5)
            .with_type("Cell Collision Flux")
            .with_particle_type("p")])
        .unwrap_err();
        assert!(matches!(err, TallyError::EmptyEntityBinding { kind: EntityKind::Cell, .. }));
    }

    #[test]
    fn test_unknown_entity() {
        let err = run(&[EstimatorRecord::new(5)
            .with_type("Surface Current")
            .with_particle_type("Photon")
            .with_surfaces(vec![2, 42])])
        .unwrap_err();
        assert!(matches!(
            err,
            TallyError::UnknownEntity { kind: EntityKind::Surface, entity: 42, .. }
        ));
    }

    #[test]
    fn test_duplicate_and_invalid_records() {
        let r = EstimatorRecord::new(7).with_type("Surface Current").with_particle_type("p").with_surfaces(vec![1]);
        let err = run(&[r.clone(), r]).unwrap_err();
        assert!(matches!(err, TallyError::DuplicateEstimatorId { .. }));

        let err = run(&[EstimatorRecord::new(7).with_type("Point Flux")]).unwrap_err();
        assert!(matches!(err, TallyError::InvalidEstimatorType { .. }));

        let err = run(&[EstimatorRecord::new(7).with_particle_type("Proton")]).unwrap_err();
        assert!(matches!(err, TallyError::InvalidParticleType { .. }));

        let err = run(&[EstimatorRecord::new(u32::MAX)]).unwrap_err();
        assert!(matches!(err, TallyError::ReservedEstimatorId { .. }));

        let err = run(&[EstimatorRecord::new(8)
            .with_type("Cell Pulse Height")
            .with_particle_type("Neutron")
            .with_cells(vec![1])])
        .unwrap_err();
        assert!(matches!(err, TallyError::IncompatibleParticleType { .. }));
    }

    #[test]
    fn test_foreign_entities_ignored() {
        let record = EstimatorRecord::new(6)
            .with_type("Cell Collision Flux")
            .with_particle_type("Photon")
            .with_cells(vec![3])
            .with_surfaces(vec![99]);
        let defs = run(&[record]).unwrap();
        assert_eq!(defs[&EstimatorId::new(6)].entities, BTreeSet::from([3]));
    }

    #[test]
    fn test_mesh_record() {
        let record = EstimatorRecord::new(9)
            .with_type("Hex Mesh Track-Length Flux")
            .with_particle_type("Neutron")
            .with_mesh_planes(vec![0.0, 1.0, 2.0], vec![0.0, 1.0], vec![0.0, 1.0])
            .with_bins(BinRecord {
                energy: Some(vec![0.0, 20.0]),
                ..BinRecord::default()
            });
        let defs = run(&[record]).unwrap();
        let d = &defs[&EstimatorId::new(9)];
        assert_eq!(d.entities, BTreeSet::from([0, 1]));
        assert!(d.mesh.is_some());

        let err = run(&[EstimatorRecord::new(9)
            .with_type("Hex Mesh Track-Length Flux")
            .with_particle_type("Neutron")])
        .unwrap_err();
        assert!(matches!(err, TallyError::InvalidMeshPlanes { .. }));
    }
}
