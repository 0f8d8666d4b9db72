//! # Estimator Factory
//!
//! Builds concrete estimators from resolved definitions and registers them
//! with the event handler.
//!
//! ## Build steps
//!
//! ```text
//! definition ─► variant + entity measures ─► weighting policy ─► particle filter
//!            ─► response functions ─► bin discretizations ─► multiplier ─► register
//! ```
//!
//! A build either produces a complete estimator or fails without touching the
//! handler, so estimators registered earlier stay intact.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::{BinRecord, PropertyNames, RunConfig};
use crate::discretization::{
    ContinuousDiscretization, DimensionDiscretization, DiscretizationError,
    OrderedDiscreteDiscretization, PhaseSpaceBinning, PhaseSpaceDimension,
    UnorderedDiscretization,
};
use crate::error::{Result, TallyError};
use crate::estimator::{
    Estimator, EstimatorDefinition, EstimatorKind, HexMesh, ResponseFunction, ResponseTable,
};
use crate::geometry::GeometryQuery;
use crate::handler::EventHandler;
use crate::resolve::{merge, EntityMeasureCache, PropertyResolver};
use crate::types::{EntityId, EntityKind, EstimatorId, ParticleType};

/// Estimator construction engine bound to one geometry
pub struct EstimatorFactory {
    geometry: Arc<dyn GeometryQuery>,
    names: PropertyNames,
    responses: ResponseTable,
    measures: EntityMeasureCache,
}

impl EstimatorFactory {
    pub fn new(geometry: Arc<dyn GeometryQuery>) -> Self {
        Self {
            measures: EntityMeasureCache::new(Arc::clone(&geometry)),
            geometry,
            names: PropertyNames::default(),
            responses: ResponseTable::new(),
        }
    }

    /// Factory configured with the property names and response functions of a run
    pub fn from_config(geometry: Arc<dyn GeometryQuery>, config: &RunConfig) -> Result<Self> {
        config.property_names.validate()?;
        let responses = ResponseTable::from_records(&config.response_functions)?;
        Ok(Self::new(geometry)
            .with_property_names(config.property_names.clone())
            .with_responses(responses))
    }

    pub fn with_property_names(mut self, names: PropertyNames) -> Self {
        self.names = names;
        self
    }

    pub fn with_responses(mut self, responses: ResponseTable) -> Self {
        self.responses = responses;
        self
    }

    pub fn measures(&self) -> &EntityMeasureCache {
        &self.measures
    }

    pub fn responses(&self) -> &ResponseTable {
        &self.responses
    }

    /// Resolve geometry tags and configuration records into definitions
    pub fn resolve(&self, config: &RunConfig) -> Result<BTreeMap<EstimatorId, EstimatorDefinition>> {
        let tagged = PropertyResolver::new(self.geometry.as_ref(), &self.names).resolve_all()?;
        info!(
            cells = tagged.cells.len(),
            surfaces = tagged.surfaces.len(),
            "found estimators tagged in the geometry"
        );
        let definitions = merge(&tagged, &config.estimators, &self.names, self.geometry.as_ref())?;
        debug!(estimators = definitions.len(), "merged configuration records");
        Ok(definitions)
    }

    /// Fill the measure cache from the union of bound entities
    pub fn prefetch_measures<'a>(&self, definitions: impl IntoIterator<Item = &'a EstimatorDefinition>) {
        let mut cells = BTreeSet::new();
        let mut surfaces = BTreeSet::new();
        for d in definitions {
            if !d.kind.uses_entity_measure() {
                continue;
            }
            match d.entity_kind() {
                EntityKind::Cell => cells.extend(d.entities.iter().copied()),
                EntityKind::Surface => surfaces.extend(d.entities.iter().copied()),
                EntityKind::MeshElement => {}
            }
        }
        let cells: Vec<EntityId> = cells.into_iter().collect();
        let surfaces: Vec<EntityId> = surfaces.into_iter().collect();
        self.measures.volumes(&cells);
        self.measures.areas(&surfaces);
        debug!(cells = cells.len(), surfaces = surfaces.len(), "entity measures cached");
    }

    /// Build one estimator
    pub fn build(&self, definition: &EstimatorDefinition) -> Result<Estimator> {
        let id = definition.id;
        let kind = definition.kind;

        if !(definition.multiplier > 0.0 && definition.multiplier.is_finite()) {
            return Err(TallyError::NonPositiveMultiplier {
                id,
                multiplier: definition.multiplier,
            });
        }
        if kind.is_pulse_height() && definition.particle_types.contains(&ParticleType::Neutron) {
            return Err(TallyError::IncompatibleParticleType { id });
        }

        let (entities, measures, mesh) = self.bind_entities(definition)?;
        let responses = self.response_functions(definition)?;
        let binning = build_binning(id, kind, &definition.bins)?;

        let mut estimator = Estimator::new(id, kind, entities, measures)
            .with_policy(definition.weighting_policy())
            .with_particle_types(definition.particle_types.clone())
            .with_multiplier(definition.multiplier)
            .with_binning(binning)
            .with_responses(responses);
        if let Some(mesh) = mesh {
            estimator = estimator.with_mesh(mesh);
        }
        Ok(estimator)
    }

    /// Resolve, build and register every estimator of a run
    pub fn build_all(&self, config: &RunConfig, handler: &mut EventHandler) -> Result<Vec<EstimatorId>> {
        config.report_unused_keys();
        let definitions = self.resolve(config)?;
        self.prefetch_measures(definitions.values());

        let mut registered = Vec::with_capacity(definitions.len());
        for definition in definitions.values() {
            let estimator = self.build(definition)?;
            registered.push(handler.register_estimator(estimator)?);
        }
        info!(estimators = registered.len(), "estimators registered");
        Ok(registered)
    }

    fn bind_entities(
        &self,
        definition: &EstimatorDefinition,
    ) -> Result<(Vec<EntityId>, Vec<f64>, Option<HexMesh>)> {
        let id = definition.id;
        let kind = definition.kind;

        if kind == EstimatorKind::HexMeshTrackLengthFlux {
            let planes = definition.mesh.as_ref().ok_or_else(|| TallyError::InvalidMeshPlanes {
                id,
                reason: "no mesh planes were given".to_string(),
            })?;
            let mesh = HexMesh::from_planes(id, planes)?;
            let elements = mesh.element_ids();
            let volumes = elements.iter().map(|&e| mesh.element_volume(e)).collect();
            return Ok((elements, volumes, Some(mesh)));
        }

        let entities: Vec<EntityId> = definition.entities.iter().copied().collect();
        if entities.is_empty() {
            return Err(TallyError::EmptyEntityBinding {
                id,
                kind: kind.entity_kind(),
            });
        }
        let measures = match (kind.uses_entity_measure(), kind.entity_kind()) {
            (false, _) => vec![1.0; entities.len()],
            (true, EntityKind::Cell) => self.measures.volumes(&entities),
            (true, _) => self.measures.areas(&entities),
        };
        Ok((entities, measures, None))
    }

    fn response_functions(&self, definition: &EstimatorDefinition) -> Result<Vec<Arc<dyn ResponseFunction>>> {
        definition
            .response_functions
            .iter()
            .map(|&rid| {
                self.responses.get(rid).ok_or(TallyError::UnknownResponseFunction {
                    id: definition.id,
                    response_id: rid,
                })
            })
            .collect()
    }
}

/// Whether an estimator variant can bin a dimension
fn supports_dimension(kind: EstimatorKind, dimension: PhaseSpaceDimension) -> bool {
    match dimension {
        PhaseSpaceDimension::Energy => true,
        PhaseSpaceDimension::Cosine => kind.entity_kind() == EntityKind::Surface,
        _ => !kind.is_pulse_height(),
    }
}

fn build_binning(id: EstimatorId, kind: EstimatorKind, bins: &BinRecord) -> Result<PhaseSpaceBinning> {
    let mut dimensions = Vec::new();
    for dimension in bins.declared_dimensions() {
        if !supports_dimension(kind, dimension) {
            return Err(TallyError::UnsupportedDimension {
                id,
                kind: kind.to_string(),
                dimension: dimension.to_string(),
            });
        }

        let label = format!("{} bins", dimension.name());
        let convert = |err: DiscretizationError| match err {
            DiscretizationError::Unsorted => TallyError::UnsortedBinBoundaries {
                id,
                dimension: label.clone(),
            },
            DiscretizationError::TooFewEntries { required, found } => {
                TallyError::InsufficientBinBoundaries {
                    id,
                    dimension: label.clone(),
                    required,
                    found,
                }
            }
            DiscretizationError::EmptyCategory => TallyError::InsufficientBinBoundaries {
                id,
                dimension: label.clone(),
                required: 1,
                found: 0,
            },
        };

        let discretization = match dimension {
            PhaseSpaceDimension::CollisionNumber => DimensionDiscretization::OrderedDiscrete {
                dimension,
                bins: OrderedDiscreteDiscretization::new(
                    bins.collision_number.clone().unwrap_or_default(),
                )
                .map_err(convert)?,
            },
            PhaseSpaceDimension::SourceId => DimensionDiscretization::Unordered {
                dimension,
                bins: UnorderedDiscretization::new(
                    bins.source_id
                        .iter()
                        .flatten()
                        .map(|set| set.iter().copied().collect())
                        .collect(),
                )
                .map_err(convert)?,
            },
            _ => DimensionDiscretization::Continuous {
                dimension,
                bins: ContinuousDiscretization::new(
                    bins.continuous(dimension).map(<[f64]>::to_vec).unwrap_or_default(),
                )
                .map_err(convert)?,
            },
        };
        dimensions.push(discretization);
    }
    Ok(PhaseSpaceBinning::new(dimensions))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EstimatorRecord, ResponseFunctionRecord};
    use crate::geometry::InMemoryGeometry;
    use crate::resolve::measure::tests::CountingGeometry;
    use std::f64::consts::PI;
    use std::sync::atomic::Ordering;

    fn geometry() -> InMemoryGeometry {
        InMemoryGeometry::concentric_spheres(&[1.0, 2.0, 3.0])
            .with_property(EntityKind::Cell, 1, "estimator", "0.cell.tl.flux.n")
            .with_property(EntityKind::Cell, 2, "estimator", "0.cell.tl.flux.n")
            .with_property(EntityKind::Cell, 2, "estimator", "1.cell.pulse.height.p")
            .with_property(EntityKind::Surface, 3, "estimator", "2.surface.current.e")
    }

    fn energy_bins(boundaries: Vec<f64>) -> BinRecord {
        BinRecord {
            energy: Some(boundaries),
            ..BinRecord::default()
        }
    }

    #[test]
    fn test_build_all_registers_cached_estimators() {
        let factory = EstimatorFactory::new(Arc::new(geometry()));
        let mut handler = EventHandler::new();
        let ids = factory.build_all(&RunConfig::default(), &mut handler).unwrap();
        assert_eq!(ids, vec![EstimatorId::new(0), EstimatorId::new(1), EstimatorId::new(2)]);

        let flux = handler.estimator(EstimatorId::new(0)).unwrap();
        assert_eq!(flux.entities(), &[1, 2]);
        assert!((flux.entity_measures()[1] - 4.0 / 3.0 * PI * 7.0).abs() < 1e-9);
        assert_eq!(flux.multiplier(), 1.0);
        assert_eq!(flux.number_of_bins(), 1);

        let current = handler.estimator(EstimatorId::new(2)).unwrap();
        assert_eq!(current.entity_measures(), &[1.0]);
    }

    #[test]
    fn test_measure_queries_shared_across_estimators() {
        let g = CountingGeometry::new(
            InMemoryGeometry::concentric_spheres(&[1.0, 2.0])
                .with_property(EntityKind::Cell, 1, "estimator", "0.cell.tl.flux.n")
                .with_property(EntityKind::Cell, 1, "estimator", "1.cell.c.flux.n"),
        );
        let g = Arc::new(g);
        let factory = EstimatorFactory::new(g.clone());
        let mut handler = EventHandler::new();
        factory.build_all(&RunConfig::default(), &mut handler).unwrap();
        assert_eq!(g.volume_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_build_with_bins_and_responses() {
        let mut record = EstimatorRecord::new(0).with_bins(BinRecord {
            energy: Some(vec![0.0, 1.0, 20.0]),
            collision_number: Some(vec![0, 1, 10]),
            ..BinRecord::default()
        });
        record.response_functions = vec![4, 4];
        let config = RunConfig::default()
            .with_response_function(ResponseFunctionRecord::new(4, vec![0.0, 20.0], vec![1.0, 1.0]))
            .with_estimator(record);

        let factory = EstimatorFactory::from_config(Arc::new(geometry()), &config).unwrap();
        let defs = factory.resolve(&config).unwrap();
        let est = factory.build(&defs[&EstimatorId::new(0)]).unwrap();
        assert_eq!(est.binning().number_of_bins(), 6);
        assert_eq!(est.number_of_bins(), 12);
        assert_eq!(est.response_functions().len(), 2);
    }

    #[test]
    fn test_unknown_response_function() {
        let mut record = EstimatorRecord::new(0);
        record.response_functions = vec![8];
        let config = RunConfig::default().with_estimator(record);
        let factory = EstimatorFactory::from_config(Arc::new(geometry()), &config).unwrap();
        let defs = factory.resolve(&config).unwrap();
        let err = factory.build(&defs[&EstimatorId::new(0)]).unwrap_err();
        assert!(matches!(err, TallyError::UnknownResponseFunction { response_id: 8, .. }));
    }

    #[test]
    fn test_unsorted_bins() {
        let config = RunConfig::default()
            .with_estimator(EstimatorRecord::new(0).with_bins(energy_bins(vec![1.0, 0.5, 2.0])));
        let factory = EstimatorFactory::new(Arc::new(geometry()));
        let mut handler = EventHandler::new();
        let err = factory.build_all(&config, &mut handler).unwrap_err();
        assert!(matches!(err, TallyError::UnsortedBinBoundaries { .. }));
        assert!(err.to_string().contains("energy bins"));
    }

    #[test]
    fn test_non_positive_multiplier() {
        let config = RunConfig::default().with_estimator(EstimatorRecord::new(0).with_multiplier(0.0));
        let factory = EstimatorFactory::new(Arc::new(geometry()));
        let defs = factory.resolve(&config).unwrap();
        let err = factory.build(&defs[&EstimatorId::new(0)]).unwrap_err();
        assert!(matches!(err, TallyError::NonPositiveMultiplier { .. }));
    }

    #[test]
    fn test_unsupported_dimensions() {
        let cosine = BinRecord {
            cosine: Some(vec![-1.0, 0.0, 1.0]),
            ..BinRecord::default()
        };
        let factory = EstimatorFactory::new(Arc::new(geometry()));

        let config = RunConfig::default().with_estimator(EstimatorRecord::new(0).with_bins(cosine.clone()));
        let defs = factory.resolve(&config).unwrap();
        let err = factory.build(&defs[&EstimatorId::new(0)]).unwrap_err();
        assert!(matches!(err, TallyError::UnsupportedDimension { .. }));

        let config = RunConfig::default().with_estimator(EstimatorRecord::new(2).with_bins(cosine));
        let defs = factory.resolve(&config).unwrap();
        assert!(factory.build(&defs[&EstimatorId::new(2)]).is_ok());

        let time = BinRecord {
            time: Some(vec![0.0, 1.0]),
            ..BinRecord::default()
        };
        let config = RunConfig::default().with_estimator(EstimatorRecord::new(1).with_bins(time));
        let defs = factory.resolve(&config).unwrap();
        let err = factory.build(&defs[&EstimatorId::new(1)]).unwrap_err();
        assert!(matches!(err, TallyError::UnsupportedDimension { .. }));
    }

    #[test]
    fn test_failed_build_keeps_registered_estimators() {
        let factory = EstimatorFactory::new(Arc::new(geometry()));
        let mut handler = EventHandler::new();
        factory.build_all(&RunConfig::default(), &mut handler).unwrap();

        let bad = EstimatorDefinition::new(EstimatorId::new(9), EstimatorKind::CellCollisionFlux, ParticleType::Photon)
            .with_entities([1])
            .with_multiplier(-1.0);
        assert!(factory.build(&bad).is_err());
        assert_eq!(handler.len(), 3);
    }

    #[test]
    fn test_mesh_estimator_volumes() {
        let config = RunConfig::default().with_estimator(
            EstimatorRecord::new(5)
                .with_type("Hex Mesh Track-Length Flux")
                .with_particle_type("Neutron")
                .with_mesh_planes(vec![0.0, 1.0, 3.0], vec![0.0, 1.0], vec![0.0, 2.0]),
        );
        let factory = EstimatorFactory::new(Arc::new(geometry()));
        let defs = factory.resolve(&config).unwrap();
        let est = factory.build(&defs[&EstimatorId::new(5)]).unwrap();
        assert_eq!(est.entity_measures(), &[2.0, 4.0]);
        assert!(est.mesh().is_some());
    }
}
