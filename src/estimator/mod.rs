//! # Estimator Module
//!
//! Tallies bound to geometry entities.
//!
//! ## Theory
//!
//! Every estimator scores a per-event contribution `c`, scaled by the
//! weighting policy and the response functions, into the bins the observed
//! phase-space point falls in:
//!
//! ```text
//! track-length flux   c = ℓ                    (ℓ: subtrack length in the cell)
//! collision flux      c = 1/Σt
//! surface flux        c = 1/|μ|                (|μ| < 0.001 → 0.0005)
//! surface current     c = 1
//! pulse height        c = 1 or E_dep           (per history, binned by E_dep)
//! ```
//!
//! Scores of one history are summed before they become a sample, so the
//! raw moments describe the per-history distribution. Means are divided by
//! the entity volume or area (not for pulse height or current) and multiplied
//! by the estimator multiplier.
//!
//! ## Concurrency
//!
//! The scoring logic is immutable once built. Worker threads score into their
//! own `TallySheet`s and the sheets are reduced into the estimator at the end
//! of a batch.

pub mod mesh;
pub mod moments;
pub mod response;
pub mod tally;

pub use mesh::{HexMesh, MeshPlanes};
pub use moments::{ProcessedMoments, RawMoments};
pub use response::{ResponseFunction, ResponseTable, TabulatedResponse};
pub use tally::TallySheet;

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::BinRecord;
use crate::discretization::{PhaseSpaceBinning, PhaseSpacePoint};
use crate::particle::{ObservedEvent, ParticleState};
use crate::types::{EntityId, EntityKind, EstimatorId, ParticleType};

/// Crossing cosines below this magnitude are replaced to bound 1/|μ|
pub const COSINE_CUTOFF: f64 = 0.001;

// ============================================================================
// ESTIMATOR KINDS
// ============================================================================

/// Estimator variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EstimatorKind {
    CellPulseHeight,
    CellTrackLengthFlux,
    CellCollisionFlux,
    SurfaceFlux,
    SurfaceCurrent,
    HexMeshTrackLengthFlux,
}

impl EstimatorKind {
    pub const ALL: [EstimatorKind; 6] = [
        EstimatorKind::CellPulseHeight,
        EstimatorKind::CellTrackLengthFlux,
        EstimatorKind::CellCollisionFlux,
        EstimatorKind::SurfaceFlux,
        EstimatorKind::SurfaceCurrent,
        EstimatorKind::HexMeshTrackLengthFlux,
    ];

    /// Name used in configuration and reports
    pub fn canonical_name(&self) -> &'static str {
        match self {
            EstimatorKind::CellPulseHeight => "Cell Pulse Height",
            EstimatorKind::CellTrackLengthFlux => "Cell Track-Length Flux",
            EstimatorKind::CellCollisionFlux => "Cell Collision Flux",
            EstimatorKind::SurfaceFlux => "Surface Flux",
            EstimatorKind::SurfaceCurrent => "Surface Current",
            EstimatorKind::HexMeshTrackLengthFlux => "Hex Mesh Track-Length Flux",
        }
    }

    pub fn from_canonical_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.canonical_name() == name)
    }

    /// Class of entity the estimator binds to
    pub fn entity_kind(&self) -> EntityKind {
        match self {
            EstimatorKind::CellPulseHeight
            | EstimatorKind::CellTrackLengthFlux
            | EstimatorKind::CellCollisionFlux => EntityKind::Cell,
            EstimatorKind::SurfaceFlux | EstimatorKind::SurfaceCurrent => EntityKind::Surface,
            EstimatorKind::HexMeshTrackLengthFlux => EntityKind::MeshElement,
        }
    }

    /// Whether means are divided by the entity volume or area
    pub fn uses_entity_measure(&self) -> bool {
        !matches!(self, EstimatorKind::CellPulseHeight | EstimatorKind::SurfaceCurrent)
    }

    pub fn is_pulse_height(&self) -> bool {
        matches!(self, EstimatorKind::CellPulseHeight)
    }

    /// Whether the variant can be declared by a geometry tag
    pub fn is_taggable(&self) -> bool {
        !matches!(self, EstimatorKind::HexMeshTrackLengthFlux)
    }
}

impl fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.canonical_name())
    }
}

impl FromStr for EstimatorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_canonical_name(s).ok_or_else(|| s.to_string())
    }
}

/// How the particle weight enters each score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WeightingPolicy {
    #[default]
    Weight,
    WeightTimesEnergy,
}

impl WeightingPolicy {
    pub fn from_energy_multiplication(energy_multiplication: bool) -> Self {
        if energy_multiplication {
            WeightingPolicy::WeightTimesEnergy
        } else {
            WeightingPolicy::Weight
        }
    }

    pub fn multiplier(&self, state: &ParticleState) -> f64 {
        match self {
            WeightingPolicy::Weight => state.weight,
            WeightingPolicy::WeightTimesEnergy => state.weight * state.energy,
        }
    }
}

// ============================================================================
// DEFINITION
// ============================================================================

/// Fully resolved estimator declaration
#[derive(Debug, Clone, PartialEq)]
pub struct EstimatorDefinition {
    pub id: EstimatorId,
    pub kind: EstimatorKind,
    pub particle_types: BTreeSet<ParticleType>,
    /// Cells, surfaces or mesh elements depending on `kind`
    pub entities: BTreeSet<EntityId>,
    pub multiplier: f64,
    pub energy_multiplication: bool,
    pub response_functions: Vec<u32>,
    pub bins: BinRecord,
    pub mesh: Option<MeshPlanes>,
}

impl EstimatorDefinition {
    /// Geometry-only defaults: multiplier 1, weight policy, no bins or responses
    pub fn new(id: EstimatorId, kind: EstimatorKind, particle_type: ParticleType) -> Self {
        Self {
            id,
            kind,
            particle_types: BTreeSet::from([particle_type]),
            entities: BTreeSet::new(),
            multiplier: 1.0,
            energy_multiplication: false,
            response_functions: Vec::new(),
            bins: BinRecord::default(),
            mesh: None,
        }
    }

    pub fn with_entities(mut self, entities: impl IntoIterator<Item = EntityId>) -> Self {
        self.entities.extend(entities);
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_energy_multiplication(mut self, on: bool) -> Self {
        self.energy_multiplication = on;
        self
    }

    pub fn with_response_functions(mut self, ids: Vec<u32>) -> Self {
        self.response_functions = ids;
        self
    }

    pub fn with_bins(mut self, bins: BinRecord) -> Self {
        self.bins = bins;
        self
    }

    pub fn with_mesh(mut self, mesh: MeshPlanes) -> Self {
        self.mesh = Some(mesh);
        self
    }

    pub fn entity_kind(&self) -> EntityKind {
        self.kind.entity_kind()
    }

    pub fn weighting_policy(&self) -> WeightingPolicy {
        WeightingPolicy::from_energy_multiplication(self.energy_multiplication)
    }
}

// ============================================================================
// ESTIMATOR
// ============================================================================

/// Immutable scoring logic of an estimator
#[derive(Debug, Clone)]
struct Observer {
    id: EstimatorId,
    kind: EstimatorKind,
    policy: WeightingPolicy,
    particle_types: BTreeSet<ParticleType>,
    entities: Vec<EntityId>,
    entity_index: HashMap<EntityId, usize>,
    measures: Vec<f64>,
    multiplier: f64,
    binning: PhaseSpaceBinning,
    responses: Vec<Arc<dyn ResponseFunction>>,
    mesh: Option<HexMesh>,
}

impl Observer {
    fn new_sheet(&self) -> TallySheet {
        TallySheet::new(
            self.entities.len(),
            self.responses.len(),
            self.binning.number_of_bins(),
        )
    }

    fn accumulate_into(&self, sheet: &mut TallySheet, state: &ParticleState, event: &ObservedEvent) {
        if !self.particle_types.contains(&state.particle_type) {
            return;
        }
        let point = PhaseSpacePoint::from_state(state);

        match (self.kind, *event) {
            (EstimatorKind::CellTrackLengthFlux, ObservedEvent::Subtrack { cell, track_length, .. }) => {
                self.score_entity(sheet, cell, track_length, state, &point);
            }
            (
                EstimatorKind::CellCollisionFlux,
                ObservedEvent::Collision { cell, inverse_total_cross_section },
            ) => {
                self.score_entity(sheet, cell, inverse_total_cross_section, state, &point);
            }
            (EstimatorKind::SurfaceFlux, ObservedEvent::SurfaceCrossing { surface, angle_cosine }) => {
                let mu = angle_cosine.abs();
                let mu = if mu < COSINE_CUTOFF { 0.5 * COSINE_CUTOFF } else { mu };
                self.score_entity(sheet, surface, 1.0 / mu, state, &point.with_cosine(angle_cosine));
            }
            (EstimatorKind::SurfaceCurrent, ObservedEvent::SurfaceCrossing { surface, angle_cosine }) => {
                self.score_entity(sheet, surface, 1.0, state, &point.with_cosine(angle_cosine));
            }
            (EstimatorKind::CellPulseHeight, ObservedEvent::EnteringCell { cell }) => {
                if let Some(&idx) = self.entity_index.get(&cell) {
                    sheet.deposit(idx, state.weight * state.energy);
                }
            }
            (EstimatorKind::CellPulseHeight, ObservedEvent::LeavingCell { cell }) => {
                if let Some(&idx) = self.entity_index.get(&cell) {
                    sheet.deposit(idx, -state.weight * state.energy);
                }
            }
            (
                EstimatorKind::HexMeshTrackLengthFlux,
                ObservedEvent::Subtrack { start, direction, track_length, .. },
            ) => {
                if let Some(mesh) = &self.mesh {
                    for (element, length) in mesh.split_track(start, direction, track_length) {
                        self.score_index(sheet, element as usize, length, Some(state), &point);
                    }
                }
            }
            _ => {}
        }
    }

    fn score_entity(
        &self,
        sheet: &mut TallySheet,
        entity: EntityId,
        contribution: f64,
        state: &ParticleState,
        point: &PhaseSpacePoint,
    ) {
        if let Some(&idx) = self.entity_index.get(&entity) {
            self.score_index(sheet, idx, contribution, Some(state), point);
        }
    }

    /// Score into every bin of `point`; without a state (pulse height) the
    /// contribution is already weighted and responses see the point energy
    fn score_index(
        &self,
        sheet: &mut TallySheet,
        idx: usize,
        contribution: f64,
        state: Option<&ParticleState>,
        point: &PhaseSpacePoint,
    ) {
        let bins = self.binning.calculate_bin_indices(point);
        if bins.is_empty() {
            return;
        }
        let base = match state {
            Some(state) => contribution * self.policy.multiplier(state),
            None => contribution,
        };

        if self.responses.is_empty() {
            for &bin in &bins {
                sheet.score(idx, 0, bin, base);
            }
            return;
        }
        for (r, response) in self.responses.iter().enumerate() {
            let value = match state {
                Some(state) => base * response.evaluate_state(state),
                None => base * response.evaluate(point.energy),
            };
            for &bin in &bins {
                sheet.score(idx, r, bin, value);
            }
        }
    }

    fn commit_history_into(&self, sheet: &mut TallySheet) {
        if self.kind.is_pulse_height() {
            for (idx, deposit) in sheet.take_deposits() {
                // enter/leave pairs can leave a rounding residue below zero
                let deposit = deposit.max(0.0);
                let contribution = match self.policy {
                    WeightingPolicy::Weight => 1.0,
                    WeightingPolicy::WeightTimesEnergy => deposit,
                };
                self.score_index(sheet, idx, contribution, None, &PhaseSpacePoint::from_energy(deposit));
            }
        }
        sheet.commit_history();
    }

    fn total_measure(&self) -> f64 {
        if self.kind.uses_entity_measure() {
            self.measures.iter().sum()
        } else {
            1.0
        }
    }

    fn entity_measure(&self, idx: usize) -> f64 {
        if self.kind.uses_entity_measure() {
            self.measures[idx]
        } else {
            1.0
        }
    }
}

/// A built estimator: scoring logic plus committed moments
#[derive(Debug, Clone)]
pub struct Estimator {
    observer: Observer,
    sheet: TallySheet,
}

impl Estimator {
    /// Estimator with weight policy, no bins and no responses
    ///
    /// `measures` must be parallel to `entities` (volumes, areas or element
    /// volumes).
    pub fn new(
        id: EstimatorId,
        kind: EstimatorKind,
        entities: Vec<EntityId>,
        measures: Vec<f64>,
    ) -> Self {
        let entity_index = entities.iter().enumerate().map(|(i, &e)| (e, i)).collect();
        let observer = Observer {
            id,
            kind,
            policy: WeightingPolicy::Weight,
            particle_types: ParticleType::ALL.into_iter().collect(),
            entities,
            entity_index,
            measures,
            multiplier: 1.0,
            binning: PhaseSpaceBinning::default(),
            responses: Vec::new(),
            mesh: None,
        };
        let sheet = observer.new_sheet();
        Self { observer, sheet }
    }

    pub fn with_policy(mut self, policy: WeightingPolicy) -> Self {
        self.observer.policy = policy;
        self
    }

    pub fn with_particle_types(mut self, types: BTreeSet<ParticleType>) -> Self {
        self.observer.particle_types = types;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.observer.multiplier = multiplier;
        self
    }

    pub fn with_binning(mut self, binning: PhaseSpaceBinning) -> Self {
        self.observer.binning = binning;
        self.sheet = self.observer.new_sheet();
        self
    }

    pub fn with_responses(mut self, responses: Vec<Arc<dyn ResponseFunction>>) -> Self {
        self.observer.responses = responses;
        self.sheet = self.observer.new_sheet();
        self
    }

    pub fn with_mesh(mut self, mesh: HexMesh) -> Self {
        self.observer.mesh = Some(mesh);
        self
    }

    pub fn id(&self) -> EstimatorId {
        self.observer.id
    }

    pub fn kind(&self) -> EstimatorKind {
        self.observer.kind
    }

    pub fn policy(&self) -> WeightingPolicy {
        self.observer.policy
    }

    pub fn multiplier(&self) -> f64 {
        self.observer.multiplier
    }

    pub fn particle_types(&self) -> &BTreeSet<ParticleType> {
        &self.observer.particle_types
    }

    pub fn entities(&self) -> &[EntityId] {
        &self.observer.entities
    }

    pub fn entity_measures(&self) -> &[f64] {
        &self.observer.measures
    }

    pub fn is_entity_assigned(&self, entity: EntityId) -> bool {
        self.observer.entity_index.contains_key(&entity)
    }

    pub fn binning(&self) -> &PhaseSpaceBinning {
        &self.observer.binning
    }

    pub fn response_functions(&self) -> &[Arc<dyn ResponseFunction>] {
        &self.observer.responses
    }

    pub fn mesh(&self) -> Option<&HexMesh> {
        self.observer.mesh.as_ref()
    }

    /// Phase-space bins times response functions
    pub fn number_of_bins(&self) -> usize {
        self.sheet.bins_per_entity()
    }

    pub fn histories(&self) -> u64 {
        self.sheet.histories()
    }

    /// Committed raw moments
    pub fn raw_moments(&self) -> &TallySheet {
        &self.sheet
    }

    /// Empty sheet shaped for this estimator
    pub fn new_sheet(&self) -> TallySheet {
        self.observer.new_sheet()
    }

    /// Score an event into a worker-local sheet
    pub fn accumulate_into(&self, sheet: &mut TallySheet, state: &ParticleState, event: &ObservedEvent) {
        self.observer.accumulate_into(sheet, state, event);
    }

    /// Close the history in flight of a worker-local sheet
    pub fn commit_history_into(&self, sheet: &mut TallySheet) {
        self.observer.commit_history_into(sheet);
    }

    /// Fold a worker-local sheet into the committed moments
    pub fn reduce(&mut self, sheet: &TallySheet) {
        self.sheet.merge(sheet);
    }

    /// Score an event directly into this estimator
    pub fn accumulate(&mut self, state: &ParticleState, event: &ObservedEvent) {
        self.observer.accumulate_into(&mut self.sheet, state, event);
    }

    pub fn commit_history(&mut self) {
        self.observer.commit_history_into(&mut self.sheet);
    }

    /// Processed statistics for every entity and bin
    pub fn export_moments(&self, elapsed: f64) -> EstimatorReport {
        let obs = &self.observer;
        let sheet = &self.sheet;
        let n = sheet.histories();
        let bins = sheet.bins_per_entity();
        let responses = sheet.number_of_responses();

        let mut entity_bins = BTreeMap::new();
        let mut entity_totals = BTreeMap::new();
        for (idx, &entity) in obs.entities.iter().enumerate() {
            let norm = obs.entity_measure(idx);
            entity_bins.insert(
                entity,
                (0..bins)
                    .map(|b| sheet.entity_bin(idx, b).process(n, obs.multiplier, norm, elapsed))
                    .collect(),
            );
            entity_totals.insert(
                entity,
                (0..responses)
                    .map(|r| sheet.entity_total(idx, r).process(n, obs.multiplier, norm, elapsed))
                    .collect(),
            );
        }

        let total_norm = obs.total_measure();
        EstimatorReport {
            id: obs.id,
            kind: obs.kind,
            histories: n,
            phase_bins: sheet.number_of_phase_bins(),
            response_names: obs.responses.iter().map(|r| r.name()).collect(),
            entity_bins,
            entity_totals,
            total_bins: (0..bins)
                .map(|b| sheet.total_bin(b).process(n, obs.multiplier, total_norm, elapsed))
                .collect(),
            totals: (0..responses)
                .map(|r| sheet.total(r).process(n, obs.multiplier, total_norm, elapsed))
                .collect(),
        }
    }
}

/// Processed statistics of one estimator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorReport {
    pub id: EstimatorId,
    pub kind: EstimatorKind,
    pub histories: u64,
    pub phase_bins: usize,
    pub response_names: Vec<String>,
    /// Per entity, one entry per (response, phase bin)
    pub entity_bins: BTreeMap<EntityId, Vec<ProcessedMoments>>,
    /// Per entity, one entry per response
    pub entity_totals: BTreeMap<EntityId, Vec<ProcessedMoments>>,
    pub total_bins: Vec<ProcessedMoments>,
    pub totals: Vec<ProcessedMoments>,
}

impl EstimatorReport {
    /// Estimator total of the first (or only) response
    pub fn total(&self) -> ProcessedMoments {
        self.totals.first().copied().unwrap_or_default()
    }
}

impl fmt::Display for EstimatorReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Estimator {} ({}), {} histories",
            self.id, self.kind, self.histories
        )?;
        for (entity, totals) in &self.entity_totals {
            for (r, m) in totals.iter().enumerate() {
                writeln!(
                    f,
                    "  entity {:>6}  resp {:>2}  mean {:>12.5e}  RE {:>8.4}  VOV {:>8.4}",
                    entity, r, m.mean, m.relative_error, m.variance_of_variance
                )?;
            }
        }
        for (r, m) in self.totals.iter().enumerate() {
            writeln!(
                f,
                "  total          resp {:>2}  mean {:>12.5e}  RE {:>8.4}  FOM {:>10.3e}",
                r, m.mean, m.relative_error, m.figure_of_merit
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discretization::{
        ContinuousDiscretization, DimensionDiscretization, PhaseSpaceDimension,
    };
    use crate::types::Vec3;

    fn energy_binning(boundaries: Vec<f64>) -> PhaseSpaceBinning {
        PhaseSpaceBinning::new(vec![DimensionDiscretization::Continuous {
            dimension: PhaseSpaceDimension::Energy,
            bins: ContinuousDiscretization::new(boundaries).unwrap(),
        }])
    }

    fn subtrack(cell: EntityId, length: f64) -> ObservedEvent {
        ObservedEvent::Subtrack {
            cell,
            start: Vec3::zero(),
            direction: Vec3::unit_z(),
            track_length: length,
        }
    }

    #[test]
    fn test_kind_names_round_trip() {
        for kind in EstimatorKind::ALL {
            assert_eq!(kind.canonical_name().parse::<EstimatorKind>(), Ok(kind));
        }
        assert!(!EstimatorKind::HexMeshTrackLengthFlux.is_taggable());
        assert_eq!(EstimatorKind::SurfaceCurrent.entity_kind(), EntityKind::Surface);
    }

    #[test]
    fn test_track_length_flux_mean() {
        let mut est = Estimator::new(
            EstimatorId::new(0),
            EstimatorKind::CellTrackLengthFlux,
            vec![1, 2],
            vec![2.0, 4.0],
        );
        let n = ParticleState::neutron(1.0).with_weight(0.5);

        est.accumulate(&n, &subtrack(1, 4.0));
        est.accumulate(&n, &subtrack(3, 9.0));
        est.commit_history();
        est.commit_history();

        let report = est.export_moments(1.0);
        assert_eq!(report.histories, 2);
        // 0.5 * 4 / 2 histories / volume 2
        assert!((report.entity_totals[&1][0].mean - 0.5).abs() < 1e-12);
        assert_eq!(report.entity_totals[&2][0].mean, 0.0);
        // total norm is 6
        assert!((report.total().mean - 1.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_particle_filter() {
        let mut est = Estimator::new(EstimatorId::new(0), EstimatorKind::CellCollisionFlux, vec![1], vec![1.0])
            .with_particle_types(BTreeSet::from([ParticleType::Photon]));
        let event = ObservedEvent::Collision { cell: 1, inverse_total_cross_section: 2.0 };

        est.accumulate(&ParticleState::neutron(1.0), &event);
        est.accumulate(&ParticleState::photon(1.0), &event);
        est.commit_history();
        assert_eq!(est.raw_moments().total(0).first(), 2.0);
    }

    #[test]
    fn test_surface_flux_cosine_cutoff() {
        let mut est = Estimator::new(EstimatorId::new(2), EstimatorKind::SurfaceFlux, vec![5], vec![1.0]);
        let p = ParticleState::photon(1.0);

        est.accumulate(&p, &ObservedEvent::SurfaceCrossing { surface: 5, angle_cosine: -0.5 });
        est.accumulate(&p, &ObservedEvent::SurfaceCrossing { surface: 5, angle_cosine: 1e-4 });
        est.commit_history();
        assert!((est.raw_moments().total(0).first() - (2.0 + 2000.0)).abs() < 1e-9);
    }

    #[test]
    fn test_surface_current_with_energy_weighting() {
        let mut est = Estimator::new(EstimatorId::new(2), EstimatorKind::SurfaceCurrent, vec![5], vec![10.0])
            .with_policy(WeightingPolicy::WeightTimesEnergy);
        let p = ParticleState::neutron(3.0).with_weight(2.0);
        est.accumulate(&p, &ObservedEvent::SurfaceCrossing { surface: 5, angle_cosine: 0.1 });
        est.commit_history();

        let report = est.export_moments(1.0);
        // current is not area-normalized
        assert!((report.total().mean - 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_pulse_height_bins_deposition() {
        let mut est = Estimator::new(EstimatorId::new(7), EstimatorKind::CellPulseHeight, vec![1], vec![100.0])
            .with_binning(energy_binning(vec![0.0, 0.5, 1.0, 2.0]));
        let entering = ParticleState::photon(1.5);
        let leaving = ParticleState::photon(0.7);

        est.accumulate(&entering, &ObservedEvent::EnteringCell { cell: 1 });
        est.accumulate(&leaving, &ObservedEvent::LeavingCell { cell: 1 });
        est.commit_history();

        let sheet = est.raw_moments();
        // deposit 0.8 lands in [0.5, 1.0)
        assert_eq!(sheet.entity_bin(0, 1).first(), 1.0);
        assert_eq!(sheet.entity_bin(0, 0).first(), 0.0);
        assert_eq!(est.export_moments(1.0).total().mean, 1.0);
    }

    #[test]
    fn test_response_functions_multiply_bin_space() {
        let response: Arc<dyn ResponseFunction> =
            Arc::new(TabulatedResponse::new(9, vec![0.0, 10.0], vec![0.0, 10.0]).unwrap());
        let mut est = Estimator::new(EstimatorId::new(1), EstimatorKind::CellTrackLengthFlux, vec![1], vec![1.0])
            .with_binning(energy_binning(vec![0.0, 1.0, 10.0]))
            .with_responses(vec![response.clone(), response]);
        assert_eq!(est.number_of_bins(), 4);

        est.accumulate(&ParticleState::neutron(4.0), &subtrack(1, 1.0));
        est.commit_history();
        let sheet = est.raw_moments();
        assert_eq!(sheet.entity_bin(0, 1).first(), 4.0);
        assert_eq!(sheet.entity_bin(0, 3).first(), 4.0);
        assert_eq!(sheet.entity_bin(0, 0).first(), 0.0);
    }

    #[test]
    fn test_worker_sheets_reduce() {
        let mut est = Estimator::new(EstimatorId::new(0), EstimatorKind::CellCollisionFlux, vec![1], vec![1.0]);
        let event = ObservedEvent::Collision { cell: 1, inverse_total_cross_section: 1.0 };

        let mut a = est.new_sheet();
        let mut b = est.new_sheet();
        est.accumulate_into(&mut a, &ParticleState::neutron(1.0), &event);
        est.commit_history_into(&mut a);
        est.commit_history_into(&mut b);
        est.reduce(&a);
        est.reduce(&b);

        assert_eq!(est.histories(), 2);
        assert_eq!(est.raw_moments().total(0).first(), 1.0);
    }

    #[test]
    fn test_mesh_track_length() {
        let mesh = HexMesh::new(
            EstimatorId::new(4),
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0],
            vec![0.0, 1.0],
        )
        .unwrap();
        let mut est = Estimator::new(
            EstimatorId::new(4),
            EstimatorKind::HexMeshTrackLengthFlux,
            mesh.element_ids(),
            vec![1.0, 1.0],
        )
        .with_mesh(mesh);

        let event = ObservedEvent::Subtrack {
            cell: 99,
            start: Vec3::new(0.5, 0.5, 0.5),
            direction: Vec3::unit_x(),
            track_length: 1.0,
        };
        est.accumulate(&ParticleState::neutron(1.0), &event);
        est.commit_history();

        let sheet = est.raw_moments();
        assert!((sheet.entity_total(0, 0).first() - 0.5).abs() < 1e-12);
        assert!((sheet.entity_total(1, 0).first() - 0.5).abs() < 1e-12);
    }
}
