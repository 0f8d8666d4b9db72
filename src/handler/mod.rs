//! # Event Handler
//!
//! Owns the registered estimators and routes observed events to them.
//!
//! ## Routing
//!
//! ```text
//! Subtrack / Collision / Enter / Leave ──► cell routes[cell]      ─┐
//! SurfaceCrossing                     ──► surface routes[surface] ─┼─► estimators
//! Subtrack                            ──► mesh estimators (global) ─┘
//! ```
//!
//! ## Parallel batches
//!
//! `run_histories` gives every rayon worker its own `TallyBook`, one sheet per
//! estimator. Histories are independent: each one gets a generator seeded from
//! the batch seed and the history number, so results do not depend on the
//! thread count beyond floating-point summation order.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::error::{Result, TallyError};
use crate::estimator::{Estimator, EstimatorKind, EstimatorReport, TallySheet};
use crate::particle::{ObservedEvent, ParticleState};
use crate::types::{EntityId, EntityKind, EstimatorId};

/// Produces the events of one particle history
pub trait HistorySource: Send + Sync {
    /// Simulate history number `history`, reporting every event to `observe`
    fn run_history(
        &self,
        history: u64,
        rng: &mut StdRng,
        observe: &mut dyn FnMut(&ParticleState, &ObservedEvent),
    );
}

/// Worker-local sheets, parallel to the handler's estimators
#[derive(Debug, Clone)]
pub struct TallyBook {
    sheets: Vec<TallySheet>,
}

impl TallyBook {
    pub fn sheets(&self) -> &[TallySheet] {
        &self.sheets
    }

    pub fn merge(&mut self, other: &TallyBook) {
        for (mine, theirs) in self.sheets.iter_mut().zip(&other.sheets) {
            mine.merge(theirs);
        }
    }
}

/// Outcome of one batch of histories
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSummary {
    pub histories: u64,
    pub elapsed_seconds: f64,
    pub estimators: usize,
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} histories in {:.3} s ({} estimators)",
            self.histories, self.elapsed_seconds, self.estimators
        )
    }
}

/// Registry and dispatcher of estimators
#[derive(Debug, Default)]
pub struct EventHandler {
    estimators: Vec<Estimator>,
    index: BTreeMap<EstimatorId, usize>,
    cell_routes: HashMap<EntityId, Vec<usize>>,
    surface_routes: HashMap<EntityId, Vec<usize>>,
    mesh_routes: Vec<usize>,
    histories: u64,
    elapsed: f64,
}

impl EventHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an estimator and route its entities to it
    pub fn register_estimator(&mut self, estimator: Estimator) -> Result<EstimatorId> {
        let id = estimator.id();
        if id.is_reserved() {
            return Err(TallyError::ReservedEstimatorId { id });
        }
        if let Some(&existing) = self.index.get(&id) {
            return Err(TallyError::DuplicateEstimatorId {
                id,
                first: self.estimators[existing].kind().canonical_name(),
                second: estimator.kind().canonical_name(),
            });
        }

        let slot = self.estimators.len();
        match estimator.kind().entity_kind() {
            EntityKind::Cell => route(&mut self.cell_routes, estimator.entities(), slot),
            EntityKind::Surface => route(&mut self.surface_routes, estimator.entities(), slot),
            EntityKind::MeshElement => self.mesh_routes.push(slot),
        }
        debug!(%id, kind = %estimator.kind(), entities = estimator.entities().len(), "estimator registered");

        self.index.insert(id, slot);
        self.estimators.push(estimator);
        Ok(id)
    }

    pub fn estimator(&self, id: EstimatorId) -> Option<&Estimator> {
        self.index.get(&id).map(|&slot| &self.estimators[slot])
    }

    pub fn estimators(&self) -> &[Estimator] {
        &self.estimators
    }

    pub fn len(&self) -> usize {
        self.estimators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.estimators.is_empty()
    }

    /// Histories committed so far
    pub fn histories(&self) -> u64 {
        self.histories
    }

    /// Wall-clock seconds spent in batches, used for the figure of merit
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    fn routes<'a>(&'a self, event: &ObservedEvent) -> impl Iterator<Item = usize> + 'a {
        let (table, global) = match event {
            ObservedEvent::SurfaceCrossing { .. } => (&self.surface_routes, &[][..]),
            ObservedEvent::Subtrack { .. } => (&self.cell_routes, self.mesh_routes.as_slice()),
            _ => (&self.cell_routes, &[][..]),
        };
        table
            .get(&event.entity())
            .into_iter()
            .flatten()
            .chain(global)
            .copied()
    }

    // ------------------------------------------------------------------------
    // Worker-local scoring
    // ------------------------------------------------------------------------

    pub fn new_book(&self) -> TallyBook {
        TallyBook {
            sheets: self.estimators.iter().map(Estimator::new_sheet).collect(),
        }
    }

    pub fn dispatch(&self, book: &mut TallyBook, state: &ParticleState, event: &ObservedEvent) {
        for slot in self.routes(event) {
            self.estimators[slot].accumulate_into(&mut book.sheets[slot], state, event);
        }
    }

    pub fn commit_book_history(&self, book: &mut TallyBook) {
        for (estimator, sheet) in self.estimators.iter().zip(book.sheets.iter_mut()) {
            estimator.commit_history_into(sheet);
        }
    }

    /// Fold a worker book into the estimators
    pub fn reduce(&mut self, book: &TallyBook) {
        for (estimator, sheet) in self.estimators.iter_mut().zip(&book.sheets) {
            estimator.reduce(sheet);
        }
    }

    // ------------------------------------------------------------------------
    // Serial scoring
    // ------------------------------------------------------------------------

    pub fn observe(&mut self, state: &ParticleState, event: &ObservedEvent) {
        let targets: Vec<usize> = self.routes(event).collect();
        for slot in targets {
            self.estimators[slot].accumulate(state, event);
        }
    }

    pub fn commit_history(&mut self) {
        for estimator in &mut self.estimators {
            estimator.commit_history();
        }
        self.histories += 1;
    }

    // ------------------------------------------------------------------------
    // Batches
    // ------------------------------------------------------------------------

    /// Run `histories` histories of `source` across the rayon pool
    pub fn run_histories<S>(&mut self, source: &S, histories: u64, seed: u64) -> BatchSummary
    where
        S: HistorySource + ?Sized,
    {
        info!(histories, estimators = self.len(), "starting batch");
        let start = Instant::now();

        let this = &*self;
        let book = (0..histories)
            .into_par_iter()
            .fold(
                || this.new_book(),
                |mut book, history| {
                    let mut rng = history_rng(seed, history);
                    source.run_history(history, &mut rng, &mut |state, event| {
                        this.dispatch(&mut book, state, event)
                    });
                    this.commit_book_history(&mut book);
                    book
                },
            )
            .reduce(
                || this.new_book(),
                |mut a, b| {
                    a.merge(&b);
                    a
                },
            );
        self.reduce(&book);

        let elapsed_seconds = start.elapsed().as_secs_f64();
        self.histories += histories;
        self.elapsed += elapsed_seconds;

        let summary = BatchSummary {
            histories,
            elapsed_seconds,
            estimators: self.len(),
        };
        info!(%summary, "batch complete");
        summary
    }

    /// Processed statistics of every estimator, in id order
    pub fn reports(&self) -> Vec<EstimatorReport> {
        self.index
            .values()
            .map(|&slot| self.estimators[slot].export_moments(self.elapsed))
            .collect()
    }

    /// Human-readable summary of every estimator
    pub fn summary(&self) -> String {
        let mut s = String::new();
        s.push_str("=== Estimator Summary ===\n");
        s.push_str(&format!("Histories: {}\n", self.histories));
        s.push_str(&format!("Elapsed: {:.3} s\n", self.elapsed));
        for kind in EstimatorKind::ALL {
            let count = self.estimators.iter().filter(|e| e.kind() == kind).count();
            if count > 0 {
                s.push_str(&format!("{}: {}\n", kind, count));
            }
        }
        for report in self.reports() {
            s.push('\n');
            s.push_str(&report.to_string());
        }
        s
    }
}

fn route(table: &mut HashMap<EntityId, Vec<usize>>, entities: &[EntityId], slot: usize) {
    for &entity in entities {
        table.entry(entity).or_default().push(slot);
    }
}

/// Generator for one history of a batch
pub fn history_rng(seed: u64, history: u64) -> StdRng {
    StdRng::seed_from_u64(seed ^ history.wrapping_mul(0x9E37_79B9_7F4A_7C15))
}
