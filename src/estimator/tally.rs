//! Worker-local score accumulation.
//!
//! A `TallySheet` buffers the scores of the history in flight and, on commit,
//! folds them into raw moments. Sheets from different workers are merged at
//! the end of a batch; nothing here is shared between threads.

use std::collections::{BTreeMap, BTreeSet};

use super::moments::RawMoments;

/// Scores and committed moments for one estimator
///
/// Flat layout: `entity · bins + response · phase_bins + phase_bin`, where
/// `bins = responses · phase_bins`.
#[derive(Debug, Clone, PartialEq)]
pub struct TallySheet {
    entities: usize,
    responses: usize,
    phase_bins: usize,
    history: Vec<f64>,
    touched: BTreeSet<usize>,
    deposits: BTreeMap<usize, f64>,
    entity_bins: Vec<RawMoments>,
    entity_totals: Vec<RawMoments>,
    total_bins: Vec<RawMoments>,
    totals: Vec<RawMoments>,
    histories: u64,
}

impl TallySheet {
    pub fn new(entities: usize, responses: usize, phase_bins: usize) -> Self {
        let responses = responses.max(1);
        let bins = responses * phase_bins;
        Self {
            entities,
            responses,
            phase_bins,
            history: vec![0.0; entities * bins],
            touched: BTreeSet::new(),
            deposits: BTreeMap::new(),
            entity_bins: vec![RawMoments::default(); entities * bins],
            entity_totals: vec![RawMoments::default(); entities * responses],
            total_bins: vec![RawMoments::default(); bins],
            totals: vec![RawMoments::default(); responses],
            histories: 0,
        }
    }

    pub fn bins_per_entity(&self) -> usize {
        self.responses * self.phase_bins
    }

    pub fn number_of_responses(&self) -> usize {
        self.responses
    }

    pub fn number_of_phase_bins(&self) -> usize {
        self.phase_bins
    }

    /// Add to the current history's score in one bin
    pub fn score(&mut self, entity: usize, response: usize, phase_bin: usize, value: f64) {
        let idx = entity * self.bins_per_entity() + response * self.phase_bins + phase_bin;
        if let Some(slot) = self.history.get_mut(idx) {
            *slot += value;
            self.touched.insert(idx);
        }
    }

    /// Signed energy deposition in an entity during the current history
    pub fn deposit(&mut self, entity: usize, amount: f64) {
        *self.deposits.entry(entity).or_insert(0.0) += amount;
    }

    /// Depositions of the current history, cleared
    pub fn take_deposits(&mut self) -> BTreeMap<usize, f64> {
        std::mem::take(&mut self.deposits)
    }

    pub fn has_pending_scores(&self) -> bool {
        !self.touched.is_empty() || !self.deposits.is_empty()
    }

    /// Close the current history
    pub fn commit_history(&mut self) {
        let bins = self.bins_per_entity();
        let mut entity_sums: BTreeMap<usize, f64> = BTreeMap::new();
        let mut bin_sums: BTreeMap<usize, f64> = BTreeMap::new();

        for &idx in &self.touched {
            let x = std::mem::take(&mut self.history[idx]);
            let entity = idx / bins;
            let bin = idx % bins;
            let response = bin / self.phase_bins;

            self.entity_bins[idx].add(x);
            *entity_sums.entry(entity * self.responses + response).or_insert(0.0) += x;
            *bin_sums.entry(bin).or_insert(0.0) += x;
        }

        let mut response_sums: BTreeMap<usize, f64> = BTreeMap::new();
        for (slot, x) in entity_sums {
            self.entity_totals[slot].add(x);
            *response_sums.entry(slot % self.responses).or_insert(0.0) += x;
        }
        for (bin, x) in bin_sums {
            self.total_bins[bin].add(x);
        }
        for (response, x) in response_sums {
            self.totals[response].add(x);
        }

        self.touched.clear();
        self.deposits.clear();
        self.histories += 1;
    }

    /// Fold committed moments of another sheet of the same shape
    pub fn merge(&mut self, other: &TallySheet) {
        debug_assert_eq!(self.entity_bins.len(), other.entity_bins.len());
        let pairs = [
            (&mut self.entity_bins, &other.entity_bins),
            (&mut self.entity_totals, &other.entity_totals),
            (&mut self.total_bins, &other.total_bins),
            (&mut self.totals, &other.totals),
        ];
        for (mine, theirs) in pairs {
            for (a, b) in mine.iter_mut().zip(theirs) {
                a.merge(b);
            }
        }
        self.histories += other.histories;
    }

    pub fn histories(&self) -> u64 {
        self.histories
    }

    pub fn number_of_entities(&self) -> usize {
        self.entities
    }

    /// Committed moments of one entity bin (bin includes the response offset)
    pub fn entity_bin(&self, entity: usize, bin: usize) -> &RawMoments {
        &self.entity_bins[entity * self.bins_per_entity() + bin]
    }

    pub fn entity_total(&self, entity: usize, response: usize) -> &RawMoments {
        &self.entity_totals[entity * self.responses + response]
    }

    pub fn total_bin(&self, bin: usize) -> &RawMoments {
        &self.total_bins[bin]
    }

    pub fn total(&self, response: usize) -> &RawMoments {
        &self.totals[response]
    }
}
