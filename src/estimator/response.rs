//! Response functions folded into estimator scores.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::ResponseFunctionRecord;
use crate::error::{Result, TallyError};
use crate::particle::ParticleState;

/// Energy-dependent multiplier applied to every score of an estimator
pub trait ResponseFunction: fmt::Debug + Send + Sync {
    fn id(&self) -> u32;

    fn name(&self) -> String {
        format!("response function {}", self.id())
    }

    /// Value at the given energy (MeV)
    fn evaluate(&self, energy: f64) -> f64;

    fn evaluate_state(&self, state: &ParticleState) -> f64 {
        self.evaluate(state.energy)
    }
}

/// Lin-lin interpolated table; constant extrapolation outside the grid
#[derive(Debug, Clone, PartialEq)]
pub struct TabulatedResponse {
    id: u32,
    name: Option<String>,
    energies: Vec<f64>,
    values: Vec<f64>,
}

impl TabulatedResponse {
    pub fn new(id: u32, energies: Vec<f64>, values: Vec<f64>) -> Result<Self> {
        let invalid = |reason: &str| TallyError::InvalidResponseFunction {
            id,
            reason: reason.to_string(),
        };
        if energies.len() != values.len() {
            return Err(invalid("energy grid and values differ in length"));
        }
        if energies.is_empty() {
            return Err(invalid("no tabulated points"));
        }
        if energies.iter().chain(&values).any(|x| !x.is_finite()) {
            return Err(invalid("non-finite tabulated point"));
        }
        if !energies.windows(2).all(|w| w[0] < w[1]) {
            return Err(invalid("energy grid is not strictly ascending"));
        }
        Ok(Self { id, name: None, energies, values })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl ResponseFunction for TabulatedResponse {
    fn id(&self) -> u32 {
        self.id
    }

    fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("response function {}", self.id))
    }

    fn evaluate(&self, energy: f64) -> f64 {
        let n = self.energies.len();
        if energy <= self.energies[0] {
            return self.values[0];
        }
        if energy >= self.energies[n - 1] {
            return self.values[n - 1];
        }

        let hi = self.energies.partition_point(|&e| e <= energy);
        let lo = hi - 1;
        let f = (energy - self.energies[lo]) / (self.energies[hi] - self.energies[lo]);
        self.values[lo] + f * (self.values[hi] - self.values[lo])
    }
}

/// Response functions available to the factory, by id
#[derive(Debug, Clone, Default)]
pub struct ResponseTable {
    functions: BTreeMap<u32, Arc<dyn ResponseFunction>>,
}

impl ResponseTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(records: &[ResponseFunctionRecord]) -> Result<Self> {
        let mut table = Self::new();
        for record in records {
            let mut function =
                TabulatedResponse::new(record.id, record.energies.clone(), record.values.clone())?;
            if let Some(name) = &record.name {
                function = function.with_name(name.clone());
            }
            table.insert(Arc::new(function))?;
        }
        Ok(table)
    }

    pub fn insert(&mut self, function: Arc<dyn ResponseFunction>) -> Result<()> {
        let id = function.id();
        if self.functions.contains_key(&id) {
            return Err(TallyError::InvalidResponseFunction {
                id,
                reason: "defined more than once".to_string(),
            });
        }
        self.functions.insert(id, function);
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<Arc<dyn ResponseFunction>> {
        self.functions.get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lin_lin_interpolation() {
        let f = TabulatedResponse::new(3, vec![1.0, 3.0, 5.0], vec![2.0, 4.0, 0.0]).unwrap();
        assert_eq!(f.evaluate(0.5), 2.0);
        assert_eq!(f.evaluate(1.0), 2.0);
        assert!((f.evaluate(2.0) - 3.0).abs() < 1e-12);
        assert_eq!(f.evaluate(3.0), 4.0);
        assert!((f.evaluate(4.5) - 1.0).abs() < 1e-12);
        assert_eq!(f.evaluate(10.0), 0.0);
        assert_eq!(f.name(), "response function 3");
    }

    #[test]
    fn test_invalid_tables() {
        assert!(TabulatedResponse::new(1, vec![1.0, 2.0], vec![1.0]).is_err());
        assert!(TabulatedResponse::new(1, vec![2.0, 1.0], vec![1.0, 1.0]).is_err());
        assert!(TabulatedResponse::new(1, vec![], vec![]).is_err());
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let records = vec![
            ResponseFunctionRecord::new(0, vec![1.0], vec![1.0]),
            ResponseFunctionRecord::new(0, vec![1.0], vec![2.0]),
        ];
        let err = ResponseTable::from_records(&records).unwrap_err();
        assert!(matches!(err, TallyError::InvalidResponseFunction { id: 0, .. }));
    }
}
