//! Compute-once cache of cell volumes and surface areas.
//!
//! Slots are created under a short write lock and filled outside it through
//! `OnceLock`, so concurrent first requests for the same entity issue exactly
//! one geometry query and requests for different entities do not serialise on
//! each other's queries.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, PoisonError, RwLock};

use tracing::debug;

use crate::geometry::GeometryQuery;
use crate::types::{EntityId, EntityKind};

type Slot = Arc<OnceLock<f64>>;

/// Lazily populated entity measures shared by every estimator
pub struct EntityMeasureCache {
    geometry: Arc<dyn GeometryQuery>,
    slots: RwLock<HashMap<(EntityKind, EntityId), Slot>>,
}

impl EntityMeasureCache {
    pub fn new(geometry: Arc<dyn GeometryQuery>) -> Self {
        Self {
            geometry,
            slots: RwLock::new(HashMap::new()),
        }
    }

    /// Volume of a cell or area of a surface
    pub fn measure(&self, kind: EntityKind, id: EntityId) -> f64 {
        *self.slot(kind, id).get_or_init(|| {
            debug!(%kind, id, "entity measure cache miss");
            match kind {
                EntityKind::Cell => self.geometry.cell_volume(id),
                EntityKind::Surface => self.geometry.surface_area(id),
                EntityKind::MeshElement => 0.0,
            }
        })
    }

    fn slot(&self, kind: EntityKind, id: EntityId) -> Slot {
        let key = (kind, id);
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(key).or_default())
    }

    /// Volumes in the order of `cells`
    pub fn volumes(&self, cells: &[EntityId]) -> Vec<f64> {
        cells.iter().map(|&c| self.measure(EntityKind::Cell, c)).collect()
    }

    /// Areas in the order of `surfaces`
    pub fn areas(&self, surfaces: &[EntityId]) -> Vec<f64> {
        surfaces
            .iter()
            .map(|&s| self.measure(EntityKind::Surface, s))
            .collect()
    }

    /// Number of entities with a slot
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::geometry::InMemoryGeometry;
    use rayon::prelude::*;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Geometry double counting measure queries
    pub(crate) struct CountingGeometry {
        pub inner: InMemoryGeometry,
        pub volume_calls: AtomicUsize,
        pub area_calls: AtomicUsize,
    }

    impl CountingGeometry {
        pub fn new(inner: InMemoryGeometry) -> Self {
            Self {
                inner,
                volume_calls: AtomicUsize::new(0),
                area_calls: AtomicUsize::new(0),
            }
        }
    }

    impl GeometryQuery for CountingGeometry {
        fn entities_with_property_value(
            &self,
            kind: EntityKind,
            property: &str,
        ) -> BTreeMap<EntityId, Vec<String>> {
            self.inner.entities_with_property_value(kind, property)
        }

        fn does_cell_exist(&self, cell: EntityId) -> bool {
            self.inner.does_cell_exist(cell)
        }

        fn does_surface_exist(&self, surface: EntityId) -> bool {
            self.inner.does_surface_exist(surface)
        }

        fn cell_volume(&self, cell: EntityId) -> f64 {
            self.volume_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.cell_volume(cell)
        }

        fn surface_area(&self, surface: EntityId) -> f64 {
            self.area_calls.fetch_add(1, Ordering::SeqCst);
            self.inner.surface_area(surface)
        }
    }

    #[test]
    fn test_second_request_hits_cache() {
        let geometry = Arc::new(CountingGeometry::new(
            InMemoryGeometry::new().with_cell(1, 2.0).with_cell(2, 3.0).with_surface(1, 5.0),
        ));
        let cache = EntityMeasureCache::new(geometry.clone());

        assert_eq!(cache.volumes(&[1, 2]), vec![2.0, 3.0]);
        assert_eq!(geometry.volume_calls.load(Ordering::SeqCst), 2);

        assert_eq!(cache.volumes(&[2, 1]), vec![3.0, 2.0]);
        assert_eq!(geometry.volume_calls.load(Ordering::SeqCst), 2);

        // same id, other class
        assert_eq!(cache.areas(&[1]), vec![5.0]);
        assert_eq!(geometry.area_calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len(), 3);
    }

    #[test]
    fn test_concurrent_first_requests_query_once() {
        let geometry = Arc::new(CountingGeometry::new(InMemoryGeometry::new().with_cell(7, 1.5)));
        let cache = EntityMeasureCache::new(geometry.clone());

        let total: f64 = (0..256)
            .into_par_iter()
            .map(|_| cache.measure(EntityKind::Cell, 7))
            .sum();
        assert!((total - 256.0 * 1.5).abs() < 1e-9);
        assert_eq!(geometry.volume_calls.load(Ordering::SeqCst), 1);
    }
}
