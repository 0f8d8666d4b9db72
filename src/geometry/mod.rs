//! # Geometry Module
//!
//! Read-only queries the estimator engine needs from the geometry model, and
//! an in-memory model used by the demo driver and the tests.

use std::collections::BTreeMap;
use std::f64::consts::PI;

use crate::types::{EntityId, EntityKind};

/// Queries answered by the geometry model
///
/// The model is static for the duration of a run, so every answer may be
/// cached by the caller.
pub trait GeometryQuery: Send + Sync {
    /// Every entity of `kind` carrying `property`, with all of its values
    fn entities_with_property_value(
        &self,
        kind: EntityKind,
        property: &str,
    ) -> BTreeMap<EntityId, Vec<String>>;

    fn does_cell_exist(&self, cell: EntityId) -> bool;

    fn does_surface_exist(&self, surface: EntityId) -> bool;

    /// Volume of a cell (cm³)
    fn cell_volume(&self, cell: EntityId) -> f64;

    /// Area of a surface (cm²)
    fn surface_area(&self, surface: EntityId) -> f64;

    fn does_entity_exist(&self, kind: EntityKind, id: EntityId) -> bool {
        match kind {
            EntityKind::Cell => self.does_cell_exist(id),
            EntityKind::Surface => self.does_surface_exist(id),
            EntityKind::MeshElement => false,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct EntityRecord {
    measure: f64,
    properties: Vec<(String, String)>,
}

/// Geometry held entirely in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryGeometry {
    cells: BTreeMap<EntityId, EntityRecord>,
    surfaces: BTreeMap<EntityId, EntityRecord>,
}

impl InMemoryGeometry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Nested spheres: cell `i + 1` is the shell inside radius `radii[i]`,
    /// surface `i + 1` is the sphere of that radius. Radii in cm, ascending.
    pub fn concentric_spheres(radii: &[f64]) -> Self {
        let mut geometry = Self::new();
        let mut inner = 0.0;
        for (i, &r) in radii.iter().enumerate() {
            let id = i as EntityId + 1;
            let volume = 4.0 / 3.0 * PI * (r.powi(3) - inner * inner * inner);
            geometry = geometry
                .with_cell(id, volume)
                .with_surface(id, 4.0 * PI * r * r);
            inner = r;
        }
        geometry
    }

    pub fn with_cell(mut self, id: EntityId, volume: f64) -> Self {
        self.cells.entry(id).or_default().measure = volume;
        self
    }

    pub fn with_surface(mut self, id: EntityId, area: f64) -> Self {
        self.surfaces.entry(id).or_default().measure = area;
        self
    }

    /// Attach a property value to an existing entity; unknown entities are ignored
    pub fn with_property(mut self, kind: EntityKind, id: EntityId, name: &str, value: &str) -> Self {
        let table = match kind {
            EntityKind::Cell => &mut self.cells,
            EntityKind::Surface => &mut self.surfaces,
            EntityKind::MeshElement => return self,
        };
        if let Some(record) = table.get_mut(&id) {
            record.properties.push((name.to_string(), value.to_string()));
        }
        self
    }

    pub fn number_of_cells(&self) -> usize {
        self.cells.len()
    }

    pub fn number_of_surfaces(&self) -> usize {
        self.surfaces.len()
    }

    pub fn cell_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.cells.keys().copied()
    }

    pub fn surface_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.surfaces.keys().copied()
    }

    fn table(&self, kind: EntityKind) -> Option<&BTreeMap<EntityId, EntityRecord>> {
        match kind {
            EntityKind::Cell => Some(&self.cells),
            EntityKind::Surface => Some(&self.surfaces),
            EntityKind::MeshElement => None,
        }
    }
}

impl GeometryQuery for InMemoryGeometry {
    fn entities_with_property_value(
        &self,
        kind: EntityKind,
        property: &str,
    ) -> BTreeMap<EntityId, Vec<String>> {
        let Some(table) = self.table(kind) else {
            return BTreeMap::new();
        };
        table
            .iter()
            .filter_map(|(&id, record)| {
                let values: Vec<String> = record
                    .properties
                    .iter()
                    .filter(|(name, _)| name == property)
                    .map(|(_, value)| value.clone())
                    .collect();
                (!values.is_empty()).then_some((id, values))
            })
            .collect()
    }

    fn does_cell_exist(&self, cell: EntityId) -> bool {
        self.cells.contains_key(&cell)
    }

    fn does_surface_exist(&self, surface: EntityId) -> bool {
        self.surfaces.contains_key(&surface)
    }

    fn cell_volume(&self, cell: EntityId) -> f64 {
        self.cells.get(&cell).map_or(0.0, |r| r.measure)
    }

    fn surface_area(&self, surface: EntityId) -> f64 {
        self.surfaces.get(&surface).map_or(0.0, |r| r.measure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_concentric_spheres() {
        let g = InMemoryGeometry::concentric_spheres(&[1.0, 2.0]);
        assert_eq!(g.number_of_cells(), 2);
        assert!((g.cell_volume(1) - 4.0 / 3.0 * PI).abs() < 1e-12);
        assert!((g.cell_volume(2) - 4.0 / 3.0 * PI * 7.0).abs() < 1e-12);
        assert!((g.surface_area(2) - 16.0 * PI).abs() < 1e-12);
    }

    #[test]
    fn test_property_lookup() {
        let g = InMemoryGeometry::new()
            .with_cell(1, 1.0)
            .with_cell(2, 1.0)
            .with_surface(7, 3.0)
            .with_property(EntityKind::Cell, 1, "estimator", "0.cell.tl.flux.n")
            .with_property(EntityKind::Cell, 1, "estimator", "1.cell.c.flux.p")
            .with_property(EntityKind::Cell, 2, "material", "3")
            .with_property(EntityKind::Cell, 99, "estimator", "5.cell.tl.flux.n");

        let tagged = g.entities_with_property_value(EntityKind::Cell, "estimator");
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[&1].len(), 2);
        assert!(g.entities_with_property_value(EntityKind::Surface, "estimator").is_empty());
        assert!(g.does_entity_exist(EntityKind::Surface, 7));
        assert!(!g.does_entity_exist(EntityKind::Cell, 99));
    }
}
