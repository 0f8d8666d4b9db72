//! # Run Configuration
//!
//! Explicit estimator records, response functions and property-name
//! synonyms, loaded from JSON or TOML.
//!
//! ```json
//! {
//!   "Estimators": [
//!     { "Id": 3, "Type": "Surface Flux", "Particle Type": "Photon",
//!       "Surfaces": [4, 5], "Multiplier": 2.0,
//!       "Bins": { "Energy Bins": [0.0, 1.0, 10.0] } }
//!   ],
//!   "Response Functions": [
//!     { "Id": 0, "Energy Grid": [0.0, 20.0], "Values": [1.0, 1.0] }
//!   ]
//! }
//! ```
//!
//! Keys that are not recognised are kept and reported with a warning rather
//! than rejected.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::discretization::PhaseSpaceDimension;
use crate::error::{Result, TallyError};
use crate::estimator::{EstimatorKind, MeshPlanes};
use crate::types::{EntityId, EntityKind, EstimatorId};

// ============================================================================
// PROPERTY NAMES
// ============================================================================

/// Geometry property name and the estimator type names used inside tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyNames {
    #[serde(rename = "Estimator")]
    pub estimator: String,
    #[serde(rename = "Cell Pulse Height")]
    pub cell_pulse_height: String,
    #[serde(rename = "Cell Track-Length Flux")]
    pub cell_track_length_flux: String,
    #[serde(rename = "Cell Collision Flux")]
    pub cell_collision_flux: String,
    #[serde(rename = "Surface Flux")]
    pub surface_flux: String,
    #[serde(rename = "Surface Current")]
    pub surface_current: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            estimator: "estimator".into(),
            cell_pulse_height: "cell.pulse.height".into(),
            cell_track_length_flux: "cell.tl.flux".into(),
            cell_collision_flux: "cell.c.flux".into(),
            surface_flux: "surface.flux".into(),
            surface_current: "surface.current".into(),
        }
    }
}

impl PropertyNames {
    /// Tag type name of a variant; the mesh variant has none
    pub fn tag_name(&self, kind: EstimatorKind) -> Option<&str> {
        match kind {
            EstimatorKind::CellPulseHeight => Some(&self.cell_pulse_height),
            EstimatorKind::CellTrackLengthFlux => Some(&self.cell_track_length_flux),
            EstimatorKind::CellCollisionFlux => Some(&self.cell_collision_flux),
            EstimatorKind::SurfaceFlux => Some(&self.surface_flux),
            EstimatorKind::SurfaceCurrent => Some(&self.surface_current),
            EstimatorKind::HexMeshTrackLengthFlux => None,
        }
    }

    /// Variant named by a tag type name
    pub fn kind_for_tag(&self, name: &str) -> Option<EstimatorKind> {
        EstimatorKind::ALL
            .into_iter()
            .find(|&k| self.tag_name(k) == Some(name))
    }

    /// Synonyms must be non-empty, free of surrounding dots and distinct
    pub fn validate(&self) -> Result<()> {
        if self.estimator.trim().is_empty() {
            return Err(TallyError::InvalidPropertyNames(
                "the estimator property name is empty".into(),
            ));
        }

        let mut seen = BTreeSet::new();
        for kind in EstimatorKind::ALL {
            let Some(name) = self.tag_name(kind) else {
                continue;
            };
            if name.is_empty() || name.starts_with('.') || name.ends_with('.') {
                return Err(TallyError::InvalidPropertyNames(format!(
                    "`{name}` is not a usable type name for {kind}"
                )));
            }
            if !seen.insert(name) {
                return Err(TallyError::InvalidPropertyNames(format!(
                    "`{name}` names more than one estimator type"
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// RECORDS
// ============================================================================

fn default_multiplier() -> f64 {
    1.0
}

/// Bin boundaries per dimension
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BinRecord {
    #[serde(rename = "Energy Bins", default, skip_serializing_if = "Option::is_none")]
    pub energy: Option<Vec<f64>>,
    #[serde(rename = "Time Bins", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<Vec<f64>>,
    #[serde(rename = "Collision Number Bins", default, skip_serializing_if = "Option::is_none")]
    pub collision_number: Option<Vec<u32>>,
    #[serde(rename = "Cosine Bins", default, skip_serializing_if = "Option::is_none")]
    pub cosine: Option<Vec<f64>>,
    #[serde(rename = "Source Energy Bins", default, skip_serializing_if = "Option::is_none")]
    pub source_energy: Option<Vec<f64>>,
    #[serde(rename = "Source Time Bins", default, skip_serializing_if = "Option::is_none")]
    pub source_time: Option<Vec<f64>>,
    #[serde(rename = "Source Id Bins", default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<Vec<Vec<u32>>>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl BinRecord {
    /// Dimensions with boundaries supplied, in dimension order
    pub fn declared_dimensions(&self) -> Vec<PhaseSpaceDimension> {
        PhaseSpaceDimension::ALL
            .into_iter()
            .filter(|&d| self.has(d))
            .collect()
    }

    pub fn has(&self, dimension: PhaseSpaceDimension) -> bool {
        match dimension {
            PhaseSpaceDimension::Energy => self.energy.is_some(),
            PhaseSpaceDimension::Time => self.time.is_some(),
            PhaseSpaceDimension::CollisionNumber => self.collision_number.is_some(),
            PhaseSpaceDimension::Cosine => self.cosine.is_some(),
            PhaseSpaceDimension::SourceEnergy => self.source_energy.is_some(),
            PhaseSpaceDimension::SourceTime => self.source_time.is_some(),
            PhaseSpaceDimension::SourceId => self.source_id.is_some(),
        }
    }

    /// Real-valued boundaries of a continuous dimension
    pub fn continuous(&self, dimension: PhaseSpaceDimension) -> Option<&[f64]> {
        match dimension {
            PhaseSpaceDimension::Energy => self.energy.as_deref(),
            PhaseSpaceDimension::Time => self.time.as_deref(),
            PhaseSpaceDimension::Cosine => self.cosine.as_deref(),
            PhaseSpaceDimension::SourceEnergy => self.source_energy.as_deref(),
            PhaseSpaceDimension::SourceTime => self.source_time.as_deref(),
            PhaseSpaceDimension::CollisionNumber | PhaseSpaceDimension::SourceId => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.declared_dimensions().is_empty()
    }
}

/// One explicit estimator declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorRecord {
    #[serde(rename = "Id")]
    pub id: EstimatorId,
    #[serde(rename = "Type", default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    #[serde(rename = "Particle Type", default, skip_serializing_if = "Option::is_none")]
    pub particle_type: Option<String>,
    #[serde(rename = "Cells", default, skip_serializing_if = "Vec::is_empty")]
    pub cells: Vec<EntityId>,
    #[serde(rename = "Surfaces", default, skip_serializing_if = "Vec::is_empty")]
    pub surfaces: Vec<EntityId>,
    #[serde(rename = "Multiplier", default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(rename = "Energy Multiplication", default)]
    pub energy_multiplication: bool,
    #[serde(rename = "Response Functions", default, skip_serializing_if = "Vec::is_empty")]
    pub response_functions: Vec<u32>,
    #[serde(rename = "Bins", default)]
    pub bins: BinRecord,
    #[serde(rename = "X Planes", default, skip_serializing_if = "Vec::is_empty")]
    pub x_planes: Vec<f64>,
    #[serde(rename = "Y Planes", default, skip_serializing_if = "Vec::is_empty")]
    pub y_planes: Vec<f64>,
    #[serde(rename = "Z Planes", default, skip_serializing_if = "Vec::is_empty")]
    pub z_planes: Vec<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl EstimatorRecord {
    pub fn new(id: u32) -> Self {
        Self {
            id: EstimatorId::new(id),
            type_name: None,
            particle_type: None,
            cells: Vec::new(),
            surfaces: Vec::new(),
            multiplier: 1.0,
            energy_multiplication: false,
            response_functions: Vec::new(),
            bins: BinRecord::default(),
            x_planes: Vec::new(),
            y_planes: Vec::new(),
            z_planes: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_type(mut self, type_name: &str) -> Self {
        self.type_name = Some(type_name.to_string());
        self
    }

    pub fn with_particle_type(mut self, particle_type: &str) -> Self {
        self.particle_type = Some(particle_type.to_string());
        self
    }

    pub fn with_cells(mut self, cells: Vec<EntityId>) -> Self {
        self.cells = cells;
        self
    }

    pub fn with_surfaces(mut self, surfaces: Vec<EntityId>) -> Self {
        self.surfaces = surfaces;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_bins(mut self, bins: BinRecord) -> Self {
        self.bins = bins;
        self
    }

    pub fn with_mesh_planes(mut self, x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Self {
        self.x_planes = x;
        self.y_planes = y;
        self.z_planes = z;
        self
    }

    /// Entities listed for the given class
    pub fn entities(&self, kind: EntityKind) -> &[EntityId] {
        match kind {
            EntityKind::Cell => &self.cells,
            EntityKind::Surface => &self.surfaces,
            EntityKind::MeshElement => &[],
        }
    }

    pub fn mesh_planes(&self) -> Option<MeshPlanes> {
        if self.x_planes.is_empty() && self.y_planes.is_empty() && self.z_planes.is_empty() {
            return None;
        }
        Some(MeshPlanes {
            x: self.x_planes.clone(),
            y: self.y_planes.clone(),
            z: self.z_planes.clone(),
        })
    }
}

/// Tabulated response function declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseFunctionRecord {
    #[serde(rename = "Id")]
    pub id: u32,
    #[serde(rename = "Name", default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "Energy Grid")]
    pub energies: Vec<f64>,
    #[serde(rename = "Values")]
    pub values: Vec<f64>,
}

impl ResponseFunctionRecord {
    pub fn new(id: u32, energies: Vec<f64>, values: Vec<f64>) -> Self {
        Self { id, name: None, energies, values }
    }
}

// ============================================================================
// RUN CONFIGURATION
// ============================================================================

/// Everything the estimator engine reads from the run configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    #[serde(rename = "Property Names")]
    pub property_names: PropertyNames,
    #[serde(rename = "Estimators")]
    pub estimators: Vec<EstimatorRecord>,
    #[serde(rename = "Response Functions")]
    pub response_functions: Vec<ResponseFunctionRecord>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl RunConfig {
    /// Load by extension (`.json` or `.toml`)
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TallyError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        let config = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text)?,
            Some("toml") => Self::from_toml_str(&text)?,
            _ => {
                return Err(TallyError::UnsupportedConfigFormat {
                    path: path.to_path_buf(),
                })
            }
        };
        debug!(
            path = %path.display(),
            estimators = config.estimators.len(),
            response_functions = config.response_functions.len(),
            "loaded run configuration"
        );
        Ok(config)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.property_names.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text)?;
        config.property_names.validate()?;
        Ok(config)
    }

    pub fn with_estimator(mut self, record: EstimatorRecord) -> Self {
        self.estimators.push(record);
        self
    }

    pub fn with_response_function(mut self, record: ResponseFunctionRecord) -> Self {
        self.response_functions.push(record);
        self
    }

    /// Every unrecognised key, as `(location, key)`
    pub fn unused_keys(&self) -> Vec<(String, String)> {
        let mut unused: Vec<(String, String)> = self
            .extra
            .keys()
            .map(|k| ("run configuration".to_string(), k.clone()))
            .collect();
        for record in &self.estimators {
            let location = format!("estimator {}", record.id);
            unused.extend(record.extra.keys().map(|k| (location.clone(), k.clone())));
            unused.extend(
                record
                    .bins
                    .extra
                    .keys()
                    .map(|k| (format!("{location} bins"), k.clone())),
            );
        }
        unused
    }

    /// Warn about every unrecognised key
    pub fn report_unused_keys(&self) -> usize {
        let unused = self.unused_keys();
        for (location, key) in &unused {
            warn!(%location, %key, "unused configuration parameter");
        }
        unused.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const JSON: &str = r#"{
        "Estimators": [
            { "Id": 3, "Type": "Surface Flux", "Particle Type": "Photon",
              "Surfaces": [4, 5], "Multiplier": 2.0, "Energy Multiplication": true,
              "Response Functions": [0],
              "Bins": { "Energy Bins": [0.0, 1.0, 10.0], "Source Id Bins": [[0], [0, 1]],
                        "Angle Bins": [0.0] },
              "Colour": "red" },
            { "Id": 4, "Cells": [1] }
        ],
        "Response Functions": [
            { "Id": 0, "Energy Grid": [0.0, 20.0], "Values": [1.0, 1.0] }
        ],
        "Verbose": true
    }"#;

    #[test]
    fn test_json_records() {
        let config = RunConfig::from_json_str(JSON).unwrap();
        assert_eq!(config.estimators.len(), 2);

        let flux = &config.estimators[0];
        assert_eq!(flux.id, EstimatorId::new(3));
        assert_eq!(flux.type_name.as_deref(), Some("Surface Flux"));
        assert_eq!(flux.surfaces, vec![4, 5]);
        assert!(flux.energy_multiplication);
        assert_eq!(
            flux.bins.declared_dimensions(),
            vec![PhaseSpaceDimension::Energy, PhaseSpaceDimension::SourceId]
        );

        let bare = &config.estimators[1];
        assert_eq!(bare.multiplier, 1.0);
        assert!(bare.type_name.is_none());
        assert!(bare.bins.is_empty());
        assert_eq!(config.property_names, PropertyNames::default());
    }

    #[test]
    fn test_unused_keys_collected() {
        let config = RunConfig::from_json_str(JSON).unwrap();
        let unused = config.unused_keys();
        assert_eq!(unused.len(), 3);
        assert!(unused.contains(&("run configuration".into(), "Verbose".into())));
        assert!(unused.contains(&("estimator 3".into(), "Colour".into())));
        assert!(unused.contains(&("estimator 3 bins".into(), "Angle Bins".into())));
        assert_eq!(config.report_unused_keys(), 3);
    }

    #[test]
    fn test_toml_records() {
        let text = r#"
            [["Estimators"]]
            Id = 0
            Type = "Hex Mesh Track-Length Flux"
            "Particle Type" = "n"
            "X Planes" = [0.0, 1.0]
            "Y Planes" = [0.0, 1.0]
            "Z Planes" = [0.0, 2.0]

            [["Estimators"]]
            Id = 1
            Cells = [2, 3]
            [Estimators.Bins]
            "Collision Number Bins" = [0, 1, 10]

            ["Property Names"]
            "Surface Flux" = "surf.flux"
        "#;
        let config = RunConfig::from_toml_str(text).unwrap();
        assert_eq!(config.estimators.len(), 2);
        let planes = config.estimators[0].mesh_planes().unwrap();
        assert_eq!(planes.z, vec![0.0, 2.0]);
        assert_eq!(config.estimators[1].bins.collision_number, Some(vec![0, 1, 10]));
        assert_eq!(config.property_names.surface_flux, "surf.flux");
        assert_eq!(config.property_names.surface_current, "surface.current");
    }

    #[test]
    fn test_property_name_collision_rejected() {
        let names = PropertyNames {
            surface_current: "surface.flux".into(),
            ..PropertyNames::default()
        };
        assert!(matches!(names.validate(), Err(TallyError::InvalidPropertyNames(_))));

        let dotted = PropertyNames {
            cell_collision_flux: ".c.flux".into(),
            ..PropertyNames::default()
        };
        assert!(dotted.validate().is_err());
    }

    #[test]
    fn test_kind_for_tag() {
        let names = PropertyNames::default();
        assert_eq!(names.kind_for_tag("cell.tl.flux"), Some(EstimatorKind::CellTrackLengthFlux));
        assert_eq!(names.kind_for_tag("surface.current"), Some(EstimatorKind::SurfaceCurrent));
        assert_eq!(names.kind_for_tag("Cell Track-Length Flux"), None);
        assert_eq!(names.tag_name(EstimatorKind::HexMeshTrackLengthFlux), None);
    }

    #[test]
    fn test_unsupported_extension() {
        let path = std::env::temp_dir().join(format!("tallysim-{}.xml", std::process::id()));
        std::fs::write(&path, "<run/>").unwrap();
        let err = RunConfig::from_path(&path).unwrap_err();
        std::fs::remove_file(&path).ok();
        assert!(matches!(err, TallyError::UnsupportedConfigFormat { .. }));

        let missing = RunConfig::from_path("/nonexistent/run.json").unwrap_err();
        assert!(matches!(missing, TallyError::ConfigIo { .. }));
    }

    #[test]
    fn test_json_file_round_trip() {
        let config = RunConfig::default()
            .with_estimator(EstimatorRecord::new(2).with_type("Cell Collision Flux").with_cells(vec![1]))
            .with_response_function(ResponseFunctionRecord::new(0, vec![1.0], vec![1.0]));
        let path = std::env::temp_dir().join(format!("tallysim-{}.json", std::process::id()));
        std::fs::write(&path, serde_json::to_string(&config).unwrap()).unwrap();
        let loaded = RunConfig::from_path(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(loaded, config);
    }
}
