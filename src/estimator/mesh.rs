//! # Hex Mesh
//!
//! Rectilinear mesh overlaid on the geometry for track-length flux
//! estimation. Element `(i, j, k)` is the box between planes `x_i..x_{i+1}`,
//! `y_j..y_{j+1}`, `z_k..z_{k+1}`, numbered `i + nx·(j + ny·k)`.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TallyError};
use crate::types::{EntityId, EstimatorId, Vec3};

/// Plane positions (cm) along each axis, as declared in configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshPlanes {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

/// Structured hexahedral mesh
#[derive(Debug, Clone, PartialEq)]
pub struct HexMesh {
    planes: [Vec<f64>; 3],
}

impl HexMesh {
    pub fn new(id: EstimatorId, x: Vec<f64>, y: Vec<f64>, z: Vec<f64>) -> Result<Self> {
        for (axis, planes) in ["X", "Y", "Z"].iter().zip([&x, &y, &z]) {
            if planes.len() < 2 {
                return Err(TallyError::InvalidMeshPlanes {
                    id,
                    reason: format!("{axis} Planes need at least 2 entries (got {})", planes.len()),
                });
            }
            if planes.iter().any(|p| !p.is_finite()) || !planes.windows(2).all(|w| w[0] < w[1]) {
                return Err(TallyError::InvalidMeshPlanes {
                    id,
                    reason: format!("{axis} Planes are not strictly ascending"),
                });
            }
        }
        Ok(Self { planes: [x, y, z] })
    }

    pub fn from_planes(id: EstimatorId, planes: &MeshPlanes) -> Result<Self> {
        Self::new(id, planes.x.clone(), planes.y.clone(), planes.z.clone())
    }

    fn cells_along(&self, axis: usize) -> usize {
        self.planes[axis].len() - 1
    }

    pub fn number_of_elements(&self) -> usize {
        (0..3).map(|a| self.cells_along(a)).product()
    }

    /// Element ids, which are the estimator's bound entities
    pub fn element_ids(&self) -> Vec<EntityId> {
        (0..self.number_of_elements() as EntityId).collect()
    }

    pub fn element_volume(&self, element: EntityId) -> f64 {
        let [i, j, k] = self.element_indices(element);
        (0..3)
            .zip([i, j, k])
            .map(|(a, n)| self.planes[a][n + 1] - self.planes[a][n])
            .product()
    }

    fn element_indices(&self, element: EntityId) -> [usize; 3] {
        let nx = self.cells_along(0);
        let ny = self.cells_along(1);
        let e = element as usize;
        [e % nx, (e / nx) % ny, e / (nx * ny)]
    }

    /// Element containing a point, if the point is inside the mesh
    pub fn element_containing(&self, point: &Vec3) -> Option<EntityId> {
        let mut idx = [0usize; 3];
        for (axis, slot) in idx.iter_mut().enumerate() {
            let planes = &self.planes[axis];
            let v = point.component(axis);
            if v < planes[0] || v > planes[planes.len() - 1] {
                return None;
            }
            *slot = (planes.partition_point(|&p| p <= v) - 1).min(planes.len() - 2);
        }
        let nx = self.cells_along(0);
        let ny = self.cells_along(1);
        Some((idx[0] + nx * (idx[1] + ny * idx[2])) as EntityId)
    }

    /// Split a straight track at plane crossings; each piece is credited to
    /// the element holding its midpoint
    pub fn split_track(&self, start: Vec3, direction: Vec3, length: f64) -> Vec<(EntityId, f64)> {
        if length <= 0.0 {
            return Vec::new();
        }

        let mut cuts = vec![0.0, length];
        for axis in 0..3 {
            let d = direction.component(axis);
            if d == 0.0 {
                continue;
            }
            let s = start.component(axis);
            cuts.extend(
                self.planes[axis]
                    .iter()
                    .map(|&p| (p - s) / d)
                    .filter(|&t| t > 0.0 && t < length),
            );
        }
        cuts.sort_by(f64::total_cmp);
        cuts.dedup();

        cuts.windows(2)
            .filter_map(|w| {
                let piece = w[1] - w[0];
                let mid = start.advance(&direction, 0.5 * (w[0] + w[1]));
                self.element_containing(&mid).map(|e| (e, piece))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mesh() -> HexMesh {
        HexMesh::new(
            EstimatorId::new(0),
            vec![0.0, 1.0, 2.0],
            vec![0.0, 1.0],
            vec![0.0, 2.0],
        )
        .unwrap()
    }

    #[test]
    fn test_elements_and_volumes() {
        let m = mesh();
        assert_eq!(m.number_of_elements(), 2);
        assert_eq!(m.element_ids(), vec![0, 1]);
        assert_eq!(m.element_volume(0), 2.0);
        assert_eq!(m.element_containing(&Vec3::new(1.5, 0.5, 0.5)), Some(1));
        assert_eq!(m.element_containing(&Vec3::new(2.0, 1.0, 2.0)), Some(1));
        assert_eq!(m.element_containing(&Vec3::new(2.5, 0.5, 0.5)), None);
    }

    #[test]
    fn test_track_split_at_planes() {
        let m = mesh();
        let pieces = m.split_track(Vec3::new(-0.5, 0.5, 0.5), Vec3::unit_x(), 2.0);
        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].0, 0);
        assert!((pieces[0].1 - 1.0).abs() < 1e-12);
        assert_eq!(pieces[1].0, 1);
        assert!((pieces[1].1 - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_planes() {
        let id = EstimatorId::new(3);
        let err = HexMesh::new(id, vec![0.0], vec![0.0, 1.0], vec![0.0, 1.0]).unwrap_err();
        assert!(matches!(err, TallyError::InvalidMeshPlanes { .. }));
        assert!(HexMesh::new(id, vec![0.0, 1.0], vec![1.0, 0.0], vec![0.0, 1.0]).is_err());
    }
}
